//! Memory journal tools: checkpoint, recall, plan.
//!
//! The journal is plain file I/O under `.memories/` in the workspace root:
//! immutable checkpoint entries as `YYYY-MM-DD/HHMMSS_XXXX.json`, mutable
//! plans as `plans/plan_<slug>.md`. The indexer's ignore set leaves
//! `.memories/` alone; this data never enters the code index.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use rust_mcp_sdk::macros::{mcp_tool, JsonSchema};
use rust_mcp_sdk::schema::{CallToolResult, TextContent};
use serde::{Deserialize, Serialize};

use crate::handler::MillerServerHandler;

const MEMORIES_DIR: &str = ".memories";
const PLANS_DIR: &str = "plans";

fn default_days() -> u32 {
    7
}

fn default_recall_limit() -> u32 {
    20
}

fn default_plan_operation() -> String {
    "list".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct MemoryEntry {
    id: String,
    timestamp: i64,
    #[serde(rename = "type")]
    entry_type: String,
    description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

async fn workspace_root(handler: &MillerServerHandler) -> Result<PathBuf> {
    handler.ensure_workspace().await?;
    let guard = handler.workspace.read().await;
    let workspace = guard
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("workspace not initialized"))?;
    Ok(workspace.root.clone())
}

//***********************//
//   Checkpoint Tool     //
//***********************//

#[mcp_tool(
    name = "checkpoint",
    description = "Save an immutable work checkpoint to the journal: what was done, why, and any tags for later recall.",
    title = "Save Checkpoint",
    idempotent_hint = false,
    destructive_hint = false,
    open_world_hint = false,
    read_only_hint = false,
    meta = r#"{"category": "memory"}"#
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct CheckpointTool {
    /// What happened and why it matters.
    pub description: String,

    /// Optional tags for filtering during recall.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CheckpointTool {
    pub async fn call_tool(&self, handler: &MillerServerHandler) -> Result<CallToolResult> {
        let root = workspace_root(handler).await?;
        let now = Local::now();

        let day_dir = root.join(MEMORIES_DIR).join(now.format("%Y-%m-%d").to_string());
        std::fs::create_dir_all(&day_dir)
            .with_context(|| format!("creating {}", day_dir.display()))?;

        let id = uuid::Uuid::new_v4().to_string();
        let short = &id[..4];
        let file_name = format!("{}_{}.json", now.format("%H%M%S"), short);
        let entry = MemoryEntry {
            id: id.clone(),
            timestamp: Utc::now().timestamp(),
            entry_type: "checkpoint".to_string(),
            description: self.description.clone(),
            tags: self.tags.clone(),
        };

        let path = day_dir.join(&file_name);
        std::fs::write(&path, serde_json::to_string_pretty(&entry)?)?;

        Ok(CallToolResult::text_content(vec![TextContent::from(
            format!(
                "Checkpoint saved: {}/{}",
                now.format("%Y-%m-%d"),
                file_name
            ),
        )]))
    }
}

//***********************//
//   Recall Tool         //
//***********************//

#[mcp_tool(
    name = "recall",
    description = "Read back journal checkpoints from the last N days, optionally filtered by a search term or tag.",
    title = "Recall Checkpoints",
    idempotent_hint = true,
    destructive_hint = false,
    open_world_hint = false,
    read_only_hint = true,
    meta = r#"{"category": "memory"}"#
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct RecallTool {
    /// Substring to match against descriptions and tags.
    #[serde(default)]
    pub query: Option<String>,

    /// Look back this many days (default: 7).
    #[serde(default = "default_days")]
    pub days: u32,

    /// Maximum entries returned (default: 20).
    #[serde(default = "default_recall_limit")]
    pub limit: u32,
}

impl RecallTool {
    pub async fn call_tool(&self, handler: &MillerServerHandler) -> Result<CallToolResult> {
        let root = workspace_root(handler).await?;
        let memories_dir = root.join(MEMORIES_DIR);

        if !memories_dir.is_dir() {
            return Ok(CallToolResult::text_content(vec![TextContent::from(
                "No journal entries yet.",
            )]));
        }

        let cutoff = Utc::now().timestamp() - (self.days as i64 * 86_400);
        let query = self.query.as_ref().map(|q| q.to_lowercase());

        let mut entries = Vec::new();
        for day in std::fs::read_dir(&memories_dir)? {
            let day = day?;
            if !day.file_type()?.is_dir() || day.file_name() == PLANS_DIR {
                continue;
            }
            for file in std::fs::read_dir(day.path())? {
                let file = file?;
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };
                let Ok(entry) = serde_json::from_str::<MemoryEntry>(&content) else {
                    continue;
                };
                if entry.timestamp < cutoff {
                    continue;
                }
                if let Some(query) = &query {
                    let tags_text = entry.tags.join(" ").to_lowercase();
                    if !entry.description.to_lowercase().contains(query)
                        && !tags_text.contains(query)
                    {
                        continue;
                    }
                }
                entries.push(entry);
            }
        }

        entries.sort_by_key(|e| std::cmp::Reverse(e.timestamp));
        entries.truncate(self.limit as usize);

        if entries.is_empty() {
            return Ok(CallToolResult::text_content(vec![TextContent::from(
                "No matching journal entries.",
            )]));
        }

        let mut lines = vec![format!("Journal entries ({}):", entries.len())];
        for entry in &entries {
            let when = DateTime::from_timestamp(entry.timestamp, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| entry.timestamp.to_string());
            let tags = if entry.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", entry.tags.join(", "))
            };
            lines.push(format!("  {when}{tags} — {}", entry.description));
        }

        Ok(CallToolResult::text_content(vec![TextContent::from(
            lines.join("\n"),
        )]))
    }
}

//***********************//
//   Plan Tool           //
//***********************//

#[mcp_tool(
    name = "plan",
    description = "Manage mutable development plans: save, list, get, or update the status of a plan document.",
    title = "Plan Manager",
    idempotent_hint = false,
    destructive_hint = false,
    open_world_hint = false,
    read_only_hint = false,
    meta = r#"{"category": "memory"}"#
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct PlanTool {
    /// Operation: "save", "list", "get", or "update_status" (default: "list").
    #[serde(default = "default_plan_operation")]
    pub operation: String,

    /// Plan slug (used in the filename). Required for save/get/update_status.
    #[serde(default)]
    pub slug: Option<String>,

    /// Plan title (for "save").
    #[serde(default)]
    pub title: Option<String>,

    /// Plan body in markdown (for "save").
    #[serde(default)]
    pub content: Option<String>,

    /// New status (for "update_status"): "active", "completed", "archived".
    #[serde(default)]
    pub status: Option<String>,
}

fn plan_path(root: &Path, slug: &str) -> PathBuf {
    let safe: String = slug
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    root.join(MEMORIES_DIR)
        .join(PLANS_DIR)
        .join(format!("plan_{safe}.md"))
}

fn render_plan(title: &str, status: &str, content: &str) -> String {
    format!(
        "---\ntitle: {title}\nstatus: {status}\nupdated: {}\n---\n\n{content}\n",
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    )
}

fn parse_plan_header(content: &str) -> (Option<String>, Option<String>) {
    let mut title = None;
    let mut status = None;
    for line in content.lines().take(6) {
        if let Some(value) = line.strip_prefix("title: ") {
            title = Some(value.trim().to_string());
        }
        if let Some(value) = line.strip_prefix("status: ") {
            status = Some(value.trim().to_string());
        }
    }
    (title, status)
}

impl PlanTool {
    pub async fn call_tool(&self, handler: &MillerServerHandler) -> Result<CallToolResult> {
        let root = workspace_root(handler).await?;
        let plans_dir = root.join(MEMORIES_DIR).join(PLANS_DIR);

        let text = match self.operation.as_str() {
            "save" => {
                let slug = self
                    .slug
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("slug is required for save"))?;
                let title = self.title.clone().unwrap_or_else(|| slug.clone());
                let content = self.content.clone().unwrap_or_default();
                std::fs::create_dir_all(&plans_dir)?;
                let path = plan_path(&root, slug);
                std::fs::write(&path, render_plan(&title, "active", &content))?;
                format!("Plan saved: {}", path.strip_prefix(&root).unwrap_or(&path).display())
            }
            "list" => {
                if !plans_dir.is_dir() {
                    "No plans yet.".to_string()
                } else {
                    let mut lines = Vec::new();
                    for entry in std::fs::read_dir(&plans_dir)? {
                        let path = entry?.path();
                        if path.extension().and_then(|e| e.to_str()) != Some("md") {
                            continue;
                        }
                        let content = std::fs::read_to_string(&path).unwrap_or_default();
                        let (title, status) = parse_plan_header(&content);
                        lines.push(format!(
                            "  {} [{}] {}",
                            path.file_stem().unwrap_or_default().to_string_lossy(),
                            status.unwrap_or_else(|| "unknown".into()),
                            title.unwrap_or_default()
                        ));
                    }
                    if lines.is_empty() {
                        "No plans yet.".to_string()
                    } else {
                        lines.sort();
                        format!("Plans ({}):\n{}", lines.len(), lines.join("\n"))
                    }
                }
            }
            "get" => {
                let slug = self
                    .slug
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("slug is required for get"))?;
                let path = plan_path(&root, slug);
                std::fs::read_to_string(&path)
                    .with_context(|| format!("no plan found at {}", path.display()))?
            }
            "update_status" => {
                let slug = self
                    .slug
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("slug is required for update_status"))?;
                let status = self
                    .status
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("status is required for update_status"))?;
                if !matches!(status.as_str(), "active" | "completed" | "archived") {
                    anyhow::bail!("status must be 'active', 'completed', or 'archived'");
                }
                let path = plan_path(&root, slug);
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("no plan found at {}", path.display()))?;
                let updated: Vec<String> = content
                    .lines()
                    .map(|line| {
                        if line.starts_with("status: ") {
                            format!("status: {status}")
                        } else {
                            line.to_string()
                        }
                    })
                    .collect();
                std::fs::write(&path, updated.join("\n"))?;
                format!("Plan '{slug}' status set to {status}.")
            }
            other => anyhow::bail!(
                "Unknown operation: {other}. Valid: 'save', 'list', 'get', 'update_status'"
            ),
        };

        Ok(CallToolResult::text_content(vec![TextContent::from(text)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_paths_are_slug_safe() {
        let root = Path::new("/ws");
        let path = plan_path(root, "auth rework/v2");
        assert_eq!(
            path,
            Path::new("/ws/.memories/plans/plan_auth-rework-v2.md")
        );
    }

    #[test]
    fn plan_header_round_trips() {
        let rendered = render_plan("Auth rework", "active", "Step 1: ...");
        let (title, status) = parse_plan_header(&rendered);
        assert_eq!(title.as_deref(), Some("Auth rework"));
        assert_eq!(status.as_deref(), Some("active"));
    }
}
