//! fast_search: hybrid text + semantic symbol search.

use anyhow::Result;
use rust_mcp_sdk::macros::{mcp_tool, JsonSchema};
use rust_mcp_sdk::schema::{CallToolResult, TextContent};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::handler::MillerServerHandler;
use crate::search::{SearchMethod, SearchOptions, SearchRouter};
use crate::tools::shared::{encode_rows, truncate_signature, OptimizedResponse, OutputFormat};

fn default_method() -> String {
    "auto".to_string()
}

fn default_limit() -> u32 {
    10
}

fn default_output_format() -> String {
    "auto".to_string()
}

#[mcp_tool(
    name = "fast_search",
    description = concat!(
        "Search code across the indexed workspace. Auto-detects the right method: ",
        "code idioms with punctuation (': BaseService', 'ILogger<', '[Fact]') use the ",
        "pattern-preserving index, natural language uses hybrid text + semantic search.\n\n",
        "Results are ranked (exact name matches first), filtered by optional language ",
        "and file patterns, and can be expanded with direct callers/callees."
    ),
    title = "Fast Code Search",
    idempotent_hint = true,
    destructive_hint = false,
    open_world_hint = false,
    read_only_hint = true,
    meta = r#"{"category": "search", "performance": "fast"}"#
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct FastSearchTool {
    /// Search query: symbol names, natural language, or code patterns.
    /// Examples: "UserService", "authentication logic", ": BaseService"
    pub query: String,

    /// Search method (default: "auto").
    /// Options: "auto", "text", "pattern", "semantic", "hybrid"
    #[serde(default = "default_method")]
    pub method: String,

    /// Maximum results (default: 10, clamped to 1000).
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Filter by language, case-insensitive (e.g. "python", "typescript").
    #[serde(default)]
    pub language: Option<String>,

    /// Filter by file glob against workspace-relative paths (e.g. "src/**/*.ts").
    #[serde(default)]
    pub file_pattern: Option<String>,

    /// Include direct callers/callees for each result (default: false).
    #[serde(default)]
    pub expand: bool,

    /// Re-rank top results with the external cross-encoder when available
    /// (default: false).
    #[serde(default)]
    pub rerank: bool,

    /// Output format: "json", "text", "compact", or "auto" (default).
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Workspace to query (default: "primary"). This server instance serves
    /// the primary workspace.
    #[serde(default)]
    pub workspace: Option<String>,
}

impl FastSearchTool {
    pub async fn call_tool(&self, handler: &MillerServerHandler) -> Result<CallToolResult> {
        handler.ensure_workspace().await?;

        let method: SearchMethod = self
            .method
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        let output_format: OutputFormat = self
            .output_format
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let guard = handler.workspace.read().await;
        let workspace = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("workspace not initialized"))?;

        let options = SearchOptions {
            method,
            limit: self.limit as usize,
            language: self.language.clone(),
            file_pattern: self.file_pattern.clone(),
            expand: self.expand,
            deadline_ms: None,
        };

        // No cross-encoder ships in-process; the hook stays wired for
        // deployments that configure one.
        let reranker: Option<&dyn crate::search::Reranker> = None;
        if self.rerank && reranker.is_none() {
            debug!("rerank requested but no cross-encoder is configured; keeping router order");
        }

        let outcome = {
            let store = workspace.vector_store.read().unwrap();
            let db = workspace.db.lock().unwrap();
            SearchRouter::search(
                &store,
                &db,
                workspace.embedder.as_ref(),
                reranker,
                &self.query,
                &options,
            )
        };

        debug!(
            "fast_search '{}' -> {} hits via {}",
            self.query,
            outcome.hits.len(),
            outcome.method_used
        );

        let text = match output_format {
            OutputFormat::Text => self.render_text(&outcome),
            format => {
                if matches!(format, OutputFormat::Json) || outcome.expansions.is_some() {
                    let confidence = outcome.hits.first().map(|h| h.score).unwrap_or(0.0);
                    let mut response = OptimizedResponse::new(outcome.hits.clone(), confidence);
                    if outcome.semantic_fallback {
                        response = response
                            .with_insights("text search was weak; semantic results shown".into());
                    }
                    serde_json::to_string_pretty(&serde_json::json!({
                        "response": response,
                        "method_used": outcome.method_used,
                        "semantic_fallback": outcome.semantic_fallback,
                        "expansions": outcome.expansions,
                    }))?
                } else {
                    encode_rows(&outcome.hits, format)
                }
            }
        };

        Ok(CallToolResult::text_content(vec![TextContent::from(text)]))
    }

    fn render_text(&self, outcome: &crate::search::SearchOutcome) -> String {
        if outcome.hits.is_empty() {
            return format!("No results for \"{}\".", self.query);
        }

        let mut lines = vec![format!(
            "Results for \"{}\" ({}{}):",
            self.query,
            outcome.method_used,
            if outcome.semantic_fallback {
                ", semantic fallback"
            } else {
                ""
            }
        )];

        for hit in &outcome.hits {
            let signature = hit
                .signature
                .as_deref()
                .map(|s| truncate_signature(s, 60))
                .unwrap_or_else(|| format!("{} {}", hit.kind, hit.name));
            lines.push(format!(
                "  {:.2} {}:{} → {}",
                hit.score, hit.file_path, hit.start_line, signature
            ));

            if let Some(expansions) = &outcome.expansions {
                if let Some(expansion) = expansions.get(&hit.id) {
                    if !expansion.callers.is_empty() {
                        let names: Vec<&str> =
                            expansion.callers.iter().map(|c| c.name.as_str()).collect();
                        lines.push(format!(
                            "       callers ({}): {}",
                            expansion.total_callers,
                            names.join(", ")
                        ));
                    }
                    if !expansion.callees.is_empty() {
                        let names: Vec<&str> =
                            expansion.callees.iter().map(|c| c.name.as_str()).collect();
                        lines.push(format!(
                            "       callees ({}): {}",
                            expansion.total_callees,
                            names.join(", ")
                        ));
                    }
                }
            }
        }

        lines.join("\n")
    }
}
