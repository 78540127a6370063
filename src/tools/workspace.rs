//! manage_workspace: registration, indexing, health, and cleanup.

use anyhow::Result;
use rust_mcp_sdk::macros::{mcp_tool, JsonSchema};
use rust_mcp_sdk::schema::{CallToolResult, TextContent};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::handler::MillerServerHandler;
use crate::workspace::{WorkspaceRegistry, WorkspaceType};

fn default_operation() -> String {
    "health".to_string()
}

#[mcp_tool(
    name = "manage_workspace",
    description = concat!(
        "Workspace lifecycle operations:\n",
        "- 'add': register another project directory\n",
        "- 'list': show registered workspaces\n",
        "- 'refresh': re-index (hash-gated; only changed files are touched)\n",
        "- 'clean': prune orphaned index rows and dead registry entries\n",
        "- 'health': store/watcher status and row counts\n",
        "- 'remove': deregister a workspace and delete its index data"
    ),
    title = "Workspace Manager",
    idempotent_hint = false,
    destructive_hint = true,
    open_world_hint = false,
    read_only_hint = false,
    meta = r#"{"category": "workspace"}"#
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ManageWorkspaceTool {
    /// Operation: "add", "list", "refresh", "clean", "health", or "remove"
    /// (default: "health").
    #[serde(default = "default_operation")]
    pub operation: String,

    /// Directory path (for "add").
    #[serde(default)]
    pub path: Option<String>,

    /// Display name (for "add"; defaults to the directory name).
    #[serde(default)]
    pub name: Option<String>,

    /// Workspace id (for "remove").
    #[serde(default)]
    pub workspace_id: Option<String>,
}

impl ManageWorkspaceTool {
    pub async fn call_tool(&self, handler: &MillerServerHandler) -> Result<CallToolResult> {
        handler.ensure_workspace().await?;

        let text = match self.operation.as_str() {
            "health" => self.health(handler).await?,
            "list" => self.list(handler).await?,
            "add" => self.add(handler).await?,
            "refresh" => self.refresh(handler).await?,
            "clean" => self.clean(handler).await?,
            "remove" => self.remove(handler).await?,
            other => anyhow::bail!(
                "Unknown operation: {other}. Valid: 'add', 'list', 'refresh', 'clean', \
                 'health', 'remove'"
            ),
        };

        Ok(CallToolResult::text_content(vec![TextContent::from(text)]))
    }

    async fn health(&self, handler: &MillerServerHandler) -> Result<String> {
        let guard = handler.workspace.read().await;
        let workspace = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("workspace not initialized"))?;
        let health = workspace.health()?;
        Ok(serde_json::to_string_pretty(&health)?)
    }

    async fn list(&self, handler: &MillerServerHandler) -> Result<String> {
        let guard = handler.workspace.read().await;
        let workspace = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("workspace not initialized"))?;
        let registry = WorkspaceRegistry::load(&workspace.miller_dir)?;

        let entries = registry.list();
        if entries.is_empty() {
            return Ok("No workspaces registered.".to_string());
        }
        let mut lines = vec![format!("Registered workspaces ({}):", entries.len())];
        for (id, entry) in entries {
            lines.push(format!(
                "  {id} [{}] {} → {}",
                entry.workspace_type, entry.name, entry.path
            ));
        }
        Ok(lines.join("\n"))
    }

    async fn add(&self, handler: &MillerServerHandler) -> Result<String> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("path is required for add"))?;
        let expanded = shellexpand::tilde(path).to_string();
        let path = std::path::PathBuf::from(expanded);
        if !path.is_dir() {
            anyhow::bail!("path does not exist or is not a directory: {}", path.display());
        }

        let guard = handler.workspace.read().await;
        let workspace = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("workspace not initialized"))?;

        let name = self.name.clone().unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "workspace".to_string())
        });

        let mut registry = WorkspaceRegistry::load(&workspace.miller_dir)?;
        let id = registry.register(&path, &name, WorkspaceType::Reference)?;
        Ok(format!("Registered workspace '{name}' as {id}."))
    }

    async fn refresh(&self, handler: &MillerServerHandler) -> Result<String> {
        let indexer = {
            let guard = handler.workspace.read().await;
            let workspace = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("workspace not initialized"))?;
            workspace.indexer()
        };

        let stats = tokio::task::spawn_blocking(move || indexer.index_workspace())
            .await
            .map_err(|e| anyhow::anyhow!("indexing task failed: {e}"))??;

        info!(
            "Refresh complete: {} indexed, {} skipped",
            stats.files_indexed, stats.files_skipped
        );
        Ok(format!(
            "Refresh complete: {} files indexed, {} unchanged (skipped), {} symbols, {}ms.",
            stats.files_indexed, stats.files_skipped, stats.symbols_indexed, stats.duration_ms
        ))
    }

    async fn clean(&self, handler: &MillerServerHandler) -> Result<String> {
        let guard = handler.workspace.read().await;
        let workspace = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("workspace not initialized"))?;

        // Index rows whose files vanished from disk.
        let stale_paths: Vec<String> = {
            let db = workspace.db.lock().unwrap();
            db.list_files()
                .map_err(|e| anyhow::anyhow!("{e}"))?
                .into_iter()
                .filter(|file| !workspace.root.join(&file.path).exists())
                .map(|file| file.path)
                .collect()
        };

        for path in &stale_paths {
            let db = workspace.db.lock().unwrap();
            db.delete_file(path).map_err(|e| anyhow::anyhow!("{e}"))?;
        }
        if !stale_paths.is_empty() {
            let mut store = workspace.vector_store.write().unwrap();
            store.delete_files_batch(&stale_paths)?;
            store.rebuild_indexes()?;
            let db = workspace.db.lock().unwrap();
            db.mark_reachability_stale()
                .map_err(|e| anyhow::anyhow!("{e}"))?;
        }

        // Registry entries pointing nowhere.
        let mut registry = WorkspaceRegistry::load(&workspace.miller_dir)?;
        let pruned = registry.prune_missing()?;

        Ok(format!(
            "Clean complete: {} orphaned file(s) removed from the index, {} dead registry \
             entr{} pruned.",
            stale_paths.len(),
            pruned.len(),
            if pruned.len() == 1 { "y" } else { "ies" }
        ))
    }

    async fn remove(&self, handler: &MillerServerHandler) -> Result<String> {
        let workspace_id = self
            .workspace_id
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("workspace_id is required for remove"))?;

        let guard = handler.workspace.read().await;
        let workspace = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("workspace not initialized"))?;

        if *workspace_id == workspace.workspace_id {
            anyhow::bail!("refusing to remove the primary workspace while it is in use");
        }

        let mut registry = WorkspaceRegistry::load(&workspace.miller_dir)?;
        let removed = registry.remove(workspace_id)?;

        // Index data for that workspace lives under .miller/<id>.
        let data_dir = workspace.miller_dir.join(workspace_id);
        if data_dir.is_dir() {
            std::fs::remove_dir_all(&data_dir)?;
        }

        match removed {
            Some(entry) => Ok(format!(
                "Removed workspace '{}' ({workspace_id}) and its index data.",
                entry.name
            )),
            None => Ok(format!(
                "Workspace {workspace_id} was not registered; index data cleaned if present."
            )),
        }
    }
}
