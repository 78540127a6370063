// Miller's MCP request handler: tool registration, dispatch, and workspace
// lifecycle (lazy initialization, background indexing, watcher wiring).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_mcp_sdk::schema::{
    schema_utils::CallToolError, CallToolRequest, CallToolResult, ListToolsRequest,
    ListToolsResult, RpcError,
};
use rust_mcp_sdk::{mcp_server::ServerHandler, McpServer};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::tools::MillerTools;
use crate::workspace::MillerWorkspace;

/// Miller's custom handler for MCP messages.
///
/// Owns the (lazily initialized) workspace singletons and routes tool calls.
pub struct MillerServerHandler {
    /// Workspace managing persistent storage; None until first use.
    pub workspace: Arc<RwLock<Option<MillerWorkspace>>>,
    watch_task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl MillerServerHandler {
    pub async fn new() -> Result<Self> {
        Ok(Self {
            workspace: Arc::new(RwLock::new(None)),
            watch_task: std::sync::Mutex::new(None),
        })
    }

    /// Handler sharing already-created workspace state. The SDK consumes one
    /// handler by value while shutdown and background indexing need their
    /// own; all of them point at the same workspace.
    pub fn with_shared_workspace(workspace: Arc<RwLock<Option<MillerWorkspace>>>) -> Self {
        Self {
            workspace,
            watch_task: std::sync::Mutex::new(None),
        }
    }

    /// Resolve the workspace root: explicit argument, then the
    /// `MILLER_WORKSPACE` environment variable, then the current directory.
    fn resolve_root(root: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(root) = root {
            return Ok(root);
        }
        if let Ok(env_root) = std::env::var("MILLER_WORKSPACE") {
            let expanded = shellexpand::tilde(&env_root).to_string();
            let path = PathBuf::from(expanded);
            if path.exists() {
                return Ok(path);
            }
            warn!("MILLER_WORKSPACE points at a missing path: {}", env_root);
        }
        std::env::current_dir().map_err(|e| anyhow!("cannot determine working directory: {e}"))
    }

    /// Initialize the workspace once; later calls are no-ops.
    pub async fn initialize_workspace(&self, root: Option<PathBuf>) -> Result<()> {
        {
            let guard = self.workspace.read().await;
            if guard.is_some() {
                return Ok(());
            }
        }

        let root = Self::resolve_root(root)?;
        let workspace = tokio::task::spawn_blocking(move || MillerWorkspace::initialize(root))
            .await
            .map_err(|e| anyhow!("workspace initialization task failed: {e}"))??;

        let mut guard = self.workspace.write().await;
        if guard.is_none() {
            *guard = Some(workspace);
        }
        Ok(())
    }

    /// Ensure the workspace exists for operations that need it.
    pub async fn ensure_workspace(&self) -> Result<()> {
        self.initialize_workspace(None).await
    }

    /// Run the initial index in the background and wire up the watcher.
    /// Called after the MCP handshake so startup never blocks the client.
    pub fn spawn_startup_indexing(handler: Arc<Self>) {
        tokio::spawn(async move {
            if let Err(e) = handler.ensure_workspace().await {
                error!("Workspace initialization failed: {}", e);
                return;
            }

            // Full (hash-gated) pass.
            let index_result = {
                let guard = handler.workspace.read().await;
                let Some(workspace) = guard.as_ref() else {
                    return;
                };
                let indexer = workspace.indexer();
                tokio::task::spawn_blocking(move || indexer.index_workspace()).await
            };
            match index_result {
                Ok(Ok(stats)) => info!(
                    "Startup indexing complete: {} files, {} symbols",
                    stats.files_indexed, stats.symbols_indexed
                ),
                Ok(Err(e)) => error!("Startup indexing failed: {}", e),
                Err(e) => error!("Startup indexing task panicked: {}", e),
            }

            if let Err(e) = handler.start_watching().await {
                warn!("File watcher not started: {}", e);
            }
        });
    }

    /// Start the incremental watcher and the task that feeds its batches to
    /// the indexer.
    pub async fn start_watching(&self) -> Result<()> {
        let mut rx = {
            let mut guard = self.workspace.write().await;
            let workspace = guard
                .as_mut()
                .ok_or_else(|| anyhow!("workspace not initialized"))?;
            if !workspace.config.incremental_updates {
                debug!("Incremental updates disabled by configuration");
                return Ok(());
            }
            workspace.start_watcher()?
        };

        let workspace = self.workspace.clone();
        let task = tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                let guard = workspace.read().await;
                let Some(ws) = guard.as_ref() else { break };
                let Some(watcher) = ws.watcher() else { continue };
                let indexer = ws.indexer();
                match tokio::task::block_in_place(|| indexer.apply_watch_batch(batch, watcher)) {
                    Ok(stats) => debug!(
                        "Watch batch applied: {} indexed, {} deleted",
                        stats.files_indexed, stats.files_deleted
                    ),
                    Err(e) => error!("Watch batch failed: {}", e),
                }
            }
        });
        *self.watch_task.lock().unwrap() = Some(task);
        info!("Incremental watcher running");
        Ok(())
    }

    /// Tear everything down in one step.
    pub async fn shutdown(&self) {
        if let Some(task) = self.watch_task.lock().unwrap().take() {
            task.abort();
        }
        let mut guard = self.workspace.write().await;
        if let Some(workspace) = guard.as_mut() {
            workspace.shutdown();
        }
        *guard = None;
    }
}

#[async_trait]
impl ServerHandler for MillerServerHandler {
    async fn handle_list_tools_request(
        &self,
        _request: ListToolsRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<ListToolsResult, RpcError> {
        debug!("Listing available Miller tools");
        let tools = MillerTools::tools();
        Ok(ListToolsResult {
            meta: None,
            next_cursor: None,
            tools,
        })
    }

    async fn handle_call_tool_request(
        &self,
        request: CallToolRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<CallToolResult, CallToolError> {
        debug!("Executing tool: {}", request.params.name);

        // Malformed arguments surface as a tool error, never a crash.
        let tool_params: MillerTools = MillerTools::try_from(request.params).map_err(|e| {
            error!("Failed to parse tool parameters: {}", e);
            CallToolError::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Invalid tool parameters: {e}"),
            ))
        })?;

        let result = match &tool_params {
            MillerTools::ManageWorkspaceTool(tool) => {
                info!("Managing workspace: {}", tool.operation);
                tool.call_tool(self).await
            }
            MillerTools::FastSearchTool(tool) => tool.call_tool(self).await,
            MillerTools::FastGotoTool(tool) => tool.call_tool(self).await,
            MillerTools::FastRefsTool(tool) => tool.call_tool(self).await,
            MillerTools::FastLookupTool(tool) => tool.call_tool(self).await,
            MillerTools::GetSymbolsTool(tool) => tool.call_tool(self).await,
            MillerTools::TraceCallPathTool(tool) => tool.call_tool(self).await,
            MillerTools::GetArchitectureMapTool(tool) => tool.call_tool(self).await,
            MillerTools::ValidateImportsTool(tool) => tool.call_tool(self).await,
            MillerTools::FastExploreTool(tool) => tool.call_tool(self).await,
            MillerTools::CheckpointTool(tool) => tool.call_tool(self).await,
            MillerTools::RecallTool(tool) => tool.call_tool(self).await,
            MillerTools::PlanTool(tool) => tool.call_tool(self).await,
        };

        match result {
            Ok(call_result) => Ok(call_result),
            Err(e) => {
                error!("Tool execution failed: {}", e);
                Err(CallToolError::new(std::io::Error::other(format!(
                    "Tool execution failed: {e}"
                ))))
            }
        }
    }
}
