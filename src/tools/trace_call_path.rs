//! trace_call_path: cross-language execution tracing.

use anyhow::Result;
use rust_mcp_sdk::macros::{mcp_tool, JsonSchema};
use rust_mcp_sdk::schema::{CallToolResult, TextContent};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::handler::MillerServerHandler;
use crate::trace::{format_as_tree, TraceEngine, TraceError, TraceOptions, DEFAULT_MAX_DEPTH};

fn default_direction() -> String {
    "downstream".to_string()
}

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

fn default_output_format() -> String {
    "json".to_string()
}

#[mcp_tool(
    name = "trace_call_path",
    description = concat!(
        "Trace execution flow across language boundaries. Combines direct ",
        "relationship edges, naming-convention variants (UserService <-> ",
        "user_service <-> user_services), and optional semantic similarity to ",
        "follow calls through polyglot codebases.\n\n",
        "Directions: 'downstream' (callees), 'upstream' (callers), 'both'."
    ),
    title = "Cross-Language Call Path Tracer",
    idempotent_hint = true,
    destructive_hint = false,
    open_world_hint = false,
    read_only_hint = true,
    meta = r#"{"category": "navigation", "performance": "fast"}"#
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct TraceCallPathTool {
    /// Symbol to start tracing from. Example: "processPayment"
    pub symbol_name: String,

    /// Trace direction: "downstream" (default), "upstream", or "both".
    #[serde(default = "default_direction")]
    pub direction: String,

    /// Maximum levels to trace (default: 3, range: 1-10).
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Optional file path to disambiguate same-named symbols.
    #[serde(default)]
    pub context_file: Option<String>,

    /// Enable the semantic similarity step (cosine >= 0.7, cross-language
    /// only). Default: false.
    #[serde(default)]
    pub enable_semantic: bool,

    /// Output format: "json" (default) or "tree" (ASCII diagram).
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Workspace to query (default: "primary"). This server instance serves
    /// the primary workspace.
    #[serde(default)]
    pub workspace: Option<String>,
}

impl TraceCallPathTool {
    pub async fn call_tool(&self, handler: &MillerServerHandler) -> Result<CallToolResult> {
        handler.ensure_workspace().await?;
        info!(
            "Tracing call path: {} (direction: {}, depth: {}, semantic: {})",
            self.symbol_name, self.direction, self.max_depth, self.enable_semantic
        );

        let direction = self
            .direction
            .parse()
            .map_err(|e: TraceError| anyhow::anyhow!(e.to_string()))?;

        let guard = handler.workspace.read().await;
        let workspace = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("workspace not initialized"))?;

        let options = TraceOptions {
            symbol_name: self.symbol_name.clone(),
            direction,
            max_depth: self.max_depth,
            context_file: self.context_file.clone(),
            enable_semantic: self.enable_semantic,
            deadline_ms: None,
        };

        let path = {
            let store = workspace.vector_store.read().unwrap();
            let db = workspace.db.lock().unwrap();
            let engine = if self.enable_semantic {
                TraceEngine::new(&db, Some(&store), Some(workspace.embedder.as_ref()))
            } else {
                TraceEngine::new(&db, None, None)
            };
            engine
                .trace(&options)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?
        };

        let text = if self.output_format == "tree" {
            match &path.root {
                Some(root) => {
                    let mut out = format_as_tree(root);
                    out.push_str(&format!(
                        "\n{} nodes, {} languages, depth {}{}",
                        path.total_nodes,
                        path.languages_found.len(),
                        path.max_depth_reached,
                        if path.truncated { " (truncated)" } else { "" }
                    ));
                    out
                }
                None => path
                    .error
                    .clone()
                    .unwrap_or_else(|| "No trace available.".to_string()),
            }
        } else {
            serde_json::to_string_pretty(&path)?
        };

        Ok(CallToolResult::text_content(vec![TextContent::from(text)]))
    }
}
