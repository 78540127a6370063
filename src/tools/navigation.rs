//! Navigation tools: fast_goto, fast_refs, fast_lookup.

use anyhow::Result;
use rust_mcp_sdk::macros::{mcp_tool, JsonSchema};
use rust_mcp_sdk::schema::{CallToolResult, TextContent};
use serde::{Deserialize, Serialize};

use crate::extractors::IdentifierKind;
use crate::handler::MillerServerHandler;
use crate::search::{SearchMethod, SearchOptions, SearchRouter};
use crate::tools::shared::{encode_rows, OutputFormat};

fn default_output_format() -> String {
    "auto".to_string()
}

fn default_refs_limit() -> u32 {
    100
}

//***********************//
//   Fast Goto Tool      //
//***********************//

#[mcp_tool(
    name = "fast_goto",
    description = concat!(
        "Jump to a symbol's definition. Definitions win over imports, and an ",
        "optional context file disambiguates same-named symbols."
    ),
    title = "Go To Definition",
    idempotent_hint = true,
    destructive_hint = false,
    open_world_hint = false,
    read_only_hint = true,
    meta = r#"{"category": "navigation", "performance": "fast"}"#
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct FastGotoTool {
    /// Symbol name to resolve. Example: "UserService"
    pub symbol_name: String,

    /// Optional file path to disambiguate same-named symbols.
    #[serde(default)]
    pub context_file: Option<String>,

    /// Output format: "json", "text", "compact", or "auto" (default).
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Workspace to query (default: "primary"). This server instance serves
    /// the primary workspace.
    #[serde(default)]
    pub workspace: Option<String>,
}

#[derive(Debug, Serialize)]
struct GotoLocation {
    name: String,
    kind: String,
    language: String,
    file_path: String,
    start_line: u32,
    end_line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

impl FastGotoTool {
    pub async fn call_tool(&self, handler: &MillerServerHandler) -> Result<CallToolResult> {
        handler.ensure_workspace().await?;
        let output_format: OutputFormat = self
            .output_format
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let guard = handler.workspace.read().await;
        let workspace = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("workspace not initialized"))?;

        let symbol = {
            let db = workspace.db.lock().unwrap();
            db.get_symbol_by_name(&self.symbol_name, self.context_file.as_deref())
                .map_err(|e| anyhow::anyhow!("{e}"))?
        };

        let text = match symbol {
            None => format!("Symbol '{}' not found.", self.symbol_name),
            Some(symbol) => {
                let location = GotoLocation {
                    name: symbol.name.clone(),
                    kind: symbol.kind.to_string(),
                    language: symbol.language.clone(),
                    file_path: symbol.file_path.clone(),
                    start_line: symbol.start_line,
                    end_line: symbol.end_line,
                    signature: symbol.signature.clone(),
                };
                match output_format {
                    OutputFormat::Text => format!(
                        "{} ({}) @ {}:{}",
                        location.name, location.kind, location.file_path, location.start_line
                    ),
                    format => encode_rows(&[location], format),
                }
            }
        };

        Ok(CallToolResult::text_content(vec![TextContent::from(text)]))
    }
}

//***********************//
//   Fast Refs Tool      //
//***********************//

#[mcp_tool(
    name = "fast_refs",
    description = concat!(
        "Find all references to a symbol, grouped by file, with read/write ",
        "access flags derived from the referencing lines."
    ),
    title = "Find References",
    idempotent_hint = true,
    destructive_hint = false,
    open_world_hint = false,
    read_only_hint = true,
    meta = r#"{"category": "navigation", "performance": "fast"}"#
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct FastRefsTool {
    /// Symbol name to find references for.
    pub symbol_name: String,

    /// Optional reference kind filter: "call", "reference", "import",
    /// "type_ref", "member_access".
    #[serde(default)]
    pub kind_filter: Option<String>,

    /// Include the referencing source line with each hit (default: false).
    #[serde(default)]
    pub include_context: bool,

    /// Maximum references (default: 100).
    #[serde(default = "default_refs_limit")]
    pub limit: u32,

    /// Output format: "json", "text", "compact", or "auto" (default).
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Workspace to query (default: "primary"). This server instance serves
    /// the primary workspace.
    #[serde(default)]
    pub workspace: Option<String>,
}

impl FastRefsTool {
    pub async fn call_tool(&self, handler: &MillerServerHandler) -> Result<CallToolResult> {
        handler.ensure_workspace().await?;
        let output_format: OutputFormat = self
            .output_format
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let kind_filter = match &self.kind_filter {
            Some(kind) => Some(
                kind.parse::<IdentifierKind>()
                    .map_err(|e| anyhow::anyhow!(e))?,
            ),
            None => None,
        };

        let guard = handler.workspace.read().await;
        let workspace = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("workspace not initialized"))?;

        let grouped = {
            let db = workspace.db.lock().unwrap();
            db.find_references(
                &self.symbol_name,
                kind_filter,
                self.limit as usize,
                Some(&workspace.root),
                self.include_context,
            )
            .map_err(|e| anyhow::anyhow!("{e}"))?
        };

        let text = if grouped.is_empty() {
            format!("No references to '{}' found.", self.symbol_name)
        } else {
            match output_format {
                OutputFormat::Text | OutputFormat::Auto => {
                    let total: usize = grouped.iter().map(|g| g.references.len()).sum();
                    let mut lines =
                        vec![format!("References to '{}' ({}):", self.symbol_name, total)];
                    for group in &grouped {
                        lines.push(format!(
                            "  {} ({}):",
                            group.file_path,
                            group.references.len()
                        ));
                        for hit in &group.references {
                            let flag = match hit.access {
                                crate::database::AccessKind::Read => "[R]",
                                crate::database::AccessKind::Write => "[W]",
                                crate::database::AccessKind::Unknown => "[?]",
                            };
                            let context = hit
                                .context
                                .as_deref()
                                .map(|c| format!("  {c}"))
                                .unwrap_or_default();
                            lines.push(format!("    {flag} line {}{}", hit.line, context));
                        }
                    }
                    lines.join("\n")
                }
                format => encode_rows(&grouped, format),
            }
        };

        Ok(CallToolResult::text_content(vec![TextContent::from(text)]))
    }
}

//***********************//
//   Fast Lookup Tool    //
//***********************//

#[mcp_tool(
    name = "fast_lookup",
    description = concat!(
        "Resolve several symbol names at once. Names that miss exact ",
        "resolution fall back to semantic search, annotated as such."
    ),
    title = "Batch Symbol Lookup",
    idempotent_hint = true,
    destructive_hint = false,
    open_world_hint = false,
    read_only_hint = true,
    meta = r#"{"category": "navigation", "performance": "fast"}"#
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct FastLookupTool {
    /// Symbol names to resolve.
    pub symbol_names: Vec<String>,

    /// Optional file path to disambiguate.
    #[serde(default)]
    pub context_file: Option<String>,

    /// Include the symbol's source body (default: false).
    #[serde(default)]
    pub include_body: bool,

    /// Containment depth: 1 returns just the symbol, higher values also list
    /// contained child symbols (default: 1).
    #[serde(default = "default_lookup_depth")]
    pub max_depth: u32,

    /// Output format: "json", "text", "compact", or "auto" (default).
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Workspace to query (default: "primary"). This server instance serves
    /// the primary workspace.
    #[serde(default)]
    pub workspace: Option<String>,
}

fn default_lookup_depth() -> u32 {
    1
}

#[derive(Debug, Serialize)]
struct LookupResult {
    query: String,
    resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    /// True when the answer came from the semantic fallback.
    semantic_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    /// Contained child symbol names when max_depth > 1.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<String>,
}

impl FastLookupTool {
    pub async fn call_tool(&self, handler: &MillerServerHandler) -> Result<CallToolResult> {
        handler.ensure_workspace().await?;
        let output_format: OutputFormat = self
            .output_format
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let guard = handler.workspace.read().await;
        let workspace = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("workspace not initialized"))?;

        let mut results = Vec::with_capacity(self.symbol_names.len());
        for name in &self.symbol_names {
            let exact = {
                let db = workspace.db.lock().unwrap();
                db.get_symbol_by_name(name, self.context_file.as_deref())
                    .map_err(|e| anyhow::anyhow!("{e}"))?
            };

            let (symbol, semantic_fallback) = match exact {
                Some(symbol) => (Some(symbol), false),
                None => {
                    // Semantic fallback: best vector match for the name.
                    let store = workspace.vector_store.read().unwrap();
                    let db = workspace.db.lock().unwrap();
                    let outcome = SearchRouter::search(
                        &store,
                        &db,
                        workspace.embedder.as_ref(),
                        None,
                        name,
                        &SearchOptions {
                            method: SearchMethod::Semantic,
                            limit: 1,
                            ..Default::default()
                        },
                    );
                    let resolved = outcome
                        .hits
                        .first()
                        .and_then(|hit| db.get_symbol_by_id(&hit.id).ok().flatten());
                    (resolved, true)
                }
            };

            let body = match (&symbol, self.include_body) {
                (Some(symbol), true) => read_body(&workspace.root, symbol),
                _ => None,
            };

            let children = match &symbol {
                Some(symbol) if self.max_depth > 1 => {
                    let db = workspace.db.lock().unwrap();
                    db.get_child_symbols(&symbol.id)
                        .map_err(|e| anyhow::anyhow!("{e}"))?
                        .into_iter()
                        .map(|child| child.name)
                        .collect()
                }
                _ => Vec::new(),
            };

            results.push(match symbol {
                Some(symbol) => LookupResult {
                    query: name.clone(),
                    resolved: true,
                    name: Some(symbol.name.clone()),
                    kind: Some(symbol.kind.to_string()),
                    file_path: Some(symbol.file_path.clone()),
                    start_line: Some(symbol.start_line),
                    signature: symbol.signature.clone(),
                    semantic_fallback,
                    body,
                    children,
                },
                None => LookupResult {
                    query: name.clone(),
                    resolved: false,
                    name: None,
                    kind: None,
                    file_path: None,
                    start_line: None,
                    signature: None,
                    semantic_fallback,
                    body: None,
                    children: Vec::new(),
                },
            });
        }

        let text = match output_format {
            OutputFormat::Text => {
                let mut lines = Vec::new();
                for result in &results {
                    if result.resolved {
                        lines.push(format!(
                            "{} → {}:{}{}",
                            result.query,
                            result.file_path.as_deref().unwrap_or("?"),
                            result.start_line.unwrap_or(0),
                            if result.semantic_fallback {
                                " (semantic)"
                            } else {
                                ""
                            }
                        ));
                    } else {
                        lines.push(format!("{} → not found", result.query));
                    }
                }
                lines.join("\n")
            }
            format => encode_rows(&results, format),
        };

        Ok(CallToolResult::text_content(vec![TextContent::from(text)]))
    }
}

/// Slice the symbol's byte range out of the source file.
fn read_body(root: &std::path::Path, symbol: &crate::extractors::Symbol) -> Option<String> {
    let content = std::fs::read_to_string(root.join(&symbol.file_path)).ok()?;
    let start = symbol.start_byte as usize;
    let end = (symbol.end_byte as usize).min(content.len());
    if start >= end {
        return None;
    }
    content.get(start..end).map(|s| s.to_string())
}
