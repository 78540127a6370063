//! get_symbols: hierarchical file outline without reading full content.

use anyhow::Result;
use rust_mcp_sdk::macros::{mcp_tool, JsonSchema};
use rust_mcp_sdk::schema::{CallToolResult, TextContent};
use serde::{Deserialize, Serialize};

use crate::extractors::Symbol;
use crate::handler::MillerServerHandler;
use crate::tools::shared::{truncate_signature, OutputFormat};

fn default_mode() -> String {
    "structure".to_string()
}

fn default_max_depth() -> u32 {
    2
}

fn default_output_format() -> String {
    "auto".to_string()
}

#[mcp_tool(
    name = "get_symbols",
    description = concat!(
        "Outline a file's symbols as a containment hierarchy. Modes: ",
        "'structure' (names only), 'minimal' (+signatures), 'full' ",
        "(+doc comments and bodies). A target filter narrows to matching ",
        "symbols ranked by relevance."
    ),
    title = "File Symbol Outline",
    idempotent_hint = true,
    destructive_hint = false,
    open_world_hint = false,
    read_only_hint = true,
    meta = r#"{"category": "navigation", "performance": "fast"}"#
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct GetSymbolsTool {
    /// Workspace-relative file path. Example: "src/models.py"
    pub file_path: String,

    /// Detail mode: "structure", "minimal", or "full" (default: "structure").
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Containment depth to include (default: 2).
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Only include symbols matching this name (with relevance ranking).
    #[serde(default)]
    pub target: Option<String>,

    /// Maximum symbols returned.
    #[serde(default)]
    pub limit: Option<u32>,

    /// Output format: "json", "text", "compact", or "auto" (default).
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Workspace to query (default: "primary"). This server instance serves
    /// the primary workspace.
    #[serde(default)]
    pub workspace: Option<String>,
}

#[derive(Debug, Serialize)]
struct SymbolNode {
    name: String,
    kind: String,
    start_line: u32,
    end_line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    doc_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    relevance: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<SymbolNode>,
}

/// Relevance of a symbol name against the target filter. The constants are
/// tunable heuristics, not contracts.
fn target_relevance(name: &str, target: &str) -> f32 {
    let name_lower = name.to_lowercase();
    let target_lower = target.to_lowercase();
    if name_lower == target_lower {
        1.0
    } else if name_lower.starts_with(&target_lower) {
        0.8
    } else if name_lower.contains(&target_lower) {
        0.6
    } else {
        let target_words: Vec<String> = crate::utils::naming_variants::parse_symbol_words(target)
            .into_iter()
            .map(|w| w.to_lowercase())
            .collect();
        let name_words: Vec<String> = crate::utils::naming_variants::parse_symbol_words(name)
            .into_iter()
            .map(|w| w.to_lowercase())
            .collect();
        let overlap = target_words
            .iter()
            .filter(|w| name_words.contains(w))
            .count();
        if overlap > 0 && !target_words.is_empty() {
            0.4 * (overlap as f32 / target_words.len() as f32)
        } else {
            0.0
        }
    }
}

impl GetSymbolsTool {
    pub async fn call_tool(&self, handler: &MillerServerHandler) -> Result<CallToolResult> {
        handler.ensure_workspace().await?;

        if !matches!(self.mode.as_str(), "structure" | "minimal" | "full") {
            anyhow::bail!(
                "mode must be 'structure', 'minimal', or 'full', got '{}'",
                self.mode
            );
        }
        let output_format: OutputFormat = self
            .output_format
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let guard = handler.workspace.read().await;
        let workspace = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("workspace not initialized"))?;

        let symbols = {
            let db = workspace.db.lock().unwrap();
            db.get_symbols_for_file(&self.file_path)
                .map_err(|e| anyhow::anyhow!("{e}"))?
        };

        if symbols.is_empty() {
            return Ok(CallToolResult::text_content(vec![TextContent::from(
                format!("No symbols found in '{}'.", self.file_path),
            )]));
        }

        let source = if self.mode == "full" {
            std::fs::read_to_string(workspace.root.join(&self.file_path)).ok()
        } else {
            None
        };

        let mut roots = self.build_tree(&symbols, source.as_deref());

        if let Some(target) = &self.target {
            let mut flat = Vec::new();
            flatten_matching(&mut roots, target, &mut flat);
            flat.sort_by(|a, b| {
                b.relevance
                    .partial_cmp(&a.relevance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            roots = flat;
        }

        if let Some(limit) = self.limit {
            roots.truncate(limit as usize);
        }

        let text = match output_format {
            OutputFormat::Text | OutputFormat::Auto => {
                let mut lines = vec![format!("Symbols in {} ({}):", self.file_path, self.mode)];
                for node in &roots {
                    render_text(node, 1, &mut lines);
                }
                lines.join("\n")
            }
            _ => serde_json::to_string_pretty(&roots)?,
        };

        Ok(CallToolResult::text_content(vec![TextContent::from(text)]))
    }

    fn build_tree(&self, symbols: &[Symbol], source: Option<&str>) -> Vec<SymbolNode> {
        let child_map: std::collections::HashMap<&str, Vec<&Symbol>> = {
            let mut map: std::collections::HashMap<&str, Vec<&Symbol>> =
                std::collections::HashMap::new();
            for symbol in symbols {
                if let Some(parent) = &symbol.parent_id {
                    map.entry(parent.as_str()).or_default().push(symbol);
                }
            }
            map
        };

        symbols
            .iter()
            .filter(|s| s.parent_id.is_none())
            .map(|s| self.build_node(s, &child_map, source, 1))
            .collect()
    }

    fn build_node(
        &self,
        symbol: &Symbol,
        child_map: &std::collections::HashMap<&str, Vec<&Symbol>>,
        source: Option<&str>,
        depth: u32,
    ) -> SymbolNode {
        let children = if depth < self.max_depth {
            child_map
                .get(symbol.id.as_str())
                .map(|children| {
                    children
                        .iter()
                        .map(|child| self.build_node(child, child_map, source, depth + 1))
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let include_signature = self.mode != "structure";
        let include_doc = self.mode == "full";
        let body = if self.mode == "full" {
            source.and_then(|content| {
                let start = symbol.start_byte as usize;
                let end = (symbol.end_byte as usize).min(content.len());
                content.get(start..end).map(|s| s.to_string())
            })
        } else {
            None
        };

        SymbolNode {
            name: symbol.name.clone(),
            kind: symbol.kind.to_string(),
            start_line: symbol.start_line,
            end_line: symbol.end_line,
            signature: if include_signature {
                symbol.signature.clone()
            } else {
                None
            },
            doc_comment: if include_doc {
                symbol.doc_comment.clone()
            } else {
                None
            },
            body,
            relevance: self
                .target
                .as_ref()
                .map(|target| target_relevance(&symbol.name, target)),
            children,
        }
    }
}

/// Pull out nodes (at any depth) whose relevance clears the floor.
fn flatten_matching(nodes: &mut Vec<SymbolNode>, target: &str, out: &mut Vec<SymbolNode>) {
    for mut node in nodes.drain(..) {
        let mut children = std::mem::take(&mut node.children);
        let relevance = node
            .relevance
            .unwrap_or_else(|| target_relevance(&node.name, target));
        if relevance > 0.0 {
            node.relevance = Some(relevance);
            out.push(node);
        }
        flatten_matching(&mut children, target, out);
    }
}

fn render_text(node: &SymbolNode, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    let detail = node
        .signature
        .as_deref()
        .map(|s| format!(" — {}", truncate_signature(s, 60)))
        .unwrap_or_default();
    lines.push(format!(
        "{indent}{} [{}] line {}{}",
        node.name, node.kind, node.start_line, detail
    ));
    for child in &node.children {
        render_text(child, depth + 1, lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_orders_exact_prefix_substring() {
        let exact = target_relevance("User", "user");
        let prefix = target_relevance("UserService", "user");
        let substring = target_relevance("AdminUserView", "user");
        let unrelated = target_relevance("PaymentGateway", "user");

        assert!(exact > prefix);
        assert!(prefix > substring);
        assert!(substring > unrelated);
        assert_eq!(unrelated, 0.0);
    }

    #[test]
    fn word_overlap_gives_partial_relevance() {
        let partial = target_relevance("fetch_user_info", "get_user_data");
        assert!(partial > 0.0 && partial < 0.6);
    }
}
