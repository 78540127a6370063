//! Exploration tools: fast_explore (types, similar, dead_code, hot_spots,
//! dependencies), get_architecture_map, and validate_imports.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use rust_mcp_sdk::macros::{mcp_tool, JsonSchema};
use rust_mcp_sdk::schema::{CallToolResult, TextContent};
use serde::{Deserialize, Serialize};

use crate::database::{CrossDirectoryDependency, DeadCodeOptions};
use crate::embeddings::symbol_embedding_text;
use crate::extractors::Symbol;
use crate::handler::MillerServerHandler;
use crate::tools::shared::{encode_rows, truncate_signature, OutputFormat};

fn default_explore_mode() -> String {
    "types".to_string()
}

fn default_threshold() -> f32 {
    0.7
}

fn default_explore_limit() -> u32 {
    10
}

fn default_depth() -> u32 {
    2
}

fn default_min_edge_count() -> u32 {
    3
}

fn default_arch_format() -> String {
    "mermaid".to_string()
}

fn default_output_format() -> String {
    "auto".to_string()
}

/// Compact symbol row shared by the exploration renderings.
#[derive(Debug, Serialize)]
struct ExploreSymbol {
    name: String,
    kind: String,
    file_path: String,
    start_line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    referencing_files: Option<i64>,
}

impl ExploreSymbol {
    fn from_symbol(symbol: &Symbol) -> Self {
        Self {
            name: symbol.name.clone(),
            kind: symbol.kind.to_string(),
            file_path: symbol.file_path.clone(),
            start_line: symbol.start_line,
            signature: symbol.signature.clone(),
            similarity: None,
            reference_count: None,
            referencing_files: None,
        }
    }
}

//***********************//
//   Fast Explore Tool   //
//***********************//

#[mcp_tool(
    name = "fast_explore",
    description = concat!(
        "Multi-mode codebase exploration. Modes:\n",
        "- 'types': implementations, hierarchy, and usage of a type\n",
        "- 'similar': semantically similar symbols (duplicate detection)\n",
        "- 'dead_code': unreferenced functions/classes (tests excluded)\n",
        "- 'hot_spots': most-referenced symbols (coupling indicators)\n",
        "- 'dependencies': cross-directory dependency edges"
    ),
    title = "Codebase Explorer",
    idempotent_hint = true,
    destructive_hint = false,
    open_world_hint = false,
    read_only_hint = true,
    meta = r#"{"category": "exploration", "performance": "fast"}"#
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct FastExploreTool {
    /// Exploration mode: "types", "similar", "dead_code", "hot_spots", or
    /// "dependencies" (default: "types").
    #[serde(default = "default_explore_mode")]
    pub mode: String,

    /// Type name to explore (required for "types" mode).
    #[serde(default)]
    pub type_name: Option<String>,

    /// Symbol name to compare (required for "similar" mode).
    #[serde(default)]
    pub symbol: Option<String>,

    /// Minimum similarity for "similar" mode (default: 0.7).
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Directory depth for "dependencies" mode (default: 2).
    #[serde(default = "default_depth")]
    pub depth: u32,

    /// Maximum results (default: 10).
    #[serde(default = "default_explore_limit")]
    pub limit: u32,

    /// Output format: "json", "text", "compact", or "auto" (default).
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Workspace to query (default: "primary"). This server instance serves
    /// the primary workspace.
    #[serde(default)]
    pub workspace: Option<String>,
}

impl FastExploreTool {
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

        let text = match self.mode.as_str() {
            "types" => self.explore_types(workspace, output_format)?,
            "similar" => self.explore_similar(workspace, output_format)?,
            "dead_code" => self.explore_dead_code(workspace, output_format)?,
            "hot_spots" => self.explore_hot_spots(workspace, output_format)?,
            "dependencies" => self.explore_dependencies(workspace, output_format)?,
            other => anyhow::bail!(
                "Unknown exploration mode: {other}. Valid modes: 'types', 'similar', \
                 'dead_code', 'hot_spots', 'dependencies'"
            ),
        };

        Ok(CallToolResult::text_content(vec![TextContent::from(text)]))
    }

    fn explore_types(
        &self,
        workspace: &crate::workspace::MillerWorkspace,
        format: OutputFormat,
    ) -> Result<String> {
        let type_name = self
            .type_name
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("type_name is required for types mode"))?;

        let db = workspace.db.lock().unwrap();
        let limit = self.limit as usize;

        let definitions = db
            .get_symbols_by_name(type_name)
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        // Implementations / children come from inbound extends+implements
        // edges; parents from outbound edges of the type itself.
        let mut implementations = Vec::new();
        let mut parents = Vec::new();
        for definition in &definitions {
            for (symbol, kind) in db
                .direct_callers(&definition.id)
                .map_err(|e| anyhow::anyhow!("{e}"))?
            {
                use crate::extractors::RelationshipKind;
                if matches!(kind, RelationshipKind::Extends | RelationshipKind::Implements) {
                    implementations.push(symbol);
                }
            }
            for (symbol, kind) in db
                .direct_callees(&definition.id)
                .map_err(|e| anyhow::anyhow!("{e}"))?
            {
                use crate::extractors::RelationshipKind;
                if matches!(kind, RelationshipKind::Extends | RelationshipKind::Implements) {
                    parents.push(symbol);
                }
            }
        }
        implementations.truncate(limit);
        parents.truncate(limit);

        // Signature scan covers returns/parameters without type inference.
        let mentioning = db
            .find_symbols_with_signature_containing(type_name, limit * 2)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        let definition_ids: BTreeSet<&str> = definitions.iter().map(|s| s.id.as_str()).collect();
        let usages: Vec<&Symbol> = mentioning
            .iter()
            .filter(|s| !definition_ids.contains(s.id.as_str()))
            .take(limit)
            .collect();

        if format == OutputFormat::Json || format == OutputFormat::Compact {
            let payload = serde_json::json!({
                "type_name": type_name,
                "definitions": definitions.iter().map(ExploreSymbol::from_symbol).collect::<Vec<_>>(),
                "implementations": implementations.iter().map(ExploreSymbol::from_symbol).collect::<Vec<_>>(),
                "parents": parents.iter().map(ExploreSymbol::from_symbol).collect::<Vec<_>>(),
                "usages": usages.iter().map(|s| ExploreSymbol::from_symbol(s)).collect::<Vec<_>>(),
            });
            return Ok(serde_json::to_string_pretty(&payload)?);
        }

        let total = definitions.len() + implementations.len() + parents.len() + usages.len();
        if total == 0 {
            return Ok(format!("No type information found for \"{type_name}\"."));
        }

        let mut out = vec![format!("Type intelligence for \"{type_name}\":"), String::new()];
        let mut section = |title: &str, symbols: &[&Symbol], out: &mut Vec<String>| {
            if symbols.is_empty() {
                return;
            }
            out.push(format!("{title} ({}):", symbols.len()));
            for symbol in symbols {
                let sig = symbol
                    .signature
                    .as_deref()
                    .map(|s| truncate_signature(s, 60))
                    .unwrap_or_else(|| symbol.name.clone());
                out.push(format!("  {}:{} → {}", symbol.file_path, symbol.start_line, sig));
            }
            out.push(String::new());
        };

        let def_refs: Vec<&Symbol> = definitions.iter().collect();
        let impl_refs: Vec<&Symbol> = implementations.iter().collect();
        let parent_refs: Vec<&Symbol> = parents.iter().collect();
        section("Definitions", &def_refs, &mut out);
        section("Implementations", &impl_refs, &mut out);
        section("Parents", &parent_refs, &mut out);
        section("Mentioned in signatures", &usages, &mut out);

        while out.last().is_some_and(|l| l.is_empty()) {
            out.pop();
        }
        Ok(out.join("\n"))
    }

    fn explore_similar(
        &self,
        workspace: &crate::workspace::MillerWorkspace,
        format: OutputFormat,
    ) -> Result<String> {
        let symbol_name = self
            .symbol
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("symbol is required for similar mode"))?;

        let target = {
            let db = workspace.db.lock().unwrap();
            db.get_symbol_by_name(symbol_name, None)
                .map_err(|e| anyhow::anyhow!("{e}"))?
        };
        let Some(target) = target else {
            return Ok(format!("Similar to \"{symbol_name}\": symbol not found."));
        };

        let text = symbol_embedding_text(
            &target.name,
            target.signature.as_deref(),
            target.doc_comment.as_deref(),
        );
        let query_vector = workspace.embedder.embed_query(&text)?;

        let store = workspace.vector_store.read().unwrap();
        let mut rows: Vec<ExploreSymbol> = store
            .search_semantic_vector(&query_vector, (self.limit as usize) + 1)
            .into_iter()
            .filter(|hit| hit.id != target.id && hit.score >= self.threshold)
            .take(self.limit as usize)
            .map(|hit| ExploreSymbol {
                name: hit.name,
                kind: hit.kind,
                file_path: hit.file_path,
                start_line: hit.start_line,
                signature: hit.signature,
                similarity: Some((hit.score * 1000.0).round() / 1000.0),
                reference_count: None,
                referencing_files: None,
            })
            .collect();
        rows.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));

        if rows.is_empty() {
            return Ok(format!(
                "Similar to \"{symbol_name}\": No similar symbols found (0 matches)."
            ));
        }

        if format == OutputFormat::Text {
            let mut out = vec![format!("Similar to \"{symbol_name}\" ({} matches):", rows.len())];
            for row in &rows {
                let pct = (row.similarity.unwrap_or(0.0) * 100.0) as u32;
                let sig = row
                    .signature
                    .as_deref()
                    .map(|s| truncate_signature(s, 50))
                    .unwrap_or_else(|| row.name.clone());
                out.push(format!("  {pct}% {}:{} → {sig}", row.file_path, row.start_line));
            }
            return Ok(out.join("\n"));
        }
        Ok(encode_rows(&rows, format))
    }

    fn explore_dead_code(
        &self,
        workspace: &crate::workspace::MillerWorkspace,
        format: OutputFormat,
    ) -> Result<String> {
        let dead = {
            let mut db = workspace.db.lock().unwrap();
            db.dead_code_candidates(&DeadCodeOptions {
                limit: self.limit as usize,
            })
            .map_err(|e| anyhow::anyhow!("{e}"))?
        };

        if dead.is_empty() {
            return Ok("No dead code candidates found.".to_string());
        }

        let rows: Vec<ExploreSymbol> = dead.iter().map(ExploreSymbol::from_symbol).collect();
        if format == OutputFormat::Text {
            let mut out = vec![format!("Dead code candidates ({}):", rows.len())];
            for row in &rows {
                out.push(format!(
                    "  {}:{} → {} [{}]",
                    row.file_path, row.start_line, row.name, row.kind
                ));
            }
            return Ok(out.join("\n"));
        }
        Ok(encode_rows(&rows, format))
    }

    fn explore_hot_spots(
        &self,
        workspace: &crate::workspace::MillerWorkspace,
        format: OutputFormat,
    ) -> Result<String> {
        let spots = {
            let mut db = workspace.db.lock().unwrap();
            db.hot_spots(self.limit as usize)
                .map_err(|e| anyhow::anyhow!("{e}"))?
        };

        if spots.is_empty() {
            return Ok("No hot spots found.".to_string());
        }

        let rows: Vec<ExploreSymbol> = spots
            .iter()
            .map(|spot| {
                let mut row = ExploreSymbol::from_symbol(&spot.symbol);
                row.reference_count = Some(spot.reference_count);
                row.referencing_files = Some(spot.referencing_file_count);
                row
            })
            .collect();

        if format == OutputFormat::Text {
            let mut out = vec![format!("Hot spots ({}):", rows.len())];
            for row in &rows {
                out.push(format!(
                    "  {} refs across {} files → {} @ {}:{}",
                    row.reference_count.unwrap_or(0),
                    row.referencing_files.unwrap_or(0),
                    row.name,
                    row.file_path,
                    row.start_line
                ));
            }
            return Ok(out.join("\n"));
        }
        Ok(encode_rows(&rows, format))
    }

    fn explore_dependencies(
        &self,
        workspace: &crate::workspace::MillerWorkspace,
        format: OutputFormat,
    ) -> Result<String> {
        let deps = {
            let db = workspace.db.lock().unwrap();
            db.get_cross_directory_dependencies(self.depth as usize, 1)
                .map_err(|e| anyhow::anyhow!("{e}"))?
        };

        if deps.is_empty() {
            return Ok("No cross-directory dependencies found.".to_string());
        }

        if format == OutputFormat::Text {
            let mut out = vec![format!("Cross-directory dependencies ({}):", deps.len())];
            for dep in deps.iter().take(self.limit as usize) {
                out.push(format!(
                    "  {} → {} ({} edges: {})",
                    dep.source_dir,
                    dep.target_dir,
                    dep.edge_count,
                    dep.relationship_kinds.join(", ")
                ));
            }
            return Ok(out.join("\n"));
        }
        let limited: Vec<&CrossDirectoryDependency> =
            deps.iter().take(self.limit as usize).collect();
        Ok(serde_json::to_string_pretty(&limited)?)
    }
}

//*****************************//
//   Architecture Map Tool     //
//*****************************//

#[mcp_tool(
    name = "get_architecture_map",
    description = concat!(
        "High-level directory dependency map: a zoom-out view of how modules ",
        "depend on each other. Formats: mermaid flowchart, ascii tree, or ",
        "json with summary statistics."
    ),
    title = "Architecture Map",
    idempotent_hint = true,
    destructive_hint = false,
    open_world_hint = false,
    read_only_hint = true,
    meta = r#"{"category": "exploration", "performance": "fast"}"#
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct GetArchitectureMapTool {
    /// Directory depth to aggregate at (default: 2).
    /// Example: depth=2 groups "src/auth/login.py" under "src/auth".
    #[serde(default = "default_depth")]
    pub depth: u32,

    /// Output format: "mermaid" (default), "ascii", or "json".
    #[serde(default = "default_arch_format")]
    pub output_format: String,

    /// Workspace to query (default: "primary"). This server instance serves
    /// the primary workspace.
    #[serde(default)]
    pub workspace: Option<String>,

    /// Minimum relationships for an edge to appear (default: 3).
    #[serde(default = "default_min_edge_count")]
    pub min_edge_count: u32,
}

impl GetArchitectureMapTool {
    pub async fn call_tool(&self, handler: &MillerServerHandler) -> Result<CallToolResult> {
        handler.ensure_workspace().await?;

        let guard = handler.workspace.read().await;
        let workspace = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("workspace not initialized"))?;

        let deps = {
            let db = workspace.db.lock().unwrap();
            db.get_cross_directory_dependencies(self.depth as usize, self.min_edge_count as u64)
                .map_err(|e| anyhow::anyhow!("{e}"))?
        };

        if deps.is_empty() {
            return Ok(CallToolResult::text_content(vec![TextContent::from(
                format!(
                    "No dependencies with >= {} relationships. Try lowering min_edge_count.",
                    self.min_edge_count
                ),
            )]));
        }

        let text = match self.output_format.as_str() {
            "ascii" => render_ascii(&deps),
            "json" => render_json(&deps)?,
            _ => render_mermaid(&deps, self.depth),
        };
        Ok(CallToolResult::text_content(vec![TextContent::from(text)]))
    }
}

fn render_mermaid(deps: &[CrossDirectoryDependency], depth: u32) -> String {
    let mut lines = vec![
        "---".to_string(),
        format!("title: Architecture (depth={depth})"),
        "---".to_string(),
        "flowchart TD".to_string(),
    ];

    let mut nodes = BTreeSet::new();
    for dep in deps {
        nodes.insert(dep.source_dir.clone());
        nodes.insert(dep.target_dir.clone());
    }

    let mut node_ids = BTreeMap::new();
    for (i, node) in nodes.iter().enumerate() {
        let safe_id = format!("N{i}");
        let label = node.replace('"', "'");
        lines.push(format!("    {safe_id}[\"{label}\"]"));
        node_ids.insert(node.clone(), safe_id);
    }

    for dep in deps {
        let source = &node_ids[&dep.source_dir];
        let target = &node_ids[&dep.target_dir];
        // Arrow style encodes edge weight.
        let arrow = if dep.edge_count >= 50 {
            "==>"
        } else if dep.edge_count >= 10 {
            "-->"
        } else {
            "-.->"
        };
        lines.push(format!("    {source} {arrow}|{}| {target}", dep.edge_count));
    }

    lines.join("\n")
}

fn render_ascii(deps: &[CrossDirectoryDependency]) -> String {
    let mut lines = vec!["Module Dependencies".to_string(), "=".repeat(40)];

    let mut by_source: BTreeMap<&str, Vec<&CrossDirectoryDependency>> = BTreeMap::new();
    for dep in deps {
        by_source.entry(&dep.source_dir).or_default().push(dep);
    }

    let mut sources: Vec<(&str, Vec<&CrossDirectoryDependency>)> = by_source.into_iter().collect();
    sources.sort_by_key(|(_, targets)| {
        std::cmp::Reverse(targets.iter().map(|d| d.edge_count).sum::<u64>())
    });

    for (source, mut targets) in sources {
        let total: u64 = targets.iter().map(|d| d.edge_count).sum();
        lines.push(format!("\n{source} (→ {total} refs)"));
        targets.sort_by_key(|d| std::cmp::Reverse(d.edge_count));
        for (i, dep) in targets.iter().enumerate() {
            let prefix = if i == targets.len() - 1 { "└──" } else { "├──" };
            lines.push(format!(
                "   {prefix} {} ({} {})",
                dep.target_dir,
                dep.edge_count,
                dep.relationship_kinds.join(", ")
            ));
        }
    }

    lines.join("\n")
}

fn render_json(deps: &[CrossDirectoryDependency]) -> Result<String> {
    let mut modules = BTreeSet::new();
    let mut total_edges = 0u64;
    let mut outgoing: BTreeMap<&str, u64> = BTreeMap::new();
    let mut incoming: BTreeMap<&str, u64> = BTreeMap::new();

    for dep in deps {
        modules.insert(&dep.source_dir);
        modules.insert(&dep.target_dir);
        total_edges += dep.edge_count;
        *outgoing.entry(&dep.source_dir).or_default() += dep.edge_count;
        *incoming.entry(&dep.target_dir).or_default() += dep.edge_count;
    }

    let mut top_sources: Vec<(&&str, &u64)> = outgoing.iter().collect();
    top_sources.sort_by_key(|(_, count)| std::cmp::Reverse(**count));
    let mut top_targets: Vec<(&&str, &u64)> = incoming.iter().collect();
    top_targets.sort_by_key(|(_, count)| std::cmp::Reverse(**count));

    let summary = serde_json::json!({
        "total_modules": modules.len(),
        "total_edges": total_edges,
        "avg_edge_weight": if deps.is_empty() { 0.0 } else { total_edges as f64 / deps.len() as f64 },
        "top_dependents": top_sources.iter().take(5)
            .map(|(module, outgoing)| serde_json::json!({"module": module, "outgoing": outgoing}))
            .collect::<Vec<_>>(),
        "top_dependencies": top_targets.iter().take(5)
            .map(|(module, incoming)| serde_json::json!({"module": module, "incoming": incoming}))
            .collect::<Vec<_>>(),
    });

    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "summary": summary,
        "dependencies": deps,
    }))?)
}

//***************************//
//   Validate Imports Tool   //
//***************************//

#[mcp_tool(
    name = "validate_imports",
    description = concat!(
        "Check each import in a code snippet against the index: known symbol, ",
        "known module file, or unknown. Catches imports of renamed or removed ",
        "symbols before they fail at runtime."
    ),
    title = "Import Validator",
    idempotent_hint = true,
    destructive_hint = false,
    open_world_hint = false,
    read_only_hint = true,
    meta = r#"{"category": "exploration", "performance": "fast"}"#
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ValidateImportsTool {
    /// Code snippet whose import lines should be validated.
    pub code_snippet: String,

    /// Language hint: "python", "typescript", ... (default: auto-detect).
    #[serde(default)]
    pub language: Option<String>,

    /// Workspace to query (default: "primary"). This server instance serves
    /// the primary workspace.
    #[serde(default)]
    pub workspace: Option<String>,
}

#[derive(Debug, Serialize)]
struct ImportVerdict {
    import: String,
    symbol: String,
    verdict: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved_to: Option<String>,
}

/// Pull (line, imported names) pairs out of a snippet. Handles Python
/// `import x` / `from m import a, b` and ES `import {a, b} from 'm'` shapes.
fn parse_import_lines(snippet: &str) -> Vec<(String, Vec<String>)> {
    let mut imports = Vec::new();
    for line in snippet.lines() {
        let trimmed = line.trim();
        let names: Vec<String> = if let Some(rest) = trimmed.strip_prefix("from ") {
            match rest.split_once(" import ") {
                Some((_, names)) => names
                    .split(',')
                    .map(|n| n.trim().split(" as ").next().unwrap_or("").to_string())
                    .filter(|n| !n.is_empty() && *n != "*")
                    .collect(),
                None => continue,
            }
        } else if let Some(rest) = trimmed.strip_prefix("import ") {
            if rest.contains('{') {
                // ES style: import { a, b } from 'module'
                rest.split('{')
                    .nth(1)
                    .and_then(|inner| inner.split('}').next())
                    .map(|inner| {
                        inner
                            .split(',')
                            .map(|n| n.trim().split(" as ").next().unwrap_or("").to_string())
                            .filter(|n| !n.is_empty())
                            .collect()
                    })
                    .unwrap_or_default()
            } else {
                rest.split(',')
                    .map(|n| {
                        n.trim()
                            .split_whitespace()
                            .next()
                            .unwrap_or("")
                            .split('.')
                            .next_back()
                            .unwrap_or("")
                            .to_string()
                    })
                    .filter(|n| !n.is_empty())
                    .collect()
            }
        } else {
            continue;
        };

        if !names.is_empty() {
            imports.push((trimmed.to_string(), names));
        }
    }
    imports
}

impl ValidateImportsTool {
    pub async fn call_tool(&self, handler: &MillerServerHandler) -> Result<CallToolResult> {
        handler.ensure_workspace().await?;

        let guard = handler.workspace.read().await;
        let workspace = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("workspace not initialized"))?;

        let imports = parse_import_lines(&self.code_snippet);
        if imports.is_empty() {
            return Ok(CallToolResult::text_content(vec![TextContent::from(
                "No import statements found in snippet.",
            )]));
        }

        let mut verdicts = Vec::new();
        {
            let db = workspace.db.lock().unwrap();
            let exported: BTreeSet<String> = db
                .get_exported_symbols(None)
                .map_err(|e| anyhow::anyhow!("{e}"))?
                .into_iter()
                .map(|s| s.name)
                .collect();

            for (line, names) in imports {
                for name in names {
                    let symbol = db
                        .get_symbol_by_name(&name, None)
                        .map_err(|e| anyhow::anyhow!("{e}"))?;
                    let (verdict, resolved_to) = match symbol {
                        Some(symbol) if symbol.kind != crate::extractors::SymbolKind::Import => {
                            let location = format!("{}:{}", symbol.file_path, symbol.start_line);
                            if exported.contains(&name) {
                                ("ok".to_string(), Some(location))
                            } else {
                                // Resolves, but the definition is not public.
                                ("private".to_string(), Some(location))
                            }
                        }
                        Some(_) => ("import_only".to_string(), None),
                        None => {
                            // Maybe it's a module: prefix-match a file path.
                            let prefix_hits = db
                                .find_symbols_by_name_prefix(&name, 1)
                                .map_err(|e| anyhow::anyhow!("{e}"))?;
                            if prefix_hits.is_empty() {
                                ("unknown".to_string(), None)
                            } else {
                                ("prefix_match".to_string(), Some(prefix_hits[0].name.clone()))
                            }
                        }
                    };
                    verdicts.push(ImportVerdict {
                        import: line.clone(),
                        symbol: name,
                        verdict,
                        resolved_to,
                    });
                }
            }
        }

        let unknown = verdicts.iter().filter(|v| v.verdict == "unknown").count();
        let text = format!(
            "{}\n\n{}",
            if unknown == 0 {
                "All imports resolve against the index.".to_string()
            } else {
                format!("{unknown} import(s) did not resolve.")
            },
            serde_json::to_string_pretty(&verdicts)?
        );

        Ok(CallToolResult::text_content(vec![TextContent::from(text)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_imports_parse() {
        let imports =
            parse_import_lines("from models import User, Role\nimport os\nx = 1\n");
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].1, vec!["User", "Role"]);
        assert_eq!(imports[1].1, vec!["os"]);
    }

    #[test]
    fn es_imports_parse() {
        let imports = parse_import_lines("import { UserService, ApiClient } from './services';\n");
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].1, vec!["UserService", "ApiClient"]);
    }

    #[test]
    fn aliases_and_stars_are_handled() {
        let imports = parse_import_lines("from m import thing as alias\nfrom n import *\n");
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].1, vec!["thing"]);
    }

    #[test]
    fn mermaid_renders_nodes_and_weighted_edges() {
        let deps = vec![
            CrossDirectoryDependency {
                source_dir: "src/api".into(),
                target_dir: "src/core".into(),
                edge_count: 60,
                relationship_kinds: vec!["call".into()],
            },
            CrossDirectoryDependency {
                source_dir: "src/ui".into(),
                target_dir: "src/core".into(),
                edge_count: 4,
                relationship_kinds: vec!["call".into()],
            },
        ];
        let mermaid = render_mermaid(&deps, 2);
        assert!(mermaid.contains("flowchart TD"));
        assert!(mermaid.contains("==>|60|"));
        assert!(mermaid.contains("-.->|4|"));
        assert!(mermaid.contains("[\"src/core\"]"));
    }

    #[test]
    fn ascii_renders_tree_structure() {
        let deps = vec![CrossDirectoryDependency {
            source_dir: "src/api".into(),
            target_dir: "src/core".into(),
            edge_count: 7,
            relationship_kinds: vec!["call".into()],
        }];
        let ascii = render_ascii(&deps);
        assert!(ascii.contains("src/api"));
        assert!(ascii.contains("└── src/core (7 call)"));
    }
}
