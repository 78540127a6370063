// Miller's Cross-Language Trace Engine
//
// Builds a tree rooted at a symbol, expanding callees (downstream), callers
// (upstream), or both. Each expansion step layers three searches: direct
// relationship edges, naming-variant matches across language boundaries, and
// (when enabled) semantic vector neighbors above a cosine threshold.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::database::SymbolDatabase;
use crate::embeddings::vector_store::VectorStore;
use crate::embeddings::{symbol_embedding_text, Embedder};
use crate::extractors::{MatchType, RelationshipKind, Symbol};
use crate::utils::naming_variants::variant_set;

pub const DEFAULT_MAX_DEPTH: u32 = 3;
pub const MAX_ALLOWED_DEPTH: u32 = 10;

/// Variant matching only kicks in when direct edges are sparse.
const DIRECT_EDGE_VARIANT_THRESHOLD: usize = 5;

/// Variant matches emitted per expansion step.
const VARIANT_RESULT_CAP: usize = 10;

/// Cosine floor for semantic edges.
pub const SEMANTIC_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Children kept per node.
const FANOUT_CAP: usize = 100;

/// Semantic candidates fetched before threshold filtering.
const SEMANTIC_FETCH_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceDirection {
    Upstream,
    Downstream,
    Both,
}

impl fmt::Display for TraceDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TraceDirection::Upstream => "upstream",
            TraceDirection::Downstream => "downstream",
            TraceDirection::Both => "both",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TraceDirection {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upstream" => Ok(TraceDirection::Upstream),
            "downstream" => Ok(TraceDirection::Downstream),
            "both" => Ok(TraceDirection::Both),
            other => Err(TraceError::Validation(format!(
                "direction must be 'upstream', 'downstream', or 'both', got '{other}'"
            ))),
        }
    }
}

/// One node of the trace tree.
#[derive(Debug, Clone, Serialize)]
pub struct TraceNode {
    pub symbol_id: String,
    pub name: String,
    pub kind: String,
    pub file_path: String,
    pub line: u32,
    pub language: String,
    pub relationship_kind: String,
    pub match_type: MatchType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub depth: u32,
    pub children: Vec<TraceNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// The trace result with traversal statistics.
#[derive(Debug, Clone, Serialize)]
pub struct TracePath {
    pub query_symbol: String,
    pub direction: TraceDirection,
    pub max_depth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<TraceNode>,
    pub total_nodes: usize,
    pub max_depth_reached: u32,
    pub truncated: bool,
    pub languages_found: Vec<String>,
    pub match_types: BTreeMap<String, usize>,
    pub relationship_kinds: BTreeMap<String, usize>,
    pub nodes_visited: usize,
    pub cycles_detected: usize,
    pub execution_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct TraceOptions {
    pub symbol_name: String,
    pub direction: TraceDirection,
    pub max_depth: u32,
    pub context_file: Option<String>,
    pub enable_semantic: bool,
    /// Soft deadline in milliseconds; when exceeded mid-traversal, no further
    /// nodes are expanded and the path is marked truncated.
    pub deadline_ms: Option<u64>,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            symbol_name: String::new(),
            direction: TraceDirection::Downstream,
            max_depth: DEFAULT_MAX_DEPTH,
            context_file: None,
            enable_semantic: false,
            deadline_ms: None,
        }
    }
}

struct TraceStats {
    languages: BTreeSet<String>,
    match_types: BTreeMap<String, usize>,
    relationship_kinds: BTreeMap<String, usize>,
    nodes_visited: usize,
    cycles_detected: usize,
    started: Instant,
    deadline_hit: bool,
}

/// A related symbol discovered during one expansion step.
struct RelatedSymbol {
    symbol: Symbol,
    relationship_kind: String,
    match_type: MatchType,
    confidence: Option<f32>,
}

pub struct TraceEngine<'a> {
    db: &'a SymbolDatabase,
    vector_store: Option<&'a VectorStore>,
    embedder: Option<&'a dyn Embedder>,
}

impl<'a> TraceEngine<'a> {
    pub fn new(
        db: &'a SymbolDatabase,
        vector_store: Option<&'a VectorStore>,
        embedder: Option<&'a dyn Embedder>,
    ) -> Self {
        Self {
            db,
            vector_store,
            embedder,
        }
    }

    /// Trace call paths from a symbol.
    ///
    /// `max_depth` outside `[1, 10]` is a validation error. Unknown symbols
    /// produce an empty `TracePath` carrying an `error` field.
    pub fn trace(&self, options: &TraceOptions) -> Result<TracePath, TraceError> {
        let start_time = Instant::now();

        if options.max_depth < 1 || options.max_depth > MAX_ALLOWED_DEPTH {
            return Err(TraceError::Validation(format!(
                "max_depth must be between 1 and {MAX_ALLOWED_DEPTH}, got {}",
                options.max_depth
            )));
        }

        let start_symbol = self
            .db
            .get_symbol_by_name(&options.symbol_name, options.context_file.as_deref())
            .map_err(|e| TraceError::Internal(e.into()))?;

        let Some(start_symbol) = start_symbol else {
            return Ok(TracePath {
                query_symbol: options.symbol_name.clone(),
                direction: options.direction,
                max_depth: options.max_depth,
                root: None,
                total_nodes: 0,
                max_depth_reached: 0,
                truncated: false,
                languages_found: Vec::new(),
                match_types: BTreeMap::new(),
                relationship_kinds: BTreeMap::new(),
                nodes_visited: 0,
                cycles_detected: 0,
                execution_time_ms: start_time.elapsed().as_secs_f64() * 1000.0,
                error: Some(format!(
                    "Symbol '{}' not found in workspace",
                    options.symbol_name
                )),
            });
        };

        let mut stats = TraceStats {
            languages: BTreeSet::new(),
            match_types: BTreeMap::new(),
            relationship_kinds: BTreeMap::new(),
            nodes_visited: 0,
            cycles_detected: 0,
            started: start_time,
            deadline_hit: false,
        };

        let mut visited = HashSet::new();
        let root = self.build_node(
            &start_symbol,
            options,
            0,
            &mut visited,
            &mut stats,
        );

        let total_nodes = count_nodes(&root);
        let max_depth_reached = deepest(&root);
        let truncated = max_depth_reached >= options.max_depth || stats.deadline_hit;

        debug!(
            "Trace '{}' ({}): {} nodes, depth {}, {} cycles",
            options.symbol_name,
            options.direction,
            total_nodes,
            max_depth_reached,
            stats.cycles_detected
        );

        Ok(TracePath {
            query_symbol: options.symbol_name.clone(),
            direction: options.direction,
            max_depth: options.max_depth,
            root: Some(root),
            total_nodes,
            max_depth_reached,
            truncated,
            languages_found: stats.languages.into_iter().collect(),
            match_types: stats.match_types,
            relationship_kinds: stats.relationship_kinds,
            nodes_visited: stats.nodes_visited,
            cycles_detected: stats.cycles_detected,
            execution_time_ms: start_time.elapsed().as_secs_f64() * 1000.0,
            error: None,
        })
    }

    fn build_node(
        &self,
        symbol: &Symbol,
        options: &TraceOptions,
        depth: u32,
        visited: &mut HashSet<String>,
        stats: &mut TraceStats,
    ) -> TraceNode {
        stats.nodes_visited += 1;
        visited.insert(symbol.id.clone());
        stats.languages.insert(symbol.language.clone());

        let mut node = TraceNode {
            symbol_id: symbol.id.clone(),
            name: symbol.name.clone(),
            kind: symbol.kind.to_string(),
            file_path: symbol.file_path.clone(),
            line: symbol.start_line,
            language: symbol.language.clone(),
            relationship_kind: if depth == 0 {
                "definition".to_string()
            } else {
                "call".to_string()
            },
            match_type: MatchType::Exact,
            confidence: None,
            depth,
            children: Vec::new(),
            signature: symbol.signature.clone(),
        };

        if depth >= options.max_depth {
            return node;
        }

        // Deadline: return the tree assembled so far instead of failing.
        if let Some(deadline_ms) = options.deadline_ms {
            if stats.started.elapsed().as_millis() as u64 >= deadline_ms {
                stats.deadline_hit = true;
                return node;
            }
        }

        let related = self.find_related(symbol, options, visited, stats);

        for item in related.into_iter().take(FANOUT_CAP) {
            *stats
                .relationship_kinds
                .entry(item.relationship_kind.clone())
                .or_insert(0) += 1;
            *stats
                .match_types
                .entry(item.match_type.to_string())
                .or_insert(0) += 1;

            // Each branch carries its own visited set so siblings can reach
            // the same symbol through different paths.
            let mut branch_visited = visited.clone();
            let mut child = self.build_node(
                &item.symbol,
                options,
                depth + 1,
                &mut branch_visited,
                stats,
            );
            child.relationship_kind = item.relationship_kind;
            child.match_type = item.match_type;
            child.confidence = item.confidence;
            node.children.push(child);
        }

        node
    }

    fn find_related(
        &self,
        symbol: &Symbol,
        options: &TraceOptions,
        visited: &HashSet<String>,
        stats: &mut TraceStats,
    ) -> Vec<RelatedSymbol> {
        let mut results = Vec::new();

        // 1. Direct relationship edges.
        let mut edges: Vec<(Symbol, RelationshipKind)> = Vec::new();
        if matches!(
            options.direction,
            TraceDirection::Downstream | TraceDirection::Both
        ) {
            edges.extend(self.db.direct_callees(&symbol.id).unwrap_or_default());
        }
        if matches!(
            options.direction,
            TraceDirection::Upstream | TraceDirection::Both
        ) {
            edges.extend(self.db.direct_callers(&symbol.id).unwrap_or_default());
        }

        for (related, kind) in edges {
            if visited.contains(&related.id) {
                stats.cycles_detected += 1;
                continue;
            }
            results.push(RelatedSymbol {
                symbol: related,
                relationship_kind: kind.to_string(),
                match_type: MatchType::Exact,
                confidence: None,
            });
        }

        // 2. Naming-variant edges bridge language boundaries when direct
        //    edges are sparse.
        if results.len() < DIRECT_EDGE_VARIANT_THRESHOLD {
            results.extend(self.find_variant_matches(symbol, visited, &results));
        }

        // 3. Semantic edges (opt-in).
        if options.enable_semantic {
            results.extend(self.find_semantic_matches(symbol, visited, &results));
        }

        results
    }

    fn find_variant_matches(
        &self,
        symbol: &Symbol,
        visited: &HashSet<String>,
        existing: &[RelatedSymbol],
    ) -> Vec<RelatedSymbol> {
        let variants: Vec<String> = variant_set(&symbol.name)
            .into_iter()
            .filter(|v| v != &symbol.name)
            .collect();
        if variants.is_empty() {
            return Vec::new();
        }

        let existing_ids: HashSet<&str> = existing.iter().map(|r| r.symbol.id.as_str()).collect();
        let candidates = self.db.get_symbols_by_names(&variants).unwrap_or_default();

        let mut matches = Vec::new();
        for candidate in candidates {
            if visited.contains(&candidate.id) || existing_ids.contains(candidate.id.as_str()) {
                continue;
            }
            // Variant edges only bridge into other languages; same-language
            // homonyms are more often noise than signal.
            if candidate.language == symbol.language {
                continue;
            }
            matches.push(RelatedSymbol {
                symbol: candidate,
                relationship_kind: "reference".to_string(),
                match_type: MatchType::Variant,
                confidence: None,
            });
            if matches.len() >= VARIANT_RESULT_CAP {
                break;
            }
        }
        matches
    }

    fn find_semantic_matches(
        &self,
        symbol: &Symbol,
        visited: &HashSet<String>,
        existing: &[RelatedSymbol],
    ) -> Vec<RelatedSymbol> {
        let (Some(store), Some(embedder)) = (self.vector_store, self.embedder) else {
            return Vec::new();
        };

        let text = symbol_embedding_text(
            &symbol.name,
            symbol.signature.as_deref(),
            symbol.doc_comment.as_deref(),
        );
        let query_vector = match embedder.embed_query(&text) {
            Ok(vector) => vector,
            Err(e) => {
                debug!("Semantic trace step skipped (embedder failed: {})", e);
                return Vec::new();
            }
        };

        let existing_ids: HashSet<&str> = existing.iter().map(|r| r.symbol.id.as_str()).collect();
        let neighbors = store.search_semantic_vector(&query_vector, SEMANTIC_FETCH_LIMIT);

        let mut matches = Vec::new();
        for neighbor in neighbors {
            if neighbor.score < SEMANTIC_SIMILARITY_THRESHOLD {
                continue;
            }
            if neighbor.id == symbol.id
                || visited.contains(&neighbor.id)
                || existing_ids.contains(neighbor.id.as_str())
            {
                continue;
            }
            if neighbor.language == symbol.language {
                continue;
            }
            let Ok(Some(related)) = self.db.get_symbol_by_id(&neighbor.id) else {
                continue;
            };
            matches.push(RelatedSymbol {
                symbol: related,
                relationship_kind: "reference".to_string(),
                match_type: MatchType::Semantic,
                confidence: Some(neighbor.score),
            });
        }
        matches
    }
}

fn count_nodes(node: &TraceNode) -> usize {
    1 + node.children.iter().map(count_nodes).sum::<usize>()
}

fn deepest(node: &TraceNode) -> u32 {
    node.children.iter().map(deepest).max().unwrap_or(node.depth)
}

/// Render the trace tree as an ASCII diagram:
///
/// ```text
/// UserService (typescript) @ src/services/user.ts:10
/// ├─[call]→ user_service (python) @ api/users.py:5
/// └─[call]→ createUser (typescript) @ src/api/users.ts:22
/// ```
pub fn format_as_tree(node: &TraceNode) -> String {
    let mut out = String::new();
    render_node(node, "", true, &mut out);
    out
}

fn render_node(node: &TraceNode, indent: &str, is_last: bool, out: &mut String) {
    if node.depth == 0 {
        out.push_str(&format!(
            "{} ({}) @ {}:{}\n",
            node.name, node.language, node.file_path, node.line
        ));
    } else {
        let connector = if is_last { "└─" } else { "├─" };
        let badge = match node.match_type {
            MatchType::Exact => node.relationship_kind.clone(),
            MatchType::Variant => format!("{}:variant", node.relationship_kind),
            MatchType::Semantic => match node.confidence {
                Some(confidence) => format!("semantic {:.0}%", confidence * 100.0),
                None => "semantic".to_string(),
            },
        };
        out.push_str(&format!(
            "{indent}{connector}[{badge}]→ {} ({}) @ {}:{}\n",
            node.name, node.language, node.file_path, node.line
        ));
    }

    for (i, child) in node.children.iter().enumerate() {
        let is_child_last = i == node.children.len() - 1;
        let child_indent = if node.depth == 0 {
            String::new()
        } else {
            format!("{indent}{}", if is_last { "   " } else { "│  " })
        };
        render_node(child, &child_indent, is_child_last, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::ExtractionAdapter;

    fn indexed_db(files: &[(&str, &str)]) -> SymbolDatabase {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, content).unwrap();
            paths.push(path);
        }
        let adapter = ExtractionAdapter::new();
        let mut db = SymbolDatabase::in_memory().unwrap();
        let batch = adapter.extract_files(&paths, dir.path()).unwrap();
        db.apply_flush(&[], &batch).unwrap();
        db
    }

    #[test]
    fn depth_out_of_range_is_validation_error() {
        let db = SymbolDatabase::in_memory().unwrap();
        let engine = TraceEngine::new(&db, None, None);

        for bad_depth in [0, 11] {
            let result = engine.trace(&TraceOptions {
                symbol_name: "anything".to_string(),
                max_depth: bad_depth,
                ..Default::default()
            });
            assert!(matches!(result, Err(TraceError::Validation(_))));
        }
    }

    #[test]
    fn unknown_symbol_returns_empty_path_with_error() {
        let db = SymbolDatabase::in_memory().unwrap();
        let engine = TraceEngine::new(&db, None, None);

        let path = engine
            .trace(&TraceOptions {
                symbol_name: "ghost".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(path.total_nodes, 0);
        assert!(path.root.is_none());
        assert!(path.error.as_deref().unwrap().contains("ghost"));
    }

    #[test]
    fn downstream_follows_direct_calls() {
        let db = indexed_db(&[(
            "app.py",
            "def helper():\n    pass\n\ndef main():\n    helper()\n",
        )]);
        let engine = TraceEngine::new(&db, None, None);

        let path = engine
            .trace(&TraceOptions {
                symbol_name: "main".to_string(),
                direction: TraceDirection::Downstream,
                ..Default::default()
            })
            .unwrap();

        let root = path.root.unwrap();
        assert_eq!(root.name, "main");
        assert!(root.children.iter().any(|c| c.name == "helper"));
        assert!(path.languages_found.contains(&"python".to_string()));
    }

    #[test]
    fn variant_matching_bridges_languages() {
        let db = indexed_db(&[
            (
                "src/services/user.ts",
                "export class UserService {\n    create() {\n    }\n}\n",
            ),
            ("api/users.py", "def user_service():\n    pass\n"),
        ]);
        let engine = TraceEngine::new(&db, None, None);

        let path = engine
            .trace(&TraceOptions {
                symbol_name: "UserService".to_string(),
                direction: TraceDirection::Downstream,
                ..Default::default()
            })
            .unwrap();

        let root = path.root.unwrap();
        let variant_child = root
            .children
            .iter()
            .find(|c| c.name == "user_service")
            .expect("variant child present");
        assert_eq!(variant_child.match_type, MatchType::Variant);
        assert_eq!(variant_child.language, "python");
        assert!(path.match_types.contains_key("variant"));
    }

    #[test]
    fn cycles_terminate_and_are_counted() {
        let db = indexed_db(&[(
            "cycle.py",
            "def ping():\n    pong()\n\ndef pong():\n    ping()\n",
        )]);
        let engine = TraceEngine::new(&db, None, None);

        let path = engine
            .trace(&TraceOptions {
                symbol_name: "ping".to_string(),
                direction: TraceDirection::Downstream,
                max_depth: 10,
                ..Default::default()
            })
            .unwrap();

        // Bounded traversal despite the ping <-> pong cycle.
        assert!(path.total_nodes < 16);
        assert!(path.cycles_detected > 0);
    }

    #[test]
    fn tree_formatting_renders_connectors() {
        let db = indexed_db(&[(
            "app.py",
            "def helper():\n    pass\n\ndef main():\n    helper()\n",
        )]);
        let engine = TraceEngine::new(&db, None, None);
        let path = engine
            .trace(&TraceOptions {
                symbol_name: "main".to_string(),
                ..Default::default()
            })
            .unwrap();

        let tree = format_as_tree(&path.root.unwrap());
        assert!(tree.starts_with("main (python) @ app.py:"));
        assert!(tree.contains("└─") || tree.contains("├─"));
        assert!(tree.contains("helper"));
    }
}
