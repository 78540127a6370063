//! Dual-index symbol store: embedding rows + pattern FTS.
//!
//! One logical `symbols` table keyed by id. Each row carries the full symbol
//! projection plus the non-null `code_pattern` string and unit vector. Two
//! indexes are maintained over it: the Tantivy pattern index (text/pattern
//! methods) and an HNSW graph over the vectors (semantic method). Hybrid
//! merges both result sets, deduplicating by id and keeping the max of the
//! normalized scores.
//!
//! Rows persist as JSONL under the workspace vectors directory; the HNSW
//! graph is rebuilt from rows on load rather than persisted.

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{cosine_similarity, Embedder};
use crate::extractors::Symbol;
use crate::search::{PatternIndex, SearchMethod};

const HNSW_MAX_LAYERS: usize = 16;
const HNSW_MAX_CONNECTIONS: usize = 32;
const HNSW_EF_CONSTRUCTION: usize = 400;

/// Upper bound on any search limit.
pub const MAX_SEARCH_LIMIT: usize = 1000;

/// One row of the vector store's `symbols` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRow {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub language: String,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_comment: Option<String>,
    /// Pattern-preserving content: `"<signature?> <name> <kind>"`. Non-null.
    pub code_pattern: String,
    /// Unit-normalized embedding. Non-null.
    pub vector: Vec<f32>,
}

impl EmbeddingRow {
    pub fn from_symbol(symbol: &Symbol, vector: Vec<f32>) -> Self {
        Self {
            id: symbol.id.clone(),
            name: symbol.name.clone(),
            kind: symbol.kind.to_string(),
            language: symbol.language.clone(),
            file_path: symbol.file_path.clone(),
            start_line: symbol.start_line,
            end_line: symbol.end_line,
            signature: symbol.signature.clone(),
            doc_comment: symbol.doc_comment.clone(),
            code_pattern: symbol.code_pattern(),
            vector,
        }
    }
}

/// A scored search result from any method.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub language: String,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_comment: Option<String>,
    pub score: f32,
}

impl SearchHit {
    fn from_row(row: &EmbeddingRow, score: f32) -> Self {
        Self {
            id: row.id.clone(),
            name: row.name.clone(),
            kind: row.kind.clone(),
            language: row.language.clone(),
            file_path: row.file_path.clone(),
            start_line: row.start_line,
            end_line: row.end_line,
            signature: row.signature.clone(),
            doc_comment: row.doc_comment.clone(),
            score,
        }
    }
}

pub struct VectorStore {
    dimensions: usize,
    rows: HashMap<String, EmbeddingRow>,
    hnsw: Option<Hnsw<'static, f32, DistCosine>>,
    /// HNSW uses dense usize ids; this maps them back to symbol ids.
    id_mapping: Vec<String>,
    pattern_index: PatternIndex,
    /// Persistence root; None for in-memory stores.
    dir: Option<PathBuf>,
}

impl VectorStore {
    /// Open (or create) the store under `dir`, loading persisted rows and
    /// rebuilding the vector index from them.
    pub fn open(dir: &Path, dimensions: usize) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let pattern_index = PatternIndex::open_or_create(&dir.join("pattern"))?;

        let mut store = Self {
            dimensions,
            rows: HashMap::new(),
            hnsw: None,
            id_mapping: Vec::new(),
            pattern_index,
            dir: Some(dir.to_path_buf()),
        };

        store.load_rows()?;
        if !store.rows.is_empty() {
            store.rebuild_hnsw();
        }
        Ok(store)
    }

    /// Ephemeral store for tests.
    pub fn in_memory(dimensions: usize) -> Result<Self> {
        Ok(Self {
            dimensions,
            rows: HashMap::new(),
            hnsw: None,
            id_mapping: Vec::new(),
            pattern_index: PatternIndex::in_memory()?,
            dir: None,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn get_row(&self, id: &str) -> Option<&EmbeddingRow> {
        self.rows.get(id)
    }

    /// Append rows to the store and the pattern index.
    ///
    /// Vectors must match the store dimension; rows violating it are
    /// rejected. Indexes are not rebuilt here; callers coalesce many adds and
    /// finish with [`rebuild_indexes`](Self::rebuild_indexes).
    pub fn add_rows(&mut self, rows: Vec<EmbeddingRow>) -> Result<usize> {
        let mut added = 0;
        for row in rows {
            if row.vector.len() != self.dimensions {
                anyhow::bail!(
                    "vector dimensions {} do not match expected {}",
                    row.vector.len(),
                    self.dimensions
                );
            }
            self.pattern_index.add_document(
                &row.id,
                &row.name,
                &row.kind,
                &row.language,
                &row.file_path,
                row.start_line,
                row.end_line,
                row.signature.as_deref(),
                row.doc_comment.as_deref(),
                &row.code_pattern,
            )?;
            self.rows.insert(row.id.clone(), row);
            added += 1;
        }
        Ok(added)
    }

    /// Delete every row whose `file_path` is in `paths`, in one pass.
    pub fn delete_files_batch(&mut self, paths: &[String]) -> Result<usize> {
        let path_set: HashSet<&str> = paths.iter().map(String::as_str).collect();
        let doomed: Vec<String> = self
            .rows
            .values()
            .filter(|row| path_set.contains(row.file_path.as_str()))
            .map(|row| row.id.clone())
            .collect();

        for path in &path_set {
            self.pattern_index.delete_file(path)?;
        }
        for id in &doomed {
            self.rows.remove(id);
        }
        debug!("Deleted {} vector rows for {} files", doomed.len(), paths.len());
        Ok(doomed.len())
    }

    /// Replace all rows for one file: delete-then-append inside the store.
    /// The pattern index rebuild can be deferred (`rebuild_index = false`)
    /// when many files update in a batch.
    pub fn update_file_symbols(
        &mut self,
        file_path: &str,
        rows: Vec<EmbeddingRow>,
        rebuild_index: bool,
    ) -> Result<usize> {
        self.delete_files_batch(std::slice::from_ref(&file_path.to_string()))?;
        let added = self.add_rows(rows)?;
        if rebuild_index {
            self.rebuild_indexes()?;
        }
        Ok(added)
    }

    /// Publish pending pattern-index mutations, rebuild the HNSW graph, and
    /// persist rows. Called once at the end of a batch indexing session.
    pub fn rebuild_indexes(&mut self) -> Result<()> {
        self.pattern_index.commit()?;
        self.rebuild_hnsw();
        self.persist()?;
        Ok(())
    }

    fn rebuild_hnsw(&mut self) {
        if self.rows.is_empty() {
            self.hnsw = None;
            self.id_mapping.clear();
            return;
        }

        let nb_elem = self.rows.len();
        let mut hnsw = Hnsw::<'static, f32, DistCosine>::new(
            HNSW_MAX_CONNECTIONS,
            nb_elem,
            HNSW_MAX_LAYERS,
            HNSW_EF_CONSTRUCTION,
            DistCosine {},
        );

        // Sort by symbol id: HashMap iteration order would make the graph
        // non-deterministic across runs.
        let mut sorted: Vec<(&String, &EmbeddingRow)> = self.rows.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        self.id_mapping.clear();
        self.id_mapping.reserve(nb_elem);
        let mut data = Vec::with_capacity(nb_elem);
        for (idx, (id, row)) in sorted.iter().enumerate() {
            self.id_mapping.push((*id).clone());
            data.push((&row.vector, idx));
        }

        hnsw.parallel_insert(&data);
        hnsw.set_searching_mode(true);
        self.hnsw = Some(hnsw);
        debug!("HNSW index rebuilt: {} vectors", nb_elem);
    }

    /// Nearest neighbors under cosine similarity, hydrated and scored.
    /// Candidates come from the HNSW graph when built, otherwise an exact
    /// scan; either way the final score is the exact cosine.
    pub fn search_semantic_vector(&self, query_vector: &[f32], limit: usize) -> Vec<SearchHit> {
        if query_vector.len() != self.dimensions || limit == 0 || self.rows.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = match &self.hnsw {
            Some(hnsw) => {
                let ef_search = (limit * 2).max(50);
                hnsw.search(query_vector, limit.min(self.rows.len()), ef_search)
                    .into_iter()
                    .filter_map(|neighbor| {
                        let id = self.id_mapping.get(neighbor.d_id)?;
                        let row = self.rows.get(id)?;
                        let score = cosine_similarity(query_vector, &row.vector).max(0.0);
                        Some(SearchHit::from_row(row, score))
                    })
                    .collect()
            }
            None => {
                let mut scored: Vec<SearchHit> = self
                    .rows
                    .values()
                    .map(|row| {
                        let score = cosine_similarity(query_vector, &row.vector).max(0.0);
                        SearchHit::from_row(row, score)
                    })
                    .collect();
                scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
                scored.truncate(limit);
                scored
            }
        };

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }

    /// Multi-method search entry point.
    ///
    /// `auto` resolves by query shape (pattern characters route to pattern
    /// search). Limits are clamped to [`MAX_SEARCH_LIMIT`]; a zero limit or
    /// empty query short-circuits to an empty list.
    pub fn search(
        &self,
        query: &str,
        method: SearchMethod,
        limit: usize,
        embedder: &dyn Embedder,
    ) -> Vec<SearchHit> {
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }
        let limit = limit.min(MAX_SEARCH_LIMIT);

        let method = match method {
            SearchMethod::Auto => crate::search::detect_search_method(query),
            other => other,
        };

        match method {
            SearchMethod::Text => self.search_text(query, limit),
            SearchMethod::Pattern => self.search_pattern(query, limit),
            SearchMethod::Semantic => self.search_semantic(query, limit, embedder),
            SearchMethod::Hybrid => self.search_hybrid(query, limit, embedder),
            SearchMethod::Auto => unreachable!("auto resolved above"),
        }
    }

    fn search_text(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        self.pattern_index
            .search_text(query, limit)
            .into_iter()
            .map(hit_from_pattern)
            .collect()
    }

    fn search_pattern(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .pattern_index
            .search_pattern(query, limit)
            .into_iter()
            .map(hit_from_pattern)
            .collect();
        hits.truncate(limit);
        hits
    }

    fn search_semantic(&self, query: &str, limit: usize, embedder: &dyn Embedder) -> Vec<SearchHit> {
        let query_vector = match embedder.embed_query(query) {
            Ok(vector) => vector,
            Err(e) => {
                // Embedder unavailable: semantic degrades to text.
                warn!("Embedder failed for query '{}': {} - degrading to text", query, e);
                return self.search_text(query, limit);
            }
        };
        self.search_semantic_vector(&query_vector, limit)
    }

    /// Hybrid fusion: merge text and semantic result sets, deduplicating by
    /// id and keeping the max of the normalized scores.
    fn search_hybrid(&self, query: &str, limit: usize, embedder: &dyn Embedder) -> Vec<SearchHit> {
        let text_hits = self.search_text(query, limit);
        let semantic_hits = self.search_semantic(query, limit, embedder);

        let mut merged: HashMap<String, SearchHit> = HashMap::new();
        for hit in semantic_hits.into_iter().chain(text_hits) {
            match merged.get_mut(&hit.id) {
                Some(existing) => existing.score = existing.score.max(hit.score),
                None => {
                    merged.insert(hit.id.clone(), hit);
                }
            }
        }

        let mut hits: Vec<SearchHit> = merged.into_values().collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits
    }

    // --- Persistence ---

    fn rows_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join("symbols.jsonl"))
    }

    fn load_rows(&mut self) -> Result<()> {
        let Some(path) = self.rows_path() else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let file = std::fs::File::open(&path)
            .with_context(|| format!("opening vector rows at {}", path.display()))?;
        let reader = std::io::BufReader::new(file);
        let mut loaded = 0usize;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EmbeddingRow>(&line) {
                Ok(row) => {
                    self.rows.insert(row.id.clone(), row);
                    loaded += 1;
                }
                Err(e) => warn!("Skipping corrupt vector row: {}", e),
            }
        }
        info!("Loaded {} vector rows from {}", loaded, path.display());
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = self.rows_path() else {
            return Ok(());
        };
        let tmp = path.with_extension("jsonl.tmp");
        {
            let file = std::fs::File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            let mut sorted: Vec<&EmbeddingRow> = self.rows.values().collect();
            sorted.sort_by(|a, b| a.id.cmp(&b.id));
            for row in sorted {
                serde_json::to_writer(&mut writer, row)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp, &path)?;
        debug!("Persisted {} vector rows to {}", self.rows.len(), path.display());
        Ok(())
    }
}

fn hit_from_pattern(hit: crate::search::pattern_index::PatternHit) -> SearchHit {
    SearchHit {
        id: hit.id,
        name: hit.name,
        kind: hit.kind,
        language: hit.language,
        file_path: hit.file_path,
        start_line: hit.start_line,
        end_line: hit.end_line,
        signature: hit.signature,
        doc_comment: hit.doc_comment,
        score: hit.score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::extractors::{symbol_id, SymbolKind};

    fn row(name: &str, kind: SymbolKind, language: &str, file: &str, signature: &str, vector: Vec<f32>) -> EmbeddingRow {
        EmbeddingRow {
            id: symbol_id(file, name, 0, kind),
            name: name.to_string(),
            kind: kind.to_string(),
            language: language.to_string(),
            file_path: file.to_string(),
            start_line: 1,
            end_line: 5,
            signature: Some(signature.to_string()),
            doc_comment: None,
            code_pattern: format!("{signature} {name} {kind}"),
            vector,
        }
    }

    fn unit(mut v: Vec<f32>) -> Vec<f32> {
        crate::embeddings::normalize(&mut v);
        v
    }

    #[test]
    fn semantic_search_orders_by_cosine() {
        let mut store = VectorStore::in_memory(3).unwrap();
        store
            .add_rows(vec![
                row("close", SymbolKind::Function, "python", "a.py", "def close()", unit(vec![1.0, 0.1, 0.0])),
                row("far", SymbolKind::Function, "python", "b.py", "def far()", unit(vec![0.0, 1.0, 0.0])),
            ])
            .unwrap();
        store.pattern_index.commit().unwrap();

        let hits = store.search_semantic_vector(&unit(vec![1.0, 0.0, 0.0]), 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].name, "close");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut store = VectorStore::in_memory(3).unwrap();
        let result = store.add_rows(vec![row(
            "bad",
            SymbolKind::Function,
            "python",
            "a.py",
            "def bad()",
            vec![1.0, 0.0],
        )]);
        assert!(result.is_err());
    }

    #[test]
    fn update_file_symbols_deletes_then_appends() {
        let mut store = VectorStore::in_memory(3).unwrap();
        store
            .add_rows(vec![row("old", SymbolKind::Function, "python", "a.py", "def old()", unit(vec![1.0, 0.0, 0.0]))])
            .unwrap();
        store.rebuild_indexes().unwrap();

        store
            .update_file_symbols(
                "a.py",
                vec![row("new", SymbolKind::Function, "python", "a.py", "def new()", unit(vec![0.0, 1.0, 0.0]))],
                true,
            )
            .unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.search(
            "new",
            SearchMethod::Text,
            10,
            &HashingEmbedder::with_dimensions(3)
        )
        .iter()
        .any(|h| h.name == "new"));
        assert!(store
            .search("old", SearchMethod::Text, 10, &HashingEmbedder::with_dimensions(3))
            .is_empty());
    }

    #[test]
    fn hybrid_merges_and_dedupes_by_id() {
        let embedder = HashingEmbedder::with_dimensions(64);
        let mut store = VectorStore::in_memory(64).unwrap();

        let vector = embedder.embed_query("authenticate user credentials").unwrap();
        store
            .add_rows(vec![row(
                "authenticate_user",
                SymbolKind::Function,
                "python",
                "auth.py",
                "def authenticate_user(username, password)",
                vector,
            )])
            .unwrap();
        store.rebuild_indexes().unwrap();

        let hits = store.search("authenticate_user", SearchMethod::Hybrid, 10, &embedder);
        // One row, found by both branches, must appear exactly once.
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score <= 1.0 && hits[0].score > 0.0);
    }

    #[test]
    fn search_clamps_limits() {
        let store = VectorStore::in_memory(3).unwrap();
        let embedder = HashingEmbedder::with_dimensions(3);
        assert!(store.search("anything", SearchMethod::Text, 0, &embedder).is_empty());
        // Oversized limits are clamped rather than erroring.
        let _ = store.search("anything", SearchMethod::Text, 5000, &embedder);
    }

    #[test]
    fn persistence_round_trips_rows() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = VectorStore::open(dir.path(), 3).unwrap();
            store
                .add_rows(vec![row("keep", SymbolKind::Function, "python", "a.py", "def keep()", unit(vec![1.0, 0.0, 0.0]))])
                .unwrap();
            store.rebuild_indexes().unwrap();
        }

        let store = VectorStore::open(dir.path(), 3).unwrap();
        assert_eq!(store.len(), 1);
        let hits = store.search_semantic_vector(&unit(vec![1.0, 0.0, 0.0]), 5);
        assert_eq!(hits[0].name, "keep");
    }
}
