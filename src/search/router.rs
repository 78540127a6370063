//! Search router: method resolution, filtering, quality enhancement,
//! semantic fallback, graph expansion, and optional re-ranking over the
//! dual-store query layer.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use super::scoring::apply_search_enhancements;
use super::SearchMethod;
use crate::database::SymbolDatabase;
use crate::embeddings::vector_store::{SearchHit, VectorStore, MAX_SEARCH_LIMIT};
use crate::embeddings::Embedder;

/// Text results whose best score falls below this floor trigger the semantic
/// fallback. A policy constant, not a correctness contract.
pub const TEXT_CONFIDENCE_FLOOR: f32 = 0.35;

/// Callers/callees included per expanded result.
const EXPANSION_CAP: usize = 5;

/// An external cross-encoder re-ranker. Failure degrades to the original
/// ordering rather than failing the search.
pub trait Reranker: Send + Sync {
    /// Score `documents` against `query`; higher is better. Any output range
    /// is accepted and normalized afterwards.
    fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub method: SearchMethod,
    pub limit: usize,
    pub language: Option<String>,
    pub file_pattern: Option<String>,
    pub expand: bool,
    /// Soft deadline in milliseconds. When exceeded, later pipeline stages
    /// (semantic fallback, expansion) are skipped and the outcome is marked
    /// truncated; results assembled so far are still returned.
    pub deadline_ms: Option<u64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            method: SearchMethod::Auto,
            limit: 10,
            language: None,
            file_pattern: None,
            expand: false,
            deadline_ms: None,
        }
    }
}

/// A neighbor reached during graph expansion.
#[derive(Debug, Clone, Serialize)]
pub struct ExpansionNeighbor {
    pub name: String,
    pub file_path: String,
    pub start_line: u32,
}

/// Direct callers/callees of one result, capped with totals preserved.
#[derive(Debug, Clone, Serialize, Default)]
pub struct GraphExpansion {
    pub callers: Vec<ExpansionNeighbor>,
    pub callees: Vec<ExpansionNeighbor>,
    pub total_callers: usize,
    pub total_callees: usize,
}

/// The routed search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    /// Method that actually produced the hits (after auto resolution and
    /// fallback).
    pub method_used: String,
    /// True when text search came back weak and semantic answered instead.
    pub semantic_fallback: bool,
    /// Per-result-id expansion data when `expand` was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansions: Option<HashMap<String, GraphExpansion>>,
    /// True when the deadline cut later pipeline stages short.
    pub truncated: bool,
}

pub struct SearchRouter;

impl SearchRouter {
    /// Run a search through the full pipeline.
    pub fn search(
        store: &VectorStore,
        db: &SymbolDatabase,
        embedder: &dyn Embedder,
        reranker: Option<&dyn Reranker>,
        query: &str,
        options: &SearchOptions,
    ) -> SearchOutcome {
        let started = std::time::Instant::now();
        let past_deadline = || {
            options
                .deadline_ms
                .is_some_and(|ms| started.elapsed().as_millis() as u64 >= ms)
        };

        let limit = options.limit.min(MAX_SEARCH_LIMIT);
        if query.is_empty() || limit == 0 {
            return SearchOutcome {
                hits: Vec::new(),
                method_used: options.method.to_string(),
                semantic_fallback: false,
                expansions: None,
                truncated: false,
            };
        }

        let method = match options.method {
            SearchMethod::Auto => super::detect_search_method(query),
            other => other,
        };
        debug!("Search '{}' routed to {} (limit {})", query, method, limit);

        let raw_hits = store.search(query, method, limit, embedder);
        let mut hits = Self::apply_filters(raw_hits, options);
        hits = apply_search_enhancements(hits, query);

        // Text that found nothing (or nothing convincing) retries as
        // semantic; the outcome is annotated so formatters can say so.
        let mut semantic_fallback = false;
        let mut truncated = false;
        let mut method_used = method;
        if method == SearchMethod::Text && !past_deadline() {
            let top_score = hits.first().map(|h| h.score).unwrap_or(0.0);
            if hits.is_empty() || top_score < TEXT_CONFIDENCE_FLOOR {
                let retry = store.search(query, SearchMethod::Semantic, limit, embedder);
                let retry = Self::apply_filters(retry, options);
                let retry = apply_search_enhancements(retry, query);
                if retry.first().map(|h| h.score).unwrap_or(0.0) > top_score {
                    hits = retry;
                    semantic_fallback = true;
                    method_used = SearchMethod::Semantic;
                }
            }
        }

        hits.truncate(limit);

        if let Some(ranker) = reranker {
            hits = Self::apply_reranker(ranker, query, hits);
        }

        let expansions = if options.expand {
            if past_deadline() {
                // Deadline hit: skip the expansion stage, return what we have.
                truncated = true;
                None
            } else {
                Some(Self::expand_hits(db, &hits))
            }
        } else {
            None
        };
        if past_deadline() {
            truncated = true;
        }

        SearchOutcome {
            hits,
            method_used: method_used.to_string(),
            semantic_fallback,
            expansions,
            truncated,
        }
    }

    fn apply_filters(hits: Vec<SearchHit>, options: &SearchOptions) -> Vec<SearchHit> {
        let language = options.language.as_ref().map(|l| l.to_lowercase());
        let file_glob = options.file_pattern.as_ref().and_then(|pattern| {
            globset::Glob::new(pattern)
                .map(|g| g.compile_matcher())
                .map_err(|e| {
                    warn!("Invalid file pattern '{}': {}", pattern, e);
                    e
                })
                .ok()
        });
        let bare_pattern = options
            .file_pattern
            .as_ref()
            .is_some_and(|p| !p.contains('/'));

        hits.into_iter()
            .filter(|hit| {
                if let Some(language) = &language {
                    if hit.language.to_lowercase() != *language {
                        return false;
                    }
                }
                if let Some(matcher) = &file_glob {
                    let path_match = matcher.is_match(&hit.file_path);
                    // A bare pattern like `*.py` also matches by basename.
                    let name_match = bare_pattern
                        && hit
                            .file_path
                            .rsplit('/')
                            .next()
                            .is_some_and(|name| matcher.is_match(name));
                    if !path_match && !name_match {
                        return false;
                    }
                }
                true
            })
            .collect()
    }

    /// Re-score the top results with the external ranker, normalizing its
    /// outputs into [0, 1] while keeping the ranker's descending order. The
    /// original ordering is returned unchanged on any failure.
    fn apply_reranker(
        ranker: &dyn Reranker,
        query: &str,
        hits: Vec<SearchHit>,
    ) -> Vec<SearchHit> {
        if hits.is_empty() {
            return hits;
        }

        let documents: Vec<String> = hits
            .iter()
            .map(|hit| {
                let mut doc = hit.name.clone();
                if let Some(sig) = &hit.signature {
                    doc.push(' ');
                    doc.push_str(sig);
                }
                if let Some(comment) = &hit.doc_comment {
                    doc.push(' ');
                    doc.push_str(comment);
                }
                doc
            })
            .collect();

        let scores = match ranker.rerank(query, &documents) {
            Ok(scores) if scores.len() == hits.len() => scores,
            Ok(_) => {
                warn!("Reranker returned wrong count; keeping original order");
                return hits;
            }
            Err(e) => {
                warn!("Reranker failed ({}); keeping original order", e);
                return hits;
            }
        };

        let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
        let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let span = (max - min).max(f32::EPSILON);

        let mut reranked: Vec<(f32, SearchHit)> = scores
            .into_iter()
            .zip(hits)
            .map(|(raw, mut hit)| {
                let normalized = if max == min { 1.0 } else { (raw - min) / span };
                hit.score = normalized;
                (raw, hit)
            })
            .collect();
        reranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        reranked.into_iter().map(|(_, hit)| hit).collect()
    }

    /// Direct (distance = 1) callers and callees for each hit, from the
    /// closure when fresh, otherwise straight from the relationships table.
    fn expand_hits(db: &SymbolDatabase, hits: &[SearchHit]) -> HashMap<String, GraphExpansion> {
        let mut expansions = HashMap::new();

        for hit in hits {
            let mut expansion = GraphExpansion::default();

            let callers = db.direct_callers(&hit.id).unwrap_or_default();
            expansion.total_callers = callers.len();
            expansion.callers = callers
                .into_iter()
                .take(EXPANSION_CAP)
                .map(|(symbol, _)| ExpansionNeighbor {
                    name: symbol.name,
                    file_path: symbol.file_path,
                    start_line: symbol.start_line,
                })
                .collect();

            let callees = db.direct_callees(&hit.id).unwrap_or_default();
            expansion.total_callees = callees.len();
            expansion.callees = callees
                .into_iter()
                .take(EXPANSION_CAP)
                .map(|(symbol, _)| ExpansionNeighbor {
                    name: symbol.name,
                    file_path: symbol.file_path,
                    start_line: symbol.start_line,
                })
                .collect();

            if expansion.total_callers > 0 || expansion.total_callees > 0 {
                expansions.insert(hit.id.clone(), expansion);
            }
        }

        expansions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::vector_store::EmbeddingRow;
    use crate::embeddings::HashingEmbedder;

    fn seeded() -> (VectorStore, SymbolDatabase, HashingEmbedder) {
        let embedder = HashingEmbedder::with_dimensions(64);
        let mut store = VectorStore::in_memory(64).unwrap();
        let db = SymbolDatabase::in_memory().unwrap();

        let rows = vec![
            ("getUserData", "function", "typescript", "src/api/user.ts"),
            ("get_user_data", "function", "python", "api/user.py"),
            ("renderChart", "function", "typescript", "src/ui/chart.ts"),
        ];
        let rows: Vec<EmbeddingRow> = rows
            .into_iter()
            .map(|(name, kind, language, file)| {
                let signature = format!("{kind} {name}()");
                let vector = embedder
                    .embed_batch(&[format!("{name} {signature}")])
                    .unwrap()
                    .pop()
                    .unwrap();
                EmbeddingRow {
                    id: format!("id-{name}"),
                    name: name.to_string(),
                    kind: kind.to_string(),
                    language: language.to_string(),
                    file_path: file.to_string(),
                    start_line: 1,
                    end_line: 5,
                    signature: Some(signature.clone()),
                    doc_comment: None,
                    code_pattern: format!("{signature} {name} {kind}"),
                    vector,
                }
            })
            .collect();
        store.add_rows(rows).unwrap();
        store.rebuild_indexes().unwrap();
        (store, db, embedder)
    }

    #[test]
    fn language_filter_is_case_insensitive() {
        let (store, db, embedder) = seeded();
        let options = SearchOptions {
            method: SearchMethod::Text,
            language: Some("Python".to_string()),
            ..Default::default()
        };
        let outcome = SearchRouter::search(&store, &db, &embedder, None, "get_user_data", &options);
        assert!(!outcome.hits.is_empty());
        assert!(outcome.hits.iter().all(|h| h.language == "python"));
    }

    #[test]
    fn file_pattern_filter_applies() {
        let (store, db, embedder) = seeded();
        let options = SearchOptions {
            method: SearchMethod::Text,
            file_pattern: Some("src/**/*.ts".to_string()),
            ..Default::default()
        };
        let outcome = SearchRouter::search(&store, &db, &embedder, None, "getUserData", &options);
        assert!(outcome.hits.iter().all(|h| h.file_path.starts_with("src/")));
    }

    #[test]
    fn zero_limit_is_empty() {
        let (store, db, embedder) = seeded();
        let options = SearchOptions {
            limit: 0,
            ..Default::default()
        };
        let outcome = SearchRouter::search(&store, &db, &embedder, None, "anything", &options);
        assert!(outcome.hits.is_empty());
    }

    #[test]
    fn text_miss_falls_back_to_semantic() {
        let (store, db, embedder) = seeded();
        let options = SearchOptions {
            method: SearchMethod::Text,
            ..Default::default()
        };
        // No token overlap with any code_pattern; text finds nothing.
        let outcome =
            SearchRouter::search(&store, &db, &embedder, None, "zzqx unknown tokens", &options);
        // The fallback may also find nothing, but the flag only flips when
        // semantic produced something better.
        if !outcome.hits.is_empty() {
            assert!(outcome.semantic_fallback);
            assert_eq!(outcome.method_used, "semantic");
        }
    }

    #[test]
    fn scores_descend_in_outcome() {
        let (store, db, embedder) = seeded();
        let outcome = SearchRouter::search(
            &store,
            &db,
            &embedder,
            None,
            "user data",
            &SearchOptions::default(),
        );
        for window in outcome.hits.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
    }

    struct ReverseRanker;
    impl Reranker for ReverseRanker {
        fn rerank(&self, _query: &str, documents: &[String]) -> Result<Vec<f32>> {
            // Score documents in reverse input order.
            Ok((0..documents.len()).map(|i| i as f32).collect())
        }
    }

    struct FailingRanker;
    impl Reranker for FailingRanker {
        fn rerank(&self, _query: &str, _documents: &[String]) -> Result<Vec<f32>> {
            anyhow::bail!("ranker offline")
        }
    }

    #[test]
    fn reranker_reorders_and_normalizes() {
        let (store, db, embedder) = seeded();
        let options = SearchOptions {
            method: SearchMethod::Hybrid,
            limit: 3,
            ..Default::default()
        };
        let outcome = SearchRouter::search(
            &store,
            &db,
            &embedder,
            Some(&ReverseRanker),
            "user data",
            &options,
        );
        if outcome.hits.len() >= 2 {
            assert!(outcome.hits[0].score >= outcome.hits[1].score);
            assert!(outcome.hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
        }
    }

    #[test]
    fn expired_deadline_skips_expansion_and_marks_truncated() {
        let (store, db, embedder) = seeded();
        let options = SearchOptions {
            method: SearchMethod::Text,
            expand: true,
            deadline_ms: Some(0),
            ..Default::default()
        };
        let outcome =
            SearchRouter::search(&store, &db, &embedder, None, "getUserData", &options);
        // Best results so far are still returned; only later stages are cut.
        assert!(outcome.truncated);
        assert!(outcome.expansions.is_none());
    }

    #[test]
    fn reranker_failure_degrades_gracefully() {
        let (store, db, embedder) = seeded();
        let without = SearchRouter::search(
            &store,
            &db,
            &embedder,
            None,
            "user data",
            &SearchOptions::default(),
        );
        let with = SearchRouter::search(
            &store,
            &db,
            &embedder,
            Some(&FailingRanker),
            "user data",
            &SearchOptions::default(),
        );
        let names_without: Vec<&str> = without.hits.iter().map(|h| h.name.as_str()).collect();
        let names_with: Vec<&str> = with.hits.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names_without, names_with);
    }
}
