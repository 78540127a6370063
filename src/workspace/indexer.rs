//! Workspace indexer: drives full scans and incremental updates through the
//! extraction adapter, the ingestion buffer, and both stores.
//!
//! Flush protocol (one transaction against the metadata store, mirrored into
//! the vector store): delete stale rows for updated files, insert files,
//! symbols, identifiers, and relationships, insert embedding rows, clear the
//! buffer. A final flush always runs at the end of a pass, the pattern FTS
//! index is rebuilt once per session, and the reachability closure is marked
//! stale whenever relationships changed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::database::SymbolDatabase;
use crate::embeddings::vector_store::{EmbeddingRow, VectorStore};
use crate::embeddings::Embedder;
use crate::extractors::{ExtractionAdapter, ExtractionBatch};
use crate::utils::ignore::{discover_files, IgnoreEngine};
use crate::utils::paths::to_relative_unix_style;
use crate::watcher::{FileEvent, FileWatcher, WatchBatch};

use super::buffer::IndexingBuffer;

/// Outcome of an indexing pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_deleted: usize,
    pub symbols_indexed: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
}

pub struct WorkspaceIndexer {
    root: PathBuf,
    db: Arc<Mutex<SymbolDatabase>>,
    vector_store: Arc<RwLock<VectorStore>>,
    embedder: Arc<dyn Embedder>,
    ignore: Arc<IgnoreEngine>,
    adapter: ExtractionAdapter,
    cancel: Arc<AtomicBool>,
}

impl WorkspaceIndexer {
    pub fn new(
        root: PathBuf,
        db: Arc<Mutex<SymbolDatabase>>,
        vector_store: Arc<RwLock<VectorStore>>,
        embedder: Arc<dyn Embedder>,
        ignore: Arc<IgnoreEngine>,
    ) -> Self {
        Self {
            root,
            db,
            vector_store,
            embedder,
            ignore,
            adapter: ExtractionAdapter::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for cancelling a running pass between file groups.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Files per extraction group, sized to the machine.
    fn file_batch_size() -> usize {
        (num_cpus::get() * 4).max(8)
    }

    /// Full workspace index. Unchanged files (same content hash) are skipped
    /// without extraction or embedding.
    pub fn index_workspace(&self) -> Result<IndexStats> {
        let start_time = std::time::Instant::now();

        let files = discover_files(&self.root, &self.ignore)?;
        info!("Indexing pass over {} candidate files", files.len());

        let known_hashes = {
            let db = self.db.lock().unwrap();
            db.get_file_hashes()
                .map_err(|e| anyhow::anyhow!("loading file hashes: {e}"))?
        };

        // Hash gate: drop files whose stored hash matches current content.
        let mut to_index: Vec<(PathBuf, bool)> = Vec::new();
        let mut skipped = 0usize;
        for path in files {
            let rel = to_relative_unix_style(&path, &self.root)?;
            match known_hashes.get(&rel) {
                Some(known) => {
                    let Ok(bytes) = std::fs::read(&path) else {
                        continue;
                    };
                    let current = ExtractionAdapter::content_hash(&bytes);
                    if &current == known {
                        skipped += 1;
                    } else {
                        to_index.push((path, true));
                    }
                }
                None => to_index.push((path, false)),
            }
        }

        let mut stats = IndexStats {
            files_skipped: skipped,
            ..Default::default()
        };

        let mut buffer = IndexingBuffer::default();
        let mut relationships_changed = false;
        let group_size = Self::file_batch_size();

        for group in to_index.chunks(group_size) {
            if self.cancel.load(Ordering::SeqCst) {
                info!("Indexing cancelled between file groups");
                stats.cancelled = true;
                break;
            }

            let paths: Vec<PathBuf> = group.iter().map(|(p, _)| p.clone()).collect();
            let updated: Vec<String> = group
                .iter()
                .filter(|(_, existed)| *existed)
                .map(|(p, _)| to_relative_unix_style(p, &self.root))
                .collect::<Result<_>>()?;

            // Extraction is CPU-bound: split the group across the worker pool
            // and merge the columnar results.
            let chunk_size = (paths.len() / rayon::current_num_threads().max(1)).max(1);
            let batches: Vec<ExtractionBatch> = paths
                .par_chunks(chunk_size)
                .map(|chunk| self.adapter.extract_files(chunk, &self.root))
                .collect::<Result<Vec<_>>>()?;

            let mut merged = ExtractionBatch::default();
            for mut batch in batches {
                merged.symbols.append(&mut batch.symbols);
                merged.identifiers.append(&mut batch.identifiers);
                merged.relationships.append(&mut batch.relationships);
                merged.files.append(&mut batch.files);
            }

            if !merged.relationships.is_empty() {
                relationships_changed = true;
            }
            stats.files_indexed += merged.files.len();

            buffer.add_batch(merged, updated);

            if buffer.should_flush() {
                stats.symbols_indexed += self.flush(&mut buffer)?;
            }
        }

        // Forced final flush even when no threshold was crossed.
        if !buffer.is_empty() && !stats.cancelled {
            stats.symbols_indexed += self.flush(&mut buffer)?;
        }

        if !stats.cancelled && stats.files_indexed > 0 {
            // Cross-file resolution adds Call edges the per-file extraction
            // could not see.
            let resolved = {
                let mut db = self.db.lock().unwrap();
                db.resolve_pending_identifiers()
                    .map_err(|e| anyhow::anyhow!("identifier resolution: {e}"))?
            };
            if resolved > 0 {
                relationships_changed = true;
            }

            // One FTS rebuild per batch session, not per flush. A fully
            // hash-gated pass writes nothing at all.
            self.vector_store
                .write()
                .unwrap()
                .rebuild_indexes()
                .context("rebuilding vector/pattern indexes")?;
        }

        if relationships_changed {
            let db = self.db.lock().unwrap();
            db.mark_reachability_stale()
                .map_err(|e| anyhow::anyhow!("marking reachability stale: {e}"))?;
        }

        stats.duration_ms = start_time.elapsed().as_millis() as u64;
        if stats.cancelled {
            // Re-arm for the next pass.
            self.cancel.store(false, Ordering::SeqCst);
        }
        info!(
            "Indexing pass complete: {} indexed, {} skipped, {} symbols in {}ms",
            stats.files_indexed, stats.files_skipped, stats.symbols_indexed, stats.duration_ms
        );
        Ok(stats)
    }

    /// Write the buffered batch to both stores and clear the buffer.
    ///
    /// Embedding failure drops the batch with a warning; the pass continues
    /// with existing data intact.
    fn flush(&self, buffer: &mut IndexingBuffer) -> Result<usize> {
        let texts = buffer.get_embedding_texts();
        let vectors = match self.embedder.embed_batch(&texts) {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!(
                    "Embedder failed for batch of {} symbols ({}); dropping batch",
                    texts.len(),
                    e
                );
                buffer.clear();
                return Ok(0);
            }
        };

        let files_to_clean: Vec<String> = buffer.files_to_clean().to_vec();
        let symbol_count = buffer.symbol_count();

        {
            let mut db = self.db.lock().unwrap();
            db.apply_flush(&files_to_clean, buffer.accumulated())
                .map_err(|e| anyhow::anyhow!("metadata flush: {e}"))?;
        }

        {
            let symbols = buffer.get_symbols_table();
            let rows: Vec<EmbeddingRow> = (0..symbols.len())
                .map(|i| {
                    let symbol = symbols.row(i);
                    EmbeddingRow::from_symbol(&symbol, vectors[i].clone())
                })
                .collect();

            let mut store = self.vector_store.write().unwrap();
            if !files_to_clean.is_empty() {
                store.delete_files_batch(&files_to_clean)?;
            }
            store.add_rows(rows)?;
        }

        debug!(
            "Flushed {} symbols / {} files ({} cleaned)",
            symbol_count,
            buffer.file_count(),
            files_to_clean.len()
        );
        buffer.clear();
        Ok(symbol_count)
    }

    /// Apply one watcher batch: deletions cascade through both stores,
    /// creations/modifications re-extract the file. The watcher's hash map is
    /// updated after each successful write so the gate tracks index state.
    pub fn apply_watch_batch(&self, batch: WatchBatch, watcher: &FileWatcher) -> Result<IndexStats> {
        let start_time = std::time::Instant::now();
        let mut stats = IndexStats::default();
        let mut relationships_changed = false;

        for (event, path, new_hash) in batch {
            let rel = to_relative_unix_style(&path, &self.root)?;
            match event {
                FileEvent::Deleted => {
                    self.remove_file(&rel)?;
                    watcher.remove_hash(&rel);
                    stats.files_deleted += 1;
                    relationships_changed = true;
                }
                FileEvent::Created | FileEvent::Modified => {
                    let extraction = self
                        .adapter
                        .extract_files(std::slice::from_ref(&path), &self.root)?;
                    if !extraction.relationships.is_empty() {
                        relationships_changed = true;
                    }

                    let mut buffer = IndexingBuffer::default();
                    stats.symbols_indexed += extraction.symbols.len();
                    buffer.add_batch(extraction, vec![rel.clone()]);
                    self.flush(&mut buffer)?;

                    if let Some(hash) = new_hash {
                        watcher.update_hash(&rel, &hash);
                    }
                    stats.files_indexed += 1;
                }
            }
        }

        {
            let mut db = self.db.lock().unwrap();
            if db
                .resolve_pending_identifiers()
                .map_err(|e| anyhow::anyhow!("identifier resolution: {e}"))?
                > 0
            {
                relationships_changed = true;
            }
        }

        // Coalesced: one index rebuild per delivered batch.
        self.vector_store.write().unwrap().rebuild_indexes()?;

        if relationships_changed {
            let db = self.db.lock().unwrap();
            db.mark_reachability_stale()
                .map_err(|e| anyhow::anyhow!("marking reachability stale: {e}"))?;
        }

        stats.duration_ms = start_time.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Delete one file from both stores. No tombstones are kept.
    pub fn remove_file(&self, rel_path: &str) -> Result<()> {
        {
            let db = self.db.lock().unwrap();
            db.delete_file(rel_path)
                .map_err(|e| anyhow::anyhow!("deleting {rel_path}: {e}"))?;
        }
        self.vector_store
            .write()
            .unwrap()
            .delete_files_batch(std::slice::from_ref(&rel_path.to_string()))?;
        debug!("Removed {} from both stores", rel_path);
        Ok(())
    }

    pub fn workspace_root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;

    fn make_indexer(root: &Path) -> WorkspaceIndexer {
        let db = Arc::new(Mutex::new(SymbolDatabase::in_memory().unwrap()));
        let store = Arc::new(RwLock::new(
            VectorStore::in_memory(HashingEmbedder::DEFAULT_DIMENSIONS).unwrap(),
        ));
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new());
        let ignore = Arc::new(IgnoreEngine::for_workspace(root));
        WorkspaceIndexer::new(root.to_path_buf(), db, store, embedder, ignore)
    }

    #[test]
    fn full_index_then_incremental_skip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(
            dir.path().join("src/models.py"),
            "class User:\n    def greet(self):\n        return 'hi'\n",
        )
        .unwrap();

        let indexer = make_indexer(dir.path());

        let first = indexer.index_workspace().unwrap();
        assert_eq!(first.files_indexed, 1);
        assert!(first.symbols_indexed >= 2);

        // Second pass without touching anything: zero writes.
        let second = indexer.index_workspace().unwrap();
        assert_eq!(second.files_indexed, 0);
        assert_eq!(second.files_skipped, 1);
        assert_eq!(second.symbols_indexed, 0);
    }

    #[test]
    fn reindex_after_content_change() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.py");
        std::fs::write(&file, "def first():\n    pass\n").unwrap();

        let indexer = make_indexer(dir.path());
        indexer.index_workspace().unwrap();

        std::fs::write(&file, "def second():\n    pass\n").unwrap();
        let stats = indexer.index_workspace().unwrap();
        assert_eq!(stats.files_indexed, 1);

        let db = indexer.db.lock().unwrap();
        assert!(db.get_symbol_by_name("second", None).unwrap().is_some());
        assert!(db.get_symbol_by_name("first", None).unwrap().is_none());
    }

    #[test]
    fn delete_removes_from_both_stores() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gone.py");
        std::fs::write(&file, "def vanishing():\n    pass\n").unwrap();

        let indexer = make_indexer(dir.path());
        indexer.index_workspace().unwrap();
        assert!(indexer.vector_store.read().unwrap().len() > 0);

        indexer.remove_file("gone.py").unwrap();

        let db = indexer.db.lock().unwrap();
        assert!(db.get_symbol_by_name("vanishing", None).unwrap().is_none());
        assert_eq!(indexer.vector_store.read().unwrap().len(), 0);
    }

    #[test]
    fn empty_workspace_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = make_indexer(dir.path());
        let stats = indexer.index_workspace().unwrap();
        assert_eq!(stats.files_indexed, 0);
        assert_eq!(stats.symbols_indexed, 0);
    }

    #[test]
    fn cancellation_stops_between_groups() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(
                dir.path().join(format!("f{i}.py")),
                format!("def f{i}():\n    pass\n"),
            )
            .unwrap();
        }

        let indexer = make_indexer(dir.path());
        indexer.cancel_flag().store(true, Ordering::SeqCst);

        let stats = indexer.index_workspace().unwrap();
        assert!(stats.cancelled);
        assert_eq!(stats.symbols_indexed, 0);

        // The flag re-arms; the next pass completes normally.
        let stats = indexer.index_workspace().unwrap();
        assert!(!stats.cancelled);
        assert_eq!(stats.files_indexed, 5);
    }
}
