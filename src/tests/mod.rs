// Miller's cross-component test suite.
//
// Unit tests live next to the modules they cover; the scenarios here run the
// whole pipeline (extract -> buffer -> flush -> query) the way the tools do.

pub mod scenarios;

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use crate::database::SymbolDatabase;
use crate::embeddings::vector_store::VectorStore;
use crate::embeddings::{Embedder, HashingEmbedder};
use crate::utils::ignore::IgnoreEngine;
use crate::workspace::WorkspaceIndexer;

/// A fully wired (in-memory stores) indexer over a temp directory.
pub struct TestRig {
    pub root: tempfile::TempDir,
    pub db: Arc<Mutex<SymbolDatabase>>,
    pub vector_store: Arc<RwLock<VectorStore>>,
    pub embedder: Arc<dyn Embedder>,
}

impl TestRig {
    pub fn new() -> Self {
        Self::with_embedder(Arc::new(HashingEmbedder::new()))
    }

    pub fn with_embedder(embedder: Arc<dyn Embedder>) -> Self {
        let root = tempfile::tempdir().expect("temp workspace");
        let db = Arc::new(Mutex::new(SymbolDatabase::in_memory().expect("db")));
        let vector_store = Arc::new(RwLock::new(
            VectorStore::in_memory(embedder.dimensions()).expect("vector store"),
        ));
        Self {
            root,
            db,
            vector_store,
            embedder,
        }
    }

    pub fn write_file(&self, rel_path: &str, content: &str) {
        let path = self.root.path().join(rel_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub fn indexer(&self) -> WorkspaceIndexer {
        WorkspaceIndexer::new(
            self.root.path().to_path_buf(),
            self.db.clone(),
            self.vector_store.clone(),
            self.embedder.clone(),
            Arc::new(IgnoreEngine::for_workspace(self.root.path())),
        )
    }

    pub fn index(&self) -> crate::workspace::IndexStats {
        self.indexer().index_workspace().expect("index pass")
    }

    pub fn workspace_root(&self) -> &Path {
        self.root.path()
    }
}

/// Extract the concatenated text content from a CallToolResult.
pub fn extract_text_from_result(result: &rust_mcp_sdk::schema::CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|content_block| {
            serde_json::to_value(content_block).ok().and_then(|json| {
                json.get("text")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            })
        })
        .collect::<Vec<_>>()
        .join("\n")
}
