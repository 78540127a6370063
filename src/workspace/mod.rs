// Miller Workspace Management
//
// Owns the `.miller` data directory and the per-workspace singletons: the
// metadata store, the vector store, the embedder handle, and the watcher.
// Everything is constructed in one `initialize` step and torn down in one
// `shutdown` step; never reinitialized without a full teardown.
//
// Layout:
//   .miller/<workspace_id>/metadata.db    relational store
//   .miller/<workspace_id>/vectors/       vector rows + pattern index
//   .miller/config/miller.toml            workspace configuration
//   .miller/logs/                         server logs
//   .miller/workspace_registry.json       workspace registry

pub mod buffer;
pub mod indexer;
pub mod registry;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::database::SymbolDatabase;
use crate::embeddings::vector_store::VectorStore;
use crate::embeddings::{Embedder, HashingEmbedder};
use crate::utils::ignore::IgnoreEngine;
use crate::watcher::{FileWatcher, WatchBatch};

pub use indexer::{IndexStats, WorkspaceIndexer};
pub use registry::{workspace_id_for, WorkspaceRegistry, WorkspaceType};

/// Configuration for a Miller workspace, stored as `miller.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Version of the workspace format
    pub version: String,
    /// Languages to index (empty = all supported)
    pub languages: Vec<String>,
    /// Extra ignore patterns on top of the defaults and .gitignore
    pub ignore_patterns: Vec<String>,
    /// Embedding model identifier
    pub embedding_model: String,
    /// Embedding dimensions
    pub embedding_dimensions: usize,
    /// Enable the incremental watcher
    pub incremental_updates: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            version: "0.4.0".to_string(),
            languages: vec![],
            ignore_patterns: vec![],
            embedding_model: "hashing".to_string(),
            embedding_dimensions: HashingEmbedder::DEFAULT_DIMENSIONS,
            incremental_updates: true,
        }
    }
}

/// Health snapshot reported by `manage_workspace health`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceHealth {
    pub workspace_id: String,
    pub root: String,
    pub file_count: i64,
    pub symbol_count: i64,
    pub identifier_count: i64,
    pub relationship_count: i64,
    pub vector_count: usize,
    pub watcher_running: bool,
    pub reachability_stale: bool,
}

/// Per-workspace singletons and their lifecycle.
pub struct MillerWorkspace {
    pub root: PathBuf,
    pub miller_dir: PathBuf,
    pub workspace_id: String,
    pub config: WorkspaceConfig,
    pub db: Arc<Mutex<SymbolDatabase>>,
    pub vector_store: Arc<RwLock<VectorStore>>,
    pub embedder: Arc<dyn Embedder>,
    pub ignore: Arc<IgnoreEngine>,
    watcher: Option<FileWatcher>,
}

impl MillerWorkspace {
    /// Initialize the workspace at `root`: create the `.miller` structure,
    /// load or write the config, open both stores, and register the
    /// workspace.
    pub fn initialize(root: PathBuf) -> Result<Self> {
        let root = root
            .canonicalize()
            .unwrap_or_else(|_| root.clone());
        info!("Initializing Miller workspace at: {}", root.display());

        let miller_dir = root.join(".miller");
        let workspace_id = workspace_id_for(&root);

        Self::create_folder_structure(&miller_dir, &workspace_id)?;
        let config = Self::load_or_create_config(&miller_dir)?;

        let db_path = miller_dir.join(&workspace_id).join("metadata.db");
        let db = SymbolDatabase::new(&db_path)
            .map_err(|e| anyhow!("opening metadata store at {}: {e}", db_path.display()))?;

        let vectors_dir = miller_dir.join(&workspace_id).join("vectors");
        let vector_store = VectorStore::open(&vectors_dir, config.embedding_dimensions)
            .with_context(|| format!("opening vector store at {}", vectors_dir.display()))?;

        let embedder: Arc<dyn Embedder> =
            Arc::new(HashingEmbedder::with_dimensions(config.embedding_dimensions));

        // Config patterns extend the defaults + .gitignore set.
        let ignore = Arc::new(build_ignore(&root, &config.ignore_patterns));

        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "workspace".to_string());
        let mut registry = WorkspaceRegistry::load(&miller_dir)?;
        registry.register(&root, &name, WorkspaceType::Primary)?;

        info!("Miller workspace initialized ({})", workspace_id);
        Ok(Self {
            root,
            miller_dir,
            workspace_id,
            config,
            db: Arc::new(Mutex::new(db)),
            vector_store: Arc::new(RwLock::new(vector_store)),
            embedder,
            ignore,
            watcher: None,
        })
    }

    fn create_folder_structure(miller_dir: &Path, workspace_id: &str) -> Result<()> {
        for folder in [
            miller_dir.join(workspace_id),
            miller_dir.join(workspace_id).join("vectors"),
            miller_dir.join("config"),
            miller_dir.join("logs"),
        ] {
            std::fs::create_dir_all(&folder)
                .map_err(|e| anyhow!("creating {}: {e}", folder.display()))?;
        }

        // Keep index data out of version control.
        let gitignore_path = miller_dir.join(".gitignore");
        if !gitignore_path.exists() {
            std::fs::write(
                &gitignore_path,
                "# Miller code intelligence data - do not commit\n*\n!.gitignore\n",
            )?;
        }
        Ok(())
    }

    fn load_or_create_config(miller_dir: &Path) -> Result<WorkspaceConfig> {
        let config_path = miller_dir.join("config").join("miller.toml");
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            match toml::from_str(&content) {
                Ok(config) => {
                    debug!("Loaded configuration from {}", config_path.display());
                    return Ok(config);
                }
                Err(e) => warn!("Config unreadable ({}); rewriting defaults", e),
            }
        }
        let config = WorkspaceConfig::default();
        let content = toml::to_string_pretty(&config)?;
        std::fs::write(&config_path, content)?;
        debug!("Wrote default configuration to {}", config_path.display());
        Ok(config)
    }

    /// Build an indexer sharing this workspace's stores.
    pub fn indexer(&self) -> WorkspaceIndexer {
        WorkspaceIndexer::new(
            self.root.clone(),
            self.db.clone(),
            self.vector_store.clone(),
            self.embedder.clone(),
            self.ignore.clone(),
        )
    }

    /// Start the incremental watcher, seeded with the stored file hashes.
    /// Returns the channel delivering change batches.
    pub fn start_watcher(&mut self) -> Result<tokio::sync::mpsc::UnboundedReceiver<WatchBatch>> {
        if self.watcher.is_some() {
            return Err(anyhow!("watcher already running"));
        }
        let hashes = {
            let db = self.db.lock().unwrap();
            db.get_file_hashes()
                .map_err(|e| anyhow!("loading file hashes: {e}"))?
        };
        let mut watcher = FileWatcher::new(self.root.clone(), hashes, self.ignore.clone());
        let rx = watcher.start()?;
        self.watcher = Some(watcher);
        Ok(rx)
    }

    pub fn watcher(&self) -> Option<&FileWatcher> {
        self.watcher.as_ref()
    }

    pub fn stop_watcher(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
    }

    /// Health snapshot across both stores and the watcher.
    pub fn health(&self) -> Result<WorkspaceHealth> {
        let db = self.db.lock().unwrap();
        Ok(WorkspaceHealth {
            workspace_id: self.workspace_id.clone(),
            root: self.root.to_string_lossy().to_string(),
            file_count: db.file_count().map_err(|e| anyhow!("{e}"))?,
            symbol_count: db.symbol_count().map_err(|e| anyhow!("{e}"))?,
            identifier_count: db.identifier_count().map_err(|e| anyhow!("{e}"))?,
            relationship_count: db.relationship_count().map_err(|e| anyhow!("{e}"))?,
            vector_count: self.vector_store.read().unwrap().len(),
            watcher_running: self.watcher.as_ref().is_some_and(|w| w.is_running()),
            reachability_stale: db.is_reachability_stale().map_err(|e| anyhow!("{e}"))?,
        })
    }

    /// Tear down: stop the watcher, persist vector rows, checkpoint the WAL.
    pub fn shutdown(&mut self) {
        info!("Shutting down workspace {}", self.workspace_id);
        self.stop_watcher();

        if let Err(e) = self.vector_store.write().unwrap().rebuild_indexes() {
            warn!("Vector store persist on shutdown failed: {}", e);
        }

        match self.db.lock().unwrap().checkpoint_wal() {
            Ok((busy, log, checkpointed)) => debug!(
                "WAL checkpoint complete: busy={}, log={}, checkpointed={}",
                busy, log, checkpointed
            ),
            Err(e) => warn!("WAL checkpoint failed: {}", e),
        }
    }
}

fn build_ignore(root: &Path, extra: &[String]) -> IgnoreEngine {
    if extra.is_empty() {
        IgnoreEngine::for_workspace(root)
    } else {
        // Merge config patterns with the .gitignore-derived set.
        let mut patterns = extra.to_vec();
        if let Ok(content) = std::fs::read_to_string(root.join(".gitignore")) {
            for line in content.lines() {
                let line = line.trim();
                if !line.is_empty() && !line.starts_with('#') && !line.starts_with('!') {
                    patterns.push(line.trim_end_matches('/').to_string());
                }
            }
        }
        IgnoreEngine::with_patterns(&patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_creates_layout_and_registry() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = MillerWorkspace::initialize(dir.path().to_path_buf()).unwrap();

        let miller_dir = &workspace.miller_dir;
        assert!(miller_dir.join(&workspace.workspace_id).join("metadata.db").exists());
        assert!(miller_dir.join(&workspace.workspace_id).join("vectors").is_dir());
        assert!(miller_dir.join("config").join("miller.toml").exists());
        assert!(miller_dir.join(registry::REGISTRY_FILE).exists());

        let registry = WorkspaceRegistry::load(miller_dir).unwrap();
        assert!(registry.get(&workspace.workspace_id).is_some());
    }

    #[test]
    fn config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _ = MillerWorkspace::initialize(dir.path().to_path_buf()).unwrap();
        }
        // Second init loads the config written by the first.
        let workspace = MillerWorkspace::initialize(dir.path().to_path_buf()).unwrap();
        assert_eq!(workspace.config.embedding_model, "hashing");
        assert_eq!(
            workspace.config.embedding_dimensions,
            HashingEmbedder::DEFAULT_DIMENSIONS
        );
    }

    #[test]
    fn health_reports_counts_after_indexing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("main.py"),
            "def entry():\n    helper()\n\ndef helper():\n    pass\n",
        )
        .unwrap();

        let workspace = MillerWorkspace::initialize(dir.path().to_path_buf()).unwrap();
        workspace.indexer().index_workspace().unwrap();

        let health = workspace.health().unwrap();
        assert_eq!(health.file_count, 1);
        assert!(health.symbol_count >= 2);
        assert!(health.vector_count >= 2);
        assert!(!health.watcher_running);
    }
}
