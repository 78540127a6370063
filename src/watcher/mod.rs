// Miller's File Watcher
//
// Detects source-file changes and delivers hash-gated, debounced event
// batches to the indexer. Two backends share one public surface: the native
// backend wraps the OS notification primitive (notify), and a polled
// fallback takes over on networked/virtualized mounts where native events
// are unreliable (WSL accessing Windows drives through the 9P bridge).

pub mod debouncer;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::utils::ignore::IgnoreEngine;
use debouncer::{Debouncer, DEBOUNCE_WINDOW};

/// Filesystem change kinds the engine distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEvent {
    Created,
    Modified,
    Deleted,
}

/// One delivered batch: deduplicated per path, DELETED dominant, hashes
/// attached for non-deletions.
pub type WatchBatch = Vec<(FileEvent, PathBuf, Option<String>)>;

/// Poll interval of the fallback backend.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Detect a WSL-like environment from the kernel marker.
fn is_wsl() -> bool {
    if std::env::var("WSL_DISTRO_NAME").is_ok() {
        return true;
    }
    std::fs::read_to_string("/proc/version")
        .map(|version| {
            let version = version.to_lowercase();
            version.contains("microsoft") || version.contains("wsl")
        })
        .unwrap_or(false)
}

/// Windows drives mount under `/mnt/<letter>/` inside WSL.
fn is_windows_mount(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    let Some(rest) = path_str.strip_prefix("/mnt/") else {
        return false;
    };
    let mut chars = rest.chars();
    match (chars.next(), chars.next()) {
        (Some(drive), next) => drive.is_ascii_alphabetic() && matches!(next, None | Some('/')),
        _ => false,
    }
}

/// Whether the polled fallback should be used for this workspace root.
/// Native inotify does not propagate across the 9P bridge, so WSL plus a
/// Windows mount means polling.
pub fn needs_polling_fallback(workspace_root: &Path) -> bool {
    is_wsl() && is_windows_mount(workspace_root)
}

/// Temporary files editors and test runners churn through; dropped before
/// debouncing so they never reach the indexer.
fn is_temp_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".tmp")
        || name.contains(".tmp.")
        || name.ends_with('~')
        || name.ends_with(".swp")
        || name.ends_with(".swo")
        || name.starts_with(".#")
}

enum Backend {
    Native(notify::RecommendedWatcher),
    Polled(tokio::task::JoinHandle<()>),
}

/// Hash-gated file watcher with native and polled backends.
///
/// The backend handle lives behind a mutex so the watcher (and the workspace
/// holding it) stays `Sync` even when the OS watcher type is not.
pub struct FileWatcher {
    workspace_root: PathBuf,
    /// Last-known content hash per workspace-relative path. Updated by the
    /// indexer through `update_hash`/`remove_hash` after successful writes,
    /// so the gate tracks actual index state. Lock hold times are short.
    hashes: Arc<Mutex<HashMap<String, String>>>,
    ignore: Arc<IgnoreEngine>,
    backend: Mutex<Option<Backend>>,
    dispatch_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    force_polling: bool,
}

impl FileWatcher {
    /// Create a watcher (not started). `initial_hashes` seeds the gate with
    /// the hashes of everything already indexed.
    pub fn new(
        workspace_root: PathBuf,
        initial_hashes: HashMap<String, String>,
        ignore: Arc<IgnoreEngine>,
    ) -> Self {
        Self {
            workspace_root,
            hashes: Arc::new(Mutex::new(initial_hashes)),
            ignore,
            backend: Mutex::new(None),
            dispatch_task: Mutex::new(None),
            force_polling: false,
        }
    }

    /// Force the polled backend regardless of environment (tests, NFS).
    pub fn with_forced_polling(mut self) -> Self {
        self.force_polling = true;
        self
    }

    pub fn is_running(&self) -> bool {
        self.backend.lock().unwrap().is_some()
    }

    pub fn tracked_file_count(&self) -> usize {
        self.hashes.lock().unwrap().len()
    }

    /// Record the hash the index now holds for a path. Call after a
    /// successful write so unchanged saves stop re-indexing.
    pub fn update_hash(&self, rel_path: &str, new_hash: &str) {
        self.hashes
            .lock()
            .unwrap()
            .insert(rel_path.to_string(), new_hash.to_string());
    }

    /// Drop a path from hash tracking. Call after a delete is processed.
    pub fn remove_hash(&self, rel_path: &str) {
        self.hashes.lock().unwrap().remove(rel_path);
    }

    /// Start watching. Returns the channel that delivers event batches.
    ///
    /// Errors if already running; `stop()` first to restart.
    pub fn start(&mut self) -> Result<mpsc::UnboundedReceiver<WatchBatch>> {
        if self.is_running() {
            return Err(anyhow!("FileWatcher is already running"));
        }

        let (batch_tx, batch_rx) = mpsc::unbounded_channel();

        if self.force_polling || needs_polling_fallback(&self.workspace_root) {
            info!(
                "Starting polled file watcher for {} (fallback mode)",
                self.workspace_root.display()
            );
            let handle = self.start_polled(batch_tx);
            *self.backend.lock().unwrap() = Some(Backend::Polled(handle));
        } else {
            info!(
                "Starting native file watcher for {} ({} files tracked)",
                self.workspace_root.display(),
                self.tracked_file_count()
            );
            match self.start_native(batch_tx.clone()) {
                Ok(watcher) => *self.backend.lock().unwrap() = Some(Backend::Native(watcher)),
                Err(e) => {
                    // Native backend failure downgrades to polling instead of
                    // leaving the workspace unwatched.
                    warn!("Native watcher failed to start ({}); using polled fallback", e);
                    let handle = self.start_polled(batch_tx);
                    *self.backend.lock().unwrap() = Some(Backend::Polled(handle));
                }
            }
        }

        Ok(batch_rx)
    }

    /// Stop watching and release OS resources. Always safe to call.
    pub fn stop(&mut self) {
        if let Some(backend) = self.backend.lock().unwrap().take() {
            match backend {
                Backend::Native(watcher) => drop(watcher),
                Backend::Polled(handle) => handle.abort(),
            }
            info!("File watcher stopped");
        }
        if let Some(task) = self.dispatch_task.lock().unwrap().take() {
            task.abort();
        }
    }

    fn start_native(
        &mut self,
        batch_tx: mpsc::UnboundedSender<WatchBatch>,
    ) -> Result<notify::RecommendedWatcher> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<(FileEvent, PathBuf)>();

        let root = self.workspace_root.clone();
        let ignore = self.ignore.clone();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    warn!("File watcher error: {}", e);
                    return;
                }
            };
            let mapped = match event.kind {
                EventKind::Create(_) => FileEvent::Created,
                EventKind::Modify(_) => FileEvent::Modified,
                EventKind::Remove(_) => FileEvent::Deleted,
                _ => return,
            };
            for path in event.paths {
                if is_temp_file(&path) || ignore.should_ignore(&path, &root, false) {
                    continue;
                }
                if raw_tx.send((mapped, path)).is_err() {
                    return;
                }
            }
        })?;

        watcher
            .watch(&self.workspace_root, RecursiveMode::Recursive)
            .context("Failed to start watching workspace")?;

        // Debounce + hash-gate stage.
        let root = self.workspace_root.clone();
        let hashes = self.hashes.clone();
        let dispatch = tokio::spawn(async move {
            let mut debouncer = Debouncer::new(DEBOUNCE_WINDOW);
            loop {
                let timeout = tokio::time::timeout(DEBOUNCE_WINDOW, raw_rx.recv()).await;
                match timeout {
                    Ok(Some((event, path))) => debouncer.push(event, path),
                    Ok(None) => break,
                    Err(_) => {
                        // Quiet window elapsed.
                        if !debouncer.is_empty() {
                            let batch = gate_batch(debouncer.flush(), &root, &hashes);
                            if !batch.is_empty() && batch_tx.send(batch).is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        });
        *self.dispatch_task.lock().unwrap() = Some(dispatch);

        Ok(watcher)
    }

    fn start_polled(
        &mut self,
        batch_tx: mpsc::UnboundedSender<WatchBatch>,
    ) -> tokio::task::JoinHandle<()> {
        let root = self.workspace_root.clone();
        let hashes = self.hashes.clone();
        let ignore = self.ignore.clone();

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(POLL_INTERVAL).await;

                let scan_root = root.clone();
                let scan_ignore = ignore.clone();
                let known: HashMap<String, String> = hashes.lock().unwrap().clone();

                // Walking and hashing are blocking work.
                let scan = tokio::task::spawn_blocking(move || {
                    scan_for_changes(&scan_root, &scan_ignore, &known)
                })
                .await;

                let Ok(raw_events) = scan else { continue };
                if raw_events.is_empty() {
                    continue;
                }

                let mut debouncer = Debouncer::new(DEBOUNCE_WINDOW);
                for (event, path) in raw_events {
                    if is_temp_file(&path) {
                        continue;
                    }
                    debouncer.push(event, path);
                }
                let batch = gate_batch(debouncer.flush(), &root, &hashes);
                if !batch.is_empty() && batch_tx.send(batch).is_err() {
                    break;
                }
            }
        })
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Apply the hash gate: an event survives only if the recomputed content
/// hash differs from the last-known one. Deletions pass through with no
/// hash.
fn gate_batch(
    events: Vec<(FileEvent, PathBuf)>,
    root: &Path,
    hashes: &Arc<Mutex<HashMap<String, String>>>,
) -> WatchBatch {
    let mut batch = Vec::new();
    for (event, path) in events {
        let rel = crate::utils::paths::to_relative_unix_style(&path, root).unwrap_or_default();
        if rel.is_empty() {
            continue;
        }

        if event == FileEvent::Deleted {
            // Only report deletions of files the index knows about.
            let known = hashes.lock().unwrap().contains_key(&rel);
            if known {
                batch.push((FileEvent::Deleted, path, None));
            }
            continue;
        }

        let Ok(bytes) = std::fs::read(&path) else {
            debug!("Skipping unreadable changed file {:?}", path);
            continue;
        };
        let new_hash = blake3::hash(&bytes).to_hex().to_string();

        let unchanged = hashes
            .lock()
            .unwrap()
            .get(&rel)
            .is_some_and(|known| known == &new_hash);
        if unchanged {
            debug!("File {} unchanged (hash match), suppressing event", rel);
            continue;
        }

        batch.push((event, path, Some(new_hash)));
    }
    batch
}

/// One polling sweep: diff the filesystem against the known hash map.
fn scan_for_changes(
    root: &Path,
    ignore: &IgnoreEngine,
    known: &HashMap<String, String>,
) -> Vec<(FileEvent, PathBuf)> {
    let mut events = Vec::new();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();

    if let Ok(files) = crate::utils::ignore::discover_files(root, ignore) {
        for path in files {
            let Ok(rel) = crate::utils::paths::to_relative_unix_style(&path, root) else {
                continue;
            };
            seen.insert(rel.clone(), path.clone());
            match known.get(&rel) {
                None => events.push((FileEvent::Created, path)),
                Some(known_hash) => {
                    let Ok(bytes) = std::fs::read(&path) else { continue };
                    let hash = blake3::hash(&bytes).to_hex().to_string();
                    if &hash != known_hash {
                        events.push((FileEvent::Modified, path));
                    }
                }
            }
        }
    }

    for rel in known.keys() {
        if !seen.contains_key(rel) {
            events.push((FileEvent::Deleted, root.join(rel)));
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_mount_detection() {
        assert!(is_windows_mount(Path::new("/mnt/c/Users/dev/project")));
        assert!(is_windows_mount(Path::new("/mnt/d")));
        assert!(!is_windows_mount(Path::new("/home/dev/project")));
        assert!(!is_windows_mount(Path::new("/mnt/")));
        assert!(!is_windows_mount(Path::new("/mnt/wsl/instance")));
    }

    #[test]
    fn temp_files_are_filtered() {
        assert!(is_temp_file(Path::new("a.tmp")));
        assert!(is_temp_file(Path::new("file.py.tmp.12345.67890")));
        assert!(is_temp_file(Path::new("notes.txt~")));
        assert!(is_temp_file(Path::new(".file.swp")));
        assert!(is_temp_file(Path::new(".#lockfile")));
        assert!(!is_temp_file(Path::new("main.py")));
    }

    #[test]
    fn hash_gate_suppresses_unchanged_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("utils.py");
        std::fs::write(&file, "def f(): pass\n").unwrap();
        let hash = blake3::hash(b"def f(): pass\n").to_hex().to_string();

        let hashes = Arc::new(Mutex::new(HashMap::from([(
            "utils.py".to_string(),
            hash,
        )])));

        // Save without change: suppressed.
        let batch = gate_batch(
            vec![(FileEvent::Modified, file.clone())],
            dir.path(),
            &hashes,
        );
        assert!(batch.is_empty());

        // Real change: one event with the new hash attached.
        std::fs::write(&file, "def f(): pass\n\ndef g(): pass\n").unwrap();
        let batch = gate_batch(vec![(FileEvent::Modified, file)], dir.path(), &hashes);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].0, FileEvent::Modified);
        assert!(batch[0].2.is_some());
    }

    #[test]
    fn deletions_of_unknown_files_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let hashes = Arc::new(Mutex::new(HashMap::new()));
        let batch = gate_batch(
            vec![(FileEvent::Deleted, dir.path().join("never_indexed.py"))],
            dir.path(),
            &hashes,
        );
        assert!(batch.is_empty());
    }

    #[test]
    fn scan_detects_created_modified_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let ignore = IgnoreEngine::for_workspace(dir.path());

        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        let a_hash = blake3::hash(b"x = 1\n").to_hex().to_string();

        // Known state: a.py with old hash, b.py that no longer exists.
        let known = HashMap::from([
            ("a.py".to_string(), "stale-hash".to_string()),
            ("b.py".to_string(), "gone".to_string()),
        ]);

        let events = scan_for_changes(dir.path(), &ignore, &known);
        let kinds: Vec<(FileEvent, String)> = events
            .iter()
            .map(|(e, p)| (*e, p.file_name().unwrap().to_string_lossy().to_string()))
            .collect();

        assert!(kinds.contains(&(FileEvent::Modified, "a.py".to_string())));
        assert!(kinds.contains(&(FileEvent::Deleted, "b.py".to_string())));

        // With the current hash, a.py is quiet.
        let known = HashMap::from([("a.py".to_string(), a_hash)]);
        let events = scan_for_changes(dir.path(), &ignore, &known);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn start_twice_errors_and_stop_is_safe() {
        let dir = tempfile::tempdir().unwrap();
        let ignore = Arc::new(IgnoreEngine::for_workspace(dir.path()));
        let mut watcher =
            FileWatcher::new(dir.path().to_path_buf(), HashMap::new(), ignore).with_forced_polling();

        let _rx = watcher.start().unwrap();
        assert!(watcher.is_running());
        assert!(watcher.start().is_err());

        watcher.stop();
        assert!(!watcher.is_running());
        watcher.stop(); // idempotent
    }

    #[tokio::test]
    async fn polled_backend_delivers_hash_gated_batches() {
        let dir = tempfile::tempdir().unwrap();
        let ignore = Arc::new(IgnoreEngine::for_workspace(dir.path()));
        let mut watcher =
            FileWatcher::new(dir.path().to_path_buf(), HashMap::new(), ignore).with_forced_polling();
        let mut rx = watcher.start().unwrap();

        std::fs::write(dir.path().join("fresh.py"), "def fresh(): pass\n").unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher delivered within timeout")
            .expect("channel open");

        assert_eq!(batch.len(), 1);
        let (event, path, hash) = &batch[0];
        assert_eq!(*event, FileEvent::Created);
        assert!(path.ends_with("fresh.py"));
        let hash = hash.clone().unwrap();

        // Acknowledge the write; the same content must stay quiet afterwards.
        watcher.update_hash("fresh.py", &hash);
        let quiet = tokio::time::timeout(Duration::from_millis(1500), rx.recv()).await;
        assert!(quiet.is_err(), "no further events for unchanged file");

        watcher.stop();
    }
}
