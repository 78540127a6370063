//! Event batching for the watcher.
//!
//! Raw filesystem notifications arrive in bursts (editors write, rename, and
//! touch metadata in quick succession). The debouncer collects everything
//! inside a short window and collapses it per path: any number of
//! CREATED/MODIFIED events become one, and a DELETED event dominates, as
//! pending writes for a deleted path are meaningless.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::FileEvent;

/// Quiet window before a batch flushes.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

#[derive(Debug)]
pub struct Debouncer {
    pending: HashMap<PathBuf, FileEvent>,
    /// Insertion order of first sight, so flushed batches are stable.
    order: Vec<PathBuf>,
    last_event_at: Option<Instant>,
    window: Duration,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            order: Vec::new(),
            last_event_at: None,
            window,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Record one event, collapsing per path with DELETED dominant.
    pub fn push(&mut self, event: FileEvent, path: PathBuf) {
        self.last_event_at = Some(Instant::now());
        match self.pending.get_mut(&path) {
            Some(existing) => {
                if *existing != FileEvent::Deleted {
                    *existing = event;
                } else if event != FileEvent::Deleted {
                    // Deleted then re-created inside one window: the latest
                    // state on disk wins.
                    *existing = event;
                }
            }
            None => {
                self.pending.insert(path.clone(), event);
                self.order.push(path);
            }
        }
    }

    /// Whether the quiet window has elapsed since the last event.
    pub fn ready(&self) -> bool {
        match self.last_event_at {
            Some(at) => !self.pending.is_empty() && at.elapsed() >= self.window,
            None => false,
        }
    }

    /// Drain the pending batch in first-seen order.
    pub fn flush(&mut self) -> Vec<(FileEvent, PathBuf)> {
        let mut batch = Vec::with_capacity(self.pending.len());
        for path in self.order.drain(..) {
            if let Some(event) = self.pending.remove(&path) {
                batch.push((event, path));
            }
        }
        self.last_event_at = None;
        batch
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_modifications_collapse_to_one() {
        let mut debouncer = Debouncer::default();
        let path = PathBuf::from("src/utils.py");
        debouncer.push(FileEvent::Created, path.clone());
        debouncer.push(FileEvent::Modified, path.clone());
        debouncer.push(FileEvent::Modified, path.clone());

        let batch = debouncer.flush();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].0, FileEvent::Modified);
    }

    #[test]
    fn delete_cancels_pending_writes() {
        let mut debouncer = Debouncer::default();
        let path = PathBuf::from("src/utils.py");
        debouncer.push(FileEvent::Modified, path.clone());
        debouncer.push(FileEvent::Deleted, path.clone());

        let batch = debouncer.flush();
        assert_eq!(batch, vec![(FileEvent::Deleted, path)]);
    }

    #[test]
    fn recreation_after_delete_wins() {
        let mut debouncer = Debouncer::default();
        let path = PathBuf::from("a.py");
        debouncer.push(FileEvent::Deleted, path.clone());
        debouncer.push(FileEvent::Created, path.clone());

        let batch = debouncer.flush();
        assert_eq!(batch[0].0, FileEvent::Created);
    }

    #[test]
    fn batch_preserves_first_seen_order() {
        let mut debouncer = Debouncer::default();
        debouncer.push(FileEvent::Modified, PathBuf::from("b.py"));
        debouncer.push(FileEvent::Modified, PathBuf::from("a.py"));
        debouncer.push(FileEvent::Modified, PathBuf::from("b.py"));

        let batch = debouncer.flush();
        let paths: Vec<&str> = batch.iter().map(|(_, p)| p.to_str().unwrap()).collect();
        assert_eq!(paths, vec!["b.py", "a.py"]);
    }

    #[test]
    fn ready_requires_quiet_window() {
        let mut debouncer = Debouncer::new(Duration::from_millis(5));
        assert!(!debouncer.ready());
        debouncer.push(FileEvent::Modified, PathBuf::from("a.py"));
        assert!(!debouncer.ready());
        std::thread::sleep(Duration::from_millis(10));
        assert!(debouncer.ready());
        debouncer.flush();
        assert!(!debouncer.ready());
    }
}
