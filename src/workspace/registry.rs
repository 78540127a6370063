//! Workspace registry: a small keyed file mapping workspace ids to their
//! path, display name, and type. Lives beside the primary workspace's data
//! under `.miller/workspace_registry.json`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const REGISTRY_FILE: &str = "workspace_registry.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceType {
    /// The workspace the server was started in
    Primary,
    /// An additionally registered project
    Reference,
    /// Short-lived, cleaned up aggressively
    Session,
}

impl fmt::Display for WorkspaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkspaceType::Primary => "primary",
            WorkspaceType::Reference => "reference",
            WorkspaceType::Session => "session",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceEntry {
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub workspace_type: WorkspaceType,
    pub registered_at: i64,
    pub last_accessed: i64,
}

/// Derive a stable workspace id from its canonical path.
pub fn workspace_id_for(path: &Path) -> String {
    let canonical = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    let digest = blake3::hash(canonical.to_string_lossy().as_bytes());
    hex::encode(&digest.as_bytes()[..8])
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    workspaces: BTreeMap<String, WorkspaceEntry>,
}

/// On-disk registry with load-mutate-save operations.
pub struct WorkspaceRegistry {
    path: PathBuf,
    data: RegistryFile,
}

impl WorkspaceRegistry {
    /// Load the registry under the given `.miller` directory, creating an
    /// empty one when absent.
    pub fn load(miller_dir: &Path) -> Result<Self> {
        let path = miller_dir.join(REGISTRY_FILE);
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading registry at {}", path.display()))?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                debug!("Registry file unreadable ({}); starting fresh", e);
                RegistryFile::default()
            })
        } else {
            RegistryFile::default()
        };
        Ok(Self { path, data })
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("writing registry at {}", self.path.display()))?;
        Ok(())
    }

    /// Register (or refresh) a workspace. Returns its id.
    pub fn register(
        &mut self,
        path: &Path,
        name: &str,
        workspace_type: WorkspaceType,
    ) -> Result<String> {
        let id = workspace_id_for(path);
        let now = chrono::Utc::now().timestamp();
        let entry = self
            .data
            .workspaces
            .entry(id.clone())
            .or_insert_with(|| WorkspaceEntry {
                path: path.to_string_lossy().to_string(),
                name: name.to_string(),
                workspace_type,
                registered_at: now,
                last_accessed: now,
            });
        entry.last_accessed = now;
        self.save()?;
        debug!("Registered workspace {} ({})", name, id);
        Ok(id)
    }

    pub fn remove(&mut self, workspace_id: &str) -> Result<Option<WorkspaceEntry>> {
        let removed = self.data.workspaces.remove(workspace_id);
        if removed.is_some() {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn get(&self, workspace_id: &str) -> Option<&WorkspaceEntry> {
        self.data.workspaces.get(workspace_id)
    }

    pub fn list(&self) -> Vec<(String, WorkspaceEntry)> {
        self.data
            .workspaces
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }

    pub fn touch(&mut self, workspace_id: &str) -> Result<()> {
        if let Some(entry) = self.data.workspaces.get_mut(workspace_id) {
            entry.last_accessed = chrono::Utc::now().timestamp();
            self.save()?;
        }
        Ok(())
    }

    /// Drop entries whose paths no longer exist. Returns removed ids.
    pub fn prune_missing(&mut self) -> Result<Vec<String>> {
        let doomed: Vec<String> = self
            .data
            .workspaces
            .iter()
            .filter(|(_, entry)| !Path::new(&entry.path).exists())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &doomed {
            self.data.workspaces.remove(id);
        }
        if !doomed.is_empty() {
            self.save()?;
        }
        Ok(doomed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_list_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();

        let mut registry = WorkspaceRegistry::load(dir.path()).unwrap();
        let id = registry
            .register(ws.path(), "my-project", WorkspaceType::Primary)
            .unwrap();

        // Reload from disk and verify persistence.
        let registry = WorkspaceRegistry::load(dir.path()).unwrap();
        let entry = registry.get(&id).expect("entry persisted");
        assert_eq!(entry.name, "my-project");
        assert_eq!(entry.workspace_type, WorkspaceType::Primary);
        assert_eq!(registry.list().len(), 1);

        let mut registry = WorkspaceRegistry::load(dir.path()).unwrap();
        registry.remove(&id).unwrap();
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn ids_are_stable_per_path() {
        let ws = tempfile::tempdir().unwrap();
        assert_eq!(workspace_id_for(ws.path()), workspace_id_for(ws.path()));
    }

    #[test]
    fn prune_drops_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = WorkspaceRegistry::load(dir.path()).unwrap();

        let ghost = dir.path().join("ghost-project");
        std::fs::create_dir_all(&ghost).unwrap();
        let id = registry
            .register(&ghost, "ghost", WorkspaceType::Reference)
            .unwrap();
        std::fs::remove_dir_all(&ghost).unwrap();

        let removed = registry.prune_missing().unwrap();
        assert_eq!(removed, vec![id]);
        assert!(registry.list().is_empty());
    }
}
