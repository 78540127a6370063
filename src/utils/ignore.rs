//! Path filtering for workspace scans and the file watcher.
//!
//! Combines a built-in ignore set (VCS metadata, build output, caches,
//! virtualenvs, lockfiles, minified bundles) with any `.gitignore` found at
//! the workspace root, plus per-extension file-size limits so a single
//! generated artifact cannot dominate the index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};

/// Directory names ignored wherever they appear in a path.
const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".miller",
    ".memories",
    "node_modules",
    "target",
    "build",
    "dist",
    "out",
    "coverage",
    ".nyc_output",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    "venv",
    ".venv",
    "env",
    ".tox",
    "vendor",
    ".idea",
    ".vscode",
    "tmp",
    "temp",
];

/// File glob patterns ignored by default.
const DEFAULT_IGNORE_GLOBS: &[&str] = &[
    "*.min.js",
    "*.bundle.js",
    "*.map",
    "*.pyc",
    "*.lock",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "poetry.lock",
    "*.log",
];

/// Conservative default size ceiling for source files.
const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024; // 1 MiB

/// Documentation-like files get a larger allowance.
const DOC_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024; // 5 MiB

/// Gitignore-style path filter with per-extension size limits.
pub struct IgnoreEngine {
    dir_names: Vec<String>,
    glob_set: GlobSet,
    size_limits: HashMap<String, u64>,
    default_size_limit: u64,
}

impl IgnoreEngine {
    /// Build an engine from the default ignore set plus the workspace root's
    /// `.gitignore` (negation patterns are not supported and are skipped).
    pub fn for_workspace(root: &Path) -> Self {
        let mut user_patterns = Vec::new();

        let gitignore = root.join(".gitignore");
        if gitignore.is_file() {
            match std::fs::read_to_string(&gitignore) {
                Ok(content) => {
                    for line in content.lines() {
                        let line = line.trim();
                        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                            continue;
                        }
                        user_patterns.push(line.trim_end_matches('/').to_string());
                    }
                }
                Err(e) => warn!("Could not read .gitignore at {:?}: {}", gitignore, e),
            }
        }

        Self::with_patterns(&user_patterns)
    }

    /// Build an engine from the default set plus explicit extra patterns.
    pub fn with_patterns(extra_patterns: &[String]) -> Self {
        let mut dir_names: Vec<String> =
            DEFAULT_IGNORE_DIRS.iter().map(|s| s.to_string()).collect();

        let mut builder = GlobSetBuilder::new();
        for pattern in DEFAULT_IGNORE_GLOBS {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }

        for pattern in extra_patterns {
            // Bare names without glob syntax behave like directory/file name
            // matches at any depth (gitignore semantics).
            if !pattern.contains('/') && !pattern.contains('*') {
                dir_names.push(pattern.clone());
                continue;
            }
            let normalized = pattern.trim_start_matches('/');
            for candidate in [normalized.to_string(), format!("**/{normalized}")] {
                match Glob::new(&candidate) {
                    Ok(glob) => {
                        builder.add(glob);
                    }
                    Err(e) => debug!("Skipping invalid ignore pattern '{}': {}", candidate, e),
                }
            }
        }

        let glob_set = builder.build().unwrap_or_else(|e| {
            warn!("Failed to build ignore glob set: {}", e);
            GlobSet::empty()
        });

        let mut size_limits = HashMap::new();
        size_limits.insert("md".to_string(), DOC_MAX_FILE_SIZE);
        size_limits.insert("json".to_string(), DOC_MAX_FILE_SIZE);

        Self {
            dir_names,
            glob_set,
            size_limits,
            default_size_limit: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Size ceiling for a path, chosen by extension.
    pub fn size_limit_for(&self, path: &Path) -> u64 {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.size_limits.get(&ext.to_lowercase()))
            .copied()
            .unwrap_or(self.default_size_limit)
    }

    /// Whether `path` should be excluded from indexing.
    ///
    /// With `check_size` the file's on-disk length is compared against the
    /// per-extension limit; missing files fail open (not ignored) so deletions
    /// still propagate.
    pub fn should_ignore(&self, path: &Path, root: &Path, check_size: bool) -> bool {
        let rel = path.strip_prefix(root).unwrap_or(path);

        for component in rel.components() {
            if let Some(name) = component.as_os_str().to_str() {
                if self.dir_names.iter().any(|d| d == name) {
                    return true;
                }
            }
        }

        if self.glob_set.is_match(rel) {
            return true;
        }
        if let Some(name) = rel.file_name() {
            if self.glob_set.is_match(Path::new(name)) {
                return true;
            }
        }

        if check_size {
            if let Ok(metadata) = std::fs::metadata(path) {
                if metadata.len() > self.size_limit_for(path) {
                    debug!(
                        "Ignoring oversized file {:?} ({} bytes > {} limit)",
                        rel,
                        metadata.len(),
                        self.size_limit_for(path)
                    );
                    return true;
                }
            }
        }

        false
    }

    /// Bulk variant of [`should_ignore`], preserving input order.
    pub fn filter_files(
        &self,
        paths: impl IntoIterator<Item = PathBuf>,
        root: &Path,
        check_size: bool,
    ) -> Vec<PathBuf> {
        paths
            .into_iter()
            .filter(|p| !self.should_ignore(p, root, check_size))
            .collect()
    }
}

/// Walk the workspace, returning the deterministic (sorted) list of files that
/// survive the ignore engine.
pub fn discover_files(root: &Path, engine: &IgnoreEngine) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let walker = walkdir::WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|e| {
        // Prune ignored directories early rather than filtering afterwards.
        if e.file_type().is_dir() && e.depth() > 0 {
            return !engine.should_ignore(e.path(), root, false);
        }
        true
    }) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!("Walk error (skipping): {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if engine.should_ignore(&path, root, true) {
            continue;
        }
        files.push(path);
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directories_are_ignored() {
        let engine = IgnoreEngine::with_patterns(&[]);
        let root = Path::new("/ws");
        assert!(engine.should_ignore(Path::new("/ws/node_modules/lib/a.js"), root, false));
        assert!(engine.should_ignore(Path::new("/ws/.git/config"), root, false));
        assert!(engine.should_ignore(Path::new("/ws/target/debug/foo.rs"), root, false));
        assert!(engine.should_ignore(Path::new("/ws/.miller/metadata.db"), root, false));
        assert!(!engine.should_ignore(Path::new("/ws/src/main.rs"), root, false));
    }

    #[test]
    fn minified_and_lockfiles_are_ignored() {
        let engine = IgnoreEngine::with_patterns(&[]);
        let root = Path::new("/ws");
        assert!(engine.should_ignore(Path::new("/ws/static/app.min.js"), root, false));
        assert!(engine.should_ignore(Path::new("/ws/package-lock.json"), root, false));
        assert!(engine.should_ignore(Path::new("/ws/Cargo.lock"), root, false));
        assert!(!engine.should_ignore(Path::new("/ws/static/app.js"), root, false));
    }

    #[test]
    fn user_patterns_extend_defaults() {
        let engine = IgnoreEngine::with_patterns(&["generated".to_string(), "*.gen.ts".to_string()]);
        let root = Path::new("/ws");
        assert!(engine.should_ignore(Path::new("/ws/generated/api.ts"), root, false));
        assert!(engine.should_ignore(Path::new("/ws/src/api.gen.ts"), root, false));
        assert!(!engine.should_ignore(Path::new("/ws/src/api.ts"), root, false));
    }

    #[test]
    fn doc_extensions_have_larger_allowance() {
        let engine = IgnoreEngine::with_patterns(&[]);
        assert_eq!(engine.size_limit_for(Path::new("README.md")), DOC_MAX_FILE_SIZE);
        assert_eq!(engine.size_limit_for(Path::new("data.json")), DOC_MAX_FILE_SIZE);
        assert_eq!(
            engine.size_limit_for(Path::new("main.rs")),
            DEFAULT_MAX_FILE_SIZE
        );
    }

    #[test]
    fn oversized_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.py");
        std::fs::write(&big, vec![b'x'; (DEFAULT_MAX_FILE_SIZE + 1) as usize]).unwrap();
        let small = dir.path().join("small.py");
        std::fs::write(&small, b"def f(): pass\n").unwrap();

        let engine = IgnoreEngine::with_patterns(&[]);
        assert!(engine.should_ignore(&big, dir.path(), true));
        assert!(!engine.should_ignore(&small, dir.path(), true));
        // Without the size check the oversized file passes.
        assert!(!engine.should_ignore(&big, dir.path(), false));
    }

    #[test]
    fn discover_files_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("src/b.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("src/a.py"), "y = 2\n").unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/c.js"), "var z;\n").unwrap();

        let engine = IgnoreEngine::for_workspace(dir.path());
        let files = discover_files(dir.path(), &engine).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        assert_eq!(names, vec!["src/a.py", "src/b.py"]);
    }

    #[test]
    fn gitignore_patterns_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "secrets\n*.snap\n").unwrap();
        std::fs::create_dir_all(dir.path().join("secrets")).unwrap();
        std::fs::write(dir.path().join("secrets/key.py"), "k = 1\n").unwrap();
        std::fs::write(dir.path().join("ui.snap"), "snapshot\n").unwrap();
        std::fs::write(dir.path().join("main.py"), "pass\n").unwrap();

        let engine = IgnoreEngine::for_workspace(dir.path());
        assert!(engine.should_ignore(&dir.path().join("secrets/key.py"), dir.path(), false));
        assert!(engine.should_ignore(&dir.path().join("ui.snap"), dir.path(), false));
        assert!(!engine.should_ignore(&dir.path().join("main.py"), dir.path(), false));
    }
}
