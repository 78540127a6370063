// Miller's Utilities Module
//
// Shared helpers used across the indexing and query layers.

/// Naming variant generation (cross-language symbol matching)
pub mod naming_variants;

/// Ignore engine (path filtering + size limits)
pub mod ignore;

/// Path utilities
pub mod paths {
    use anyhow::Result;
    use std::path::Path;

    /// Convert an absolute path to a workspace-relative, forward-slash path.
    ///
    /// Stored paths are always relative with `/` separators regardless of
    /// host platform, so the same index works from Windows and Unix.
    pub fn to_relative_unix_style(path: &Path, workspace_root: &Path) -> Result<String> {
        let rel = path.strip_prefix(workspace_root).unwrap_or(path);
        Ok(rel.to_string_lossy().replace('\\', "/"))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn strips_root_and_normalizes_separators() {
            let root = Path::new("/home/user/project");
            let path = Path::new("/home/user/project/src/models.py");
            assert_eq!(to_relative_unix_style(path, root).unwrap(), "src/models.py");
        }

        #[test]
        fn leaves_foreign_paths_intact() {
            let root = Path::new("/home/user/project");
            let path = Path::new("src/models.py");
            assert_eq!(to_relative_unix_style(path, root).unwrap(), "src/models.py");
        }
    }
}
