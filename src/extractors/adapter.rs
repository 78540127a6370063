//! Columnar extraction batches.
//!
//! The ingestion path never materializes per-row objects between extraction
//! and the store writes: each file group becomes one `ExtractionBatch` of
//! four struct-of-arrays sub-batches whose columns line up with the store
//! tables. The buffer concatenates batches column-wise and the writers walk
//! the columns directly.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::{
    Extraction, ExtractorManager, FileInfo, Identifier, IdentifierKind, Relationship,
    RelationshipKind, Symbol, SymbolKind, Visibility,
};
use crate::utils::paths::to_relative_unix_style;

/// Columnar symbol storage.
#[derive(Debug, Clone, Default)]
pub struct SymbolBatch {
    pub ids: Vec<String>,
    pub names: Vec<String>,
    pub kinds: Vec<SymbolKind>,
    pub languages: Vec<String>,
    pub file_paths: Vec<String>,
    pub start_lines: Vec<u32>,
    pub start_columns: Vec<u32>,
    pub end_lines: Vec<u32>,
    pub end_columns: Vec<u32>,
    pub start_bytes: Vec<u32>,
    pub end_bytes: Vec<u32>,
    pub signatures: Vec<Option<String>>,
    pub doc_comments: Vec<Option<String>>,
    pub visibilities: Vec<Option<Visibility>>,
    pub parent_ids: Vec<Option<String>>,
}

impl SymbolBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn push(&mut self, symbol: Symbol) {
        self.ids.push(symbol.id);
        self.names.push(symbol.name);
        self.kinds.push(symbol.kind);
        self.languages.push(symbol.language);
        self.file_paths.push(symbol.file_path);
        self.start_lines.push(symbol.start_line);
        self.start_columns.push(symbol.start_column);
        self.end_lines.push(symbol.end_line);
        self.end_columns.push(symbol.end_column);
        self.start_bytes.push(symbol.start_byte);
        self.end_bytes.push(symbol.end_byte);
        self.signatures.push(symbol.signature);
        self.doc_comments.push(symbol.doc_comment);
        self.visibilities.push(symbol.visibility);
        self.parent_ids.push(symbol.parent_id);
    }

    pub fn append(&mut self, other: &mut SymbolBatch) {
        self.ids.append(&mut other.ids);
        self.names.append(&mut other.names);
        self.kinds.append(&mut other.kinds);
        self.languages.append(&mut other.languages);
        self.file_paths.append(&mut other.file_paths);
        self.start_lines.append(&mut other.start_lines);
        self.start_columns.append(&mut other.start_columns);
        self.end_lines.append(&mut other.end_lines);
        self.end_columns.append(&mut other.end_columns);
        self.start_bytes.append(&mut other.start_bytes);
        self.end_bytes.append(&mut other.end_bytes);
        self.signatures.append(&mut other.signatures);
        self.doc_comments.append(&mut other.doc_comments);
        self.visibilities.append(&mut other.visibilities);
        self.parent_ids.append(&mut other.parent_ids);
    }

    /// Materialize one row. Index must be in bounds.
    pub fn row(&self, i: usize) -> Symbol {
        Symbol {
            id: self.ids[i].clone(),
            name: self.names[i].clone(),
            kind: self.kinds[i],
            language: self.languages[i].clone(),
            file_path: self.file_paths[i].clone(),
            start_line: self.start_lines[i],
            start_column: self.start_columns[i],
            end_line: self.end_lines[i],
            end_column: self.end_columns[i],
            start_byte: self.start_bytes[i],
            end_byte: self.end_bytes[i],
            signature: self.signatures[i].clone(),
            doc_comment: self.doc_comments[i].clone(),
            visibility: self.visibilities[i],
            parent_id: self.parent_ids[i].clone(),
        }
    }
}

/// Columnar identifier storage.
#[derive(Debug, Clone, Default)]
pub struct IdentifierBatch {
    pub ids: Vec<String>,
    pub names: Vec<String>,
    pub kinds: Vec<IdentifierKind>,
    pub languages: Vec<String>,
    pub file_paths: Vec<String>,
    pub start_lines: Vec<u32>,
    pub start_columns: Vec<u32>,
    pub end_lines: Vec<u32>,
    pub end_columns: Vec<u32>,
    pub start_bytes: Vec<u32>,
    pub end_bytes: Vec<u32>,
    pub containing_symbol_ids: Vec<Option<String>>,
    pub target_symbol_ids: Vec<Option<String>>,
    pub confidences: Vec<f32>,
}

impl IdentifierBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn push(&mut self, identifier: Identifier) {
        self.ids.push(identifier.id);
        self.names.push(identifier.name);
        self.kinds.push(identifier.kind);
        self.languages.push(identifier.language);
        self.file_paths.push(identifier.file_path);
        self.start_lines.push(identifier.start_line);
        self.start_columns.push(identifier.start_column);
        self.end_lines.push(identifier.end_line);
        self.end_columns.push(identifier.end_column);
        self.start_bytes.push(identifier.start_byte);
        self.end_bytes.push(identifier.end_byte);
        self.containing_symbol_ids.push(identifier.containing_symbol_id);
        self.target_symbol_ids.push(identifier.target_symbol_id);
        self.confidences.push(identifier.confidence);
    }

    pub fn append(&mut self, other: &mut IdentifierBatch) {
        self.ids.append(&mut other.ids);
        self.names.append(&mut other.names);
        self.kinds.append(&mut other.kinds);
        self.languages.append(&mut other.languages);
        self.file_paths.append(&mut other.file_paths);
        self.start_lines.append(&mut other.start_lines);
        self.start_columns.append(&mut other.start_columns);
        self.end_lines.append(&mut other.end_lines);
        self.end_columns.append(&mut other.end_columns);
        self.start_bytes.append(&mut other.start_bytes);
        self.end_bytes.append(&mut other.end_bytes);
        self.containing_symbol_ids
            .append(&mut other.containing_symbol_ids);
        self.target_symbol_ids.append(&mut other.target_symbol_ids);
        self.confidences.append(&mut other.confidences);
    }

    /// Keep only the rows selected by `mask` (one bool per row).
    pub fn filter(&mut self, mask: &[bool]) {
        debug_assert_eq!(mask.len(), self.len());
        macro_rules! retain_col {
            ($col:expr) => {{
                let mut mask_iter = mask.iter().copied();
                $col.retain(|_| mask_iter.next().unwrap_or(false));
            }};
        }
        retain_col!(self.ids);
        retain_col!(self.names);
        retain_col!(self.kinds);
        retain_col!(self.languages);
        retain_col!(self.file_paths);
        retain_col!(self.start_lines);
        retain_col!(self.start_columns);
        retain_col!(self.end_lines);
        retain_col!(self.end_columns);
        retain_col!(self.start_bytes);
        retain_col!(self.end_bytes);
        retain_col!(self.containing_symbol_ids);
        retain_col!(self.target_symbol_ids);
        retain_col!(self.confidences);
    }

    pub fn row(&self, i: usize) -> Identifier {
        Identifier {
            id: self.ids[i].clone(),
            name: self.names[i].clone(),
            kind: self.kinds[i],
            language: self.languages[i].clone(),
            file_path: self.file_paths[i].clone(),
            start_line: self.start_lines[i],
            start_column: self.start_columns[i],
            end_line: self.end_lines[i],
            end_column: self.end_columns[i],
            start_byte: self.start_bytes[i],
            end_byte: self.end_bytes[i],
            containing_symbol_id: self.containing_symbol_ids[i].clone(),
            target_symbol_id: self.target_symbol_ids[i].clone(),
            confidence: self.confidences[i],
        }
    }
}

/// Columnar relationship storage.
#[derive(Debug, Clone, Default)]
pub struct RelationshipBatch {
    pub ids: Vec<String>,
    pub from_symbol_ids: Vec<Option<String>>,
    pub to_symbol_ids: Vec<Option<String>>,
    pub kinds: Vec<RelationshipKind>,
    pub file_paths: Vec<String>,
    pub line_numbers: Vec<u32>,
    pub confidences: Vec<f32>,
}

impl RelationshipBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn push(&mut self, rel: Relationship) {
        self.ids.push(rel.id);
        self.from_symbol_ids.push(rel.from_symbol_id);
        self.to_symbol_ids.push(rel.to_symbol_id);
        self.kinds.push(rel.kind);
        self.file_paths.push(rel.file_path);
        self.line_numbers.push(rel.line_number);
        self.confidences.push(rel.confidence);
    }

    pub fn append(&mut self, other: &mut RelationshipBatch) {
        self.ids.append(&mut other.ids);
        self.from_symbol_ids.append(&mut other.from_symbol_ids);
        self.to_symbol_ids.append(&mut other.to_symbol_ids);
        self.kinds.append(&mut other.kinds);
        self.file_paths.append(&mut other.file_paths);
        self.line_numbers.append(&mut other.line_numbers);
        self.confidences.append(&mut other.confidences);
    }

    pub fn row(&self, i: usize) -> Relationship {
        Relationship {
            id: self.ids[i].clone(),
            from_symbol_id: self.from_symbol_ids[i].clone(),
            to_symbol_id: self.to_symbol_ids[i].clone(),
            kind: self.kinds[i],
            file_path: self.file_paths[i].clone(),
            line_number: self.line_numbers[i],
            confidence: self.confidences[i],
        }
    }
}

/// Columnar file metadata storage.
#[derive(Debug, Clone, Default)]
pub struct FileBatch {
    pub paths: Vec<String>,
    pub languages: Vec<String>,
    pub hashes: Vec<String>,
    pub sizes: Vec<i64>,
    pub last_modifieds: Vec<i64>,
}

impl FileBatch {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn push(&mut self, file: FileInfo) {
        self.paths.push(file.path);
        self.languages.push(file.language);
        self.hashes.push(file.hash);
        self.sizes.push(file.size);
        self.last_modifieds.push(file.last_modified);
    }

    pub fn append(&mut self, other: &mut FileBatch) {
        self.paths.append(&mut other.paths);
        self.languages.append(&mut other.languages);
        self.hashes.append(&mut other.hashes);
        self.sizes.append(&mut other.sizes);
        self.last_modifieds.append(&mut other.last_modifieds);
    }

    pub fn row(&self, i: usize) -> FileInfo {
        FileInfo {
            path: self.paths[i].clone(),
            language: self.languages[i].clone(),
            hash: self.hashes[i].clone(),
            size: self.sizes[i],
            last_modified: self.last_modifieds[i],
        }
    }
}

/// One extraction pass over a file group: four columnar sub-batches whose
/// schemas match the corresponding store tables.
#[derive(Debug, Clone, Default)]
pub struct ExtractionBatch {
    pub symbols: SymbolBatch,
    pub identifiers: IdentifierBatch,
    pub relationships: RelationshipBatch,
    pub files: FileBatch,
}

impl ExtractionBatch {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn absorb(&mut self, extraction: Extraction) {
        for symbol in extraction.symbols {
            self.symbols.push(symbol);
        }
        for identifier in extraction.identifiers {
            self.identifiers.push(identifier);
        }
        for relationship in extraction.relationships {
            self.relationships.push(relationship);
        }
    }
}

/// Pure transformation from paths to an [`ExtractionBatch`]; no persistence.
pub struct ExtractionAdapter {
    manager: ExtractorManager,
}

impl ExtractionAdapter {
    pub fn new() -> Self {
        Self {
            manager: ExtractorManager::new(),
        }
    }

    pub fn with_manager(manager: ExtractorManager) -> Self {
        Self { manager }
    }

    /// Compute the blake3 content hash of raw bytes, hex-encoded.
    pub fn content_hash(bytes: &[u8]) -> String {
        blake3::hash(bytes).to_hex().to_string()
    }

    /// Extract a group of files into one columnar batch.
    ///
    /// Unreadable files are skipped; binary files get a file row with zero
    /// symbols so their presence is tracked without polluting search.
    pub fn extract_files(&self, paths: &[PathBuf], workspace_root: &Path) -> Result<ExtractionBatch> {
        let mut batch = ExtractionBatch::default();

        for path in paths {
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::debug!("Skipping unreadable file {:?}: {}", path, e);
                    continue;
                }
            };

            let metadata = std::fs::metadata(path)
                .with_context(|| format!("metadata for {}", path.display()))?;
            let last_modified = metadata
                .modified()
                .ok()
                .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            let rel_path = to_relative_unix_style(path, workspace_root)?;
            let hash = Self::content_hash(&bytes);

            batch.files.push(FileInfo {
                path: rel_path.clone(),
                language: ExtractorManager::detect_language(&rel_path),
                hash,
                size: bytes.len() as i64,
                last_modified,
            });

            if is_binary(&bytes) {
                continue;
            }

            let content = String::from_utf8_lossy(&bytes);
            let language = ExtractorManager::detect_language(&rel_path);
            let extraction = self.manager.extract(&content, &rel_path, &language);
            batch.absorb(extraction);
        }

        Ok(batch)
    }

}

impl Default for ExtractionAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// NUL byte in the first 8 KiB marks the file as binary.
fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|&b| b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_files_builds_columnar_batch() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("models.py");
        std::fs::write(&file, "class User:\n    def greet(self):\n        pass\n").unwrap();

        let adapter = ExtractionAdapter::new();
        let batch = adapter.extract_files(&[file], dir.path()).unwrap();

        assert_eq!(batch.files.len(), 1);
        assert_eq!(batch.files.paths[0], "models.py");
        assert_eq!(batch.files.languages[0], "python");
        assert!(batch.symbols.len() >= 2);
        assert!(batch.symbols.names.contains(&"User".to_string()));
        assert!(batch.symbols.names.contains(&"greet".to_string()));
    }

    #[test]
    fn binary_files_keep_file_row_only() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("blob.py");
        std::fs::write(&file, b"\x00\x01\x02binary").unwrap();

        let adapter = ExtractionAdapter::new();
        let batch = adapter.extract_files(&[file], dir.path()).unwrap();

        assert_eq!(batch.files.len(), 1);
        assert!(batch.symbols.is_empty());
    }

    #[test]
    fn unknown_extensions_fall_back_to_text_stub() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.cfg");
        std::fs::write(&file, "retries = 3\n").unwrap();

        let adapter = ExtractionAdapter::new();
        let batch = adapter.extract_files(&[file], dir.path()).unwrap();

        assert_eq!(batch.symbols.len(), 1);
        assert_eq!(batch.symbols.kinds[0], SymbolKind::File);
        assert_eq!(batch.files.languages[0], "text");
    }

    #[test]
    fn identifier_filter_keeps_masked_rows() {
        let mut batch = IdentifierBatch::default();
        for (i, name) in ["alpha", "x", "beta"].iter().enumerate() {
            batch.push(Identifier {
                id: format!("id{i}"),
                name: name.to_string(),
                kind: IdentifierKind::Call,
                language: "python".into(),
                file_path: "a.py".into(),
                start_line: 1,
                start_column: 0,
                end_line: 1,
                end_column: 0,
                start_byte: 0,
                end_byte: 0,
                containing_symbol_id: None,
                target_symbol_id: None,
                confidence: 1.0,
            });
        }

        batch.filter(&[true, false, true]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.names, vec!["alpha", "beta"]);
        assert_eq!(batch.ids, vec!["id0", "id2"]);
    }

    #[test]
    fn batches_append_column_wise() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def a():\n    pass\n").unwrap();
        std::fs::write(dir.path().join("b.py"), "def b():\n    pass\n").unwrap();

        let adapter = ExtractionAdapter::new();
        let mut first = adapter
            .extract_files(&[dir.path().join("a.py")], dir.path())
            .unwrap();
        let mut second = adapter
            .extract_files(&[dir.path().join("b.py")], dir.path())
            .unwrap();

        first.symbols.append(&mut second.symbols);
        first.files.append(&mut second.files);

        assert_eq!(first.files.len(), 2);
        assert!(second.symbols.is_empty());
        assert_eq!(first.symbols.names, vec!["a", "b"]);
    }
}
