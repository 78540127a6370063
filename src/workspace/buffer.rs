//! Ingestion buffer: accumulates columnar extraction batches until a flush
//! threshold is crossed.
//!
//! Nothing is materialized per row while accumulating; sub-batches are
//! concatenated column-wise. The single exception is
//! [`get_embedding_texts`](IndexingBuffer::get_embedding_texts), which builds
//! the strings the embedding model consumes.

use std::collections::HashSet;
use std::sync::LazyLock;

use crate::extractors::{
    ExtractionBatch, FileBatch, IdentifierBatch, RelationshipBatch, SymbolBatch,
};

/// Default flush threshold on accumulated symbols (embedding batch size).
pub const DEFAULT_MAX_SYMBOLS: usize = 512;

/// Secondary flush threshold on accumulated files.
pub const DEFAULT_MAX_FILES: usize = 50;

/// Common language keywords that provide no search value. Filtering them from
/// the identifier stream cuts 30-40% of low-value rows before they reach
/// storage.
static NOISE_KEYWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // Control flow & logic
        "if", "else", "return", "true", "false", "try", "catch", "finally", "break", "continue",
        "for", "while", "do", "switch", "case", "default", "throw", "new", "this", "super",
        "class", "void", "null", "none", "self",
        // C# specifics
        "public", "private", "protected", "internal", "static", "readonly", "virtual", "override",
        "abstract", "sealed", "const", "volatile", "namespace", "using", "interface", "struct",
        "enum", "delegate", "event", "int", "string", "bool", "double", "float", "decimal",
        "char", "object", "byte", "long", "short", "dynamic", "var", "get", "set", "value",
        "add", "remove", "async", "await", "task", "is", "as", "in", "out", "ref", "params",
        "lock", "unchecked", "typeof", "sizeof", "stackalloc", "from", "where", "select",
        "group", "into", "orderby", "join", "let",
        // JavaScript / TypeScript specifics
        "function", "export", "import", "extends", "implements", "undefined", "nan", "infinity",
        "debugger", "delete", "instanceof", "console", "window", "document", "navigator", "map",
        "filter", "reduce", "promise", "resolve", "reject",
        // Markup / web
        "model", "page", "inherits", "inject", "layout", "section", "viewbag", "viewdata",
        "tempdata", "html", "url", "div", "span", "br", "hr", "label", "input", "button",
        "form", "style", "href", "src", "type", "name",
        // Common variable names & conventions
        "data", "item", "index", "err", "error", "result", "response", "request", "req", "res",
        "ctx", "list", "array", "dict", "dictionary", "obj", "param", "args", "log", "todo",
        "fixme", "config", "options", "settings",
    ]
    .into_iter()
    .collect()
});

/// Accumulates extraction batches for streaming indexing.
#[derive(Debug)]
pub struct IndexingBuffer {
    max_symbols: usize,
    max_files: usize,
    accumulated: ExtractionBatch,
    /// Paths whose stale rows must be deleted from both stores before the
    /// accumulated rows are inserted.
    files_to_clean: Vec<String>,
}

impl IndexingBuffer {
    pub fn new(max_symbols: usize, max_files: usize) -> Self {
        Self {
            max_symbols,
            max_files,
            accumulated: ExtractionBatch::default(),
            files_to_clean: Vec::new(),
        }
    }

    /// Add a batch, filtering noise identifiers. Returns the number of
    /// symbols the batch contributed.
    pub fn add_batch(
        &mut self,
        mut batch: ExtractionBatch,
        files_to_update: Vec<String>,
    ) -> usize {
        self.files_to_clean.extend(files_to_update);

        let mask: Vec<bool> = batch
            .identifiers
            .names
            .iter()
            .map(|name| {
                name.len() >= 2
                    && !name.chars().all(|c| c.is_ascii_digit())
                    && !NOISE_KEYWORDS.contains(name.to_lowercase().as_str())
            })
            .collect();
        batch.identifiers.filter(&mask);

        let added = batch.symbols.len();
        self.accumulated.symbols.append(&mut batch.symbols);
        self.accumulated.identifiers.append(&mut batch.identifiers);
        self.accumulated
            .relationships
            .append(&mut batch.relationships);
        self.accumulated.files.append(&mut batch.files);
        added
    }

    /// Flush when either counter crosses its threshold: enough symbols to
    /// saturate an embedding batch, or enough files that metadata lists are
    /// getting large.
    pub fn should_flush(&self) -> bool {
        self.symbol_count() >= self.max_symbols || self.file_count() >= self.max_files
    }

    pub fn is_empty(&self) -> bool {
        self.accumulated.files.is_empty()
    }

    pub fn symbol_count(&self) -> usize {
        self.accumulated.symbols.len()
    }

    pub fn file_count(&self) -> usize {
        self.accumulated.files.len()
    }

    pub fn files_to_clean(&self) -> &[String] {
        &self.files_to_clean
    }

    pub fn get_symbols_table(&self) -> &SymbolBatch {
        &self.accumulated.symbols
    }

    pub fn get_identifiers_table(&self) -> &IdentifierBatch {
        &self.accumulated.identifiers
    }

    pub fn get_relationships_table(&self) -> &RelationshipBatch {
        &self.accumulated.relationships
    }

    pub fn get_files_table(&self) -> &FileBatch {
        &self.accumulated.files
    }

    pub fn accumulated(&self) -> &ExtractionBatch {
        &self.accumulated
    }

    /// One text per accumulated symbol for the embedding model: the doc
    /// comment (as a comment block), then the signature, falling back to
    /// `kind name` when no signature exists.
    pub fn get_embedding_texts(&self) -> Vec<String> {
        let symbols = &self.accumulated.symbols;
        let mut texts = Vec::with_capacity(symbols.len());
        for i in 0..symbols.len() {
            let mut parts = Vec::with_capacity(2);
            if let Some(doc) = &symbols.doc_comments[i] {
                if !doc.is_empty() {
                    parts.push(format!("/* {doc} */"));
                }
            }
            match &symbols.signatures[i] {
                Some(signature) if !signature.is_empty() => parts.push(signature.clone()),
                _ => parts.push(format!(
                    "{} {}",
                    symbols.kinds[i],
                    symbols.names[i]
                )),
            }
            texts.push(parts.join("\n"));
        }
        texts
    }

    /// Reset all accumulators and drain the files-to-clean list.
    pub fn clear(&mut self) {
        self.accumulated = ExtractionBatch::default();
        self.files_to_clean.clear();
    }
}

impl Default for IndexingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SYMBOLS, DEFAULT_MAX_FILES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::ExtractionAdapter;

    fn batch_from(source: &str) -> ExtractionBatch {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sample.py");
        std::fs::write(&file, source).unwrap();
        ExtractionAdapter::new()
            .extract_files(&[file], dir.path())
            .unwrap()
    }

    #[test]
    fn thresholds_trigger_flush() {
        let mut buffer = IndexingBuffer::new(2, 100);
        assert!(!buffer.should_flush());

        buffer.add_batch(
            batch_from("def a():\n    pass\n\ndef b():\n    pass\n"),
            vec![],
        );
        assert!(buffer.should_flush());

        let mut buffer = IndexingBuffer::new(1000, 1);
        buffer.add_batch(batch_from("def a():\n    pass\n"), vec![]);
        assert!(buffer.should_flush());
    }

    #[test]
    fn noise_identifiers_are_filtered() {
        // print/len survive; single chars, digits, keywords do not.
        let mut buffer = IndexingBuffer::default();
        let batch = batch_from(
            "def run():\n    compute_total()\n    f(1)\n    filter(x)\n",
        );
        buffer.add_batch(batch, vec![]);

        let names = &buffer.get_identifiers_table().names;
        assert!(names.contains(&"compute_total".to_string()));
        assert!(!names.contains(&"f".to_string()));
        assert!(!names.contains(&"filter".to_string()));
    }

    #[test]
    fn embedding_texts_prefer_doc_and_signature() {
        let mut buffer = IndexingBuffer::default();
        buffer.add_batch(
            batch_from("# Adds two numbers\ndef add(a, b):\n    return a + b\n"),
            vec![],
        );

        let texts = buffer.get_embedding_texts();
        assert_eq!(texts.len(), buffer.symbol_count());
        let add_text = texts
            .iter()
            .find(|t| t.contains("def add(a, b)"))
            .expect("text for add");
        assert!(add_text.starts_with("/* Adds two numbers */"));
    }

    #[test]
    fn clear_resets_counters_and_clean_list() {
        let mut buffer = IndexingBuffer::default();
        buffer.add_batch(
            batch_from("def a():\n    pass\n"),
            vec!["sample.py".to_string()],
        );
        assert!(!buffer.is_empty());
        assert_eq!(buffer.files_to_clean(), &["sample.py".to_string()]);

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.symbol_count(), 0);
        assert!(buffer.files_to_clean().is_empty());
    }
}
