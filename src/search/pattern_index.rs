//! Tantivy-backed pattern index.
//!
//! One document per symbol, carrying its stored projection plus the
//! `code_pattern` field indexed with the whitespace tokenizer (positions
//! enabled). Text search runs the raw query string; pattern search wraps the
//! query as a phrase so the code punctuation inside it is matched literally
//! instead of being parsed as query syntax. Malformed queries produce empty
//! result lists, never errors.

use std::path::Path;
use std::sync::Mutex;

use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{
    IndexRecordOption, Schema, TantivyDocument, TextFieldIndexing, TextOptions, Value, FAST,
    STORED, STRING,
};
use tantivy::tokenizer::TextAnalyzer;
use tantivy::{Index, IndexReader, IndexWriter, Term};

use anyhow::Result;
use tracing::warn;

use super::tokenizer::{WhitespaceTokenizer, WHITESPACE_TOKENIZER};

const WRITER_HEAP_SIZE: usize = 50_000_000; // 50MB

/// A hit from the full-text side, hydrated from stored fields.
#[derive(Debug, Clone)]
pub struct PatternHit {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub language: String,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: Option<String>,
    pub doc_comment: Option<String>,
    pub score: f32,
}

struct Fields {
    id: tantivy::schema::Field,
    name: tantivy::schema::Field,
    kind: tantivy::schema::Field,
    language: tantivy::schema::Field,
    file_path: tantivy::schema::Field,
    start_line: tantivy::schema::Field,
    end_line: tantivy::schema::Field,
    signature: tantivy::schema::Field,
    doc_comment: tantivy::schema::Field,
    code_pattern: tantivy::schema::Field,
}

/// Full-text index over `code_pattern` with stored symbol projections.
pub struct PatternIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<Option<IndexWriter>>,
    fields: Fields,
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    let pattern_indexing = TextFieldIndexing::default()
        .set_tokenizer(WHITESPACE_TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let pattern_options = TextOptions::default().set_indexing_options(pattern_indexing);

    builder.add_text_field("id", STRING | STORED);
    builder.add_text_field("name", STORED);
    builder.add_text_field("kind", STORED);
    builder.add_text_field("language", STORED);
    builder.add_text_field("file_path", STRING | STORED);
    builder.add_u64_field("start_line", STORED | FAST);
    builder.add_u64_field("end_line", STORED | FAST);
    builder.add_text_field("signature", STORED);
    builder.add_text_field("doc_comment", STORED);
    builder.add_text_field("code_pattern", pattern_options);

    builder.build()
}

impl PatternIndex {
    /// Open an on-disk index directory, creating it when missing.
    pub fn open_or_create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let index = Index::builder()
            .schema(build_schema())
            .create_in_dir(dir)
            .or_else(|_| Index::open_in_dir(dir))?;
        Self::finish(index)
    }

    /// In-memory index (tests and tiny workspaces).
    pub fn in_memory() -> Result<Self> {
        let index = Index::create_in_ram(build_schema());
        Self::finish(index)
    }

    fn finish(index: Index) -> Result<Self> {
        index.tokenizers().register(
            WHITESPACE_TOKENIZER,
            TextAnalyzer::builder(WhitespaceTokenizer).build(),
        );

        let schema = index.schema();
        let get = |name: &str| {
            schema
                .get_field(name)
                .expect("pattern index schema field missing")
        };
        let fields = Fields {
            id: get("id"),
            name: get("name"),
            kind: get("kind"),
            language: get("language"),
            file_path: get("file_path"),
            start_line: get("start_line"),
            end_line: get("end_line"),
            signature: get("signature"),
            doc_comment: get("doc_comment"),
            code_pattern: get("code_pattern"),
        };

        let reader = index.reader()?;
        Ok(Self {
            index,
            reader,
            writer: Mutex::new(None),
            fields,
        })
    }

    fn with_writer<T>(&self, op: impl FnOnce(&IndexWriter) -> Result<T>) -> Result<T> {
        let mut guard = self.writer.lock().unwrap();
        if guard.is_none() {
            *guard = Some(self.index.writer(WRITER_HEAP_SIZE)?);
        }
        op(guard.as_ref().unwrap())
    }

    /// Queue one symbol document. Call [`commit`](Self::commit) to publish.
    #[allow(clippy::too_many_arguments)]
    pub fn add_document(
        &self,
        id: &str,
        name: &str,
        kind: &str,
        language: &str,
        file_path: &str,
        start_line: u32,
        end_line: u32,
        signature: Option<&str>,
        doc_comment: Option<&str>,
        code_pattern: &str,
    ) -> Result<()> {
        let f = &self.fields;
        let mut doc = TantivyDocument::new();
        doc.add_text(f.id, id);
        doc.add_text(f.name, name);
        doc.add_text(f.kind, kind);
        doc.add_text(f.language, language);
        doc.add_text(f.file_path, file_path);
        doc.add_u64(f.start_line, start_line as u64);
        doc.add_u64(f.end_line, end_line as u64);
        doc.add_text(f.signature, signature.unwrap_or(""));
        doc.add_text(f.doc_comment, doc_comment.unwrap_or(""));
        doc.add_text(f.code_pattern, code_pattern);

        self.with_writer(|writer| {
            writer.add_document(doc)?;
            Ok(())
        })
    }

    /// Queue deletion of every document for a file path.
    pub fn delete_file(&self, file_path: &str) -> Result<()> {
        let term = Term::from_field_text(self.fields.file_path, file_path);
        self.with_writer(|writer| {
            writer.delete_term(term);
            Ok(())
        })
    }

    /// Queue deletion of a single symbol document.
    pub fn delete_id(&self, id: &str) -> Result<()> {
        let term = Term::from_field_text(self.fields.id, id);
        self.with_writer(|writer| {
            writer.delete_term(term);
            Ok(())
        })
    }

    /// Commit queued mutations and reload the reader so searches see them.
    pub fn commit(&self) -> Result<()> {
        {
            let mut guard = self.writer.lock().unwrap();
            if let Some(writer) = guard.as_mut() {
                writer.commit()?;
            }
        }
        self.reader.reload()?;
        Ok(())
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Text search with the raw (un-preprocessed) query string.
    ///
    /// Over-fetches `max(3 * limit, 50)` so downstream re-ranking can reorder
    /// before truncation; scores are normalized by the batch maximum.
    pub fn search_text(&self, query: &str, limit: usize) -> Vec<PatternHit> {
        if query.trim().is_empty() || limit == 0 {
            return Vec::new();
        }
        let fetch_limit = (3 * limit).max(50);
        self.run_query(query, fetch_limit)
    }

    /// Pattern search: the query is auto-wrapped in quotes so Tantivy treats
    /// it as a phrase and the query-language metacharacters inside it stay
    /// literal.
    pub fn search_pattern(&self, query: &str, limit: usize) -> Vec<PatternHit> {
        if query.trim().is_empty() || limit == 0 {
            return Vec::new();
        }
        let phrase = if query.starts_with('"') {
            query.to_string()
        } else {
            format!("\"{}\"", query.replace('"', " "))
        };
        let fetch_limit = (3 * limit).max(50);
        self.run_query(&phrase, fetch_limit)
    }

    fn run_query(&self, query_str: &str, limit: usize) -> Vec<PatternHit> {
        let parser = QueryParser::for_index(&self.index, vec![self.fields.code_pattern]);
        let query = match parser.parse_query(query_str) {
            Ok(query) => query,
            Err(e) => {
                // Malformed query syntax is a no-match, not a failure.
                warn!("Query rejected by parser ('{}'): {}", query_str, e);
                return Vec::new();
            }
        };

        let searcher = self.reader.searcher();
        let top_docs = match searcher.search(&query, &TopDocs::with_limit(limit.max(1))) {
            Ok(docs) => docs,
            Err(e) => {
                warn!("Pattern index search failed: {}", e);
                return Vec::new();
            }
        };

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let Ok(doc) = searcher.doc::<TantivyDocument>(address) else {
                continue;
            };
            hits.push(self.hydrate(&doc, score));
        }

        // Normalize by the batch maximum so scores land in [0, 1].
        let max_score = hits.iter().map(|h| h.score).fold(0.0f32, f32::max);
        if max_score > 0.0 {
            for hit in &mut hits {
                hit.score /= max_score;
            }
        }
        hits
    }

    fn hydrate(&self, doc: &TantivyDocument, score: f32) -> PatternHit {
        let f = &self.fields;
        let text = |field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_default()
        };
        let number = |field| {
            doc.get_first(field)
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32
        };
        let optional = |field| {
            let value = text(field);
            if value.is_empty() { None } else { Some(value) }
        };

        PatternHit {
            id: text(f.id),
            name: text(f.name),
            kind: text(f.kind),
            language: text(f.language),
            file_path: text(f.file_path),
            start_line: number(f.start_line),
            end_line: number(f.end_line),
            signature: optional(f.signature),
            doc_comment: optional(f.doc_comment),
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_index() -> PatternIndex {
        let index = PatternIndex::in_memory().unwrap();
        index
            .add_document(
                "sym-class",
                "UserService",
                "class",
                "csharp",
                "Services/UserService.cs",
                1,
                20,
                Some("public class UserService : BaseService"),
                None,
                "public class UserService : BaseService UserService class",
            )
            .unwrap();
        index
            .add_document(
                "sym-field",
                "_logger",
                "field",
                "csharp",
                "Services/UserService.cs",
                3,
                3,
                Some("private readonly ILogger<UserService> _logger"),
                None,
                "private readonly ILogger<UserService> _logger _logger field",
            )
            .unwrap();
        index
            .add_document(
                "sym-fn",
                "authenticate_user",
                "function",
                "python",
                "auth/service.py",
                10,
                30,
                Some("def authenticate_user(username, password)"),
                Some("Validate credentials against the user store"),
                "def authenticate_user(username, password) authenticate_user function",
            )
            .unwrap();
        index.commit().unwrap();
        index
    }

    #[test]
    fn pattern_search_matches_code_idioms() {
        let index = seeded_index();

        let hits = index.search_pattern(": BaseService", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "sym-class");

        let hits = index.search_pattern("ILogger<UserService>", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "sym-field");
    }

    #[test]
    fn scores_are_normalized_to_unit_range() {
        let index = seeded_index();
        let hits = index.search_text("authenticate_user", 10);
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.score > 0.0 && h.score <= 1.0));
        assert_eq!(hits[0].score, 1.0);
    }

    #[test]
    fn malformed_queries_return_empty_not_error() {
        let index = seeded_index();
        // Unbalanced quotes / parens are query-syntax errors.
        assert!(index.search_text("\"unbalanced", 10).is_empty());
        for query in [": BaseService", "ILogger<", "[Fact]", "a AND OR", "**"] {
            // Pattern search must never panic or error on special characters.
            let _ = index.search_pattern(query, 10);
        }
    }

    #[test]
    fn delete_file_removes_documents() {
        let index = seeded_index();
        assert_eq!(index.num_docs(), 3);

        index.delete_file("Services/UserService.cs").unwrap();
        index.commit().unwrap();

        assert_eq!(index.num_docs(), 1);
        assert!(index.search_pattern(": BaseService", 10).is_empty());
    }

    #[test]
    fn zero_limit_returns_empty() {
        let index = seeded_index();
        assert!(index.search_text("UserService", 0).is_empty());
    }
}
