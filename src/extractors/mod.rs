// Miller's Extraction Module
//
// Defines the structural entities the index is built from (symbols,
// identifiers, relationships, file records) and the `Extractor` seam that
// parser integrations plug into. Grammar-backed extractors are collaborators;
// the built-in heuristic extractor keeps the engine usable on its own.

pub mod adapter;
pub mod heuristic;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use adapter::{
    ExtractionAdapter, ExtractionBatch, FileBatch, IdentifierBatch, RelationshipBatch, SymbolBatch,
};
pub use heuristic::HeuristicExtractor;

/// A code symbol (function, class, variable, ...) extracted from source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Symbol {
    /// Deterministic identifier derived from path + name + start byte + kind
    pub id: String,
    /// Symbol name as it appears in code
    pub name: String,
    /// Kind of symbol (function, class, ...)
    pub kind: SymbolKind,
    /// Programming language this symbol is from
    pub language: String,
    /// Workspace-relative file path (forward slashes)
    pub file_path: String,
    /// Start line number (1-based)
    pub start_line: u32,
    /// Start column number (0-based)
    pub start_column: u32,
    /// End line number (1-based)
    pub end_line: u32,
    /// End column number (0-based)
    pub end_column: u32,
    /// Start byte offset in file
    pub start_byte: u32,
    /// End byte offset in file
    pub end_byte: u32,
    /// Declaration signature
    pub signature: Option<String>,
    /// Documentation comment
    pub doc_comment: Option<String>,
    /// Visibility (public, private, protected)
    pub visibility: Option<Visibility>,
    /// Parent symbol ID (intra-file containment)
    pub parent_id: Option<String>,
}

impl Symbol {
    /// Pattern-preserving content used by the FTS index:
    /// `"<signature?> <name> <kind>"` joined by single spaces. Never empty
    /// because name and kind are required.
    pub fn code_pattern(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(sig) = &self.signature {
            if !sig.is_empty() {
                parts.push(sig.clone());
            }
        }
        parts.push(self.name.clone());
        parts.push(self.kind.to_string());
        parts.join(" ")
    }
}

/// Kinds of symbols the index distinguishes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Method,
    Field,
    Variable,
    Constant,
    Interface,
    Struct,
    Enum,
    Type,
    Parameter,
    Import,
    Namespace,
    /// Whole-file stub for text files without a grammar
    File,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Method => "method",
            SymbolKind::Field => "field",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Interface => "interface",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Type => "type",
            SymbolKind::Parameter => "parameter",
            SymbolKind::Import => "import",
            SymbolKind::Namespace => "namespace",
            SymbolKind::File => "file",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SymbolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "function" => Ok(SymbolKind::Function),
            "class" => Ok(SymbolKind::Class),
            "method" => Ok(SymbolKind::Method),
            "field" => Ok(SymbolKind::Field),
            "variable" => Ok(SymbolKind::Variable),
            "constant" => Ok(SymbolKind::Constant),
            "interface" => Ok(SymbolKind::Interface),
            "struct" => Ok(SymbolKind::Struct),
            "enum" => Ok(SymbolKind::Enum),
            "type" => Ok(SymbolKind::Type),
            "parameter" => Ok(SymbolKind::Parameter),
            "import" => Ok(SymbolKind::Import),
            "namespace" => Ok(SymbolKind::Namespace),
            "file" => Ok(SymbolKind::File),
            other => Err(format!("unknown symbol kind: {other}")),
        }
    }
}

/// Visibility levels for symbols.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
    Protected,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Protected => "protected",
        };
        write!(f, "{s}")
    }
}

/// A use-site occurrence of a name (distinct from its declaration).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identifier {
    pub id: String,
    pub name: String,
    pub kind: IdentifierKind,
    pub language: String,
    pub file_path: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub start_byte: u32,
    pub end_byte: u32,
    /// Symbol whose body contains this use site
    pub containing_symbol_id: Option<String>,
    /// Null until resolved on demand
    pub target_symbol_id: Option<String>,
    pub confidence: f32,
}

/// Kinds of identifier use sites.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Call,
    Reference,
    Import,
    TypeRef,
    MemberAccess,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdentifierKind::Call => "call",
            IdentifierKind::Reference => "reference",
            IdentifierKind::Import => "import",
            IdentifierKind::TypeRef => "type_ref",
            IdentifierKind::MemberAccess => "member_access",
        };
        write!(f, "{s}")
    }
}

impl FromStr for IdentifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "call" => Ok(IdentifierKind::Call),
            "reference" => Ok(IdentifierKind::Reference),
            "import" => Ok(IdentifierKind::Import),
            "type_ref" => Ok(IdentifierKind::TypeRef),
            "member_access" => Ok(IdentifierKind::MemberAccess),
            other => Err(format!("unknown identifier kind: {other}")),
        }
    }
}

/// A resolved directed edge between two symbols.
///
/// Either endpoint may be null only for unresolved imports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub from_symbol_id: Option<String>,
    pub to_symbol_id: Option<String>,
    pub kind: RelationshipKind,
    pub file_path: String,
    pub line_number: u32,
    pub confidence: f32,
}

/// Kinds of relationships between symbols.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Call,
    Extends,
    Implements,
    Reference,
    Import,
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelationshipKind::Call => "call",
            RelationshipKind::Extends => "extends",
            RelationshipKind::Implements => "implements",
            RelationshipKind::Reference => "reference",
            RelationshipKind::Import => "import",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RelationshipKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "call" | "calls" => Ok(RelationshipKind::Call),
            "extends" => Ok(RelationshipKind::Extends),
            "implements" => Ok(RelationshipKind::Implements),
            "reference" | "references" => Ok(RelationshipKind::Reference),
            "import" | "imports" => Ok(RelationshipKind::Import),
            other => Err(format!("unknown relationship kind: {other}")),
        }
    }
}

/// How a related symbol was discovered during tracing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Variant,
    Semantic,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchType::Exact => "exact",
            MatchType::Variant => "variant",
            MatchType::Semantic => "semantic",
        };
        write!(f, "{s}")
    }
}

/// Metadata row for an indexed file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileInfo {
    /// Workspace-relative path with forward slashes
    pub path: String,
    pub language: String,
    /// Blake3 content hash, hex-encoded
    pub hash: String,
    pub size: i64,
    pub last_modified: i64,
}

/// Deterministic id for a symbol: digest of path + name + start byte + kind.
pub fn symbol_id(file_path: &str, name: &str, start_byte: u32, kind: SymbolKind) -> String {
    stable_id(&[file_path, name, &start_byte.to_string(), &kind.to_string()])
}

/// Deterministic id for an identifier use site.
pub fn identifier_id(file_path: &str, name: &str, start_byte: u32, kind: IdentifierKind) -> String {
    stable_id(&["ident", file_path, name, &start_byte.to_string(), &kind.to_string()])
}

/// Deterministic id for a relationship edge.
pub fn relationship_id(
    from: Option<&str>,
    to: Option<&str>,
    kind: RelationshipKind,
    file_path: &str,
    line_number: u32,
) -> String {
    stable_id(&[
        "rel",
        from.unwrap_or(""),
        to.unwrap_or(""),
        &kind.to_string(),
        file_path,
        &line_number.to_string(),
    ])
}

fn stable_id(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\x1f");
    }
    let digest = hasher.finalize();
    hex::encode(&digest.as_bytes()[..16])
}

/// Result of extracting one file.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub symbols: Vec<Symbol>,
    pub identifiers: Vec<Identifier>,
    pub relationships: Vec<Relationship>,
}

/// The seam parser integrations implement: bytes + language + path in,
/// structural entities out.
pub trait Extractor: Send + Sync {
    /// Extract symbols, identifiers, and relationships from file content.
    fn extract(&self, content: &str, file_path: &str, language: &str) -> Extraction;
}

/// Dispatches files to the extractor registered for their language.
pub struct ExtractorManager {
    extractors: HashMap<String, Box<dyn Extractor>>,
    fallback_language: String,
}

impl ExtractorManager {
    /// Manager with the built-in heuristic extractor registered for all of its
    /// supported languages.
    pub fn new() -> Self {
        let mut extractors: HashMap<String, Box<dyn Extractor>> = HashMap::new();
        for language in HeuristicExtractor::supported_languages() {
            extractors.insert(language.to_string(), Box::new(HeuristicExtractor::new()));
        }
        Self {
            extractors,
            fallback_language: "text".to_string(),
        }
    }

    /// Register or replace the extractor for a language.
    pub fn register(&mut self, language: &str, extractor: Box<dyn Extractor>) {
        self.extractors.insert(language.to_string(), extractor);
    }

    /// Detect language from a file extension. Files without a grammar map to
    /// the `text` pseudo-language.
    pub fn detect_language(path: &str) -> String {
        let ext = path.rsplit('.').next().unwrap_or("").to_lowercase();
        let language = match ext.as_str() {
            "rs" => "rust",
            "py" => "python",
            "ts" | "tsx" => "typescript",
            "js" | "jsx" | "mjs" => "javascript",
            "go" => "go",
            "java" => "java",
            "cs" => "csharp",
            "rb" => "ruby",
            "php" => "php",
            "swift" => "swift",
            "kt" => "kotlin",
            "c" | "h" => "c",
            "cpp" | "cc" | "cxx" | "hpp" => "cpp",
            "sql" => "sql",
            "sh" | "bash" => "bash",
            "lua" => "lua",
            _ => "text",
        };
        language.to_string()
    }

    /// Whether a language has a registered (non-fallback) extractor.
    pub fn has_extractor(&self, language: &str) -> bool {
        self.extractors.contains_key(language)
    }

    /// Extract one file, falling back to a single `File`-kind symbol carrying
    /// a truncated content blob when no extractor covers the language.
    pub fn extract(&self, content: &str, file_path: &str, language: &str) -> Extraction {
        if let Some(extractor) = self.extractors.get(language) {
            return extractor.extract(content, file_path, language);
        }
        self.extract_text_stub(content, file_path)
    }

    /// Byte cap for the `File`-stub content blob.
    const TEXT_STUB_LIMIT: usize = 2048;

    fn extract_text_stub(&self, content: &str, file_path: &str) -> Extraction {
        let name = file_path
            .rsplit('/')
            .next()
            .unwrap_or(file_path)
            .to_string();

        let mut blob: String = content.chars().take(Self::TEXT_STUB_LIMIT).collect();
        blob = blob.split_whitespace().collect::<Vec<_>>().join(" ");

        let line_count = content.lines().count().max(1) as u32;
        let symbol = Symbol {
            id: symbol_id(file_path, &name, 0, SymbolKind::File),
            name,
            kind: SymbolKind::File,
            language: self.fallback_language.clone(),
            file_path: file_path.to_string(),
            start_line: 1,
            start_column: 0,
            end_line: line_count,
            end_column: 0,
            start_byte: 0,
            end_byte: content.len() as u32,
            signature: if blob.is_empty() { None } else { Some(blob) },
            doc_comment: None,
            visibility: None,
            parent_id: None,
        };

        Extraction {
            symbols: vec![symbol],
            identifiers: Vec::new(),
            relationships: Vec::new(),
        }
    }
}

impl Default for ExtractorManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_ids_are_deterministic() {
        let a = symbol_id("src/lib.rs", "parse", 120, SymbolKind::Function);
        let b = symbol_id("src/lib.rs", "parse", 120, SymbolKind::Function);
        let c = symbol_id("src/lib.rs", "parse", 121, SymbolKind::Function);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn code_pattern_joins_signature_name_kind() {
        let sym = Symbol {
            id: "x".into(),
            name: "UserService".into(),
            kind: SymbolKind::Class,
            language: "csharp".into(),
            file_path: "src/UserService.cs".into(),
            start_line: 1,
            start_column: 0,
            end_line: 10,
            end_column: 0,
            start_byte: 0,
            end_byte: 100,
            signature: Some("public class UserService : BaseService".into()),
            doc_comment: None,
            visibility: Some(Visibility::Public),
            parent_id: None,
        };
        assert_eq!(
            sym.code_pattern(),
            "public class UserService : BaseService UserService class"
        );
    }

    #[test]
    fn code_pattern_never_empty_without_signature() {
        let sym = Symbol {
            id: "x".into(),
            name: "helper".into(),
            kind: SymbolKind::Function,
            language: "python".into(),
            file_path: "a.py".into(),
            start_line: 1,
            start_column: 0,
            end_line: 1,
            end_column: 0,
            start_byte: 0,
            end_byte: 10,
            signature: None,
            doc_comment: None,
            visibility: None,
            parent_id: None,
        };
        assert_eq!(sym.code_pattern(), "helper function");
    }

    #[test]
    fn language_detection_with_text_fallback() {
        assert_eq!(ExtractorManager::detect_language("src/main.rs"), "rust");
        assert_eq!(ExtractorManager::detect_language("app/models.py"), "python");
        assert_eq!(ExtractorManager::detect_language("ui/App.tsx"), "typescript");
        assert_eq!(ExtractorManager::detect_language("notes.txt"), "text");
        assert_eq!(ExtractorManager::detect_language("README"), "text");
    }

    #[test]
    fn text_fallback_produces_single_file_symbol() {
        let manager = ExtractorManager::new();
        let extraction = manager.extract("hello   world\nsecond line", "docs/notes.txt", "text");
        assert_eq!(extraction.symbols.len(), 1);
        let stub = &extraction.symbols[0];
        assert_eq!(stub.kind, SymbolKind::File);
        assert_eq!(stub.name, "notes.txt");
        assert_eq!(stub.signature.as_deref(), Some("hello world second line"));
        assert!(extraction.identifiers.is_empty());
        assert!(extraction.relationships.is_empty());
    }

    #[test]
    fn kind_round_trips_through_strings() {
        for kind in [
            SymbolKind::Function,
            SymbolKind::Class,
            SymbolKind::Import,
            SymbolKind::File,
        ] {
            assert_eq!(kind.to_string().parse::<SymbolKind>().unwrap(), kind);
        }
        assert_eq!("Calls".parse::<RelationshipKind>().unwrap(), RelationshipKind::Call);
    }
}
