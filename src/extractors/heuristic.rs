//! Built-in line-heuristic extractor.
//!
//! Grammar-backed parsers plug in behind the [`Extractor`](super::Extractor)
//! trait; this extractor keeps the engine self-sufficient by recognizing the
//! declaration shapes shared by the mainstream languages (defs, classes,
//! interfaces, fields, imports) plus call sites, without a parse tree.
//!
//! It is intentionally line-oriented: indentation scopes Python, brace depth
//! scopes the C-family, and everything it cannot classify is simply skipped.

use std::collections::{HashMap, HashSet};

use super::{
    identifier_id, relationship_id, symbol_id, Extraction, Extractor, Identifier, IdentifierKind,
    Relationship, RelationshipKind, Symbol, SymbolKind, Visibility,
};

/// Control-flow and declaration keywords that must never become call
/// identifiers.
const CALL_KEYWORDS: &[&str] = &[
    "if", "else", "elif", "for", "while", "switch", "match", "catch", "except", "return", "yield",
    "new", "throw", "raise", "assert", "print", "super", "this", "self", "typeof", "sizeof",
    "defer", "await", "function", "def", "fn", "func", "class", "struct", "enum", "interface",
    "impl", "trait", "type", "var", "let", "const", "public", "private", "protected", "static",
    "readonly", "async", "use", "using", "import", "from", "package", "namespace", "with", "in",
    "not", "and", "or", "do", "loop", "try",
];

pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn supported_languages() -> &'static [&'static str] {
        &[
            "python",
            "typescript",
            "javascript",
            "rust",
            "csharp",
            "java",
            "go",
        ]
    }
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for HeuristicExtractor {
    fn extract(&self, content: &str, file_path: &str, language: &str) -> Extraction {
        let mut state = ScanState::new(file_path, language);
        let mut byte_offset = 0u32;

        for (idx, raw_line) in content.lines().enumerate() {
            let line_number = (idx + 1) as u32;
            let line_len = raw_line.len() as u32;
            state.scan_line(raw_line, line_number, byte_offset);
            // +1 for the newline; the final line without one only overshoots
            // end_byte bookkeeping, never symbol identity.
            byte_offset += line_len + 1;
        }

        state.finish(content)
    }
}

/// One open declaration scope (class body, impl block, function body).
struct Scope {
    symbol_index: usize,
    /// Indentation for Python, brace depth for brace languages.
    level: usize,
    is_container: bool,
}

struct ScanState<'a> {
    file_path: &'a str,
    language: &'a str,
    symbols: Vec<Symbol>,
    identifiers: Vec<Identifier>,
    relationships: Vec<Relationship>,
    /// Unresolved supertype names per declaring symbol index
    pending_supers: Vec<(usize, String, RelationshipKind, u32)>,
    /// Pending call sites: (caller symbol index, callee name, line)
    pending_calls: Vec<(Option<usize>, String, u32, u32)>,
    scopes: Vec<Scope>,
    doc_buffer: Vec<String>,
    brace_depth: usize,
    uses_braces: bool,
}

impl<'a> ScanState<'a> {
    fn new(file_path: &'a str, language: &'a str) -> Self {
        Self {
            file_path,
            language,
            symbols: Vec::new(),
            identifiers: Vec::new(),
            relationships: Vec::new(),
            pending_supers: Vec::new(),
            pending_calls: Vec::new(),
            scopes: Vec::new(),
            doc_buffer: Vec::new(),
            brace_depth: 0,
            uses_braces: language != "python",
        }
    }

    fn scan_line(&mut self, raw_line: &str, line_number: u32, byte_offset: u32) {
        let trimmed = raw_line.trim();
        let indent = raw_line.len() - raw_line.trim_start().len();

        // Comment lines accumulate into the doc buffer for the next decl.
        if let Some(doc) = comment_text(trimmed, self.language) {
            self.doc_buffer.push(doc.to_string());
            return;
        }
        if trimmed.is_empty() {
            return;
        }

        if !self.uses_braces {
            // Python scoping: close scopes once indentation retreats.
            while let Some(scope) = self.scopes.last() {
                if indent <= scope.level {
                    let closed = self.scopes.pop().unwrap();
                    self.close_symbol(closed.symbol_index, line_number.saturating_sub(1), byte_offset);
                } else {
                    break;
                }
            }
        }

        let level = if self.uses_braces { self.brace_depth } else { indent };
        let decl = parse_declaration(trimmed, self.language, self.in_container());

        if let Some(decl) = decl {
            let doc_comment = if self.doc_buffer.is_empty() {
                None
            } else {
                Some(self.doc_buffer.join("\n"))
            };
            self.doc_buffer.clear();

            let parent_id = self
                .scopes
                .last()
                .map(|s| self.symbols[s.symbol_index].id.clone());

            let start_byte = byte_offset + indent as u32;
            let symbol = Symbol {
                id: symbol_id(self.file_path, &decl.name, start_byte, decl.kind),
                name: decl.name.clone(),
                kind: decl.kind,
                language: self.language.to_string(),
                file_path: self.file_path.to_string(),
                start_line: line_number,
                start_column: indent as u32,
                end_line: line_number,
                end_column: 0,
                start_byte,
                end_byte: byte_offset + raw_line.len() as u32,
                signature: Some(decl.signature.clone()),
                doc_comment,
                visibility: Some(decl.visibility),
                parent_id,
            };
            let symbol_index = self.symbols.len();
            self.symbols.push(symbol);

            for (super_name, kind) in decl.supertypes {
                self.pending_supers
                    .push((symbol_index, super_name, kind, line_number));
            }

            if decl.opens_scope {
                self.scopes.push(Scope {
                    symbol_index,
                    level,
                    is_container: decl.is_container,
                });
            }
        } else {
            self.doc_buffer.clear();
            self.collect_call_sites(trimmed, line_number, byte_offset + indent as u32);
        }

        if self.uses_braces {
            for c in raw_line.chars() {
                match c {
                    '{' => self.brace_depth += 1,
                    '}' => {
                        self.brace_depth = self.brace_depth.saturating_sub(1);
                        while let Some(scope) = self.scopes.last() {
                            if scope.level >= self.brace_depth {
                                let closed = self.scopes.pop().unwrap();
                                self.close_symbol(
                                    closed.symbol_index,
                                    line_number,
                                    byte_offset + raw_line.len() as u32,
                                );
                            } else {
                                break;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn in_container(&self) -> bool {
        self.scopes.last().is_some_and(|s| s.is_container)
    }

    fn close_symbol(&mut self, index: usize, end_line: u32, end_byte: u32) {
        let symbol = &mut self.symbols[index];
        symbol.end_line = end_line.max(symbol.start_line);
        symbol.end_byte = end_byte.max(symbol.start_byte);
    }

    fn collect_call_sites(&mut self, trimmed: &str, line_number: u32, line_start_byte: u32) {
        let containing = self.scopes.last().map(|s| s.symbol_index);
        for (name, offset) in call_names(trimmed) {
            self.pending_calls.push((
                containing,
                name,
                line_number,
                line_start_byte + offset as u32,
            ));
        }
    }

    fn finish(mut self, content: &str) -> Extraction {
        let total_len = content.len() as u32;
        let last_line = content.lines().count().max(1) as u32;
        while let Some(scope) = self.scopes.pop() {
            self.close_symbol(scope.symbol_index, last_line, total_len);
        }

        // Any declaration that never opened a scope still needs a sane span.
        for symbol in &mut self.symbols {
            if symbol.end_line < symbol.start_line {
                symbol.end_line = symbol.start_line;
            }
        }

        let by_name: HashMap<String, String> = self
            .symbols
            .iter()
            .map(|s| (s.name.clone(), s.id.clone()))
            .collect();

        // Supertype edges: resolved within the file become relationships,
        // unresolved ones still leave a TypeRef identifier behind.
        for (from_index, super_name, kind, line) in std::mem::take(&mut self.pending_supers) {
            let from_id = self.symbols[from_index].id.clone();
            if let Some(to_id) = by_name.get(&super_name) {
                self.relationships.push(Relationship {
                    id: relationship_id(
                        Some(&from_id),
                        Some(to_id),
                        kind,
                        self.file_path,
                        line,
                    ),
                    from_symbol_id: Some(from_id.clone()),
                    to_symbol_id: Some(to_id.clone()),
                    kind,
                    file_path: self.file_path.to_string(),
                    line_number: line,
                    confidence: 1.0,
                });
            }
            self.identifiers.push(Identifier {
                id: identifier_id(self.file_path, &super_name, line * 1000, IdentifierKind::TypeRef),
                name: super_name,
                kind: IdentifierKind::TypeRef,
                language: self.language.to_string(),
                file_path: self.file_path.to_string(),
                start_line: line,
                start_column: 0,
                end_line: line,
                end_column: 0,
                start_byte: 0,
                end_byte: 0,
                containing_symbol_id: Some(from_id),
                target_symbol_id: None,
                confidence: 0.9,
            });
        }

        let mut seen_edges = HashSet::new();
        for (caller_index, callee, line, start_byte) in std::mem::take(&mut self.pending_calls) {
            let containing_id = caller_index.map(|i| self.symbols[i].id.clone());
            let target_id = by_name.get(&callee).cloned();

            self.identifiers.push(Identifier {
                id: identifier_id(self.file_path, &callee, start_byte, IdentifierKind::Call),
                name: callee.clone(),
                kind: IdentifierKind::Call,
                language: self.language.to_string(),
                file_path: self.file_path.to_string(),
                start_line: line,
                start_column: 0,
                end_line: line,
                end_column: callee.len() as u32,
                start_byte,
                end_byte: start_byte + callee.len() as u32,
                containing_symbol_id: containing_id.clone(),
                target_symbol_id: target_id.clone(),
                confidence: 1.0,
            });

            if let (Some(from), Some(to)) = (containing_id, target_id) {
                if from != to && seen_edges.insert((from.clone(), to.clone())) {
                    self.relationships.push(Relationship {
                        id: relationship_id(
                            Some(&from),
                            Some(&to),
                            RelationshipKind::Call,
                            self.file_path,
                            line,
                        ),
                        from_symbol_id: Some(from),
                        to_symbol_id: Some(to),
                        kind: RelationshipKind::Call,
                        file_path: self.file_path.to_string(),
                        line_number: line,
                        confidence: 0.9,
                    });
                }
            }
        }

        Extraction {
            symbols: self.symbols,
            identifiers: self.identifiers,
            relationships: self.relationships,
        }
    }
}

/// Extract the comment payload if the line is a full-line comment.
fn comment_text<'l>(trimmed: &'l str, language: &str) -> Option<&'l str> {
    if language == "python" {
        return trimmed.strip_prefix('#').map(str::trim);
    }
    trimmed
        .strip_prefix("///")
        .or_else(|| trimmed.strip_prefix("//"))
        .or_else(|| {
            trimmed
                .strip_prefix("/*")
                .and_then(|rest| rest.strip_suffix("*/"))
        })
        .or_else(|| trimmed.strip_prefix('*').filter(|_| trimmed.starts_with("* ")))
        .map(str::trim)
}

struct Declaration {
    name: String,
    kind: SymbolKind,
    signature: String,
    visibility: Visibility,
    supertypes: Vec<(String, RelationshipKind)>,
    opens_scope: bool,
    is_container: bool,
}

fn parse_declaration(trimmed: &str, language: &str, in_container: bool) -> Option<Declaration> {
    match language {
        "python" => parse_python(trimmed, in_container),
        "rust" => parse_rust(trimmed, in_container),
        "go" => parse_go(trimmed),
        _ => parse_brace_language(trimmed, language, in_container),
    }
}

fn parse_python(trimmed: &str, in_container: bool) -> Option<Declaration> {
    let signature = trimmed.trim_end_matches(':').to_string();

    if let Some(rest) = trimmed
        .strip_prefix("def ")
        .or_else(|| trimmed.strip_prefix("async def "))
    {
        let name = ident_prefix(rest)?;
        let visibility = if name.starts_with('_') {
            Visibility::Private
        } else {
            Visibility::Public
        };
        return Some(Declaration {
            kind: if in_container {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            },
            name,
            signature,
            visibility,
            supertypes: Vec::new(),
            opens_scope: true,
            is_container: false,
        });
    }

    if let Some(rest) = trimmed.strip_prefix("class ") {
        let name = ident_prefix(rest)?;
        let mut supertypes = Vec::new();
        if let Some(open) = rest.find('(') {
            if let Some(close) = rest[open..].find(')') {
                for base in rest[open + 1..open + close].split(',') {
                    let base = base.trim();
                    if !base.is_empty() && base != "object" {
                        supertypes.push((base.to_string(), RelationshipKind::Extends));
                    }
                }
            }
        }
        return Some(Declaration {
            name,
            kind: SymbolKind::Class,
            signature,
            visibility: Visibility::Public,
            supertypes,
            opens_scope: true,
            is_container: true,
        });
    }

    if trimmed.starts_with("import ") || trimmed.starts_with("from ") {
        let name = trimmed
            .split_whitespace()
            .nth(1)
            .unwrap_or("")
            .split('.')
            .next_back()
            .unwrap_or("")
            .to_string();
        if name.is_empty() {
            return None;
        }
        return Some(Declaration {
            name,
            kind: SymbolKind::Import,
            signature,
            visibility: Visibility::Public,
            supertypes: Vec::new(),
            opens_scope: false,
            is_container: false,
        });
    }

    // Module-level SCREAMING_SNAKE assignments are constants.
    if !in_container {
        if let Some(eq) = trimmed.find('=') {
            let lhs = trimmed[..eq].trim();
            if !lhs.is_empty()
                && lhs.chars().all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit())
                && lhs.chars().next().is_some_and(|c| c.is_ascii_uppercase())
            {
                return Some(Declaration {
                    name: lhs.to_string(),
                    kind: SymbolKind::Constant,
                    signature,
                    visibility: Visibility::Public,
                    supertypes: Vec::new(),
                    opens_scope: false,
                    is_container: false,
                });
            }
        }
    }

    None
}

fn parse_rust(trimmed: &str, in_container: bool) -> Option<Declaration> {
    let visibility = if trimmed.starts_with("pub") {
        Visibility::Public
    } else {
        Visibility::Private
    };
    let stripped = trimmed
        .trim_start_matches("pub(crate) ")
        .trim_start_matches("pub ")
        .trim_start_matches("async ")
        .trim_start_matches("unsafe ");
    let signature = trimmed.trim_end_matches('{').trim().to_string();
    let opens = trimmed.ends_with('{');

    let decl = |name: String, kind, is_container| Declaration {
        name,
        kind,
        signature: signature.clone(),
        visibility,
        supertypes: Vec::new(),
        opens_scope: opens,
        is_container,
    };

    if let Some(rest) = stripped.strip_prefix("fn ") {
        let kind = if in_container {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };
        return Some(decl(ident_prefix(rest)?, kind, false));
    }
    if let Some(rest) = stripped.strip_prefix("struct ") {
        return Some(decl(ident_prefix(rest)?, SymbolKind::Struct, true));
    }
    if let Some(rest) = stripped.strip_prefix("enum ") {
        return Some(decl(ident_prefix(rest)?, SymbolKind::Enum, true));
    }
    if let Some(rest) = stripped.strip_prefix("trait ") {
        return Some(decl(ident_prefix(rest)?, SymbolKind::Interface, true));
    }
    if let Some(rest) = stripped.strip_prefix("impl ") {
        // The impl target becomes the container; `impl Display for Foo`
        // scopes its methods under Foo.
        let name = rest
            .trim_end_matches('{')
            .split_whitespace()
            .last()
            .map(|n| n.split('<').next().unwrap_or(n))
            .and_then(ident_prefix)?;
        return Some(Declaration {
            name,
            kind: SymbolKind::Namespace,
            signature,
            visibility,
            supertypes: Vec::new(),
            opens_scope: opens,
            is_container: true,
        });
    }
    if let Some(rest) = stripped.strip_prefix("type ") {
        return Some(decl(ident_prefix(rest)?, SymbolKind::Type, false));
    }
    if let Some(rest) = stripped
        .strip_prefix("const ")
        .or_else(|| stripped.strip_prefix("static "))
    {
        return Some(decl(ident_prefix(rest)?, SymbolKind::Constant, false));
    }
    if let Some(rest) = stripped.strip_prefix("mod ") {
        return Some(decl(ident_prefix(rest)?, SymbolKind::Namespace, true));
    }
    if let Some(rest) = stripped.strip_prefix("use ") {
        let name = rest
            .trim_end_matches(';')
            .rsplit("::")
            .next()
            .unwrap_or("")
            .trim_end_matches('}')
            .trim()
            .to_string();
        if name.is_empty() || name == "*" {
            return None;
        }
        return Some(decl(name, SymbolKind::Import, false));
    }

    None
}

fn parse_go(trimmed: &str) -> Option<Declaration> {
    let signature = trimmed.trim_end_matches('{').trim().to_string();
    let opens = trimmed.ends_with('{');

    if let Some(rest) = trimmed.strip_prefix("func ") {
        // Method receivers: func (s *Server) Name(...)
        let rest = if rest.starts_with('(') {
            rest.find(')').map(|i| rest[i + 1..].trim_start()).unwrap_or(rest)
        } else {
            rest
        };
        let name = ident_prefix(rest)?;
        let visibility = if name.chars().next().is_some_and(|c| c.is_uppercase()) {
            Visibility::Public
        } else {
            Visibility::Private
        };
        return Some(Declaration {
            name,
            kind: SymbolKind::Function,
            signature,
            visibility,
            supertypes: Vec::new(),
            opens_scope: opens,
            is_container: false,
        });
    }

    if let Some(rest) = trimmed.strip_prefix("type ") {
        let name = ident_prefix(rest)?;
        let kind = if rest.contains("interface") {
            SymbolKind::Interface
        } else if rest.contains("struct") {
            SymbolKind::Struct
        } else {
            SymbolKind::Type
        };
        return Some(Declaration {
            name,
            kind,
            signature,
            visibility: Visibility::Public,
            supertypes: Vec::new(),
            opens_scope: opens,
            is_container: true,
        });
    }

    if trimmed.starts_with("import ") {
        let name = trimmed
            .split_whitespace()
            .last()
            .unwrap_or("")
            .trim_matches('"')
            .rsplit('/')
            .next()
            .unwrap_or("")
            .to_string();
        if name.is_empty() {
            return None;
        }
        return Some(Declaration {
            name,
            kind: SymbolKind::Import,
            signature,
            visibility: Visibility::Public,
            supertypes: Vec::new(),
            opens_scope: false,
            is_container: false,
        });
    }

    None
}

/// TypeScript / JavaScript / C# / Java share enough brace-language shape for
/// one parser: class/interface/enum headers with extends/implements clauses,
/// function declarations, fields and methods inside containers.
fn parse_brace_language(trimmed: &str, language: &str, in_container: bool) -> Option<Declaration> {
    let signature = trimmed
        .trim_end_matches('{')
        .trim()
        .trim_end_matches(';')
        .to_string();

    let visibility = if trimmed.contains("private") {
        Visibility::Private
    } else if trimmed.contains("protected") {
        Visibility::Protected
    } else {
        Visibility::Public
    };

    let words: Vec<&str> = trimmed
        .trim_start_matches("export ")
        .trim_start_matches("default ")
        .split_whitespace()
        .collect();

    for (i, word) in words.iter().enumerate() {
        let kind = match *word {
            "class" => Some(SymbolKind::Class),
            "interface" => Some(SymbolKind::Interface),
            "enum" => Some(SymbolKind::Enum),
            "struct" => Some(SymbolKind::Struct),
            "namespace" => Some(SymbolKind::Namespace),
            _ => None,
        };
        if let Some(kind) = kind {
            let name = words.get(i + 1).and_then(|n| ident_prefix(n))?;
            let mut supertypes = Vec::new();

            // C# style: class UserService : BaseService, IUserService
            if let Some(colon) = trimmed.find(" : ") {
                for base in trimmed[colon + 3..].trim_end_matches('{').split(',') {
                    let base = base.trim().split('<').next().unwrap_or("").to_string();
                    if base.is_empty() {
                        continue;
                    }
                    let rel = if base.starts_with('I') && kind == SymbolKind::Class {
                        RelationshipKind::Implements
                    } else {
                        RelationshipKind::Extends
                    };
                    supertypes.push((base, rel));
                }
            }
            // Java / TypeScript style clauses
            if let Some(pos) = words.iter().position(|w| *w == "extends") {
                if let Some(base) = words.get(pos + 1) {
                    let base = base.trim_end_matches('{').trim_end_matches(',');
                    if let Some(name) = ident_prefix(base) {
                        supertypes.push((name, RelationshipKind::Extends));
                    }
                }
            }
            if let Some(pos) = words.iter().position(|w| *w == "implements") {
                for base in &words[pos + 1..] {
                    let base = base.trim_end_matches('{').trim_end_matches(',');
                    if let Some(name) = ident_prefix(base) {
                        supertypes.push((name, RelationshipKind::Implements));
                    }
                }
            }

            return Some(Declaration {
                name,
                kind,
                signature,
                visibility,
                supertypes,
                // Scope opens at the decl even in Allman style where the
                // brace arrives on the next line.
                opens_scope: true,
                is_container: true,
            });
        }
    }

    if let Some(pos) = words.iter().position(|w| *w == "function") {
        let name = words.get(pos + 1).and_then(|n| ident_prefix(n))?;
        return Some(Declaration {
            name,
            kind: SymbolKind::Function,
            signature,
            visibility,
            supertypes: Vec::new(),
            opens_scope: true,
            is_container: false,
        });
    }

    // Arrow functions: const handler = (...) => ...
    if (words.first() == Some(&"const") || words.first() == Some(&"let"))
        && trimmed.contains("=>")
    {
        if let Some(name) = words.get(1).and_then(|n| ident_prefix(n)) {
            return Some(Declaration {
                name,
                kind: SymbolKind::Function,
                signature,
                visibility,
                supertypes: Vec::new(),
                opens_scope: trimmed.ends_with('{'),
                is_container: false,
            });
        }
    }

    if trimmed.starts_with("import ") || trimmed.starts_with("using ") {
        let name = signature
            .trim_end_matches(';')
            .rsplit(|c| c == '.' || c == '/' || c == ' ')
            .next()
            .unwrap_or("")
            .trim_matches(|c| c == '"' || c == '\'')
            .to_string();
        if name.is_empty() || !name.chars().next().is_some_and(is_ident_start) {
            return None;
        }
        return Some(Declaration {
            name,
            kind: SymbolKind::Import,
            signature,
            visibility: Visibility::Public,
            supertypes: Vec::new(),
            opens_scope: false,
            is_container: false,
        });
    }

    if in_container {
        // Fields: `private readonly ILogger<UserService> _logger;`
        if trimmed.ends_with(';') && !trimmed.contains('(') {
            if let Some(name) = words
                .iter()
                .rev()
                .map(|w| w.trim_end_matches(';').trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_'))
                .find_map(|w| {
                    let w = w.split('=').next().unwrap_or(w).trim();
                    ident_prefix(w).filter(|n| n.len() == w.len())
                })
            {
                return Some(Declaration {
                    name,
                    kind: SymbolKind::Field,
                    signature,
                    visibility,
                    supertypes: Vec::new(),
                    opens_scope: false,
                    is_container: false,
                });
            }
        }

        // Methods: a parenthesized declaration that opens a body.
        if trimmed.contains('(') && !trimmed.ends_with(';') {
            if let Some(open) = trimmed.find('(') {
                let head = &trimmed[..open];
                if let Some(name) = head.split_whitespace().last().and_then(ident_prefix) {
                    if !CALL_KEYWORDS.contains(&name.as_str()) {
                        return Some(Declaration {
                            name,
                            kind: SymbolKind::Method,
                            signature,
                            visibility,
                            supertypes: Vec::new(),
                            opens_scope: true,
                            is_container: false,
                        });
                    }
                }
            }
        }
    }

    let _ = language;
    None
}

/// Leading identifier of a string, if it starts with one.
fn ident_prefix(s: &str) -> Option<String> {
    let mut name = String::new();
    for (i, c) in s.chars().enumerate() {
        if (i == 0 && is_ident_start(c)) || (i > 0 && (c.is_alphanumeric() || c == '_')) {
            name.push(c);
        } else {
            break;
        }
    }
    if name.is_empty() { None } else { Some(name) }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

/// Call sites on a line: identifiers immediately followed by `(`.
fn call_names(line: &str) -> Vec<(String, usize)> {
    let mut results = Vec::new();
    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if is_ident_start(c) {
            let start = i;
            while i < bytes.len() {
                let c = bytes[i] as char;
                if c.is_alphanumeric() || c == '_' {
                    i += 1;
                } else {
                    break;
                }
            }
            let name = &line[start..i];
            if i < bytes.len() && bytes[i] == b'(' && !CALL_KEYWORDS.contains(&name) {
                results.push((name.to_string(), start));
            }
        } else {
            i += 1;
        }
    }

    results
}
