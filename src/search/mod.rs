// Miller's Search Module
//
// Full-text half of the dual-store query layer: a Tantivy index over each
// symbol's `code_pattern` with a whitespace tokenizer that keeps code
// punctuation searchable, plus the router that fuses text, pattern, and
// semantic results.

pub mod pattern_index;
pub mod router;
pub mod scoring;
pub mod tokenizer;

use std::fmt;
use std::str::FromStr;

pub use pattern_index::PatternIndex;
pub use router::{GraphExpansion, Reranker, SearchOptions, SearchOutcome, SearchRouter};

/// Characters that carry meaning in code idioms. A query containing any of
/// them routes to pattern search, where the whitespace tokenizer preserves
/// them as searchable content.
pub const PATTERN_CHARS: &[char] = &[
    ':', '<', '>', '[', ']', '(', ')', '{', '}', '=', '?', '.', ',', '/', '\\', '|', '&', '^',
    '~', '!', '+', '-', '*', '@', '#',
];

/// Search flavors exposed by the query layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    Auto,
    Text,
    Pattern,
    Semantic,
    Hybrid,
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchMethod::Auto => "auto",
            SearchMethod::Text => "text",
            SearchMethod::Pattern => "pattern",
            SearchMethod::Semantic => "semantic",
            SearchMethod::Hybrid => "hybrid",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SearchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(SearchMethod::Auto),
            "text" => Ok(SearchMethod::Text),
            "pattern" => Ok(SearchMethod::Pattern),
            "semantic" => Ok(SearchMethod::Semantic),
            "hybrid" => Ok(SearchMethod::Hybrid),
            other => Err(format!("unknown search method: {other}")),
        }
    }
}

/// Resolve `auto` into a concrete method: queries carrying code punctuation
/// go to pattern search, everything else to hybrid.
pub fn detect_search_method(query: &str) -> SearchMethod {
    if query.chars().any(|c| PATTERN_CHARS.contains(&c)) {
        SearchMethod::Pattern
    } else {
        SearchMethod::Hybrid
    }
}
