//! Whitespace tokenization for the pattern index.
//!
//! Splits on whitespace only: no stemming, no folding, no punctuation
//! stripping. `: < > [ ] ( ) { }` and friends stay inside tokens, which is
//! what makes code-idiom queries like `": BaseService"` or `"ILogger<"`
//! matchable at all. Tokens are lowercased so matching is case-insensitive;
//! positions are sequential to support phrase queries.

use tantivy::tokenizer::{Token, TokenStream, Tokenizer};

/// Tokenizer name registered with the index.
pub const WHITESPACE_TOKENIZER: &str = "code_whitespace";

#[derive(Debug, Clone, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    type TokenStream<'a> = WhitespaceTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        let mut tokens = Vec::new();
        let mut position = 0usize;
        let mut offset = 0usize;

        for chunk in text.split_whitespace() {
            // split_whitespace drops offsets; recover them with find from the
            // current scan point (chunks appear in order).
            let start = text[offset..]
                .find(chunk)
                .map(|i| offset + i)
                .unwrap_or(offset);
            let end = start + chunk.len();
            tokens.push(Token {
                offset_from: start,
                offset_to: end,
                position,
                text: chunk.to_lowercase(),
                position_length: 1,
            });
            position += 1;
            offset = end;
        }

        WhitespaceTokenStream { tokens, current: 0 }
    }
}

pub struct WhitespaceTokenStream {
    tokens: Vec<Token>,
    current: usize,
}

impl TokenStream for WhitespaceTokenStream {
    fn advance(&mut self) -> bool {
        if self.current < self.tokens.len() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.current - 1]
    }
}
