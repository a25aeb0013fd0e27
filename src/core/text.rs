//! Tokenization shared by dictionary keys and document matching.
//!
//! A token is a maximal run of Unicode alphanumeric characters, lowercased.
//! Everything else is a separator. The normalized form of a text is its
//! tokens joined by single spaces, and token offsets are char offsets into
//! that form. Dictionary keys and document text go through the same
//! function, otherwise lookups silently miss.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// Char offset into the normalized text.
    pub offset: usize,
}

impl Token {
    /// Char offset one past the end of the token.
    pub fn end(&self) -> usize {
        self.offset + self.text.chars().count()
    }
}

pub fn tokenize(input: &str) -> Vec<Token> {
    tokenize_from(input, 0)
}

/// Tokenizes `input` as if its normalized form started at `start`.
pub fn tokenize_from(input: &str, start: usize) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut cursor = start;

    for c in input.chars() {
        if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            push_token(&mut tokens, &mut cursor, std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        push_token(&mut tokens, &mut cursor, current);
    }

    tokens
}

fn push_token(tokens: &mut Vec<Token>, cursor: &mut usize, text: String) {
    if !tokens.is_empty() {
        *cursor += 1;
    }
    let len = text.chars().count();
    tokens.push(Token {
        text,
        offset: *cursor,
    });
    *cursor += len;
}

pub fn normalize(input: &str) -> String {
    tokenize(input)
        .into_iter()
        .map(|t| t.text)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapses runs of whitespace to single spaces and trims.
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
