//! Query and description canonicalization.
//!
//! `normalize` is the leaf dependency of every other module: the lexical
//! index, the fuzzy matcher and the feature extractor all operate on its
//! output. It is total (garbage in, empty token list out) and idempotent,
//! so callers may re-normalize freely.

/// Canonical form of a piece of text: lowercase word tokens joined by single
/// spaces. No synonym folding happens here ("4p" stays distinct from
/// "4 pole").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    text: String,
    tokens: Vec<String>,
}

impl Normalized {
    /// The canonical text, tokens joined by single spaces.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Distinct tokens, for overlap-style features.
    pub fn token_set(&self) -> std::collections::HashSet<&str> {
        self.tokens.iter().map(String::as_str).collect()
    }
}

/// Lowercase, map every non-word character to a separator, collapse runs of
/// separators. Word characters are alphanumerics and `_`; everything else
/// (punctuation, symbols, control chars) separates tokens.
pub fn normalize(input: &str) -> Normalized {
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    for raw in input.chars() {
        for c in raw.to_lowercase() {
            if c.is_alphanumeric() || c == '_' {
                current.push(c);
            } else if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    let text = tokens.join(" ");
    Normalized { text, tokens }
}
