//! Span extraction for mixed English/Chinese text.
//!
//! Offsets are char (Unicode scalar) offsets into the input, end exclusive.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::vocab::Language;

/// Letters, digits and underscore, optionally hyphen-joined (`high-level`)
static LATIN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9_]+(?:-[A-Za-z0-9_]+)*").expect("Failed to compile latin token regex")
});

/// CJK ideographs with optional trailing digits (`测试123`)
static CJK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x{4e00}-\x{9fff}][\x{4e00}-\x{9fff}0-9]*")
        .expect("Failed to compile cjk token regex")
});

/// Linking particle dropped from the front of a CJK span.
const CJK_PARTICLE: char = '的';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Latin,
    Cjk,
}

impl TokenKind {
    /// Language hint used when resolving a token of this script.
    pub fn language_hint(&self) -> Language {
        match self {
            TokenKind::Latin => Language::En,
            TokenKind::Cjk => Language::Zh,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub start: usize,
    pub end: usize,
    pub surface: String,
    pub kind: TokenKind,
}

/// Non-overlapping spans ordered by start. On overlap the span starting
/// first wins (ending first among equal starts); later overlapping spans are
/// dropped.
pub fn extract_tokens(text: &str) -> Vec<Token> {
    if text.is_empty() {
        return vec![];
    }

    // byte offset -> char offset, with one slot past the end
    let mut char_at = vec![0usize; text.len() + 1];
    let mut count = 0;
    for (byte, ch) in text.char_indices() {
        for slot in &mut char_at[byte..byte + ch.len_utf8()] {
            *slot = count;
        }
        count += 1;
    }
    char_at[text.len()] = count;

    let mut matches: Vec<Token> = LATIN_REGEX
        .find_iter(text)
        .map(|m| Token {
            start: char_at[m.start()],
            end: char_at[m.end()],
            surface: m.as_str().to_string(),
            kind: TokenKind::Latin,
        })
        .collect();

    for m in CJK_REGEX.find_iter(text) {
        let mut start = char_at[m.start()];
        let mut surface = m.as_str();
        if let Some(rest) = surface.strip_prefix(CJK_PARTICLE) {
            if !rest.is_empty() {
                start += 1;
                surface = rest;
            }
        }
        matches.push(Token {
            start,
            end: char_at[m.end()],
            surface: surface.to_string(),
            kind: TokenKind::Cjk,
        });
    }

    matches.sort_by_key(|t| (t.start, t.end));

    let mut tokens = Vec::with_capacity(matches.len());
    let mut last_end = 0;
    for token in matches {
        if tokens.is_empty() || token.start >= last_end {
            last_end = token.end;
            tokens.push(token);
        }
    }
    tokens
}
