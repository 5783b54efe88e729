//! Text matching: tokenization, string similarity, the individual matching
//! strategies and the resolver cascade built from them.

pub mod exact;
pub mod fulltext;
pub mod fuzzy;
pub mod linking;
pub mod resolve;
pub mod similarity;
pub mod substring;
pub mod tokens;

pub use resolve::{ResolveContext, Resolution, Resolver};
pub use tokens::{extract_tokens, Token, TokenKind};
