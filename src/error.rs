use crate::semantic::SemanticError;
use crate::store::StoreError;

/// Failure conditions surfaced by notebook operations.
///
/// Each variant maps to a stable wire code returned by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum VocabError {
    #[error("missing required fields: {0}")]
    MissingFields(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid span [{start}, {end}) for text of length {len}")]
    BadRange { start: i64, end: i64, len: usize },

    #[error("semantic search unavailable: {0}")]
    SemanticUnavailable(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unknown cmd {0}")]
    UnknownCommand(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

impl VocabError {
    pub fn code(&self) -> &'static str {
        match self {
            VocabError::MissingFields(_) => "missing_fields",
            VocabError::NotFound(_) => "not_found",
            VocabError::BadRange { .. } => "bad_range",
            VocabError::SemanticUnavailable(_) => "semantic_unavailable",
            VocabError::BadRequest(_) => "bad_request",
            VocabError::UnknownCommand(_) => "unknown_cmd",
            VocabError::Store(_) | VocabError::Internal(_) => "exception",
        }
    }

    pub fn missing(fields: &[&str]) -> Self {
        VocabError::MissingFields(fields.join(", "))
    }

    pub fn entry_not_found(id: i64) -> Self {
        VocabError::NotFound(format!("entry {id}"))
    }

    pub fn record_not_found(id: i64) -> Self {
        VocabError::NotFound(format!("record {id}"))
    }
}

impl From<SemanticError> for VocabError {
    fn from(err: SemanticError) -> Self {
        match err {
            SemanticError::Store(err) => VocabError::Store(err),
            err if err.is_unavailable() => VocabError::SemanticUnavailable(err.to_string()),
            err => VocabError::Internal(err.to_string()),
        }
    }
}

pub type Result<T, E = VocabError> = std::result::Result<T, E>;
