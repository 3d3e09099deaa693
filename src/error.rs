use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("token lookup collision")]
    TokenLookupCollision,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid token format")]
    InvalidTokenFormat,

    #[error("token expired")]
    TokenExpired,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("insufficient stock: requested {requested}, remaining {remaining}")]
    InsufficientStock { requested: i64, remaining: i64 },

    #[error("no free ticket number found after {attempts} draws")]
    AssignmentExhausted { attempts: u32 },

    #[error("amount mismatch: order total {expected}, provider reported {reported} minor units")]
    AmountMismatch { expected: Decimal, reported: i64 },

    #[error("missing webhook fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("webhook signature invalid")]
    SignatureInvalid,

    #[error("rate limit exceeded")]
    RateLimited,
}

impl Error {
    /// Whether repeating the same call can succeed without outside intervention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Io(_) | Error::AssignmentExhausted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
