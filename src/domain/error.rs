// ============================================================
// Layer 3 — Parser Error Types
// ============================================================
// The library layers (domain, data, ml) return ParserError.
// The application and CLI layers wrap it in anyhow with
// extra context, the same way they wrap std::io errors.
//
// Taxonomy:
//   Config  — the requested operation cannot run with the
//             inputs it was given (missing targets, missing
//             sentence lengths, unsupported encoder type)
//   Data    — corpus content is inconsistent
//   Shape   — tensor shapes or tensor data do not line up
//   Io/Json — filesystem and serialisation failures

use thiserror::Error;

/// Result alias used by the library layers.
pub type Result<T> = std::result::Result<T, ParserError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ParserError {
    /// The caller asked for something the configuration cannot satisfy.
    #[error("configuration error: {0}")]
    Config(String),

    /// Corpus rows are malformed or inconsistent.
    #[error("data error: {0}")]
    Data(String),

    /// Tensor shapes or contents do not match the expected layout.
    #[error("shape error: {0}")]
    Shape(String),

    /// Model weights could not be recorded or restored.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ParserError {
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    #[must_use]
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    #[must_use]
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    #[must_use]
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }

    /// True for the error class that must never be silently skipped.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
