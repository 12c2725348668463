//! Error types for the extraction boundary

/// Result type alias for extraction operations
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Errors that can occur while extracting media metadata
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The extraction collaborator failed or returned unusable data
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// A locator assumed to be a single item turned out to be a collection
    /// (or the reverse); carries the corrected locator when one is known so
    /// the caller can retry resolution once with the right interpretation
    #[error("locator points at the wrong kind of media (corrected: {corrected:?})")]
    WrongKind { corrected: Option<String> },

    /// The extractor subprocess exited with a failure status
    #[error("{binary} exited with {status}: {stderr}")]
    ProcessFailed {
        binary: String,
        status: String,
        stderr: String,
    },

    /// The extractor produced JSON we could not map onto a descriptor
    #[error("unreadable descriptor: {0}")]
    InvalidDescriptor(#[from] serde_json::Error),

    /// The resolved content is not playable media (e.g. an HTML page)
    #[error("unsupported content type: {0}")]
    UnsupportedContent(String),

    /// IO error while talking to the extractor subprocess
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// Create a generic extraction error from a message
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    /// Create a wrong-kind error carrying a corrected locator
    pub fn wrong_kind(corrected: Option<String>) -> Self {
        Self::WrongKind { corrected }
    }

    /// Create an unsupported-content error
    pub fn unsupported_content(content_type: impl Into<String>) -> Self {
        Self::UnsupportedContent(content_type.into())
    }
}
