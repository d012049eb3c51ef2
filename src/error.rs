//! Error types for the export engine.

use thiserror::Error;

/// Export error type.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The request never produced a response
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status other than 404
    #[error("API request failed: {status} ({url})")]
    Status { status: u16, url: String },

    /// The requested resource does not exist on the server
    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    /// A response body or embedded document could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A required dependency edge pointed at a resource that does not exist
    #[error("{from} requires {kind} {id}, which does not exist")]
    MissingDependency {
        from: String,
        kind: String,
        id: String,
    },

    /// No catalog definition exists for this kind
    #[error("Unknown resource kind: {0}")]
    UnknownKind(String),

    /// The embedded resource catalog is inconsistent
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Invalid client configuration (bad URL, missing key)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error while writing output
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The export was cancelled before it finished
    #[error("Export cancelled")]
    Cancelled,

    /// A deferred renderer failed
    #[error("Failed to render {file}: {message}")]
    Render { file: String, message: String },
}

impl ExportError {
    /// True for the not-found case, which some dependency edges tolerate
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;
