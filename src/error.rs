//! Error types for the booru-dl library.

use thiserror::Error;

/// Errors that can occur during task and download operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A batch was requested from an empty selection.
    #[error("no posts selected")]
    NoPostsSelected,

    /// A batch was requested over an empty listing or search.
    #[error("no posts to download")]
    NoPostsToDownload,

    /// The remote catalog answered with something unusable.
    #[error("Remote catalog error: {0}")]
    Remote(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The item carries no remote locator to download from.
    #[error("Post {id} has no file URL")]
    MissingLocator {
        /// Identifier of the item.
        id: u64,
    },

    /// The operation observed a cancellation request.
    #[error("Download cancelled")]
    Cancelled,

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted record could not be parsed.
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// A record could not be serialized for persistence.
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// A remote JSON payload could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A specialized `Result` type for booru-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
