use thiserror::Error;

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Upstream answered with a non-success status.
    #[error("GitHub API error: {status} for {url}")]
    RemoteApi { status: u16, url: String },

    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse YAML at {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid metadata at {path}: {reason}")]
    InvalidMetadata { path: String, reason: String },

    #[error("no document numbered {number}")]
    NotFound { number: String },

    /// The last load pass of a collection failed.
    #[error("{track} collection unavailable: {message}")]
    Unavailable { track: String, message: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl CatalogError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            CatalogError::RemoteApi { status, .. } => Some(*status),
            _ => None,
        }
    }
}
