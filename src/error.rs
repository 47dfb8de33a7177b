use thiserror::Error;

/// Unified error type across all providers.
#[derive(Error, Debug)]
pub enum Error {
    /// Model alias not present in the registry.
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// Credential environment variable for the selected provider is unset.
    #[error("{var} environment variable is not set")]
    MissingCredential { var: &'static str },

    /// Non-success HTTP status. The body is kept verbatim.
    #[error("API call failed with status code {status}, error: {body}")]
    Api { status: u16, body: String },

    /// HTTP/network error.
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    /// Error object reported by the provider in place of a stream unit.
    #[error("provider error: {0}")]
    Vendor(String),

    /// Local file I/O.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// PDF context file could not be read.
    #[error("pdf: {0}")]
    Pdf(#[from] lopdf::Error),

    /// Page cache lookup.
    #[error("cache: {0}")]
    Cache(#[from] rusqlite::Error),

    /// Invalid configuration.
    #[error("config: {0}")]
    Config(String),

    /// The background stream worker stopped without reporting a result.
    #[error("stream worker stopped unexpectedly")]
    WorkerPanicked,
}

impl Error {
    /// Returns true for errors detected before any network I/O.
    #[inline]
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedModel(_) | Error::MissingCredential { .. } | Error::Config(_)
        )
    }

    /// Create an API error from status and body.
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            body: body.into(),
        }
    }

    /// Create a config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
