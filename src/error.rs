use thiserror::Error;

/// Errors raised inside the client.
///
/// None of these escape [`crate::UnsplashSearcher::search`] or
/// [`crate::UnsplashSearcher::track_download`]; they surface only from
/// constructors and from the lower-level building blocks.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Response has no '{field}' collection")]
    MissingResults { field: String },

    #[error("Request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<Error> },

    #[error("Unsplash API key not provided or found in environment")]
    MissingApiKey,

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfig { field: String, message: String },
}

impl Error {
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
