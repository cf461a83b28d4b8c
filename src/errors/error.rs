use thiserror::Error;

/// Configuration errors.
///
/// All of these surface while a run is being set up, before any header or
/// body byte has been produced, so the caller can still send a normal error
/// response.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Malformed settings for format '{format}': {message}")]
    MalformedSettings { format: String, message: String },

    #[error("Malformed field entry: {0}")]
    MalformedField(String),

    #[error("Invalid query options: {0}")]
    InvalidOptions(String),

    #[error("Unknown placeholder '%{0}%' in file name template")]
    UnknownPlaceholder(String),
}

/// Data-source errors raised while fetching a page of rows.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Row decode error: {0}")]
    Decode(String),

    #[error("Query error: {0}")]
    Query(String),
}

/// Formatting and sink errors raised while rendering a chunk.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV formatting error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Top-level export errors.
///
/// `UnsupportedFormat` is a "nothing to do" signal: the dispatcher treats it
/// as fall-through to normal request handling, not as a failure. Fetch and
/// render errors that occur after the first flush abort the stream mid-flight;
/// the bytes already sent stay with the client.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No export handler registered for format '{0}'")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}

impl ExportError {
    /// True when the error is the dispatcher's fall-through signal rather
    /// than a real failure.
    pub fn is_unsupported_format(&self) -> bool {
        matches!(self, ExportError::UnsupportedFormat(_))
    }
}
