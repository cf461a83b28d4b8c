mod error;

pub use error::{ConfigError, ExportError, FetchError, RenderError};

/// Result type for configuration resolution
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for page fetches
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type for chunk rendering
pub type RenderResult<T> = Result<T, RenderError>;

/// Result type for whole export runs
pub type ExportResult<T> = Result<T, ExportError>;
