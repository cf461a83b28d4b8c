//! Streaming tabular exports.
//!
//! Turns large relational result sets into downloadable files without
//! holding more than one chunk of rows in memory: a paged fetcher produces
//! bounded chunks, a format writer renders each chunk straight into the
//! response sink, and the sink is flushed before the next page is fetched.
//!
//! The pieces plug together through [`export::ExportService`]: register a
//! format with its settings overrides, hand it a [`export::ChunkFetcher`]
//! and an output sink, and it resolves configuration, computes the download
//! headers, and drives the loop to exhaustion.

pub mod errors;
pub mod export;
pub mod types;

pub use errors::{ConfigError, ExportError, FetchError, RenderError};
pub use export::{
    ChunkFetcher, CsvChunkWriter, DownloadHeaders, ExportComplete, ExportRun, ExportService,
    ExportStats, FormatSettings, QueryOptions, SqliteChunkFetcher, StreamingExportEngine,
    TextEncoding,
};
pub use types::{Chunk, Row};
