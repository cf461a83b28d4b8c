pub mod config;
pub mod engine;
pub mod fetcher;
pub mod fields;
pub mod query;
pub mod response;
pub mod service;
pub mod types;
pub mod writer;
pub mod writers;

pub use config::{merge_values, resolve_settings, FindOptions, FormatSettings};
pub use engine::StreamingExportEngine;
pub use fetcher::{ChunkFetcher, SqliteChunkFetcher};
pub use fields::{resolve_fields, Decorator, FieldEntry, ResolvedField};
pub use query::{build_query_options, QueryOptions, RECOGNIZED_OPTION_KEYS};
pub use response::{build_download_headers, build_file_name, DownloadHeaders};
pub use service::{ExportRun, ExportService, ExportSink, WriterFactory};
pub use types::{ExportComplete, ExportStats, TextEncoding};
pub use writer::{ChunkBinding, ChunkWriter};
pub use writers::CsvChunkWriter;
