use std::collections::HashMap;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::io::AsyncWrite;
use uuid::Uuid;

use crate::errors::{ExportError, ExportResult};
use crate::export::config::{resolve_settings, FormatSettings};
use crate::export::engine::StreamingExportEngine;
use crate::export::fetcher::ChunkFetcher;
use crate::export::fields::{resolve_fields, ResolvedField};
use crate::export::query::{build_query_options, QueryOptions};
use crate::export::response::{build_download_headers, DownloadHeaders};
use crate::export::types::ExportComplete;
use crate::export::writer::ChunkWriter;
use crate::export::writers::CsvChunkWriter;

/// Byte-oriented destination attached to the client response.
pub type ExportSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Builds the writer for one run once settings and projection are resolved.
pub type WriterFactory =
    Box<dyn Fn(&FormatSettings, Vec<ResolvedField>, ExportSink) -> Box<dyn ChunkWriter> + Send + Sync>;

struct FormatEntry {
    overrides: Value,
    factory: WriterFactory,
}

/// Everything a run produced: the response metadata computed before
/// streaming and the terminal state of the stream itself. The caller ends
/// the request/response cycle; nothing here keeps running.
#[derive(Debug)]
pub struct ExportRun {
    pub id: Uuid,
    pub format: String,
    pub headers: DownloadHeaders,
    pub options: QueryOptions,
    pub completion: ExportComplete,
}

/// Per-request export orchestration.
///
/// Formats are registered up front with their configuration overrides and a
/// writer factory; each `export` call resolves one immutable settings value
/// for itself, so concurrent runs share nothing mutable.
pub struct ExportService {
    shared_overrides: Value,
    formats: HashMap<String, FormatEntry>,
}

impl Default for ExportService {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportService {
    pub fn new() -> Self {
        Self {
            shared_overrides: json!({}),
            formats: HashMap::new(),
        }
    }

    /// Overrides applied to every format, between the built-in defaults and
    /// the format-specific layer.
    pub fn with_shared_overrides(mut self, overrides: Value) -> Self {
        self.shared_overrides = overrides;
        self
    }

    /// Register a format with its overrides and writer factory.
    pub fn register(mut self, format: &str, overrides: Value, factory: WriterFactory) -> Self {
        self.formats.insert(
            format.to_string(),
            FormatEntry { overrides, factory },
        );
        self
    }

    /// Register the built-in CSV writer under the `csv` format key.
    pub fn register_csv(self, overrides: Value) -> Self {
        self.register(
            "csv",
            overrides,
            Box::new(|settings, projection, sink| {
                Box::new(CsvChunkWriter::new(
                    sink,
                    settings.char_encoding,
                    projection,
                ))
            }),
        )
    }

    pub fn is_registered(&self, format: &str) -> bool {
        self.formats.contains_key(format)
    }

    /// Dispatcher entry point for extension-triggered exports: formats that
    /// are unregistered or not marked `auto` yield `UnsupportedFormat`,
    /// which the dispatcher treats as "fall through to normal handling".
    pub async fn export_auto<F, W>(
        &self,
        format: &str,
        primary_model: &str,
        fetcher: &F,
        caller_pagination: Option<&Value>,
        sink: W,
    ) -> ExportResult<ExportRun>
    where
        F: ChunkFetcher + ?Sized,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let entry = self
            .formats
            .get(format)
            .ok_or_else(|| ExportError::UnsupportedFormat(format.to_string()))?;
        let settings = resolve_settings(format, &self.shared_overrides, &entry.overrides)?;
        if !settings.auto {
            return Err(ExportError::UnsupportedFormat(format.to_string()));
        }
        self.run(format, primary_model, fetcher, caller_pagination, sink)
            .await
    }

    /// Manual entry point: exports regardless of the `auto` flag.
    pub async fn export<F, W>(
        &self,
        format: &str,
        primary_model: &str,
        fetcher: &F,
        caller_pagination: Option<&Value>,
        sink: W,
    ) -> ExportResult<ExportRun>
    where
        F: ChunkFetcher + ?Sized,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        if !self.is_registered(format) {
            return Err(ExportError::UnsupportedFormat(format.to_string()));
        }
        self.run(format, primary_model, fetcher, caller_pagination, sink)
            .await
    }

    async fn run<F, W>(
        &self,
        format: &str,
        primary_model: &str,
        fetcher: &F,
        caller_pagination: Option<&Value>,
        sink: W,
    ) -> ExportResult<ExportRun>
    where
        F: ChunkFetcher + ?Sized,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let entry = self
            .formats
            .get(format)
            .ok_or_else(|| ExportError::UnsupportedFormat(format.to_string()))?;

        // Everything that can fail by misconfiguration resolves here, before
        // a single header or body byte exists.
        let settings = resolve_settings(format, &self.shared_overrides, &entry.overrides)?;
        let projection = resolve_fields(primary_model, &settings.fields)?;
        let mut options =
            build_query_options(primary_model, &settings, &projection, caller_pagination)?;

        let writer = (entry.factory)(&settings, projection, Box::new(sink));
        let headers = build_download_headers(
            &settings.file_name_format,
            primary_model,
            &options.conditions,
            format,
            &writer.content_type(),
            settings.char_encoding,
            Utc::now(),
        )?;

        let run_id = Uuid::new_v4();
        log::info!(
            "export run {} started: format={} model={} file={}",
            run_id,
            format,
            primary_model,
            headers.file_name
        );

        let engine = StreamingExportEngine::new(settings.data_var_name.clone());
        let completion = engine.run(run_id, fetcher, writer, &mut options).await?;

        Ok(ExportRun {
            id: run_id,
            format: format.to_string(),
            headers,
            options,
            completion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fetcher::SqliteChunkFetcher;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    async fn seeded_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE email_signups (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL,
                confirmed INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        for (id, email, confirmed) in [
            (1, "a@example.com", 1),
            (2, "b@example.com", 0),
            (3, "c@example.com", 1),
            (4, "d@example.com", 1),
            (5, "e@example.com", 0),
        ] {
            sqlx::query("INSERT INTO email_signups (id, email, confirmed) VALUES (?, ?, ?)")
                .bind(id)
                .bind(email)
                .bind(confirmed)
                .execute(&pool)
                .await
                .unwrap();
        }
        pool
    }

    fn csv_service() -> ExportService {
        ExportService::new().register_csv(json!({
            "fields": [
                "email",
                {"field": "confirmed", "label": "Confirmed", "decorator": "yes_no"}
            ],
            "limit": 2,
            "char_encoding": "UTF-8",
            "find_options": {"order": ["id ASC"]}
        }))
    }

    #[tokio::test]
    async fn test_end_to_end_csv_export() {
        let fetcher = SqliteChunkFetcher::new(seeded_pool().await, "email_signups");
        let service = csv_service();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signups.csv");
        let file = tokio::fs::File::create(&path).await.unwrap();

        let run = service
            .export("csv", "EmailSignup", &fetcher, None, file)
            .await
            .unwrap();

        assert_eq!(run.completion.stats.pages_fetched, 4);
        assert_eq!(run.completion.stats.pages_rendered, 3);
        assert_eq!(run.completion.stats.rows_written, 5);
        assert!(run.headers.file_name.starts_with("email-signup-"));
        assert!(run.headers.file_name.ends_with(".csv"));
        assert_eq!(run.headers.content_type, "text/csv; charset=UTF-8");
        // cursor stops on the page whose fetch came back empty
        assert_eq!(run.options.page, 4);

        let body = std::fs::read(&path).unwrap();
        assert_eq!(&body[..3], &[0xEF, 0xBB, 0xBF]);
        let text = String::from_utf8(body[3..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "\"Email\"\t\"Confirmed\"");
        assert_eq!(lines[1], "\"a@example.com\"\t\"Yes\"");
        assert_eq!(lines[2], "\"b@example.com\"\t\"No\"");
        assert_eq!(lines[5], "\"e@example.com\"\t\"No\"");
        assert_eq!(run.completion.stats.bytes_written, body.len() as u64);
    }

    #[tokio::test]
    async fn test_empty_table_yields_header_only_body() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE email_signups (id INTEGER PRIMARY KEY, email TEXT, confirmed INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        let fetcher = SqliteChunkFetcher::new(pool, "email_signups");
        let service = csv_service();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        let file = tokio::fs::File::create(&path).await.unwrap();

        let run = service
            .export("csv", "EmailSignup", &fetcher, None, file)
            .await
            .unwrap();

        assert_eq!(run.completion.stats.pages_fetched, 1);
        assert_eq!(run.completion.stats.pages_rendered, 1);
        assert_eq!(run.completion.stats.rows_written, 0);

        let body = std::fs::read(&path).unwrap();
        let text = String::from_utf8(body[3..].to_vec()).unwrap();
        assert_eq!(text, "\"Email\"\t\"Confirmed\"\n");
    }

    #[tokio::test]
    async fn test_unknown_format_falls_through() {
        let fetcher = SqliteChunkFetcher::new(seeded_pool().await, "email_signups");
        let service = csv_service();
        let err = service
            .export("xlsx", "EmailSignup", &fetcher, None, Vec::<u8>::new())
            .await
            .unwrap_err();
        assert!(err.is_unsupported_format());
    }

    #[tokio::test]
    async fn test_auto_flag_gates_dispatcher_exports() {
        let fetcher = SqliteChunkFetcher::new(seeded_pool().await, "email_signups");

        let manual_only = csv_service();
        let err = manual_only
            .export_auto("csv", "EmailSignup", &fetcher, None, Vec::<u8>::new())
            .await
            .unwrap_err();
        assert!(err.is_unsupported_format());

        let auto = ExportService::new().register_csv(json!({
            "auto": true,
            "limit": 2,
            "char_encoding": "UTF-8",
            "find_options": {"order": ["id ASC"]}
        }));
        let run = auto
            .export_auto("csv", "EmailSignup", &fetcher, None, Vec::<u8>::new())
            .await
            .unwrap();
        assert_eq!(run.completion.stats.rows_written, 5);
    }

    #[tokio::test]
    async fn test_malformed_settings_fail_before_streaming() {
        let fetcher = SqliteChunkFetcher::new(seeded_pool().await, "email_signups");
        let service = ExportService::new().register_csv(json!({"chunk_size": 10}));
        // settings resolution fails before the writer is even constructed,
        // so no byte reaches the sink
        let err = service
            .export("csv", "EmailSignup", &fetcher, None, Vec::<u8>::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Config(_)));
    }
}
