use std::time::Instant;

use uuid::Uuid;

use crate::errors::ExportResult;
use crate::export::fetcher::ChunkFetcher;
use crate::export::query::QueryOptions;
use crate::export::types::{ExportComplete, ExportStats};
use crate::export::writer::{ChunkBinding, ChunkWriter};

/// Drives the fetch, render, flush loop for one run.
///
/// Memory held for row data is bounded by the chunk size: the writer gets
/// each chunk as soon as it is fetched and the sink is flushed before the
/// next page is requested. Nothing is pipelined; chunk N is fully flushed
/// before chunk N+1 is fetched, so a slow consumer backpressures the whole
/// loop.
///
/// The engine catches nothing: a fetch or render error aborts the stream
/// where it stands. Bytes already flushed stay with the client; there is no
/// retry and no rollback once streaming has begun.
pub struct StreamingExportEngine {
    data_var_name: String,
}

impl StreamingExportEngine {
    pub fn new(data_var_name: impl Into<String>) -> Self {
        Self {
            data_var_name: data_var_name.into(),
        }
    }

    /// Run the loop to exhaustion and return the terminal state.
    ///
    /// An empty first page still renders once, so an empty result set
    /// produces a header-only body instead of nothing. Afterwards the page
    /// cursor increments by exactly 1 per fetch until a fetch comes back
    /// empty.
    pub async fn run<F>(
        &self,
        run_id: Uuid,
        fetcher: &F,
        mut writer: Box<dyn ChunkWriter>,
        options: &mut QueryOptions,
    ) -> ExportResult<ExportComplete>
    where
        F: ChunkFetcher + ?Sized,
    {
        let started = Instant::now();
        let mut stats = ExportStats::default();

        loop {
            let chunk = fetcher.fetch_page(options).await?;
            stats.pages_fetched += 1;

            let first_page = options.page == 1;
            if !chunk.is_empty() || first_page {
                let binding = ChunkBinding {
                    var_name: &self.data_var_name,
                    rows: &chunk,
                    first_page,
                };
                writer.write_chunk(binding).await?;
                writer.flush().await?;
                stats.pages_rendered += 1;
                stats.rows_written += chunk.len() as u64;
            }

            if chunk.is_empty() {
                break;
            }
            options.page += 1;
        }

        stats.bytes_written = writer.finish().await?;
        stats.duration_ms = started.elapsed().as_millis() as u64;

        log::debug!(
            "export run {} finished: {} rows over {} pages, {} bytes",
            run_id,
            stats.rows_written,
            stats.pages_rendered,
            stats.bytes_written
        );

        Ok(ExportComplete { run_id, stats })
    }
}
