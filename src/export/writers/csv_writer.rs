use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::errors::{RenderError, RenderResult};
use crate::export::fields::{project_cell, render_value, ResolvedField};
use crate::export::types::TextEncoding;
use crate::export::writer::{ChunkBinding, ChunkWriter};
use crate::types::Row;

/// Streaming CSV writer.
///
/// On the first page it writes the encoding's byte-order marker followed by
/// the header-label row; every page after that is rows only. Fields are
/// always quoted, embedded quotes are doubled, fields are joined with tabs
/// and rows terminated with a newline. Each chunk is formatted into an
/// in-memory buffer, converted to the target encoding, and written out in
/// one call, so at most one chunk is ever resident.
pub struct CsvChunkWriter<W: AsyncWrite + Unpin + Send> {
    sink: W,
    encoding: TextEncoding,
    projection: Vec<ResolvedField>,
    bytes_written: u64,
}

impl<W: AsyncWrite + Unpin + Send> CsvChunkWriter<W> {
    pub fn new(sink: W, encoding: TextEncoding, projection: Vec<ResolvedField>) -> Self {
        Self {
            sink,
            encoding,
            projection,
            bytes_written: 0,
        }
    }

    fn format_chunk(&self, rows: &[Row], first_page: bool) -> RenderResult<String> {
        let mut formatter = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .quote(b'"')
            .quote_style(csv::QuoteStyle::Always)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        if first_page && !self.projection.is_empty() {
            let labels: Vec<&str> = self
                .projection
                .iter()
                .map(|field| field.label.as_str())
                .collect();
            formatter.write_record(&labels)?;
        }

        for row in rows {
            let record = self.project_row(row);
            formatter.write_record(&record)?;
        }

        let buffer = formatter
            .into_inner()
            .map_err(|e| RenderError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| RenderError::Encoding(e.to_string()))
    }

    fn project_row(&self, row: &Row) -> Vec<String> {
        if self.projection.is_empty() {
            // No configured projection: export the row's own columns in
            // their natural order.
            return row.values().map(render_value).collect();
        }
        self.projection
            .iter()
            .map(|field| {
                let cell = project_cell(row, field);
                let cell = match field.decorator {
                    Some(decorator) => decorator.apply(&cell),
                    None => cell,
                };
                render_value(&cell)
            })
            .collect()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ChunkWriter for CsvChunkWriter<W> {
    async fn write_chunk(&mut self, binding: ChunkBinding<'_>) -> RenderResult<()> {
        if binding.first_page {
            let bom = self.encoding.bom();
            self.sink.write_all(bom).await?;
            self.bytes_written += bom.len() as u64;
        }

        let text = self.format_chunk(binding.rows, binding.first_page)?;
        if !text.is_empty() {
            let encoded = self.encoding.encode(&text);
            self.sink.write_all(&encoded).await?;
            self.bytes_written += encoded.len() as u64;
        }
        Ok(())
    }

    async fn flush(&mut self) -> RenderResult<()> {
        self.sink.flush().await?;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> RenderResult<u64> {
        self.sink.flush().await?;
        Ok(self.bytes_written)
    }

    fn content_type(&self) -> mime::Mime {
        mime::TEXT_CSV
    }
}
