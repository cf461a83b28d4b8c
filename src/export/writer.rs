use async_trait::async_trait;

use crate::errors::RenderResult;
use crate::types::Row;

/// One chunk handed to a writer, bound under the run's configured variable
/// name. This is the boundary where a template engine or a pure formatting
/// writer plugs in.
pub struct ChunkBinding<'a> {
    pub var_name: &'a str,
    pub rows: &'a [Row],
    pub first_page: bool,
}

/// Streaming chunk writer. Implementations must not buffer rows beyond the
/// current chunk; the engine flushes the sink after every chunk it renders.
#[async_trait]
pub trait ChunkWriter: Send {
    /// Render one chunk. `first_page` is true exactly once per run; the
    /// writer emits any preamble (byte-order marker, header labels) there
    /// and nowhere else.
    async fn write_chunk(&mut self, binding: ChunkBinding<'_>) -> RenderResult<()>;

    /// Flush buffered bytes through to the sink.
    async fn flush(&mut self) -> RenderResult<()>;

    /// Final flush; returns the total number of bytes written.
    async fn finish(self: Box<Self>) -> RenderResult<u64>;

    /// Media type of the produced body.
    fn content_type(&self) -> mime::Mime;
}
