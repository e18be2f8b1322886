//! Streams query results through a row formatter into a large rolling buffer.

use std::io::Write;

use crate::error::{Error, Result, Stage};
use crate::format::{Framing, LineBuffer, RowFormatter};
use crate::logger::{ProgressStyle, log_error, log_progress};
use crate::query::{Query, QueryEngine, RowCursor};
use crate::sinks::OutputSink;

/// Capacity of the rolling buffer used in production.
pub const ROLLING_BUFFER_CAPACITY: usize = 16 * 1024 * 1024;

/// Runs queries and forwards their formatted rows to an [`OutputSink`].
///
/// Formatted lines accumulate in a rolling buffer that is written to the
/// sink whenever the next line would not fit, so sink writes stay large and
/// memory stays bounded no matter how many rows a query returns.
pub struct QueryWriter {
    buffer: Vec<u8>,
    capacity: usize,
    line: LineBuffer,
    framing: Framing,
    progress: ProgressStyle,
    // Number of rolling buffer flushes that reached the sink.
    flushes: u64,
}

impl QueryWriter {
    #[must_use]
    pub fn new(framing: Framing, progress: ProgressStyle) -> Self {
        Self::with_capacity(ROLLING_BUFFER_CAPACITY, framing, progress)
    }

    /// Builds a writer with a custom rolling buffer capacity (at least one byte).
    #[must_use]
    pub fn with_capacity(capacity: usize, framing: Framing, progress: ProgressStyle) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
            line: LineBuffer::new(),
            framing,
            progress,
            flushes: 0,
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of times the rolling buffer has been written to a sink.
    #[must_use]
    pub const fn flushes(&self) -> u64 {
        self.flushes
    }

    /// Executes `query`, formats every row with `formatter` and writes the
    /// result to `sink`. Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] tagged with `stage` when the engine reports a
    /// failure, or any error raised by the sink.
    pub fn run<E, W>(
        &mut self,
        engine: &E,
        query: &Query,
        stage: Stage,
        formatter: RowFormatter,
        sink: &mut OutputSink<W>,
    ) -> Result<u64>
    where
        E: QueryEngine + ?Sized,
        W: Write,
    {
        let mut rows = engine.execute(query);
        let mut written: u64 = 0;
        while let Some(row) = rows.next_row() {
            self.line.clear();
            formatter(row, self.framing, &mut self.line);

            if self.capacity - self.buffer.len() < self.line.len() {
                if !self.buffer.is_empty() {
                    log_progress(format_args!("Writing row {written}"), self.progress);
                    self.flush(sink)?;
                }
                if self.line.len() > self.capacity {
                    sink.write(self.line.as_bytes())?;
                    written += 1;
                    continue;
                }
            }
            self.buffer.extend_from_slice(self.line.as_bytes());
            written += 1;
        }

        if let Err(err) = rows.status() {
            log_error(&format!("Error while writing systrace {}", err.message));
            return Err(Error::query(stage, err.message));
        }

        self.flush(sink)?;
        Ok(written)
    }

    fn flush<W: Write>(&mut self, sink: &mut OutputSink<W>) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.flushes += 1;
        sink.write(&self.buffer)?;
        self.buffer.clear();
        Ok(())
    }
}
