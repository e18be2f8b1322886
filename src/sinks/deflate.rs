use std::borrow::Cow;
use std::io::Write;

use flate2::{Compress, CompressError, Compression as Level, FlushCompress, Status};

use crate::error::{CompressionStatus, Error, Result};
use crate::logger::log_error;

/// Size of the window compressed bytes are staged in before reaching the destination.
pub const COMPRESSION_WINDOW_SIZE: usize = 512 * 1024;
pub const COMPRESSION_LEVEL: u32 = 9;

/// Compresses everything written to it into a single zlib stream.
///
/// Compressed output is staged in a fixed window that is drained to the
/// destination each time it fills up. The stream is completed by
/// [`DeflateSink::finish`]; dropping an unfinished sink completes it as well.
/// Once the compressor reports an unexpected status the sink is poisoned and
/// never runs the compressor again.
pub struct DeflateSink<W: Write> {
    output: Option<W>,
    stream: Compress,
    window: Box<[u8]>,
    // End of the compressed bytes currently staged in `window`.
    filled: usize,
    finished: bool,
    poisoned: bool,
}

impl<W: Write> DeflateSink<W> {
    #[must_use]
    pub fn new(output: W) -> Self {
        Self {
            output: Some(output),
            stream: Compress::new(Level::new(COMPRESSION_LEVEL), true),
            window: vec![0u8; COMPRESSION_WINDOW_SIZE].into_boxed_slice(),
            filled: 0,
            finished: false,
            poisoned: false,
        }
    }

    /// Feeds `bytes` through the compressor.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when draining the window fails, or
    /// [`Error::CompressionCorrupted`] on any unexpected compressor status.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.finished {
            return Err(Error::InvalidInput {
                details: Cow::from("write after the compressed stream was finished"),
            });
        }
        self.ensure_healthy()?;
        let mut input = bytes;
        while !input.is_empty() {
            let (status, consumed, produced) = self.step(input, FlushCompress::None)?;
            check_status(status, CompressionStatus::Ok).map_err(|err| self.poison(err))?;
            if consumed == 0 && produced == 0 && self.filled < self.window.len() {
                return Err(self.poison(corrupted(
                    CompressionStatus::Ok,
                    CompressionStatus::BufError,
                    "compressor made no progress",
                )));
            }
            input = &input[consumed..];
            if self.filled == self.window.len() {
                self.drain()?;
            }
        }
        Ok(())
    }

    /// Completes the compressed stream and returns the destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the trailing compressed bytes cannot be produced
    /// or written, or [`Error::CompressionCorrupted`] if the sink is poisoned.
    pub fn finish(mut self) -> Result<W> {
        self.ensure_healthy()?;
        self.finish_stream()?;
        let mut output = self.output.take().ok_or_else(|| Error::InvalidInput {
            details: Cow::from("deflate sink output already taken"),
        })?;
        output.flush()?;
        Ok(output)
    }

    fn finish_stream(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        loop {
            let (status, _, _) = self.step(&[], FlushCompress::Finish)?;
            if !matches!(status, CompressionStatus::StreamEnd | CompressionStatus::Ok) {
                return Err(self.poison(corrupted(
                    CompressionStatus::StreamEnd,
                    status,
                    "finish failed",
                )));
            }
            self.drain()?;
            if status == CompressionStatus::StreamEnd {
                break;
            }
        }
        self.finished = true;
        Ok(())
    }

    /// Runs the compressor once into the free part of the window.
    fn step(
        &mut self,
        input: &[u8],
        flush: FlushCompress,
    ) -> Result<(CompressionStatus, usize, usize)> {
        let before_in = self.stream.total_in();
        let before_out = self.stream.total_out();
        let result = self
            .stream
            .compress(input, &mut self.window[self.filled..], flush);
        let status = map_status(result).map_err(|err| self.poison(err))?;
        let consumed = usize::try_from(self.stream.total_in() - before_in).unwrap_or(input.len());
        let produced = usize::try_from(self.stream.total_out() - before_out).unwrap_or(0);
        self.filled += produced;
        Ok((status, consumed, produced))
    }

    fn poison(&mut self, err: Error) -> Error {
        if err.is_fatal() {
            self.poisoned = true;
        }
        err
    }

    fn ensure_healthy(&self) -> Result<()> {
        if self.poisoned {
            return Err(corrupted(
                CompressionStatus::Ok,
                CompressionStatus::StreamError,
                "compressed stream is corrupted",
            ));
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        if self.filled == 0 {
            return Ok(());
        }
        if let Some(output) = self.output.as_mut() {
            output.write_all(&self.window[..self.filled])?;
        }
        self.filled = 0;
        Ok(())
    }
}

impl<W: Write> Drop for DeflateSink<W> {
    fn drop(&mut self) {
        if self.finished || self.poisoned || self.output.is_none() {
            return;
        }
        match self.finish_stream() {
            Ok(()) => {
                if let Some(output) = self.output.as_mut() {
                    let _ = output.flush();
                }
            }
            Err(err) if err.is_fatal() => {
                log_error(&format!("fatal compression failure: {err}"));
                std::process::abort();
            }
            Err(err) => log_error(&format!("failed to finish compressed stream: {err}")),
        }
    }
}

fn map_status(result: std::result::Result<Status, CompressError>) -> Result<CompressionStatus> {
    match result {
        Ok(Status::Ok) => Ok(CompressionStatus::Ok),
        Ok(Status::StreamEnd) => Ok(CompressionStatus::StreamEnd),
        Ok(Status::BufError) => Ok(CompressionStatus::BufError),
        Err(err) => Err(corrupted(
            CompressionStatus::Ok,
            CompressionStatus::StreamError,
            err.to_string(),
        )),
    }
}

fn check_status(observed: CompressionStatus, expected: CompressionStatus) -> Result<()> {
    if observed == expected {
        return Ok(());
    }
    Err(corrupted(expected, observed, "unexpected compressor status"))
}

fn corrupted(
    expected: CompressionStatus,
    observed: CompressionStatus,
    message: impl Into<Cow<'static, str>>,
) -> Error {
    Error::CompressionCorrupted {
        expected,
        observed,
        message: message.into(),
    }
}
