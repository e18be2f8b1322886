mod deflate;
mod plain;

use std::io::Write;

use crate::error::Result;

pub use deflate::{COMPRESSION_LEVEL, COMPRESSION_WINDOW_SIZE, DeflateSink};
pub use plain::PlainSink;

/// Whether the byte stream is compressed before reaching the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    /// Zlib-wrapped deflate at level 9.
    Deflate,
}

/// Byte-level destination of a conversion.
///
/// Bytes are appended in call order and never dropped; chunks may be any size.
pub enum OutputSink<W: Write> {
    Plain(PlainSink<W>),
    Deflate(DeflateSink<W>),
}

impl<W: Write> OutputSink<W> {
    #[must_use]
    pub fn new(output: W, compression: Compression) -> Self {
        match compression {
            Compression::None => Self::Plain(PlainSink::new(output)),
            Compression::Deflate => Self::Deflate(DeflateSink::new(output)),
        }
    }

    /// Appends `bytes` to the logical output stream.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the destination, or a fatal
    /// [`crate::Error::CompressionCorrupted`] from the compressor.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            Self::Plain(sink) => sink.write(bytes),
            Self::Deflate(sink) => sink.write(bytes),
        }
    }

    /// Completes the stream and hands back the destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the trailing bytes cannot be produced or written.
    pub fn finish(self) -> Result<W> {
        match self {
            Self::Plain(sink) => sink.finish(),
            Self::Deflate(sink) => sink.finish(),
        }
    }
}
