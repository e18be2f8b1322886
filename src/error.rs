use std::borrow::Cow;
use std::fmt;
use std::io;

/// Result type used across the systrace exporter.
pub type Result<T> = std::result::Result<T, Error>;

/// High-level error type surfaced by the exporter.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O failure while writing to the output stream.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The query engine reported a failure status while a section was running.
    #[error("query failed while writing {stage}: {message}")]
    Query { stage: Stage, message: Cow<'static, str> },

    /// The compressor returned a status the sink cannot continue from.
    ///
    /// This is never recoverable: the compressed bytes produced so far cannot
    /// be trusted, so callers must not retry or resume the conversion.
    #[error("expected {expected} got {observed}: {message}")]
    CompressionCorrupted {
        expected: CompressionStatus,
        observed: CompressionStatus,
        message: Cow<'static, str>,
    },

    /// Input snapshot or option values could not be interpreted.
    #[error("invalid input: {details}")]
    InvalidInput { details: Cow<'static, str> },
}

impl Error {
    /// Returns true when the error signals corrupted compression state.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::CompressionCorrupted { .. })
    }

    pub(crate) fn query(stage: Stage, message: impl Into<Cow<'static, str>>) -> Self {
        Self::Query {
            stage,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput {
            details: Cow::Owned(err.to_string()),
        }
    }
}

/// Conversion stage used for diagnostic reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ProcessDump,
    ThreadDump,
    EventCount,
    RawEvents,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProcessDump => write!(f, "process dump"),
            Self::ThreadDump => write!(f, "thread dump"),
            Self::EventCount => write!(f, "raw event count"),
            Self::RawEvents => write!(f, "raw events"),
        }
    }
}

/// Status codes reported by the compression primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionStatus {
    Ok,
    StreamEnd,
    BufError,
    StreamError,
}

impl fmt::Display for CompressionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "Z_OK"),
            Self::StreamEnd => write!(f, "Z_STREAM_END"),
            Self::BufError => write!(f, "Z_BUF_ERROR"),
            Self::StreamError => write!(f, "Z_STREAM_ERROR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_compression_errors_are_fatal() {
        let corrupted = Error::CompressionCorrupted {
            expected: CompressionStatus::Ok,
            observed: CompressionStatus::BufError,
            message: Cow::from("no progress possible"),
        };
        assert!(corrupted.is_fatal());
        assert!(!Error::query(Stage::RawEvents, "boom").is_fatal());
        assert!(!Error::Io(io::Error::other("disk full")).is_fatal());
    }

    #[test]
    fn messages_name_stage_and_codes() {
        let err = Error::query(Stage::ThreadDump, "no such table: thread");
        assert_eq!(
            err.to_string(),
            "query failed while writing thread dump: no such table: thread"
        );
        let corrupted = Error::CompressionCorrupted {
            expected: CompressionStatus::StreamEnd,
            observed: CompressionStatus::StreamError,
            message: Cow::from("stream error"),
        };
        assert_eq!(
            corrupted.to_string(),
            "expected Z_STREAM_END got Z_STREAM_ERROR: stream error"
        );
    }
}
