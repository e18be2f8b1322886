pub mod convert;
pub mod error;
pub mod format;
pub mod logger;
pub mod query;
pub mod sinks;
pub mod truncate;
pub mod value;
pub mod writer;
pub use crate::error::{Error, Result};
pub use convert::{ConvertOptions, ConvertSummary, convert};
pub use format::Framing;
pub use logger::ProgressStyle;
pub use query::{Query, QueryEngine, QueryError, RowCursor, TraceTables};
pub use sinks::{Compression, OutputSink};
pub use truncate::{Keep, TruncationPlan};

/// Converts a JSON table snapshot read from `input` into systrace text.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be parsed or the conversion fails.
pub fn convert_snapshot<R: std::io::Read, W: std::io::Write>(
    input: R,
    output: W,
    options: &ConvertOptions,
) -> Result<ConvertSummary> {
    let tables = TraceTables::from_json_reader(input)?;
    convert(&tables, output, options)
}
