//! Boundary to the external query engine.
//!
//! Queries are never assembled from text: every query the exporter issues is a
//! [`Query`] value, and its SQL rendering is derived from typed parameters.

mod memory;

use std::borrow::Cow;
use std::fmt;

use crate::value::Value;

pub use memory::{ProcessRecord, TablesCursor, ThreadRecord, TraceTables};

/// Row window applied to the raw event table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawEventWindow {
    pub limit: Option<u64>,
    pub offset: u64,
}

impl RawEventWindow {
    /// Every row, unconstrained.
    pub const ALL: Self = Self {
        limit: None,
        offset: 0,
    };

    #[must_use]
    pub const fn new(limit: u64, offset: u64) -> Self {
        Self {
            limit: Some(limit),
            offset,
        }
    }

    /// Range of row positions selected out of `total` rows.
    #[must_use]
    pub fn bounds(&self, total: u64) -> (u64, u64) {
        let start = self.offset.min(total);
        let end = self
            .limit
            .map_or(total, |limit| start.saturating_add(limit).min(total));
        (start, end)
    }
}

/// The fixed set of queries the exporter runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// `(pid, ppid, name)` for every process.
    Processes,
    /// `(tid, tgid, name)` for every thread.
    Threads,
    /// Single row holding the raw event count.
    CountRawEvents,
    /// One pre-rendered ftrace line per raw event, in row-id order.
    RawEvents(RawEventWindow),
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processes => f.write_str("select pid, coalesce(ppid, 0) as ppid, name from process"),
            Self::Threads => f.write_str(
                "select tid, coalesce(upid, 0), thread.name from thread left join process using (upid)",
            ),
            Self::CountRawEvents => f.write_str("select count(1) from raw"),
            Self::RawEvents(window) => {
                f.write_str("select to_ftrace(id) from raw")?;
                match window.limit {
                    Some(limit) if window.offset > 0 => {
                        write!(f, " limit {limit} offset {}", window.offset)
                    }
                    Some(limit) => write!(f, " limit {limit}"),
                    None if window.offset > 0 => write!(f, " limit -1 offset {}", window.offset),
                    None => Ok(()),
                }
            }
        }
    }
}

/// Terminal failure status reported by the query engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct QueryError {
    pub message: Cow<'static, str>,
}

impl QueryError {
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Forward-only cursor over the rows of one executed query.
pub trait RowCursor {
    /// Advances to the next row. The returned cells are only valid until the
    /// next call.
    fn next_row(&mut self) -> Option<&[Value<'_>]>;

    /// Terminal status, meaningful once `next_row` has returned `None`.
    ///
    /// # Errors
    ///
    /// Returns the engine's failure when the query did not complete.
    fn status(&self) -> Result<(), QueryError>;
}

/// Anything able to answer the exporter's queries.
pub trait QueryEngine {
    type Rows<'a>: RowCursor
    where
        Self: 'a;

    fn execute(&self, query: &Query) -> Self::Rows<'_>;
}
