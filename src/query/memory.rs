use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::query::{Query, QueryEngine, QueryError, RowCursor};
use crate::value::Value;

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessRecord {
    pub pid: i64,
    #[serde(default)]
    pub ppid: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

/// One row of the thread table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ThreadRecord {
    pub tid: i64,
    #[serde(default)]
    pub tgid: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Already-materialized trace tables answering the exporter's queries.
///
/// Raw events are stored as their rendered ftrace text, in row-id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TraceTables {
    #[serde(default)]
    pub processes: Vec<ProcessRecord>,
    #[serde(default)]
    pub threads: Vec<ThreadRecord>,
    #[serde(default)]
    pub raw_events: Vec<String>,
}

impl TraceTables {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            processes: Vec::new(),
            threads: Vec::new(),
            raw_events: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_raw_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raw_events = events.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_process(mut self, pid: i64, ppid: i64, name: Option<&str>) -> Self {
        self.processes.push(ProcessRecord {
            pid,
            ppid: Some(ppid),
            name: name.map(str::to_owned),
        });
        self
    }

    #[must_use]
    pub fn with_thread(mut self, tid: i64, tgid: Option<i64>, name: Option<&str>) -> Self {
        self.threads.push(ThreadRecord {
            tid,
            tgid,
            name: name.map(str::to_owned),
        });
        self
    }

    /// Parses a JSON snapshot of the tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader fails or the JSON does not describe the tables.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Opens and parses a JSON snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsed.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_json_reader(BufReader::new(file)).map_err(|err| match err {
            Error::InvalidInput { details } => Error::InvalidInput {
                details: Cow::Owned(format!("{}: {details}", path.display())),
            },
            other => other,
        })
    }
}

enum Source {
    Processes,
    Threads,
    Count,
    RawEvents,
}

/// Cursor over one query against [`TraceTables`].
pub struct TablesCursor<'a> {
    tables: &'a TraceTables,
    source: Source,
    position: usize,
    end: usize,
    row: Vec<Value<'a>>,
}

impl<'a> TablesCursor<'a> {
    fn new(tables: &'a TraceTables, query: &Query) -> Self {
        let (source, position, end) = match query {
            Query::Processes => (Source::Processes, 0, tables.processes.len()),
            Query::Threads => (Source::Threads, 0, tables.threads.len()),
            Query::CountRawEvents => (Source::Count, 0, 1),
            Query::RawEvents(window) => {
                let (start, end) = window.bounds(tables.raw_events.len() as u64);
                (
                    Source::RawEvents,
                    usize::try_from(start).unwrap_or(usize::MAX),
                    usize::try_from(end).unwrap_or(usize::MAX),
                )
            }
        };
        Self {
            tables,
            source,
            position,
            end,
            row: Vec::with_capacity(3),
        }
    }

    fn fill_row(&mut self, index: usize) {
        self.row.clear();
        let tables = self.tables;
        match self.source {
            Source::Processes => {
                let process = &tables.processes[index];
                self.row.push(Value::Int64(process.pid));
                self.row.push(Value::Int64(process.ppid.unwrap_or(0)));
                self.row.push(process.name.as_deref().into());
            }
            Source::Threads => {
                let thread = &tables.threads[index];
                self.row.push(Value::Int64(thread.tid));
                self.row.push(Value::Int64(thread.tgid.unwrap_or(0)));
                self.row.push(thread.name.as_deref().into());
            }
            Source::Count => {
                let count = i64::try_from(tables.raw_events.len()).unwrap_or(i64::MAX);
                self.row.push(Value::Int64(count));
            }
            Source::RawEvents => {
                self.row.push(Value::text(&tables.raw_events[index]));
            }
        }
    }
}

impl RowCursor for TablesCursor<'_> {
    fn next_row(&mut self) -> Option<&[Value<'_>]> {
        if self.position >= self.end {
            return None;
        }
        let index = self.position;
        self.position += 1;
        self.fill_row(index);
        Some(&self.row)
    }

    fn status(&self) -> std::result::Result<(), QueryError> {
        Ok(())
    }
}

impl QueryEngine for TraceTables {
    type Rows<'a>
        = TablesCursor<'a>
    where
        Self: 'a;

    fn execute(&self, query: &Query) -> Self::Rows<'_> {
        TablesCursor::new(self, query)
    }
}
