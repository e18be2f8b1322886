use std::io::Read;

use flate2::read::ZlibDecoder;
use systrace_export::query::TablesCursor;
use systrace_export::value::Value;
use systrace_export::{ConvertOptions, Query, QueryEngine, QueryError, RowCursor, TraceTables};

/// Wraps [`TraceTables`] and makes one query fail after a number of rows.
pub struct FailingEngine {
    pub tables: TraceTables,
    pub fails: fn(&Query) -> bool,
    pub after_rows: usize,
}

pub struct FailingCursor<'a> {
    inner: TablesCursor<'a>,
    remaining: Option<usize>,
    failed: bool,
}

impl RowCursor for FailingCursor<'_> {
    fn next_row(&mut self) -> Option<&[Value<'_>]> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                self.failed = true;
                return None;
            }
            *remaining -= 1;
        }
        self.inner.next_row()
    }

    fn status(&self) -> Result<(), QueryError> {
        if self.failed {
            return Err(QueryError::new("injected failure"));
        }
        self.inner.status()
    }
}

impl QueryEngine for FailingEngine {
    type Rows<'a>
        = FailingCursor<'a>
    where
        Self: 'a;

    fn execute(&self, query: &Query) -> Self::Rows<'_> {
        FailingCursor {
            inner: self.tables.execute(query),
            remaining: (self.fails)(query).then_some(self.after_rows),
            failed: false,
        }
    }
}

#[allow(dead_code)]
pub fn sample_tables() -> TraceTables {
    TraceTables::new()
        .with_process(1, 0, Some("init"))
        .with_process(612, 1, Some("surfaceflinger"))
        .with_process(900, 1, None)
        .with_thread(1, Some(1), Some("init"))
        .with_thread(612, Some(612), Some("surfaceflinger"))
        .with_thread(640, Some(612), Some("RenderEngine"))
        .with_thread(77, None, None)
        .with_raw_events([
            "          <idle>-0     (-----) [000] d..2  1234.000100: cpu_idle: state=1 cpu_id=0",
            "  surfaceflinger-612   (  612) [001] ...1  1234.000200: tracing_mark_write: B|612|onMessage",
            "  surfaceflinger-612   (  612) [001] ...1  1234.000300: tracing_mark_write: E|612",
            "    RenderEngine-640   (  612) [002] d..3  1234.000400: sched_switch: prev_comm=RenderEngine prev_pid=640 ==> next_comm=swapper/2 next_pid=0",
        ])
}

#[allow(dead_code)]
pub fn events(count: usize) -> TraceTables {
    TraceTables::new().with_raw_events((0..count).map(|i| format!("event {i}\twith \"quotes\"")))
}

#[allow(dead_code)]
pub fn render<E: QueryEngine>(engine: &E, options: &ConvertOptions) -> Vec<u8> {
    let mut out = Vec::new();
    systrace_export::convert(engine, &mut out, options).expect("conversion failed");
    out
}

#[allow(dead_code)]
pub fn inflate(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    ZlibDecoder::new(bytes)
        .read_to_end(&mut out)
        .expect("output is a complete zlib stream");
    out
}
