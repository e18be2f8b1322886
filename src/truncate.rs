//! Decides which raw events fit in the output byte budget.

use crate::error::{Error, Result, Stage};
use crate::logger::log_error;
use crate::query::{Query, QueryEngine, RawEventWindow, RowCursor};
use crate::value::cell;

/// Bytes the raw event section may occupy, leaving room for the dumps.
pub const EVENT_BYTE_BUDGET: u64 = 140 * 1024 * 1024;
/// Observed average size of one rendered ftrace line.
pub const AVG_EVENT_SIZE: u64 = 130;
/// Number of raw events that fit in [`EVENT_BYTE_BUDGET`].
pub const MAX_EVENTS: u64 = EVENT_BYTE_BUDGET / AVG_EVENT_SIZE;

/// Which part of an oversized trace survives truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Keep {
    /// Emit every event.
    #[default]
    All,
    /// Emit at most the first [`MAX_EVENTS`] events.
    Start,
    /// Emit the last [`MAX_EVENTS`] events when the trace exceeds the budget.
    End,
}

/// The once-computed decision about which raw events to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncationPlan {
    pub keep: Keep,
    pub max_events: u64,
    pub total_events: u64,
}

impl TruncationPlan {
    #[must_use]
    pub const fn new(keep: Keep, total_events: u64) -> Self {
        Self::with_max_events(keep, total_events, MAX_EVENTS)
    }

    #[must_use]
    pub const fn with_max_events(keep: Keep, total_events: u64, max_events: u64) -> Self {
        Self {
            keep,
            max_events,
            total_events,
        }
    }

    /// Counts the raw events through `engine` and builds the plan.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] if the count query fails.
    pub fn compute<E: QueryEngine + ?Sized>(engine: &E, keep: Keep) -> Result<Self> {
        Ok(Self::new(keep, count_raw_events(engine)?))
    }

    /// Row window the raw event query is restricted to.
    #[must_use]
    pub const fn window(&self) -> RawEventWindow {
        match self.keep {
            Keep::End if self.total_events > self.max_events => RawEventWindow::new(
                self.max_events,
                self.total_events.saturating_sub(self.max_events),
            ),
            Keep::Start => RawEventWindow::new(self.max_events, 0),
            Keep::All | Keep::End => RawEventWindow::ALL,
        }
    }

    /// The single raw event query this plan selects.
    #[must_use]
    pub const fn query(&self) -> Query {
        Query::RawEvents(self.window())
    }

    /// Number of events the selected query will produce.
    #[must_use]
    pub fn emitted_events(&self) -> u64 {
        let (start, end) = self.window().bounds(self.total_events);
        end - start
    }
}

fn count_raw_events<E: QueryEngine + ?Sized>(engine: &E) -> Result<u64> {
    let mut rows = engine.execute(&Query::CountRawEvents);
    let mut count = 0;
    while let Some(row) = rows.next_row() {
        count = u64::try_from(cell(row, 0).as_i64()).unwrap_or(0);
    }
    if let Err(err) = rows.status() {
        log_error(&format!("Error while writing systrace {}", err.message));
        return Err(Error::query(Stage::EventCount, err.message));
    }
    Ok(count)
}
