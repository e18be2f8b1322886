//! Assembles the systrace document out of literal fragments and query sections.

use std::io::Write;

use crate::error::{Result, Stage};
use crate::format::{Framing, format_process, format_raw_event, format_thread};
use crate::logger::{ProgressStyle, log_progress};
use crate::query::{Query, QueryEngine};
use crate::sinks::{Compression, OutputSink};
use crate::truncate::{Keep, TruncationPlan};
use crate::writer::{QueryWriter, ROLLING_BUFFER_CAPACITY};

// An empty traceEvents array is required for the trace viewer to load the document.
const TRACE_HEADER: &str = "{\n  \"traceEvents\": [],\n";

const TRACE_FOOTER: &str = "\\n\",\n  \"controllerTraceDataKey\": \"systraceController\"\n}";

const PROCESS_DUMP_HEADER: &str = "\"androidProcessDump\": \
    \"PROCESS DUMP\\nUSER           PID  PPID     VSZ    RSS WCHAN  \
    PC S NAME                        COMM                       \\n";

const THREAD_DUMP_HEADER: &str = "USER           PID   TID CMD \\n";

const PROCESS_DUMP_END: &str = "\",";

const SYSTEM_TRACE_EVENTS: &str = "  \"systemTraceEvents\": \"";

const PLAIN_BANNER: &str = "TRACE:\n";

const FTRACE_HEADER: &str = "# tracer: nop\n\
    #\n\
    # entries-in-buffer/entries-written: 30624/30624   #P:4\n\
    #\n\
    #                                      _-----=> irqs-off\n\
    #                                     / _----=> need-resched\n\
    #                                    | / _---=> hardirq/softirq\n\
    #                                    || / _--=> preempt-depth\n\
    #                                    ||| /     delay\n\
    #           TASK-PID    TGID   CPU#  ||||    TIMESTAMP  FUNCTION\n\
    #              | |        |      |   ||||       |         |\n";

const FTRACE_JSON_HEADER: &str = "# tracer: nop\\n\
    #\\n\
    # entries-in-buffer/entries-written: 30624/30624   #P:4\\n\
    #\\n\
    #                                      _-----=> irqs-off\\n\
    #                                     / _----=> need-resched\\n\
    #                                    | / _---=> hardirq/softirq\\n\
    #                                    || / _--=> preempt-depth\\n\
    #                                    ||| /     delay\\n\
    #           TASK-PID    TGID   CPU#  ||||    TIMESTAMP  FUNCTION\\n\
    #              | |        |      |   ||||       |         |\\n";

/// Configures framing, compression and truncation of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    framing: Framing,
    compression: Compression,
    keep: Keep,
    progress: ProgressStyle,
    buffer_capacity: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvertOptions {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            framing: Framing::Plain,
            compression: Compression::None,
            keep: Keep::All,
            progress: ProgressStyle::Overwrite,
            buffer_capacity: ROLLING_BUFFER_CAPACITY,
        }
    }

    #[must_use]
    pub const fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    #[must_use]
    pub const fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    #[must_use]
    pub const fn with_keep(mut self, keep: Keep) -> Self {
        self.keep = keep;
        self
    }

    #[must_use]
    pub const fn with_progress(mut self, progress: ProgressStyle) -> Self {
        self.progress = progress;
        self
    }

    /// Overrides the rolling buffer capacity; values below one byte are raised to one.
    #[must_use]
    pub const fn with_buffer_capacity(mut self, bytes: usize) -> Self {
        self.buffer_capacity = bytes;
        self
    }

    #[must_use]
    pub const fn framing(&self) -> Framing {
        self.framing
    }

    #[must_use]
    pub const fn compression(&self) -> Compression {
        self.compression
    }

    #[must_use]
    pub const fn keep(&self) -> Keep {
        self.keep
    }
}

/// Counts reported after a successful conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertSummary {
    pub processes: u64,
    pub threads: u64,
    pub plan: TruncationPlan,
    pub events: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    ProcessDump,
    ThreadDump,
    Plan,
    RawEvents(TruncationPlan),
    Finish,
}

/// Converts the tables behind `engine` into systrace text written to `output`.
///
/// Sections are emitted strictly in order: header, process dump, thread dump
/// (JSON framing only), raw events, footer. The first failing query stops the
/// conversion; bytes already written stay in `output`.
///
/// # Errors
///
/// Returns [`crate::Error::Query`] naming the failing stage, an I/O error from
/// `output`, or a fatal [`crate::Error::CompressionCorrupted`].
pub fn convert<E, W>(engine: &E, output: W, options: &ConvertOptions) -> Result<ConvertSummary>
where
    E: QueryEngine + ?Sized,
    W: Write,
{
    let json = options.framing == Framing::Json;
    let mut sink = OutputSink::new(output, options.compression);
    let mut writer = QueryWriter::with_capacity(options.buffer_capacity, options.framing, options.progress);

    let mut processes = 0;
    let mut threads = 0;
    let mut plan = None;
    let mut events = 0;

    let mut phase = Phase::Start;
    loop {
        phase = match phase {
            Phase::Start if json => {
                sink.write(TRACE_HEADER.as_bytes())?;
                sink.write(PROCESS_DUMP_HEADER.as_bytes())?;
                Phase::ProcessDump
            }
            Phase::Start => {
                sink.write(PLAIN_BANNER.as_bytes())?;
                sink.write(FTRACE_HEADER.as_bytes())?;
                Phase::Plan
            }
            Phase::ProcessDump => {
                processes = writer.run(
                    engine,
                    &Query::Processes,
                    Stage::ProcessDump,
                    format_process,
                    &mut sink,
                )?;
                sink.write(THREAD_DUMP_HEADER.as_bytes())?;
                Phase::ThreadDump
            }
            Phase::ThreadDump => {
                threads = writer.run(engine, &Query::Threads, Stage::ThreadDump, format_thread, &mut sink)?;
                sink.write(PROCESS_DUMP_END.as_bytes())?;
                sink.write(SYSTEM_TRACE_EVENTS.as_bytes())?;
                sink.write(FTRACE_JSON_HEADER.as_bytes())?;
                Phase::Plan
            }
            Phase::Plan => {
                log_progress("Converting trace events", options.progress);
                Phase::RawEvents(TruncationPlan::compute(engine, options.keep)?)
            }
            Phase::RawEvents(selected) => {
                events = writer.run(
                    engine,
                    &selected.query(),
                    Stage::RawEvents,
                    format_raw_event,
                    &mut sink,
                )?;
                plan = Some(selected);
                Phase::Finish
            }
            Phase::Finish => {
                if json {
                    sink.write(TRACE_FOOTER.as_bytes())?;
                }
                sink.finish()?;
                break;
            }
        };
    }

    Ok(ConvertSummary {
        processes,
        threads,
        plan: plan.unwrap_or_else(|| TruncationPlan::new(options.keep, 0)),
        events,
    })
}
