#![allow(clippy::pedantic)]
mod common;

use serde_json::Value as JsonValue;
use systrace_export::error::Stage;
use systrace_export::format::format_raw_event;
use systrace_export::truncate::MAX_EVENTS;
use systrace_export::writer::QueryWriter;
use systrace_export::{
    Compression, ConvertOptions, Error, Framing, Keep, OutputSink, ProgressStyle, Query,
    TruncationPlan, convert,
};

use common::{FailingEngine, events, inflate, render, sample_tables};

fn quiet() -> ConvertOptions {
    ConvertOptions::new().with_progress(ProgressStyle::Newline)
}

fn json_document(bytes: &[u8]) -> JsonValue {
    serde_json::from_slice(bytes).expect("JSON framing produces a valid document")
}

#[test]
fn plain_output_ends_with_verbatim_lines() {
    let tables = systrace_export::TraceTables::new().with_raw_events(["hello", "a\tb"]);
    let out = String::from_utf8(render(&tables, &quiet())).unwrap();
    assert!(out.starts_with("TRACE:\n# tracer: nop\n#\n"));
    assert!(out.ends_with("|         |\nhello\na\tb\n"));
}

#[test]
fn json_output_escapes_event_text() {
    let tables = systrace_export::TraceTables::new().with_raw_events(["a\"b"]);
    let out = render(&tables, &quiet().with_framing(Framing::Json));
    let text = String::from_utf8(out.clone()).unwrap();
    assert!(text.contains("|         |\\na\\\"b\\n\\n\",\n"));

    let doc = json_document(&out);
    let events = doc["systemTraceEvents"].as_str().unwrap();
    assert!(events.starts_with("# tracer: nop\n"));
    assert!(events.ends_with("a\"b\n\n"));
}

#[test]
fn json_document_carries_dumps_and_controller_key() {
    let out = render(&sample_tables(), &quiet().with_framing(Framing::Json));
    let doc = json_document(&out);

    assert_eq!(doc["traceEvents"], JsonValue::Array(Vec::new()));
    assert_eq!(doc["controllerTraceDataKey"], "systraceController");

    let dump = doc["androidProcessDump"].as_str().unwrap();
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines[0], "PROCESS DUMP");
    assert!(lines[1].starts_with("USER           PID  PPID     VSZ"));
    assert_eq!(
        lines[2],
        "root             1     0   00000   000 null 0000000000 S init         null"
    );
    assert!(lines[3].contains(" S surfaceflinger "));
    assert!(lines[4].ends_with(" S          null"));
    assert_eq!(lines[5], "USER           PID   TID CMD ");
    assert_eq!(lines[6], "root         1 1 init");
    assert_eq!(lines[8], "root         612 640 RenderEngine");
    assert_eq!(lines[9], "root         0 77 <...>");
    assert_eq!(lines.len(), 10);

    let events = doc["systemTraceEvents"].as_str().unwrap();
    assert!(events.contains("tracing_mark_write: B|612|onMessage\n"));
}

#[test]
fn compressed_output_inflates_to_uncompressed_output() {
    let tables = sample_tables();
    for framing in [Framing::Plain, Framing::Json] {
        let options = quiet().with_framing(framing);
        let plain = render(&tables, &options);
        let compressed = render(&tables, &options.with_compression(Compression::Deflate));
        assert_ne!(compressed, plain);
        assert_eq!(inflate(&compressed), plain, "{framing:?}");
    }
}

#[test]
fn large_compressed_output_round_trips() {
    let tables = events(60_000);
    let options = quiet().with_framing(Framing::Json);
    let plain = render(&tables, &options);
    let compressed = render(
        &tables,
        &options.with_compression(Compression::Deflate).with_buffer_capacity(4096),
    );
    assert_eq!(inflate(&compressed), plain);
}

#[test]
fn flush_boundaries_are_invisible() {
    let tables = sample_tables();
    for framing in [Framing::Plain, Framing::Json] {
        let reference = render(&tables, &quiet().with_framing(framing));
        for capacity in [1, 3, 50, 97, 256] {
            let options = quiet().with_framing(framing).with_buffer_capacity(capacity);
            assert_eq!(render(&tables, &options), reference, "capacity {capacity}");
        }
    }
}

#[test]
fn repeated_conversions_are_identical() {
    let tables = sample_tables();
    let options = quiet()
        .with_framing(Framing::Json)
        .with_compression(Compression::Deflate)
        .with_keep(Keep::End);
    assert_eq!(render(&tables, &options), render(&tables, &options));
}

#[test]
fn truncated_queries_select_expected_rows() {
    let total = 10u64;
    let tables = events(total as usize);
    let all = &tables.raw_events;

    let emitted = |keep: Keep| -> Vec<String> {
        let plan = TruncationPlan::with_max_events(keep, total, 4);
        let mut writer = QueryWriter::with_capacity(32, Framing::Plain, ProgressStyle::Newline);
        let mut sink = OutputSink::new(Vec::new(), Compression::None);
        let rows = writer
            .run(&tables, &plan.query(), Stage::RawEvents, format_raw_event, &mut sink)
            .unwrap();
        assert_eq!(rows, plan.emitted_events());
        let text = String::from_utf8(sink.finish().unwrap()).unwrap();
        text.lines().map(str::to_owned).collect()
    };

    assert_eq!(emitted(Keep::End), all[6..].to_vec());
    assert_eq!(emitted(Keep::Start), all[..4].to_vec());
    assert_eq!(emitted(Keep::All), *all);
    let within = TruncationPlan::with_max_events(Keep::End, total, total);
    assert_eq!(within.emitted_events(), total);
}

#[test]
fn budget_plan_for_large_trace() {
    let plan = TruncationPlan::new(Keep::End, 1_200_000);
    let Query::RawEvents(window) = plan.query() else {
        panic!("plan must select a raw event query");
    };
    assert_eq!(window.limit, Some(MAX_EVENTS));
    assert_eq!(window.offset, 1_200_000 - MAX_EVENTS);
    assert_eq!(
        plan.query().to_string(),
        format!("select to_ftrace(id) from raw limit {MAX_EVENTS} offset {}", 1_200_000 - MAX_EVENTS)
    );
}

#[test]
fn keep_start_within_budget_emits_everything() {
    let tables = sample_tables();
    let all = render(&tables, &quiet());
    let start = render(&tables, &quiet().with_keep(Keep::Start));
    let end = render(&tables, &quiet().with_keep(Keep::End));
    assert_eq!(all, start);
    assert_eq!(all, end);
}

#[test]
fn failing_thread_query_stops_before_events() {
    let engine = FailingEngine {
        tables: sample_tables(),
        fails: |query| *query == Query::Threads,
        after_rows: 1,
    };
    let mut out = Vec::new();
    let err = convert(&engine, &mut out, &quiet().with_framing(Framing::Json)).unwrap_err();
    assert!(matches!(err, Error::Query { stage: Stage::ThreadDump, .. }));
    assert!(!err.is_fatal());

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("S surfaceflinger"));
    assert!(!text.contains("systemTraceEvents"));
    assert!(!text.contains("controllerTraceDataKey"));
}

#[test]
fn failing_count_query_reports_event_count_stage() {
    let engine = FailingEngine {
        tables: sample_tables(),
        fails: |query| *query == Query::CountRawEvents,
        after_rows: 0,
    };
    let err = convert(&engine, std::io::sink(), &quiet()).unwrap_err();
    assert!(matches!(err, Error::Query { stage: Stage::EventCount, .. }));
}

#[test]
fn failed_compressed_conversion_leaves_complete_stream() {
    let engine = FailingEngine {
        tables: sample_tables(),
        fails: |query| matches!(query, Query::RawEvents(_)),
        after_rows: 2,
    };
    let mut out = Vec::new();
    let options = quiet().with_compression(Compression::Deflate);
    let err = convert(&engine, &mut out, &options).unwrap_err();
    assert!(matches!(err, Error::Query { stage: Stage::RawEvents, .. }));

    let text = String::from_utf8(inflate(&out)).unwrap();
    assert!(text.starts_with("TRACE:\n"));
    assert!(!text.contains("cpu_idle"));
}

#[test]
fn snapshot_file_converts_to_file() {
    use std::io::Write;

    let mut snapshot = tempfile::NamedTempFile::new().unwrap();
    write!(
        snapshot,
        r#"{{"processes": [{{"pid": 5, "name": "app"}}], "raw_events": ["x", "y"]}}"#
    )
    .unwrap();
    let tables = systrace_export::TraceTables::open(snapshot.path()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.systrace");
    let file = std::fs::File::create(&path).unwrap();
    let summary = convert(&tables, file, &quiet()).unwrap();
    assert_eq!(summary.events, 2);
    assert_eq!(summary.processes, 0);

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.ends_with("x\ny\n"));
}
