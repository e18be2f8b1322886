use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use walkdir::WalkDir;

use systrace_export::logger::{log_error, set_log_file, set_log_prefix};
use systrace_export::{
    Compression, ConvertOptions, Error, Framing, Keep, ProgressStyle, TraceTables,
    TruncationPlan, convert,
};

const SNAPSHOT_EXTENSION: &str = "json";
const OUTPUT_MARKER: &str = ".systrace";

#[derive(Parser)]
#[command(
    name = "trace2systrace",
    version,
    about = "Convert queried trace tables to systrace/ftrace text"
)]
struct Cli {
    /// Mirror errors into this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert one or more table snapshots to systrace output.
    Convert(Box<ConvertArgs>),
    /// Print table sizes and the truncation plan for a snapshot.
    Inspect(InspectArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum KeepArg {
    All,
    Start,
    End,
}

impl From<KeepArg> for Keep {
    fn from(value: KeepArg) -> Self {
        match value {
            KeepArg::All => Self::All,
            KeepArg::Start => Self::Start,
            KeepArg::End => Self::End,
        }
    }
}

#[derive(Parser, Clone)]
struct ConvertArgs {
    /// Snapshot files or directories (recurses directories).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory (computed file names).
    #[arg(long, conflicts_with = "out")]
    out_dir: Option<PathBuf>,

    /// Output file, or `-` for stdout (only valid with a single input).
    #[arg(long, conflicts_with = "out_dir")]
    out: Option<PathBuf>,

    /// Wrap the ftrace text in the systrace JSON envelope.
    #[arg(long)]
    json: bool,

    /// Compress the output into a zlib stream.
    #[arg(long)]
    compress: bool,

    /// Which events to keep when the trace exceeds the output budget.
    #[arg(long, value_enum, default_value_t = KeepArg::All)]
    keep: KeepArg,

    /// End progress notices with a newline instead of a carriage return.
    #[arg(long)]
    progress_newline: bool,

    /// Rolling buffer size in bytes.
    #[arg(long)]
    buffer_bytes: Option<usize>,

    /// Number of concurrent worker threads.
    #[arg(long)]
    jobs: Option<usize>,

    /// Stop on first error.
    #[arg(long)]
    fail_fast: bool,
}

impl ConvertArgs {
    fn options(&self) -> ConvertOptions {
        let mut options = ConvertOptions::new()
            .with_framing(if self.json { Framing::Json } else { Framing::Plain })
            .with_compression(if self.compress {
                Compression::Deflate
            } else {
                Compression::None
            })
            .with_keep(self.keep.into())
            .with_progress(if self.progress_newline {
                ProgressStyle::Newline
            } else {
                ProgressStyle::Overwrite
            });
        if let Some(bytes) = self.buffer_bytes {
            options = options.with_buffer_capacity(bytes);
        }
        options
    }
}

#[derive(Parser, Clone)]
struct InspectArgs {
    input: PathBuf,
    /// Which events to keep when the trace exceeds the output budget.
    #[arg(long, value_enum, default_value_t = KeepArg::All)]
    keep: KeepArg,
    /// Emit JSON instead of human readable output.
    #[arg(long)]
    json: bool,
}

type AnyError = Box<dyn std::error::Error + Send + Sync>;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(path) = &cli.log_file
        && let Err(err) = set_log_file(path)
    {
        log_error(&format!("cannot open log file {}: {err}", path.display()));
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Convert(args) => run_convert(&args),
        Command::Inspect(args) => run_inspect(&args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log_error(&format!("error: {err}"));
            ExitCode::FAILURE
        }
    }
}

fn run_convert(args: &ConvertArgs) -> Result<(), AnyError> {
    if let Some(jobs) = args.jobs {
        // Keep the first global pool if one is already configured.
        let _ = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global();
    }

    let files = discover_inputs(&args.inputs);
    if files.is_empty() {
        return Err("no snapshot inputs found".into());
    }
    if args.out.is_some() && files.len() != 1 {
        return Err("--out requires a single input".into());
    }

    let options = args.options();
    let tasks: Vec<(PathBuf, Option<PathBuf>)> = match &args.out {
        Some(out) if out.as_os_str() == "-" => vec![(files[0].clone(), None)],
        Some(out) => vec![(files[0].clone(), Some(out.clone()))],
        None => files
            .into_iter()
            .map(|input| {
                let output = compute_output_path(&input, args);
                (input, Some(output))
            })
            .collect(),
    };

    let process = |(input, output): (PathBuf, Option<PathBuf>)| -> Result<(), AnyError> {
        let _prefix = set_log_prefix(input.display().to_string());
        convert_one(&input, output.as_deref(), &options).inspect_err(|err| {
            log_error(&format!("error: {err}"));
        })
    };

    if args.fail_fast {
        tasks
            .into_par_iter()
            .map(process)
            .collect::<Result<Vec<_>, _>>()?;
    } else {
        let failures = tasks
            .into_par_iter()
            .map(process)
            .filter(Result::is_err)
            .count();
        if failures > 0 {
            return Err(format!("completed with {failures} failures").into());
        }
    }
    Ok(())
}

fn convert_one(input: &Path, output: Option<&Path>, options: &ConvertOptions) -> Result<(), AnyError> {
    let tables = TraceTables::open(input)?;
    let result = match output {
        Some(path) => {
            let file = BufWriter::new(File::create(path)?);
            convert(&tables, file, options)
        }
        None => convert(&tables, std::io::stdout().lock(), options),
    };
    let summary = match result {
        Ok(summary) => summary,
        Err(err) if err.is_fatal() => abort_on_fatal(&err),
        Err(err) => return Err(err.into()),
    };

    let destination = output.map_or_else(|| "stdout".to_owned(), |p| p.display().to_string());
    eprintln!(
        "{} -> {} ({} processes, {} threads, {} of {} events)",
        input.display(),
        destination,
        summary.processes,
        summary.threads,
        summary.events,
        summary.plan.total_events
    );
    Ok(())
}

fn abort_on_fatal(err: &Error) -> ! {
    log_error(&format!("fatal: {err}"));
    let _ = std::io::stderr().flush();
    std::process::abort()
}

fn run_inspect(args: &InspectArgs) -> Result<(), AnyError> {
    let tables = TraceTables::open(&args.input)?;
    let plan = TruncationPlan::compute(&tables, args.keep.into())?;
    let window = plan.window();
    if args.json {
        #[derive(serde::Serialize)]
        struct InspectJson {
            processes: usize,
            threads: usize,
            raw_events: u64,
            max_events: u64,
            keep: &'static str,
            limit: Option<u64>,
            offset: u64,
            emitted_events: u64,
        }
        let payload = InspectJson {
            processes: tables.processes.len(),
            threads: tables.threads.len(),
            raw_events: plan.total_events,
            max_events: plan.max_events,
            keep: keep_name(plan.keep),
            limit: window.limit,
            offset: window.offset,
            emitted_events: plan.emitted_events(),
        };
        serde_json::to_writer_pretty(std::io::stdout(), &payload)?;
        println!();
    } else {
        println!(
            "Processes: {}  Threads: {}  Raw events: {}",
            tables.processes.len(),
            tables.threads.len(),
            plan.total_events
        );
        println!(
            "Keep: {}  Budget: {} events  Emitted: {}  ({})",
            keep_name(plan.keep),
            plan.max_events,
            plan.emitted_events(),
            plan.query()
        );
    }
    Ok(())
}

const fn keep_name(keep: Keep) -> &'static str {
    match keep {
        Keep::All => "all",
        Keep::Start => "start",
        Keep::End => "end",
    }
}

fn discover_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input)
                .follow_links(false)
                .into_iter()
                .filter_map(Result::ok)
            {
                let path = entry.path();
                if path.is_file() && is_snapshot(path) {
                    files.push(path.to_path_buf());
                }
            }
        } else if input.is_file() {
            files.push(input.clone());
        }
    }
    files.sort();
    files.dedup();
    files
}

// Skips earlier conversion outputs found while walking directories.
fn is_snapshot(path: &Path) -> bool {
    let is_json = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(SNAPSHOT_EXTENSION));
    let is_output = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains(OUTPUT_MARKER));
    is_json && !is_output
}

fn compute_output_path(input: &Path, args: &ConvertArgs) -> PathBuf {
    use std::ffi::OsStr;
    let stem = input.file_stem().unwrap_or_else(|| OsStr::new("trace"));
    let mut name = stem.to_os_string();
    name.push(OUTPUT_MARKER);
    if args.json {
        name.push(".json");
    }
    if args.compress {
        name.push(".zz");
    }
    args.out_dir.as_ref().map_or_else(
        || input.with_file_name(&name),
        |dir| dir.join(&name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert_args(flags: &[&str]) -> ConvertArgs {
        let argv = ["convert", "traces/boot.json"].into_iter().chain(flags.iter().copied());
        ConvertArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn output_names_carry_marker_and_suffixes() {
        let input = Path::new("traces/boot.json");
        let plain = convert_args(&[]);
        assert_eq!(compute_output_path(input, &plain), PathBuf::from("traces/boot.systrace"));

        let wrapped = convert_args(&["--json", "--compress", "--out-dir", "out"]);
        assert_eq!(
            compute_output_path(input, &wrapped),
            PathBuf::from("out/boot.systrace.json.zz")
        );
    }

    #[test]
    fn previous_outputs_are_not_snapshots() {
        assert!(is_snapshot(Path::new("traces/boot.json")));
        assert!(!is_snapshot(Path::new("out/boot.systrace.json")));
        assert!(!is_snapshot(Path::new("traces/boot.txt")));
    }
}
