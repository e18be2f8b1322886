use std::fs::File;
use std::io::{Result as IoResult, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use std::{cell::RefCell, fmt::Display};

static LOG_FILE: OnceLock<Arc<Mutex<File>>> = OnceLock::new();
thread_local! {
    static LOG_PREFIX: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// How progress notices end on the diagnostic channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressStyle {
    /// Carriage return, so successive notices overwrite each other on a terminal.
    #[default]
    Overwrite,
    /// Plain newline for environments where in-place overwrite is not observable.
    Newline,
}

impl ProgressStyle {
    #[must_use]
    pub const fn terminator(self) -> &'static str {
        match self {
            Self::Overwrite => "\r",
            Self::Newline => "\n",
        }
    }
}

fn with_prefix<F, R>(f: F) -> R
where
    F: FnOnce(Option<String>) -> R,
{
    LOG_PREFIX.with(|prefix| f(prefix.borrow().clone()))
}

fn format_with_prefix(message: impl Display) -> String {
    with_prefix(|prefix| prefix.map_or_else(|| message.to_string(), |p| format!("{p}: {message}")))
}

/// Configures a log file mirroring errors emitted by the exporter.
///
/// # Errors
///
/// Returns an error if the log file cannot be created.
pub fn set_log_file(path: &Path) -> IoResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    // Keep the first writer if one is already installed.
    let _ = LOG_FILE.set(Arc::new(Mutex::new(file)));
    Ok(())
}

/// Sets a thread-local prefix that will be prepended to subsequent log
/// messages. Returns a guard that restores the previous prefix on drop.
pub fn set_log_prefix(prefix: impl Into<String>) -> LogPrefixGuard {
    let prefix = prefix.into();
    let previous = with_prefix(|p| p);
    LOG_PREFIX.with(|slot| {
        *slot.borrow_mut() = Some(prefix);
    });
    LogPrefixGuard { previous }
}

pub struct LogPrefixGuard {
    previous: Option<String>,
}

impl Drop for LogPrefixGuard {
    fn drop(&mut self) {
        let prev = self.previous.take();
        LOG_PREFIX.with(|slot| {
            *slot.borrow_mut() = prev;
        });
    }
}

fn mirror(level: &str, message: &str) {
    if let Some(writer) = LOG_FILE.get()
        && let Ok(mut file) = writer.lock()
    {
        let _ = writeln!(file, "{level}: {message}");
    }
}

pub fn log_error(message: &str) {
    let message = format_with_prefix(message);
    eprintln!("{message}");
    mirror("error", &message);
}

/// Writes a coarse progress notice to stderr. Not mirrored to the log file.
pub fn log_progress(message: impl Display, style: ProgressStyle) {
    let message = format_with_prefix(message);
    let mut stderr = std::io::stderr().lock();
    let _ = write!(stderr, "{message}{}", style.terminator());
    let _ = stderr.flush();
}
