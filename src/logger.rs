//! Timestamped logger writing to the console and to log files.
//!
//! Every line goes to stdout and is appended to `logs/book_capture.log`.
//! While a capture session runs, lines are also appended to the session log
//! inside the output folder.

use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::paths;

/// Per-session log file, active only while a capture session runs.
static SESSION_LOG: Mutex<Option<PathBuf>> = Mutex::new(None);

static LOGGER: FileLogger = FileLogger;

struct FileLogger;

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(record.level(), &record.args().to_string());
        print!("{}", line);

        append_line(&paths::get_logs_dir().join("book_capture.log"), &line);

        if let Ok(session) = SESSION_LOG.lock() {
            if let Some(path) = session.as_ref() {
                append_line(path, &line);
            }
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}

fn format_line(level: Level, msg: &str) -> String {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    format!("[{}] {:<5} {}\n", timestamp, level, msg)
}

fn append_line(path: &PathBuf, line: &str) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = file.write_all(line.as_bytes());
    }
}

/// Installs the logger. Safe to call more than once; later calls only
/// adjust the level.
pub fn init(verbose: bool) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
}

/// Activates or deactivates the per-session log file.
pub fn set_session_log(path: Option<PathBuf>) {
    if let Ok(mut session) = SESSION_LOG.lock() {
        *session = path;
    }
}

/// Logs panics to the log file before the default handler runs.
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        let line = format_line(Level::Error, &format!("[PANIC]{} {}", location, msg));
        append_line(&paths::get_logs_dir().join("book_capture.log"), &line);
        default_hook(panic_info);
    }));
}
