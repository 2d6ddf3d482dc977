//! Session log, truncated per launch. Lives next to the settings file as
//! `cutoutfe.log`, or in the temp dir when no config dir is available.
//!
//! Use the `log_info!` / `log_warn!` / `log_err!` macros anywhere in the
//! crate. Until [`init`] (or [`init_at`]) has run they are no-ops, so the
//! engine can be used as a library and under test without a log file.
//! When verbose mode is on, lines are mirrored to stderr as well.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Write a line to the session log.  Silently ignores I/O errors so that
/// logging never crashes the application.
pub fn write_line(line: &str) {
    if let Some(mutex) = LOG_FILE.get()
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

/// Mirror log lines to stderr (CLI `--verbose`).
pub fn set_verbose(on: bool) {
    VERBOSE.store(on, Ordering::Relaxed);
}

/// Write a timestamped, level-tagged line to the session log.
pub fn write(level: &str, msg: &str) {
    let verbose = VERBOSE.load(Ordering::Relaxed);
    if LOG_FILE.get().is_none() && !verbose {
        return;
    }
    let line = format!("[{}] [{}] {}", timestamp(), level, msg);
    if verbose {
        eprintln!("{}", line);
    }
    write_line(&line);
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write("INFO", &format!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write("WARN", &format!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write("ERROR", &format!($($arg)*));
    };
}

/// Open the session log in the config directory and hook panics into it.
pub fn init() {
    let path = crate::settings::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("cutoutfe.log");
    init_at(path);
}

/// Open (truncating) the session log at `path`. Later calls are ignored.
pub fn init_at(path: PathBuf) {
    if LOG_FILE.get().is_some() {
        return;
    }
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let file = match File::create(&path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("[logger] cannot open {}: {}", path.display(), e);
            return;
        }
    };
    let _ = LOG_PATH.set(path.clone());
    let _ = LOG_FILE.set(Mutex::new(file));

    let started = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    write_line(&format!("=== CutoutFE session, unix time {} ===", started));
    write_line(&format!("log: {}", path.display()));

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_line(&format!("[{}] [PANIC] {}", timestamp(), info));
        prev(info);
    }));
}

/// UTC wall clock as `HH:MM:SS`.
fn timestamp() -> String {
    let Ok(d) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return "??:??:??".to_string();
    };
    let secs = d.as_secs() % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}
