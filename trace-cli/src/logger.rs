use flexi_logger::{Duplicate, DeferredNow, FileSpec, Logger, LoggerHandle, WriteMode};
use log::Record;
use std::io::Write;
use std::path::Path;
use std::thread;

/// Initializes the logger with custom formatting.
///
/// Always writes to a rotating file under `log_dir`; additionally echoes to
/// the console at `info` and above when `verbose` is set, since the CLI is a
/// one-shot batch tool rather than a resident process.
pub fn init_logger(
    level: &str,
    log_dir: &Path,
    verbose: bool,
) -> Result<LoggerHandle, Box<dyn std::error::Error>> {
    let mut logger = Logger::try_with_str(level)?
        .log_to_file(FileSpec::default().directory(log_dir).suppress_timestamp())
        .append()
        .write_mode(WriteMode::BufferAndFlush)
        .format(log_format);

    if verbose {
        logger = logger.duplicate_to_stderr(Duplicate::Info);
    }

    Ok(logger.start()?)
}

/// Custom log line format: includes timestamp, level, source file/line, thread name, and message.
fn log_format(w: &mut dyn Write, now: &mut DeferredNow, record: &Record) -> std::io::Result<()> {
    write!(
        w,
        "{} [{:<5}] [{}:{}] [{}] {}",
        now.format("%Y-%m-%d %H:%M:%S"),
        record.level(),
        record.file().unwrap_or("<unknown>"),
        record.line().unwrap_or(0),
        thread::current().name().unwrap_or("<unnamed>"),
        &record.args()
    )
}
