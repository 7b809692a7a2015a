//! Process-wide logging setup: a `fern`-backed dispatcher that targets a
//! per-run log file under an arbitrary artifact directory.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, Once};
use std::time::Instant;

static LOGGING: Once = Once::new();
static FILE_LOGGING: DynFileLogger = DynFileLogger {
    file: Mutex::new(None),
};

struct DynFileLogger {
    file: Mutex<Option<File>>,
}

impl Write for &'static DynFileLogger {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.lock().unwrap().as_mut().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.lock().unwrap().as_mut().unwrap().flush()
    }
}

/// Initialize the global logger (idempotent) and point its file sink at
/// `<artifact_dir>/<name>.log`.
///
/// Safe to call once per process; subsequent calls only retarget the file
/// sink, which lets each `Executor` log to its own checkpoint directory.
pub fn init_logging(artifact_dir: &Path, name: &str) -> std::io::Result<()> {
    LOGGING.call_once(|| {
        let start = Instant::now();
        let file: Box<dyn Write + Send + 'static> = Box::new(&FILE_LOGGING);

        fern::Dispatch::new()
            .format(move |out, message, record| {
                let elapsed = start.elapsed().as_secs();
                let hours = elapsed / 3600;
                let mins = elapsed % 3600 / 60;
                let secs = elapsed % 3600 % 60;
                out.finish(format_args!(
                    "[{hours}:{mins}:{secs} {} {}] {}",
                    record.level(),
                    record.target(),
                    message
                ))
            })
            .level(log::LevelFilter::Info)
            .chain(std::io::stdout())
            .chain(file)
            .apply()
            .expect("logger should initialize exactly once");
    });

    std::fs::create_dir_all(artifact_dir)?;
    let log_path = artifact_dir.join(format!("{name}.log"));
    *FILE_LOGGING.file.lock().unwrap() = Some(fern::log_file(log_path)?);
    Ok(())
}

/// Logger target used for state-transition and lifecycle messages.
pub const STATUS_TARGET: &str = "academy_executor::status";

/// Logger target used for per-epoch progress summaries.
pub const PROGRESS_TARGET: &str = "academy_executor::progress";
