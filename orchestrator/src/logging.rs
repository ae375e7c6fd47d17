//! Process logging.
//!
//! Every record goes to the console. Pool threads additionally attach their own file sink during
//! setup, so each thread's records also land in `<logs dir>/<thread label>.log`. Both sinks share
//! the `[label: LEVEL - timestamp] - message` format.

use std::{
    cell::RefCell,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::Path,
    thread,
};

use env_logger::{Builder, Env, Logger, Target, WriteStyle, fmt::Formatter};
use log::{LevelFilter, Log, Metadata, Record};

thread_local! {
    static THREAD_SINK: RefCell<Option<Logger>> = const { RefCell::new(None) };
}

fn write_record(buf: &mut Formatter, record: &Record<'_>) -> io::Result<()> {
    let current = thread::current();
    let label = current.name().unwrap_or("main");

    writeln!(
        buf,
        "[{label}: {} - {}] - {}",
        record.level(),
        buf.timestamp(),
        record.args()
    )
}

/// Writes to the console and to the current thread's file, if it has one.
struct RunLogger {
    console: Logger,
}

impl Log for RunLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.console.matches(record) {
            self.console.log(record);
        }

        let _ = THREAD_SINK.try_with(|sink| {
            if let Some(logger) = sink.borrow().as_ref().filter(|l| l.matches(record)) {
                logger.log(record);
            }
        });
    }

    fn flush(&self) {
        self.console.flush();
        let _ = THREAD_SINK.try_with(|sink| {
            if let Some(logger) = sink.borrow().as_ref() {
                logger.flush();
            }
        });
    }
}

/// Installs the process logger.
///
/// `RUST_LOG` overrides `level` for the console when set.
///
/// # Returns
/// Whether the logger was installed, `false` if another one already was.
pub fn init(level: LevelFilter) -> bool {
    let console = Builder::from_env(Env::default().default_filter_or(level.as_str()))
        .format(write_record)
        .build();

    let max_level = console.filter().max(level);

    match log::set_boxed_logger(Box::new(RunLogger { console })) {
        Ok(()) => {
            log::set_max_level(max_level);
            true
        }
        Err(_) => false,
    }
}

/// Attaches a file sink to the calling thread, records are appended to
/// `<logs_dir>/<label>.log`.
///
/// Attaching to a thread that already has a sink does nothing.
pub fn attach_thread_file(logs_dir: &Path, label: &str) -> io::Result<()> {
    if THREAD_SINK.with(|sink| sink.borrow().is_some()) {
        return Ok(());
    }

    fs::create_dir_all(logs_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join(format!("{label}.log")))?;

    let logger = Builder::new()
        .filter_level(log::max_level())
        .target(Target::Pipe(Box::new(file)))
        .write_style(WriteStyle::Never)
        .format(write_record)
        .build();

    THREAD_SINK.with(|sink| *sink.borrow_mut() = Some(logger));
    Ok(())
}

/// Whether the calling thread has a file sink attached.
pub fn has_thread_file() -> bool {
    THREAD_SINK.with(|sink| sink.borrow().is_some())
}
