use std::io::Write;

use log::{Level, LevelFilter, Log, Metadata, Record};
use owo_colors::OwoColorize;

/// Writes every record as one coloured line to stderr.
struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

fn colored(level: Level) -> String {
    let label = format!("{level:5}");
    match level {
        Level::Error => label.bright_red().to_string(),
        Level::Warn => label.bright_yellow().to_string(),
        Level::Info => label.bright_blue().to_string(),
        Level::Debug => label.bright_cyan().to_string(),
        Level::Trace => label.bright_magenta().to_string(),
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let target = format!("[{}]", record.target());
        let mut stderr = std::io::stderr().lock();
        // nowhere left to report a failing stderr
        let _ = writeln!(
            stderr,
            "{} {} {}",
            colored(record.level()),
            target.dimmed(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Maps the number of `-v` flags to a level, starting from warnings.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub fn init(verbosity: u8) -> Result<(), log::SetLoggerError> {
    log::set_max_level(level_for(verbosity));
    log::set_logger(&LOGGER)
}
