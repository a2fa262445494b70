use std::io::Write;

use log::{Level, LevelFilter, Log};
use owo_colors::OwoColorize;

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let level = record.level();
        let _ = match level {
            Level::Error => write!(stderr, "{:5} ", level.bright_red()),
            Level::Warn => write!(stderr, "{:5} ", level.bright_yellow()),
            Level::Info => write!(stderr, "{:5} ", level.bright_blue()),
            Level::Debug => write!(stderr, "{:5} ", level.bright_cyan()),
            Level::Trace => write!(stderr, "{:5} ", level.bright_magenta()),
        };
        let _ = writeln!(stderr, "{} {}", record.target().dimmed(), record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Maps `-v` repetitions to a level: warnings by default, then info, debug and trace.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_for(0), LevelFilter::Warn);
        assert_eq!(level_for(1), LevelFilter::Info);
        assert_eq!(level_for(2), LevelFilter::Debug);
        assert_eq!(level_for(9), LevelFilter::Trace);
    }
}
