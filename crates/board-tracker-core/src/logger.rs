//! Process-wide logging setup.
//!
//! Records whose target belongs to the `board_tracker*` crates pass at the
//! requested level. Everything else (image decoders, the display backend)
//! is capped at `Warn`, so `--log-level debug` shows tracker internals only.
//!
//! `init_with_level` installs a stderr logger printing
//! `elapsed LEVEL module: message`. With the `tracing` feature,
//! `init_tracing` installs a `tracing-subscriber` formatter instead and
//! forwards `log` records into it.

use std::fmt;
use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::EnvFilter;

/// Target prefix shared by every crate of this workspace.
const OWN_TARGET: &str = "board_tracker";

/// Level applied to records from other crates.
fn foreign_level(level: LevelFilter) -> LevelFilter {
    level.min(LevelFilter::Warn)
}

struct StderrLogger {
    own: LevelFilter,
    foreign: LevelFilter,
    started: Instant,
}

impl StderrLogger {
    fn new(level: LevelFilter) -> Self {
        Self {
            own: level,
            foreign: foreign_level(level),
            started: Instant::now(),
        }
    }

    fn threshold(&self, target: &str) -> LevelFilter {
        if target.starts_with(OWN_TARGET) {
            self.own
        } else {
            self.foreign
        }
    }
}

/// One log line, without the trailing newline.
///
/// Only the last path segment of the target is kept: `board_tracker::tracker`
/// prints as `tracker`.
fn format_line(elapsed_s: f64, level: Level, target: &str, args: &fmt::Arguments<'_>) -> String {
    let module = target.rsplit("::").next().unwrap_or(target);
    format!("{elapsed_s:9.3}s {level:<5} {module}: {args}")
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.threshold(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(
            self.started.elapsed().as_secs_f64(),
            record.level(),
            record.target(),
            record.args(),
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger.
///
/// Only the first call takes effect; later calls return `Ok(())` and keep
/// the original level.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger::new(level));
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// `EnvFilter` directives equivalent to the stderr logger's level split.
#[cfg(any(feature = "tracing", test))]
fn default_directives(level: LevelFilter) -> String {
    let own = level.to_string().to_ascii_lowercase();
    let foreign = foreign_level(level).to_string().to_ascii_lowercase();
    format!("{foreign},{OWN_TARGET}={own}")
}

/// Install a `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` applies to this workspace's
/// crates the same way [`init_with_level`] does. Span close events carry
/// per-stage timings for detection and pose solving.
#[cfg(feature = "tracing")]
pub fn init_tracing(level: LevelFilter, json: bool) {
    let _ = tracing_log::LogTracer::init();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(tracing_subscriber::fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_targets_are_capped_at_warn() {
        let logger = StderrLogger::new(LevelFilter::Debug);
        assert_eq!(logger.threshold("board_tracker::tracker"), LevelFilter::Debug);
        assert_eq!(logger.threshold("board_tracker_aruco::detector"), LevelFilter::Debug);
        assert_eq!(logger.threshold("png::decoder"), LevelFilter::Warn);

        let quiet = StderrLogger::new(LevelFilter::Error);
        assert_eq!(quiet.threshold("minifb"), LevelFilter::Error);
    }

    #[test]
    fn line_keeps_the_last_module_segment() {
        let line = format_line(
            1.5,
            Level::Info,
            "board_tracker::tracker",
            &format_args!("solved {} markers", 4),
        );
        assert_eq!(line, "    1.500s INFO  tracker: solved 4 markers");
    }

    #[test]
    fn directives_mirror_the_level_split() {
        assert_eq!(default_directives(LevelFilter::Debug), "warn,board_tracker=debug");
        assert_eq!(default_directives(LevelFilter::Error), "error,board_tracker=error");
        assert_eq!(default_directives(LevelFilter::Off), "off,board_tracker=off");
    }

    #[test]
    fn repeated_init_is_a_no_op() {
        assert!(init_with_level(LevelFilter::Warn).is_ok());
        assert!(init_with_level(LevelFilter::Debug).is_ok());
        assert_eq!(log::max_level(), LevelFilter::Warn);
    }
}
