//! # Logging
//!
//! This crate instruments itself with [`tracing`] spans/events throughout
//! (session registration, attribute dispatch errors, route mismatches)
//! but never installs a global subscriber on its own — that's a decision
//! for whatever binary embeds it. [`init`] is offered as the same
//! `tracing-subscriber` + `tracing-appender` setup the original
//! benchmark harness used, for callers that want a ready-made one.

use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// A level-prefixed event formatter for embedding applications that want
/// something terser than `tracing-subscriber`'s default line (no target,
/// no timestamp — just `LEVEL message`), ported from the teacher's
/// `ColorizedFormatter`. The teacher colorizes the whole line with
/// `colored`; this crate has no CLI surface of its own to justify that
/// dependency, so it keeps the same single-pass buffer-then-write
/// structure without the color.
pub struct DeviceFormatter;

impl<S, N> FormatEvent<S, N> for DeviceFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let level = match *event.metadata().level() {
            Level::ERROR => "ERROR",
            Level::WARN => "WARN",
            Level::INFO => "INFO",
            Level::DEBUG => "DEBUG",
            Level::TRACE => "TRACE",
        };
        write!(writer, "{level:>5} ")?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install a process-wide `tracing` subscriber: an `EnvFilter` read from
/// `RUST_LOG` (defaulting to `info`), writing to `stderr` or, if
/// `log_file` is given, to a non-blocking appender over that file. The
/// returned [`WorkerGuard`] must be held for the lifetime of the process
/// when logging to a file — dropping it flushes and stops the writer
/// thread.
pub fn init(log_file: Option<&std::path::Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("cip-device.log"));
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .event_format(DeviceFormatter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .event_format(DeviceFormatter)
                .init();
            None
        }
    }
}
