//! C9: structured stderr logging.
//!
//! A stripped-down version of the server's logging setup: one stderr appender with a
//! UTC-timestamped, level-colored layout, gated by an [`EnvFilter`] built from the
//! configured filter string. No distributed tracing or OTEL export, since this proxy
//! is a single hop with no downstream spans to correlate.

use jiff::{Zoned, tz::TimeZone};
use logforth::{
    append::Stderr,
    filter::EnvFilter,
    layout::Layout,
};
use std::{fmt::Write as _, io::IsTerminal, str::FromStr, sync::Once};

static INIT: Once = Once::new();

#[derive(Debug)]
struct UtcLayout {
    no_color: bool,
}

impl UtcLayout {
    fn new() -> Self {
        Self { no_color: false }
    }

    fn no_color(mut self) -> Self {
        self.no_color = true;
        self
    }
}

impl Layout for UtcLayout {
    fn format(
        &self,
        record: &log::Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let mut output = String::new();
        let now = Zoned::now().with_time_zone(TimeZone::UTC);

        write!(output, "{} ", now.strftime("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level_str = if self.no_color {
            format!("{:>5}", record.level())
        } else {
            match record.level() {
                log::Level::Error => format!("\x1b[31m{:>5}\x1b[0m", record.level()),
                log::Level::Warn => format!("\x1b[33m{:>5}\x1b[0m", record.level()),
                log::Level::Info => format!("\x1b[32m{:>5}\x1b[0m", record.level()),
                log::Level::Debug => format!("\x1b[34m{:>5}\x1b[0m", record.level()),
                log::Level::Trace => format!("\x1b[35m{:>5}\x1b[0m", record.level()),
            }
        };

        write!(output, "{level_str}  ")?;
        write!(output, "{}", record.args())?;

        Ok(output.into_bytes())
    }
}

/// Initialize the global logger. `log_filter` is an `EnvFilter`-style string, e.g.
/// `"info"` or `"toolcall_proxy=debug,tower_http=info"`. Safe to call more than
/// once; only the first call takes effect.
pub fn init(log_filter: &str) {
    let log_filter = log_filter.to_owned();
    INIT.call_once(move || apply_logger(log_filter));
}

fn apply_logger(log_filter: String) {
    logforth::builder()
        .dispatch(move |d| {
            let filter = EnvFilter::from_str(&log_filter)
                .unwrap_or_else(|_| EnvFilter::from_str("info").expect("default filter should be valid"));

            let layout = if std::io::stderr().is_terminal() {
                UtcLayout::new()
            } else {
                UtcLayout::new().no_color()
            };

            d.filter(filter).append(Stderr::default().with_layout(layout))
        })
        .apply();
}
