//! `[prefix] message` log lines

use std::fmt::{self, Write as _};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install the global subscriber. `RUST_LOG` overrides the level.
pub fn init(prefix: &str, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stdout()))
        .event_format(PrefixFormat::new(prefix))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Formats every event as `[prefix] message key=value...`.
///
/// With ANSI enabled the prefix is red for errors, yellow for warnings and
/// green for events carrying `status = "ok"`.
pub struct PrefixFormat {
    prefix: String,
}

impl PrefixFormat {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }
}

impl<S, N> FormatEvent<S, N> for PrefixFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = Fields::default();
        event.record(&mut fields);

        let colour = match *event.metadata().level() {
            Level::ERROR => Some(31),
            Level::WARN => Some(33),
            _ if fields.status.as_deref() == Some("ok") => Some(32),
            _ => None,
        };

        match colour {
            Some(code) if writer.has_ansi_escapes() => {
                write!(writer, "\x1b[{}m[{}]\x1b[0m ", code, self.prefix)?
            }
            _ => write!(writer, "[{}] ", self.prefix)?,
        }
        writeln!(writer, "{}{}", fields.message, fields.rest)
    }
}

#[derive(Default)]
struct Fields {
    message: String,
    status: Option<String>,
    rest: String,
}

impl Visit for Fields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "status" => self.status = Some(value.to_string()),
            name => {
                let _ = write!(self.rest, " {}={:?}", name, value);
            }
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{:?}", value),
            "status" => self.status = Some(format!("{:?}", value)),
            name => {
                let _ = write!(self.rest, " {}={:?}", name, value);
            }
        }
    }
}
