//! provides logging helpers

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use influxdb_line_protocol::LineProtocolBuilder;
use tracing::field::Field;
use tracing::field::Visit;
use tracing::Event;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::FilterExt;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::FormatEvent;
use tracing_subscriber::fmt::FormatFields;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;
use tracing_subscriber::registry::LookupSpan;

const METRICS_PREFIX: &str = "metrics.";
const DEFAULT_METRICS_FILE: &str = "logs/metrics.log";

#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    String(String),
    Integer(i64),
    UnsignedInteger(u64),
    Float(f64),
    Boolean(bool),
}

/// Splits event fields into `tag_*` tags and typed fields.
#[derive(Default)]
struct FieldVisitor {
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: FieldValue) {
        match field.name().strip_prefix("tag_") {
            Some(tag) => {
                let rendered = match value {
                    FieldValue::String(s) => s,
                    FieldValue::Integer(i) => i.to_string(),
                    FieldValue::UnsignedInteger(u) => u.to_string(),
                    FieldValue::Float(f) => f.to_string(),
                    FieldValue::Boolean(b) => b.to_string(),
                };
                self.tags.insert(tag.to_string(), rendered);
            }
            None => {
                self.fields.insert(field.name().to_string(), value);
            }
        }
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, FieldValue::Float(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, FieldValue::Integer(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, FieldValue::UnsignedInteger(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, FieldValue::Boolean(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, FieldValue::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, FieldValue::String(format!("{value:?}")));
    }
}

/// Encode one line of InfluxDB line protocol, with a trailing newline.
fn encode_line(
    measurement: &str,
    tags: &BTreeMap<String, String>,
    fields: &BTreeMap<String, FieldValue>,
    timestamp: i64,
) -> String {
    let mut builder = LineProtocolBuilder::new().measurement(measurement);
    for (key, value) in tags {
        builder = builder.tag(key, value);
    }

    let mut entries = fields.iter();
    let Some((first_key, first_value)) = entries.next() else {
        let line = builder
            .field("_empty", true)
            .timestamp(timestamp)
            .close_line()
            .build();
        return String::from_utf8_lossy(&line).into_owned();
    };

    let mut after_field = match first_value {
        FieldValue::String(s) => builder.field(first_key, s.as_str()),
        FieldValue::Integer(i) => builder.field(first_key, *i),
        FieldValue::UnsignedInteger(u) => builder.field(first_key, *u),
        FieldValue::Float(f) => builder.field(first_key, *f),
        FieldValue::Boolean(b) => builder.field(first_key, *b),
    };
    for (key, value) in entries {
        after_field = match value {
            FieldValue::String(s) => after_field.field(key, s.as_str()),
            FieldValue::Integer(i) => after_field.field(key, *i),
            FieldValue::UnsignedInteger(u) => after_field.field(key, *u),
            FieldValue::Float(f) => after_field.field(key, *f),
            FieldValue::Boolean(b) => after_field.field(key, *b),
        };
    }

    let line = after_field.timestamp(timestamp).close_line().build();
    String::from_utf8_lossy(&line).into_owned()
}

struct InfluxDBFormatter;

impl<S, N> FormatEvent<S, N> for InfluxDBFormatter
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
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let target = event.metadata().target();
        let measurement = target.strip_prefix(METRICS_PREFIX).unwrap_or(target);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as i64)
            .unwrap_or_default();

        write!(
            writer,
            "{}",
            encode_line(measurement, &visitor.tags, &visitor.fields, timestamp)
        )
    }
}

fn is_metrics(target: &str) -> bool {
    target.starts_with(METRICS_PREFIX)
}

/// initiate the global tracing subscriber
///
/// Regular events go to stderr. Events targeted at `metrics.*` are written
/// as line protocol to a daily rolling file next to `metrics_file`.
pub fn init<P: AsRef<Path>>(metrics_file: Option<P>) -> anyhow::Result<WorkerGuard> {
    let metrics_file = metrics_file
        .as_ref()
        .map(|p| p.as_ref())
        .unwrap_or(Path::new(DEFAULT_METRICS_FILE));

    let directory = metrics_file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let prefix = metrics_file
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow::anyhow!("invalid metrics file {}", metrics_file.display()))?;

    let fmt_layer = utils::logging::get_fmt_layer().with_filter(
        utils::logging::env_filter()
            .and(filter::filter_fn(|metadata| !is_metrics(metadata.target()))),
    );

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(3)
        .build(directory)?;

    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);

    let metrics_layer = layer()
        .event_format(InfluxDBFormatter)
        .fmt_fields(tracing_subscriber::fmt::format::DefaultFields::new())
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(filter::filter_fn(|metadata| is_metrics(metadata.target())));

    registry().with(fmt_layer).with(metrics_layer).try_init()?;
    Ok(file_guard)
}
