use crate::{CallerType, Entry, Level, Logger};
use tracing::field::{Field, Visit};

/// Bridges `tracing` events into the journal as internal records.
///
/// Example usage:
///
///   use tracing_subscriber::prelude::*;
///   tracing_subscriber::registry()
///       .with(journal::layer::Layer::new(logger.clone()))
///       .init();
///
/// Events are forwarded with `try_log`: when the writer queue is full
/// the event is dropped rather than suspending inside the subscriber.
pub struct Layer(Logger);

impl Layer {
    pub fn new(logger: Logger) -> Self {
        Self(logger)
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Layer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let metadata = event.metadata();

        let mut entry = Entry::new("")
            .with_level(level_from_tracing(metadata.level()))
            .with_caller(CallerType::Internal)
            .with_function(metadata.target());
        if let (Some(file), Some(line)) = (metadata.file(), metadata.line()) {
            entry = entry.with_code_path(format!("{file}:{line}"));
        }

        event.record(&mut FieldVisitor(&mut entry));

        self.0.try_log(entry); // Best-effort.
    }
}

struct FieldVisitor<'a>(&'a mut Entry);

impl<'a> FieldVisitor<'a> {
    fn record_value(&mut self, field: &Field, value: serde_json::Value) {
        self.0.set_field(field.name().to_string(), value);
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record_value(field, value.into())
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, value.into())
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, value.into())
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, value.into())
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.0.set_message(value.to_string()),
            "trace_id" => self.0.set_trace_id(value.to_string()),
            _ => self.record_value(field, value.into()),
        }
    }

    fn record_error(
        &mut self,
        field: &Field,
        value: &(dyn std::error::Error + 'static),
    ) {
        let mut chain = Vec::new();
        let mut next = Some(value);
        while let Some(cur) = next {
            chain.push(cur.to_string());
            next = cur.source();
        }
        self.record_value(field, chain.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.0.set_message(rendered);
        } else {
            self.record_value(field, rendered.into());
        }
    }
}

fn level_from_tracing(level: &tracing::Level) -> Level {
    match level.as_str() {
        "TRACE" | "DEBUG" => Level::Debug,
        "INFO" => Level::Info,
        "WARN" => Level::Warn,
        _ => Level::Error,
    }
}

#[cfg(test)]
mod test {
    use super::Layer;
    use crate::Logger;
    use chrono::TimeZone;
    use tracing_subscriber::prelude::*;

    #[tokio::test]
    async fn test_events_are_forwarded_as_internal_records() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::with_clock(dir.path(), || {
            chrono::Local.with_ymd_and_hms(2024, 5, 5, 12, 0, 0).unwrap()
        })
        .unwrap();

        {
            let _guard = tracing_subscriber::registry()
                .with(Layer::new(logger.clone()))
                .set_default();

            tracing::info!(port = 50051u32, trace_id = "trace-9", "server started");
            tracing::error!("backend unreachable");
        }
        logger.close().await;

        let stdout = std::fs::read_to_string(dir.path().join("stdout_2024-05-05.log")).unwrap();
        let lines: Vec<serde_json::Value> = stdout
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["msg"], "server started");
        assert_eq!(lines[0]["level"], "info");
        assert_eq!(lines[0]["caller_type"], "internal");
        assert_eq!(lines[0]["port"], 50051);
        assert_eq!(lines[0]["trace_id"], "trace-9");
        assert!(lines[0]["filepath"].as_str().unwrap().contains("layer.rs"));

        assert_eq!(lines[1]["level"], "error");
        let stderr = std::fs::read_to_string(dir.path().join("stderr_2024-05-05.log")).unwrap();
        assert_eq!(stderr.lines().count(), 1);
    }
}
