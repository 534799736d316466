//! The process-wide structured log sink.
//!
//! A [`Logger`] accepts [`Record`]s through a bounded queue; a single
//! writer task drains the queue into daily-rotated, newline-delimited
//! JSON files. Producers never touch the files themselves.

pub mod exit;
pub mod layer;
mod writer;

pub use writer::Logger;

/// Severity of a journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Panic,
}

impl Level {
    /// Canonicalise an externally supplied level. Unknown inputs map to
    /// `Info`; `panic` is deliberately not accepted from the outside, so
    /// remote callers cannot terminate the writer.
    pub fn parse(text: &str) -> Level {
        match text.to_ascii_lowercase().as_str() {
            "debug" => Level::Debug,
            "info" => Level::Info,
            "warn" | "warning" => Level::Warn,
            "error" => Level::Error,
            _ => Level::Info,
        }
    }

    /// The level string written to disk. `Warn` is persisted as
    /// `warning`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warning",
            Level::Error => "error",
            Level::Panic => "panic",
        }
    }
}

/// Provenance of a journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerType {
    /// Framework code of this process.
    Internal,
    /// A library hosted inside this process.
    Module,
    /// A peer service over the binary RPC transport.
    Service,
    /// An untrusted peer over the HTTP transport.
    External,
}

impl CallerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallerType::Internal => "internal",
            CallerType::Module => "module",
            CallerType::Service => "service",
            CallerType::External => "external",
        }
    }
}

/// A structured record submitted to the [`Logger`].
///
/// The writer serializes each record as one JSON object per line with
/// the reserved keys `time`, `level` and `msg`, merged with every key
/// the record encodes for itself.
pub trait Record: Send + 'static {
    fn level(&self) -> Level;
    fn message(&self) -> &str;
    fn encode_payload(&self) -> serde_json::Map<String, serde_json::Value>;
}

/// The journal's own record type, used for internal diagnostics and by
/// the tracing bridge layer.
#[derive(Debug)]
pub struct Entry {
    level: Level,
    caller: CallerType,
    message: String,
    code_path: String,
    function: Option<String>,
    trace_id: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
    extra: Option<serde_json::Value>,
}

impl Entry {
    /// Start a record; the code path is captured from the caller.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            level: Level::Info,
            caller: CallerType::Internal,
            message: message.into(),
            code_path: format!("{}:{}", location.file(), location.line()),
            function: None,
            trace_id: None,
            fields: Default::default(),
            extra: None,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_caller(mut self, caller: CallerType) -> Self {
        self.caller = caller;
        self
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn with_code_path(mut self, code_path: impl Into<String>) -> Self {
        self.code_path = code_path.into();
        self
    }

    pub fn with_context(mut self, ctx: &common::Context) -> Self {
        if let Ok(trace_id) = ctx.trace_id() {
            self.trace_id = Some(trace_id.to_string());
        }
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }

    pub(crate) fn set_message(&mut self, message: String) {
        self.message = message;
    }

    pub(crate) fn set_field(&mut self, key: String, value: serde_json::Value) {
        self.fields.insert(key, value);
    }

    pub(crate) fn set_trace_id(&mut self, trace_id: String) {
        self.trace_id = Some(trace_id);
    }
}

impl Record for Entry {
    fn level(&self) -> Level {
        self.level
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn encode_payload(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut payload = self.fields.clone();
        payload.insert("caller_type".to_string(), self.caller.as_str().into());
        payload.insert("filepath".to_string(), self.code_path.clone().into());
        if let Some(function) = &self.function {
            payload.insert("function".to_string(), function.clone().into());
        }
        if let Some(trace_id) = &self.trace_id {
            payload.insert("trace_id".to_string(), trace_id.clone().into());
        }
        if let Some(extra) = &self.extra {
            payload.insert("extra".to_string(), extra.clone());
        }
        payload
    }
}
