use common::Context;
use proto_alioth::RestorationCollectionRequest;

/// A log record under construction on the client side.
///
/// [`Fields::new`] captures the caller's code location, the current
/// timestamp and the context's trace id; the remaining mutations attach
/// structured data. Use the [`collection!`](crate::collection) macro to
/// also capture the enclosing function path.
pub struct Fields {
    service: String,
    code: String,
    level: String,
    message: String,
    called_at: String,
    called_function: String,
    trace_id: String,
    caller: String,
    input_fields: Option<serde_json::Value>,
    payload_fields: Option<serde_json::Value>,
    extra_fields: Option<serde_json::Value>,
    extra_kv: serde_json::Map<String, serde_json::Value>,
}

impl Fields {
    /// Start a record for `message`: the code path is the caller's
    /// `file:line`, the timestamp is now, and the trace id comes from
    /// the context when it carries one.
    #[track_caller]
    pub fn new(ctx: &Context, message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            service: String::new(),
            code: format!("{}:{}", location.file(), location.line()),
            level: String::new(),
            message: message.into(),
            called_at: chrono::Local::now()
                .format(crate::CALLED_AT_FORMAT)
                .to_string(),
            called_function: "unknown".to_string(),
            trace_id: ctx.trace_id_or_empty().to_string(),
            caller: String::new(),
            input_fields: None,
            payload_fields: None,
            extra_fields: None,
            extra_kv: Default::default(),
        }
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    pub fn with_service(mut self, name: &str) -> Self {
        self.service = name.to_string();
        self
    }

    pub fn with_caller(mut self, caller: &str) -> Self {
        self.caller = caller.to_string();
        self
    }

    pub fn with_function(mut self, function: &str) -> Self {
        self.called_function = function.to_string();
        self
    }

    /// Attach the arguments the caller was invoked with; they surface as
    /// `caller_arguments` in the persisted record.
    pub fn with_params(mut self, params: impl serde::Serialize) -> Self {
        self.input_fields = serde_json::to_value(params).ok();
        self
    }

    /// Attach intermediate processing state; surfaces as
    /// `caller_processing`.
    pub fn with_processing(mut self, processing: impl serde::Serialize) -> Self {
        self.payload_fields = serde_json::to_value(processing).ok();
        self
    }

    /// Attach arbitrary extra data; surfaces as `extra_data`.
    pub fn with_extra(mut self, extra: impl serde::Serialize) -> Self {
        self.extra_fields = serde_json::to_value(extra).ok();
        self
    }

    /// Attach a single extra key/value pair; merged into `extra_data`.
    pub fn with_extra_field(mut self, key: &str, value: impl serde::Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.extra_kv.insert(key.to_string(), value);
        }
        self
    }

    pub(crate) fn export(mut self, default_service: &str) -> RestorationCollectionRequest {
        if self.service.is_empty() {
            self.service = default_service.to_string();
        }

        // Key/value extras are folded into the extra blob.
        let extra_fields = match (self.extra_fields, self.extra_kv) {
            (extra, kv) if kv.is_empty() => extra,
            (Some(serde_json::Value::Object(mut fields)), kv) => {
                fields.extend(kv);
                Some(serde_json::Value::Object(fields))
            }
            (None, kv) => Some(serde_json::Value::Object(kv)),
            (Some(extra), kv) => {
                let mut fields = kv;
                fields.insert("extra".to_string(), extra);
                Some(serde_json::Value::Object(fields))
            }
        };

        let encode = |value: Option<serde_json::Value>| -> Vec<u8> {
            value
                .map(|v| serde_json::to_vec(&v).unwrap_or_default())
                .unwrap_or_default()
        };

        RestorationCollectionRequest {
            caller_service: self.service,
            code_path: self.code,
            level: self.level,
            message: self.message,
            called_at: self.called_at,
            called_function: self.called_function,
            trace_id: self.trace_id,
            input_fields: encode(self.input_fields),
            payload_fields: encode(self.payload_fields),
            extra_fields: encode(extra_fields),
        }
    }
}

/// Build a [`Fields`] record capturing the enclosing function path in
/// addition to the code location.
#[macro_export]
macro_rules! collection {
    ($ctx:expr, $message:expr) => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        let name = name.strip_suffix("::f").unwrap_or(name);
        $crate::client::Fields::new($ctx, $message).with_function(name)
    }};
}

#[cfg(test)]
mod test {
    use super::Fields;
    use common::Context;

    #[test]
    fn test_export_shape() {
        let ctx = Context::new().with_trace_id("trace-7");
        let request = Fields::new(&ctx, "something ran")
            .with_level("info")
            .with_params(serde_json::json!({"user": "u-1"}))
            .with_processing(serde_json::json!({"step": 2}))
            .with_extra_field("elapsed_ms", 12)
            .export("fallback-service");

        assert_eq!(request.caller_service, "fallback-service");
        assert_eq!(request.level, "info");
        assert_eq!(request.message, "something ran");
        assert_eq!(request.trace_id, "trace-7");
        assert!(request.code_path.contains("fields.rs:"));

        let args: serde_json::Value = serde_json::from_slice(&request.input_fields).unwrap();
        assert_eq!(args["user"], "u-1");
        let processing: serde_json::Value =
            serde_json::from_slice(&request.payload_fields).unwrap();
        assert_eq!(processing["step"], 2);
        let extra: serde_json::Value = serde_json::from_slice(&request.extra_fields).unwrap();
        assert_eq!(extra["elapsed_ms"], 12);

        // The timestamp round-trips through the pinned format.
        let parsed = chrono::DateTime::parse_from_str(&request.called_at, crate::CALLED_AT_FORMAT);
        assert!(parsed.is_ok(), "called_at was {:?}", request.called_at);
    }

    #[test]
    fn test_explicit_service_wins_over_default() {
        let request = Fields::new(&Context::new(), "m")
            .with_service("explicit")
            .export("fallback");
        assert_eq!(request.caller_service, "explicit");
        assert_eq!(request.trace_id, "");
        assert!(request.input_fields.is_empty());
    }

    #[test]
    fn test_collection_macro_captures_function() {
        let request = crate::collection!(&Context::new(), "from macro")
            .with_level("debug")
            .export("svc");
        assert!(
            request
                .called_function
                .contains("test_collection_macro_captures_function"),
            "called_function was {:?}",
            request.called_function,
        );
    }
}
