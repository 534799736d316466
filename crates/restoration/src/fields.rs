use common::Context;
use journal::{CallerType, Level, Record};
use proto_alioth::RestorationCollectionRequest;

/// A collected log record, decoded from a wire request and tagged with
/// its provenance. This is what the collector service submits to the
/// journal writer.
pub struct Collection {
    caller_ip: String,
    caller_service: String,
    code_path: String,
    level: Level,
    caller: CallerType,
    message: String,
    called_at: String,
    called_function: String,
    trace_id: String,
    input_fields: Vec<u8>,
    payload_fields: Vec<u8>,
    extra_fields: Vec<u8>,
}

impl Collection {
    /// Build a record from a wire request. The caller IP is taken from
    /// the request context, best-effort: records without a resolvable
    /// peer simply omit it.
    pub fn from_request(
        ctx: &Context,
        request: RestorationCollectionRequest,
        caller: CallerType,
    ) -> Self {
        let caller_service = if request.caller_service.is_empty() {
            crate::UNREGISTERED_SERVICE.to_string()
        } else {
            request.caller_service
        };

        Self {
            caller_ip: ctx.client_ip().unwrap_or_default(),
            caller_service,
            code_path: request.code_path,
            level: Level::parse(&request.level),
            caller,
            message: request.message,
            called_at: request.called_at,
            called_function: request.called_function,
            trace_id: request.trace_id,
            input_fields: request.input_fields,
            payload_fields: request.payload_fields,
            extra_fields: request.extra_fields,
        }
    }
}

impl Record for Collection {
    fn level(&self) -> Level {
        self.level
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn encode_payload(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut payload = serde_json::Map::new();
        payload.insert("caller_service".to_string(), self.caller_service.clone().into());
        payload.insert("code_path".to_string(), self.code_path.clone().into());
        payload.insert("called_at".to_string(), self.called_at.clone().into());
        payload.insert(
            "called_function".to_string(),
            self.called_function.clone().into(),
        );
        payload.insert("caller_type".to_string(), self.caller.as_str().into());

        if !self.trace_id.is_empty() {
            payload.insert("trace_id".to_string(), self.trace_id.clone().into());
        }
        if !self.caller_ip.is_empty() {
            payload.insert("caller_ip".to_string(), self.caller_ip.clone().into());
        }

        // The three opaque blobs become structured payload keys when they
        // hold valid JSON; malformed blobs are dropped rather than failing
        // the record.
        for (key, blob) in [
            ("caller_arguments", &self.input_fields),
            ("caller_processing", &self.payload_fields),
            ("extra_data", &self.extra_fields),
        ] {
            if blob.is_empty() {
                continue;
            }
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(blob) {
                payload.insert(key.to_string(), value);
            }
        }

        payload
    }
}

#[cfg(test)]
mod test {
    use super::Collection;
    use common::Context;
    use journal::{CallerType, Level, Record};
    use proto_alioth::RestorationCollectionRequest;

    fn request() -> RestorationCollectionRequest {
        RestorationCollectionRequest {
            caller_service: "alioth-example".to_string(),
            code_path: "src/api.rs:10".to_string(),
            level: "warn".to_string(),
            message: "slow request".to_string(),
            called_at: "2024.05.05-12:00:00.123+00:00".to_string(),
            called_function: "api::handle".to_string(),
            trace_id: "trace-3".to_string(),
            input_fields: br#"{"user":"u-1"}"#.to_vec(),
            payload_fields: Vec::new(),
            extra_fields: b"not json".to_vec(),
        }
    }

    #[test]
    fn test_payload_shape() {
        let ctx = Context::new().with_peer("10.0.0.5:50051".parse().unwrap());
        let collection = Collection::from_request(&ctx, request(), CallerType::Service);

        assert_eq!(collection.level(), Level::Warn);
        assert_eq!(collection.message(), "slow request");

        let payload = collection.encode_payload();
        assert_eq!(payload["caller_service"], "alioth-example");
        assert_eq!(payload["caller_type"], "service");
        assert_eq!(payload["caller_ip"], "10.0.0.5");
        assert_eq!(payload["trace_id"], "trace-3");
        assert_eq!(payload["caller_arguments"]["user"], "u-1");
        // Empty and malformed blobs are omitted.
        assert!(!payload.contains_key("caller_processing"));
        assert!(!payload.contains_key("extra_data"));
    }

    #[test]
    fn test_defaults_without_peer_or_service() {
        let mut req = request();
        req.caller_service = String::new();
        req.trace_id = String::new();
        req.level = "made-up".to_string();

        let collection = Collection::from_request(&Context::new(), req, CallerType::External);

        assert_eq!(collection.level(), Level::Info);
        let payload = collection.encode_payload();
        assert_eq!(payload["caller_service"], "unregistered-service");
        assert_eq!(payload["caller_type"], "external");
        assert!(!payload.contains_key("caller_ip"));
        assert!(!payload.contains_key("trace_id"));
    }
}
