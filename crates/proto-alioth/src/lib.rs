// Wire types of the Alioth platform.
//
// `src/alioth.rs` is generated from `proto/alioth.proto` with serde derives
// attached to every message, so the same types serve both the binary RPC
// transport and the JSON-over-HTTP surface.

mod alioth;
pub use alioth::*;

/// Serde helpers mapping protobuf `bytes` fields to base64 strings in JSON,
/// matching the canonical protobuf JSON encoding.
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&base64::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        base64::decode(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::RestorationCollectionRequest;

    #[test]
    fn test_collection_request_json_round_trip() {
        let request = RestorationCollectionRequest {
            caller_service: "alioth-example".to_string(),
            code_path: "src/main.rs:42".to_string(),
            level: "info".to_string(),
            message: "hello".to_string(),
            called_at: "2024.01.02-03:04:05.678+00:00".to_string(),
            called_function: "example::main".to_string(),
            trace_id: "0f8fad5b-d9cb-469f-a165-70867728950e".to_string(),
            input_fields: br#"{"answer":42}"#.to_vec(),
            payload_fields: Vec::new(),
            extra_fields: Vec::new(),
        };

        let encoded = serde_json::to_value(&request).unwrap();
        // Blobs travel as base64 strings, not integer arrays.
        assert_eq!(
            encoded["input_fields"],
            serde_json::json!(base64::encode(br#"{"answer":42}"#))
        );

        let decoded: RestorationCollectionRequest =
            serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_collection_request_tolerates_missing_fields() {
        let decoded: RestorationCollectionRequest =
            serde_json::from_str(r#"{"message":"sparse","level":"warn"}"#).unwrap();
        assert_eq!(decoded.message, "sparse");
        assert_eq!(decoded.level, "warn");
        assert_eq!(decoded.caller_service, "");
        assert!(decoded.input_fields.is_empty());
    }
}
