use crate::Collection;
use common::Context;
use journal::{CallerType, Logger};
use proto_alioth::RestorationCollectionRequest;

/// The collector service: tags incoming records with their provenance
/// and submits them to the journal writer.
///
/// Collection is best-effort by contract. Both operations always
/// succeed from the caller's view; the writer absorbs its own I/O
/// failures, so the collector never becomes a back-pressure point for
/// application code beyond the bounded queue.
pub struct Service {
    logger: Logger,
}

impl Service {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    /// Collect a record arriving over the binary RPC transport from a
    /// peer service.
    pub async fn collect_internal(&self, ctx: &Context, request: RestorationCollectionRequest) {
        self.logger
            .log(Collection::from_request(ctx, request, CallerType::Service))
            .await;
    }

    /// Collect a record arriving over the HTTP transport from an
    /// untrusted external sender.
    pub async fn collect_external(&self, ctx: &Context, request: RestorationCollectionRequest) {
        self.logger
            .log(Collection::from_request(ctx, request, CallerType::External))
            .await;
    }
}

#[cfg(test)]
mod test {
    use super::Service;
    use chrono::TimeZone;
    use common::Context;
    use journal::Logger;
    use proto_alioth::RestorationCollectionRequest;

    #[tokio::test]
    async fn test_collect_routes_to_journal() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::with_clock(dir.path(), || {
            chrono::Local.with_ymd_and_hms(2024, 5, 5, 12, 0, 0).unwrap()
        })
        .unwrap();
        let service = Service::new(logger.clone());

        let ctx = Context::new().with_peer("10.0.0.5:50051".parse().unwrap());
        service
            .collect_internal(
                &ctx,
                RestorationCollectionRequest {
                    caller_service: "peer".to_string(),
                    level: "error".to_string(),
                    message: "peer failure".to_string(),
                    ..Default::default()
                },
            )
            .await;
        service
            .collect_external(
                &Context::new(),
                RestorationCollectionRequest {
                    level: "info".to_string(),
                    message: "external hello".to_string(),
                    ..Default::default()
                },
            )
            .await;
        logger.close().await;

        let stdout = std::fs::read_to_string(dir.path().join("stdout_2024-05-05.log")).unwrap();
        let lines: Vec<serde_json::Value> = stdout
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["caller_type"], "service");
        assert_eq!(lines[0]["caller_ip"], "10.0.0.5");
        assert_eq!(lines[0]["level"], "error");
        assert_eq!(lines[1]["caller_type"], "external");
        assert_eq!(lines[1]["caller_service"], "unregistered-service");

        // The error record is mirrored to the stderr stream.
        let stderr = std::fs::read_to_string(dir.path().join("stderr_2024-05-05.log")).unwrap();
        assert_eq!(stderr.lines().count(), 1);
    }
}
