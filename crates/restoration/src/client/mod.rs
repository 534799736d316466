//! Client library for shipping log records to a collector.
//!
//! Two flavours exist: [`RpcCollector`] talks the binary RPC transport
//! fire-and-forget, surfacing repeated transport failures only through a
//! user callback; [`ExternalCollector`] talks the HTTP surface and logs
//! its own submission failures through the local journal. Every
//! submission runs on its own task, so callers are never blocked on the
//! network.

mod fields;
pub use fields::Fields;

use common::Error;
use journal::{CallerType, Entry, Level, Logger};
use proto_alioth::alioth_restoration_client::AliothRestorationClient;
use proto_alioth::RestorationCollectionRequest;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Failure threshold applied when none is configured; effectively never
/// reached.
const DEFAULT_MAX_FAILED: u32 = 1 << 31;

/// Invoked with the transport error once the failure counter reaches
/// its threshold.
pub type FailedCallback = Box<dyn Fn(tonic::Status) + Send + Sync>;

/// The level methods shared by both collector flavours.
pub trait Collector: Send + Sync {
    fn debug(&self, fields: Fields);
    fn info(&self, fields: Fields);
    fn warn(&self, fields: Fields);
    fn error(&self, fields: Fields);
}

/// Fire-and-forget collector over the binary RPC transport.
///
/// The collector itself never logs: the configured callback is the only
/// surface on which transport failures become visible.
#[derive(Clone)]
pub struct RpcCollector {
    inner: Arc<RpcInner>,
}

struct RpcInner {
    client: AliothRestorationClient<tonic::transport::Channel>,
    service_name: String,
    timeout: Duration,
    failed: AtomicU32,
    max_failed: u32,
    failed_callback: Option<FailedCallback>,
}

impl RpcCollector {
    /// Connect lazily to `addr` (`ip:port`, or a full endpoint URI). The
    /// address is not probed; submission failures surface only through
    /// the failure callback, of which there is none here.
    pub fn new(
        service_name: impl Into<String>,
        addr: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Self::build(service_name, addr, timeout, 0, None)
    }

    /// Like [`RpcCollector::new`], with a failure callback invoked every
    /// time `max_failed` transport errors have accumulated. A
    /// `max_failed` of zero keeps the default, effectively-infinite
    /// threshold.
    pub fn with_failed_callback<F>(
        service_name: impl Into<String>,
        addr: &str,
        timeout: Duration,
        max_failed: u32,
        callback: F,
    ) -> anyhow::Result<Self>
    where
        F: Fn(tonic::Status) + Send + Sync + 'static,
    {
        Self::build(service_name, addr, timeout, max_failed, Some(Box::new(callback)))
    }

    fn build(
        service_name: impl Into<String>,
        addr: &str,
        timeout: Duration,
        max_failed: u32,
        failed_callback: Option<FailedCallback>,
    ) -> anyhow::Result<Self> {
        let uri = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        };
        let channel = tonic::transport::Endpoint::from_shared(uri)?.connect_lazy();

        Ok(Self {
            inner: Arc::new(RpcInner {
                client: AliothRestorationClient::new(channel),
                service_name: service_name.into(),
                timeout,
                failed: AtomicU32::new(0),
                max_failed: if max_failed > 0 {
                    max_failed
                } else {
                    DEFAULT_MAX_FAILED
                },
                failed_callback,
            }),
        })
    }

    fn submit(&self, fields: Fields) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let request = fields.export(&inner.service_name);
            inner.execute(request).await;
        });
    }
}

impl RpcInner {
    async fn execute(&self, request: RestorationCollectionRequest) {
        let mut client = self.client.clone();
        let outcome =
            tokio::time::timeout(self.timeout, client.restoration_collection(request)).await;

        let status = match outcome {
            Err(_elapsed) => tonic::Status::deadline_exceeded("restoration collection timed out"),
            Ok(Err(status)) => status,
            Ok(Ok(_)) => return,
        };

        let failed = self.failed.fetch_add(1, Ordering::SeqCst) + 1;
        if failed >= self.max_failed {
            if let Some(callback) = &self.failed_callback {
                callback(status);
            }
            self.failed.store(0, Ordering::SeqCst);
        }
    }
}

impl Collector for RpcCollector {
    fn debug(&self, fields: Fields) {
        self.submit(fields.with_level("debug"));
    }

    fn info(&self, fields: Fields) {
        self.submit(fields.with_level("info"));
    }

    fn warn(&self, fields: Fields) {
        self.submit(fields.with_level("warn"));
    }

    fn error(&self, fields: Fields) {
        self.submit(fields.with_level("error"));
    }
}

/// Collector over the HTTP surface, for senders outside the mesh.
///
/// Construction probes the endpoint's ping route and fails unless it
/// answers 200. Unlike the RPC flavour, submission failures are logged
/// through the local journal's error stream.
#[derive(Clone)]
pub struct ExternalCollector {
    inner: Arc<ExternalInner>,
}

struct ExternalInner {
    http: reqwest::Client,
    collection_url: String,
    service_name: String,
    logger: Logger,
}

impl ExternalCollector {
    pub async fn new(
        service_name: impl Into<String>,
        endpoint: &str,
        timeout: Duration,
        logger: Logger,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base = endpoint.trim_end_matches('/');

        let response = http.get(format!("{base}/restoration/ping")).send().await?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(Error::RestorationExternalResponse {
                status: response.status().as_u16(),
            }
            .into());
        }

        Ok(Self {
            inner: Arc::new(ExternalInner {
                http,
                collection_url: format!("{base}/restoration/collection"),
                service_name: service_name.into(),
                logger,
            }),
        })
    }

    fn submit(&self, fields: Fields) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let request = fields.export(&inner.service_name);
            if let Err(err) = inner.execute(&request).await {
                inner
                    .logger
                    .log(
                        Entry::new("log external error")
                            .with_level(Level::Error)
                            .with_caller(CallerType::Module)
                            .with_extra(serde_json::json!({ "error": err.to_string() })),
                    )
                    .await;
            }
        });
    }
}

impl ExternalInner {
    async fn execute(&self, request: &RestorationCollectionRequest) -> anyhow::Result<()> {
        let response = self
            .http
            .post(&self.collection_url)
            .json(request)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(Error::RestorationExternalResponse {
                status: response.status().as_u16(),
            }
            .into());
        }
        Ok(())
    }
}

impl Collector for ExternalCollector {
    fn debug(&self, fields: Fields) {
        self.submit(fields.with_level("debug"));
    }

    fn info(&self, fields: Fields) {
        self.submit(fields.with_level("info"));
    }

    fn warn(&self, fields: Fields) {
        self.submit(fields.with_level("warn"));
    }

    fn error(&self, fields: Fields) {
        self.submit(fields.with_level("error"));
    }
}

#[cfg(test)]
mod test {
    use super::{Collector, Fields, RpcCollector};
    use common::Context;
    use std::time::Duration;

    #[tokio::test]
    async fn test_failed_callback_fires_at_threshold() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        // Nothing listens on this endpoint; every submission fails.
        let collector = RpcCollector::with_failed_callback(
            "test-service",
            "127.0.0.1:1",
            Duration::from_secs(5),
            1,
            move |status| {
                let _ = tx.send(status);
            },
        )
        .unwrap();

        collector.info(Fields::new(&Context::new(), "doomed"));

        let status = tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("callback should fire")
            .expect("callback sender is alive");
        assert_ne!(status.code(), tonic::Code::Ok);
        // A single submission fires the callback exactly once.
        assert!(rx.try_recv().is_err());

        // The counter reset: the next failure fires the callback again.
        collector.error(Fields::new(&Context::new(), "doomed again"));
        tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("callback should fire again")
            .expect("callback sender is alive");
    }
}
