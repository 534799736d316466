use crate::error::Error;

/// Per-request context threaded through service operations.
///
/// Carries the request's trace id and, when the request arrived over a
/// network transport, the peer address. The trace id is only ever read
/// and written through the typed accessors here, so producers and
/// consumers cannot disagree about how it is keyed.
#[derive(Debug, Clone, Default)]
pub struct Context {
    trace_id: Option<String>,
    peer_addr: Option<std::net::SocketAddr>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the transport peer of this request.
    pub fn with_peer(mut self, addr: std::net::SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    /// Record the transport peer when the transport reported one.
    pub fn with_peer_opt(mut self, addr: Option<std::net::SocketAddr>) -> Self {
        self.peer_addr = addr;
        self
    }

    /// Record a textual `ip:port` peer, as reported by proxies and HTTP
    /// metadata.
    pub fn with_peer_text(mut self, addr: &str) -> Result<Self, Error> {
        let parsed: std::net::SocketAddr = addr.parse().map_err(|_| Error::InvalidIpAddress {
            addr: addr.to_string(),
        })?;
        self.peer_addr = Some(parsed);
        Ok(self)
    }

    /// Bind an explicit trace id, replacing any carried one.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Ensure the context carries a trace id: a context that already has
    /// a non-empty one is returned unchanged, otherwise a fresh UUIDv4
    /// is bound.
    pub fn attach(self) -> Self {
        match &self.trace_id {
            Some(id) if !id.is_empty() => self,
            _ => Self {
                trace_id: Some(uuid::Uuid::new_v4().to_string()),
                ..self
            },
        }
    }

    /// The trace id carried by this context.
    pub fn trace_id(&self) -> Result<&str, Error> {
        match &self.trace_id {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(Error::InvalidTraceId),
        }
    }

    /// The trace id, or empty when none is carried.
    pub fn trace_id_or_empty(&self) -> &str {
        self.trace_id().unwrap_or_default()
    }

    /// The IPv4 address of the transport peer.
    pub fn client_ip(&self) -> Result<String, Error> {
        match self.peer_addr {
            None => Err(Error::GetRpcClientIpFailed),
            Some(std::net::SocketAddr::V4(addr)) => Ok(addr.ip().to_string()),
            Some(std::net::SocketAddr::V6(_)) => Err(Error::UnsupportedNetwork {
                network: "tcp6".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Context;
    use crate::error::Error;

    #[test]
    fn test_attach_is_idempotent() {
        let ctx = Context::new().attach();
        let trace = ctx.trace_id().unwrap().to_string();

        // A second attach keeps the bound id.
        let ctx = ctx.attach();
        assert_eq!(ctx.trace_id().unwrap(), trace);

        // An empty id counts as absent.
        let ctx = Context::new().with_trace_id("").attach();
        assert!(!ctx.trace_id().unwrap().is_empty());
    }

    #[test]
    fn test_trace_id_missing() {
        assert!(matches!(
            Context::new().trace_id(),
            Err(Error::InvalidTraceId)
        ));
        assert_eq!(Context::new().trace_id_or_empty(), "");
    }

    #[test]
    fn test_client_ip() {
        let ctx = Context::new().with_peer("10.0.0.5:50051".parse().unwrap());
        assert_eq!(ctx.client_ip().unwrap(), "10.0.0.5");

        assert!(matches!(
            Context::new().client_ip(),
            Err(Error::GetRpcClientIpFailed)
        ));
        let ctx = Context::new().with_peer("[::1]:50051".parse().unwrap());
        assert!(matches!(
            ctx.client_ip(),
            Err(Error::UnsupportedNetwork { .. })
        ));
        assert!(matches!(
            Context::new().with_peer_text("not-an-address"),
            Err(Error::InvalidIpAddress { .. })
        ));
    }
}
