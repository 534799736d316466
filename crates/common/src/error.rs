/// The closed error taxonomy of the platform.
///
/// Every fallible operation across the registry and the log collector
/// surfaces one of these kinds. Kinds carry exactly the data needed to
/// render their message; causes are retained as `source` so that
/// [`derives_from`] can traverse arbitrary wrapping.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("error occurred when {op} config file [{path}]")]
    ConfigFileInitialize {
        path: String,
        op: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("error occurred when {op} log file [{path}]")]
    LogFileExecuting {
        path: String,
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("error occurred when initializing database [{user}@{host}:{port}/{database}]")]
    DatabaseInitialize {
        host: String,
        port: u16,
        database: String,
        user: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("error occurred when syncing database models {models:?}")]
    DatabaseSyncModels {
        models: Vec<String>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("restoration external response error, status {status}")]
    RestorationExternalResponse { status: u16 },
    #[error("get rpc client ip failed")]
    GetRpcClientIpFailed,
    #[error("unsupported network: {network}")]
    UnsupportedNetwork { network: String },
    #[error("invalid ip address: {addr}")]
    InvalidIpAddress { addr: String },
    #[error("invalid trace id")]
    InvalidTraceId,
    #[error("invalid version [{text}]")]
    InvalidVersion {
        text: String,
        #[source]
        source: VersionParseError,
    },
    #[error("error occurred when executing sql [{op}]")]
    ExecuteSql {
        op: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("instance out of max number, limit {limit}")]
    InstanceOutOfMaxNumber { limit: u32 },
    #[error("no available service [{service}] with [{version_or_name}]")]
    NoAvailableService {
        service: String,
        version_or_name: String,
    },
    #[error("no available instance of service [{service}] with min version [{min_version}]")]
    NoAvailableInstance {
        service: String,
        min_version: String,
    },
    #[error("application [{name}] not exists")]
    ApplicationNotExists { name: String },
    #[error("scope [{name}] not exists")]
    ScopeNotExists { name: String },
    #[error("user [{name}] already exists")]
    UserAlreadyExists { name: String },
    #[error("email [{email}] already in use")]
    EmailAlreadyInUse { email: String },
}

/// Why a version literal failed to parse.
#[derive(Debug, thiserror::Error)]
pub enum VersionParseError {
    #[error("expected four dot-separated components")]
    Components,
    #[error(transparent)]
    Number(#[from] std::num::ParseIntError),
}

impl Error {
    pub fn execute_sql<E>(op: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::ExecuteSql {
            op: op.into(),
            source: Box::new(source),
        }
    }

    /// Structural kind equality: two errors are equal when they are the
    /// same taxonomy kind, regardless of the data they carry.
    pub fn same_kind(&self, target: &Error) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(target)
    }
}

/// Whether `err`, or any cause in its `source()` chain, is a taxonomy
/// error of the same kind as `target`.
pub fn derives_from(err: &(dyn std::error::Error + 'static), target: &Error) -> bool {
    let mut next = Some(err);
    while let Some(cur) = next {
        if let Some(e) = cur.downcast_ref::<Error>() {
            if e.same_kind(target) {
                return true;
            }
        }
        next = cur.source();
    }
    false
}

#[cfg(test)]
mod test {
    use super::{derives_from, Error};

    #[test]
    fn test_same_kind_ignores_payload() {
        let a = Error::NoAvailableService {
            service: "a".to_string(),
            version_or_name: "1.0.0.0".to_string(),
        };
        let b = Error::NoAvailableService {
            service: "b".to_string(),
            version_or_name: "other".to_string(),
        };
        let c = Error::InvalidTraceId;

        assert!(a.same_kind(&b));
        assert!(!a.same_kind(&c));
    }

    #[test]
    fn test_derives_from_traverses_wrapping() {
        let inner = Error::InstanceOutOfMaxNumber { limit: 48 };
        let wrapped = anyhow::Error::new(inner)
            .context("failed to add instance")
            .context("failed to register service");

        let target = Error::InstanceOutOfMaxNumber { limit: 48 };
        let other = Error::GetRpcClientIpFailed;

        assert!(derives_from(wrapped.as_ref(), &target));
        assert!(!derives_from(wrapped.as_ref(), &other));
    }

    #[test]
    fn test_render_short_messages() {
        let err = Error::NoAvailableInstance {
            service: "alioth-restoration".to_string(),
            min_version: "2.0.0.0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no available instance of service [alioth-restoration] with min version [2.0.0.0]",
        );

        let err = Error::InstanceOutOfMaxNumber { limit: 48 };
        assert_eq!(err.to_string(), "instance out of max number, limit 48");
    }
}
