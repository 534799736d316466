use common::Error;
use serde::Deserialize;

/// The single configuration document, read once at start-up.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub grpc: GrpcConfig,
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub log: LogConfig,
    pub stellar: StellarConfig,
    pub restoration: RestorationConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GrpcConfig {
    pub listen_ip: String,
    pub listen_port: u16,
    pub timeout_seconds: u64,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            listen_ip: "0.0.0.0".to_string(),
            listen_port: 50051,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub listen_ip: String,
    pub listen_port: u16,
    pub timeout_seconds: u64,
    /// Prefix under which the HTTP/JSON surface is mounted.
    pub route_prefix: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_ip: "0.0.0.0".to_string(),
            listen_port: 8080,
            timeout_seconds: 10,
            route_prefix: "/external".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub max_idle: u32,
    pub max_open: u32,
    pub debug_mode: bool,
    pub sync_models: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: String::new(),
            database: "alioth".to_string(),
            max_idle: 2,
            max_open: 10,
            debug_mode: false,
            sync_models: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Override for the key prefix of the key/value registry backend.
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: String::new(),
            key_prefix: "alioth".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub output_dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output_dir: "logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StellarConfig {
    /// Registry backend selector: `postgres` or `redis`.
    pub storage: String,
    /// Per-module log directory; empty means the shared journal.
    pub logger: String,
}

impl Default for StellarConfig {
    fn default() -> Self {
        Self {
            storage: "postgres".to_string(),
            logger: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestorationConfig {
    /// Per-module log directory; empty means the shared journal.
    pub logger: String,
}

impl Default for RestorationConfig {
    fn default() -> Self {
        Self {
            logger: "logs/restoration".to_string(),
        }
    }
}

/// Security parameters of the user module. Parsed so deployments can
/// already carry them; the module itself lives outside this server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub activation_code_ttl_seconds: u64,
    pub access_token_ttl_seconds: u64,
    pub refresh_token_ttl_seconds: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            activation_code_ttl_seconds: 1800,
            access_token_ttl_seconds: 7200,
            refresh_token_ttl_seconds: 604800,
        }
    }
}

/// Read and parse the configuration document at `path`.
pub fn load(path: &str) -> Result<Config, Error> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigFileInitialize {
        path: path.to_string(),
        op: "read",
        source: Box::new(source),
    })?;

    serde_yaml::from_str(&text).map_err(|source| Error::ConfigFileInitialize {
        path: path.to_string(),
        op: "parse",
        source: Box::new(source),
    })
}

#[cfg(test)]
mod test {
    use super::Config;

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.grpc.listen_port, 50051);
        assert_eq!(config.http.route_prefix, "/external");
        assert_eq!(config.stellar.storage, "postgres");
        assert_eq!(config.redis.key_prefix, "alioth");
        assert_eq!(config.restoration.logger, "logs/restoration");
    }

    #[test]
    fn test_partial_document() {
        let config: Config = serde_yaml::from_str(
            r#"
            grpc:
              listen_port: 50052
            stellar:
              storage: redis
            database:
              host: db.internal
              sync_models: true
            "#,
        )
        .unwrap();

        assert_eq!(config.grpc.listen_port, 50052);
        // Unset keys of a present section keep their defaults.
        assert_eq!(config.grpc.listen_ip, "0.0.0.0");
        assert_eq!(config.stellar.storage, "redis");
        assert_eq!(config.database.host, "db.internal");
        assert!(config.database.sync_models);
        assert_eq!(config.database.port, 5432);
    }
}
