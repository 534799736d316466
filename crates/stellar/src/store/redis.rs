use super::{free_slot, handler_name, Instance, InstanceStore};
use common::{version::ALPHA_VERSION, Context, Error, Version};
use redis::AsyncCommands;

/// The key/value backend, persisting instances as JSON members of Redis
/// sets.
///
/// Key layout under the configured prefix:
///   `{prefix}:{service}:versions`  — set of version tokens of the service
///   `{prefix}:{service}:{token}`   — set of JSON-encoded instances
///
/// The backend holds no local locks; it relies on the store's atomic set
/// operations. Instances are indexed by handler name: removal re-reads
/// the per-version members to find the matching record.
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
    key_prefix: String,
}

impl RedisStore {
    pub async fn connect(
        host: &str,
        port: u16,
        password: Option<&str>,
        key_prefix: impl Into<String>,
    ) -> Result<Self, Error> {
        let url = match password {
            Some(password) if !password.is_empty() => {
                format!("redis://:{password}@{host}:{port}/")
            }
            _ => format!("redis://{host}:{port}/"),
        };

        let initialize_error = |source: redis::RedisError| Error::DatabaseInitialize {
            host: host.to_string(),
            port,
            database: "redis".to_string(),
            user: String::new(),
            source: Box::new(source),
        };

        let client = redis::Client::open(url).map_err(initialize_error)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(initialize_error)?;

        Ok(Self {
            conn,
            key_prefix: key_prefix.into(),
        })
    }

    fn versions_key(&self, service: &str) -> String {
        format!("{}:{service}:versions", self.key_prefix)
    }

    fn instances_key(&self, service: &str, version: Version) -> String {
        format!("{}:{service}:{version}", self.key_prefix)
    }

    async fn members_of(
        &self,
        conn: &mut redis::aio::ConnectionManager,
        key: &str,
    ) -> Result<Vec<(String, Instance)>, Error> {
        let members: Vec<String> = conn
            .smembers(key)
            .await
            .map_err(|e| Error::execute_sql("SMembers", e))?;

        members
            .into_iter()
            .map(|member| {
                let instance: Instance = serde_json::from_str(&member)
                    .map_err(|e| Error::execute_sql("JsonUnmarshal", e))?;
                Ok((member, instance))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl InstanceStore for RedisStore {
    async fn add_instance(
        &self,
        ctx: &Context,
        service: &str,
        version: Version,
        ip: &str,
        port: i32,
    ) -> Result<Instance, Error> {
        let mut conn = self.conn.clone();
        let versions_key = self.versions_key(service);
        let instances_key = self.instances_key(service, version);
        let token = version.to_string();

        let known_version: bool = conn
            .sismember(&versions_key, &token)
            .await
            .map_err(|e| Error::execute_sql("SIsMember", e))?;
        if !known_version {
            let _: i64 = conn
                .sadd(&versions_key, &token)
                .await
                .map_err(|e| Error::execute_sql("SAdd", e))?;
        }

        let members = self.members_of(&mut conn, &instances_key).await?;
        let Some(slot) = free_slot(members.iter().map(|(_, i)| i.name.as_str())) else {
            tracing::error!(
                service,
                version = %version,
                trace_id = ctx.trace_id_or_empty(),
                "instance out of max number"
            );
            return Err(Error::InstanceOutOfMaxNumber { limit: 48 });
        };

        let now = chrono::Utc::now();
        let instance = Instance {
            address: format!("{ip}:{port}"),
            name: handler_name(service, version, slot),
            service: service.to_string(),
            version: version.encode_db(),
            created_at: now,
            updated_at: now,
        };
        let encoded =
            serde_json::to_string(&instance).map_err(|e| Error::execute_sql("JsonMarshal", e))?;
        let _: i64 = conn
            .sadd(&instances_key, encoded)
            .await
            .map_err(|e| Error::execute_sql("SAdd", e))?;

        tracing::info!(
            service,
            name = %instance.name,
            trace_id = ctx.trace_id_or_empty(),
            "instance registered"
        );
        Ok(instance)
    }

    async fn remove_instance(
        &self,
        ctx: &Context,
        service: &str,
        name: &str,
    ) -> Result<(), Error> {
        let not_available = || Error::NoAvailableService {
            service: service.to_string(),
            version_or_name: name.to_string(),
        };

        let version = Version::from_instance_name(name).map_err(|_| not_available())?;
        let mut conn = self.conn.clone();
        let instances_key = self.instances_key(service, version);

        let exists: bool = conn
            .exists(&instances_key)
            .await
            .map_err(|e| Error::execute_sql("Exists", e))?;
        if !exists {
            return Err(not_available());
        }

        let members = self.members_of(&mut conn, &instances_key).await?;
        let Some((member, _)) = members.iter().find(|(_, i)| i.name == name) else {
            return Err(not_available());
        };
        let _: i64 = conn
            .srem(&instances_key, member)
            .await
            .map_err(|e| Error::execute_sql("SRem", e))?;

        // Drop the version token once its last instance is gone.
        let remaining: i64 = conn
            .scard(&instances_key)
            .await
            .map_err(|e| Error::execute_sql("SCard", e))?;
        if remaining == 0 {
            let _: i64 = conn
                .srem(self.versions_key(service), version.to_string())
                .await
                .map_err(|e| Error::execute_sql("SRem", e))?;
        }

        tracing::info!(
            service,
            name,
            trace_id = ctx.trace_id_or_empty(),
            "instance removed"
        );
        Ok(())
    }

    async fn find_instance(
        &self,
        ctx: &Context,
        service: &str,
        min_version: Version,
    ) -> Result<Vec<Instance>, Error> {
        let mut conn = self.conn.clone();
        let versions_key = self.versions_key(service);

        // An unregistered service reads as an empty versions set and
        // yields an empty answer, matching the relational backend.
        let tokens: Vec<String> = conn
            .smembers(&versions_key)
            .await
            .map_err(|e| Error::execute_sql("SMembers", e))?;

        let mut instances = Vec::new();
        for token in tokens {
            let version = match Version::parse(&token) {
                Ok(version) => version,
                Err(err) => {
                    tracing::warn!(service, %token, %err, "skipping unparseable version token");
                    continue;
                }
            };
            if version < min_version {
                continue;
            }
            let members = self
                .members_of(&mut conn, &self.instances_key(service, version))
                .await?;
            instances.extend(members.into_iter().map(|(_, instance)| instance));
        }

        tracing::debug!(
            service,
            min_version = %min_version,
            matches = instances.len(),
            trace_id = ctx.trace_id_or_empty(),
            "instance lookup"
        );
        Ok(instances)
    }

    async fn list_instances(
        &self,
        ctx: &Context,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Instance>, Error> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}:*:versions", self.key_prefix);

        // SCAN the version marker keys to enumerate known services.
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| Error::execute_sql("Scan", e))?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        let mut instances = Vec::new();
        for key in keys {
            let service = key
                .strip_prefix(&format!("{}:", self.key_prefix))
                .and_then(|rest| rest.strip_suffix(":versions"))
                .unwrap_or_default()
                .to_string();
            if service.is_empty() {
                continue;
            }
            instances.extend(self.find_instance(ctx, &service, ALPHA_VERSION).await?);
        }

        // Deterministic paging over an unordered store.
        instances.sort_by(|a, b| (&a.service, &a.name).cmp(&(&b.service, &b.name)));
        let offset = offset.max(0) as usize;
        let limit = limit.max(0) as usize;
        Ok(instances.into_iter().skip(offset).take(limit).collect())
    }
}

// Runs against a live redis: `cargo test -- --ignored` with one
// listening on localhost.
#[cfg(test)]
mod test {
    use super::RedisStore;
    use crate::store::InstanceStore;
    use common::{Context, Error, Version};

    #[tokio::test]
    #[ignore = "requires a redis server on 127.0.0.1:6379"]
    async fn test_register_remove_find_round_trip() {
        let store = RedisStore::connect("127.0.0.1", 6379, None, "alioth-test")
            .await
            .unwrap();
        let ctx = Context::new().attach();
        let version = Version::new(1, 0, 0, 0);
        let service = format!("svc-{}", uuid_like());

        let first = store
            .add_instance(&ctx, &service, version, "10.0.0.5", 50051)
            .await
            .unwrap();
        assert_eq!(first.name, format!("{service}:v1.0.0.0:alpha"));

        let found = store
            .find_instance(&ctx, &service, Version::new(0, 1, 0, 0))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        store
            .remove_instance(&ctx, &service, &first.name)
            .await
            .unwrap();
        // An emptied (or never-registered) service answers an empty
        // list, not an error.
        let drained = store
            .find_instance(&ctx, &service, Version::new(0, 1, 0, 0))
            .await
            .unwrap();
        assert!(drained.is_empty());

        let missing = store.remove_instance(&ctx, &service, &first.name).await;
        assert!(matches!(missing, Err(Error::NoAvailableService { .. })));
    }

    fn uuid_like() -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        format!(
            "{:x}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        )
    }
}
