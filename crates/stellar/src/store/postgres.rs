use super::{free_slot, handler_name, Instance, InstanceStore};
use common::{Context, Error, Version};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The relational backend, persisting instances in the
/// `alioth_instances` table.
///
/// A per-service reader/writer lock serialises the critical section of
/// registration (count occupied slots, assign one, insert) so that two
/// concurrent registrations of the same `(service, version)` cannot pick
/// the same slot. The outer lock map is itself guarded, so racing
/// first-uses of a service are safe.
pub struct PgStore {
    pool: sqlx::PgPool,
    // Non-async lock; never held across an await point.
    locks: Mutex<HashMap<String, Arc<tokio::sync::RwLock<()>>>>,
}

const SYNC_MODELS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS alioth_instances (
        id         BIGSERIAL PRIMARY KEY,
        address    VARCHAR(21) NOT NULL,
        name       VARCHAR(255) NOT NULL,
        service    VARCHAR(255) NOT NULL,
        version    BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_address ON alioth_instances (address)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_name ON alioth_instances (name)",
    "CREATE INDEX IF NOT EXISTS idx_service ON alioth_instances (service)",
    "CREATE INDEX IF NOT EXISTS idx_version ON alioth_instances (version)",
];

#[derive(sqlx::FromRow)]
struct InstanceRow {
    address: String,
    name: String,
    service: String,
    version: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<InstanceRow> for Instance {
    fn from(row: InstanceRow) -> Self {
        Instance {
            address: row.address,
            name: row.name,
            service: row.service,
            version: row.version as u64,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            pool,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn connect(
        host: &str,
        port: u16,
        user: &str,
        password: &str,
        database: &str,
        min_connections: u32,
        max_connections: u32,
    ) -> Result<Self, Error> {
        let options = sqlx::postgres::PgConnectOptions::new()
            .host(host)
            .port(port)
            .username(user)
            .password(password)
            .database(database);

        let pool = sqlx::postgres::PgPoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|source| Error::DatabaseInitialize {
                host: host.to_string(),
                port,
                database: database.to_string(),
                user: user.to_string(),
                source: Box::new(source),
            })?;

        Ok(Self::new(pool))
    }

    /// Create the instances table and its indices when absent.
    pub async fn sync_models(&self) -> Result<(), Error> {
        for statement in SYNC_MODELS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|source| Error::DatabaseSyncModels {
                    models: vec!["alioth_instances".to_string()],
                    source: Box::new(source),
                })?;
        }
        Ok(())
    }

    fn lock_for(&self, service: &str) -> Arc<tokio::sync::RwLock<()>> {
        let mut locks = self.locks.lock().expect("lock map is never poisoned");
        locks.entry(service.to_string()).or_default().clone()
    }
}

#[async_trait::async_trait]
impl InstanceStore for PgStore {
    async fn add_instance(
        &self,
        ctx: &Context,
        service: &str,
        version: Version,
        ip: &str,
        port: i32,
    ) -> Result<Instance, Error> {
        let lock = self.lock_for(service);
        // Slot assignment and insert form one critical section per
        // service: the observed name set must still hold at insert time.
        let _guard = lock.write().await;

        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM alioth_instances WHERE service = $1 AND version = $2",
        )
        .bind(service)
        .bind(version.encode_db() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::execute_sql("select instance names", e))?;

        let Some(slot) = free_slot(names.iter().map(String::as_str)) else {
            tracing::error!(
                service,
                version = %version,
                trace_id = ctx.trace_id_or_empty(),
                "instance out of max number"
            );
            return Err(Error::InstanceOutOfMaxNumber { limit: 48 });
        };

        let name = handler_name(service, version, slot);
        let address = format!("{ip}:{port}");

        let row: InstanceRow = sqlx::query_as(
            r#"
            INSERT INTO alioth_instances (address, name, service, version)
            VALUES ($1, $2, $3, $4)
            RETURNING address, name, service, version, created_at, updated_at
            "#,
        )
        .bind(&address)
        .bind(&name)
        .bind(service)
        .bind(version.encode_db() as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::execute_sql("insert instance", e))?;

        tracing::info!(
            service,
            %name,
            %address,
            trace_id = ctx.trace_id_or_empty(),
            "instance registered"
        );
        Ok(row.into())
    }

    async fn remove_instance(
        &self,
        ctx: &Context,
        service: &str,
        name: &str,
    ) -> Result<(), Error> {
        let lock = self.lock_for(service);

        let known: Option<String> = {
            let _guard = lock.read().await;
            sqlx::query_scalar("SELECT name FROM alioth_instances WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::execute_sql("select instance", e))?
        };
        if known.is_none() {
            return Err(Error::NoAvailableService {
                service: service.to_string(),
                version_or_name: name.to_string(),
            });
        }

        let _guard = lock.write().await;
        sqlx::query("DELETE FROM alioth_instances WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::execute_sql("delete instance", e))?;

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
        let lock = self.lock_for(service);
        let _guard = lock.read().await;

        let rows: Vec<InstanceRow> = sqlx::query_as(
            r#"
            SELECT address, name, service, version, created_at, updated_at
            FROM alioth_instances
            WHERE service = $1 AND version >= $2
            "#,
        )
        .bind(service)
        .bind(min_version.encode_db() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::execute_sql("select instances", e))?;

        tracing::debug!(
            service,
            min_version = %min_version,
            matches = rows.len(),
            trace_id = ctx.trace_id_or_empty(),
            "instance lookup"
        );
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_instances(
        &self,
        _ctx: &Context,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Instance>, Error> {
        let rows: Vec<InstanceRow> = sqlx::query_as(
            r#"
            SELECT address, name, service, version, created_at, updated_at
            FROM alioth_instances
            WHERE version >= $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(common::version::ALPHA_VERSION.encode_db() as i64)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::execute_sql("list instances", e))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
