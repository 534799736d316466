mod postgres;
mod redis;

pub use self::postgres::PgStore;
pub use self::redis::RedisStore;

use common::{greek, Context, Error, Version};

/// One live endpoint of a registered service.
///
/// Instances are created on registration, read on discovery and listing,
/// and deleted on unmount; they are never updated in place. The version
/// is held in its database-sortable form.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Instance {
    pub address: String,
    pub name: String,
    pub service: String,
    pub version: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Instance {
    /// The decoded semantic version of this instance.
    pub fn version(&self) -> Version {
        Version::decode_db(self.version)
    }

    /// The Greek word at the tail of the handler name.
    pub fn greek_word(&self) -> Option<&str> {
        self.name.rsplit(':').next()
    }
}

/// The canonical handler name, `{service}:v{M.m.p.b}:{greek}`.
pub fn handler_name(service: &str, version: Version, slot: usize) -> String {
    format!("{service}:{}:{}", version.name_prefix(), greek::word(slot))
}

/// Pick the smallest free Greek slot among existing handler names of one
/// `(service, version)` pair. `None` means the 48-slot ring is full.
pub(crate) fn free_slot<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<usize> {
    greek::smallest_free_slot(
        names
            .into_iter()
            .filter_map(|name| name.rsplit(':').next()),
    )
}

/// The capability set every registry backend provides.
#[async_trait::async_trait]
pub trait InstanceStore: Send + Sync + 'static {
    /// Persist a new instance, assigning it the smallest free Greek slot
    /// for its `(service, version)` pair.
    async fn add_instance(
        &self,
        ctx: &Context,
        service: &str,
        version: Version,
        ip: &str,
        port: i32,
    ) -> Result<Instance, Error>;

    /// Delete the named instance. Unknown names answer
    /// `NoAvailableService`.
    async fn remove_instance(&self, ctx: &Context, service: &str, name: &str)
        -> Result<(), Error>;

    /// Every instance of `service` at `min_version` or above. An empty
    /// answer is not an error.
    async fn find_instance(
        &self,
        ctx: &Context,
        service: &str,
        min_version: Version,
    ) -> Result<Vec<Instance>, Error>;

    /// Page over all instances at `ALPHA_VERSION` or above. Page
    /// parameters are applied verbatim.
    async fn list_instances(
        &self,
        ctx: &Context,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Instance>, Error>;
}

/// The configured registry backend.
pub enum Backend {
    Postgres(PgStore),
    Redis(RedisStore),
}

#[async_trait::async_trait]
impl InstanceStore for Backend {
    async fn add_instance(
        &self,
        ctx: &Context,
        service: &str,
        version: Version,
        ip: &str,
        port: i32,
    ) -> Result<Instance, Error> {
        match self {
            Backend::Postgres(store) => store.add_instance(ctx, service, version, ip, port).await,
            Backend::Redis(store) => store.add_instance(ctx, service, version, ip, port).await,
        }
    }

    async fn remove_instance(
        &self,
        ctx: &Context,
        service: &str,
        name: &str,
    ) -> Result<(), Error> {
        match self {
            Backend::Postgres(store) => store.remove_instance(ctx, service, name).await,
            Backend::Redis(store) => store.remove_instance(ctx, service, name).await,
        }
    }

    async fn find_instance(
        &self,
        ctx: &Context,
        service: &str,
        min_version: Version,
    ) -> Result<Vec<Instance>, Error> {
        match self {
            Backend::Postgres(store) => store.find_instance(ctx, service, min_version).await,
            Backend::Redis(store) => store.find_instance(ctx, service, min_version).await,
        }
    }

    async fn list_instances(
        &self,
        ctx: &Context,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Instance>, Error> {
        match self {
            Backend::Postgres(store) => store.list_instances(ctx, limit, offset).await,
            Backend::Redis(store) => store.list_instances(ctx, limit, offset).await,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{free_slot, handler_name};
    use common::Version;

    #[test]
    fn test_handler_name() {
        assert_eq!(
            handler_name("alioth-restoration", Version::new(1, 0, 0, 0), 0),
            "alioth-restoration:v1.0.0.0:alpha",
        );
        assert_eq!(
            handler_name("svc", Version::new(0, 2, 0, 9), 2),
            "svc:v0.2.0.9:gamma",
        );
    }

    #[test]
    fn test_free_slot_from_names() {
        assert_eq!(free_slot([]), Some(0));
        assert_eq!(
            free_slot(["svc:v1.0.0.0:alpha", "svc:v1.0.0.0:beta"]),
            Some(2),
        );
        // A vacated slot is recycled.
        assert_eq!(
            free_slot(["svc:v1.0.0.0:alpha", "svc:v1.0.0.0:gamma"]),
            Some(1),
        );
    }
}
