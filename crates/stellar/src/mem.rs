//! An in-memory store double for exercising the service and transport
//! layers without a live backend. Registration is serialised by one
//! mutex, mirroring the per-service critical section of the real
//! backends.

use crate::store::{free_slot, handler_name, Instance, InstanceStore};
use common::{version::ALPHA_VERSION, Context, Error, Version};
use tokio::sync::Mutex;

#[derive(Default)]
pub(crate) struct MemStore {
    instances: Mutex<Vec<Instance>>,
}

#[async_trait::async_trait]
impl InstanceStore for MemStore {
    async fn add_instance(
        &self,
        _ctx: &Context,
        service: &str,
        version: Version,
        ip: &str,
        port: i32,
    ) -> Result<Instance, Error> {
        let mut instances = self.instances.lock().await;

        let slot = {
            let names = instances
                .iter()
                .filter(|i| i.service == service && i.version == version.encode_db())
                .map(|i| i.name.as_str());
            free_slot(names)
        };
        let Some(slot) = slot else {
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
        instances.push(instance.clone());
        Ok(instance)
    }

    async fn remove_instance(
        &self,
        _ctx: &Context,
        service: &str,
        name: &str,
    ) -> Result<(), Error> {
        let mut instances = self.instances.lock().await;
        match instances.iter().position(|i| i.name == name) {
            Some(index) => {
                instances.remove(index);
                Ok(())
            }
            None => Err(Error::NoAvailableService {
                service: service.to_string(),
                version_or_name: name.to_string(),
            }),
        }
    }

    async fn find_instance(
        &self,
        _ctx: &Context,
        service: &str,
        min_version: Version,
    ) -> Result<Vec<Instance>, Error> {
        let instances = self.instances.lock().await;
        Ok(instances
            .iter()
            .filter(|i| i.service == service && i.version >= min_version.encode_db())
            .cloned()
            .collect())
    }

    async fn list_instances(
        &self,
        _ctx: &Context,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Instance>, Error> {
        let instances = self.instances.lock().await;
        Ok(instances
            .iter()
            .filter(|i| i.version >= ALPHA_VERSION.encode_db())
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
