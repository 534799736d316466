use crate::store::InstanceStore;
use common::{Context, Error, Version, TIME_FORMAT};
use proto_alioth::{
    ServiceDiscoveryRequest, ServiceDiscoveryResponse, ServiceListRequest, ServiceListResponse,
    ServiceRecord, ServiceRegistrationRequest, ServiceRegistrationResponse, ServiceUnmountRequest,
    ServiceUnmountResponse,
};
use rand::seq::SliceRandom;
use std::sync::Arc;

/// The registry service. Stateless: every answer is derived from the
/// backing store at call time.
pub struct Stellar<S> {
    store: Arc<S>,
}

impl<S: InstanceStore> Stellar<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Register an instance of `request.service` at the caller's
    /// address, yielding its assigned handler name.
    pub async fn register(
        &self,
        ctx: &Context,
        request: &ServiceRegistrationRequest,
        client_ip: &str,
    ) -> Result<ServiceRegistrationResponse, Error> {
        let version = Version::parse(&request.version)?;
        let instance = self
            .store
            .add_instance(ctx, &request.service, version, client_ip, request.port)
            .await?;

        let version = instance.version().to_string();
        Ok(ServiceRegistrationResponse {
            service: instance.service,
            name: instance.name,
            address: instance.address,
            version,
        })
    }

    /// Pick one instance of `request.service` at `min_version` or above,
    /// uniformly at random.
    pub async fn discover(
        &self,
        ctx: &Context,
        request: &ServiceDiscoveryRequest,
    ) -> Result<ServiceDiscoveryResponse, Error> {
        let min_version = Version::parse(&request.min_version)?;
        let instances = self
            .store
            .find_instance(ctx, &request.service, min_version)
            .await?;

        let Some(instance) = instances.choose(&mut rand::thread_rng()) else {
            return Err(Error::NoAvailableInstance {
                service: request.service.clone(),
                min_version: request.min_version.clone(),
            });
        };

        Ok(ServiceDiscoveryResponse {
            service: instance.service.clone(),
            name: instance.name.clone(),
            version: instance.version().to_string(),
            address: instance.address.clone(),
            last_updated: instance.updated_at.format(TIME_FORMAT).to_string(),
        })
    }

    /// Remove the named instance.
    pub async fn unmount(
        &self,
        ctx: &Context,
        request: &ServiceUnmountRequest,
    ) -> Result<ServiceUnmountResponse, Error> {
        self.store
            .remove_instance(ctx, &request.service, &request.name)
            .await?;

        Ok(ServiceUnmountResponse {
            service: request.service.clone(),
            name: request.name.clone(),
            success: true,
        })
    }

    /// Page over all registered instances. `total` counts the rows of
    /// this page, not the grand total.
    pub async fn list(
        &self,
        ctx: &Context,
        request: &ServiceListRequest,
    ) -> Result<ServiceListResponse, Error> {
        let instances = self
            .store
            .list_instances(ctx, request.page_limit as i64, request.page_offset as i64)
            .await?;

        let services: Vec<ServiceRecord> = instances
            .into_iter()
            .map(|instance| ServiceRecord {
                service: instance.service.clone(),
                name: instance.name.clone(),
                address: instance.address.clone(),
                version: instance.version().to_string(),
                updated_at: instance.updated_at.format(TIME_FORMAT).to_string(),
                created_at: instance.created_at.format(TIME_FORMAT).to_string(),
            })
            .collect();

        Ok(ServiceListResponse {
            total: services.len() as i32,
            page_limit: request.page_limit,
            page_offset: request.page_offset,
            services,
        })
    }
}

#[cfg(test)]
mod test {
    use super::Stellar;
    use crate::mem::MemStore;
    use common::{Context, Error};
    use proto_alioth::{
        ServiceDiscoveryRequest, ServiceListRequest, ServiceRegistrationRequest,
        ServiceUnmountRequest,
    };
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn registration(version: &str, port: i32) -> ServiceRegistrationRequest {
        ServiceRegistrationRequest {
            service: "alioth-restoration".to_string(),
            version: version.to_string(),
            port,
        }
    }

    #[tokio::test]
    async fn test_registration_assigns_greek_slots() {
        let service = Stellar::new(Arc::new(MemStore::default()));
        let ctx = Context::new().attach();

        let first = service
            .register(&ctx, &registration("1.0.0.0", 50051), "10.0.0.5")
            .await
            .unwrap();
        assert_eq!(first.name, "alioth-restoration:v1.0.0.0:alpha");
        assert_eq!(first.address, "10.0.0.5:50051");
        assert_eq!(first.version, "1.0.0.0");

        service
            .register(&ctx, &registration("1.0.0.0", 50052), "10.0.0.5")
            .await
            .unwrap();
        let third = service
            .register(&ctx, &registration("1.0.0.0", 50053), "10.0.0.5")
            .await
            .unwrap();
        assert_eq!(third.name, "alioth-restoration:v1.0.0.0:gamma");
    }

    #[tokio::test]
    async fn test_concurrent_registrations_get_distinct_names() {
        let service = Arc::new(Stellar::new(Arc::new(MemStore::default())));

        let tasks: Vec<_> = (0..48)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .register(
                            &Context::new().attach(),
                            &registration("1.0.0.0", 50000 + i),
                            "10.0.0.5",
                        )
                        .await
                        .unwrap()
                        .name
                })
            })
            .collect();

        let mut names = BTreeSet::new();
        for task in tasks {
            let name = task.await.unwrap();
            assert!(
                name.starts_with("alioth-restoration:v1.0.0.0:"),
                "unexpected name {name}"
            );
            names.insert(name);
        }
        assert_eq!(names.len(), 48);

        // The ring is exhausted: one more registration fails.
        let over = service
            .register(
                &Context::new().attach(),
                &registration("1.0.0.0", 50100),
                "10.0.0.5",
            )
            .await;
        assert!(matches!(
            over,
            Err(Error::InstanceOutOfMaxNumber { limit: 48 })
        ));
    }

    #[tokio::test]
    async fn test_discovery_respects_version_floor() {
        let service = Stellar::new(Arc::new(MemStore::default()));
        let ctx = Context::new().attach();

        for (version, port) in [("1.0.0.0", 50051), ("1.2.0.0", 50052), ("2.0.0.0", 50053)] {
            service
                .register(&ctx, &registration(version, port), "10.0.0.5")
                .await
                .unwrap();
        }

        for _ in 0..8 {
            let found = service
                .discover(
                    &ctx,
                    &ServiceDiscoveryRequest {
                        service: "alioth-restoration".to_string(),
                        min_version: "1.1.0.0".to_string(),
                    },
                )
                .await
                .unwrap();
            assert!(found.name.starts_with("alioth-restoration:v"));
            assert!(["1.2.0.0", "2.0.0.0"].contains(&found.version.as_str()));
        }

        let missing = service
            .discover(
                &ctx,
                &ServiceDiscoveryRequest {
                    service: "alioth-restoration".to_string(),
                    min_version: "3.0.0.0".to_string(),
                },
            )
            .await;
        assert!(matches!(missing, Err(Error::NoAvailableInstance { .. })));

        let malformed = service
            .discover(
                &ctx,
                &ServiceDiscoveryRequest {
                    service: "alioth-restoration".to_string(),
                    min_version: "1.1".to_string(),
                },
            )
            .await;
        assert!(matches!(malformed, Err(Error::InvalidVersion { .. })));
    }

    #[tokio::test]
    async fn test_unmount_removes_exactly_one() {
        let service = Stellar::new(Arc::new(MemStore::default()));
        let ctx = Context::new().attach();

        let first = service
            .register(&ctx, &registration("1.0.0.0", 50051), "10.0.0.5")
            .await
            .unwrap();
        service
            .register(&ctx, &registration("1.0.0.0", 50052), "10.0.0.5")
            .await
            .unwrap();

        let response = service
            .unmount(
                &ctx,
                &ServiceUnmountRequest {
                    service: "alioth-restoration".to_string(),
                    name: first.name.clone(),
                },
            )
            .await
            .unwrap();
        assert!(response.success);

        // The unmounted name never comes back from discovery.
        for _ in 0..8 {
            let found = service
                .discover(
                    &ctx,
                    &ServiceDiscoveryRequest {
                        service: "alioth-restoration".to_string(),
                        min_version: "1.0.0.0".to_string(),
                    },
                )
                .await
                .unwrap();
            assert_ne!(found.name, first.name);
        }

        let missing = service
            .unmount(
                &ctx,
                &ServiceUnmountRequest {
                    service: "alioth-restoration".to_string(),
                    name: first.name,
                },
            )
            .await;
        assert!(matches!(missing, Err(Error::NoAvailableService { .. })));
    }

    #[tokio::test]
    async fn test_list_counts_returned_page() {
        let service = Stellar::new(Arc::new(MemStore::default()));
        let ctx = Context::new().attach();

        for port in 0..5 {
            service
                .register(&ctx, &registration("1.0.0.0", 50051 + port), "10.0.0.5")
                .await
                .unwrap();
        }

        let page = service
            .list(
                &ctx,
                &ServiceListRequest {
                    page_limit: 3,
                    page_offset: 0,
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.services.len(), 3);
        assert_eq!(page.page_limit, 3);

        let rest = service
            .list(
                &ctx,
                &ServiceListRequest {
                    page_limit: 3,
                    page_offset: 3,
                },
            )
            .await
            .unwrap();
        assert_eq!(rest.total, 2);
    }
}
