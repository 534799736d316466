//! The service-instance registry.
//!
//! Services register their endpoints under a name + semantic version,
//! obtain a uniquely named handler, and discover peers subject to a
//! minimum-version floor. Persistence is pluggable: a relational
//! Postgres backend or a Redis set store, behind [`store::Backend`].

pub mod client;
mod http;
mod rpc;
mod service;
pub mod store;

pub use http::router;
pub use rpc::RpcServer;
pub use service::Stellar;

#[cfg(test)]
pub(crate) mod mem;
