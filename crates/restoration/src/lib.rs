//! The distributed log collector.
//!
//! Server side: accepts log records over the binary RPC and the HTTP
//! transport and fans them into the journal writer. Client side (the
//! [`client`] module): a library linked into application services that
//! enriches records with caller metadata and ships them here.

pub mod client;
mod fields;
mod http;
mod rpc;
mod service;

pub use fields::Collection;
pub use http::router;
pub use rpc::RpcServer;
pub use service::Service;

/// The service name applied to records that do not carry one.
pub const UNREGISTERED_SERVICE: &str = "unregistered-service";

/// The timestamp format of `called_at` fields.
pub const CALLED_AT_FORMAT: &str = common::TIME_FORMAT;
