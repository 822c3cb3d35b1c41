//! infrakit
//!
//! Inventories AWS and GCP resources into a local JSON snapshot, then
//! answers questions from that snapshot offline: fuzzy search, per-project
//! listings and reconstructed load balancer flows.
//!
//! # Architecture
//!
//! - [`model`] - the common record shape and the flow shape
//! - [`aws`] / [`gcp`] - fetchers that turn provider APIs into records
//! - [`aggregate`] - runs fetchers and writes the result to the store
//! - [`store`] - the snapshot file, whole or per scope
//! - [`flow`] - joins snapshot records into load balancer flows
//! - [`search`] - matching for the picker and the HTTP API
//! - [`server`] - local read-only HTTP API
//! - [`ui`] - interactive terminal picker
//! - [`config`] - persisted settings

pub mod aggregate;
pub mod aws;
pub mod config;
pub mod flow;
pub mod gcp;
pub mod model;
pub mod search;
pub mod server;
pub mod store;
pub mod ui;

/// Version injected at compile time via INFRAKIT_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("INFRAKIT_VERSION") {
    Some(v) => v,
    None => "dev",
};
