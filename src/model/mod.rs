//! Record shapes shared by fetchers, the snapshot store and the query side
//!
//! - [`resource`] - the normalized [`Resource`] record and its kind/provider tags
//! - [`reference`] - typed references parsed from self-link attributes
//! - [`flow`] - derived load balancer flow records

pub mod flow;
pub mod reference;
pub mod resource;

pub use flow::{
    BackendConfig, CloudArmorPolicy, CloudArmorRule, FrontendConfig, LoadBalancerFlow, RoutingRule,
};
pub use reference::{short_name, ResourceRef};
pub use resource::{attr, Provider, Resource, ServiceKind};
