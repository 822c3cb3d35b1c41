//! Flow Reconstructor
//!
//! Rebuilds load balancer request paths from the flat snapshot:
//!
//! ```text
//! forwardingrule --target--> targethttpsproxy --url_map--> urlmap
//!     --default_service--> backendservice --(name overlap)--> cloudrun
//!                                         --cloud_armor_policy--> securitypolicy
//! ```
//!
//! Links are self-link strings resolved by their last path segment. A
//! forwarding rule whose chain breaks before the backend service produces
//! no flow; nothing here returns an error.

use crate::model::{
    attr, CloudArmorRule, FrontendConfig, LoadBalancerFlow, Resource, ResourceRef, RoutingRule,
    ServiceKind,
};
use std::collections::HashMap;

/// Backend type reported when a Cloud Run service is matched
pub const CLOUD_RUN_BACKEND: &str = "Cloud Run";

/// Trace every forwarding rule of `scope_id`, in snapshot order
pub fn trace_flows(snapshot: &[Resource], scope_id: &str) -> Vec<LoadBalancerFlow> {
    let index = ScopeIndex::build(snapshot, scope_id);

    let flows: Vec<LoadBalancerFlow> = index
        .forwarding_rules
        .iter()
        .filter_map(|fr| index.trace(fr, scope_id))
        .collect();

    tracing::debug!(
        "Traced {} flows from {} forwarding rules in {}",
        flows.len(),
        index.forwarding_rules.len(),
        scope_id
    );
    flows
}

/// Per-kind lookups over the records of one scope
struct ScopeIndex<'a> {
    forwarding_rules: Vec<&'a Resource>,
    proxies: HashMap<&'a str, &'a Resource>,
    url_maps: HashMap<&'a str, &'a Resource>,
    backend_services: HashMap<&'a str, &'a Resource>,
    security_policies: HashMap<&'a str, &'a Resource>,
    /// Kept in snapshot order for the first-match heuristic
    run_services: Vec<&'a Resource>,
}

impl<'a> ScopeIndex<'a> {
    fn build(snapshot: &'a [Resource], scope_id: &str) -> Self {
        let mut index = ScopeIndex {
            forwarding_rules: Vec::new(),
            proxies: HashMap::new(),
            url_maps: HashMap::new(),
            backend_services: HashMap::new(),
            security_policies: HashMap::new(),
            run_services: Vec::new(),
        };

        for res in snapshot.iter().filter(|r| r.belongs_to_scope(scope_id)) {
            let key = res.name.as_str();
            // On duplicate names the first record wins
            match res.service {
                ServiceKind::ForwardingRule => index.forwarding_rules.push(res),
                ServiceKind::TargetHttpsProxy => {
                    index.proxies.entry(key).or_insert(res);
                }
                ServiceKind::UrlMap => {
                    index.url_maps.entry(key).or_insert(res);
                }
                ServiceKind::BackendService => {
                    index.backend_services.entry(key).or_insert(res);
                }
                ServiceKind::SecurityPolicy => {
                    index.security_policies.entry(key).or_insert(res);
                }
                ServiceKind::CloudRun => index.run_services.push(res),
                _ => {}
            }
        }

        index
    }

    fn trace(&self, fr: &Resource, scope_id: &str) -> Option<LoadBalancerFlow> {
        let mut flow = LoadBalancerFlow {
            name: fr.name.clone(),
            project_id: scope_id.to_string(),
            frontend: FrontendConfig {
                ip_address: fr.attr_or_empty(attr::IP_ADDRESS).to_string(),
                port_range: fr.attr_or_empty(attr::PORT_RANGE).to_string(),
                protocol: fr.attr_or_empty(attr::PROTOCOL).to_string(),
                load_balancing_scheme: fr.attr_or_empty(attr::LOAD_BALANCING_SCHEME).to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let Some(proxy) = follow(&self.proxies, fr, attr::TARGET) else {
            tracing::trace!("{}: target proxy not in snapshot", fr.name);
            return None;
        };
        flow.frontend.certificates = split_list(proxy.attr_or_empty(attr::SSL_CERTIFICATES));
        if let Some(policy) = proxy.attr(attr::SSL_POLICY).and_then(ResourceRef::parse) {
            flow.frontend.ssl_policy = policy.name;
        }

        let Some(url_map) = follow(&self.url_maps, proxy, attr::URL_MAP) else {
            tracing::trace!("{}: url map not in snapshot", fr.name);
            return None;
        };

        let Some(backend) = follow(&self.backend_services, url_map, attr::DEFAULT_SERVICE) else {
            tracing::trace!("{}: backend service not in snapshot", fr.name);
            return None;
        };
        flow.routing_rules.push(RoutingRule::default_route());
        flow.backend.name = backend.name.clone();

        // Name heuristic: ambiguous when service names share a prefix,
        // the first service in snapshot order wins.
        if let Some(run) = self
            .run_services
            .iter()
            .find(|run| names_overlap(&backend.name, &run.name))
        {
            flow.backend.kind = CLOUD_RUN_BACKEND.to_string();
            flow.backend.service_name = run.name.clone();
            flow.backend.region = run.region.clone();
        }

        if let Some(policy) = backend
            .attr(attr::CLOUD_ARMOR_POLICY)
            .and_then(ResourceRef::parse)
        {
            flow.cloud_armor.rules = self.policy_rules(&policy.name);
            flow.cloud_armor.name = policy.name;
        }

        Some(flow)
    }

    /// Rules captured on the policy record at fetch time, if any
    fn policy_rules(&self, policy_name: &str) -> Vec<CloudArmorRule> {
        let Some(raw) = self
            .security_policies
            .get(policy_name)
            .and_then(|p| p.attr(attr::RULES))
        else {
            return Vec::new();
        };

        serde_json::from_str(raw).unwrap_or_else(|e| {
            tracing::debug!("Ignoring undecodable rules on policy {}: {}", policy_name, e);
            Vec::new()
        })
    }
}

fn follow<'a>(
    lookup: &HashMap<&'a str, &'a Resource>,
    from: &Resource,
    link_attr: &str,
) -> Option<&'a Resource> {
    let reference = ResourceRef::parse(from.attr(link_attr)?)?;
    lookup.get(reference.name.as_str()).copied()
}

/// True when either name contains the other
pub fn names_overlap(backend_name: &str, service_name: &str) -> bool {
    backend_name.contains(service_name) || service_name.contains(backend_name)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
