//! Compute Engine fetchers
//!
//! Network components (VPCs, subnets, firewall rules) and the load balancer
//! chain (forwarding rules, HTTPS proxies, URL maps, backend services,
//! security policies). Links to other records are kept as the self-links the
//! API returns; the flow reconstructor resolves them by short name.

use super::client::GcpClient;
use crate::model::{attr, short_name, CloudArmorRule, Provider, Resource, ServiceKind};
use anyhow::Result;
use serde_json::Value;

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn join_strings(value: &Value, key: &str, sep: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>().join(sep))
        .unwrap_or_default()
}

/// Region short name of a regional item, "global" otherwise
fn region_of(value: &Value) -> String {
    match short_name(str_field(value, "region")) {
        r if r.is_empty() => "global".to_string(),
        r => r,
    }
}

fn record(service: ServiceKind, region: &str, item: &Value, project_id: &str) -> Option<Resource> {
    let name = str_field(item, "name");
    if name.is_empty() {
        return None;
    }
    Some(Resource::new(Provider::Gcp, service, region, name, name).with_attr(attr::PROJECT_ID, project_id))
}

// =========================================================================
// Network
// =========================================================================

pub fn network_record(item: &Value, project_id: &str) -> Option<Resource> {
    Some(
        record(ServiceKind::Vpc, "global", item, project_id)?
            .with_attr("mode", bool_field(item, "autoCreateSubnetworks").to_string()),
    )
}

pub fn subnet_record(item: &Value, project_id: &str) -> Option<Resource> {
    Some(
        record(ServiceKind::Subnet, &region_of(item), item, project_id)?
            .with_attr(attr::VPC, str_field(item, "network"))
            .with_attr("cidr_range", str_field(item, "ipCidrRange")),
    )
}

/// `tcp:80,443; udp` style summary of allowed or denied entries
fn format_firewall_entries(item: &Value, key: &str) -> String {
    let Some(entries) = item.get(key).and_then(|v| v.as_array()) else {
        return String::new();
    };

    entries
        .iter()
        .map(|entry| {
            let protocol = str_field(entry, "IPProtocol");
            match join_strings(entry, "ports", ",") {
                ports if ports.is_empty() => protocol.to_string(),
                ports => format!("{}:{}", protocol, ports),
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn firewall_record(item: &Value, project_id: &str) -> Option<Resource> {
    let allowed = item
        .get("allowed")
        .and_then(|v| v.as_array())
        .is_some_and(|a| !a.is_empty());
    let priority = item
        .get("priority")
        .and_then(|v| v.as_i64())
        .map(|p| p.to_string())
        .unwrap_or_default();

    Some(
        record(ServiceKind::Firewall, "global", item, project_id)?
            .with_attr("action", if allowed { "ALLOW" } else { "DENY" })
            .with_attr("direction", str_field(item, "direction"))
            .with_attr("priority", priority)
            .with_attr("disabled", bool_field(item, "disabled").to_string())
            .with_attr("source_ranges", join_strings(item, "sourceRanges", ", "))
            .with_attr("destination_ranges", join_strings(item, "destinationRanges", ", "))
            .with_attr("target_tags", join_strings(item, "targetTags", ", "))
            .with_attr("allowed", format_firewall_entries(item, "allowed"))
            .with_attr("denied", format_firewall_entries(item, "denied")),
    )
}

fn list_into(
    resources: &mut Vec<Resource>,
    listing: Result<Vec<Value>>,
    what: &str,
    project_id: &str,
    to_record: fn(&Value, &str) -> Option<Resource>,
) {
    match listing {
        Ok(items) => resources.extend(items.iter().filter_map(|i| to_record(i, project_id))),
        Err(e) => tracing::warn!("Could not list {} for project {}: {:#}", what, project_id, e),
    }
}

/// VPCs, subnets and firewall rules of one project. Each listing that
/// fails is logged and skipped.
pub async fn fetch_network(client: &GcpClient, project_id: &str) -> Vec<Resource> {
    tracing::info!("Fetching network resources for project {}", project_id);
    let mut resources = Vec::new();

    let listing = client
        .get_all(&client.compute_global_url(project_id, "networks"), "items")
        .await;
    list_into(&mut resources, listing, "networks", project_id, network_record);

    let listing = client
        .get_all_aggregated(&client.compute_aggregated_url(project_id, "subnetworks"))
        .await;
    list_into(&mut resources, listing, "subnets", project_id, subnet_record);

    let listing = client
        .get_all(&client.compute_global_url(project_id, "firewalls"), "items")
        .await;
    list_into(&mut resources, listing, "firewall rules", project_id, firewall_record);

    resources
}

// =========================================================================
// Load balancer chain
// =========================================================================

pub fn backend_service_record(item: &Value, project_id: &str) -> Option<Resource> {
    Some(
        record(ServiceKind::BackendService, &region_of(item), item, project_id)?
            .with_attr(attr::LOAD_BALANCING_SCHEME, str_field(item, "loadBalancingScheme"))
            .with_attr(attr::CLOUD_ARMOR_POLICY, str_field(item, "securityPolicy")),
    )
}

pub fn url_map_record(item: &Value, project_id: &str) -> Option<Resource> {
    Some(
        record(ServiceKind::UrlMap, &region_of(item), item, project_id)?
            .with_attr(attr::DEFAULT_SERVICE, str_field(item, "defaultService")),
    )
}

pub fn https_proxy_record(item: &Value, project_id: &str) -> Option<Resource> {
    Some(
        record(ServiceKind::TargetHttpsProxy, &region_of(item), item, project_id)?
            .with_attr(attr::URL_MAP, str_field(item, "urlMap"))
            .with_attr(attr::SSL_CERTIFICATES, join_strings(item, "sslCertificates", ","))
            .with_attr(attr::SSL_POLICY, str_field(item, "sslPolicy")),
    )
}

pub fn forwarding_rule_record(item: &Value, project_id: &str) -> Option<Resource> {
    Some(
        record(ServiceKind::ForwardingRule, &region_of(item), item, project_id)?
            .with_attr(attr::IP_ADDRESS, str_field(item, "IPAddress"))
            .with_attr(attr::PORT_RANGE, str_field(item, "portRange"))
            .with_attr(attr::PROTOCOL, str_field(item, "IPProtocol"))
            .with_attr(attr::LOAD_BALANCING_SCHEME, str_field(item, "loadBalancingScheme"))
            .with_attr(attr::TARGET, str_field(item, "target")),
    )
}

/// Match condition of a security policy rule as one line of text
fn rule_match(rule: &Value) -> String {
    let Some(matcher) = rule.get("match") else {
        return String::new();
    };

    let expression = matcher
        .get("expr")
        .map(|e| str_field(e, "expression"))
        .unwrap_or_default();
    if !expression.is_empty() {
        return expression.to_string();
    }

    let ranges = matcher
        .get("config")
        .map(|c| join_strings(c, "srcIpRanges", ", "))
        .unwrap_or_default();
    if !ranges.is_empty() {
        return format!("srcIpRanges: {}", ranges);
    }

    str_field(matcher, "versionedExpr").to_string()
}

pub fn security_policy_rules(item: &Value) -> Vec<CloudArmorRule> {
    let Some(rules) = item.get("rules").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    rules
        .iter()
        .map(|rule| CloudArmorRule {
            priority: rule.get("priority").and_then(|v| v.as_i64()).unwrap_or_default(),
            action: str_field(rule, "action").to_string(),
            description: str_field(rule, "description").to_string(),
            match_expr: rule_match(rule),
        })
        .collect()
}

pub fn security_policy_record(item: &Value, project_id: &str) -> Option<Resource> {
    let rules = security_policy_rules(item);
    let encoded = match serde_json::to_string(&rules) {
        Ok(encoded) => encoded,
        Err(e) => {
            tracing::debug!("Could not encode rules of policy {}: {}", str_field(item, "name"), e);
            String::new()
        }
    };

    Some(record(ServiceKind::SecurityPolicy, "global", item, project_id)?.with_attr(attr::RULES, encoded))
}

/// Load balancer chain of one project, listed in dependency order from the
/// backend up to the forwarding rule. Failed listings are logged and skipped.
pub async fn fetch_app_infra(client: &GcpClient, project_id: &str) -> Vec<Resource> {
    tracing::info!("Fetching app infrastructure for project {}", project_id);
    let mut resources = Vec::new();

    let listing = client
        .get_all_aggregated(&client.compute_aggregated_url(project_id, "backendServices"))
        .await;
    list_into(&mut resources, listing, "backend services", project_id, backend_service_record);

    let listing = client
        .get_all_aggregated(&client.compute_aggregated_url(project_id, "urlMaps"))
        .await;
    list_into(&mut resources, listing, "url maps", project_id, url_map_record);

    let listing = client
        .get_all_aggregated(&client.compute_aggregated_url(project_id, "targetHttpsProxies"))
        .await;
    list_into(&mut resources, listing, "https proxies", project_id, https_proxy_record);

    let listing = client
        .get_all(&client.compute_global_url(project_id, "forwardingRules"), "items")
        .await;
    list_into(&mut resources, listing, "forwarding rules", project_id, forwarding_rule_record);

    let listing = client
        .get_all(&client.compute_global_url(project_id, "securityPolicies"), "items")
        .await;
    list_into(&mut resources, listing, "security policies", project_id, security_policy_record);

    resources
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subnet_keeps_network_link_and_region() {
        let rec = subnet_record(
            &json!({
                "name": "sub-a",
                "region": "https://www.googleapis.com/compute/v1/projects/p1/regions/us-central1",
                "network": "https://www.googleapis.com/compute/v1/projects/p1/global/networks/vpc-a",
                "ipCidrRange": "10.0.0.0/24"
            }),
            "p1",
        )
        .unwrap();

        assert_eq!(rec.region, "us-central1");
        assert_eq!(rec.attr(attr::PROJECT_ID), Some("p1"));
        assert!(rec.attr_or_empty(attr::VPC).ends_with("/networks/vpc-a"));
        assert_eq!(rec.attr("cidr_range"), Some("10.0.0.0/24"));
    }

    #[test]
    fn test_firewall_summary() {
        let rec = firewall_record(
            &json!({
                "name": "allow-web",
                "direction": "INGRESS",
                "priority": 1000,
                "sourceRanges": ["0.0.0.0/0"],
                "targetTags": ["web", "lb"],
                "allowed": [
                    { "IPProtocol": "tcp", "ports": ["80", "443"] },
                    { "IPProtocol": "icmp" }
                ]
            }),
            "p1",
        )
        .unwrap();

        assert_eq!(rec.attr("action"), Some("ALLOW"));
        assert_eq!(rec.attr("priority"), Some("1000"));
        assert_eq!(rec.attr("disabled"), Some("false"));
        assert_eq!(rec.attr("target_tags"), Some("web, lb"));
        assert_eq!(rec.attr("allowed"), Some("tcp:80,443; icmp"));
        assert_eq!(rec.attr("denied"), Some(""));
    }

    #[test]
    fn test_firewall_without_allowed_is_deny() {
        let rec = firewall_record(
            &json!({ "name": "deny-all", "denied": [{ "IPProtocol": "all" }] }),
            "p1",
        )
        .unwrap();
        assert_eq!(rec.attr("action"), Some("DENY"));
        assert_eq!(rec.attr("denied"), Some("all"));
    }

    #[test]
    fn test_proxy_certificates_joined() {
        let rec = https_proxy_record(
            &json!({
                "name": "proxy1",
                "urlMap": "projects/p1/global/urlMaps/map1",
                "sslCertificates": ["projects/p1/global/sslCertificates/a", "projects/p1/global/sslCertificates/b"],
                "sslPolicy": "projects/p1/global/sslPolicies/modern"
            }),
            "p1",
        )
        .unwrap();

        assert_eq!(rec.region, "global");
        assert_eq!(
            rec.attr(attr::SSL_CERTIFICATES),
            Some("projects/p1/global/sslCertificates/a,projects/p1/global/sslCertificates/b")
        );
    }

    #[test]
    fn test_security_policy_rules_encoded() {
        let rec = security_policy_record(
            &json!({
                "name": "policy1",
                "rules": [
                    {
                        "priority": 1000,
                        "action": "deny(403)",
                        "description": "block bad range",
                        "match": { "config": { "srcIpRanges": ["1.2.3.0/24"] }, "versionedExpr": "SRC_IPS_V1" }
                    },
                    {
                        "priority": 2000,
                        "action": "allow",
                        "match": { "expr": { "expression": "origin.region_code == 'US'" } }
                    },
                    { "priority": 2147483647, "action": "allow", "match": { "versionedExpr": "SRC_IPS_V1" } }
                ]
            }),
            "p1",
        )
        .unwrap();

        let rules: Vec<CloudArmorRule> = serde_json::from_str(rec.attr_or_empty(attr::RULES)).unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].match_expr, "srcIpRanges: 1.2.3.0/24");
        assert_eq!(rules[1].match_expr, "origin.region_code == 'US'");
        assert_eq!(rules[1].description, "");
        assert_eq!(rules[2].match_expr, "SRC_IPS_V1");
    }

    #[test]
    fn test_nameless_items_are_skipped() {
        assert!(network_record(&json!({}), "p1").is_none());
        assert!(forwarding_rule_record(&json!({ "IPAddress": "1.1.1.1" }), "p1").is_none());
    }
}
