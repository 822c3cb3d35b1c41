//! Load balancer flow records
//!
//! Derived from the snapshot on every query and never persisted.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerFlow {
    pub name: String,
    pub project_id: String,
    pub frontend: FrontendConfig,
    #[serde(default)]
    pub routing_rules: Vec<RoutingRule>,
    pub backend: BackendConfig,
    pub cloud_armor: CloudArmorPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendConfig {
    pub ip_address: String,
    pub port_range: String,
    pub protocol: String,
    #[serde(default)]
    pub certificates: Vec<String>,
    pub ssl_policy: String,
    pub load_balancing_scheme: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRule {
    pub hosts: Vec<String>,
    pub path_matcher: String,
}

impl RoutingRule {
    /// Placeholder rule recorded when a URL map only has a default route
    pub fn default_route() -> Self {
        Self {
            hosts: vec!["all".to_string()],
            path_matcher: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    pub name: String,
    /// "Cloud Run" or empty when the backend kind is unknown
    #[serde(rename = "type")]
    pub kind: String,
    pub service_name: String,
    pub region: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudArmorPolicy {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<CloudArmorRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudArmorRule {
    pub priority: i64,
    pub action: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "match", default)]
    pub match_expr: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_uses_camel_case_field_names() {
        let flow = LoadBalancerFlow {
            name: "test-lb".into(),
            project_id: "my-project".into(),
            frontend: FrontendConfig {
                ip_address: "34.120.45.67".into(),
                port_range: "443".into(),
                protocol: "HTTPS".into(),
                certificates: vec!["cert-1".into(), "cert-2".into()],
                ssl_policy: "modern-ssl".into(),
                load_balancing_scheme: "EXTERNAL_MANAGED".into(),
            },
            routing_rules: vec![RoutingRule::default_route()],
            backend: BackendConfig {
                name: "backend-1".into(),
                kind: "Cloud Run".into(),
                service_name: "my-service".into(),
                region: "us-central1".into(),
            },
            cloud_armor: CloudArmorPolicy {
                name: "security-policy-1".into(),
                rules: vec![CloudArmorRule {
                    priority: 1000,
                    action: "allow".into(),
                    description: "Allow all traffic".into(),
                    match_expr: "*".into(),
                }],
            },
        };

        let value = serde_json::to_value(&flow).unwrap();
        assert_eq!(value["projectId"], "my-project");
        assert_eq!(value["frontend"]["ipAddress"], "34.120.45.67");
        assert_eq!(value["frontend"]["sslPolicy"], "modern-ssl");
        assert_eq!(value["routingRules"][0]["pathMatcher"], "default");
        assert_eq!(value["backend"]["type"], "Cloud Run");
        assert_eq!(value["backend"]["serviceName"], "my-service");
        assert_eq!(value["cloudArmor"]["rules"][0]["match"], "*");

        let back: LoadBalancerFlow = serde_json::from_value(value).unwrap();
        assert_eq!(back, flow);
    }
}
