//! Cloud Run services
//!
//! Uses the Knative-style v1 API, which lists services across every
//! location with `locations/-`.

use super::client::GcpClient;
use crate::model::{attr, short_name, Provider, Resource, ServiceKind};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

const LOCATION_LABEL: &str = "cloud.googleapis.com/location";
const CONNECTOR_ANNOTATION: &str = "run.googleapis.com/vpc-access-connector";
const NETWORK_INTERFACES_ANNOTATION: &str = "run.googleapis.com/network-interfaces";

/// Placeholder for services without VPC access
const NO_NETWORK: &str = "N/A";

#[derive(Debug, Default, Deserialize)]
struct NetworkInterface {
    #[serde(default)]
    network: String,
    #[serde(default)]
    subnetwork: String,
}

/// VPC and subnet short names from the direct egress annotation, e.g.
/// `[{"network":"vpc","subnetwork":"sub"}]`. Only the first interface
/// counts; empty fields come back as `None`.
pub fn parse_network_interfaces(annotation: &str) -> (Option<String>, Option<String>) {
    let interfaces: Vec<NetworkInterface> = match serde_json::from_str(annotation) {
        Ok(interfaces) => interfaces,
        Err(e) => {
            tracing::warn!("Could not parse network-interfaces annotation: {}", e);
            return (None, None);
        }
    };

    let Some(first) = interfaces.into_iter().next() else {
        return (None, None);
    };

    let non_empty = |link: &str| Some(short_name(link)).filter(|s| !s.is_empty());
    (non_empty(&first.network), non_empty(&first.subnetwork))
}

/// Record for one service. Services without a container spec are skipped.
pub fn service_record(item: &Value, project_id: &str) -> Option<Resource> {
    let metadata = item.get("metadata")?;
    let name = metadata.get("name").and_then(|v| v.as_str())?;
    let template = item.get("spec")?.get("template")?;
    let image = template
        .get("spec")?
        .get("containers")?
        .as_array()?
        .first()?
        .get("image")
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    let region = metadata
        .get("labels")
        .and_then(|l| l.get(LOCATION_LABEL))
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let url = item
        .get("status")
        .and_then(|s| s.get("url"))
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    let mut vpc = NO_NETWORK.to_string();
    let mut subnet = NO_NETWORK.to_string();

    if let Some(annotations) = template.get("metadata").and_then(|m| m.get("annotations")) {
        if let Some(connector) = annotations.get(CONNECTOR_ANNOTATION).and_then(|v| v.as_str()) {
            vpc = "via-connector".to_string();
            // The connector stands in for the subnet
            subnet = match short_name(connector) {
                s if s.is_empty() => NO_NETWORK.to_string(),
                s => s,
            };
        }

        if let Some(raw) = annotations
            .get(NETWORK_INTERFACES_ANNOTATION)
            .and_then(|v| v.as_str())
        {
            let (network, subnetwork) = parse_network_interfaces(raw);
            if let Some(network) = network {
                vpc = network;
            }
            if let Some(subnetwork) = subnetwork {
                subnet = subnetwork;
            }
        }
    }

    Some(
        Resource::new(Provider::Gcp, ServiceKind::CloudRun, region, name, name)
            .with_attr(attr::PROJECT_ID, project_id)
            .with_attr("url", url)
            .with_attr("image", image)
            .with_attr(attr::VPC, vpc)
            .with_attr(attr::SUBNET, subnet),
    )
}

/// Cloud Run services of one project
pub async fn fetch_services(client: &GcpClient, project_id: &str) -> Result<Vec<Resource>> {
    tracing::info!("Fetching Cloud Run services for project {}", project_id);
    let url = client.run_url(&format!("projects/{}/locations/-/services", project_id));
    let items = client
        .get_all(&url, "items")
        .await
        .with_context(|| format!("Could not list Cloud Run services for project {}", project_id))?;

    Ok(items.iter().filter_map(|i| service_record(i, project_id)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service(annotations: Value) -> Value {
        json!({
            "metadata": {
                "name": "api",
                "labels": { "cloud.googleapis.com/location": "us-central1" }
            },
            "spec": {
                "template": {
                    "metadata": { "annotations": annotations },
                    "spec": { "containers": [{ "image": "gcr.io/p1/api:latest" }] }
                }
            },
            "status": { "url": "https://api-xyz.a.run.app" }
        })
    }

    #[test]
    fn test_parse_network_interfaces_full_paths() {
        let (vpc, subnet) = parse_network_interfaces(
            r#"[{"network":"projects/my-project/global/networks/my-vpc","subnetwork":"projects/my-project/regions/us-central1/subnetworks/my-subnet"}]"#,
        );
        assert_eq!(vpc.as_deref(), Some("my-vpc"));
        assert_eq!(subnet.as_deref(), Some("my-subnet"));
    }

    #[test]
    fn test_parse_network_interfaces_edge_cases() {
        assert_eq!(
            parse_network_interfaces(r#"[{"network":"my-vpc"}]"#),
            (Some("my-vpc".to_string()), None)
        );
        assert_eq!(parse_network_interfaces("[]"), (None, None));
        assert_eq!(parse_network_interfaces("not json"), (None, None));
        assert_eq!(
            parse_network_interfaces(r#"[{"network":"a"},{"network":"b"}]"#).0.as_deref(),
            Some("a")
        );
    }

    #[test]
    fn test_service_without_vpc_access() {
        let rec = service_record(&service(json!({})), "p1").unwrap();
        assert_eq!(rec.id, "api");
        assert_eq!(rec.region, "us-central1");
        assert_eq!(rec.attr("image"), Some("gcr.io/p1/api:latest"));
        assert_eq!(rec.attr("url"), Some("https://api-xyz.a.run.app"));
        assert_eq!(rec.attr(attr::VPC), Some("N/A"));
        assert_eq!(rec.attr(attr::SUBNET), Some("N/A"));
    }

    #[test]
    fn test_service_with_connector() {
        let rec = service_record(
            &service(json!({
                "run.googleapis.com/vpc-access-connector":
                    "projects/p1/locations/us-central1/connectors/my-connector"
            })),
            "p1",
        )
        .unwrap();
        assert_eq!(rec.attr(attr::VPC), Some("via-connector"));
        assert_eq!(rec.attr(attr::SUBNET), Some("my-connector"));
    }

    #[test]
    fn test_direct_egress_wins_over_connector() {
        let rec = service_record(
            &service(json!({
                "run.googleapis.com/vpc-access-connector": "conn",
                "run.googleapis.com/network-interfaces": r#"[{"network":"vpc-a","subnetwork":"sub-a"}]"#
            })),
            "p1",
        )
        .unwrap();
        assert_eq!(rec.attr(attr::VPC), Some("vpc-a"));
        assert_eq!(rec.attr(attr::SUBNET), Some("sub-a"));
    }

    #[test]
    fn test_service_without_containers_is_skipped() {
        let item = json!({ "metadata": { "name": "x" }, "spec": { "template": { "spec": { "containers": [] } } } });
        assert!(service_record(&item, "p1").is_none());
    }
}
