//! Integration tests for the local query API
//!
//! The router is served on an ephemeral port and queried with reqwest.

use infrakit::model::{attr, Provider, Resource, ServiceKind};
use infrakit::server::router;
use infrakit::store::SnapshotStore;
use reqwest::StatusCode;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

const LINK: &str = "https://www.googleapis.com/compute/v1/projects/p1/global";

/// Serve `store` and return the base URL
async fn spawn_server(store: SnapshotStore) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral port should bind");
    let addr = listener.local_addr().expect("listener has an address");

    tokio::spawn(async move {
        axum::serve(listener, router(store))
            .await
            .expect("server should run");
    });

    format!("http://{}", addr)
}

async fn get(url: &str) -> (StatusCode, Value) {
    let response = reqwest::get(url).await.expect("request should succeed");
    let status = response.status();
    let body = response.json::<Value>().await.expect("body should be JSON");
    (status, body)
}

fn gcp(service: ServiceKind, name: &str) -> Resource {
    Resource::new(Provider::Gcp, service, "global", name, name).with_attr(attr::PROJECT_ID, "p1")
}

fn snapshot() -> Vec<Resource> {
    vec![
        Resource::new(Provider::Gcp, ServiceKind::Project, "global", "p1", "Web Platform"),
        gcp(ServiceKind::Vpc, "main-vpc"),
        gcp(ServiceKind::CloudRun, "web"),
        gcp(ServiceKind::BackendService, "web-backend"),
        gcp(ServiceKind::UrlMap, "web-map")
            .with_attr(attr::DEFAULT_SERVICE, format!("{}/backendServices/web-backend", LINK)),
        gcp(ServiceKind::TargetHttpsProxy, "web-proxy")
            .with_attr(attr::URL_MAP, format!("{}/urlMaps/web-map", LINK)),
        gcp(ServiceKind::ForwardingRule, "web-https")
            .with_attr(attr::TARGET, format!("{}/targetHttpsProxies/web-proxy", LINK))
            .with_attr(attr::IP_ADDRESS, "34.120.0.10"),
        Resource::new(Provider::Aws, ServiceKind::Ec2, "us-east-1", "i-0abc", "web-server"),
    ]
}

async fn seeded_server() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(dir.path());
    store.save(&snapshot()).unwrap();
    let base = spawn_server(store).await;
    (dir, base)
}

mod api_tests {
    use super::*;

    /// Missing snapshot is reported as 404 with an error message
    #[tokio::test]
    async fn test_missing_snapshot_is_not_found() {
        let dir = TempDir::new().unwrap();
        let base = spawn_server(SnapshotStore::new(dir.path())).await;

        let (status, body) = get(&format!("{}/api/snapshot", base)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().is_some());
    }

    /// Required query parameters are enforced
    #[tokio::test]
    async fn test_missing_parameters_are_bad_requests() {
        let (_dir, base) = seeded_server().await;

        let (status, body) = get(&format!("{}/api/resources", base)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("parent"));

        let (status, _) = get(&format!("{}/api/lb-flows?project=", base)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    /// Search only returns projects and EC2 instances
    #[tokio::test]
    async fn test_search() {
        let (_dir, base) = seeded_server().await;

        let (status, body) = get(&format!("{}/api/search?q=WEB", base)).await;
        assert_eq!(status, StatusCode::OK);

        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["p1", "i-0abc"]);

        let (_, body) = get(&format!("{}/api/search", base)).await;
        assert_eq!(body, Value::Array(vec![]));
    }

    /// Children of a project are grouped by service tag
    #[tokio::test]
    async fn test_resources_grouped_by_service() {
        let (_dir, base) = seeded_server().await;

        let (status, body) = get(&format!("{}/api/resources?parent=p1", base)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["vpc"][0]["id"], "main-vpc");
        assert_eq!(body["cloudrun"][0]["id"], "web");
        assert!(body.get("project").is_none());
        assert!(body.get("ec2").is_none());
    }

    /// Flows are traced from the stored snapshot
    #[tokio::test]
    async fn test_lb_flows() {
        let (_dir, base) = seeded_server().await;

        let (status, body) = get(&format!("{}/api/lb-flows?project=p1", base)).await;
        assert_eq!(status, StatusCode::OK);

        let flows = body.as_array().unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0]["name"], "web-https");
        assert_eq!(flows[0]["frontend"]["ipAddress"], "34.120.0.10");
        assert_eq!(flows[0]["backend"]["name"], "web-backend");
        assert_eq!(flows[0]["backend"]["type"], "Cloud Run");
        assert_eq!(flows[0]["backend"]["serviceName"], "web");

        let (_, body) = get(&format!("{}/api/lb-flows?project=other", base)).await;
        assert_eq!(body, Value::Array(vec![]));
    }

    /// A sync finishing after startup is visible without a restart
    #[tokio::test]
    async fn test_snapshot_reloaded_per_request() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let base = spawn_server(store.clone()).await;

        let (status, _) = get(&format!("{}/api/snapshot", base)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        store.save(&snapshot()).unwrap();
        let (status, body) = get(&format!("{}/api/snapshot", base)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), snapshot().len());
    }
}
