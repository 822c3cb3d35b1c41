//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining authentication,
//! HTTP functionality and the base URL of every API the fetchers call.

use super::auth::GcpCredentials;
use super::http::GcpHttpClient;
use anyhow::{Context, Result};
use serde_json::Value;
use url::Url;

/// Base URLs of the GCP APIs in use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub compute: String,
    pub resource_manager_v1: String,
    pub resource_manager_v3: String,
    pub asset: String,
    pub run: String,
    pub iam: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            compute: "https://compute.googleapis.com/compute/v1".to_string(),
            resource_manager_v1: "https://cloudresourcemanager.googleapis.com/v1".to_string(),
            resource_manager_v3: "https://cloudresourcemanager.googleapis.com/v3".to_string(),
            asset: "https://cloudasset.googleapis.com/v1".to_string(),
            run: "https://run.googleapis.com/v1".to_string(),
            iam: "https://iam.googleapis.com/v1".to_string(),
        }
    }
}

impl Endpoints {
    /// Every API under one host, e.g. a local mock server.
    /// `http://host` maps compute to `http://host/compute/v1` and so on.
    pub fn all_at(base: &str) -> Result<Self> {
        let parsed = Url::parse(base).with_context(|| format!("Invalid base URL: {}", base))?;
        let root = parsed.as_str().trim_end_matches('/');

        Ok(Self {
            compute: format!("{}/compute/v1", root),
            resource_manager_v1: format!("{}/resourcemanager/v1", root),
            resource_manager_v3: format!("{}/resourcemanager/v3", root),
            asset: format!("{}/asset/v1", root),
            run: format!("{}/run/v1", root),
            iam: format!("{}/iam/v1", root),
        })
    }
}

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: GcpHttpClient,
    pub endpoints: Endpoints,
}

impl GcpClient {
    pub fn new(credentials: GcpCredentials, endpoints: Endpoints) -> Result<Self> {
        Ok(Self {
            credentials,
            http: GcpHttpClient::new()?,
            endpoints,
        })
    }

    /// Client against the real APIs with credentials from the environment
    pub async fn connect() -> Result<Self> {
        let credentials = GcpCredentials::from_env_or_adc()
            .await
            .context("Failed to initialize GCP credentials")?;
        Self::new(credentials, Endpoints::default())
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str) -> Result<Value> {
        let token = self.credentials.get_token().await?;
        self.http.get(url, &token).await
    }

    /// Make a POST request to a GCP API
    pub async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        let token = self.credentials.get_token().await?;
        self.http.post(url, &token, body).await
    }

    /// Follow `nextPageToken` and collect the `items_key` array of every page
    pub async fn get_all(&self, url: &str, items_key: &str) -> Result<Vec<Value>> {
        let mut all_items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page_url = match page_token.as_deref() {
                Some(token) => add_query_params(url, &[("pageToken", token)]),
                None => url.to_string(),
            };
            let response = self.get(&page_url).await?;

            if let Some(items) = response.get(items_key).and_then(|v| v.as_array()) {
                all_items.extend(items.iter().cloned());
            }

            page_token = next_page_token(&response);
            if page_token.is_none() {
                break;
            }
        }

        Ok(all_items)
    }

    /// Like [`get_all`](Self::get_all) for `aggregated/` endpoints, whose
    /// items are keyed by region or zone
    pub async fn get_all_aggregated(&self, url: &str) -> Result<Vec<Value>> {
        let mut all_items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page_url = match page_token.as_deref() {
                Some(token) => add_query_params(url, &[("pageToken", token)]),
                None => url.to_string(),
            };
            let response = self.get(&page_url).await?;
            page_token = next_page_token(&response);
            all_items.extend(flatten_aggregated_response(response));

            if page_token.is_none() {
                break;
            }
        }

        Ok(all_items)
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build Compute Engine API URL
    pub fn compute_url(&self, project_id: &str, path: &str) -> String {
        format!("{}/projects/{}/{}", self.endpoints.compute, project_id, path)
    }

    /// Build global Compute Engine API URL
    pub fn compute_global_url(&self, project_id: &str, resource: &str) -> String {
        self.compute_url(project_id, &format!("global/{}", resource))
    }

    /// Build aggregated Compute Engine API URL (all regions)
    pub fn compute_aggregated_url(&self, project_id: &str, resource: &str) -> String {
        self.compute_url(project_id, &format!("aggregated/{}", resource))
    }

    /// Build Resource Manager v1 API URL
    pub fn resourcemanager_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.resource_manager_v1, path)
    }

    /// Build Resource Manager v3 API URL
    pub fn resourcemanager_v3_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.resource_manager_v3, path)
    }

    /// Build Cloud Asset API URL
    pub fn asset_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.asset, path)
    }

    /// Build Cloud Run API URL
    pub fn run_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.run, path)
    }

    /// Build IAM API URL
    pub fn iam_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.iam, path)
    }
}

fn next_page_token(response: &Value) -> Option<String> {
    response
        .get("nextPageToken")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Append URL-encoded query parameters
pub fn add_query_params(url: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }

    let query_parts: Vec<String> = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect();

    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, separator, query_parts.join("&"))
}

/// Flatten an aggregated API response into a plain item list.
/// Aggregated responses have format:
/// `{ "items": { "regions/us-central1": { "backendServices": [...] }, ... } }`
pub fn flatten_aggregated_response(response: Value) -> Vec<Value> {
    let Some(items) = response.get("items").and_then(|v| v.as_object()) else {
        return Vec::new();
    };

    let mut all_items: Vec<Value> = Vec::new();

    for scope_data in items.values() {
        let Some(obj) = scope_data.as_object() else {
            continue;
        };
        for (key, value) in obj {
            // "warning" marks scopes with no resources
            if key == "warning" {
                continue;
            }
            if let Some(arr) = value.as_array() {
                all_items.extend(arr.iter().cloned());
            }
        }
    }

    all_items
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_query_params_encodes_values() {
        assert_eq!(
            add_query_params("https://x/v1/projects", &[("pageToken", "a b/c")]),
            "https://x/v1/projects?pageToken=a%20b%2Fc"
        );
        assert_eq!(
            add_query_params("https://x/search?assetTypes=t", &[("pageToken", "p")]),
            "https://x/search?assetTypes=t&pageToken=p"
        );
        assert_eq!(add_query_params("https://x", &[]), "https://x");
    }

    #[test]
    fn test_flatten_skips_warning_scopes() {
        let response = json!({
            "items": {
                "regions/us-central1": { "backendServices": [{ "name": "a" }] },
                "regions/europe-west1": { "warning": { "code": "NO_RESULTS_ON_PAGE" } },
                "global": { "backendServices": [{ "name": "b" }, { "name": "c" }] }
            }
        });

        let names: Vec<String> = flatten_aggregated_response(response)
            .iter()
            .map(|v| v["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"b".to_string()));
    }

    #[test]
    fn test_flatten_without_items() {
        assert!(flatten_aggregated_response(json!({})).is_empty());
    }

    #[test]
    fn test_endpoints_all_at_one_host() {
        let endpoints = Endpoints::all_at("http://127.0.0.1:9999/").unwrap();
        assert_eq!(endpoints.compute, "http://127.0.0.1:9999/compute/v1");
        assert_eq!(endpoints.asset, "http://127.0.0.1:9999/asset/v1");
        assert!(Endpoints::all_at("not a url").is_err());
    }

    #[test]
    fn test_url_helpers() {
        let client = GcpClient::new(GcpCredentials::from_static("t"), Endpoints::default()).unwrap();
        assert_eq!(
            client.compute_aggregated_url("p1", "urlMaps"),
            "https://compute.googleapis.com/compute/v1/projects/p1/aggregated/urlMaps"
        );
        assert_eq!(
            client.compute_global_url("p1", "networks"),
            "https://compute.googleapis.com/compute/v1/projects/p1/global/networks"
        );
    }
}
