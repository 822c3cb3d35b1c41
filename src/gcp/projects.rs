//! GCP Projects
//!
//! Organization discovery, the organization-wide hierarchy walk and the
//! flat project listing. Every function returns normalized records.

use super::client::{add_query_params, GcpClient};
use crate::model::{attr, Provider, Resource, ServiceKind};
use anyhow::{Context, Result};
use serde_json::Value;

const PROJECT_ASSET: &str = "cloudresourcemanager.googleapis.com/Project";
const FOLDER_ASSET: &str = "cloudresourcemanager.googleapis.com/Folder";

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}

/// Project record from a Resource Manager v1 project
pub fn project_record(value: &Value) -> Option<Resource> {
    let project_id = str_field(value, "projectId").filter(|s| !s.is_empty())?;
    let name = str_field(value, "name").unwrap_or(project_id);
    let number = match value.get("projectNumber") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "N/A".to_string(),
    };

    Some(
        Resource::new(Provider::Gcp, ServiceKind::Project, "global", project_id, name)
            .with_attr(attr::STATE, str_field(value, "lifecycleState").unwrap_or("UNKNOWN"))
            .with_attr(attr::PROJECT_NUMBER, number),
    )
}

/// Project or folder record from a Cloud Asset search result
pub fn asset_record(value: &Value) -> Option<Resource> {
    let display_name = str_field(value, "displayName").unwrap_or_default();
    let state = str_field(value, "state").unwrap_or_default();

    match str_field(value, "assetType")? {
        PROJECT_ASSET => {
            let extra = value.get("additionalAttributes");
            let project_id = extra
                .and_then(|a| str_field(a, "projectId"))
                .filter(|s| !s.is_empty())?;
            let number = extra
                .and_then(|a| str_field(a, "projectNumber"))
                .unwrap_or("N/A");

            Some(
                Resource::new(Provider::Gcp, ServiceKind::Project, "global", project_id, display_name)
                    .with_attr(attr::STATE, state)
                    .with_attr(attr::PROJECT_NUMBER, number),
            )
        }
        FOLDER_ASSET => {
            let id = str_field(value, "name")?;
            Some(
                Resource::new(Provider::Gcp, ServiceKind::Folder, "global", id, display_name)
                    .with_attr(attr::STATE, state),
            )
        }
        _ => None,
    }
}

/// First organization the caller can see, as `organizations/<id>`
pub async fn discover_organization(client: &GcpClient) -> Result<Option<String>> {
    tracing::info!("Checking for a GCP organization");
    let url = client.resourcemanager_v3_url("organizations:search");
    let response = client
        .get(&url)
        .await
        .context("Failed during organization search")?;

    let org = response
        .get("organizations")
        .and_then(|v| v.as_array())
        .and_then(|orgs| orgs.first())
        .and_then(|org| {
            if let Some(org_name) = str_field(org, "displayName") {
                tracing::info!("Found GCP organization: {}", org_name);
            }
            str_field(org, "name").map(|s| s.to_string())
        });

    if org.is_none() {
        tracing::info!("No GCP organization found");
    }
    Ok(org)
}

/// Accept both `123` and `organizations/123`
pub fn organization_scope(organization: &str) -> String {
    if organization.contains('/') {
        organization.to_string()
    } else {
        format!("organizations/{}", organization)
    }
}

/// Projects and folders under `organization`, in API order
pub async fn search_organization(client: &GcpClient, organization: &str) -> Result<Vec<Resource>> {
    let scope = organization_scope(organization);
    tracing::info!("Fetching GCP hierarchy for {}", scope);

    let url = add_query_params(
        &client.asset_url(&format!("{}:searchAllResources", scope)),
        &[("assetTypes", PROJECT_ASSET), ("assetTypes", FOLDER_ASSET)],
    );
    let results = client
        .get_all(&url, "results")
        .await
        .context("Failed during asset search")?;

    Ok(results.iter().filter_map(asset_record).collect())
}

/// Every project the caller can list
pub async fn list_projects(client: &GcpClient) -> Result<Vec<Resource>> {
    let url = client.resourcemanager_url("projects");
    let projects = client
        .get_all(&url, "projects")
        .await
        .context("Failed to list projects")?;

    Ok(projects.iter().filter_map(project_record).collect())
}

/// One project by id
pub async fn get_project(client: &GcpClient, project_id: &str) -> Result<Resource> {
    let url = client.resourcemanager_url(&format!("projects/{}", project_id));
    let response = client
        .get(&url)
        .await
        .with_context(|| format!("Failed to get project {}", project_id))?;

    project_record(&response).with_context(|| format!("Project {} has no projectId", project_id))
}
