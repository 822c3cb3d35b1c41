//! Service accounts with their project-level roles

use super::client::GcpClient;
use crate::model::{attr, Provider, Resource, ServiceKind};
use anyhow::{Context, Result};
use serde_json::{json, Value};

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

/// Roles bound to `email` in a project IAM policy, in binding order
pub fn roles_for(policy: &Value, email: &str) -> Vec<String> {
    let member = format!("serviceAccount:{}", email);
    let Some(bindings) = policy.get("bindings").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    bindings
        .iter()
        .filter(|b| {
            b.get("members")
                .and_then(|m| m.as_array())
                .is_some_and(|members| members.iter().any(|m| m.as_str() == Some(member.as_str())))
        })
        .filter_map(|b| b.get("role").and_then(|r| r.as_str()).map(str::to_string))
        .collect()
}

pub fn service_account_record(account: &Value, policy: &Value, project_id: &str) -> Option<Resource> {
    let email = account.get("email").and_then(|v| v.as_str()).filter(|s| !s.is_empty())?;
    let name = match str_field(account, "displayName") {
        "" => email.split('@').next().unwrap_or(email),
        display => display,
    };
    let disabled = account
        .get("disabled")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    Some(
        Resource::new(Provider::Gcp, ServiceKind::ServiceAccount, "global", email, name)
            .with_attr(attr::PROJECT_ID, project_id)
            .with_attr("email", email)
            .with_attr("unique_id", str_field(account, "uniqueId"))
            .with_attr("disabled", disabled.to_string())
            .with_attr("description", str_field(account, "description"))
            .with_attr("roles", roles_for(policy, email).join(", ")),
    )
}

/// Service accounts of one project. Without the project policy the roles
/// cannot be resolved, so a policy failure fails the whole listing.
pub async fn fetch_service_accounts(client: &GcpClient, project_id: &str) -> Result<Vec<Resource>> {
    tracing::info!("Fetching service accounts for project {}", project_id);

    let policy_url = client.resourcemanager_url(&format!("projects/{}:getIamPolicy", project_id));
    let policy = client
        .post(&policy_url, &json!({}))
        .await
        .with_context(|| format!("Could not get IAM policy for project {}", project_id))?;

    let accounts_url = client.iam_url(&format!("projects/{}/serviceAccounts", project_id));
    let accounts = client
        .get_all(&accounts_url, "accounts")
        .await
        .with_context(|| format!("Could not list service accounts for project {}", project_id))?;

    let records: Vec<Resource> = accounts
        .iter()
        .filter_map(|a| service_account_record(a, &policy, project_id))
        .collect();
    tracing::debug!("Fetched {} service accounts for project {}", records.len(), project_id);
    Ok(records)
}
