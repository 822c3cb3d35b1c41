//! AWS fetchers
//!
//! EC2 instances and IAM roles, read through the `aws` CLI.
//!
//! # Architecture
//!
//! - [`cli`] runs the CLI and parses its JSON output
//! - [`ec2_records`] / [`role_record`] turn that output into records
//! - [`Ec2Fetcher`] / [`IamRoleFetcher`] plug both into the orchestrator

pub mod cli;

use crate::aggregate::Fetcher;
use crate::model::{Provider, Resource, ServiceKind};
use anyhow::{Context, Result};
use cli::AwsCli;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;

const NO_NAME: &str = "N/A";

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|a| a.as_slice())
        .unwrap_or_default()
}

/// Records from `aws ec2 describe-instances` output
pub fn ec2_records(output: &Value, region: &str) -> Vec<Resource> {
    array(output, "Reservations")
        .iter()
        .flat_map(|reservation| array(reservation, "Instances"))
        .filter_map(|instance| {
            let id = str_field(instance, "InstanceId");
            if id.is_empty() {
                return None;
            }

            let name = array(instance, "Tags")
                .iter()
                .find(|tag| str_field(tag, "Key") == "Name")
                .map(|tag| str_field(tag, "Value"))
                .unwrap_or(NO_NAME);
            let state = instance
                .get("State")
                .map(|s| str_field(s, "Name"))
                .unwrap_or_default();

            Some(
                Resource::new(Provider::Aws, ServiceKind::Ec2, region, id, name)
                    .with_attr("instance_type", str_field(instance, "InstanceType"))
                    .with_attr("state", state),
            )
        })
        .collect()
}

/// Role record with attached policies first, then inline ones
pub fn role_record(role: &Value, attached: &[String], inline: &[String]) -> Option<Resource> {
    let arn = str_field(role, "Arn");
    let name = str_field(role, "RoleName");
    if arn.is_empty() || name.is_empty() {
        return None;
    }

    let policies: Vec<&str> = attached.iter().chain(inline).map(String::as_str).collect();
    Some(
        Resource::new(Provider::Aws, ServiceKind::Iam, "global", arn, name)
            .with_attr("policies", policies.join(", ")),
    )
}

pub struct Ec2Fetcher {
    cli: Arc<dyn AwsCli>,
}

impl Ec2Fetcher {
    pub fn new(cli: Arc<dyn AwsCli>) -> Self {
        Self { cli }
    }
}

impl Fetcher for Ec2Fetcher {
    fn name(&self) -> &str {
        "aws-ec2"
    }

    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Resource>>> {
        async move {
            tracing::info!("Fetching EC2 instances");
            let region = self.cli.region().await?;
            let output = self
                .cli
                .run_json(&["ec2", "describe-instances"])
                .await
                .context("Failed to describe EC2 instances")?;

            let records = ec2_records(&output, &region);
            tracing::info!("Fetched {} EC2 instances", records.len());
            Ok(records)
        }
        .boxed()
    }
}

pub struct IamRoleFetcher {
    cli: Arc<dyn AwsCli>,
}

impl IamRoleFetcher {
    pub fn new(cli: Arc<dyn AwsCli>) -> Self {
        Self { cli }
    }

    /// One of the per-role policy listings; failures are logged and count
    /// as no policies
    async fn policy_names(&self, subcommand: &str, role: &str, list_key: &str, name_key: Option<&str>) -> Vec<String> {
        let args = ["iam", subcommand, "--role-name", role];
        let output = match self.cli.run_json(&args).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Could not run {} for role {}: {:#}", subcommand, role, e);
                return Vec::new();
            }
        };

        array(&output, list_key)
            .iter()
            .filter_map(|entry| match name_key {
                Some(key) => entry.get(key).and_then(|v| v.as_str()),
                None => entry.as_str(),
            })
            .map(str::to_string)
            .collect()
    }
}

impl Fetcher for IamRoleFetcher {
    fn name(&self) -> &str {
        "aws-iam"
    }

    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Resource>>> {
        async move {
            tracing::info!("Fetching IAM roles");
            let output = self
                .cli
                .run_json(&["iam", "list-roles"])
                .await
                .context("Failed to list IAM roles")?;

            let mut records = Vec::new();
            for role in array(&output, "Roles") {
                let role_name = str_field(role, "RoleName");
                if role_name.is_empty() {
                    continue;
                }

                let attached = self
                    .policy_names("list-attached-role-policies", role_name, "AttachedPolicies", Some("PolicyName"))
                    .await;
                let inline = self
                    .policy_names("list-role-policies", role_name, "PolicyNames", None)
                    .await;

                records.extend(role_record(role, &attached, &inline));
            }

            tracing::info!("Fetched {} IAM roles", records.len());
            Ok(records)
        }
        .boxed()
    }
}
