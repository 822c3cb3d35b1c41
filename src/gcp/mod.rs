//! GCP API interaction module
//!
//! This module provides the fetchers that turn Google Cloud Platform APIs
//! into normalized records.
//!
//! # Module Structure
//!
//! - [`auth`] - ADC or static-token authentication
//! - [`client`] - GCP client, overridable endpoints and pagination
//! - [`http`] - HTTP utilities for REST API calls
//! - [`projects`] - Organization discovery, hierarchy walk, project listing
//! - [`compute`] - Network and load balancer resources
//! - [`run`] - Cloud Run services
//! - [`iam`] - Service accounts and their roles
//!
//! # Example
//!
//! ```ignore
//! use infrakit::gcp::{client::GcpClient, GcpInventory};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let inventory = GcpInventory::new(GcpClient::connect().await?);
//!     let records = inventory.project_fetcher().fetch_scope("my-project").await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod compute;
pub mod http;
pub mod iam;
pub mod projects;
pub mod run;

use crate::aggregate::{Fetcher, HierarchySource, ScopedFetcher};
use crate::model::{Resource, ServiceKind};
use anyhow::Result;
use client::GcpClient;
use futures::future::BoxFuture;
use futures::FutureExt;

/// Entry point for every GCP fetcher
#[derive(Clone)]
pub struct GcpInventory {
    client: GcpClient,
}

impl GcpInventory {
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }

    pub fn project_fetcher(&self) -> ProjectFetcher<'_> {
        ProjectFetcher {
            client: &self.client,
        }
    }
}

impl HierarchySource for GcpInventory {
    fn discover_organization(&self) -> BoxFuture<'_, Result<Option<String>>> {
        projects::discover_organization(&self.client).boxed()
    }

    fn organization_fetcher(&self, organization: String) -> Box<dyn Fetcher + '_> {
        Box::new(OrganizationFetcher {
            client: &self.client,
            organization,
        })
    }

    fn flat_fetcher(&self) -> Box<dyn Fetcher + '_> {
        Box::new(ProjectListFetcher {
            client: &self.client,
        })
    }
}

/// Everything below one project. Each sub-fetch that fails is logged and
/// skipped so one broken API does not hide the rest.
pub async fn project_children(client: &GcpClient, project_id: &str) -> Vec<Resource> {
    let mut resources = compute::fetch_network(client, project_id).await;

    match run::fetch_services(client, project_id).await {
        Ok(services) => resources.extend(services),
        Err(e) => tracing::warn!("{:#}", e),
    }

    resources.extend(compute::fetch_app_infra(client, project_id).await);

    match iam::fetch_service_accounts(client, project_id).await {
        Ok(accounts) => resources.extend(accounts),
        Err(e) => tracing::warn!("{:#}", e),
    }

    resources
}

/// Keep hierarchy records in order, each project followed by its children
async fn expand_projects(client: &GcpClient, hierarchy: Vec<Resource>) -> Vec<Resource> {
    let mut all = Vec::with_capacity(hierarchy.len());

    for record in hierarchy {
        let project_id = (record.service == ServiceKind::Project).then(|| record.id.clone());
        all.push(record);

        if let Some(project_id) = project_id {
            all.extend(project_children(client, &project_id).await);
        }
    }

    all
}

/// Walks an organization through the Cloud Asset API
pub struct OrganizationFetcher<'a> {
    client: &'a GcpClient,
    organization: String,
}

impl Fetcher for OrganizationFetcher<'_> {
    fn name(&self) -> &str {
        "gcp-organization"
    }

    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Resource>>> {
        async move {
            let hierarchy = projects::search_organization(self.client, &self.organization).await?;
            tracing::info!("Found {} GCP folders and projects", hierarchy.len());
            Ok(expand_projects(self.client, hierarchy).await)
        }
        .boxed()
    }
}

/// Lists every accessible project when there is no organization
pub struct ProjectListFetcher<'a> {
    client: &'a GcpClient,
}

impl Fetcher for ProjectListFetcher<'_> {
    fn name(&self) -> &str {
        "gcp-projects"
    }

    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Resource>>> {
        async move {
            let projects = projects::list_projects(self.client).await?;
            tracing::info!("Found {} GCP projects", projects.len());
            Ok(expand_projects(self.client, projects).await)
        }
        .boxed()
    }
}

/// One project: its own record plus everything below it
pub struct ProjectFetcher<'a> {
    client: &'a GcpClient,
}

impl ScopedFetcher for ProjectFetcher<'_> {
    fn name(&self) -> &str {
        "gcp-project"
    }

    fn fetch_scope<'a>(&'a self, scope_id: &'a str) -> BoxFuture<'a, Result<Vec<Resource>>> {
        async move {
            let project = projects::get_project(self.client, scope_id).await?;
            Ok(expand_projects(self.client, vec![project]).await)
        }
        .boxed()
    }
}
