//! Sync planning: turns a target (everything, one provider, one project)
//! into fetcher runs and the matching store update.

use super::{aggregate_scope, AggregateError, Aggregator, FetchWarning, Fetcher, HierarchySource, ScopedFetcher};
use crate::model::{Provider, Resource, ServiceKind};
use crate::store::{MergeReport, SnapshotStore};

/// What a sync covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTarget {
    All,
    Provider(Provider),
    /// One GCP project, merged into the existing snapshot
    Project(String),
}

impl SyncTarget {
    /// Build a target from the optional `provider` and `project` arguments.
    /// A project id is only meaningful together with `gcp`.
    pub fn from_args(provider: Option<&str>, project: Option<&str>) -> Result<Self, AggregateError> {
        let Some(provider) = provider else {
            return Ok(Self::All);
        };

        let provider = Provider::parse(provider).ok_or_else(|| {
            AggregateError::InvalidTarget(format!(
                "unknown provider '{}', expected 'aws' or 'gcp'",
                provider
            ))
        })?;

        match (provider, project) {
            (_, None) => Ok(Self::Provider(provider)),
            (Provider::Gcp, Some(id)) if !id.is_empty() => Ok(Self::Project(id.to_string())),
            (Provider::Gcp, Some(_)) => Err(AggregateError::InvalidTarget(
                "project id must not be empty".to_string(),
            )),
            (Provider::Aws, Some(_)) => Err(AggregateError::InvalidTarget(
                "a project id can only be given for gcp".to_string(),
            )),
        }
    }

    fn includes(&self, provider: Provider) -> bool {
        match self {
            Self::All => true,
            Self::Provider(p) => *p == provider,
            Self::Project(_) => provider == Provider::Gcp,
        }
    }
}

/// Fetchers available to a sync. GCP sources may be left out when the
/// target does not need them.
pub struct SyncSources<'a> {
    pub aws: Vec<Box<dyn Fetcher + 'a>>,
    pub gcp: Option<&'a dyn HierarchySource>,
    pub gcp_project: Option<&'a dyn ScopedFetcher>,
}

fn missing_gcp() -> AggregateError {
    AggregateError::InvalidTarget("GCP sources are not available for this sync".to_string())
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Record fetcher failures as warnings instead of aborting
    pub keep_going: bool,
    pub concurrent: bool,
    /// Skip discovery and walk this organization
    pub organization: Option<String>,
}

/// What happened to the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Replaced,
    Merged(MergeReport),
    /// Nothing was fetched, the previous snapshot is kept
    Skipped,
}

#[derive(Debug)]
pub struct SyncSummary {
    pub fetched: usize,
    pub outcome: SyncOutcome,
    pub warnings: Vec<FetchWarning>,
}

/// Fetch `target` and update `store` accordingly
pub async fn run_sync(
    target: &SyncTarget,
    sources: SyncSources<'_>,
    store: &SnapshotStore,
    options: &SyncOptions,
) -> Result<SyncSummary, AggregateError> {
    if let SyncTarget::Project(project_id) = target {
        let fetcher = sources.gcp_project.ok_or_else(missing_gcp)?;
        let records = aggregate_scope(fetcher, project_id).await?;
        let fetched = records.len();
        let scope = canonical_scope(&records, project_id).to_string();
        if scope != *project_id {
            tracing::info!("Project {} resolved to {}", project_id, scope);
        }
        let report = store.merge_scope(records, &scope)?;
        return Ok(SyncSummary {
            fetched,
            outcome: SyncOutcome::Merged(report),
            warnings: Vec::new(),
        });
    }

    let mut fetchers: Vec<Box<dyn Fetcher + '_>> = Vec::new();
    if target.includes(Provider::Aws) {
        fetchers.extend(sources.aws);
    }
    if target.includes(Provider::Gcp) {
        let gcp = sources.gcp.ok_or_else(missing_gcp)?;
        fetchers.push(match resolve_organization(gcp, options).await {
            Some(org) => {
                tracing::info!("Listing GCP hierarchy under organization {}", org);
                gcp.organization_fetcher(org)
            }
            None => {
                tracing::info!("No GCP organization, listing accessible projects");
                gcp.flat_fetcher()
            }
        });
    }

    let aggregator = Aggregator::new().concurrent(options.concurrent);
    let (records, warnings) = if options.keep_going {
        let outcome = aggregator.aggregate_all_partial(&fetchers).await;
        (outcome.resources, outcome.warnings)
    } else {
        (aggregator.aggregate_all(&fetchers).await?, Vec::new())
    };

    if records.is_empty() {
        tracing::warn!("Sync returned no resources, keeping the previous snapshot");
        return Ok(SyncSummary {
            fetched: 0,
            outcome: SyncOutcome::Skipped,
            warnings,
        });
    }

    store.save(&records)?;
    Ok(SyncSummary {
        fetched: records.len(),
        outcome: SyncOutcome::Replaced,
        warnings,
    })
}

/// The project id the API answered with. A project number or other alias
/// resolves to it, and children carry it in their `project_id`.
fn canonical_scope<'a>(records: &'a [Resource], requested: &'a str) -> &'a str {
    records
        .iter()
        .find(|r| r.service == ServiceKind::Project)
        .map(|r| r.id.as_str())
        .unwrap_or(requested)
}

async fn resolve_organization(source: &dyn HierarchySource, options: &SyncOptions) -> Option<String> {
    if let Some(org) = options.organization.as_deref().filter(|o| !o.is_empty()) {
        return Some(org.to_string());
    }

    match source.discover_organization().await {
        Ok(org) => org.filter(|o| !o.is_empty()),
        Err(e) => {
            tracing::warn!("Organization discovery failed, falling back to project listing: {:#}", e);
            None
        }
    }
}
