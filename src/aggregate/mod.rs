//! Aggregation Orchestrator
//!
//! Drives provider fetchers and concatenates their output in a fixed order.
//! Fetchers are trait objects so the orchestrator never knows which cloud
//! API sits behind them.
//!
//! - [`Aggregator::aggregate_all`] fails on the first fetcher error
//! - [`Aggregator::aggregate_all_partial`] keeps going and reports failures
//!   as warnings next to whatever succeeded
//! - [`aggregate_scope`] runs one fetcher bound to one project
//!
//! With [`Aggregator::concurrent`] fetchers run together, but results are
//! still concatenated in fetcher order.

mod sync;

pub use sync::{run_sync, SyncOptions, SyncOutcome, SyncSources, SyncSummary, SyncTarget};

use crate::model::Resource;
use crate::store::StoreError;
use anyhow::Result;
use futures::future::{join_all, BoxFuture};
use thiserror::Error;

/// Produces normalized records for a whole provider (or organization)
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &str;
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Resource>>>;
}

/// Produces normalized records for one scope (project/account)
pub trait ScopedFetcher: Send + Sync {
    fn name(&self) -> &str;
    fn fetch_scope<'a>(&'a self, scope_id: &'a str) -> BoxFuture<'a, Result<Vec<Resource>>>;
}

/// Provider with an optional organization level above its projects
pub trait HierarchySource: Send + Sync {
    /// Organization visible to the caller, `None` when there is none
    fn discover_organization(&self) -> BoxFuture<'_, Result<Option<String>>>;

    /// Fetcher that walks the whole organization
    fn organization_fetcher(&self, organization: String) -> Box<dyn Fetcher + '_>;

    /// Fetcher that lists every accessible project without an organization
    fn flat_fetcher(&self) -> Box<dyn Fetcher + '_>;
}

#[derive(Debug, Error)]
pub enum AggregateError {
    /// A fetcher failed; the aggregation produced nothing
    #[error("fetcher {fetcher} failed: {source:#}")]
    Upstream {
        fetcher: String,
        #[source]
        source: anyhow::Error,
    },

    /// Arguments do not describe a valid sync target
    #[error("{0}")]
    InvalidTarget(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A fetcher failure recorded by the partial mode
#[derive(Debug)]
pub struct FetchWarning {
    pub fetcher: String,
    pub error: anyhow::Error,
}

/// Result of [`Aggregator::aggregate_all_partial`]
#[derive(Debug, Default)]
pub struct AggregateOutcome {
    pub resources: Vec<Resource>,
    pub warnings: Vec<FetchWarning>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    concurrent: bool,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run fetchers together instead of one after another
    pub fn concurrent(mut self, enabled: bool) -> Self {
        self.concurrent = enabled;
        self
    }

    /// Concatenate every fetcher's records; the first failure aborts.
    pub async fn aggregate_all(
        &self,
        fetchers: &[Box<dyn Fetcher + '_>],
    ) -> Result<Vec<Resource>, AggregateError> {
        let mut all = Vec::new();

        if self.concurrent {
            let results = join_all(fetchers.iter().map(|f| f.fetch())).await;
            for (fetcher, result) in fetchers.iter().zip(results) {
                all.extend(collect(fetcher.as_ref(), result)?);
            }
        } else {
            for fetcher in fetchers {
                let result = fetcher.fetch().await;
                all.extend(collect(fetcher.as_ref(), result)?);
            }
        }

        Ok(all)
    }

    /// Concatenate the records of every fetcher that succeeded
    pub async fn aggregate_all_partial(&self, fetchers: &[Box<dyn Fetcher + '_>]) -> AggregateOutcome {
        let results = if self.concurrent {
            join_all(fetchers.iter().map(|f| f.fetch())).await
        } else {
            let mut results = Vec::with_capacity(fetchers.len());
            for fetcher in fetchers {
                results.push(fetcher.fetch().await);
            }
            results
        };

        let mut outcome = AggregateOutcome::default();
        for (fetcher, result) in fetchers.iter().zip(results) {
            match result {
                Ok(items) => {
                    tracing::info!("{}: {} resources", fetcher.name(), items.len());
                    outcome.resources.extend(items);
                }
                Err(error) => {
                    tracing::warn!("{} failed, continuing: {:#}", fetcher.name(), error);
                    outcome.warnings.push(FetchWarning {
                        fetcher: fetcher.name().to_string(),
                        error,
                    });
                }
            }
        }
        outcome
    }
}

fn collect(fetcher: &dyn Fetcher, result: Result<Vec<Resource>>) -> Result<Vec<Resource>, AggregateError> {
    match result {
        Ok(items) => {
            tracing::info!("{}: {} resources", fetcher.name(), items.len());
            Ok(items)
        }
        Err(source) => {
            tracing::error!("{} failed: {:#}", fetcher.name(), source);
            Err(AggregateError::Upstream {
                fetcher: fetcher.name().to_string(),
                source,
            })
        }
    }
}

/// Sequential fail-fast aggregation over `fetchers`
pub async fn aggregate_all(fetchers: &[Box<dyn Fetcher + '_>]) -> Result<Vec<Resource>, AggregateError> {
    Aggregator::new().aggregate_all(fetchers).await
}

/// Fetch one scope; a failure is fatal
pub async fn aggregate_scope(
    fetcher: &dyn ScopedFetcher,
    scope_id: &str,
) -> Result<Vec<Resource>, AggregateError> {
    match fetcher.fetch_scope(scope_id).await {
        Ok(items) => {
            tracing::info!("{} [{}]: {} resources", fetcher.name(), scope_id, items.len());
            Ok(items)
        }
        Err(source) => Err(AggregateError::Upstream {
            fetcher: format!("{} [{}]", fetcher.name(), scope_id),
            source,
        }),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Canned fetchers shared by the orchestrator tests

    use super::*;
    use crate::model::{Provider, ServiceKind};
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub fn record(id: &str) -> Resource {
        Resource::new(Provider::Aws, ServiceKind::Ec2, "us-east-1", id, id)
    }

    pub struct StaticFetcher {
        pub name: String,
        pub result: std::result::Result<Vec<Resource>, String>,
        pub calls: AtomicUsize,
    }

    impl StaticFetcher {
        pub fn ok(name: &str, ids: &[&str]) -> Self {
            Self {
                name: name.to_string(),
                result: Ok(ids.iter().map(|id| record(id)).collect()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(name: &str, message: &str) -> Self {
            Self {
                name: name.to_string(),
                result: Err(message.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Fetcher for StaticFetcher {
        fn name(&self) -> &str {
            &self.name
        }

        fn fetch(&self) -> BoxFuture<'_, Result<Vec<Resource>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = self.result.clone().map_err(|m| anyhow::anyhow!(m));
            async move { result }.boxed()
        }
    }

    impl ScopedFetcher for StaticFetcher {
        fn name(&self) -> &str {
            &self.name
        }

        fn fetch_scope<'a>(&'a self, _scope_id: &'a str) -> BoxFuture<'a, Result<Vec<Resource>>> {
            Fetcher::fetch(self)
        }
    }
}
