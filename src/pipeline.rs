//! Concurrent branch retrieval.
//!
//! [`fan_out`] spawns one task per repository; every task sends exactly one
//! [`RepositoryResult`] on a shared channel. [`collect`] receives exactly as
//! many messages as tasks were launched and keeps the successes.

use std::{sync::Arc, time::Duration};

use anyhow::{Result as AnyhowResult, bail};
use tokio::sync::{Semaphore, mpsc};

use crate::gh_api::{ApiError, BranchFetcher, GithubRepo, prepare_branch_url};

#[derive(Debug)]
pub enum Outcome {
    Success,
    Failure(ApiError),
}

/// Outcome of one repository's branch fetch. `branches` is empty on failure.
#[derive(Debug)]
pub struct RepositoryResult {
    pub name: String,
    pub branches: Vec<String>,
    pub outcome: Outcome,
}

impl RepositoryResult {
    fn from_fetch(name: String, fetched: Result<Vec<String>, ApiError>) -> Self {
        match fetched {
            Ok(branches) => Self {
                name,
                branches,
                outcome: Outcome::Success,
            },
            Err(e) => Self {
                name,
                branches: Vec::new(),
                outcome: Outcome::Failure(e),
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FanOutOptions {
    /// Maximum number of in-flight fetches; `None` launches everything at once.
    pub task_limit: Option<usize>,
    /// Per-repository deadline for the branch fetch.
    pub timeout: Option<Duration>,
}

/// Result of the fan-in: successes in arrival order plus the failure count.
#[derive(Debug, Default)]
pub struct Collected {
    pub successes: Vec<RepositoryResult>,
    pub failed: usize,
}

/// Spawns one fetch task per repository. Returns the number of launched tasks
/// together with the receiving end of the collection channel.
pub fn fan_out<F>(
    repos: Vec<GithubRepo>,
    fetcher: Arc<F>,
    options: &FanOutOptions,
) -> (usize, mpsc::UnboundedReceiver<RepositoryResult>)
where
    F: BranchFetcher + ?Sized + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let limiter = options
        .task_limit
        .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
    let launched = repos.len();

    for repo in repos {
        let tx = tx.clone();
        let fetcher = Arc::clone(&fetcher);
        let limiter = limiter.clone();
        let timeout = options.timeout;

        tokio::spawn(async move {
            let _permit = match limiter {
                Some(sem) => sem.acquire_owned().await.ok(),
                None => None,
            };
            let fetched = fetch_branch_names(fetcher.as_ref(), &repo.branches_url, timeout).await;
            let result = RepositoryResult::from_fetch(repo.name, fetched);
            // Only fails once the collector is gone, in which case nobody is listening.
            let _ = tx.send(result);
        });
    }

    (launched, rx)
}

async fn fetch_branch_names<F>(
    fetcher: &F,
    branches_url: &str,
    timeout: Option<Duration>,
) -> Result<Vec<String>, ApiError>
where
    F: BranchFetcher + ?Sized,
{
    let url = prepare_branch_url(branches_url);
    let fetch = fetcher.fetch_branches(url);
    let branches = match timeout {
        Some(limit) => tokio::time::timeout(limit, fetch)
            .await
            .unwrap_or(Err(ApiError::Timeout(limit)))?,
        None => fetch.await?,
    };
    Ok(branches.into_iter().map(|b| b.name).collect())
}

/// Receives exactly `expected` results. Failures are logged and dropped.
pub async fn collect(
    mut rx: mpsc::UnboundedReceiver<RepositoryResult>,
    expected: usize,
) -> AnyhowResult<Collected> {
    let mut collected = Collected::default();
    for received in 0..expected {
        let Some(result) = rx.recv().await else {
            bail!(
                "Result channel closed after {} of {} repositories reported",
                received,
                expected
            );
        };
        match result.outcome {
            Outcome::Success => collected.successes.push(result),
            Outcome::Failure(ref reason) => {
                tracing::warn!("Error in repository [{}]: {}", result.name, reason);
                collected.failed += 1;
            }
        }
    }
    Ok(collected)
}

/// Fans out over `repos` and waits for every task to report.
pub async fn fetch_all<F>(
    repos: Vec<GithubRepo>,
    fetcher: Arc<F>,
    options: &FanOutOptions,
) -> AnyhowResult<Collected>
where
    F: BranchFetcher + ?Sized + 'static,
{
    let (launched, rx) = fan_out(repos, fetcher, options);
    collect(rx, launched).await
}
