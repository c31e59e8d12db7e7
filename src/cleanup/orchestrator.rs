//! Bounded-concurrency fan-out of a deleter over its projects
//!
//! One task per project, at most `concurrency` deletions in flight. Once an
//! error trips the circuit breaker, tasks that have not yet started their
//! deletion skip it. Deletions already running are never interrupted.

use super::deleter::ResourceDeleter;
use crate::error::{CleanupError, PartialDeletion};
use chrono::Duration;
use clap::ValueEnum;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const DEFAULT_CONCURRENCY: usize = 10;

/// Which per-project errors stop new work from being dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FailFast {
    /// Any error
    #[default]
    Any,
    /// Any error other than a protected-resource refusal
    ExceptForbidden,
    /// Never stop early
    Off,
}

impl FailFast {
    fn trips_on(self, error: &CleanupError) -> bool {
        match self {
            FailFast::Any => true,
            FailFast::ExceptForbidden => !error.is_forbidden(),
            FailFast::Off => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeleteOptions {
    pub concurrency: usize,
    pub dry_run: bool,
    pub fail_fast: FailFast,
    /// Deadline for a single project's deletion. A project that hits it is
    /// reported as a timeout with a count of 0, so anything it deleted before
    /// the deadline is missing from the total.
    pub timeout: Option<std::time::Duration>,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            dry_run: false,
            fail_fast: FailFast::default(),
            timeout: None,
        }
    }
}

/// Run `deleter` over all of its projects.
///
/// Returns the total deleted count and the distinct error messages, sorted.
/// Blocks until every project task has finished.
pub async fn delete(
    deleter: Arc<dyn ResourceDeleter>,
    age: Duration,
    options: &DeleteOptions,
) -> (usize, Vec<String>) {
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let aborted = Arc::new(AtomicBool::new(false));
    let total = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(Mutex::new(Vec::new()));

    // A project listed twice is still cleaned once.
    let mut seen = HashSet::new();
    let projects: Vec<String> = deleter
        .projects()
        .iter()
        .filter(|p| seen.insert(p.as_str()))
        .cloned()
        .collect();

    let mut tasks = JoinSet::new();
    for project in projects {
        let deleter = Arc::clone(&deleter);
        let semaphore = Arc::clone(&semaphore);
        let aborted = Arc::clone(&aborted);
        let total = Arc::clone(&total);
        let errors = Arc::clone(&errors);
        let options = options.clone();

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };

            if aborted.load(Ordering::SeqCst) {
                tracing::warn!(
                    "Skipping {} in project {}: an earlier project failed",
                    deleter.kind(),
                    project
                );
                return;
            }

            let result = match options.timeout {
                Some(after) => {
                    tokio::time::timeout(
                        after,
                        deleter.delete_resources(&project, age, options.dry_run),
                    )
                    .await
                    .unwrap_or_else(|_| {
                        Err(PartialDeletion::new(
                            0,
                            CleanupError::Timeout {
                                project: project.clone(),
                                after,
                            },
                        ))
                    })
                }
                None => deleter.delete_resources(&project, age, options.dry_run).await,
            };

            match result {
                Ok(count) => {
                    tracing::debug!("Project {}: {} {} deleted", project, count, deleter.kind());
                    total.fetch_add(count, Ordering::SeqCst);
                }
                Err(PartialDeletion { deleted, error }) => {
                    tracing::error!("Project {}: {}", project, error);
                    total.fetch_add(deleted, Ordering::SeqCst);
                    if options.fail_fast.trips_on(&error) {
                        aborted.store(true, Ordering::SeqCst);
                    }
                    if let Ok(mut errors) = errors.lock() {
                        errors.push(error.to_string());
                    }
                }
            }
        });
    }

    let mut panicked = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            panicked.push(format!("{} task failed: {}", deleter.kind(), e));
        }
    }

    let mut messages: BTreeSet<String> = panicked.into_iter().collect();
    match errors.lock() {
        Ok(errors) => messages.extend(errors.iter().cloned()),
        Err(poisoned) => messages.extend(poisoned.into_inner().iter().cloned()),
    }

    (total.load(Ordering::SeqCst), messages.into_iter().collect())
}
