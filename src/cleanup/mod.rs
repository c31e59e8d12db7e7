//! Resource cleanup engine
//!
//! Deletes aged-out container images and GKE clusters across a set of
//! projects, with per-project error isolation and a fail-fast gate.
//!
//! # Architecture
//!
//! - [`projects`] - Resolves the projects to clean
//! - [`deleter`] - The per-kind deletion capability
//! - [`images`] / [`clusters`] - The two resource kinds
//! - [`orchestrator`] - Bounded fan-out over projects
//! - [`report`] - Summary logging

pub mod clusters;
pub mod deleter;
pub mod images;
pub mod orchestrator;
pub mod projects;
pub mod report;

pub use clusters::ClusterDeleter;
pub use deleter::ResourceDeleter;
pub use images::ImageDeleter;
pub use orchestrator::{delete, DeleteOptions, FailFast};
pub use projects::select_projects;
pub use report::show_stats;

use crate::error::CleanupError;
use crate::gcp::auth::GcpCredentials;
use crate::gcp::client::GcpClient;
use crate::gcp::gcr::{GcrClient, RegistryClient};
use crate::gcp::gke::{ClusterManager, GkeClient};
use crate::gcp::http::{GcpHttpClient, DEFAULT_REQUEST_TIMEOUT};
use async_trait::async_trait;
use chrono::Duration;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_REGISTRY: &str = "gcr.io";
pub const DEFAULT_DAYS_TO_KEEP_IMAGES: i64 = 365;
pub const DEFAULT_HOURS_TO_KEEP_CLUSTERS: i64 = 720;

/// Everything a cleanup run needs
#[derive(Debug, Clone)]
pub struct CleanupOptions {
    pub projects: Vec<String>,
    pub resource_files: Vec<PathBuf>,
    pub project_pattern: String,
    /// Negative disables image cleanup
    pub days_to_keep_images: i64,
    /// Negative disables cluster cleanup
    pub hours_to_keep_clusters: i64,
    pub registry: String,
    pub service_account: Option<PathBuf>,
    pub delete: DeleteOptions,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            projects: Vec::new(),
            resource_files: Vec::new(),
            project_pattern: projects::DEFAULT_PROJECT_PATTERN.to_string(),
            days_to_keep_images: DEFAULT_DAYS_TO_KEEP_IMAGES,
            hours_to_keep_clusters: DEFAULT_HOURS_TO_KEEP_CLUSTERS,
            registry: DEFAULT_REGISTRY.to_string(),
            service_account: None,
            delete: DeleteOptions::default(),
        }
    }
}

/// Builds the external clients a run talks to
#[async_trait]
pub trait Backends: Send + Sync {
    async fn registry(
        &self,
        host: &str,
        service_account: Option<&Path>,
    ) -> Result<Arc<dyn RegistryClient>, CleanupError>;

    async fn cluster_manager(
        &self,
        service_account: Option<&Path>,
    ) -> Result<Arc<dyn ClusterManager>, CleanupError>;
}

/// Real GCR and GKE clients
pub struct GcpBackends {
    pub request_timeout: std::time::Duration,
    /// Pre-issued bearer token, used when no service account is given
    pub access_token_file: Option<PathBuf>,
}

impl Default for GcpBackends {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            access_token_file: None,
        }
    }
}

impl GcpBackends {
    async fn client(&self, service_account: Option<&Path>) -> Result<GcpClient, CleanupError> {
        let credentials = match (service_account, &self.access_token_file) {
            (Some(key_file), _) => GcpCredentials::from_service_account(key_file).await,
            (None, Some(token_file)) => GcpCredentials::from_access_token_file(token_file),
            (None, None) => GcpCredentials::new().await,
        }
        .map_err(CleanupError::Auth)?;

        let http = GcpHttpClient::with_timeout(self.request_timeout).map_err(CleanupError::Api)?;
        Ok(GcpClient::new(credentials, http))
    }
}

#[async_trait]
impl Backends for GcpBackends {
    async fn registry(
        &self,
        host: &str,
        service_account: Option<&Path>,
    ) -> Result<Arc<dyn RegistryClient>, CleanupError> {
        let client = self.client(service_account).await?;
        Ok(Arc::new(GcrClient::new(client, host)))
    }

    async fn cluster_manager(
        &self,
        service_account: Option<&Path>,
    ) -> Result<Arc<dyn ClusterManager>, CleanupError> {
        let client = self.client(service_account).await?;
        Ok(Arc::new(GkeClient::new(client)))
    }
}

/// Only GCR-hosted registries are supported.
pub fn validate_registry(registry: &str) -> Result<(), CleanupError> {
    if registry.trim_end_matches('/').ends_with("gcr.io") {
        Ok(())
    } else {
        Err(CleanupError::UnsupportedRegistry(registry.to_string()))
    }
}

fn threshold(
    value: i64,
    unit: &str,
    to_duration: fn(i64) -> Option<Duration>,
) -> Result<Duration, CleanupError> {
    to_duration(value)
        .ok_or_else(|| CleanupError::Config(format!("{} {} is out of range", value, unit)))
}

/// Run the image pass, then the cluster pass.
///
/// A pass whose client cannot be built fails the run immediately. Per-project
/// failures are reported and surface as [`CleanupError::Incomplete`] once
/// both passes have finished.
pub async fn run(options: &CleanupOptions, backends: &dyn Backends) -> Result<(), CleanupError> {
    validate_registry(&options.registry)?;
    let registry = options.registry.trim_end_matches('/');

    let projects = select_projects(
        &options.projects,
        &options.resource_files,
        &options.project_pattern,
    )?;
    tracing::info!(
        "Cleaning {} projects{}",
        projects.len(),
        if options.delete.dry_run { " [dry run]" } else { "" }
    );

    let service_account = options.service_account.as_deref();
    let mut failures = 0;

    if options.days_to_keep_images >= 0 {
        let age = threshold(options.days_to_keep_images, "days", Duration::try_days)?;
        let client = backends.registry(registry, service_account).await?;
        let deleter = Arc::new(ImageDeleter::new(projects.clone(), registry, client));

        let (count, errors) = delete(deleter, age, &options.delete).await;
        show_stats("images", count, &errors);
        failures += errors.len();
    } else {
        tracing::info!("Image cleanup disabled");
    }

    if options.hours_to_keep_clusters >= 0 {
        let age = threshold(options.hours_to_keep_clusters, "hours", Duration::try_hours)?;
        let client = backends.cluster_manager(service_account).await?;
        let deleter = Arc::new(ClusterDeleter::new(projects, client));

        let (count, errors) = delete(deleter, age, &options.delete).await;
        show_stats("clusters", count, &errors);
        failures += errors.len();
    } else {
        tracing::info!("Cluster cleanup disabled");
    }

    if failures > 0 {
        return Err(CleanupError::Incomplete { failures });
    }
    Ok(())
}
