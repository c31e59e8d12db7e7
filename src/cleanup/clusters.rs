//! GKE cluster deletion

use super::deleter::ResourceDeleter;
use crate::error::{CleanupError, PartialDeletion};
use crate::gcp::gke::{region_zone_from_location, ClusterManager};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Project hosting long-lived test infrastructure. Never cleaned.
pub const PROTECTED_PROJECT: &str = "knative-tests";

pub struct ClusterDeleter {
    projects: Vec<String>,
    client: Arc<dyn ClusterManager>,
}

impl ClusterDeleter {
    pub fn new(projects: Vec<String>, client: Arc<dyn ClusterManager>) -> Self {
        Self { projects, client }
    }
}

#[async_trait]
impl ResourceDeleter for ClusterDeleter {
    fn kind(&self) -> &'static str {
        "clusters"
    }

    fn projects(&self) -> &[String] {
        &self.projects
    }

    async fn delete_resources(
        &self,
        project: &str,
        age: Duration,
        dry_run: bool,
    ) -> Result<usize, PartialDeletion> {
        if project == PROTECTED_PROJECT {
            return Err(PartialDeletion::new(
                0,
                CleanupError::Forbidden(format!("project {}", project)),
            ));
        }

        let clusters = self
            .client
            .list_clusters(project)
            .await
            .map_err(|e| PartialDeletion::new(0, CleanupError::Api(e)))?;

        let now = Utc::now();
        let mut deleted = 0;

        for cluster in &clusters {
            let created = DateTime::parse_from_rfc3339(&cluster.create_time).map_err(|source| {
                PartialDeletion::new(
                    deleted,
                    CleanupError::TimeParse {
                        cluster: cluster.name.clone(),
                        value: cluster.create_time.clone(),
                        source,
                    },
                )
            })?;

            if now.signed_duration_since(created) <= age {
                continue;
            }

            let (region, zone) = region_zone_from_location(&cluster.location);
            if dry_run {
                tracing::info!(
                    "[dry run] would delete cluster {} in {} (created {})",
                    cluster.name,
                    cluster.location,
                    created
                );
                deleted += 1;
                continue;
            }

            self.client
                .delete_cluster(project, &region, zone.as_deref(), &cluster.name)
                .await
                .with_context(|| {
                    format!(
                        "failed deleting cluster {} in {}/{}",
                        cluster.name, project, cluster.location
                    )
                })
                .map_err(|e| PartialDeletion::new(deleted, CleanupError::Api(e)))?;

            tracing::info!("Deleted cluster {} in {}", cluster.name, project);
            deleted += 1;
        }

        Ok(deleted)
    }
}
