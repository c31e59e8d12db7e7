//! GKE Clusters
//!
//! Cluster listing and deletion through the GKE v1 API.

use super::client::GcpClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// The cluster fields the cleanup engine needs
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,
    /// Zone (`us-central1-a`) or region (`us-central1`)
    #[serde(default)]
    pub location: String,
    /// RFC3339 creation timestamp
    #[serde(default)]
    pub create_time: String,
}

/// Cluster manager operations used by the cleanup engine
#[async_trait]
pub trait ClusterManager: Send + Sync {
    async fn list_clusters(&self, project: &str) -> Result<Vec<Cluster>>;

    /// `zone` is `None` for regional clusters.
    async fn delete_cluster(
        &self,
        project: &str,
        region: &str,
        zone: Option<&str>,
        name: &str,
    ) -> Result<()>;
}

/// Split a cluster location into region and optional zone.
///
/// `us-central1-a` -> (`us-central1`, `a`), `us-central1` -> (`us-central1`, none).
pub fn region_zone_from_location(location: &str) -> (String, Option<String>) {
    let parts: Vec<&str> = location.split('-').collect();
    if parts.len() == 3 {
        (format!("{}-{}", parts[0], parts[1]), Some(parts[2].to_string()))
    } else {
        (location.to_string(), None)
    }
}

/// Inverse of [`region_zone_from_location`]
pub fn location_from_region_zone(region: &str, zone: Option<&str>) -> String {
    match zone {
        Some(zone) if !zone.is_empty() => format!("{}-{}", region, zone),
        _ => region.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ListClustersResponse {
    #[serde(default)]
    clusters: Vec<Cluster>,
}

/// GKE client
#[derive(Clone)]
pub struct GkeClient {
    client: GcpClient,
}

impl GkeClient {
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterManager for GkeClient {
    async fn list_clusters(&self, project: &str) -> Result<Vec<Cluster>> {
        let url = self.client.container_location_url(project, "-", "clusters");
        let response = self
            .client
            .get(&url)
            .await
            .with_context(|| format!("failed listing clusters in project {}", project))?;

        let parsed: ListClustersResponse = serde_json::from_value(response)
            .context("unexpected clusters.list response")?;
        Ok(parsed.clusters)
    }

    async fn delete_cluster(
        &self,
        project: &str,
        region: &str,
        zone: Option<&str>,
        name: &str,
    ) -> Result<()> {
        let location = location_from_region_zone(region, zone);
        let url = self.client.container_location_url(
            project,
            &location,
            &format!("clusters/{}", urlencoding::encode(name)),
        );
        self.client.delete(&url).await
    }
}
