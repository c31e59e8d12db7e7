//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining authentication
//! and HTTP functionality.

use super::auth::GcpCredentials;
use super::http::GcpHttpClient;
use anyhow::Result;
use serde_json::Value;

/// Default GKE API endpoint
pub const CONTAINER_ENDPOINT: &str = "https://container.googleapis.com";

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: GcpHttpClient,
    container_endpoint: String,
}

impl GcpClient {
    pub fn new(credentials: GcpCredentials, http: GcpHttpClient) -> Self {
        Self {
            credentials,
            http,
            container_endpoint: CONTAINER_ENDPOINT.to_string(),
        }
    }

    /// Point GKE calls at a different endpoint (regional endpoints, test servers)
    pub fn with_container_endpoint(mut self, endpoint: &str) -> Self {
        self.container_endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String> {
        self.credentials.get_token().await
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str) -> Result<Value> {
        let token = self.get_token().await?;
        self.http.get(url, &token).await
    }

    /// Make a DELETE request to a GCP API
    pub async fn delete(&self, url: &str) -> Result<()> {
        let token = self.get_token().await?;
        self.http.delete(url, &token).await
    }

    // =========================================================================
    // GKE API helpers
    // =========================================================================

    /// Build GKE API URL for a project
    pub fn container_url(&self, project: &str, path: &str) -> String {
        format!(
            "{}/v1/projects/{}/{}",
            self.container_endpoint,
            urlencoding::encode(project),
            path
        )
    }

    /// Build GKE location URL (region, zone, or "-" for all locations)
    pub fn container_location_url(&self, project: &str, location: &str, resource: &str) -> String {
        self.container_url(project, &format!("locations/{}/{}", location, resource))
    }
}
