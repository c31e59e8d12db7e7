//! Container Registry
//!
//! Image listing and deletion against GCR's Docker Registry v2 API.

use super::client::GcpClient;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// One manifest found while walking a registry tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// Fully-qualified repository, e.g. `gcr.io/my-project/app`
    pub repository: String,
    pub digest: String,
    pub uploaded: DateTime<Utc>,
    pub tags: Vec<String>,
}

/// Image registry operations used by the cleanup engine
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Every manifest under `root`, recursing into child repositories.
    async fn walk(&self, root: &str) -> Result<Vec<ImageRecord>>;

    /// Delete a single tag or manifest.
    async fn delete(&self, image: &ImageRef) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Tag(String),
    Digest(String),
}

/// A parsed image reference: `repo:tag` or `repo@sha256:<hex>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub repository: String,
    pub reference: Reference,
}

impl ImageRef {
    pub fn tag(repository: &str, tag: &str) -> Self {
        Self {
            repository: repository.to_string(),
            reference: Reference::Tag(tag.to_string()),
        }
    }

    /// Parse an image reference. A bare repository means `:latest`.
    pub fn parse(s: &str) -> Result<Self> {
        let (repository, reference) = if let Some((repo, digest)) = s.split_once('@') {
            validate_digest(digest)?;
            (repo, Reference::Digest(digest.to_string()))
        } else {
            // A ':' before the last '/' belongs to a host:port, not a tag.
            let last_slash = s.rfind('/').unwrap_or(0);
            match s.rfind(':') {
                Some(idx) if idx > last_slash => {
                    let tag = &s[idx + 1..];
                    validate_tag(tag)?;
                    (&s[..idx], Reference::Tag(tag.to_string()))
                }
                _ => (s, Reference::Tag("latest".to_string())),
            }
        };

        validate_repository(repository)
            .with_context(|| format!("invalid image reference {:?}", s))?;

        Ok(Self {
            repository: repository.to_string(),
            reference,
        })
    }

    /// The tag or digest, as it appears in a manifests URL
    pub fn identifier(&self) -> &str {
        match &self.reference {
            Reference::Tag(t) => t,
            Reference::Digest(d) => d,
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            Reference::Tag(t) => write!(f, "{}:{}", self.repository, t),
            Reference::Digest(d) => write!(f, "{}@{}", self.repository, d),
        }
    }
}

fn validate_digest(digest: &str) -> Result<()> {
    let Some(hex) = digest.strip_prefix("sha256:") else {
        bail!("unsupported digest algorithm in {:?}", digest);
    };
    if hex.len() != 64 || !hex.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
        bail!("malformed sha256 digest {:?}", digest);
    }
    Ok(())
}

fn validate_tag(tag: &str) -> Result<()> {
    let mut chars = tag.chars();
    let valid_first = chars
        .next()
        .map(|c| c.is_ascii_alphanumeric() || c == '_')
        .unwrap_or(false);
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !valid_first || !valid_rest || tag.len() > 128 {
        bail!("malformed tag {:?}", tag);
    }
    Ok(())
}

fn validate_repository(repo: &str) -> Result<()> {
    if repo.is_empty() || repo.starts_with('/') || repo.ends_with('/') || repo.contains("//") {
        bail!("malformed repository {:?}", repo);
    }
    let valid = repo.chars().all(|c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-' | '/' | ':')
    });
    if !valid {
        bail!("repository {:?} contains invalid characters", repo);
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct TagsList {
    #[serde(default)]
    child: Vec<String>,
    #[serde(default)]
    manifest: BTreeMap<String, ManifestInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestInfo {
    #[serde(default)]
    tag: Vec<String>,
    time_uploaded_ms: String,
}

/// GCR client for one registry host (`gcr.io`, `us.gcr.io`, ...)
#[derive(Clone)]
pub struct GcrClient {
    client: GcpClient,
    host: String,
    endpoint: String,
}

impl GcrClient {
    pub fn new(client: GcpClient, host: &str) -> Self {
        let host = host.trim_end_matches('/');
        Self {
            client,
            host: host.to_string(),
            endpoint: format!("https://{}", host),
        }
    }

    /// Send registry calls to a different base URL (test servers)
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    /// Repository path relative to the registry host
    fn repo_path<'a>(&self, repository: &'a str) -> Result<&'a str> {
        repository
            .strip_prefix(&self.host)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
            .with_context(|| format!("repository {} is not hosted on {}", repository, self.host))
    }

    async fn list_tags(&self, repository: &str) -> Result<TagsList> {
        let url = format!("{}/v2/{}/tags/list", self.endpoint, self.repo_path(repository)?);
        let response = self
            .client
            .get(&url)
            .await
            .with_context(|| format!("failed listing {}", repository))?;
        serde_json::from_value(response)
            .with_context(|| format!("unexpected tags/list response for {}", repository))
    }
}

#[async_trait]
impl RegistryClient for GcrClient {
    async fn walk(&self, root: &str) -> Result<Vec<ImageRecord>> {
        let mut images = Vec::new();
        let mut pending = vec![root.to_string()];

        while let Some(repository) = pending.pop() {
            let listing = self.list_tags(&repository).await?;

            for (digest, info) in listing.manifest {
                let millis: i64 = info.time_uploaded_ms.parse().with_context(|| {
                    format!("bad upload time {:?} on {}@{}", info.time_uploaded_ms, repository, digest)
                })?;
                let uploaded = DateTime::from_timestamp_millis(millis)
                    .with_context(|| format!("upload time out of range on {}@{}", repository, digest))?;
                images.push(ImageRecord {
                    repository: repository.clone(),
                    digest,
                    uploaded,
                    tags: info.tag,
                });
            }

            // Reverse so children are visited in listing order.
            pending.extend(
                listing
                    .child
                    .iter()
                    .rev()
                    .map(|child| format!("{}/{}", repository, child)),
            );
        }

        tracing::debug!("Walked {}: {} images", root, images.len());
        Ok(images)
    }

    async fn delete(&self, image: &ImageRef) -> Result<()> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.endpoint,
            self.repo_path(&image.repository)?,
            image.identifier()
        );
        self.client.delete(&url).await
    }
}
