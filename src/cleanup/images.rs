//! Container image deletion

use super::deleter::ResourceDeleter;
use crate::error::{CleanupError, PartialDeletion};
use crate::gcp::gcr::{ImageRef, RegistryClient};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Repositories holding published releases. Never cleaned.
pub const PROTECTED_REPOSITORIES: &[&str] = &["gcr.io/knative-releases", "gcr.io/knative-nightly"];

pub struct ImageDeleter {
    projects: Vec<String>,
    registry: String,
    client: Arc<dyn RegistryClient>,
}

impl ImageDeleter {
    /// `registry` is the host, e.g. `gcr.io`; each project's root is `<registry>/<project>`.
    pub fn new(projects: Vec<String>, registry: &str, client: Arc<dyn RegistryClient>) -> Self {
        Self {
            projects,
            registry: registry.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn api_error(deleted: usize, err: anyhow::Error) -> PartialDeletion {
        PartialDeletion::new(deleted, CleanupError::Api(err))
    }
}

#[async_trait]
impl ResourceDeleter for ImageDeleter {
    fn kind(&self) -> &'static str {
        "images"
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
        let root = format!("{}/{}", self.registry, project);
        if PROTECTED_REPOSITORIES.contains(&root.as_str()) {
            return Err(PartialDeletion::new(
                0,
                CleanupError::Forbidden(format!("repository {}", root)),
            ));
        }

        let images = self
            .client
            .walk(&root)
            .await
            .with_context(|| format!("failed walking {}", root))
            .map_err(|e| Self::api_error(0, e))?;

        let Some(cutoff) = Utc::now().checked_sub_signed(age) else {
            return Ok(0);
        };
        let mut deleted = 0;

        for image in images.iter().filter(|image| image.uploaded < cutoff) {
            let digest_ref = ImageRef::parse(&format!("{}@{}", image.repository, image.digest))
                .map_err(|e| Self::api_error(deleted, e))?;

            if dry_run {
                tracing::info!(
                    "[dry run] would delete {} (uploaded {}, tags {:?})",
                    digest_ref,
                    image.uploaded,
                    image.tags
                );
                deleted += 1;
                continue;
            }

            // Tags first: some registries refuse to delete a tagged manifest.
            for tag in &image.tags {
                let tag_ref = ImageRef::tag(&image.repository, tag);
                self.client
                    .delete(&tag_ref)
                    .await
                    .with_context(|| format!("failed deleting tag {}", tag_ref))
                    .map_err(|e| Self::api_error(deleted, e))?;
            }

            self.client
                .delete(&digest_ref)
                .await
                .with_context(|| format!("failed deleting image {}", digest_ref))
                .map_err(|e| Self::api_error(deleted, e))?;

            tracing::info!("Deleted image {}", digest_ref);
            deleted += 1;
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::gcr::ImageRecord;
    use anyhow::Result;
    use chrono::DateTime;
    use std::sync::Mutex;

    fn digest(n: u8) -> String {
        format!("sha256:{}", format!("{:02x}", n).repeat(32))
    }

    #[derive(Default)]
    struct FakeRegistry {
        images: Vec<ImageRecord>,
        deleted: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl RegistryClient for FakeRegistry {
        async fn walk(&self, root: &str) -> Result<Vec<ImageRecord>> {
            Ok(self
                .images
                .iter()
                .filter(|i| i.repository.starts_with(root))
                .cloned()
                .collect())
        }

        async fn delete(&self, image: &ImageRef) -> Result<()> {
            let name = image.to_string();
            if self.fail_on.as_deref() == Some(name.as_str()) {
                anyhow::bail!("API request failed: 500");
            }
            self.deleted.lock().unwrap().push(name);
            Ok(())
        }
    }

    fn image(repo: &str, n: u8, days_old: i64, tags: &[&str]) -> ImageRecord {
        ImageRecord {
            repository: repo.to_string(),
            digest: digest(n),
            uploaded: Utc::now() - Duration::days(days_old),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn registry() -> FakeRegistry {
        FakeRegistry {
            images: vec![
                image("gcr.io/proj/app", 1, 400, &["v1", "stable"]),
                image("gcr.io/proj/app", 2, 10, &["v2"]),
                image("gcr.io/proj/app/sub", 3, 500, &[]),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_deletes_tags_before_digest() {
        let fake = Arc::new(registry());
        let deleter = ImageDeleter::new(vec!["proj".into()], "gcr.io", fake.clone());

        let count = deleter
            .delete_resources("proj", Duration::days(365), false)
            .await
            .unwrap();

        assert_eq!(count, 2);
        let deleted = fake.deleted.lock().unwrap().clone();
        assert_eq!(
            deleted,
            vec![
                "gcr.io/proj/app:v1".to_string(),
                "gcr.io/proj/app:stable".to_string(),
                format!("gcr.io/proj/app@{}", digest(1)),
                format!("gcr.io/proj/app/sub@{}", digest(3)),
            ]
        );
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_deleting() {
        let fake = Arc::new(registry());
        let deleter = ImageDeleter::new(vec!["proj".into()], "gcr.io", fake.clone());

        let count = deleter
            .delete_resources("proj", Duration::days(365), true)
            .await
            .unwrap();

        assert_eq!(count, 2);
        assert!(fake.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_protected_repositories_are_forbidden() {
        let fake = Arc::new(registry());
        let deleter = ImageDeleter::new(vec![], "gcr.io", fake.clone());

        for project in ["knative-releases", "knative-nightly"] {
            for dry_run in [true, false] {
                let err = deleter
                    .delete_resources(project, Duration::days(0), dry_run)
                    .await
                    .unwrap_err();
                assert_eq!(err.deleted, 0);
                assert!(err.error.is_forbidden());
            }
        }
        assert!(fake.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_returns_partial_count() {
        let fake = Arc::new(FakeRegistry {
            fail_on: Some(format!("gcr.io/proj/app/sub@{}", digest(3))),
            ..registry()
        });
        let deleter = ImageDeleter::new(vec!["proj".into()], "gcr.io", fake.clone());

        let err = deleter
            .delete_resources("proj", Duration::days(365), false)
            .await
            .unwrap_err();

        assert_eq!(err.deleted, 1);
        assert!(err.to_string().contains("failed deleting image gcr.io/proj/app/sub@"));
    }

    #[tokio::test]
    async fn test_future_upload_times_are_kept() {
        let fake = Arc::new(FakeRegistry {
            images: vec![ImageRecord {
                repository: "gcr.io/proj/app".into(),
                digest: digest(9),
                uploaded: DateTime::<Utc>::MAX_UTC,
                tags: vec![],
            }],
            ..Default::default()
        });
        let deleter = ImageDeleter::new(vec!["proj".into()], "gcr.io", fake);

        let count = deleter
            .delete_resources("proj", Duration::days(0), false)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
