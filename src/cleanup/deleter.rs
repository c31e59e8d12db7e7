use crate::error::PartialDeletion;
use async_trait::async_trait;
use chrono::Duration;

/// Deletes one kind of resource, project by project.
#[async_trait]
pub trait ResourceDeleter: Send + Sync {
    /// Resource kind, for logs and the final report
    fn kind(&self) -> &'static str;

    /// Projects bound at construction
    fn projects(&self) -> &[String];

    /// Delete every resource in `project` older than `age`.
    ///
    /// With `dry_run` nothing destructive is issued, but the returned count
    /// is what a real run would have deleted.
    async fn delete_resources(
        &self,
        project: &str,
        age: Duration,
        dry_run: bool,
    ) -> Result<usize, PartialDeletion>;
}
