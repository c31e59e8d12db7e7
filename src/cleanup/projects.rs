//! Project selection
//!
//! Resolves the projects to clean from either an explicit list or resource
//! files scanned line by line with a project-name regex.

use crate::error::CleanupError;
use regex::Regex;
use std::path::PathBuf;

/// Default pattern for Boskos-managed test projects
pub const DEFAULT_PROJECT_PATTERN: &str = "knative-boskos-[a-zA-Z0-9]+";

/// Pick the projects to operate on.
///
/// Exactly one of `explicit` and `resource_files` must be non-empty.
/// Explicit projects are returned verbatim; otherwise the first match of
/// `pattern` on every non-empty line is collected, in file and line order.
pub fn select_projects(
    explicit: &[String],
    resource_files: &[PathBuf],
    pattern: &str,
) -> Result<Vec<String>, CleanupError> {
    match (explicit.is_empty(), resource_files.is_empty()) {
        (true, true) => {
            return Err(CleanupError::Config(
                "one of --project or --project-resource-yaml must be set".to_string(),
            ))
        }
        (false, false) => {
            return Err(CleanupError::Config(
                "--project and --project-resource-yaml are mutually exclusive".to_string(),
            ))
        }
        (false, true) => return Ok(explicit.to_vec()),
        (true, false) => {}
    }

    let re = Regex::new(pattern).map_err(|e| {
        CleanupError::Config(format!("failed to compile regex {:?}: {}", pattern, e))
    })?;

    let mut projects = Vec::new();
    for path in resource_files {
        let content = std::fs::read_to_string(path).map_err(|source| CleanupError::Io {
            path: path.clone(),
            source,
        })?;

        projects.extend(
            content
                .lines()
                .filter(|line| !line.is_empty())
                .filter_map(|line| re.find(line))
                .map(|m| m.as_str().to_string()),
        );
    }

    if projects.is_empty() {
        return Err(CleanupError::Config(format!(
            "no project found matching {:?} in {} resource file(s)",
            pattern,
            resource_files.len()
        )));
    }

    tracing::debug!("Selected {} projects from resource files", projects.len());
    Ok(projects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn resource_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_explicit_projects_returned_in_order() {
        let explicit = vec!["p2".to_string(), "p1".to_string()];
        assert_eq!(select_projects(&explicit, &[], "").unwrap(), explicit);
    }

    #[test]
    fn test_neither_source_is_config_error() {
        let err = select_projects(&[], &[], DEFAULT_PROJECT_PATTERN).unwrap_err();
        assert!(matches!(err, CleanupError::Config(_)));
    }

    #[test]
    fn test_both_sources_is_config_error() {
        let err = select_projects(
            &["p1".to_string()],
            &[PathBuf::from("resources.yaml")],
            DEFAULT_PROJECT_PATTERN,
        )
        .unwrap_err();
        assert!(matches!(err, CleanupError::Config(_)));
    }

    #[test]
    fn test_extracts_matching_projects() {
        let file = resource_file("knative-boskos-01\nirrelevant\n\nknative-boskos-02\n");
        let projects =
            select_projects(&[], &[file.path().to_path_buf()], DEFAULT_PROJECT_PATTERN).unwrap();
        assert_eq!(projects, vec!["knative-boskos-01", "knative-boskos-02"]);
    }

    #[test]
    fn test_extracts_first_match_inside_yaml() {
        let file = resource_file(
            "resources:\n  - type: gke-project\n    names:\n    - knative-boskos-aa # knative-boskos-zz\n    - knative-boskos-bb\n",
        );
        let projects =
            select_projects(&[], &[file.path().to_path_buf()], DEFAULT_PROJECT_PATTERN).unwrap();
        assert_eq!(projects, vec!["knative-boskos-aa", "knative-boskos-bb"]);
    }

    #[test]
    fn test_preserves_file_order() {
        let first = resource_file("knative-boskos-b\n");
        let second = resource_file("knative-boskos-a\n");
        let projects = select_projects(
            &[],
            &[first.path().to_path_buf(), second.path().to_path_buf()],
            DEFAULT_PROJECT_PATTERN,
        )
        .unwrap();
        assert_eq!(projects, vec!["knative-boskos-b", "knative-boskos-a"]);
    }

    #[test]
    fn test_empty_file_reports_no_project_found() {
        let file = resource_file("");
        let err = select_projects(&[], &[file.path().to_path_buf()], ".*").unwrap_err();
        assert!(matches!(err, CleanupError::Config(_)));
        assert!(err.to_string().contains("no project found"));
    }

    #[test]
    fn test_bad_regex_is_config_error() {
        let file = resource_file("knative-boskos-01\n");
        let err =
            select_projects(&[], &[file.path().to_path_buf()], "--->}][{<---").unwrap_err();
        assert!(matches!(err, CleanupError::Config(_)));
        assert!(err.to_string().contains("failed to compile regex"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        let err = select_projects(&[], &[missing], DEFAULT_PROJECT_PATTERN).unwrap_err();
        assert!(matches!(err, CleanupError::Io { .. }));
    }
}
