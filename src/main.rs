use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use knative_cleanup::cleanup::projects::DEFAULT_PROJECT_PATTERN;
use knative_cleanup::cleanup::{
    DeleteOptions, FailFast, DEFAULT_DAYS_TO_KEEP_IMAGES, DEFAULT_HOURS_TO_KEEP_CLUSTERS,
    DEFAULT_REGISTRY,
};
use knative_cleanup::cleanup::orchestrator::DEFAULT_CONCURRENCY;
use knative_cleanup::config::Config;
use knative_cleanup::{CleanupOptions, GcpBackends};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Delete old container images and GKE clusters from Knative test projects
#[derive(Parser, Debug)]
#[command(name = "knative-cleanup", version, about, long_about = None)]
struct Args {
    /// Project to clean (repeatable)
    #[arg(long = "project")]
    projects: Vec<String>,

    /// Resource file listing projects to clean (repeatable)
    #[arg(long = "project-resource-yaml")]
    project_resource_yaml: Vec<PathBuf>,

    /// Regex picking project names out of resource files
    /// [default: knative-boskos-[a-zA-Z0-9]+]
    #[arg(long)]
    re_project_name: Option<String>,

    /// Delete images older than this many days, -1 to skip images
    #[arg(long, default_value_t = DEFAULT_DAYS_TO_KEEP_IMAGES, allow_negative_numbers = true)]
    days_to_keep_images: i64,

    /// Delete clusters older than this many hours, -1 to skip clusters
    #[arg(long, default_value_t = DEFAULT_HOURS_TO_KEEP_CLUSTERS, allow_negative_numbers = true)]
    hours_to_keep_clusters: i64,

    /// Registry host [default: gcr.io]
    #[arg(long)]
    gcr: Option<String>,

    /// Service account key file to authenticate with
    #[arg(long)]
    service_account: Option<PathBuf>,

    /// File holding a pre-issued access token, used when no service account is given
    #[arg(long)]
    access_token_file: Option<PathBuf>,

    /// Projects cleaned in parallel [default: 10]
    #[arg(long)]
    concurrent_operations: Option<usize>,

    /// Give up on a single project after this many seconds
    #[arg(long)]
    operation_timeout: Option<u64>,

    /// Which errors stop cleanup of the remaining projects
    #[arg(long, value_enum, default_value = "any")]
    fail_fast: FailFast,

    /// List what would be deleted without deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Config file with defaults [default: <config dir>/knative-cleanup/config.json]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn backends(&self) -> GcpBackends {
        GcpBackends {
            access_token_file: self.access_token_file.clone(),
            ..Default::default()
        }
    }

    /// Merge flags over config-file values over built-in defaults
    fn into_options(self, config: &Config) -> CleanupOptions {
        let operation_timeout = self.operation_timeout.or(config.operation_timeout_secs);

        CleanupOptions {
            projects: self.projects,
            resource_files: self.project_resource_yaml,
            project_pattern: self
                .re_project_name
                .or_else(|| config.re_project_name.clone())
                .unwrap_or_else(|| DEFAULT_PROJECT_PATTERN.to_string()),
            days_to_keep_images: self.days_to_keep_images,
            hours_to_keep_clusters: self.hours_to_keep_clusters,
            registry: self
                .gcr
                .or_else(|| config.gcr.clone())
                .unwrap_or_else(|| DEFAULT_REGISTRY.to_string()),
            service_account: self
                .service_account
                .or_else(|| config.service_account.clone()),
            delete: DeleteOptions {
                concurrency: self
                    .concurrent_operations
                    .or(config.concurrent_operations)
                    .unwrap_or(DEFAULT_CONCURRENCY),
                dry_run: self.dry_run,
                fail_fast: self.fail_fast,
                timeout: operation_timeout.map(Duration::from_secs),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let Some(log_path) = log_file else {
        tracing_subscriber::fmt()
            .with_max_level(tracing_level)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        return Ok(None);
    };

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level, args.log_file.as_deref())?;

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    let backends = args.backends();
    let options = args.into_options(&config);
    tracing::debug!("Resolved options: {:?}", options);

    if let Err(err) = knative_cleanup::run(&options, &backends).await {
        tracing::error!("Cleanup failed: {}", err);
        return Err(err.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("knative-cleanup").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let options = parse(&["--project", "p1"]).into_options(&Config::default());
        assert_eq!(options.projects, vec!["p1"]);
        assert_eq!(options.project_pattern, DEFAULT_PROJECT_PATTERN);
        assert_eq!(options.days_to_keep_images, 365);
        assert_eq!(options.hours_to_keep_clusters, 720);
        assert_eq!(options.registry, "gcr.io");
        assert_eq!(options.delete.concurrency, 10);
        assert_eq!(options.delete.fail_fast, FailFast::Any);
        assert!(options.delete.timeout.is_none());
        assert!(!options.delete.dry_run);
    }

    #[test]
    fn test_repeatable_flags_and_negative_thresholds() {
        let options = parse(&[
            "--project-resource-yaml",
            "a.yaml",
            "--project-resource-yaml",
            "b.yaml",
            "--days-to-keep-images",
            "-1",
            "--hours-to-keep-clusters=-1",
            "--dry-run",
            "--fail-fast",
            "except-forbidden",
        ])
        .into_options(&Config::default());

        assert_eq!(
            options.resource_files,
            vec![PathBuf::from("a.yaml"), PathBuf::from("b.yaml")]
        );
        assert_eq!(options.days_to_keep_images, -1);
        assert_eq!(options.hours_to_keep_clusters, -1);
        assert!(options.delete.dry_run);
        assert_eq!(options.delete.fail_fast, FailFast::ExceptForbidden);
    }

    #[test]
    fn test_access_token_file_reaches_backends() {
        let args = parse(&["--project", "p", "--access-token-file", "/tmp/token"]);
        assert_eq!(
            args.backends().access_token_file,
            Some(PathBuf::from("/tmp/token"))
        );
        assert!(parse(&["--project", "p"]).backends().access_token_file.is_none());
    }

    #[test]
    fn test_flags_override_config() {
        let config = Config {
            gcr: Some("eu.gcr.io".into()),
            concurrent_operations: Some(2),
            operation_timeout_secs: Some(60),
            ..Default::default()
        };

        let from_config = parse(&["--project", "p"]).into_options(&config);
        assert_eq!(from_config.registry, "eu.gcr.io");
        assert_eq!(from_config.delete.concurrency, 2);
        assert_eq!(from_config.delete.timeout, Some(Duration::from_secs(60)));

        let from_flags = parse(&["--project", "p", "--gcr", "us.gcr.io", "--concurrent-operations", "5"])
            .into_options(&config);
        assert_eq!(from_flags.registry, "us.gcr.io");
        assert_eq!(from_flags.delete.concurrency, 5);
    }
}
