//! Cleanup of aged-out Knative test resources on GCP.
//!
//! Deletes old container images from GCR and old GKE clusters across a set of
//! test projects, a bounded number of projects at a time.

pub mod cleanup;
pub mod config;
pub mod error;
pub mod gcp;

pub use cleanup::{run, Backends, CleanupOptions, GcpBackends};
pub use error::{CleanupError, PartialDeletion};
