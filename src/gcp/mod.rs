//! GCP API interaction module
//!
//! Authenticated REST plumbing plus the two resource clients the cleanup
//! engine drives.
//!
//! # Module Structure
//!
//! - [`auth`] - Credentials from ADC, a service account key, or a raw token
//! - [`client`] - Main GCP client for making API requests
//! - [`http`] - HTTP utilities for REST API calls
//! - [`gcr`] - Container Registry walking and deletion
//! - [`gke`] - GKE cluster listing and deletion

pub mod auth;
pub mod client;
pub mod gcr;
pub mod gke;
pub mod http;
