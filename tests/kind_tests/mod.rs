//! Integration tests for the secret annotator
//!
//! These tests run reconciliation against a real API server, with the cloud
//! side replaced by fixed-answer probes, and tell the story of what a cluster
//! operator sees on the credentials secret.
//!
//! # Test Organization
//!
//! - `secret_annotation`: Stories about the mode annotation written for
//!   capable, limited, malformed and missing credentials
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored
//! ```

mod helpers;
mod secret_annotation;
