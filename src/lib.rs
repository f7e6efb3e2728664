//! Gallery media upload pipeline.
//!
//! A signing service that hands out short-lived SigV4 presigned URLs for an
//! S3-compatible bucket, and an orchestrator that pushes local files through
//! those URLs and records them in a gallery's metadata store.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
