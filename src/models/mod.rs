//! Data types shared by the signing service and the upload orchestrator.
//!
//! Media records map to metadata store rows via `sqlx::FromRow`; request and
//! response bodies serialize as JSON via `serde`.

pub mod credential;
pub mod media;
pub mod signing;
pub mod upload;
