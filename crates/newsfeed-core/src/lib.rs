//! Shared domain types, configuration, error handling, and capability
//! contracts for the news ingestion pipeline. Every other crate in this
//! workspace depends on this one; it depends on none of them.

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use error::{PipelineError, Result};
pub use models::{ArticleRecord, ArticleStatus, LinkRecord, LinkStatus, VectorPayload, VectorPoint};
