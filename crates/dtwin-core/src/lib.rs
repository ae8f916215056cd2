//! dtwin Core
//!
//! Reference-safe deletion against a twin-graph service:
//! - [`DependencyGraph`]: which models are still referenced by others
//! - [`ModelDeletionResolver`]: pass-by-pass model deletion with a no-progress guard
//! - [`RelationshipCascade`]: relationship cleanup before a twin is deleted
//! - [`DeletionOrchestrator`]: bulk runs, uploads and single deletions
//!
//! # Example
//!
//! ```rust,ignore
//! use dtwin_core::{DeletionOrchestrator, DtwinConfig};
//! use dtwin_service::{RestTwinGraph, TwinFilter};
//! use std::sync::Arc;
//!
//! let config = DtwinConfig::from_file("dtwin.toml")?.with_env();
//! let service = Arc::new(RestTwinGraph::new(config.rest_config()?)?);
//! let orchestrator = DeletionOrchestrator::from_config(service, &config);
//!
//! orchestrator.delete_all_twins(&TwinFilter::All).await?.into_result()?;
//! orchestrator.delete_all_models().await?.into_result()?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod cancel;
mod cascade;
mod config;
mod error;
mod graph;
mod orchestrator;
mod report;
mod resolver;

pub use cascade::RelationshipCascade;
pub use config::{
    DeletionConfig, DtwinConfig, LogConfig, LogFormat, ModelsConfig, ENV_ACCESS_TOKEN,
    ENV_API_VERSION, ENV_ENDPOINT,
};
pub use error::{ConfigError, DeletionError, DeletionResult};
pub use graph::DependencyGraph;
pub use orchestrator::DeletionOrchestrator;
pub use report::{CascadeReport, FailedItem, ModelDeletionReport, PassReport, TwinDeletionReport};
pub use resolver::ModelDeletionResolver;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
