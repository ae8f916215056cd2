//! dtwin Service
//!
//! The twin-graph service seam consumed by the deletion engine:
//! - [`TwinGraphService`]: model, twin and relationship operations
//! - [`InMemoryTwinGraph`]: process-local graph enforcing the remote constraints
//! - [`RestTwinGraph`]: HTTP client for a REST twin-graph endpoint
//! - [`ServiceError`]: failures classified by status and error code

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod memory;
mod rest;
mod service;
mod types;

pub use error::{ServiceError, ServiceResult, TRANSPORT_STATUS};
pub use memory::{FailPoint, InMemoryTwinGraph, ServiceCall};
pub use rest::{RestConfig, RestTwinGraph, DEFAULT_API_VERSION};
pub use service::{ServiceStream, TwinGraphService};
pub use types::{
    BasicRelationship, BasicTwin, IncomingRelationship, ModelData, PatchOp, PatchOperation,
    TwinFilter, TwinMetadata,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
