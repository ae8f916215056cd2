//! dtwin Model
//!
//! Model definitions as the rest of the workspace sees them:
//! - [`ModelId`]: opaque, versioned model identifier
//! - [`ModelEntity`] / [`ContentEntity`]: parsed interfaces and their members
//! - [`ModelParser`]: the definition-language parser seam, with [`DtdlParser`]
//! - [`ModelRepository`]: definition texts loaded from disk plus validated interfaces
//!
//! # Example
//!
//! ```rust,ignore
//! use dtwin_model::{DtdlParser, ModelRepository};
//! use std::sync::Arc;
//!
//! let mut repo = ModelRepository::new(Arc::new(DtdlParser::new()));
//! let count = repo.validate_models("./models").await?;
//! println!("{count} interfaces validated");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod entity;
mod error;
mod id;
pub mod parser;
mod repository;

pub use entity::{ContentEntity, DependencyKind, EntityKind, LocalizedText, ModelEntity};
pub use error::RepositoryError;
pub use id::{ModelId, ModelIdError};
pub use parser::{
    parse_definitions, DtdlParser, ModelParser, ModelResolver, ParseIssue, ParseOutcome,
    ParsedModels, ParserFailure,
};
pub use repository::{LoadMode, ModelRepository};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
