//! Model definition parsing
//!
//! The parser itself is an oracle behind [`ModelParser`]. Callers go through
//! [`parse_definitions`], which flattens every parser failure into a list of
//! [`ParseIssue`]s and logs them.

use crate::entity::ModelEntity;
use crate::id::ModelId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::path::Path;

mod dtdl;

pub use dtdl::DtdlParser;

/// JSON-LD context written into rendered definitions
pub const DTDL_CONTEXT: &str = "dtmi:dtdl:context;3";

/// One structured parse error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseIssue {
    /// Human-readable cause
    pub cause: String,
    /// Element the error was found on
    pub primary_id: Option<ModelId>,
    /// Element the error refers to (e.g. the missing reference)
    pub secondary_id: Option<ModelId>,
    /// Offending property
    pub property: Option<String>,
}

impl ParseIssue {
    /// Create issue with only a cause
    #[must_use]
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
            primary_id: None,
            secondary_id: None,
            property: None,
        }
    }

    /// With primary element
    #[must_use]
    pub fn on(mut self, id: &ModelId) -> Self {
        self.primary_id = Some(id.clone());
        self
    }

    /// With referenced element
    #[must_use]
    pub fn referring_to(mut self, id: &ModelId) -> Self {
        self.secondary_id = Some(id.clone());
        self
    }

    /// With offending property
    #[must_use]
    pub fn at(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }
}

impl Display for ParseIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cause)?;
        if let Some(id) = &self.primary_id {
            write!(f, " [primary: {id}]")?;
        }
        if let Some(id) = &self.secondary_id {
            write!(f, " [secondary: {id}]")?;
        }
        if let Some(property) = &self.property {
            write!(f, " [property: {property}]")?;
        }
        Ok(())
    }
}

/// Entities produced by one successful parse, keyed by identifier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedModels {
    entities: BTreeMap<ModelId, ModelEntity>,
}

impl ParsedModels {
    /// Wrap an entity map
    #[must_use]
    pub fn new(entities: BTreeMap<ModelId, ModelEntity>) -> Self {
        Self { entities }
    }

    /// All entities (interfaces and their members)
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &BTreeMap<ModelId, ModelEntity> {
        &self.entities
    }

    /// Top-level interfaces only; inline interfaces are held by their owner
    pub fn interfaces(&self) -> impl Iterator<Item = &ModelEntity> {
        self.entities.values().filter(|e| e.is_interface())
    }

    /// Consume into top-level interfaces
    #[must_use]
    pub fn into_interfaces(self) -> Vec<ModelEntity> {
        self.entities
            .into_values()
            .filter(ModelEntity::is_interface)
            .collect()
    }

    /// Number of entities
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if nothing was parsed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Failure reported by a parser implementation
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParserFailure {
    /// Definitions do not conform to the language
    #[error("{} definition error(s)", .0.len())]
    Invalid(Vec<ParseIssue>),

    /// External references could not be fetched
    #[error("model resolution failed: {0}")]
    Resolution(String),
}

/// Result of [`parse_definitions`]: entities, or every issue found
pub type ParseOutcome = Result<ParsedModels, Vec<ParseIssue>>;

/// Supplies definitions for models referenced but not present in a batch
#[async_trait]
pub trait ModelResolver: Send + Sync {
    /// Return definition texts for as many of `ids` as are known
    async fn resolve(&self, ids: &[ModelId]) -> Result<Vec<String>, String>;
}

/// Definition-language parser
#[async_trait]
pub trait ModelParser: Send + Sync {
    /// Parse a batch of definition texts
    ///
    /// Only entities defined by `texts` are returned; definitions pulled in
    /// through a resolver take part in validation but are left out.
    async fn parse(&self, texts: &[String]) -> Result<ParsedModels, ParserFailure>;

    /// Supported definition file extensions (without dot)
    fn extensions(&self) -> &[String];

    /// Check if this parser can read the given path
    fn can_parse(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions().iter().any(|known| known.eq_ignore_ascii_case(ext)))
    }
}

/// Parse `texts` and translate the parser's failure shape into a flat issue list
pub async fn parse_definitions(parser: &dyn ModelParser, texts: &[String]) -> ParseOutcome {
    match parser.parse(texts).await {
        Ok(parsed) => {
            tracing::debug!(
                texts = texts.len(),
                entities = parsed.len(),
                "parsed model definitions"
            );
            Ok(parsed)
        }
        Err(ParserFailure::Invalid(issues)) => {
            for issue in &issues {
                tracing::error!(
                    primary = issue.primary_id.as_ref().map(ModelId::as_str),
                    secondary = issue.secondary_id.as_ref().map(ModelId::as_str),
                    property = issue.property.as_deref(),
                    "{}",
                    issue.cause
                );
            }
            Err(issues)
        }
        Err(ParserFailure::Resolution(message)) => {
            tracing::error!("model resolution failed: {message}");
            Err(vec![ParseIssue::new(format!(
                "model resolution failed: {message}"
            ))])
        }
    }
}
