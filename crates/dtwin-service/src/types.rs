//! Service data types
//!
//! Field names follow the service's JSON contract (`$dtId`, `$sourceId`, ...);
//! everything not covered by a typed field lands in `contents`/`properties`.

use chrono::{DateTime, Utc};
use dtwin_model::{LocalizedText, ModelId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};

/// Model as stored by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelData {
    /// Model identifier
    pub id: ModelId,
    /// Display name, if the definition has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<LocalizedText>,
    /// Upload time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_time: Option<DateTime<Utc>>,
    /// Whether new twins may still use the model
    #[serde(default)]
    pub decommissioned: bool,
    /// Definition document, when requested
    #[serde(default, rename = "model", skip_serializing_if = "Option::is_none")]
    pub definition: Option<Value>,
}

impl ModelData {
    /// Create model data for `id`
    #[must_use]
    pub fn new(id: ModelId) -> Self {
        Self {
            id,
            display_name: None,
            upload_time: None,
            decommissioned: false,
            definition: None,
        }
    }

    /// With definition document
    #[must_use]
    pub fn with_definition(mut self, definition: Value) -> Self {
        self.definition = Some(definition);
        self
    }
}

/// Metadata block of a twin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwinMetadata {
    /// Model the twin conforms to
    #[serde(rename = "$model")]
    pub model: ModelId,
    /// Per-property metadata
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

/// Twin instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicTwin {
    /// Twin identifier
    #[serde(rename = "$dtId")]
    pub id: String,
    /// Entity tag for conditional updates
    #[serde(rename = "$etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Metadata (model, property metadata)
    #[serde(rename = "$metadata")]
    pub metadata: TwinMetadata,
    /// Property and component values
    #[serde(flatten)]
    pub contents: Map<String, Value>,
}

impl BasicTwin {
    /// Create twin of `model` without properties
    #[must_use]
    pub fn new(id: impl Into<String>, model: ModelId) -> Self {
        Self {
            id: id.into(),
            etag: None,
            metadata: TwinMetadata {
                model,
                properties: Map::new(),
            },
            contents: Map::new(),
        }
    }

    /// With property value
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.contents.insert(name.into(), value);
        self
    }

    /// Model identifier
    #[inline]
    #[must_use]
    pub fn model(&self) -> &ModelId {
        &self.metadata.model
    }
}

/// Relationship as listed from its source twin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicRelationship {
    /// Relationship identifier (unique per source twin)
    #[serde(rename = "$relationshipId")]
    pub id: String,
    /// Entity tag
    #[serde(rename = "$etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Source twin
    #[serde(rename = "$sourceId")]
    pub source_id: String,
    /// Relationship name from the source model
    #[serde(rename = "$relationshipName")]
    pub name: String,
    /// Target twin
    #[serde(rename = "$targetId")]
    pub target_id: String,
    /// Relationship properties
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl BasicRelationship {
    /// Create relationship `source --name--> target`
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        name: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            etag: None,
            source_id: source_id.into(),
            name: name.into(),
            target_id: target_id.into(),
            properties: Map::new(),
        }
    }
}

/// Relationship as listed from its target twin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingRelationship {
    /// Relationship identifier
    #[serde(rename = "$relationshipId")]
    pub relationship_id: String,
    /// Source twin (the key needed to delete it)
    #[serde(rename = "$sourceId")]
    pub source_id: String,
    /// Relationship name
    #[serde(rename = "$relationshipName")]
    pub relationship_name: String,
    /// Link to the relationship resource
    #[serde(rename = "$relationshipLink", default)]
    pub relationship_link: String,
}

impl From<&BasicRelationship> for IncomingRelationship {
    fn from(rel: &BasicRelationship) -> Self {
        Self {
            relationship_id: rel.id.clone(),
            source_id: rel.source_id.clone(),
            relationship_name: rel.name.clone(),
            relationship_link: format!("/digitaltwins/{}/relationships/{}", rel.source_id, rel.id),
        }
    }
}

/// Which twins a bulk query selects
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TwinFilter {
    /// Every twin
    #[default]
    All,
    /// Twins of a model or of any model extending it
    OfModel(ModelId),
}

impl TwinFilter {
    /// Query text selecting the twin ids
    #[must_use]
    pub fn to_query(&self) -> String {
        match self {
            Self::All => "SELECT T.$dtId FROM DIGITALTWINS T".to_string(),
            Self::OfModel(model) => format!(
                "SELECT T.$dtId FROM DIGITALTWINS T WHERE IS_OF_MODEL(T, '{}')",
                model.as_str().replace('\'', "\\'")
            ),
        }
    }
}

impl Display for TwinFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all twins"),
            Self::OfModel(model) => write!(f, "twins of {model}"),
        }
    }
}

/// JSON patch operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Add a value
    Add,
    /// Replace an existing value
    Replace,
    /// Remove a value
    Remove,
}

/// One JSON patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    /// Operation
    pub op: PatchOp,
    /// JSON pointer to the target
    pub path: String,
    /// Value for add/replace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    /// Replace the value at `path`
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: Some(value),
        }
    }

    /// Add a value at `path`
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    /// Remove the value at `path`
    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn id(s: &str) -> ModelId {
        s.parse().unwrap()
    }

    #[test]
    fn twin_uses_service_field_names() {
        let twin = BasicTwin::new("t1", id("dtmi:t:Room;1")).with_property("temp", json!(21.5));
        let value = serde_json::to_value(&twin).unwrap();
        assert_eq!(
            value,
            json!({ "$dtId": "t1", "$metadata": { "$model": "dtmi:t:Room;1" }, "temp": 21.5 })
        );

        let back: BasicTwin = serde_json::from_value(value).unwrap();
        assert_eq!(back, twin);
    }

    #[test]
    fn relationship_keeps_extra_properties() {
        let value = json!({
            "$relationshipId": "r1",
            "$etag": "W/\"1\"",
            "$sourceId": "t1",
            "$relationshipName": "contains",
            "$targetId": "t2",
            "since": "2024"
        });
        let rel: BasicRelationship = serde_json::from_value(value).unwrap();
        assert_eq!(rel.name, "contains");
        assert_eq!(rel.properties["since"], "2024");
    }

    #[test]
    fn model_data_reads_service_listing() {
        let value = json!({
            "id": "dtmi:t:Room;1",
            "displayName": { "en": "Room" },
            "uploadTime": "2024-05-01T10:00:00Z",
            "decommissioned": true,
            "model": { "@id": "dtmi:t:Room;1" }
        });
        let data: ModelData = serde_json::from_value(value).unwrap();
        assert!(data.decommissioned);
        assert_eq!(data.display_name.unwrap().best(), Some("Room"));
        assert!(data.definition.is_some());
    }

    #[test]
    fn filter_queries() {
        assert_eq!(TwinFilter::All.to_query(), "SELECT T.$dtId FROM DIGITALTWINS T");
        assert_eq!(
            TwinFilter::OfModel(id("dtmi:t:Room;1")).to_query(),
            "SELECT T.$dtId FROM DIGITALTWINS T WHERE IS_OF_MODEL(T, 'dtmi:t:Room;1')"
        );
        assert_eq!(
            TwinFilter::OfModel(id("dtmi:t:O'Neil;1")).to_query(),
            "SELECT T.$dtId FROM DIGITALTWINS T WHERE IS_OF_MODEL(T, 'dtmi:t:O\\'Neil;1')"
        );
    }

    #[test]
    fn patch_serializes_without_empty_value() {
        let ops = vec![
            PatchOperation::replace("/temp", json!(20)),
            PatchOperation::remove("/humidity"),
        ];
        assert_eq!(
            serde_json::to_value(&ops).unwrap(),
            json!([
                { "op": "replace", "path": "/temp", "value": 20 },
                { "op": "remove", "path": "/humidity" }
            ])
        );
    }
}
