//! Parsed model entities
//!
//! A [`ModelEntity`] is the immutable, parsed form of one model element. Only
//! `Interface` entities carry `extends` and `contents`; the parser also emits
//! entities for every member so callers can see the full object model.

use crate::id::ModelId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Kind of a parsed entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Model interface (the unit of upload and deletion)
    Interface,
    /// Property member
    Property,
    /// Relationship member
    Relationship,
    /// Component member
    Component,
    /// Anything else (telemetry, commands, schemas)
    Other,
}

/// Localized text keyed by language tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedText(BTreeMap<String, String>);

impl LocalizedText {
    /// Text without a language tag (stored as `en`)
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert("en".to_string(), text.into());
        Self(map)
    }

    /// Add a translation
    #[must_use]
    pub fn with(mut self, lang: impl Into<String>, text: impl Into<String>) -> Self {
        self.0.insert(lang.into(), text.into());
        self
    }

    /// Text in the given language
    #[must_use]
    pub fn get(&self, lang: &str) -> Option<&str> {
        self.0.get(lang).map(String::as_str)
    }

    /// Best text for display: English, otherwise the first available
    #[must_use]
    pub fn best(&self) -> Option<&str> {
        self.get("en")
            .or_else(|| self.0.values().next().map(String::as_str))
    }

    /// Check if no translation is present
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn to_value(&self) -> Value {
        match (self.0.len(), self.get("en")) {
            (1, Some(text)) => Value::String(text.to_string()),
            _ => json!(self.0),
        }
    }
}

/// How one model refers to another in a way that blocks deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Inheritance edge
    Extends,
    /// Component schema edge
    Component,
}

/// Named member of an interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ContentEntity {
    /// Property with its schema (primitive name or complex schema object)
    Property {
        /// Member name
        name: String,
        /// Schema as written
        schema: Value,
    },
    /// Relationship naming an optional target model
    Relationship {
        /// Member name
        name: String,
        /// Target model, if constrained
        target: Option<ModelId>,
    },
    /// Embedded component of another interface
    Component {
        /// Member name
        name: String,
        /// Interface used as the component schema
        schema: ModelId,
    },
    /// Telemetry, command or any other member
    Other {
        /// Member name
        name: String,
        /// Declared `@type`
        type_name: String,
    },
}

impl ContentEntity {
    /// Member name
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Property { name, .. }
            | Self::Relationship { name, .. }
            | Self::Component { name, .. }
            | Self::Other { name, .. } => name,
        }
    }

    /// Entity kind of the member
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Property { .. } => EntityKind::Property,
            Self::Relationship { .. } => EntityKind::Relationship,
            Self::Component { .. } => EntityKind::Component,
            Self::Other { .. } => EntityKind::Other,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Property { name, schema } => {
                json!({ "@type": "Property", "name": name, "schema": schema })
            }
            Self::Relationship { name, target } => {
                let mut value = json!({ "@type": "Relationship", "name": name });
                if let (Some(target), Value::Object(map)) = (target, &mut value) {
                    map.insert("target".into(), Value::String(target.to_string()));
                }
                value
            }
            Self::Component { name, schema } => {
                json!({ "@type": "Component", "name": name, "schema": schema.as_str() })
            }
            Self::Other { name, type_name } => {
                json!({ "@type": type_name, "name": name, "schema": "string" })
            }
        }
    }
}

/// Parsed model element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntity {
    /// Identifier
    pub id: ModelId,
    /// Entity kind
    pub kind: EntityKind,
    /// Display name
    pub display_name: Option<LocalizedText>,
    /// Parent interfaces, in declaration order
    pub extends: Vec<ModelId>,
    /// Members by name
    pub contents: IndexMap<String, ContentEntity>,
    /// Interfaces defined inline in `extends` or as component schemas
    ///
    /// They have derived ids, are never stored on their own and do not take
    /// part in deletion; their dependencies count as the owner's.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inline: Vec<ModelEntity>,
}

impl ModelEntity {
    /// Create an interface with no parents and no members
    #[must_use]
    pub fn interface(id: ModelId) -> Self {
        Self::of_kind(id, EntityKind::Interface)
    }

    /// Create an entity of any kind
    #[must_use]
    pub fn of_kind(id: ModelId, kind: EntityKind) -> Self {
        Self {
            id,
            kind,
            display_name: None,
            extends: Vec::new(),
            contents: IndexMap::new(),
            inline: Vec::new(),
        }
    }

    /// With display name
    #[must_use]
    pub fn with_display_name(mut self, name: LocalizedText) -> Self {
        self.display_name = Some(name);
        self
    }

    /// With an additional parent
    #[must_use]
    pub fn with_extends(mut self, parent: ModelId) -> Self {
        self.extends.push(parent);
        self
    }

    /// With an additional member (replaces a member of the same name)
    #[must_use]
    pub fn with_content(mut self, content: ContentEntity) -> Self {
        self.contents.insert(content.name().to_string(), content);
        self
    }

    /// With an interface defined inline (referenced by id from `extends` or a component)
    #[must_use]
    pub fn with_inline(mut self, interface: ModelEntity) -> Self {
        self.inline.push(interface);
        self
    }

    /// Check if this is an interface
    #[inline]
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.kind == EntityKind::Interface
    }

    /// Display name for humans, falling back to the identifier
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name
            .as_ref()
            .and_then(LocalizedText::best)
            .unwrap_or_else(|| self.id.as_str())
    }

    /// Models this entity depends on structurally
    ///
    /// Yields every `extends` entry followed by every component schema.
    /// References to inline interfaces are replaced by what those interfaces
    /// depend on. Relationship targets are not dependencies.
    #[must_use]
    pub fn dependencies(&self) -> Vec<(&ModelId, DependencyKind)> {
        let parents = self.extends.iter().map(|id| (id, DependencyKind::Extends));
        let components = self.contents.values().filter_map(|content| match content {
            ContentEntity::Component { schema, .. } => Some((schema, DependencyKind::Component)),
            _ => None,
        });

        let mut deps = Vec::new();
        for (id, kind) in parents.chain(components) {
            match self.inline_interface(id) {
                Some(nested) => deps.extend(nested.dependencies()),
                None => deps.push((id, kind)),
            }
        }
        deps
    }

    /// Check if this entity depends on `other`
    #[must_use]
    pub fn depends_on(&self, other: &ModelId) -> bool {
        self.dependencies().iter().any(|(id, _)| *id == other)
    }

    fn inline_interface(&self, id: &ModelId) -> Option<&ModelEntity> {
        self.inline.iter().find(|nested| &nested.id == id)
    }

    /// Render the entity as a definition document the parser accepts
    #[must_use]
    pub fn to_definition(&self) -> Value {
        let mut map = Map::new();
        map.insert("@context".into(), Value::String(crate::parser::DTDL_CONTEXT.into()));
        map.insert("@id".into(), Value::String(self.id.to_string()));
        self.render_body(&mut map);
        Value::Object(map)
    }

    // Inline interfaces are written without `@id`; parsing derives the same id again
    fn render_body(&self, map: &mut Map<String, Value>) {
        map.insert("@type".into(), Value::String("Interface".into()));
        if let Some(name) = &self.display_name {
            map.insert("displayName".into(), name.to_value());
        }
        if !self.extends.is_empty() {
            let parents = self.extends.iter().map(|id| self.render_reference(id)).collect();
            map.insert("extends".into(), Value::Array(parents));
        }
        if !self.contents.is_empty() {
            let contents = self
                .contents
                .values()
                .map(|content| {
                    let mut value = content.to_value();
                    if let (ContentEntity::Component { schema, .. }, Value::Object(member)) =
                        (content, &mut value)
                    {
                        member.insert("schema".into(), self.render_reference(schema));
                    }
                    value
                })
                .collect();
            map.insert("contents".into(), Value::Array(contents));
        }
    }

    fn render_reference(&self, id: &ModelId) -> Value {
        match self.inline_interface(id) {
            Some(nested) => {
                let mut map = Map::new();
                nested.render_body(&mut map);
                Value::Object(map)
            }
            None => Value::String(id.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ModelId {
        s.parse().unwrap()
    }

    #[test]
    fn dependencies_cover_extends_and_components_only() {
        let entity = ModelEntity::interface(id("dtmi:t:Room;1"))
            .with_extends(id("dtmi:t:Space;1"))
            .with_content(ContentEntity::Component {
                name: "hvac".into(),
                schema: id("dtmi:t:Hvac;1"),
            })
            .with_content(ContentEntity::Relationship {
                name: "contains".into(),
                target: Some(id("dtmi:t:Sensor;1")),
            });

        let deps: Vec<_> = entity
            .dependencies()
            .into_iter()
            .map(|(id, kind)| (id.as_str(), kind))
            .collect();
        assert_eq!(
            deps,
            vec![
                ("dtmi:t:Space;1", DependencyKind::Extends),
                ("dtmi:t:Hvac;1", DependencyKind::Component),
            ]
        );
        assert!(!entity.depends_on(&id("dtmi:t:Sensor;1")));
    }

    #[test]
    fn label_prefers_english_display_name() {
        let plain = ModelEntity::interface(id("dtmi:t:Room;1"));
        assert_eq!(plain.label(), "dtmi:t:Room;1");

        let named = plain.with_display_name(LocalizedText::plain("Room").with("fr", "Salle"));
        assert_eq!(named.label(), "Room");
    }

    #[test]
    fn definition_lists_members() {
        let entity = ModelEntity::interface(id("dtmi:t:Room;1"))
            .with_display_name(LocalizedText::plain("Room"))
            .with_extends(id("dtmi:t:Space;1"))
            .with_content(ContentEntity::Property {
                name: "temp".into(),
                schema: Value::String("double".into()),
            });

        let doc = entity.to_definition();
        assert_eq!(doc["@id"], "dtmi:t:Room;1");
        assert_eq!(doc["displayName"], "Room");
        assert_eq!(doc["extends"][0], "dtmi:t:Space;1");
        assert_eq!(doc["contents"][0]["name"], "temp");
    }

    fn room_with_inline_lamp() -> ModelEntity {
        let lamp_id = id("dtmi:t:Room:_contents:__lamp:_schema;1");
        let lamp = ModelEntity::interface(lamp_id.clone()).with_extends(id("dtmi:t:Device;1"));
        ModelEntity::interface(id("dtmi:t:Room;1"))
            .with_content(ContentEntity::Component {
                name: "lamp".into(),
                schema: lamp_id,
            })
            .with_inline(lamp)
    }

    #[test]
    fn inline_interfaces_lend_their_dependencies_to_the_owner() {
        let room = room_with_inline_lamp();
        let deps: Vec<_> = room
            .dependencies()
            .into_iter()
            .map(|(id, kind)| (id.as_str(), kind))
            .collect();
        assert_eq!(deps, vec![("dtmi:t:Device;1", DependencyKind::Extends)]);
        assert!(room.depends_on(&id("dtmi:t:Device;1")));
        assert!(!room.depends_on(&id("dtmi:t:Room:_contents:__lamp:_schema;1")));
    }

    #[test]
    fn inline_interfaces_render_inline() {
        let doc = room_with_inline_lamp().to_definition();
        let schema = &doc["contents"][0]["schema"];
        assert_eq!(schema["@type"], "Interface");
        assert!(schema.get("@id").is_none());
        assert_eq!(schema["extends"][0], "dtmi:t:Device;1");
    }
}
