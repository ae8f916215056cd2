//! JSON-LD definition-language parser
//!
//! Reads interface documents (a JSON object or an array of them per text),
//! derives identifiers for members and inline interfaces, and checks that
//! every `extends` entry and component schema names a known interface.

use super::{ModelParser, ModelResolver, ParseIssue, ParsedModels, ParserFailure};
use crate::entity::{ContentEntity, EntityKind, LocalizedText, ModelEntity};
use crate::id::ModelId;
use async_trait::async_trait;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z](?:[A-Za-z0-9_]*[A-Za-z0-9])?$").expect("name pattern is a valid regex")
});

const CONTENT_TYPES: [&str; 5] = ["Property", "Telemetry", "Command", "Relationship", "Component"];

/// Parser for JSON-LD interface definitions
#[derive(Clone)]
pub struct DtdlParser {
    resolver: Option<Arc<dyn ModelResolver>>,
    max_resolution_rounds: usize,
    extensions: Vec<String>,
}

impl std::fmt::Debug for DtdlParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DtdlParser")
            .field("has_resolver", &self.resolver.is_some())
            .field("max_resolution_rounds", &self.max_resolution_rounds)
            .field("extensions", &self.extensions)
            .finish()
    }
}

impl Default for DtdlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DtdlParser {
    /// Create parser without external resolution
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolver: None,
            max_resolution_rounds: 16,
            extensions: vec!["json".to_string()],
        }
    }

    /// With definition file extensions (without dot)
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// With resolver for references outside the batch
    #[inline]
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ModelResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// With maximum number of resolver round trips
    #[inline]
    #[must_use]
    pub fn with_max_resolution_rounds(mut self, rounds: usize) -> Self {
        self.max_resolution_rounds = rounds;
        self
    }

    async fn resolve_external(
        &self,
        known: &mut BTreeSet<ModelId>,
        references: &mut Vec<Reference>,
    ) -> Result<Vec<ParseIssue>, ParserFailure> {
        let Some(resolver) = &self.resolver else {
            return Ok(Vec::new());
        };

        let mut issues = Vec::new();
        for round in 1..=self.max_resolution_rounds {
            let missing: BTreeSet<ModelId> = references
                .iter()
                .filter(|r| !known.contains(&r.to))
                .map(|r| r.to.clone())
                .collect();
            if missing.is_empty() {
                break;
            }

            let ids: Vec<ModelId> = missing.into_iter().collect();
            tracing::debug!(round, missing = ids.len(), "resolving external models");
            let texts = resolver
                .resolve(&ids)
                .await
                .map_err(ParserFailure::Resolution)?;
            if texts.is_empty() {
                break;
            }

            let mut resolved = Collector::default();
            for (index, text) in texts.iter().enumerate() {
                resolved.ingest_text(index, text);
            }
            let before = known.len();
            known.extend(resolved.interface_ids());
            references.append(&mut resolved.references);
            issues.append(&mut resolved.issues);
            if known.len() == before {
                break;
            }
        }
        Ok(issues)
    }
}

#[async_trait]
impl ModelParser for DtdlParser {
    async fn parse(&self, texts: &[String]) -> Result<ParsedModels, ParserFailure> {
        let mut batch = Collector::default();
        for (index, text) in texts.iter().enumerate() {
            batch.ingest_text(index, text);
        }

        let mut known = batch.interface_ids();
        let mut references = std::mem::take(&mut batch.references);
        let mut issues = std::mem::take(&mut batch.issues);
        issues.extend(self.resolve_external(&mut known, &mut references).await?);

        for reference in &references {
            if !known.contains(&reference.to) {
                issues.push(
                    ParseIssue::new("reference to undefined model")
                        .on(&reference.from)
                        .referring_to(&reference.to)
                        .at(reference.property),
                );
            }
        }

        if issues.is_empty() {
            Ok(ParsedModels::new(batch.entities))
        } else {
            Err(ParserFailure::Invalid(issues))
        }
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

#[derive(Debug)]
struct Reference {
    from: ModelId,
    to: ModelId,
    property: &'static str,
}

#[derive(Debug, Default)]
struct Collector {
    entities: BTreeMap<ModelId, ModelEntity>,
    inline_ids: BTreeSet<ModelId>,
    references: Vec<Reference>,
    issues: Vec<ParseIssue>,
}

impl Collector {
    fn interface_ids(&self) -> BTreeSet<ModelId> {
        self.entities
            .values()
            .filter(|e| e.is_interface())
            .map(|e| e.id.clone())
            .chain(self.inline_ids.iter().cloned())
            .collect()
    }

    fn ingest_text(&mut self, index: usize, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => {
                for item in &items {
                    self.ingest_interface(item);
                }
            }
            Ok(value @ Value::Object(_)) => {
                self.ingest_interface(&value);
            }
            Ok(_) => self.issues.push(ParseIssue::new(format!(
                "definition {index} must be a JSON object or an array of objects"
            ))),
            Err(e) => self
                .issues
                .push(ParseIssue::new(format!("definition {index} is not valid JSON: {e}"))),
        }
    }

    fn ingest_interface(&mut self, value: &Value) {
        if let Some(entity) = self.read_interface(value, None) {
            self.insert(entity);
        }
    }

    /// Read an interface; `derived_id` is set for interfaces written inline
    fn read_interface(&mut self, value: &Value, derived_id: Option<ModelId>) -> Option<ModelEntity> {
        let Some(obj) = value.as_object() else {
            self.issues
                .push(ParseIssue::new("interface definition must be a JSON object"));
            return None;
        };

        let id = match (obj.get("@id"), derived_id) {
            (Some(raw), _) => self.read_id(raw, None, "@id")?,
            (None, Some(derived)) => derived,
            (None, None) => {
                self.issues
                    .push(ParseIssue::new("interface has no @id").at("@id"));
                return None;
            }
        };

        let types = type_names(obj.get("@type"));
        if !types.iter().any(|t| t == "Interface") {
            self.issues.push(
                ParseIssue::new(format!("expected @type Interface, found {types:?}"))
                    .on(&id)
                    .at("@type"),
            );
            return None;
        }

        let mut entity = ModelEntity::interface(id.clone());
        entity.display_name = self.read_display_name(obj, &id);
        let mut inline = Vec::new();
        entity.extends = self.read_extends(obj, &id, &mut inline);
        entity.contents = self.read_contents(obj, &id, &mut inline);
        entity.inline = inline;
        Some(entity)
    }

    /// Read an interface written inside `owner` and keep it in `inline`
    fn read_inline(
        &mut self,
        value: &Value,
        derived_id: ModelId,
        inline: &mut Vec<ModelEntity>,
    ) -> Option<ModelId> {
        let entity = self.read_interface(value, Some(derived_id))?;
        let id = entity.id.clone();
        if self.entities.contains_key(&id) || !self.inline_ids.insert(id.clone()) {
            self.issues
                .push(ParseIssue::new("duplicate definition").on(&id).at("@id"));
            return None;
        }
        inline.push(entity);
        Some(id)
    }

    fn read_extends(
        &mut self,
        obj: &Map<String, Value>,
        owner: &ModelId,
        inline: &mut Vec<ModelEntity>,
    ) -> Vec<ModelId> {
        let items: Vec<&Value> = match obj.get("extends") {
            None => return Vec::new(),
            Some(Value::Array(items)) => items.iter().collect(),
            Some(single) => vec![single],
        };

        let mut parents = Vec::new();
        for (index, item) in items.into_iter().enumerate() {
            let parent = match item {
                Value::String(_) => self.read_id(item, Some(owner), "extends"),
                Value::Object(_) => {
                    self.read_inline(item, owner.nested(&format!("_extends:__{index}")), inline)
                }
                _ => {
                    self.issues.push(
                        ParseIssue::new("extends entries must be identifiers or interfaces")
                            .on(owner)
                            .at("extends"),
                    );
                    None
                }
            };
            if let Some(parent) = parent {
                self.references.push(Reference {
                    from: owner.clone(),
                    to: parent.clone(),
                    property: "extends",
                });
                parents.push(parent);
            }
        }
        parents
    }

    fn read_contents(
        &mut self,
        obj: &Map<String, Value>,
        owner: &ModelId,
        inline: &mut Vec<ModelEntity>,
    ) -> IndexMap<String, ContentEntity> {
        let mut contents = IndexMap::new();
        let items = match obj.get("contents") {
            None => return contents,
            Some(Value::Array(items)) => items,
            Some(_) => {
                self.issues.push(
                    ParseIssue::new("contents must be an array")
                        .on(owner)
                        .at("contents"),
                );
                return contents;
            }
        };

        for item in items {
            if let Some(content) = self.read_content(item, owner, inline) {
                let name = content.name().to_string();
                if contents.contains_key(&name) {
                    self.issues.push(
                        ParseIssue::new(format!("duplicate content name '{name}'"))
                            .on(owner)
                            .at("name"),
                    );
                    continue;
                }
                contents.insert(name, content);
            }
        }
        contents
    }

    fn read_content(
        &mut self,
        value: &Value,
        owner: &ModelId,
        inline: &mut Vec<ModelEntity>,
    ) -> Option<ContentEntity> {
        let Some(obj) = value.as_object() else {
            self.issues.push(
                ParseIssue::new("content entries must be JSON objects")
                    .on(owner)
                    .at("contents"),
            );
            return None;
        };

        let name = match obj.get("name").and_then(Value::as_str) {
            Some(name) if NAME_PATTERN.is_match(name) => name.to_string(),
            Some(name) => {
                self.issues.push(
                    ParseIssue::new(format!("invalid content name '{name}'"))
                        .on(owner)
                        .at("name"),
                );
                return None;
            }
            None => {
                self.issues
                    .push(ParseIssue::new("content has no name").on(owner).at("name"));
                return None;
            }
        };

        let types = type_names(obj.get("@type"));
        let Some(primary) = CONTENT_TYPES
            .iter()
            .find(|candidate| types.iter().any(|t| t.as_str() == **candidate))
        else {
            self.issues.push(
                ParseIssue::new(format!("unsupported content @type {types:?} for '{name}'"))
                    .on(owner)
                    .at("@type"),
            );
            return None;
        };

        let content_id = match obj.get("@id") {
            Some(raw) => self.read_id(raw, Some(owner), "@id")?,
            None => owner.nested(&format!("_contents:__{name}")),
        };

        let content = match *primary {
            "Property" | "Telemetry" => {
                let Some(schema) = obj.get("schema") else {
                    self.issues.push(
                        ParseIssue::new(format!("'{name}' has no schema"))
                            .on(owner)
                            .at("schema"),
                    );
                    return None;
                };
                if *primary == "Property" {
                    ContentEntity::Property {
                        name,
                        schema: schema.clone(),
                    }
                } else {
                    ContentEntity::Other {
                        name,
                        type_name: (*primary).to_string(),
                    }
                }
            }
            "Command" => ContentEntity::Other {
                name,
                type_name: (*primary).to_string(),
            },
            "Relationship" => {
                let target = match obj.get("target") {
                    None => None,
                    Some(raw) => Some(self.read_id(raw, Some(owner), "target")?),
                };
                ContentEntity::Relationship { name, target }
            }
            _ => {
                let schema = match obj.get("schema") {
                    Some(raw @ Value::String(_)) => self.read_id(raw, Some(owner), "schema")?,
                    Some(schema @ Value::Object(_)) => self.read_inline(
                        schema,
                        owner.nested(&format!("_contents:__{name}:_schema")),
                        inline,
                    )?,
                    _ => {
                        self.issues.push(
                            ParseIssue::new(format!(
                                "component '{name}' must name an interface as its schema"
                            ))
                            .on(owner)
                            .at("schema"),
                        );
                        return None;
                    }
                };
                self.references.push(Reference {
                    from: owner.clone(),
                    to: schema.clone(),
                    property: "schema",
                });
                ContentEntity::Component { name, schema }
            }
        };

        let mut member = ModelEntity::of_kind(content_id, content.kind());
        member.display_name = self.read_display_name(obj, owner);
        self.insert(member);
        Some(content)
    }

    fn read_id(
        &mut self,
        raw: &Value,
        owner: Option<&ModelId>,
        property: &'static str,
    ) -> Option<ModelId> {
        let parsed = raw
            .as_str()
            .and_then(|s| s.parse::<ModelId>().ok())
            .filter(ModelId::is_dtmi);
        if parsed.is_none() {
            let mut issue = ParseIssue::new(format!("invalid model identifier {raw}")).at(property);
            if let Some(owner) = owner {
                issue = issue.on(owner);
            }
            self.issues.push(issue);
        }
        parsed
    }

    fn read_display_name(&mut self, obj: &Map<String, Value>, owner: &ModelId) -> Option<LocalizedText> {
        match obj.get("displayName")? {
            Value::String(text) => Some(LocalizedText::plain(text.clone())),
            Value::Object(map) => {
                let mut text = LocalizedText::default();
                for (lang, value) in map {
                    match value.as_str() {
                        Some(s) => text = text.with(lang.clone(), s),
                        None => self.issues.push(
                            ParseIssue::new(format!("displayName for '{lang}' must be a string"))
                                .on(owner)
                                .at("displayName"),
                        ),
                    }
                }
                Some(text)
            }
            _ => {
                self.issues.push(
                    ParseIssue::new("displayName must be a string or language map")
                        .on(owner)
                        .at("displayName"),
                );
                None
            }
        }
    }

    fn insert(&mut self, entity: ModelEntity) {
        if self.entities.contains_key(&entity.id) || self.inline_ids.contains(&entity.id) {
            self.issues.push(
                ParseIssue::new("duplicate definition")
                    .on(&entity.id)
                    .at("@id"),
            );
            return;
        }
        self.entities.insert(entity.id.clone(), entity);
    }
}

fn type_names(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
