//! Testing utilities for dtwin workspace
//!
//! Shared fixtures: model ids, entity sets, definition texts and seeded
//! in-memory twin graphs.

#![allow(missing_docs)]

use dtwin_model::{ContentEntity, ModelEntity, ModelId};
use dtwin_service::{BasicRelationship, BasicTwin, InMemoryTwinGraph};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

pub fn model_id(s: &str) -> ModelId {
    s.parse().unwrap()
}

pub fn interface(id: &str) -> ModelEntity {
    ModelEntity::interface(model_id(id))
}

pub fn extending(id: &str, parent: &str) -> ModelEntity {
    interface(id).with_extends(model_id(parent))
}

pub fn with_component(id: &str, name: &str, schema: &str) -> ModelEntity {
    interface(id).with_content(ContentEntity::Component {
        name: name.to_string(),
        schema: model_id(schema),
    })
}

/// A; B extends A; C embeds A as a component
pub fn abc_models() -> Vec<ModelEntity> {
    vec![
        interface("dtmi:test:A;1"),
        extending("dtmi:test:B;1", "dtmi:test:A;1"),
        with_component("dtmi:test:C;1", "part", "dtmi:test:A;1"),
    ]
}

/// A extends B; B extends A
pub fn cyclic_models() -> Vec<ModelEntity> {
    vec![
        extending("dtmi:test:A;1", "dtmi:test:B;1"),
        extending("dtmi:test:B;1", "dtmi:test:A;1"),
    ]
}

/// Definition document with the given parents and components
pub fn interface_definition(id: &str, extends: &[&str], components: &[(&str, &str)]) -> Value {
    let mut doc = json!({
        "@context": "dtmi:dtdl:context;3",
        "@id": id,
        "@type": "Interface",
    });
    if !extends.is_empty() {
        doc["extends"] = json!(extends);
    }
    let contents: Vec<Value> = components
        .iter()
        .map(|(name, schema)| json!({ "@type": "Component", "name": name, "schema": schema }))
        .collect();
    if !contents.is_empty() {
        doc["contents"] = Value::Array(contents);
    }
    doc
}

/// `interface_definition` as text
pub fn interface_text(id: &str, extends: &[&str], components: &[(&str, &str)]) -> String {
    interface_definition(id, extends, components).to_string()
}

/// Write `files` (relative path, content) under `dir`
pub fn write_models(dir: &Path, files: &[(&str, &str)]) {
    for (relative, content) in files {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}

pub fn seeded_graph(models: Vec<ModelEntity>) -> Arc<InMemoryTwinGraph> {
    let graph = InMemoryTwinGraph::new();
    graph.insert_models(models);
    Arc::new(graph)
}

pub const ROOM: &str = "dtmi:test:Room;1";

/// Twins t1, t2, t3 of `ROOM`; t1 --contains--> t2 and t3 --owns--> t1
pub fn relationship_scenario() -> Arc<InMemoryTwinGraph> {
    let graph = seeded_graph(vec![interface(ROOM)]);
    for twin in ["t1", "t2", "t3"] {
        graph.insert_twin(BasicTwin::new(twin, model_id(ROOM)));
    }
    graph.insert_relationship(BasicRelationship::new("r-contains", "t1", "contains", "t2"));
    graph.insert_relationship(BasicRelationship::new("r-owns", "t3", "owns", "t1"));
    graph
}

/// Twin `hub` with `outgoing` relationships to and `incoming` from spoke twins
pub fn hub_scenario(outgoing: usize, incoming: usize) -> Arc<InMemoryTwinGraph> {
    let graph = seeded_graph(vec![interface(ROOM)]);
    graph.insert_twin(BasicTwin::new("hub", model_id(ROOM)));
    for i in 0..outgoing {
        let spoke = format!("out-{i}");
        graph.insert_twin(BasicTwin::new(spoke.clone(), model_id(ROOM)));
        graph.insert_relationship(BasicRelationship::new(format!("r-out-{i}"), "hub", "feeds", spoke));
    }
    for i in 0..incoming {
        let spoke = format!("in-{i}");
        graph.insert_twin(BasicTwin::new(spoke.clone(), model_id(ROOM)));
        graph.insert_relationship(BasicRelationship::new(format!("r-in-{i}"), spoke, "feeds", "hub"));
    }
    graph
}
