//! In-memory twin graph
//!
//! Behaves like the remote service for the rules that matter to deletion:
//! - a model cannot be deleted while another model extends or embeds it
//! - a twin cannot be deleted while it has outgoing or incoming relationships
//! - absent targets fail with 404 and the service's error codes
//!
//! Faults can be injected per call target, and every mutating call is
//! recorded (including failed attempts) so tests can assert call order.

use crate::error::{ServiceError, ServiceResult};
use crate::service::{ServiceStream, TwinGraphService};
use crate::types::{
    BasicRelationship, BasicTwin, IncomingRelationship, ModelData, PatchOp, PatchOperation,
    TwinFilter,
};
use async_trait::async_trait;
use dtwin_model::{
    parse_definitions, DtdlParser, ModelEntity, ModelId, ModelParser, ModelResolver,
};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

/// Mutating call recorded by [`InMemoryTwinGraph`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    /// `create_models` with the uploaded ids
    CreateModels(Vec<ModelId>),
    /// `decommission_model`
    DecommissionModel(ModelId),
    /// `delete_model`
    DeleteModel(ModelId),
    /// `upsert_twin`
    UpsertTwin(String),
    /// `update_twin`
    UpdateTwin(String),
    /// `delete_twin`
    DeleteTwin(String),
    /// `upsert_relationship`
    UpsertRelationship {
        twin_id: String,
        relationship_id: String,
    },
    /// `delete_relationship`
    DeleteRelationship {
        twin_id: String,
        relationship_id: String,
    },
}

/// Call target that should fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailPoint {
    /// Deleting this model
    DeleteModel(ModelId),
    /// Deleting this twin
    DeleteTwin(String),
    /// Deleting this relationship
    DeleteRelationship {
        twin_id: String,
        relationship_id: String,
    },
    /// Listing outgoing relationships of this twin
    ListRelationships(String),
    /// Listing incoming relationships of this twin
    ListIncomingRelationships(String),
    /// Any twin query
    QueryTwins,
    /// Listing models
    ListModels,
}

#[derive(Debug, Clone)]
struct StoredModel {
    data: ModelData,
    entity: ModelEntity,
}

#[derive(Debug, Default)]
struct State {
    models: BTreeMap<ModelId, StoredModel>,
    twins: BTreeMap<String, BasicTwin>,
    relationships: BTreeMap<(String, String), BasicRelationship>,
    faults: Vec<(FailPoint, ServiceError)>,
    calls: Vec<ServiceCall>,
}

impl State {
    fn fault(&self, point: &FailPoint) -> ServiceResult<()> {
        match self.faults.iter().find(|(p, _)| p == point) {
            Some((_, err)) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn has_relationships(&self, twin_id: &str) -> bool {
        self.relationships
            .values()
            .any(|r| r.source_id == twin_id || r.target_id == twin_id)
    }

    /// `model` itself plus every model it inherits from
    fn lineage(&self, model: &ModelId) -> BTreeSet<ModelId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([model.clone()]);
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(stored) = self.models.get(&next) {
                queue.extend(stored.entity.extends.iter().cloned());
            }
        }
        seen
    }
}

/// Twin graph held in process memory
#[derive(Debug, Default)]
pub struct InMemoryTwinGraph {
    state: Mutex<State>,
}

impl InMemoryTwinGraph {
    /// Create empty graph
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store models without validation (cycles and dangling references allowed)
    pub fn insert_models(&self, entities: impl IntoIterator<Item = ModelEntity>) {
        let mut state = self.state.lock();
        for entity in entities {
            let mut data = ModelData::new(entity.id.clone()).with_definition(entity.to_definition());
            data.display_name = entity.display_name.clone();
            data.upload_time = Some(chrono::Utc::now());
            state
                .models
                .insert(entity.id.clone(), StoredModel { data, entity });
        }
    }

    /// Store a twin without validation
    pub fn insert_twin(&self, twin: BasicTwin) {
        self.state.lock().twins.insert(twin.id.clone(), twin);
    }

    /// Store a relationship without validation
    pub fn insert_relationship(&self, relationship: BasicRelationship) {
        self.state.lock().relationships.insert(
            (relationship.source_id.clone(), relationship.id.clone()),
            relationship,
        );
    }

    /// Make every call hitting `point` fail with `error`
    pub fn fail_on(&self, point: FailPoint, error: ServiceError) {
        self.state.lock().faults.push((point, error));
    }

    /// Remove all injected faults
    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Mutating calls so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.state.lock().calls.clone()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Stored model ids
    #[must_use]
    pub fn model_ids(&self) -> Vec<ModelId> {
        self.state.lock().models.keys().cloned().collect()
    }

    /// Stored twin ids
    #[must_use]
    pub fn twin_ids(&self) -> Vec<String> {
        self.state.lock().twins.keys().cloned().collect()
    }

    /// Number of stored relationships
    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.state.lock().relationships.len()
    }

    fn definitions_snapshot(&self) -> BTreeMap<ModelId, Value> {
        self.state
            .lock()
            .models
            .values()
            .filter_map(|m| m.data.definition.clone().map(|d| (m.data.id.clone(), d)))
            .collect()
    }
}

/// Resolves references against models already stored
struct StoredDefinitions(BTreeMap<ModelId, Value>);

#[async_trait]
impl ModelResolver for StoredDefinitions {
    async fn resolve(&self, ids: &[ModelId]) -> Result<Vec<String>, String> {
        Ok(ids
            .iter()
            .filter_map(|id| self.0.get(id))
            .map(Value::to_string)
            .collect())
    }
}

fn iter_stream<T: Send + 'static>(items: Vec<T>) -> ServiceStream<T> {
    stream::iter(items.into_iter().map(Ok)).boxed()
}

fn error_stream<T: Send + 'static>(err: ServiceError) -> ServiceStream<T> {
    stream::iter(vec![Err(err)]).boxed()
}

fn new_etag() -> String {
    format!("W/\"{}\"", uuid::Uuid::new_v4())
}

fn model_not_found(id: &ModelId) -> ServiceError {
    ServiceError::not_found("ModelNotFound", format!("model {id} does not exist"))
}

fn twin_not_found(id: &str) -> ServiceError {
    ServiceError::not_found("DigitalTwinNotFound", format!("twin {id} does not exist"))
}

fn relationship_not_found(twin_id: &str, relationship_id: &str) -> ServiceError {
    ServiceError::not_found(
        "RelationshipNotFound",
        format!("relationship {relationship_id} of twin {twin_id} does not exist"),
    )
}

#[async_trait]
impl TwinGraphService for InMemoryTwinGraph {
    fn list_models(&self, include_definitions: bool) -> ServiceStream<ModelData> {
        let state = self.state.lock();
        if let Err(err) = state.fault(&FailPoint::ListModels) {
            return error_stream(err);
        }
        let models = state
            .models
            .values()
            .map(|m| {
                let mut data = m.data.clone();
                if !include_definitions {
                    data.definition = None;
                }
                data
            })
            .collect();
        iter_stream(models)
    }

    async fn get_model(&self, id: &ModelId) -> ServiceResult<ModelData> {
        self.state
            .lock()
            .models
            .get(id)
            .map(|m| m.data.clone())
            .ok_or_else(|| model_not_found(id))
    }

    async fn create_models(&self, definitions: Vec<Value>) -> ServiceResult<Vec<ModelData>> {
        let top_level: Vec<ModelId> = definitions
            .iter()
            .filter_map(|d| d.get("@id").and_then(Value::as_str))
            .filter_map(|s| s.parse().ok())
            .collect();
        self.state
            .lock()
            .calls
            .push(ServiceCall::CreateModels(top_level.clone()));

        let stored = self.definitions_snapshot();
        if let Some(existing) = top_level.iter().find(|id| stored.contains_key(*id)) {
            return Err(ServiceError::conflict(
                "ModelAlreadyExists",
                format!("model {existing} already exists"),
            ));
        }

        let texts: Vec<String> = definitions.iter().map(Value::to_string).collect();
        let parser = DtdlParser::new().with_resolver(Arc::new(StoredDefinitions(stored)));
        let parsed = parse_definitions(&parser as &dyn ModelParser, &texts)
            .await
            .map_err(|issues| {
                let messages: Vec<String> = issues.iter().map(ToString::to_string).collect();
                ServiceError::bad_request("DTDLParserError", messages.join("; "))
            })?;

        let by_id: BTreeMap<&str, &Value> = definitions
            .iter()
            .filter_map(|d| d.get("@id").and_then(Value::as_str).map(|id| (id, d)))
            .collect();

        let mut state = self.state.lock();
        if let Some(existing) = top_level.iter().find(|id| state.models.contains_key(*id)) {
            return Err(ServiceError::conflict(
                "ModelAlreadyExists",
                format!("model {existing} already exists"),
            ));
        }

        let now = chrono::Utc::now();
        let mut created = Vec::new();
        for entity in parsed.into_interfaces() {
            let Some(definition) = by_id.get(entity.id.as_str()) else {
                continue;
            };
            let mut data = ModelData::new(entity.id.clone());
            data.display_name = entity.display_name.clone();
            data.upload_time = Some(now);
            created.push(data.clone());
            state.models.insert(
                entity.id.clone(),
                StoredModel {
                    data: data.with_definition((*definition).clone()),
                    entity,
                },
            );
        }
        Ok(created)
    }

    async fn decommission_model(&self, id: &ModelId) -> ServiceResult<()> {
        let mut state = self.state.lock();
        state.calls.push(ServiceCall::DecommissionModel(id.clone()));
        let stored = state.models.get_mut(id).ok_or_else(|| model_not_found(id))?;
        stored.data.decommissioned = true;
        Ok(())
    }

    async fn delete_model(&self, id: &ModelId) -> ServiceResult<()> {
        let mut state = self.state.lock();
        state.calls.push(ServiceCall::DeleteModel(id.clone()));
        state.fault(&FailPoint::DeleteModel(id.clone()))?;
        if !state.models.contains_key(id) {
            return Err(model_not_found(id));
        }

        let referrers: Vec<String> = state
            .models
            .values()
            .filter(|m| &m.entity.id != id && m.entity.depends_on(id))
            .map(|m| m.entity.id.to_string())
            .collect();
        if !referrers.is_empty() {
            return Err(ServiceError::conflict(
                "ModelReferencesNotDeleted",
                format!("model {id} is still referenced by {}", referrers.join(", ")),
            ));
        }

        state.models.remove(id);
        Ok(())
    }

    async fn get_twin(&self, twin_id: &str) -> ServiceResult<BasicTwin> {
        self.state
            .lock()
            .twins
            .get(twin_id)
            .cloned()
            .ok_or_else(|| twin_not_found(twin_id))
    }

    async fn upsert_twin(&self, twin: &BasicTwin) -> ServiceResult<BasicTwin> {
        let mut state = self.state.lock();
        state.calls.push(ServiceCall::UpsertTwin(twin.id.clone()));

        let model = state.models.get(twin.model()).ok_or_else(|| {
            ServiceError::bad_request("ModelNotFound", format!("model {} does not exist", twin.model()))
        })?;
        if model.data.decommissioned && !state.twins.contains_key(&twin.id) {
            return Err(ServiceError::bad_request(
                "ModelDecommissioned",
                format!("model {} is decommissioned", twin.model()),
            ));
        }

        let mut stored = twin.clone();
        stored.etag = Some(new_etag());
        state.twins.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_twin(
        &self,
        twin_id: &str,
        patch: &[PatchOperation],
        if_match: Option<&str>,
    ) -> ServiceResult<()> {
        let mut state = self.state.lock();
        state.calls.push(ServiceCall::UpdateTwin(twin_id.to_string()));
        let twin = state
            .twins
            .get_mut(twin_id)
            .ok_or_else(|| twin_not_found(twin_id))?;

        if let Some(expected) = if_match {
            if expected != "*" && twin.etag.as_deref() != Some(expected) {
                return Err(ServiceError::new(
                    412,
                    "PreconditionFailed",
                    format!("etag of twin {twin_id} does not match {expected}"),
                ));
            }
        }

        let mut contents = Value::Object(twin.contents.clone());
        apply_patch(&mut contents, patch)?;
        if let Value::Object(map) = contents {
            twin.contents = map;
        }
        twin.etag = Some(new_etag());
        Ok(())
    }

    async fn delete_twin(&self, twin_id: &str) -> ServiceResult<()> {
        let mut state = self.state.lock();
        state.calls.push(ServiceCall::DeleteTwin(twin_id.to_string()));
        state.fault(&FailPoint::DeleteTwin(twin_id.to_string()))?;
        if !state.twins.contains_key(twin_id) {
            return Err(twin_not_found(twin_id));
        }
        if state.has_relationships(twin_id) {
            return Err(ServiceError::bad_request(
                "RelationshipsNotDeleted",
                format!("twin {twin_id} still has relationships"),
            ));
        }
        state.twins.remove(twin_id);
        Ok(())
    }

    fn query_twin_ids(&self, filter: &TwinFilter) -> ServiceStream<String> {
        let state = self.state.lock();
        if let Err(err) = state.fault(&FailPoint::QueryTwins) {
            return error_stream(err);
        }
        let ids = state
            .twins
            .values()
            .filter(|twin| match filter {
                TwinFilter::All => true,
                TwinFilter::OfModel(model) => state.lineage(twin.model()).contains(model),
            })
            .map(|twin| twin.id.clone())
            .collect();
        iter_stream(ids)
    }

    fn get_relationships(&self, twin_id: &str) -> ServiceStream<BasicRelationship> {
        let state = self.state.lock();
        if let Err(err) = state.fault(&FailPoint::ListRelationships(twin_id.to_string())) {
            return error_stream(err);
        }
        if !state.twins.contains_key(twin_id) {
            return error_stream(twin_not_found(twin_id));
        }
        let relationships = state
            .relationships
            .values()
            .filter(|r| r.source_id == twin_id)
            .cloned()
            .collect();
        iter_stream(relationships)
    }

    fn get_incoming_relationships(&self, twin_id: &str) -> ServiceStream<IncomingRelationship> {
        let state = self.state.lock();
        if let Err(err) = state.fault(&FailPoint::ListIncomingRelationships(twin_id.to_string())) {
            return error_stream(err);
        }
        if !state.twins.contains_key(twin_id) {
            return error_stream(twin_not_found(twin_id));
        }
        let incoming = state
            .relationships
            .values()
            .filter(|r| r.target_id == twin_id)
            .map(IncomingRelationship::from)
            .collect();
        iter_stream(incoming)
    }

    async fn get_relationship(
        &self,
        twin_id: &str,
        relationship_id: &str,
    ) -> ServiceResult<BasicRelationship> {
        self.state
            .lock()
            .relationships
            .get(&(twin_id.to_string(), relationship_id.to_string()))
            .cloned()
            .ok_or_else(|| relationship_not_found(twin_id, relationship_id))
    }

    async fn upsert_relationship(
        &self,
        relationship: &BasicRelationship,
    ) -> ServiceResult<BasicRelationship> {
        let mut state = self.state.lock();
        state.calls.push(ServiceCall::UpsertRelationship {
            twin_id: relationship.source_id.clone(),
            relationship_id: relationship.id.clone(),
        });
        if !state.twins.contains_key(&relationship.source_id) {
            return Err(twin_not_found(&relationship.source_id));
        }
        if !state.twins.contains_key(&relationship.target_id) {
            return Err(ServiceError::bad_request(
                "InvalidArgument",
                format!("target twin {} does not exist", relationship.target_id),
            ));
        }

        let mut stored = relationship.clone();
        stored.etag = Some(new_etag());
        state.relationships.insert(
            (stored.source_id.clone(), stored.id.clone()),
            stored.clone(),
        );
        Ok(stored)
    }

    async fn delete_relationship(&self, twin_id: &str, relationship_id: &str) -> ServiceResult<()> {
        let mut state = self.state.lock();
        state.calls.push(ServiceCall::DeleteRelationship {
            twin_id: twin_id.to_string(),
            relationship_id: relationship_id.to_string(),
        });
        state.fault(&FailPoint::DeleteRelationship {
            twin_id: twin_id.to_string(),
            relationship_id: relationship_id.to_string(),
        })?;
        state
            .relationships
            .remove(&(twin_id.to_string(), relationship_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| relationship_not_found(twin_id, relationship_id))
    }
}

fn apply_patch(target: &mut Value, patch: &[PatchOperation]) -> ServiceResult<()> {
    for operation in patch {
        let invalid = |reason: &str| {
            ServiceError::bad_request(
                "JsonPatchInvalid",
                format!("{reason}: {} {}", op_name(operation.op), operation.path),
            )
        };

        let (parent_path, key) = operation
            .path
            .rsplit_once('/')
            .ok_or_else(|| invalid("path must start with '/'"))?;
        let key = key.replace("~1", "/").replace("~0", "~");
        let parent: &mut Map<String, Value> = target
            .pointer_mut(parent_path)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| invalid("parent does not exist"))?;

        match operation.op {
            PatchOp::Add => {
                let value = operation.value.clone().ok_or_else(|| invalid("missing value"))?;
                parent.insert(key, value);
            }
            PatchOp::Replace => {
                let value = operation.value.clone().ok_or_else(|| invalid("missing value"))?;
                let slot = parent.get_mut(&key).ok_or_else(|| invalid("no value to replace"))?;
                *slot = value;
            }
            PatchOp::Remove => {
                parent.remove(&key).ok_or_else(|| invalid("no value to remove"))?;
            }
        }
    }
    Ok(())
}

fn op_name(op: PatchOp) -> &'static str {
    match op {
        PatchOp::Add => "add",
        PatchOp::Replace => "replace",
        PatchOp::Remove => "remove",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtwin_model::ContentEntity;
    use futures::TryStreamExt;
    use serde_json::json;

    fn id(s: &str) -> ModelId {
        s.parse().unwrap()
    }

    fn graph_with_room() -> InMemoryTwinGraph {
        let graph = InMemoryTwinGraph::new();
        graph.insert_models([ModelEntity::interface(id("dtmi:t:Room;1"))]);
        graph
    }

    #[tokio::test]
    async fn delete_model_blocked_by_extends_and_components() {
        let graph = InMemoryTwinGraph::new();
        graph.insert_models([
            ModelEntity::interface(id("dtmi:t:A;1")),
            ModelEntity::interface(id("dtmi:t:B;1")).with_extends(id("dtmi:t:A;1")),
            ModelEntity::interface(id("dtmi:t:C;1")).with_content(ContentEntity::Component {
                name: "a".into(),
                schema: id("dtmi:t:A;1"),
            }),
        ]);

        let err = graph.delete_model(&id("dtmi:t:A;1")).await.unwrap_err();
        assert_eq!(err.error_code, "ModelReferencesNotDeleted");
        assert!(err.message.contains("dtmi:t:B;1"));
        assert!(err.message.contains("dtmi:t:C;1"));

        graph.delete_model(&id("dtmi:t:B;1")).await.unwrap();
        graph.delete_model(&id("dtmi:t:C;1")).await.unwrap();
        graph.delete_model(&id("dtmi:t:A;1")).await.unwrap();
        assert!(graph.model_ids().is_empty());

        let err = graph.delete_model(&id("dtmi:t:A;1")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn relationship_targets_do_not_block_model_deletion() {
        let graph = InMemoryTwinGraph::new();
        graph.insert_models([
            ModelEntity::interface(id("dtmi:t:Sensor;1")),
            ModelEntity::interface(id("dtmi:t:Room;1")).with_content(ContentEntity::Relationship {
                name: "contains".into(),
                target: Some(id("dtmi:t:Sensor;1")),
            }),
        ]);
        graph.delete_model(&id("dtmi:t:Sensor;1")).await.unwrap();
    }

    #[tokio::test]
    async fn create_models_resolves_against_stored_models() {
        let graph = graph_with_room();
        let created = graph
            .create_models(vec![json!({
                "@id": "dtmi:t:Office;1",
                "@type": "Interface",
                "extends": "dtmi:t:Room;1"
            })])
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(graph.model_ids().len(), 2);

        let err = graph
            .create_models(vec![json!({ "@id": "dtmi:t:Room;1", "@type": "Interface" })])
            .await
            .unwrap_err();
        assert_eq!(err.error_code, "ModelAlreadyExists");

        let err = graph
            .create_models(vec![json!({
                "@id": "dtmi:t:Lab;1",
                "@type": "Interface",
                "extends": "dtmi:t:Missing;1"
            })])
            .await
            .unwrap_err();
        assert_eq!(err.error_code, "DTDLParserError");
    }

    #[tokio::test]
    async fn twin_with_relationships_cannot_be_deleted() {
        let graph = graph_with_room();
        graph.insert_twin(BasicTwin::new("t1", id("dtmi:t:Room;1")));
        graph.insert_twin(BasicTwin::new("t2", id("dtmi:t:Room;1")));
        graph.insert_relationship(BasicRelationship::new("r1", "t2", "contains", "t1"));

        let err = graph.delete_twin("t1").await.unwrap_err();
        assert_eq!(err.error_code, "RelationshipsNotDeleted");

        let incoming: Vec<_> = graph
            .get_incoming_relationships("t1")
            .try_collect()
            .await
            .unwrap();
        assert_eq!(incoming[0].source_id, "t2");

        graph.delete_relationship("t2", "r1").await.unwrap();
        graph.delete_twin("t1").await.unwrap();
        assert_eq!(graph.twin_ids(), vec!["t2".to_string()]);
    }

    #[tokio::test]
    async fn query_by_model_includes_descendants() {
        let graph = InMemoryTwinGraph::new();
        graph.insert_models([
            ModelEntity::interface(id("dtmi:t:Space;1")),
            ModelEntity::interface(id("dtmi:t:Room;1")).with_extends(id("dtmi:t:Space;1")),
            ModelEntity::interface(id("dtmi:t:Sensor;1")),
        ]);
        graph.insert_twin(BasicTwin::new("room", id("dtmi:t:Room;1")));
        graph.insert_twin(BasicTwin::new("space", id("dtmi:t:Space;1")));
        graph.insert_twin(BasicTwin::new("sensor", id("dtmi:t:Sensor;1")));

        let ids: Vec<String> = graph
            .query_twin_ids(&TwinFilter::OfModel(id("dtmi:t:Space;1")))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids, vec!["room".to_string(), "space".to_string()]);

        let all: Vec<String> = graph
            .query_twin_ids(&TwinFilter::All)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn conditional_update_checks_etag() {
        let graph = graph_with_room();
        let twin = graph
            .upsert_twin(&BasicTwin::new("t1", id("dtmi:t:Room;1")).with_property("temp", json!(20)))
            .await
            .unwrap();
        let etag = twin.etag.clone().unwrap();

        graph
            .update_twin("t1", &[PatchOperation::replace("/temp", json!(22))], Some(&etag))
            .await
            .unwrap();
        assert_eq!(graph.get_twin("t1").await.unwrap().contents["temp"], 22);

        let err = graph
            .update_twin("t1", &[PatchOperation::replace("/temp", json!(23))], Some(&etag))
            .await
            .unwrap_err();
        assert_eq!(err.status, 412);

        let err = graph
            .update_twin("t1", &[PatchOperation::replace("/missing", json!(1))], None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code, "JsonPatchInvalid");
    }

    #[tokio::test]
    async fn decommissioned_model_rejects_new_twins() {
        let graph = graph_with_room();
        graph.decommission_model(&id("dtmi:t:Room;1")).await.unwrap();
        assert!(graph.get_model(&id("dtmi:t:Room;1")).await.unwrap().decommissioned);

        let err = graph
            .upsert_twin(&BasicTwin::new("t1", id("dtmi:t:Room;1")))
            .await
            .unwrap_err();
        assert_eq!(err.error_code, "ModelDecommissioned");
    }

    #[tokio::test]
    async fn faults_and_call_log() {
        let graph = graph_with_room();
        graph.fail_on(
            FailPoint::DeleteModel(id("dtmi:t:Room;1")),
            ServiceError::new(503, "ServiceUnavailable", "try later"),
        );

        let err = graph.delete_model(&id("dtmi:t:Room;1")).await.unwrap_err();
        assert_eq!(err.status, 503);
        assert_eq!(graph.model_ids().len(), 1);
        assert_eq!(graph.calls(), vec![ServiceCall::DeleteModel(id("dtmi:t:Room;1"))]);

        graph.clear_faults();
        graph.delete_model(&id("dtmi:t:Room;1")).await.unwrap();
    }

    #[tokio::test]
    async fn list_models_strips_definitions_on_request() {
        let graph = graph_with_room();
        let bare: Vec<ModelData> = graph.list_models(false).try_collect().await.unwrap();
        assert!(bare[0].definition.is_none());
        let full: Vec<ModelData> = graph.list_models(true).try_collect().await.unwrap();
        assert_eq!(full[0].definition.as_ref().unwrap()["@id"], "dtmi:t:Room;1");
    }

    #[test]
    fn patch_add_and_remove_nested() {
        let mut value = json!({ "hvac": { "mode": "cool" } });
        apply_patch(
            &mut value,
            &[
                PatchOperation::add("/hvac/target", json!(21)),
                PatchOperation::remove("/hvac/mode"),
            ],
        )
        .unwrap();
        assert_eq!(value, json!({ "hvac": { "target": 21 } }));
    }
}
