//! Twin-graph service seam
//!
//! Listing operations return streams so paging stays inside the
//! implementation. Every call is a single-object call; the service has no
//! multi-object transaction.

use crate::error::ServiceResult;
use crate::types::{
    BasicRelationship, BasicTwin, IncomingRelationship, ModelData, PatchOperation, TwinFilter,
};
use async_trait::async_trait;
use dtwin_model::ModelId;
use futures::stream::BoxStream;
use serde_json::Value;

/// Stream of items from a paged listing
pub type ServiceStream<T> = BoxStream<'static, ServiceResult<T>>;

/// Remote twin-graph service
#[async_trait]
pub trait TwinGraphService: Send + Sync {
    /// List every model, optionally with its definition document
    fn list_models(&self, include_definitions: bool) -> ServiceStream<ModelData>;

    /// Get one model with its definition
    async fn get_model(&self, id: &ModelId) -> ServiceResult<ModelData>;

    /// Upload definition documents in one call
    async fn create_models(&self, definitions: Vec<Value>) -> ServiceResult<Vec<ModelData>>;

    /// Mark a model as decommissioned
    async fn decommission_model(&self, id: &ModelId) -> ServiceResult<()>;

    /// Delete a model (fails while other models extend or embed it)
    async fn delete_model(&self, id: &ModelId) -> ServiceResult<()>;

    /// Get one twin
    async fn get_twin(&self, twin_id: &str) -> ServiceResult<BasicTwin>;

    /// Create or replace a twin
    async fn upsert_twin(&self, twin: &BasicTwin) -> ServiceResult<BasicTwin>;

    /// Patch twin properties, optionally only if the etag still matches
    async fn update_twin(
        &self,
        twin_id: &str,
        patch: &[PatchOperation],
        if_match: Option<&str>,
    ) -> ServiceResult<()>;

    /// Delete a twin (fails while it has relationships in either direction)
    async fn delete_twin(&self, twin_id: &str) -> ServiceResult<()>;

    /// Ids of the twins selected by `filter`
    fn query_twin_ids(&self, filter: &TwinFilter) -> ServiceStream<String>;

    /// Relationships whose source is `twin_id`
    fn get_relationships(&self, twin_id: &str) -> ServiceStream<BasicRelationship>;

    /// Relationships whose target is `twin_id`
    fn get_incoming_relationships(&self, twin_id: &str) -> ServiceStream<IncomingRelationship>;

    /// Get one relationship of a source twin
    async fn get_relationship(
        &self,
        twin_id: &str,
        relationship_id: &str,
    ) -> ServiceResult<BasicRelationship>;

    /// Create or replace a relationship
    async fn upsert_relationship(
        &self,
        relationship: &BasicRelationship,
    ) -> ServiceResult<BasicRelationship>;

    /// Delete relationship `relationship_id` of source twin `twin_id`
    async fn delete_relationship(&self, twin_id: &str, relationship_id: &str) -> ServiceResult<()>;
}
