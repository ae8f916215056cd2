//! Deletion orchestrator
//!
//! Entry point for the bulk operations. Each bulk run gets a `run_id` span so
//! every per-item log line of the run can be correlated.

use crate::cancel::until_cancelled;
use crate::cascade::RelationshipCascade;
use crate::config::DtwinConfig;
use crate::error::{DeletionError, DeletionResult};
use crate::report::{CascadeReport, FailedItem, ModelDeletionReport, TwinDeletionReport};
use crate::resolver::ModelDeletionResolver;
use dtwin_model::{LoadMode, ModelEntity, ModelId, ModelParser, ModelRepository};
use dtwin_service::{ModelData, TwinFilter, TwinGraphService};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Runs model and twin deletions against a twin-graph service
#[derive(Clone)]
pub struct DeletionOrchestrator {
    service: Arc<dyn TwinGraphService>,
    parser: Arc<dyn ModelParser>,
    load_mode: LoadMode,
    max_concurrency: usize,
    max_passes: Option<usize>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for DeletionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionOrchestrator")
            .field("load_mode", &self.load_mode)
            .field("max_concurrency", &self.max_concurrency)
            .field("max_passes", &self.max_passes)
            .finish()
    }
}

impl DeletionOrchestrator {
    /// Create orchestrator with default tuning
    #[must_use]
    pub fn new(service: Arc<dyn TwinGraphService>, parser: Arc<dyn ModelParser>) -> Self {
        Self {
            service,
            parser,
            load_mode: LoadMode::default(),
            max_concurrency: 8,
            max_passes: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Create orchestrator tuned by `config`
    #[must_use]
    pub fn from_config(service: Arc<dyn TwinGraphService>, config: &DtwinConfig) -> Self {
        Self::new(service, Arc::new(config.parser()))
            .with_load_mode(config.load_mode())
            .with_max_concurrency(config.deletion.max_concurrency)
            .with_max_passes(config.deletion.max_passes)
    }

    /// With repository load mode
    #[inline]
    #[must_use]
    pub fn with_load_mode(mut self, mode: LoadMode) -> Self {
        self.load_mode = mode;
        self
    }

    /// With concurrent deletes (at least 1)
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// With hard bound on model-deletion passes
    #[inline]
    #[must_use]
    pub fn with_max_passes(mut self, max: Option<usize>) -> Self {
        self.max_passes = max;
        self
    }

    /// With cancellation token
    #[inline]
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token cancelling every run of this orchestrator
    #[inline]
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Empty repository using this orchestrator's parser and load mode
    #[must_use]
    pub fn repository(&self) -> ModelRepository {
        ModelRepository::new(Arc::clone(&self.parser)).with_load_mode(self.load_mode)
    }

    fn resolver(&self) -> ModelDeletionResolver {
        ModelDeletionResolver::new(Arc::clone(&self.service))
            .with_max_concurrency(self.max_concurrency)
            .with_max_passes(self.max_passes)
            .with_cancellation(self.cancel.clone())
    }

    fn cascade(&self) -> RelationshipCascade {
        RelationshipCascade::new(Arc::clone(&self.service))
            .with_max_concurrency(self.max_concurrency)
            .with_cancellation(self.cancel.clone())
    }

    /// Delete every model on the service in dependency order
    ///
    /// The service's model list with definitions is parsed first; per-model
    /// delete failures land in the report.
    ///
    /// # Errors
    /// - `DeletionError::ServiceCallFailed` if the models cannot be listed
    /// - `DeletionError::ValidationFailed` if the definitions do not parse
    /// - `DeletionError::Cancelled` if cancelled
    pub async fn delete_all_models(&self) -> DeletionResult<ModelDeletionReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("delete_all_models", %run_id);
        async move {
            let universe = self.model_universe().await?;
            self.resolver().run_with_id(run_id, &universe).await
        }
        .instrument(span)
        .await
    }

    /// Delete the given models in dependency order
    ///
    /// Ordering among `ids` follows the definitions on the service; a model
    /// outside `ids` that still references one of them makes that delete fail.
    ///
    /// # Errors
    /// - `DeletionError::NotFound` if an id is not on the service
    /// - same as [`Self::delete_all_models`]
    pub async fn delete_models(&self, ids: &[ModelId]) -> DeletionResult<ModelDeletionReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("delete_models", %run_id, requested = ids.len());
        async move {
            let wanted: BTreeSet<&ModelId> = ids.iter().collect();
            let universe = self.model_universe().await?;
            let selected: Vec<ModelEntity> = universe
                .into_iter()
                .filter(|entity| wanted.contains(&entity.id))
                .collect();
            if let Some(missing) = wanted
                .iter()
                .find(|id| !selected.iter().any(|entity| &&entity.id == *id))
            {
                return Err(DeletionError::NotFound(format!("model {missing}")));
            }
            self.resolver().run_with_id(run_id, &selected).await
        }
        .instrument(span)
        .await
    }

    /// Delete one model
    ///
    /// # Errors
    /// - `DeletionError::ServiceCallFailed` if the service rejects it
    pub async fn delete_model(&self, id: &ModelId) -> DeletionResult<()> {
        until_cancelled(&self.cancel, self.service.delete_model(id))
            .await?
            .map_err(|e| DeletionError::service(format!("delete_model {id}"), e))?;
        tracing::info!(model_id = %id, "deleted model");
        Ok(())
    }

    /// Remove all relationships of `twin_id`, then the twin itself
    ///
    /// The twin delete is attempted after both relationship listings are
    /// exhausted, even when some relationship deletes failed.
    ///
    /// # Errors
    /// - `DeletionError::ServiceCallFailed` if the twin delete fails
    /// - `DeletionError::Cancelled` if cancelled
    pub async fn delete_twin(&self, twin_id: &str) -> DeletionResult<CascadeReport> {
        let cascade = self.cascade().run(twin_id).await?;
        until_cancelled(&self.cancel, self.service.delete_twin(twin_id))
            .await?
            .map_err(|e| DeletionError::service(format!("delete_twin {twin_id}"), e))?;
        tracing::info!(twin_id, relationships = cascade.deleted(), "deleted twin");
        Ok(cascade)
    }

    /// Delete every twin selected by `filter`
    ///
    /// Relationships of all selected twins are removed first, then the twins.
    ///
    /// # Errors
    /// - `DeletionError::ServiceCallFailed` if the twin query fails
    /// - `DeletionError::Cancelled` if cancelled
    pub async fn delete_all_twins(&self, filter: &TwinFilter) -> DeletionResult<TwinDeletionReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("delete_all_twins", %run_id, filter = %filter);
        async move {
            let twin_ids: Vec<String> = until_cancelled(
                &self.cancel,
                self.service.query_twin_ids(filter).try_collect::<Vec<_>>(),
            )
            .await?
            .map_err(|e| DeletionError::service("query_twins", e))?;
            tracing::info!(twins = twin_ids.len(), "deleting twins");

            let mut report = TwinDeletionReport::new(run_id);
            let cascade = self.cascade();
            for twin_id in &twin_ids {
                report.cascades.push(cascade.run(twin_id).await?);
            }

            let service = &self.service;
            let outcomes = until_cancelled(
                &self.cancel,
                stream::iter(twin_ids)
                    .map(|twin_id| async move {
                        let result = service.delete_twin(&twin_id).await;
                        (twin_id, result)
                    })
                    .buffer_unordered(self.max_concurrency)
                    .collect::<Vec<_>>(),
            )
            .await?;

            for (twin_id, result) in outcomes {
                match result {
                    Ok(()) => {
                        tracing::info!(twin_id = %twin_id, "deleted twin");
                        report.deleted.push(twin_id);
                    }
                    Err(err) => {
                        tracing::error!(
                            twin_id = %twin_id,
                            status = err.status,
                            error_code = %err.error_code,
                            "failed to delete twin: {}",
                            err.message
                        );
                        report.failed.push(FailedItem::new(twin_id, "delete_twin", err));
                    }
                }
            }
            report.deleted.sort();
            report.failed.sort_by(|a, b| a.id.cmp(&b.id));

            tracing::info!(
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                relationships = report.relationships_deleted(),
                "twin deletion finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Validate the definitions under `dir` and upload them in one call
    ///
    /// # Errors
    /// - `DeletionError::Repository` if `dir` cannot be read
    /// - `DeletionError::ValidationFailed` if the definitions do not parse
    /// - `DeletionError::ServiceCallFailed` if the upload is rejected
    pub async fn upload_models(&self, dir: impl AsRef<Path>) -> DeletionResult<Vec<ModelData>> {
        let mut repository = self.repository();
        repository.validate_models(dir).await?;
        let documents = repository.definition_documents()?;
        if documents.is_empty() {
            tracing::warn!("no model definitions to upload");
            return Ok(Vec::new());
        }

        let created = until_cancelled(&self.cancel, self.service.create_models(documents))
            .await?
            .map_err(|e| DeletionError::service("create_models", e))?;
        tracing::info!(models = created.len(), "uploaded models");
        Ok(created)
    }

    /// Every model on the service, parsed from its definition
    async fn model_universe(&self) -> DeletionResult<Vec<ModelEntity>> {
        let listed: Vec<ModelData> = until_cancelled(
            &self.cancel,
            self.service.list_models(true).try_collect::<Vec<_>>(),
        )
        .await?
        .map_err(|e| DeletionError::service("list_models", e))?;

        let mut texts = Vec::with_capacity(listed.len());
        for model in listed {
            let definition = match model.definition {
                Some(definition) => definition,
                None => {
                    tracing::debug!(model_id = %model.id, "listing omitted definition; fetching");
                    until_cancelled(&self.cancel, self.service.get_model(&model.id))
                        .await?
                        .map_err(|e| DeletionError::service(format!("get_model {}", model.id), e))?
                        .definition
                        .ok_or_else(|| {
                            DeletionError::NotFound(format!("definition of model {}", model.id))
                        })?
                }
            };
            texts.push(definition.to_string());
        }
        tracing::info!(models = texts.len(), "listed models");

        let mut repository = ModelRepository::new(Arc::clone(&self.parser));
        repository.load_texts(texts);
        repository.validate_loaded().await?;
        Ok(repository.models().values().cloned().collect())
    }
}
