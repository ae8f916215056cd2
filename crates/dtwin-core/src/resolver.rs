//! Model deletion in dependency order
//!
//! Each pass deletes every model no remaining model references, then
//! recomputes. A model selected in a pass leaves the working set even if its
//! delete call fails; the failure is reported, not retried. A pass that
//! finds nothing deletable ends the run with the remaining models marked as
//! stalled instead of looping.

use crate::cancel::until_cancelled;
use crate::error::DeletionResult;
use crate::graph::DependencyGraph;
use crate::report::{FailedItem, ModelDeletionReport, PassReport};
use dtwin_model::{ModelEntity, ModelId};
use dtwin_service::TwinGraphService;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Deletes a working set of models pass by pass
#[derive(Clone)]
pub struct ModelDeletionResolver {
    service: Arc<dyn TwinGraphService>,
    max_concurrency: usize,
    max_passes: Option<usize>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ModelDeletionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDeletionResolver")
            .field("max_concurrency", &self.max_concurrency)
            .field("max_passes", &self.max_passes)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ModelDeletionResolver {
    /// Create resolver deleting through `service`
    #[must_use]
    pub fn new(service: Arc<dyn TwinGraphService>) -> Self {
        Self {
            service,
            max_concurrency: 8,
            max_passes: None,
            cancel: CancellationToken::new(),
        }
    }

    /// With concurrent deletes per pass (at least 1)
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// With hard bound on passes
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

    /// Delete `entities` in dependency order
    ///
    /// # Errors
    /// - `DeletionError::Cancelled` if the token fires; completed deletes stay done
    pub async fn run(&self, entities: &[ModelEntity]) -> DeletionResult<ModelDeletionReport> {
        self.run_with_id(Uuid::new_v4(), entities).await
    }

    pub(crate) async fn run_with_id(
        &self,
        run_id: Uuid,
        entities: &[ModelEntity],
    ) -> DeletionResult<ModelDeletionReport> {
        let mut graph = DependencyGraph::from_entities(entities);
        let mut report = ModelDeletionReport::new(run_id);
        tracing::info!(models = graph.len(), "starting model deletion");

        while !graph.is_empty() {
            let pass = report.passes.len() + 1;
            if self.max_passes.is_some_and(|max| pass > max) {
                tracing::error!(
                    pass,
                    remaining = graph.len(),
                    "pass limit reached with models remaining"
                );
                report.stalled = graph.remaining();
                break;
            }

            let leaves = graph.leaves();
            if leaves.is_empty() {
                for cycle in graph.cycles() {
                    let members: Vec<&str> = cycle.iter().map(ModelId::as_str).collect();
                    tracing::error!(models = ?members, "reference cycle blocks deletion");
                }
                tracing::error!(
                    pass,
                    remaining = graph.len(),
                    "no deletable model left; stopping"
                );
                report.stalled = graph.remaining();
                break;
            }

            tracing::info!(pass, leaves = leaves.len(), remaining = graph.len(), "deletion pass");
            for leaf in &leaves {
                graph.remove(leaf);
            }
            report.passes.push(self.delete_batch(pass, leaves).await?);
        }

        tracing::info!(
            deleted = report.deleted_count(),
            failed = report.failed().count(),
            stalled = report.stalled.len(),
            "model deletion finished"
        );
        Ok(report)
    }

    async fn delete_batch(&self, pass: usize, leaves: Vec<ModelId>) -> DeletionResult<PassReport> {
        let service = &self.service;
        let outcomes = until_cancelled(
            &self.cancel,
            stream::iter(leaves)
                .map(|id| async move {
                    let result = service.delete_model(&id).await;
                    (id, result)
                })
                .buffer_unordered(self.max_concurrency)
                .collect::<Vec<_>>(),
        )
        .await?;

        let mut report = PassReport {
            pass,
            ..PassReport::default()
        };
        for (id, result) in outcomes {
            match result {
                Ok(()) => {
                    tracing::info!(pass, model_id = %id, "deleted model");
                    report.deleted.push(id);
                }
                Err(err) => {
                    tracing::error!(
                        pass,
                        model_id = %id,
                        status = err.status,
                        error_code = %err.error_code,
                        "failed to delete model: {}",
                        err.message
                    );
                    report
                        .failed
                        .push(FailedItem::new(id.to_string(), "delete_model", err));
                }
            }
        }
        report.deleted.sort();
        report.failed.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(report)
    }
}
