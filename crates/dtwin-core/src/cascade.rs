//! Relationship cleanup before twin deletion
//!
//! Outgoing relationships are listed and deleted first, incoming ones after.
//! Each direction is listed completely before anything in it is deleted, so
//! paging never races the deletes. A failed delete is recorded and the rest
//! continue.

use crate::cancel::until_cancelled;
use crate::error::DeletionResult;
use crate::report::{CascadeReport, FailedItem};
use dtwin_service::{ServiceError, TwinGraphService};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Relationship key: source twin and relationship id
type RelationshipKey = (String, String);

/// Removes every relationship touching a twin
#[derive(Clone)]
pub struct RelationshipCascade {
    service: Arc<dyn TwinGraphService>,
    max_concurrency: usize,
    cancel: CancellationToken,
}

impl std::fmt::Debug for RelationshipCascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationshipCascade")
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl RelationshipCascade {
    /// Create cascade deleting through `service`
    #[must_use]
    pub fn new(service: Arc<dyn TwinGraphService>) -> Self {
        Self {
            service,
            max_concurrency: 8,
            cancel: CancellationToken::new(),
        }
    }

    /// With concurrent deletes per direction (at least 1)
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// With cancellation token
    #[inline]
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Delete every outgoing and incoming relationship of `twin_id`
    ///
    /// A twin without relationships yields an empty, successful report.
    ///
    /// # Errors
    /// - `DeletionError::Cancelled` if the token fires
    pub async fn run(&self, twin_id: &str) -> DeletionResult<CascadeReport> {
        let mut report = CascadeReport::new(twin_id);

        let listed = until_cancelled(
            &self.cancel,
            self.service
                .get_relationships(twin_id)
                .map_ok(|rel| (rel.source_id, rel.id))
                .try_collect::<Vec<RelationshipKey>>(),
        )
        .await?;
        match listed {
            Ok(keys) => report.outgoing = self.delete_all(keys, &mut report.failures).await?,
            Err(err) => record_listing_failure(twin_id, "list_relationships", err, &mut report),
        }

        let listed = until_cancelled(
            &self.cancel,
            self.service
                .get_incoming_relationships(twin_id)
                .map_ok(|rel| (rel.source_id, rel.relationship_id))
                .try_collect::<Vec<RelationshipKey>>(),
        )
        .await?;
        match listed {
            Ok(keys) => report.incoming = self.delete_all(keys, &mut report.failures).await?,
            Err(err) => {
                record_listing_failure(twin_id, "list_incoming_relationships", err, &mut report);
            }
        }

        tracing::info!(
            twin_id,
            outgoing = report.outgoing,
            incoming = report.incoming,
            failed = report.failures.len(),
            "relationship cascade finished"
        );
        Ok(report)
    }

    async fn delete_all(
        &self,
        keys: Vec<RelationshipKey>,
        failures: &mut Vec<FailedItem>,
    ) -> DeletionResult<usize> {
        let service = &self.service;
        let outcomes = until_cancelled(
            &self.cancel,
            stream::iter(keys)
                .map(|(source, relationship)| async move {
                    let result = service.delete_relationship(&source, &relationship).await;
                    (source, relationship, result)
                })
                .buffer_unordered(self.max_concurrency)
                .collect::<Vec<_>>(),
        )
        .await?;

        let mut deleted = 0;
        for (source, relationship, result) in outcomes {
            match result {
                Ok(()) => {
                    tracing::debug!(twin_id = %source, relationship_id = %relationship, "deleted relationship");
                    deleted += 1;
                }
                Err(err) => {
                    tracing::error!(
                        twin_id = %source,
                        relationship_id = %relationship,
                        status = err.status,
                        error_code = %err.error_code,
                        "failed to delete relationship: {}",
                        err.message
                    );
                    failures.push(FailedItem::new(
                        format!("{source}/{relationship}"),
                        "delete_relationship",
                        err,
                    ));
                }
            }
        }
        Ok(deleted)
    }
}

fn record_listing_failure(
    twin_id: &str,
    operation: &'static str,
    err: ServiceError,
    report: &mut CascadeReport,
) {
    tracing::error!(
        twin_id,
        operation,
        status = err.status,
        error_code = %err.error_code,
        "failed to list relationships: {}",
        err.message
    );
    report.failures.push(FailedItem::new(twin_id, operation, err));
}
