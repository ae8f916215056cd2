//! Outcome reports of bulk operations
//!
//! Bulk operations never stop at the first per-item failure. They collect
//! failures into a report; `into_result` turns a report with failures into
//! [`DeletionError::PartialFailure`] (or `NoProgress` for a stalled model run).

use crate::error::{DeletionError, DeletionResult};
use dtwin_model::ModelId;
use dtwin_service::ServiceError;
use uuid::Uuid;

/// One failed item of a bulk operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    /// Item id (model id, twin id or `source/relationship`)
    pub id: String,
    /// Service operation that failed
    pub operation: &'static str,
    /// Service failure
    pub error: ServiceError,
}

impl FailedItem {
    pub(crate) fn new(id: impl Into<String>, operation: &'static str, error: ServiceError) -> Self {
        Self {
            id: id.into(),
            operation,
            error,
        }
    }
}

/// One pass of a model deletion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Pass number, starting at 1
    pub pass: usize,
    /// Models deleted in this pass
    pub deleted: Vec<ModelId>,
    /// Models whose delete call failed in this pass
    pub failed: Vec<FailedItem>,
}

/// Outcome of a model deletion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDeletionReport {
    /// Correlates log lines of the run
    pub run_id: Uuid,
    /// Passes in order
    pub passes: Vec<PassReport>,
    /// Models left when a pass found nothing deletable
    pub stalled: Vec<ModelId>,
}

impl ModelDeletionReport {
    pub(crate) fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            passes: Vec::new(),
            stalled: Vec::new(),
        }
    }

    /// Deleted models in deletion order
    pub fn deleted(&self) -> impl Iterator<Item = &ModelId> {
        self.passes.iter().flat_map(|p| p.deleted.iter())
    }

    /// Failed delete calls
    pub fn failed(&self) -> impl Iterator<Item = &FailedItem> {
        self.passes.iter().flat_map(|p| p.failed.iter())
    }

    /// Number of deleted models
    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.passes.iter().map(|p| p.deleted.len()).sum()
    }

    /// Check if every model was deleted
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.stalled.is_empty() && self.failed().next().is_none()
    }

    /// Report on success, classified failure otherwise
    ///
    /// # Errors
    /// - `DeletionError::NoProgress` if the run stalled
    /// - `DeletionError::PartialFailure` if some delete calls failed
    pub fn into_result(self) -> DeletionResult<Self> {
        if !self.stalled.is_empty() {
            return Err(DeletionError::NoProgress {
                remaining: self.stalled,
            });
        }
        let failed_ids: Vec<String> = self.failed().map(|f| f.id.clone()).collect();
        if failed_ids.is_empty() {
            Ok(self)
        } else {
            Err(DeletionError::PartialFailure {
                succeeded: self.deleted_count(),
                failed_ids,
            })
        }
    }
}

/// Outcome of removing every relationship of one twin
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Twin whose relationships were removed
    pub twin_id: String,
    /// Outgoing relationships deleted
    pub outgoing: usize,
    /// Incoming relationships deleted
    pub incoming: usize,
    /// Failed listings and deletes
    pub failures: Vec<FailedItem>,
}

impl CascadeReport {
    pub(crate) fn new(twin_id: impl Into<String>) -> Self {
        Self {
            twin_id: twin_id.into(),
            ..Self::default()
        }
    }

    /// Relationships deleted in both directions
    #[inline]
    #[must_use]
    pub fn deleted(&self) -> usize {
        self.outgoing + self.incoming
    }

    /// Check if nothing failed
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Report on success, `PartialFailure` otherwise
    ///
    /// # Errors
    /// - `DeletionError::PartialFailure` listing the failed relationships
    pub fn into_result(self) -> DeletionResult<Self> {
        if self.failures.is_empty() {
            return Ok(self);
        }
        Err(DeletionError::PartialFailure {
            succeeded: self.deleted(),
            failed_ids: self.failures.into_iter().map(|f| f.id).collect(),
        })
    }
}

/// Outcome of a bulk twin deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwinDeletionReport {
    /// Correlates log lines of the run
    pub run_id: Uuid,
    /// Twins deleted
    pub deleted: Vec<String>,
    /// Twins whose delete call failed
    pub failed: Vec<FailedItem>,
    /// Relationship cleanup per twin
    pub cascades: Vec<CascadeReport>,
}

impl TwinDeletionReport {
    pub(crate) fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            deleted: Vec::new(),
            failed: Vec::new(),
            cascades: Vec::new(),
        }
    }

    /// Relationships deleted across all twins
    #[must_use]
    pub fn relationships_deleted(&self) -> usize {
        self.cascades.iter().map(CascadeReport::deleted).sum()
    }

    /// Check if every twin and every relationship was deleted
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cascades.iter().all(CascadeReport::is_success)
    }

    /// Failed relationship cleanups, then failed twin deletes
    pub fn failures(&self) -> impl Iterator<Item = &FailedItem> {
        self.cascades
            .iter()
            .flat_map(|cascade| cascade.failures.iter())
            .chain(&self.failed)
    }

    /// Report on success, `PartialFailure` otherwise
    ///
    /// # Errors
    /// - `DeletionError::PartialFailure` listing the relationships and twins left behind
    pub fn into_result(self) -> DeletionResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let mut failed_ids: Vec<String> = Vec::new();
        for item in self.failures() {
            if !failed_ids.contains(&item.id) {
                failed_ids.push(item.id.clone());
            }
        }
        Err(DeletionError::PartialFailure {
            succeeded: self.deleted.len(),
            failed_ids,
        })
    }
}
