//! Model dependency graph
//!
//! Nodes are the models of one deletion run. An edge `referrer -> dependency`
//! exists for every `extends` entry and component schema that names another
//! model of the run. A model without incoming edges has no remaining
//! referrers and can be deleted now.

use crate::error::DeletionError;
use dtwin_model::{DependencyKind, ModelEntity, ModelId};
use petgraph::algo::tarjan_scc;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use std::collections::HashMap;

/// Working set of models with their structural references
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: StableDiGraph<ModelId, DependencyKind>,
    index: HashMap<ModelId, NodeIndex>,
}

impl DependencyGraph {
    /// Build graph over `entities`
    ///
    /// References to models outside `entities` are ignored. Repeated ids
    /// keep the first entity.
    pub fn from_entities<'a>(entities: impl IntoIterator<Item = &'a ModelEntity>) -> Self {
        let mut this = Self::default();
        let entities: Vec<&ModelEntity> = entities.into_iter().collect();

        for entity in &entities {
            if !this.index.contains_key(&entity.id) {
                let node = this.graph.add_node(entity.id.clone());
                this.index.insert(entity.id.clone(), node);
            }
        }

        for entity in &entities {
            let from = this.index[&entity.id];
            for (target, kind) in entity.dependencies() {
                if let Some(&to) = this.index.get(target) {
                    this.graph.update_edge(from, to, kind);
                }
            }
        }
        this
    }

    /// Number of models left
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Check if no model is left
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Check if `id` is still in the working set
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &ModelId) -> bool {
        self.index.contains_key(id)
    }

    /// Models no remaining model references, sorted
    #[must_use]
    pub fn leaves(&self) -> Vec<ModelId> {
        let mut leaves: Vec<ModelId> = self
            .graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|n| self.graph[n].clone())
            .collect();
        leaves.sort();
        leaves
    }

    /// Remaining models that reference `id`, sorted
    #[must_use]
    pub fn referrers(&self, id: &ModelId) -> Vec<ModelId> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut referrers: Vec<ModelId> = self
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .map(|n| self.graph[n].clone())
            .collect();
        referrers.sort();
        referrers.dedup();
        referrers
    }

    /// Drop `id` and its edges; returns whether it was present
    pub fn remove(&mut self, id: &ModelId) -> bool {
        match self.index.remove(id) {
            Some(node) => {
                self.graph.remove_node(node);
                true
            }
            None => false,
        }
    }

    /// Models left, sorted
    #[must_use]
    pub fn remaining(&self) -> Vec<ModelId> {
        let mut ids: Vec<ModelId> = self.index.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Reference cycles among the remaining models (self references included)
    #[must_use]
    pub fn cycles(&self) -> Vec<Vec<ModelId>> {
        let mut cycles: Vec<Vec<ModelId>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| match scc.as_slice() {
                [single] => self.graph.find_edge(*single, *single).is_some(),
                _ => true,
            })
            .map(|scc| {
                let mut ids: Vec<ModelId> = scc.into_iter().map(|n| self.graph[n].clone()).collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Deletion batches in order, without touching the service
    ///
    /// # Errors
    /// - `DeletionError::NoProgress` once no leaf is left while models remain
    pub fn plan(&self) -> Result<Vec<Vec<ModelId>>, DeletionError> {
        let mut working = self.clone();
        let mut batches = Vec::new();
        while !working.is_empty() {
            let leaves = working.leaves();
            if leaves.is_empty() {
                return Err(DeletionError::NoProgress {
                    remaining: working.remaining(),
                });
            }
            for leaf in &leaves {
                working.remove(leaf);
            }
            batches.push(leaves);
        }
        Ok(batches)
    }
}
