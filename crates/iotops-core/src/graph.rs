//! Deletion-order graph for Digital Twins models
//!
//! The service refuses to delete a model while another model still extends
//! it or uses it as a component, so every model's dependents have to go
//! first.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::dtdl::ModelData;

/// Model id -> ids of the models that depend on it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from a snapshot of all models
    pub fn from_models(models: &[ModelData]) -> Self {
        let mut graph = Self::new();
        for model in models {
            graph.dependents.entry(model.id.clone()).or_default();
        }

        for model in models {
            for dependency in model.dependencies() {
                graph.add_dependency(&model.id, &dependency);
            }
        }

        graph
    }

    /// Record that `model_id` depends on `dependency`
    ///
    /// Dependencies on models outside the graph are ignored.
    pub fn add_dependency(&mut self, model_id: &str, dependency: &str) {
        match self.dependents.get_mut(dependency) {
            Some(dependents) => {
                dependents.insert(model_id.to_string());
            }
            None => {
                debug!(
                    model = %model_id,
                    dependency = %dependency,
                    "Dependency is not part of the model set"
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.dependents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty()
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.dependents.contains_key(model_id)
    }

    /// Models that depend on `model_id`
    pub fn dependents(&self, model_id: &str) -> Option<&BTreeSet<String>> {
        self.dependents.get(model_id)
    }

    /// Consume the graph, returning every model id exactly once with each
    /// model placed after all models that depend on it
    ///
    /// Nodes leave the graph as soon as they are reached, so cycles and
    /// self-references terminate. Within a cycle the order is arbitrary.
    pub fn into_deletion_order(mut self) -> Vec<String> {
        let mut order = Vec::with_capacity(self.dependents.len());

        while let Some((root, dependents)) = self.dependents.pop_first() {
            let mut stack: Vec<(String, Vec<String>)> =
                vec![(root, dependents.into_iter().collect())];

            loop {
                let next = match stack.last_mut() {
                    Some((_, pending)) => pending.pop(),
                    None => break,
                };

                match next {
                    Some(dependent) => {
                        if let Some(grand_dependents) = self.dependents.remove(&dependent) {
                            stack.push((dependent, grand_dependents.into_iter().collect()));
                        }
                    }
                    None => {
                        if let Some((model_id, _)) = stack.pop() {
                            order.push(model_id);
                        }
                    }
                }
            }
        }

        order
    }
}
