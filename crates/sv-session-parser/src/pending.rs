// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deferred resolution queues
//!
//! Session files refer forward and backward freely. Whatever cannot be
//! resolved when it is first seen waits here until a resolution checkpoint:
//! aggregates waiting for their components, models and paths waiting for
//! their datasets, and datasets that arrived before anything asked for them.

use crate::attributes::Attributes;
use crate::registry::Registry;
use rustc_hash::{FxHashMap, FxHashSet};
use sv_session_model::{
    AggregateWaveModel, ComponentChannel, ElementError, ExportId, Model, ModelHandle, ModelKind,
    SessionDocument,
};

/// Aggregate model seen before all of its components
#[derive(Clone, Debug, PartialEq)]
pub struct PendingAggregate {
    pub id: ExportId,
    pub name: String,
    pub sample_rate: f64,
    /// Component ids in declaration order
    pub components: Vec<ExportId>,
}

/// Outcome of looking up an aggregate's components
enum Components {
    Ready(Vec<ModelHandle>),
    /// Some component has not been declared yet
    Missing,
    /// A declared component is not a waveform; this never resolves
    Unmixable(ExportId, ModelKind),
}

impl PendingAggregate {
    fn lookup_components(&self, registry: &Registry, doc: &dyn SessionDocument) -> Components {
        let mut handles = Vec::with_capacity(self.components.len());
        for id in &self.components {
            let Some(handle) = registry.handle(*id) else {
                return Components::Missing;
            };
            let Some(model) = registry.model(doc, handle) else {
                return Components::Missing;
            };
            if !model.is_channel_summarizable() {
                return Components::Unmixable(*id, model.kind());
            }
            handles.push(handle);
        }
        Components::Ready(handles)
    }
}

/// Entity that asked for a dataset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatasetTarget {
    Model(ModelHandle),
    /// Raw paths are addressed by export id; they have no handle
    Path(ExportId),
}

/// Child element of a dataset that arrived before its owner
#[derive(Clone, Debug, PartialEq)]
pub enum EarlyItem {
    Point(Attributes),
    Bin(Attributes),
    Row { attrs: Attributes, text: String },
}

/// Dataset buffered until some model or path asks for it
#[derive(Clone, Debug, PartialEq)]
pub struct EarlyDataset {
    pub id: ExportId,
    pub dimensions: i64,
    pub separator: Option<String>,
    pub items: Vec<EarlyItem>,
    /// Set once the closing tag has been seen
    pub complete: bool,
}

/// All three pending sets of one parse
#[derive(Debug, Default)]
pub struct PendingQueues {
    aggregates: Vec<PendingAggregate>,
    awaiting: FxHashMap<ExportId, DatasetTarget>,
    filled: FxHashSet<ExportId>,
    early: Vec<EarlyDataset>,
}

impl PendingQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_aggregate(&mut self, record: PendingAggregate) {
        self.aggregates.push(record);
    }

    pub fn has_aggregate(&self, id: ExportId) -> bool {
        self.aggregates.iter().any(|a| a.id == id)
    }

    pub fn pending_aggregates(&self) -> &[PendingAggregate] {
        &self.aggregates
    }

    /// Build every aggregate whose components are all available
    ///
    /// Records with any missing component stay queued unchanged, so this
    /// can run at every checkpoint. Records naming a component that is not
    /// a waveform are dropped with an error.
    pub fn resolve_aggregates(&mut self, registry: &mut Registry, doc: &dyn SessionDocument) -> Vec<ElementError> {
        let mut errors = Vec::new();
        for record in std::mem::take(&mut self.aggregates) {
            let handles = match record.lookup_components(registry, doc) {
                Components::Ready(handles) => handles,
                Components::Missing => {
                    self.aggregates.push(record);
                    continue;
                }
                Components::Unmixable(component, kind) => {
                    errors.push(ElementError::UnmixableComponent {
                        aggregate: record.id,
                        component,
                        kind: kind.name().to_string(),
                    });
                    continue;
                }
            };
            let model = Model::AggregateWave(AggregateWaveModel {
                name: record.name,
                sample_rate: record.sample_rate,
                components: handles
                    .into_iter()
                    .map(|model| ComponentChannel { model, channel: -1 })
                    .collect(),
            });
            if let Err(e) = registry.declare_model(record.id, model) {
                errors.push(e);
            }
        }
        errors
    }

    /// Record that `target` wants dataset `dataset`
    pub fn await_dataset(&mut self, dataset: ExportId, target: DatasetTarget) {
        self.awaiting.insert(dataset, target);
    }

    /// Claim an awaited dataset; the entry is gone afterwards
    pub fn claim_dataset(&mut self, dataset: ExportId) -> Option<DatasetTarget> {
        let target = self.awaiting.remove(&dataset)?;
        self.filled.insert(dataset);
        Some(target)
    }

    /// Whether a dataset with this id was already bound or buffered
    pub fn is_dataset_seen(&self, dataset: ExportId) -> bool {
        self.filled.contains(&dataset) || self.early.iter().any(|e| e.id == dataset)
    }

    /// Remove every unfilled expectation, ordered by dataset id
    pub fn drain_awaiting(&mut self) -> Vec<(ExportId, DatasetTarget)> {
        let mut drained: Vec<_> = self.awaiting.drain().collect();
        drained.sort_unstable_by_key(|(id, _)| *id);
        drained
    }

    /// Start buffering a dataset nobody has asked for yet
    pub fn start_early(&mut self, id: ExportId, dimensions: i64, separator: Option<String>) {
        self.early.push(EarlyDataset {
            id,
            dimensions,
            separator,
            items: Vec::new(),
            complete: false,
        });
    }

    pub fn early_mut(&mut self, id: ExportId) -> Option<&mut EarlyDataset> {
        self.early.iter_mut().find(|e| e.id == id)
    }

    /// Take every complete early dataset that now has an owner
    pub fn take_bindable(&mut self) -> Vec<(EarlyDataset, DatasetTarget)> {
        let mut bound = Vec::new();
        let mut kept = Vec::with_capacity(self.early.len());
        for early in std::mem::take(&mut self.early) {
            match self.awaiting.get(&early.id).copied() {
                Some(target) if early.complete => {
                    self.awaiting.remove(&early.id);
                    self.filled.insert(early.id);
                    bound.push((early, target));
                }
                _ => kept.push(early),
            }
        }
        self.early = kept;
        bound
    }

    /// Remove every early dataset nothing ever claimed
    pub fn drain_early(&mut self) -> Vec<EarlyDataset> {
        std::mem::take(&mut self.early)
    }
}
