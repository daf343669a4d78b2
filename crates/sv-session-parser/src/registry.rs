// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Identifier registry
//!
//! Maps export ids to live handles in two disjoint namespaces (models and
//! raw paths) and holds every model that has been constructed but not yet
//! handed to the document. A model is in exactly one place at a time:
//! staged here, or owned by the document.

use rustc_hash::{FxHashMap, FxHashSet};
use sv_session_model::{ElementError, ExportId, Model, ModelHandle, RawPath, SessionDocument};

/// Raw path plus whether an alignment has consumed it
#[derive(Debug)]
struct PathSlot {
    path: RawPath,
    consumed: bool,
}

/// Per-parse identity map from export ids to handles
#[derive(Debug, Default)]
pub struct Registry {
    /// Export id -> handle (model namespace)
    models: FxHashMap<ExportId, ModelHandle>,
    /// Constructed models not yet handed to the document
    staged: FxHashMap<ModelHandle, Model>,
    /// Handles whose model now belongs to the document
    added: FxHashSet<ModelHandle>,
    /// Export id -> raw path (path namespace)
    paths: FxHashMap<ExportId, PathSlot>,
    next_handle: u32,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a freshly constructed model to an export id
    ///
    /// The first declaration of an id wins; later ones are rejected and the
    /// model passed in is dropped before it ever gets a handle.
    pub fn declare_model(&mut self, id: ExportId, model: Model) -> Result<ModelHandle, ElementError> {
        if self.models.contains_key(&id) {
            return Err(ElementError::DuplicateModelId(id));
        }
        let handle = ModelHandle(self.next_handle);
        self.next_handle += 1;
        self.models.insert(id, handle);
        self.staged.insert(handle, model);
        Ok(handle)
    }

    /// Bind a raw path to an export id in the path namespace
    pub fn declare_path(&mut self, id: ExportId, path: RawPath) -> Result<(), ElementError> {
        if self.paths.contains_key(&id) {
            return Err(ElementError::DuplicateModelId(id));
        }
        self.paths.insert(
            id,
            PathSlot {
                path,
                consumed: false,
            },
        );
        Ok(())
    }

    pub fn has_model(&self, id: ExportId) -> bool {
        self.models.contains_key(&id)
    }

    pub fn has_path(&self, id: ExportId) -> bool {
        self.paths.contains_key(&id)
    }

    pub fn handle(&self, id: ExportId) -> Option<ModelHandle> {
        self.models.get(&id).copied()
    }

    /// Export id bound to a handle
    pub fn export_id(&self, handle: ModelHandle) -> Option<ExportId> {
        self.models
            .iter()
            .find(|(_, h)| **h == handle)
            .map(|(id, _)| *id)
    }

    /// Whether the model was already handed to the document
    pub fn is_added(&self, handle: ModelHandle) -> bool {
        self.added.contains(&handle)
    }

    /// Find a model wherever it currently lives
    pub fn model<'r>(&'r self, doc: &'r dyn SessionDocument, handle: ModelHandle) -> Option<&'r Model> {
        self.staged.get(&handle).or_else(|| doc.model(handle))
    }

    /// Mutable counterpart of [`model`](Self::model)
    pub fn model_mut<'r>(
        &'r mut self,
        doc: &'r mut (dyn SessionDocument + '_),
        handle: ModelHandle,
    ) -> Option<&'r mut Model> {
        if self.staged.contains_key(&handle) {
            return self.staged.get_mut(&handle);
        }
        doc.model_mut(handle)
    }

    /// Remove a staged model for handover and mark it added
    pub fn take_for_document(&mut self, handle: ModelHandle) -> Option<Model> {
        let model = self.staged.remove(&handle)?;
        self.added.insert(handle);
        Some(model)
    }

    /// Staged handles in construction order
    pub fn unadded(&self) -> Vec<ModelHandle> {
        let mut handles: Vec<_> = self.staged.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    /// Remove and return every staged model, in construction order
    pub fn drain_unadded(&mut self) -> Vec<(ModelHandle, Model)> {
        let mut drained: Vec<_> = self.staged.drain().collect();
        drained.sort_unstable_by_key(|(h, _)| *h);
        drained
    }

    pub fn path_mut(&mut self, id: ExportId) -> Option<&mut RawPath> {
        self.paths.get_mut(&id).map(|slot| &mut slot.path)
    }

    /// Copy a path out for an alignment and mark it consumed
    pub fn consume_path(&mut self, id: ExportId) -> Option<RawPath> {
        let slot = self.paths.get_mut(&id)?;
        slot.consumed = true;
        Some(slot.path.clone())
    }

    /// Remove every path no alignment consumed
    pub fn drain_orphan_paths(&mut self) -> Vec<(ExportId, RawPath)> {
        let orphans: Vec<ExportId> = self
            .paths
            .iter()
            .filter(|(_, slot)| !slot.consumed)
            .map(|(id, _)| *id)
            .collect();
        let mut drained: Vec<_> = orphans
            .into_iter()
            .filter_map(|id| self.paths.remove(&id).map(|slot| (id, slot.path)))
            .collect();
        drained.sort_unstable_by_key(|(id, _)| *id);
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_session_model::SparseModel;

    fn instants() -> Model {
        Model::Instants(SparseModel::new(44100.0, 1, false))
    }

    #[test]
    fn test_duplicate_model_id_first_wins() {
        let mut registry = Registry::new();
        let first = registry.declare_model(ExportId(4), instants()).unwrap();
        let second = registry.declare_model(ExportId(4), instants());

        assert_eq!(second, Err(ElementError::DuplicateModelId(ExportId(4))));
        assert_eq!(registry.handle(ExportId(4)), Some(first));
        assert_eq!(registry.unadded(), vec![first]);
    }

    #[test]
    fn test_namespaces_are_disjoint() {
        let mut registry = Registry::new();
        registry.declare_model(ExportId(1), instants()).unwrap();
        registry
            .declare_path(ExportId(1), RawPath::new(44100.0, 1))
            .unwrap();

        assert!(registry.has_model(ExportId(1)));
        assert!(registry.has_path(ExportId(1)));
        assert!(registry
            .declare_path(ExportId(1), RawPath::new(44100.0, 1))
            .is_err());
    }

    #[test]
    fn test_handover_and_drain() {
        let mut registry = Registry::new();
        let a = registry.declare_model(ExportId(0), instants()).unwrap();
        let b = registry.declare_model(ExportId(1), instants()).unwrap();

        assert!(registry.take_for_document(a).is_some());
        assert!(registry.is_added(a));
        assert!(registry.take_for_document(a).is_none());

        let drained = registry.drain_unadded();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, b);
        assert!(registry.unadded().is_empty());
    }

    #[test]
    fn test_orphan_paths() {
        let mut registry = Registry::new();
        registry
            .declare_path(ExportId(2), RawPath::new(44100.0, 1))
            .unwrap();
        registry
            .declare_path(ExportId(3), RawPath::new(44100.0, 1))
            .unwrap();
        assert!(registry.consume_path(ExportId(2)).is_some());

        let orphans = registry.drain_orphan_paths();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].0, ExportId(3));
        assert!(registry.has_path(ExportId(2)));
    }
}
