// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory session document
//!
//! A plain owning container implementing [`SessionDocument`]. Applications
//! with their own document type implement the trait themselves; this one
//! backs the session writer, the tests and the benchmarks.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use sv_session_model::{
    Derivation, Layer, LayerHandle, LayerType, Model, ModelHandle, Pane, PaneHandle,
    PlayParameters, SessionDocument, Selection,
};

/// Owning session graph
#[derive(Debug, Default, Serialize)]
pub struct Document {
    main_model: Option<ModelHandle>,
    models: BTreeMap<ModelHandle, Model>,
    derivations: BTreeMap<ModelHandle, Derivation>,
    play_parameters: BTreeMap<ModelHandle, PlayParameters>,
    layers: BTreeMap<LayerHandle, Layer>,
    panes: Vec<Pane>,
    selections: BTreeSet<Selection>,
    window_size: Option<(u32, u32)>,
    incomplete: bool,
    /// Handles the reader gave back without adding
    released: Vec<ModelHandle>,
    next_layer: u32,
    next_pane: u32,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Models in handle order
    pub fn models(&self) -> impl Iterator<Item = (ModelHandle, &Model)> {
        self.models.iter().map(|(h, m)| (*h, m))
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn derivation(&self, model: ModelHandle) -> Option<&Derivation> {
        self.derivations.get(&model)
    }

    pub fn play_parameters(&self, model: ModelHandle) -> Option<&PlayParameters> {
        self.play_parameters.get(&model)
    }

    /// Layers in creation order
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.values()
    }

    pub fn panes(&self) -> &[Pane] {
        &self.panes
    }

    pub fn selections(&self) -> impl Iterator<Item = &Selection> {
        self.selections.iter()
    }

    pub fn window_size(&self) -> Option<(u32, u32)> {
        self.window_size
    }

    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    pub fn released(&self) -> &[ModelHandle] {
        &self.released
    }

    /// Alignment model whose aligned side is `model`
    pub fn alignment_for(&self, model: ModelHandle) -> Option<ModelHandle> {
        self.models.iter().find_map(|(h, m)| match m {
            Model::Alignment(a) if a.aligned == model => Some(*h),
            _ => None,
        })
    }

    fn insert(&mut self, handle: ModelHandle, model: Model) {
        if model.is_playable() {
            self.play_parameters.entry(handle).or_default();
        }
        self.models.insert(handle, model);
    }
}

impl SessionDocument for Document {
    fn set_main_model(&mut self, handle: ModelHandle, model: Model) {
        self.insert(handle, model);
        self.main_model = Some(handle);
    }

    fn main_model(&self) -> Option<ModelHandle> {
        self.main_model
    }

    fn add_non_derived_model(&mut self, handle: ModelHandle, model: Model) {
        self.insert(handle, model);
    }

    fn add_already_derived_model(&mut self, handle: ModelHandle, model: Model, derivation: Derivation) {
        self.insert(handle, model);
        self.derivations.insert(handle, derivation);
    }

    fn add_derived_model(&mut self, handle: ModelHandle, model: Model, derivation: Derivation) {
        self.insert(handle, model);
        self.derivations.insert(handle, derivation);
    }

    fn link_derivation(&mut self, handle: ModelHandle, derivation: Derivation) -> bool {
        if !self.models.contains_key(&handle) {
            return false;
        }
        self.derivations.insert(handle, derivation);
        true
    }

    fn model(&self, handle: ModelHandle) -> Option<&Model> {
        self.models.get(&handle)
    }

    fn model_mut(&mut self, handle: ModelHandle) -> Option<&mut Model> {
        self.models.get_mut(&handle)
    }

    fn release_model(&mut self, handle: ModelHandle, _model: Model) {
        self.released.push(handle);
    }

    fn mark_incomplete(&mut self) {
        self.incomplete = true;
    }

    fn create_layer(&mut self, layer_type: LayerType) -> Option<LayerHandle> {
        let handle = LayerHandle(self.next_layer);
        self.next_layer += 1;
        self.layers.insert(handle, Layer::new(handle, layer_type));
        Some(handle)
    }

    fn layer(&self, handle: LayerHandle) -> Option<&Layer> {
        self.layers.get(&handle)
    }

    fn layer_mut(&mut self, handle: LayerHandle) -> Option<&mut Layer> {
        self.layers.get_mut(&handle)
    }

    fn set_layer_model(&mut self, layer: LayerHandle, model: ModelHandle) {
        if let Some(layer) = self.layers.get_mut(&layer) {
            layer.model = Some(model);
        }
    }

    fn delete_layer(&mut self, layer: LayerHandle) {
        self.layers.remove(&layer);
        for pane in &mut self.panes {
            pane.layers.retain(|l| *l != layer);
        }
    }

    fn add_pane(&mut self) -> PaneHandle {
        let handle = PaneHandle(self.next_pane);
        self.next_pane += 1;
        self.panes.push(Pane::new(handle));
        handle
    }

    fn pane_mut(&mut self, handle: PaneHandle) -> Option<&mut Pane> {
        self.panes.iter_mut().find(|p| p.handle == handle)
    }

    fn add_layer_to_view(&mut self, pane: PaneHandle, layer: LayerHandle) {
        if !self.layers.contains_key(&layer) {
            return;
        }
        if let Some(pane) = self.pane_mut(pane) {
            if !pane.layers.contains(&layer) {
                pane.layers.push(layer);
            }
        }
    }

    fn add_selection(&mut self, selection: Selection) {
        self.selections.insert(selection);
    }

    fn set_window_size(&mut self, width: u32, height: u32) {
        self.window_size = Some((width, height));
    }

    fn play_parameters_mut(&mut self, model: ModelHandle) -> Option<&mut PlayParameters> {
        self.play_parameters.get_mut(&model)
    }
}
