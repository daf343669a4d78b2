// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration boundary traits
//!
//! The reader builds models and hands them over through these traits. The
//! document, the transform engine and the source resolver are external
//! collaborators; the reader only ever calls them synchronously.

use crate::{
    Derivation, Layer, LayerHandle, LayerType, Model, ModelHandle, Pane, PaneHandle,
    PlayParameters, Selection, SourceError, Transform, TransformError,
};

/// Document that receives the reconstructed session graph
///
/// Ownership of a model moves into the document with the `add_*` / `set_main_model`
/// calls. Models the reader built but never handed over are passed to
/// [`release_model`](SessionDocument::release_model) exactly once when the
/// reader is finished.
///
/// # Example
///
/// ```ignore
/// use sv_session_model::SessionDocument;
///
/// fn count_layers(doc: &dyn SessionDocument, handles: &[LayerHandle]) -> usize {
///     handles.iter().filter(|h| doc.layer(**h).is_some()).count()
/// }
/// ```
pub trait SessionDocument {
    /// Take ownership of the main (reference) waveform
    fn set_main_model(&mut self, handle: ModelHandle, model: Model);

    /// Current main model, if any
    fn main_model(&self) -> Option<ModelHandle>;

    /// Take ownership of a model that was not produced by a transform
    fn add_non_derived_model(&mut self, handle: ModelHandle, model: Model);

    /// Take ownership of a model that was loaded from the file but records
    /// how it was originally derived
    fn add_already_derived_model(&mut self, handle: ModelHandle, model: Model, derivation: Derivation);

    /// Take ownership of a model that was recomputed while reading
    fn add_derived_model(&mut self, handle: ModelHandle, model: Model, derivation: Derivation);

    /// Attach derivation provenance to a model the document already owns
    fn link_derivation(&mut self, handle: ModelHandle, derivation: Derivation) -> bool;

    /// Look up an owned model
    fn model(&self, handle: ModelHandle) -> Option<&Model>;

    /// Look up an owned model for modification
    fn model_mut(&mut self, handle: ModelHandle) -> Option<&mut Model>;

    /// Dispose of a model the reader constructed but never handed over
    fn release_model(&mut self, handle: ModelHandle, model: Model) {
        let _ = (handle, model);
    }

    /// Record that some part of the session could not be loaded
    fn mark_incomplete(&mut self);

    /// Create a layer of the given type; `None` if the type is not supported
    fn create_layer(&mut self, layer_type: LayerType) -> Option<LayerHandle>;

    fn layer(&self, handle: LayerHandle) -> Option<&Layer>;

    fn layer_mut(&mut self, handle: LayerHandle) -> Option<&mut Layer>;

    /// Bind a layer to a model
    fn set_layer_model(&mut self, layer: LayerHandle, model: ModelHandle);

    /// Remove a layer that turned out to be unusable
    fn delete_layer(&mut self, layer: LayerHandle);

    /// Create a new view pane
    fn add_pane(&mut self) -> PaneHandle;

    fn pane_mut(&mut self, handle: PaneHandle) -> Option<&mut Pane>;

    /// Stack a layer on top of a pane
    fn add_layer_to_view(&mut self, pane: PaneHandle, layer: LayerHandle);

    fn add_selection(&mut self, selection: Selection);

    fn set_window_size(&mut self, width: u32, height: u32);

    /// Play parameters of an owned playable model
    fn play_parameters_mut(&mut self, model: ModelHandle) -> Option<&mut PlayParameters>;
}

/// Output of a successful transform run
#[derive(Debug)]
pub struct TransformOutput {
    pub model: Model,
    /// Non-fatal message from the engine (e.g. a parameter was clamped)
    pub message: Option<String>,
}

/// Executes analysis transforms to regenerate derived models
pub trait TransformEngine {
    /// Run `transform` over `source` (channel -1 = all channels mixed)
    fn run(
        &mut self,
        transform: &Transform,
        source: &Model,
        channel: i32,
    ) -> std::result::Result<TransformOutput, TransformError>;
}

/// Audio source resolved for a file-backed waveform
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioSource {
    /// Local path or URL the source resolved to
    pub location: String,
    pub remote: bool,
}

/// Locates audio files referenced by a session
///
/// Resolution blocks until the source is ready or has failed.
pub trait SourceResolver {
    /// Resolve `requested` (as written in the file) relative to the
    /// session's own `location`
    fn resolve(
        &self,
        requested: &str,
        location: Option<&str>,
    ) -> std::result::Result<AudioSource, SourceError>;
}
