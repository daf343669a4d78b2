// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session reader - streaming element dispatcher
//!
//! Receives start / characters / end events, either from its own
//! `quick-xml` loop ([`SessionReader::parse`]) or pushed by a caller, and
//! routes each element name to one handler. A handler failure skips that
//! element only; the reader logs it and carries on with the next event.
//!
//! Models are handed to the document at fixed checkpoints: every `layer`
//! start and every `data` end add all models not yet added, and every
//! `derivation` start resolves pending aggregates first.

use crate::attributes::Attributes;
use crate::dataset;
use crate::derivation::{self, DerivationContext};
use crate::factory::{self, Declaration, FactoryContext};
use crate::options::ReaderOptions;
use crate::pending::{DatasetTarget, EarlyItem, PendingQueues};
use crate::registry::Registry;
use crate::report::ParseReport;
use crate::source::LocalFileResolver;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rustc_hash::FxHashMap;
use sv_session_model::{
    AlignmentModel, Derivation, ElementError, ExportId, LayerHandle, LayerType, MeasureRect,
    Model, ModelHandle, ModelKind, Pane, PaneHandle, ParseError, PlaybackFollowMode, Result,
    Selection, SessionDocument, SourceResolver, TransformEngine, ZoomLevel,
};

/// Layer attributes that are not kept as layer properties
const LAYER_FIXED_ATTRIBUTES: [&str; 6] = ["id", "type", "name", "presentationName", "model", "visible"];

/// Prefix of the fatal error string
const ERROR_PREFIX: &str = "ERROR: SV-XML: ";

/// State of the currently open `dataset` element
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum DatasetState {
    Closed,
    /// Filling a model or path that asked for it
    Bound {
        target: DatasetTarget,
        separator: Option<String>,
    },
    /// Buffering: nothing has asked for this dataset yet
    Early(ExportId),
    /// The dataset failed; its children are skipped quietly
    Rejected(ExportId),
}

/// Open `row` element
#[derive(Debug)]
pub(crate) struct RowState {
    attrs: Attributes,
    text: String,
}

/// Streaming reader that rebuilds a session graph into a document
///
/// # Example
///
/// ```ignore
/// use sv_session_parser::{Document, SessionReader};
///
/// let mut doc = Document::new();
/// let mut reader = SessionReader::new(&mut doc);
/// reader.parse(&xml)?;
/// let report = reader.finish();
/// println!("{} warnings", report.warnings().count());
/// ```
pub struct SessionReader<'a> {
    pub(crate) doc: &'a mut dyn SessionDocument,
    pub(crate) engine: Option<&'a mut dyn TransformEngine>,
    pub(crate) resolver: Box<dyn SourceResolver + 'a>,
    pub(crate) options: ReaderOptions,

    pub(crate) registry: Registry,
    pub(crate) queues: PendingQueues,
    /// Data-section layer ids
    pub(crate) layers: FxHashMap<ExportId, LayerHandle>,

    pub(crate) in_data: bool,
    pub(crate) in_view: bool,
    pub(crate) in_selections: bool,
    pub(crate) dataset: DatasetState,
    pub(crate) row: Option<RowState>,
    pub(crate) current_pane: Option<PaneHandle>,
    pub(crate) current_layer: Option<LayerHandle>,
    pub(crate) derivation: Option<DerivationContext>,
    /// Derivations opened inside another one and rejected
    pub(crate) skipped_derivations: usize,
    pub(crate) play_parameters: Option<ModelHandle>,

    pub(crate) report: ParseReport,
    pub(crate) cleaned_up: bool,
}

impl<'a> SessionReader<'a> {
    /// Create a reader that fills `doc`, resolving audio on the local filesystem
    pub fn new(doc: &'a mut dyn SessionDocument) -> Self {
        Self {
            doc,
            engine: None,
            resolver: Box::new(LocalFileResolver::new()),
            options: ReaderOptions::default(),
            registry: Registry::new(),
            queues: PendingQueues::new(),
            layers: FxHashMap::default(),
            in_data: false,
            in_view: false,
            in_selections: false,
            dataset: DatasetState::Closed,
            row: None,
            current_pane: None,
            current_layer: None,
            derivation: None,
            skipped_derivations: 0,
            play_parameters: None,
            report: ParseReport::new(),
            cleaned_up: false,
        }
    }

    pub fn with_options(mut self, options: ReaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Engine used to regenerate derived models the file does not contain
    pub fn with_transform_engine(mut self, engine: &'a mut dyn TransformEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_source_resolver(mut self, resolver: impl SourceResolver + 'a) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// False only after a fatal XML error
    pub fn is_ok(&self) -> bool {
        self.report.ok
    }

    /// Description of the fatal error, empty if there was none
    pub fn error_string(&self) -> &str {
        self.report.error.as_deref().unwrap_or("")
    }

    pub fn report(&self) -> &ParseReport {
        &self.report
    }

    /// Run the teardown checks and return the report
    pub fn finish(mut self) -> ParseReport {
        self.cleanup();
        std::mem::take(&mut self.report)
    }

    /// Parse a complete session document
    ///
    /// Element-level problems are recorded in the report and do not make
    /// this fail; only malformed XML does.
    pub fn parse(&mut self, content: &str) -> Result<()> {
        let result = self.drive(content);
        if let Err(e) = &result {
            self.report.fatal(format!("{}{}", ERROR_PREFIX, e));
        }
        result
    }

    fn drive(&mut self, content: &str) -> Result<()> {
        let mut reader = Reader::from_str(content);
        let mut open = 0usize;

        loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => return Err(xml_error(content, reader.buffer_position(), e)),
            };
            match event {
                Event::Start(start) => {
                    open += 1;
                    let (name, attrs) = element(&start)
                        .map_err(|e| xml_error(content, reader.buffer_position(), e))?;
                    self.start_element(&name, &attrs);
                }
                Event::Empty(start) => {
                    let (name, attrs) = element(&start)
                        .map_err(|e| xml_error(content, reader.buffer_position(), e))?;
                    self.start_element(&name, &attrs);
                    self.end_element(&name);
                }
                Event::End(end) => {
                    open = open.saturating_sub(1);
                    self.end_element(&String::from_utf8_lossy(end.name().as_ref()));
                }
                Event::Text(text) => {
                    if self.row.is_some() {
                        let text = text
                            .unescape()
                            .map_err(|e| xml_error(content, reader.buffer_position(), e))?;
                        self.characters(&text);
                    }
                }
                Event::CData(data) => {
                    self.characters(&String::from_utf8_lossy(&data.into_inner()));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if open > 0 {
            return Err(ParseError::UnexpectedEof(open));
        }
        Ok(())
    }

    /// Route one element start to its handler
    pub fn start_element(&mut self, name: &str, attrs: &Attributes) {
        let name = name.to_ascii_lowercase();
        let result = match name.as_str() {
            "sv" | "display" => Ok(()),
            "data" => {
                self.in_data = true;
                Ok(())
            }
            "window" => self.read_window(attrs),
            "model" => self.read_model(attrs),
            "dataset" => self.read_dataset(attrs),
            "bin" => self.read_bin(attrs),
            "point" => self.read_point(attrs),
            "row" => self.read_row(attrs),
            "layer" => self.read_layer(attrs),
            "view" => self.read_view(attrs),
            "derivation" => self.read_derivation(attrs),
            "playparameters" => self.read_play_parameters(attrs),
            "plugin" => self.read_plugin(attrs),
            "selections" => {
                self.in_selections = true;
                Ok(())
            }
            "selection" => self.read_selection(attrs),
            "measurement" => self.read_measurement(attrs),
            "transform" => self.read_transform(attrs),
            "parameter" => self.read_parameter(attrs),
            _ => Err(ElementError::UnknownElement(name.clone())),
        };
        if let Err(e) = result {
            self.report.warning(Some(&name), e.to_string());
        }
    }

    /// Text content; only rows use it
    pub fn characters(&mut self, text: &str) {
        if let Some(row) = self.row.as_mut() {
            row.text.push_str(text);
        }
    }

    /// Close one element
    pub fn end_element(&mut self, name: &str) {
        match name.to_ascii_lowercase().as_str() {
            "data" => {
                self.add_unadded_models();
                self.in_data = false;
            }
            "dataset" => self.end_dataset(),
            "row" => self.end_row(),
            "layer" => self.current_layer = None,
            "view" => {
                self.in_view = false;
                self.current_pane = None;
            }
            "selections" => self.in_selections = false,
            "derivation" => self.end_derivation(),
            "playparameters" => self.play_parameters = None,
            _ => {}
        }
    }

    // Checkpoints

    /// Resolve aggregates, then hand every staged model to the document
    fn add_unadded_models(&mut self) {
        self.resolve_aggregates();
        for handle in self.registry.unadded() {
            if let Some(model) = self.registry.take_for_document(handle) {
                self.doc.add_non_derived_model(handle, model);
            }
        }
        self.bind_early_datasets();
    }

    fn resolve_aggregates(&mut self) {
        for e in self.queues.resolve_aggregates(&mut self.registry, &*self.doc) {
            self.report.warning(Some("model"), e.to_string());
        }
    }

    fn main_rate(&self) -> Option<f64> {
        let main = self.doc.main_model()?;
        self.registry
            .model(&*self.doc, main)
            .map(|m| m.sample_rate())
    }

    // Models

    fn is_model_declared(&self, id: ExportId) -> bool {
        self.registry.has_model(id) || self.queues.has_aggregate(id)
    }

    fn read_model(&mut self, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        let id = attrs.export_id("id")?;
        let is_path = attrs.value("subtype").trim().eq_ignore_ascii_case("path");
        if !is_path && self.is_model_declared(id) {
            return Err(ElementError::DuplicateModelId(id));
        }

        let declared = {
            let ctx = FactoryContext {
                resolver: &*self.resolver,
                options: &self.options,
                main_rate: self.main_rate(),
            };
            factory::declare(attrs, &ctx)
        };
        let (id, declaration) = match declared {
            Ok(declared) => declared,
            Err(e @ ElementError::Source(_)) => {
                self.doc.mark_incomplete();
                self.report.incomplete = true;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        match declaration {
            Declaration::Model {
                model,
                main,
                dataset,
            } => {
                let handle = self.registry.declare_model(id, model)?;
                if main {
                    if let Some(model) = self.registry.take_for_document(handle) {
                        self.doc.set_main_model(handle, model);
                    }
                }
                if let Some(dataset) = dataset {
                    self.expect_dataset(dataset, DatasetTarget::Model(handle));
                }
            }
            Declaration::Path { path, dataset } => {
                self.registry.declare_path(id, path)?;
                if let Some(dataset) = dataset {
                    self.expect_dataset(dataset, DatasetTarget::Path(id));
                }
            }
            Declaration::Aggregate(record) => {
                self.queues.queue_aggregate(record);
                self.resolve_aggregates();
            }
            Declaration::Alignment {
                name,
                sample_rate,
                reference,
                aligned,
                path,
            } => {
                self.resolve_aggregates();
                let reference = self.alignment_ref(id, "reference model", reference);
                let aligned = self.alignment_ref(id, "aligned model", aligned);
                let path = if self.registry.has_path(path) {
                    Some(path)
                } else {
                    self.report.warning(
                        Some("model"),
                        format!("alignment {}: path {} not found", id, path),
                    );
                    None
                };
                let (Some(reference), Some(aligned), Some(path)) = (reference, aligned, path) else {
                    return Err(ElementError::UnresolvedAlignment(id));
                };
                let path = self
                    .registry
                    .consume_path(path)
                    .ok_or(ElementError::UnresolvedAlignment(id))?;
                let model = Model::Alignment(AlignmentModel {
                    name,
                    sample_rate,
                    reference,
                    aligned,
                    path,
                });
                self.registry.declare_model(id, model)?;
            }
        }
        Ok(())
    }

    fn alignment_ref(&mut self, id: ExportId, role: &str, target: ExportId) -> Option<ModelHandle> {
        let handle = self.registry.handle(target);
        if handle.is_none() {
            self.report.warning(
                Some("model"),
                format!("alignment {}: {} {} not found", id, role, target),
            );
        }
        handle
    }

    // Datasets

    fn expect_dataset(&mut self, dataset: ExportId, target: DatasetTarget) {
        self.queues.await_dataset(dataset, target);
        self.bind_early_datasets();
    }

    fn target_kind(&self, dataset: ExportId, target: DatasetTarget) -> std::result::Result<Option<ModelKind>, ElementError> {
        match target {
            DatasetTarget::Model(handle) => self
                .registry
                .model(&*self.doc, handle)
                .map(|m| Some(m.kind()))
                .ok_or(ElementError::UnwantedDataset(dataset)),
            DatasetTarget::Path(_) => Ok(None),
        }
    }

    fn read_dataset(&mut self, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        self.row = None;
        self.dataset = DatasetState::Closed;
        let id = attrs.export_id("id")?;
        let dimensions = attrs.int("dimensions")?;
        let separator = attrs
            .get("separator")
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if let Some(target) = self.queues.claim_dataset(id) {
            let checked = self
                .target_kind(id, target)
                .and_then(|kind| dataset::check_compatible(id, dimensions, kind));
            if let Err(e) = checked {
                self.dataset = DatasetState::Rejected(id);
                return Err(e);
            }
            self.dataset = DatasetState::Bound { target, separator };
            return Ok(());
        }

        if self.queues.is_dataset_seen(id) {
            self.dataset = DatasetState::Rejected(id);
            return Err(ElementError::UnwantedDataset(id));
        }

        self.report.warning(
            Some("dataset"),
            format!("dataset {} precedes model, holding it until the model is declared", id),
        );
        self.queues.start_early(id, dimensions, separator);
        self.dataset = DatasetState::Early(id);
        Ok(())
    }

    fn end_dataset(&mut self) {
        self.row = None;
        if let DatasetState::Early(id) = std::mem::replace(&mut self.dataset, DatasetState::Closed) {
            if let Some(early) = self.queues.early_mut(id) {
                early.complete = true;
            }
            self.bind_early_datasets();
        }
    }

    /// Replay every buffered dataset that now has an owner
    fn bind_early_datasets(&mut self) {
        for (early, target) in self.queues.take_bindable() {
            let checked = self
                .target_kind(early.id, target)
                .and_then(|kind| dataset::check_compatible(early.id, early.dimensions, kind));
            if let Err(e) = checked {
                self.report.warning(Some("dataset"), e.to_string());
                continue;
            }
            log::debug!("binding early dataset {} ({} items)", early.id, early.items.len());

            for item in &early.items {
                let (element, result) = match item {
                    EarlyItem::Point(attrs) => ("point", self.apply_point(target, attrs)),
                    EarlyItem::Bin(attrs) => ("bin", self.apply_bin(target, attrs)),
                    EarlyItem::Row { attrs, text } => (
                        "row",
                        self.apply_row(target, attrs, text, early.separator.as_deref()),
                    ),
                };
                if let Err(e) = result {
                    self.report.warning(Some(element), e.to_string());
                }
            }
        }
    }

    fn target_model(&mut self, handle: ModelHandle) -> std::result::Result<&mut Model, ElementError> {
        if self.registry.model(&*self.doc, handle).is_none() {
            let id = self.registry.export_id(handle).unwrap_or_default();
            return Err(ElementError::UnknownModel(id));
        }
        self.registry
            .model_mut(&mut *self.doc, handle)
            .ok_or(ElementError::UnknownModel(ExportId::default()))
    }

    fn apply_point(&mut self, target: DatasetTarget, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        match target {
            DatasetTarget::Model(handle) => dataset::add_point(self.target_model(handle)?, attrs),
            DatasetTarget::Path(id) => {
                let path = self
                    .registry
                    .path_mut(id)
                    .ok_or(ElementError::UnknownModel(id))?;
                dataset::add_path_point(path, attrs)
            }
        }
    }

    fn apply_bin(&mut self, target: DatasetTarget, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        match target {
            DatasetTarget::Model(handle) => dataset::set_bin(self.target_model(handle)?, attrs),
            DatasetTarget::Path(_) => Err(dataset::path_rejects("bin")),
        }
    }

    fn apply_row(
        &mut self,
        target: DatasetTarget,
        attrs: &Attributes,
        text: &str,
        separator: Option<&str>,
    ) -> std::result::Result<(), ElementError> {
        let n = attrs.uint("n")? as usize;
        let DatasetTarget::Model(handle) = target else {
            return Err(dataset::path_rejects("row"));
        };
        let (outcome, height) = match self.target_model(handle)? {
            Model::DenseGrid(grid) => (dataset::fill_row(grid, n, text, separator), grid.height),
            other => return Err(ElementError::wrong_kind("row", other.kind())),
        };

        let mut problems = Vec::new();
        if outcome.overflow > 0 {
            problems.push(format!("{} value(s) beyond grid height {}", outcome.overflow, height));
        }
        if outcome.bad_tokens > 0 {
            problems.push(format!("{} non-numeric value(s)", outcome.bad_tokens));
        }
        if !problems.is_empty() {
            self.report.warning(
                Some("row"),
                format!("row {}: ignored {}", n, problems.join(" and ")),
            );
        }
        Ok(())
    }

    /// Route a dataset child to its target, the early buffer, or nowhere
    fn dataset_child(&mut self, element: &'static str, item: EarlyItem) -> std::result::Result<(), ElementError> {
        match self.dataset.clone() {
            DatasetState::Closed => Err(ElementError::OutsideScope {
                element,
                scope: "dataset",
            }),
            DatasetState::Rejected(id) => {
                log::debug!("skipping {} of rejected dataset {}", element, id);
                Ok(())
            }
            DatasetState::Early(id) => {
                if let Some(early) = self.queues.early_mut(id) {
                    early.items.push(item);
                }
                Ok(())
            }
            DatasetState::Bound { target, separator } => match &item {
                EarlyItem::Point(attrs) => self.apply_point(target, attrs),
                EarlyItem::Bin(attrs) => self.apply_bin(target, attrs),
                EarlyItem::Row { attrs, text } => self.apply_row(target, attrs, text, separator.as_deref()),
            },
        }
    }

    fn read_point(&mut self, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        self.dataset_child("point", EarlyItem::Point(attrs.clone()))
    }

    fn read_bin(&mut self, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        self.dataset_child("bin", EarlyItem::Bin(attrs.clone()))
    }

    fn read_row(&mut self, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        if self.dataset == DatasetState::Closed {
            return Err(ElementError::OutsideScope {
                element: "row",
                scope: "dataset",
            });
        }
        self.row = Some(RowState {
            attrs: attrs.clone(),
            text: String::new(),
        });
        Ok(())
    }

    fn end_row(&mut self) {
        let Some(row) = self.row.take() else {
            return;
        };
        let item = EarlyItem::Row {
            attrs: row.attrs,
            text: row.text,
        };
        if let Err(e) = self.dataset_child("row", item) {
            self.report.warning(Some("row"), e.to_string());
        }
    }

    // Layers and views

    fn read_layer(&mut self, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        self.add_unadded_models();
        let id = attrs.export_id("id")?;

        if self.in_view {
            return self.read_view_layer(id, attrs);
        }
        if !self.in_data {
            log::debug!("layer {} outside data section, reading it as a declaration", id);
        }
        if self.layers.contains_key(&id) {
            return Err(ElementError::DuplicateLayerId(id));
        }
        let handle = self.create_layer(id, attrs)?;
        self.current_layer = Some(handle);
        Ok(())
    }

    fn create_layer(&mut self, id: ExportId, attrs: &Attributes) -> std::result::Result<LayerHandle, ElementError> {
        let type_name = attrs.value("type").trim();
        let layer_type = LayerType::from_name(type_name)
            .ok_or_else(|| ElementError::UnknownLayerType(type_name.to_string()))?;
        let handle = self
            .doc
            .create_layer(layer_type)
            .ok_or_else(|| ElementError::UnknownLayerType(type_name.to_string()))?;

        if let Some(model_id) = attrs.opt_export_id("model") {
            match self.registry.handle(model_id) {
                Some(model) => self.doc.set_layer_model(handle, model),
                None if layer_type.can_exist_without_model() => {
                    self.report.warning(
                        Some("layer"),
                        format!("ignoring unknown model {} for layer {}", model_id, id),
                    );
                }
                None => {
                    self.doc.delete_layer(handle);
                    return Err(ElementError::UnknownModel(model_id));
                }
            }
        }

        if let Some(layer) = self.doc.layer_mut(handle) {
            layer.name = attrs.value("name").to_string();
            layer.presentation_name = attrs.value("presentationName").to_string();
            for (key, value) in attrs.iter() {
                if !LAYER_FIXED_ATTRIBUTES.contains(&key) {
                    layer.properties.insert(key.to_string(), value.to_string());
                }
            }
        }
        self.layers.insert(id, handle);
        Ok(handle)
    }

    fn read_view_layer(&mut self, id: ExportId, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        let pane = self.current_pane.ok_or(ElementError::NoCurrentPane(id))?;
        let handle = match self.layers.get(&id).copied() {
            Some(handle) => handle,
            None if self.options.strict_view_layers => {
                return Err(ElementError::UndefinedViewLayer(id));
            }
            None => {
                self.report.warning(
                    Some("layer"),
                    format!("layer {} in view section has not been defined, defining it here", id),
                );
                self.create_layer(id, attrs)?
            }
        };

        self.doc.add_layer_to_view(pane, handle);
        if attrs.get("visible").map(str::trim) == Some("false") {
            if let Some(layer) = self.doc.layer_mut(handle) {
                layer.set_dormant(pane, true);
            }
        }
        self.current_layer = Some(handle);
        Ok(())
    }

    fn read_view(&mut self, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        self.in_view = true;
        let view_type = attrs.value("type").trim();
        if view_type != "pane" {
            return Err(ElementError::UnsupportedView(view_type.to_string()));
        }
        let handle = self.doc.add_pane();
        if let Some(pane) = self.doc.pane_mut(handle) {
            apply_view_attributes(pane, attrs);
        }
        self.current_pane = Some(handle);
        Ok(())
    }

    fn read_window(&mut self, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        if let (Some(width), Some(height)) = (attrs.opt_uint("width"), attrs.opt_uint("height")) {
            self.doc.set_window_size(width, height);
        }
        Ok(())
    }

    fn read_measurement(&mut self, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        let layer = self.current_layer.ok_or(ElementError::OutsideScope {
            element: "measurement",
            scope: "layer",
        })?;
        let rect = MeasureRect {
            start_frame: attrs.int("startFrame")?,
            end_frame: attrs.int("endFrame")?,
            start_y: attrs.opt_float("startY").unwrap_or(0.0),
            end_y: attrs.opt_float("endY").unwrap_or(0.0),
        };
        if let Some(layer) = self.doc.layer_mut(layer) {
            layer.measurements.push(rect);
        }
        Ok(())
    }

    fn read_selection(&mut self, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        if !self.in_selections {
            return Err(ElementError::OutsideScope {
                element: "selection",
                scope: "selections",
            });
        }
        let start = attrs.int("start")?;
        let end = attrs.int("end")?;
        self.doc.add_selection(Selection::new(start, end));
        Ok(())
    }

    // Derivations

    fn source_rate(&self, source: Option<ModelHandle>) -> f64 {
        source
            .or_else(|| self.doc.main_model())
            .and_then(|h| self.registry.model(&*self.doc, h))
            .map(|m| m.sample_rate())
            .unwrap_or(0.0)
    }

    fn read_derivation(&mut self, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        self.resolve_aggregates();
        if self.derivation.is_some() {
            self.skipped_derivations += 1;
            return Err(ElementError::NestedDerivation);
        }

        let output = attrs.opt_export_id("model");
        let existing = output.and_then(|id| self.registry.handle(id));
        let source = match attrs.opt_export_id("source") {
            Some(id) => {
                let handle = self.registry.handle(id);
                if handle.is_none() {
                    log::debug!("derivation source {} unknown, using main model", id);
                }
                handle
            }
            None => None,
        };

        let mut ctx = DerivationContext::new(output, existing, source, attrs);
        let applied = if ctx.legacy {
            let rate = self.source_rate(ctx.source);
            derivation::apply_legacy_attributes(&mut ctx.transform, attrs, rate)
        } else {
            Ok(())
        };
        self.derivation = Some(ctx);
        applied.map_err(ElementError::from)
    }

    fn end_derivation(&mut self) {
        if self.skipped_derivations > 0 {
            self.skipped_derivations -= 1;
            return;
        }
        if let Some(ctx) = self.derivation.take() {
            self.finish_derivation(ctx);
        }
    }

    fn finish_derivation(&mut self, ctx: DerivationContext) {
        let Some(output) = ctx.output else {
            self.report
                .warning(Some("derivation"), "derivation has no valid output model id");
            return;
        };
        let record = Derivation {
            transform: ctx.transform,
            source: ctx.source.or_else(|| self.doc.main_model()),
            channel: ctx.channel,
            regenerated: false,
        };

        if let Some(handle) = ctx.existing {
            match self.registry.take_for_document(handle) {
                Some(model) => self.doc.add_already_derived_model(handle, model, record),
                None => {
                    if !self.doc.link_derivation(handle, record) {
                        self.report.warning(
                            Some("derivation"),
                            format!("derived model {} is not in the document", output),
                        );
                    }
                }
            }
            return;
        }

        if self.registry.has_model(output) {
            self.report.warning(
                Some("derivation"),
                format!("model {} appeared during its own derivation, not regenerating", output),
            );
            return;
        }
        self.regenerate(output, record);
    }

    /// Recompute a derived model the file did not contain
    fn regenerate(&mut self, output: ExportId, mut record: Derivation) {
        let identifier = record.transform.identifier.clone();
        let Some(engine) = self.engine.as_deref_mut() else {
            self.report.warning(
                Some("derivation"),
                format!(
                    "cannot regenerate model {} from transform \"{}\": no transform engine available",
                    output, identifier
                ),
            );
            return;
        };
        let Some(source) = record
            .source
            .and_then(|h| self.registry.model(&*self.doc, h))
        else {
            self.report.warning(
                Some("derivation"),
                format!("no source model for transform \"{}\"", identifier),
            );
            return;
        };

        let result = engine.run(&record.transform, source, record.channel);
        match result {
            Ok(out) => {
                if let Some(message) = out.message {
                    self.report.advisory(
                        Some("derivation"),
                        format!("transform \"{}\": {}", identifier, message),
                    );
                }
                record.regenerated = true;
                match self.registry.declare_model(output, out.model) {
                    Ok(handle) => {
                        if let Some(model) = self.registry.take_for_document(handle) {
                            self.doc.add_derived_model(handle, model, record);
                        }
                    }
                    Err(e) => self.report.warning(Some("derivation"), e.to_string()),
                }
            }
            Err(e) => self.report.warning(
                Some("derivation"),
                format!("regeneration failed for transform \"{}\": {}", identifier, e),
            ),
        }
    }

    fn read_transform(&mut self, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        let ctx = self.derivation.as_mut().ok_or(ElementError::OutsideScope {
            element: "transform",
            scope: "derivation",
        })?;
        derivation::apply_transform_element(&mut ctx.transform, attrs)?;
        Ok(())
    }

    fn read_parameter(&mut self, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        let ctx = self.derivation.as_mut().ok_or(ElementError::OutsideScope {
            element: "parameter",
            scope: "derivation",
        })?;
        derivation::apply_parameter(&mut ctx.transform, attrs)
    }

    fn read_plugin(&mut self, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        if let Some(ctx) = self.derivation.as_mut() {
            if !ctx.legacy {
                log::debug!("ignoring plugin element in transform derivation");
                return Ok(());
            }
            derivation::apply_plugin_attributes(&mut ctx.transform, attrs)?;
            return Ok(());
        }

        if let Some(model) = self.play_parameters {
            let clip = attrs.text("clipId").or_else(|| {
                (attrs.value("identifier").trim() == "sample_player")
                    .then(|| attrs.text("program"))
                    .flatten()
            });
            if let (Some(clip), Some(params)) = (clip, self.doc.play_parameters_mut(model)) {
                params.clip_id = Some(clip.to_string());
            }
            return Ok(());
        }

        Err(ElementError::OutsideScope {
            element: "plugin",
            scope: "derivation or play parameters",
        })
    }

    // Playback

    fn read_play_parameters(&mut self, attrs: &Attributes) -> std::result::Result<(), ElementError> {
        let id = attrs.export_id("model")?;
        let handle = self
            .registry
            .handle(id)
            .ok_or(ElementError::UnknownModel(id))?;
        let params = self
            .doc
            .play_parameters_mut(handle)
            .ok_or(ElementError::PlayParametersMissing(id))?;

        params.muted = attrs.flag("mute");
        if let Some(pan) = attrs.opt_float("pan") {
            params.pan = pan as f32;
        }
        if let Some(gain) = attrs.opt_float("gain") {
            params.gain = gain as f32;
        }
        if let Some(clip) = attrs.text("clipId") {
            params.clip_id = Some(clip.to_string());
        }
        self.play_parameters = Some(handle);
        Ok(())
    }
}

fn apply_view_attributes(pane: &mut Pane, attrs: &Attributes) {
    if let Some(centre) = attrs.opt_int("centre") {
        pane.centre_frame = centre;
    }
    if let Some(zoom) = attrs.opt_uint("zoom") {
        pane.zoom = ZoomLevel::FramesPerPixel(zoom.max(1));
    }
    if let Some(deep) = attrs.opt_uint("deepZoom").filter(|d| *d > 0) {
        pane.zoom = ZoomLevel::PixelsPerFrame(deep);
    }
    if let Some(follow) = attrs.opt_int("followPan") {
        pane.follow_pan = follow != 0;
    }
    if let Some(follow) = attrs.opt_int("followZoom") {
        pane.follow_zoom = follow != 0;
    }
    if let Some(mode) = attrs.get("tracking").and_then(PlaybackFollowMode::from_name) {
        pane.tracking = mode;
    }
    if let Some(visible) = attrs.opt_int("centreLineVisible") {
        pane.centre_line_visible = visible != 0;
    }
    pane.height = attrs.opt_uint("height");
}

/// Lower-cased name and attributes of a start tag
fn element(start: &BytesStart<'_>) -> std::result::Result<(String, Attributes), quick_xml::Error> {
    let name = String::from_utf8_lossy(start.name().as_ref()).to_ascii_lowercase();
    Ok((name, Attributes::from_start(start)?))
}

/// Line and column (1-based) of a byte offset
fn line_column(content: &str, position: usize) -> (usize, usize) {
    let upto = &content.as_bytes()[..position.min(content.len())];
    let line = memchr::memchr_iter(b'\n', upto).count() + 1;
    let column = match memchr::memrchr(b'\n', upto) {
        Some(newline) => upto.len() - newline,
        None => upto.len() + 1,
    };
    (line, column)
}

fn xml_error<P, E>(content: &str, position: P, error: E) -> ParseError
where
    usize: TryFrom<P>,
    E: std::fmt::Display,
{
    let position = usize::try_from(position).unwrap_or(usize::MAX);
    let (line, column) = line_column(content, position);
    ParseError::xml(error.to_string(), line, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::report::Severity;
    use crate::testing::{model_named, read, AnyResolver, CountingEngine};

    const TEST_INSTANTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE sonic-visualiser>
<sv>
  <data>
    <model id="1" name="beats" sampleRate="44100" type="sparse" dimensions="1" resolution="1" notifyOnAdd="true" dataset="0"/>
    <dataset id="0" dimensions="1">
      <point frame="50" label="B"/>
      <point frame="20" label="A"/>
    </dataset>
  </data>
</sv>
"#;

    const TEST_EARLY_DATASET: &str = r#"<sv>
  <data>
    <dataset id="3" dimensions="2">
      <point frame="10" value="0.5" label="low"/>
      <point frame="5" value="0.9" label="high"/>
    </dataset>
    <model id="2" name="curve" sampleRate="8000" type="sparse" dimensions="2" minimum="0" maximum="1" units="V" dataset="3"/>
  </data>
</sv>"#;

    const TEST_AGGREGATE_FORWARD: &str = r#"<sv>
  <data>
    <model id="3" name="mix" sampleRate="44100" type="aggregatewave" components="2,1"/>
    <model id="1" name="left" sampleRate="44100" type="wavefile" file="left.wav" mainModel="true"/>
    <model id="2" name="right" sampleRate="44100" type="wavefile" file="right.wav"/>
  </data>
</sv>"#;

    const TEST_DENSE: &str = r#"<sv>
  <data>
    <model id="4" name="chroma" sampleRate="44100" type="dense" dimensions="3" windowSize="512" yBinCount="3" minimum="0" maximum="1" startFrame="0" dataset="5"/>
    <dataset id="5" dimensions="3" separator=",">
      <bin number="0" name="C"/>
      <bin number="2" name="D"/>
      <row n="0">0.1,0.2,0.3</row>
      <row n="1">0.4,oops,0.5,0.6,0.7</row>
      <point frame="0"/>
    </dataset>
  </data>
</sv>"#;

    const TEST_LAYERS_AND_VIEWS: &str = r#"<sv>
  <data>
    <model id="1" name="main" sampleRate="44100" type="wavefile" file="main.wav" mainModel="true"/>
    <model id="2" name="onsets" sampleRate="44100" type="sparse" dimensions="1"/>
    <layer id="10" type="waveform" name="Waveform" presentationName="Main" model="1" channelMode="0" colour="Black"/>
    <layer id="11" type="timeinstants" name="Onsets" model="2" plotStyle="1">
      <measurement startFrame="100" endFrame="200" startY="0.25" endY="0.75"/>
    </layer>
    <layer id="12" type="timeruler" name="Ruler" model="99"/>
    <layer id="13" type="notes" name="Ghost" model="99"/>
    <layer id="14" type="hologram" name="Nope"/>
    <layer id="10" type="waveform" name="Again" model="1"/>
  </data>
  <display>
    <window width="1024" height="768"/>
    <view type="pane" centre="22050" zoom="256" followPan="0" followZoom="1" tracking="scroll" centreLineVisible="0" height="180">
      <layer id="12"/>
      <layer id="10"/>
      <layer id="11" visible="false"/>
      <layer id="20" type="timeruler" name="Fresh"/>
    </view>
    <view type="pane" centre="0" zoom="1" deepZoom="4">
      <layer id="10"/>
    </view>
    <view type="splitter"/>
  </display>
  <selections>
    <selection start="400" end="100"/>
  </selections>
  <selection start="0" end="1"/>
</sv>"#;

    const TEST_PLAY_PARAMETERS: &str = r#"<sv>
  <data>
    <model id="1" name="main" sampleRate="44100" type="wavefile" file="main.wav" mainModel="true"/>
    <model id="2" name="notes" sampleRate="44100" type="sparse" dimensions="3" subtype="note"/>
  </data>
  <playparameters model="1" mute="true" pan="-0.5" gain="0.8" clipId="piano"/>
  <playparameters model="2" mute="false" pan="0" gain="1">
    <plugin identifier="sample_player" program="organ"/>
  </playparameters>
  <playparameters model="7"/>
  <plugin identifier="stray"/>
</sv>"#;

    const TEST_DERIVATIONS: &str = r#"<sv>
  <data>
    <model id="1" name="main" sampleRate="44100" type="wavefile" file="main.wav" mainModel="true"/>
    <model id="5" name="stored" sampleRate="44100" type="sparse" dimensions="1"/>
    <derivation model="9" source="1" channel="-1" type="transform">
      <transform id="vamp:qm-vamp-plugins:qm-onsetdetector:onsets" stepSize="512" blockSize="1024" windowType="hanning" startTime="0.000000000R" duration="0.000000000R"/>
      <parameter name="sensitivity" value="50"/>
      <plugin identifier="ignored" param-x="1"/>
    </derivation>
    <derivation model="9" source="1" channel="-1" type="transform">
      <transform id="vamp:qm-vamp-plugins:qm-onsetdetector:onsets"/>
    </derivation>
    <derivation model="5" source="1" channel="0" type="transform">
      <transform id="vamp:example:percussiononsets:onsets"/>
    </derivation>
  </data>
</sv>"#;

    const TEST_LEGACY_DERIVATION: &str = r#"<sv>
  <data>
    <model id="1" name="main" sampleRate="22050" type="wavefile" file="main.wav" mainModel="true"/>
    <derivation model="3" source="1" channel="-1" transform="vamp:example:zerocrossing:counts" stepSize="256" blockSize="512" windowType="2" startFrame="11025" duration="22050">
      <plugin identifier="zerocrossing" program="default" param-threshold="0.25"/>
    </derivation>
  </data>
</sv>"#;

    const TEST_ALIGNMENT: &str = r#"<sv>
  <data>
    <model id="1" name="reference" sampleRate="44100" type="wavefile" file="ref.wav" mainModel="true"/>
    <model id="2" name="performance" sampleRate="44100" type="wavefile" file="perf.wav"/>
    <model id="3" sampleRate="44100" type="sparse" dimensions="2" subtype="path" resolution="1" dataset="6"/>
    <dataset id="6" dimensions="2">
      <point frame="0" mapframe="0"/>
      <point frame="44100" mapframe="40000"/>
    </dataset>
    <model id="4" sampleRate="44100" type="sparse" dimensions="2" subtype="path" resolution="1"/>
    <model id="5" name="sync" sampleRate="44100" type="alignment" reference="1" aligned="2" path="3"/>
    <model id="6" name="broken" sampleRate="44100" type="alignment" reference="1" aligned="8" path="9"/>
  </data>
</sv>"#;

    fn read_with_engine(xml: &str, engine: &mut CountingEngine) -> (Document, ParseReport) {
        let mut doc = Document::new();
        let report = {
            let mut reader = SessionReader::new(&mut doc)
                .with_source_resolver(AnyResolver)
                .with_transform_engine(engine);
            let _ = reader.parse(xml);
            reader.finish()
        };
        (doc, report)
    }

    #[test]
    fn test_instants_dataset() {
        let (doc, report) = read(TEST_INSTANTS);

        assert!(report.ok);
        assert_eq!(report.warnings().count(), 0);
        assert_eq!(doc.model_count(), 1);

        let model = model_named(&doc, "beats").unwrap();
        assert_eq!(model.kind(), ModelKind::Instants);
        let events = model.events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!((events[0].frame, events[0].label.as_str()), (20, "A"));
        assert_eq!((events[1].frame, events[1].label.as_str()), (50, "B"));
    }

    #[test]
    fn test_dataset_before_model() {
        let (doc, report) = read(TEST_EARLY_DATASET);

        assert!(report.mentions("precedes model"));
        assert_eq!(report.unfilled_datasets, 0);
        let model = model_named(&doc, "curve").unwrap();
        assert_eq!(model.kind(), ModelKind::TimeValues);
        let events = model.events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].value, Some(0.9));
    }

    #[test]
    fn test_duplicate_model_first_wins() {
        let (doc, report) = read(
            r#"<sv><data>
                <model id="1" name="first" sampleRate="44100" type="sparse" dimensions="1"/>
                <model id="1" name="second" sampleRate="44100" type="sparse" dimensions="2"/>
            </data></sv>"#,
        );

        assert_eq!(doc.model_count(), 1);
        assert!(model_named(&doc, "first").is_some());
        assert!(model_named(&doc, "second").is_none());
        assert!(report.mentions("duplicate model id #1"));
    }

    #[test]
    fn test_aggregate_forward_references() {
        let (doc, report) = read(TEST_AGGREGATE_FORWARD);
        assert_eq!(report.warnings().count(), 0);

        let left = doc.models().find(|(_, m)| m.name() == "left").unwrap().0;
        let right = doc.models().find(|(_, m)| m.name() == "right").unwrap().0;
        match model_named(&doc, "mix") {
            Some(Model::AggregateWave(mix)) => {
                let order: Vec<_> = mix.components.iter().map(|c| c.model).collect();
                assert_eq!(order, vec![right, left]);
            }
            other => panic!("expected aggregate, got {:?}", other),
        }
        assert_eq!(doc.main_model(), Some(left));
    }

    #[test]
    fn test_unadded_models_released() {
        let (doc, report) = read(
            r#"<sv>
                <model id="1" name="a" sampleRate="44100" type="sparse" dimensions="1"/>
                <model id="2" name="b" sampleRate="44100" type="sparse" dimensions="3" subtype="region"/>
                <model id="3" name="c" sampleRate="44100" type="aggregatewave" components="8"/>
            </sv>"#,
        );

        assert_eq!(doc.model_count(), 0);
        assert_eq!(doc.released().len(), 2);
        assert_eq!(report.released_models, 2);
        assert!(report.mentions("never added"));
        assert!(report.mentions("could not be resolved"));
    }

    #[test]
    fn test_dense_grid_rows() {
        let (doc, report) = read(TEST_DENSE);

        match model_named(&doc, "chroma") {
            Some(Model::DenseGrid(grid)) => {
                assert_eq!(grid.column(0), Some(&[0.1, 0.2, 0.3][..]));
                assert_eq!(grid.column(1), Some(&[0.4, 0.5, 0.6][..]));
                assert_eq!(grid.bin_names.get(&2).map(String::as_str), Some("D"));
            }
            other => panic!("expected grid, got {:?}", other),
        }
        let row_warnings: Vec<_> = report
            .warnings()
            .filter(|d| d.message.starts_with("row 1:"))
            .collect();
        assert_eq!(row_warnings.len(), 1);
        assert_eq!(
            row_warnings[0].message,
            "row 1: ignored 1 value(s) beyond grid height 3 and 1 non-numeric value(s)"
        );
        assert!(report.mentions("point found in dense 3-D grid dataset"));
    }

    #[test]
    fn test_huge_grid_height_does_not_preallocate() {
        let (doc, report) = read(
            r#"<sv><data>
                <model id="1" name="tall" sampleRate="44100" type="dense" dimensions="3" windowSize="512" yBinCount="4000000000" dataset="2"/>
                <dataset id="2" dimensions="3"><row n="0">1 2</row></dataset>
            </data></sv>"#,
        );

        assert!(report.ok);
        match model_named(&doc, "tall") {
            Some(Model::DenseGrid(grid)) => assert_eq!(grid.column(0), Some(&[1.0, 2.0][..])),
            other => panic!("expected grid, got {:?}", other),
        }
    }

    #[test]
    fn test_aggregate_of_non_waveform_warns_at_declaration() {
        let (doc, report) = read(
            r#"<sv><data>
                <model id="1" name="beats" sampleRate="44100" type="sparse" dimensions="1"/>
                <model id="2" name="mix" sampleRate="44100" type="aggregatewave" components="1"/>
            </data></sv>"#,
        );

        assert!(report.mentions("aggregate model #2 cannot mix component #1, a sparse instants model"));
        assert!(!report.mentions("could not be resolved"));
        assert!(model_named(&doc, "mix").is_none());
        assert_eq!(doc.model_count(), 1);
    }

    #[test]
    fn test_incompatible_dataset_skips_children() {
        let (doc, report) = read(
            r#"<sv><data>
                <model id="1" name="ticks" sampleRate="44100" type="sparse" dimensions="1" dataset="0"/>
                <dataset id="0" dimensions="3">
                    <point frame="1" value="2" duration="3"/>
                    <point frame="4" value="5" duration="6"/>
                </dataset>
                <dataset id="0" dimensions="1"/>
            </data></sv>"#,
        );

        assert_eq!(model_named(&doc, "ticks").unwrap().events().unwrap().len(), 0);
        assert!(report.mentions("wrong dimensionality"));
        assert!(report.mentions("unwanted dataset #0"));
        assert_eq!(report.warnings().count(), 2);
    }

    #[test]
    fn test_layers_and_views() {
        let (doc, report) = read(TEST_LAYERS_AND_VIEWS);
        assert!(report.ok);

        let names: Vec<_> = doc.layers().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Waveform", "Onsets", "Ruler", "Fresh"]);

        let waveform = doc.layers().find(|l| l.name == "Waveform").unwrap();
        assert_eq!(waveform.presentation_name, "Main");
        assert_eq!(waveform.properties.get("colour").map(String::as_str), Some("Black"));
        assert!(!waveform.properties.contains_key("model"));
        assert!(waveform.model.is_some());

        let onsets = doc.layers().find(|l| l.name == "Onsets").unwrap();
        assert_eq!(onsets.measurements.len(), 1);
        assert_eq!(onsets.measurements[0].end_y, 0.75);

        let ruler = doc.layers().find(|l| l.name == "Ruler").unwrap();
        assert!(ruler.model.is_none());

        assert!(report.mentions("ignoring unknown model #99"));
        assert!(report.mentions("unknown model id #99"));
        assert!(report.mentions("unknown layer type \"hologram\""));
        assert!(report.mentions("duplicate layer id #10"));
        assert!(report.mentions("layer #20 in view section has not been defined"));
        assert!(report.mentions("non-pane view type \"splitter\""));
        assert!(report.mentions("selection found outside selections"));

        assert_eq!(doc.window_size(), Some((1024, 768)));
        let panes = doc.panes();
        assert_eq!(panes.len(), 2);
        assert_eq!(panes[0].centre_frame, 22050);
        assert_eq!(panes[0].zoom, ZoomLevel::FramesPerPixel(256));
        assert!(!panes[0].follow_pan);
        assert_eq!(panes[0].tracking, PlaybackFollowMode::ScrollContinuous);
        assert!(!panes[0].centre_line_visible);
        assert_eq!(panes[0].height, Some(180));
        assert_eq!(panes[0].layers.len(), 4);
        assert!(onsets.is_dormant(panes[0].handle));
        assert_eq!(panes[1].zoom, ZoomLevel::PixelsPerFrame(4));

        let selections: Vec<_> = doc.selections().copied().collect();
        assert_eq!(selections, vec![Selection::new(100, 400)]);
    }

    #[test]
    fn test_strict_view_layers() {
        let mut doc = Document::new();
        let report = {
            let mut reader = SessionReader::new(&mut doc)
                .with_source_resolver(AnyResolver)
                .with_options(ReaderOptions::default().with_strict_view_layers(true));
            reader.parse(TEST_LAYERS_AND_VIEWS).unwrap();
            reader.finish()
        };

        assert!(report.mentions("layer #20 in view section has not been defined"));
        assert!(doc.layers().all(|l| l.name != "Fresh"));
        assert_eq!(doc.panes()[0].layers.len(), 3);
    }

    #[test]
    fn test_play_parameters() {
        let (doc, report) = read(TEST_PLAY_PARAMETERS);

        let main = doc.main_model().unwrap();
        let params = doc.play_parameters(main).unwrap();
        assert!(params.muted);
        assert_eq!(params.pan, -0.5);
        assert_eq!(params.gain, 0.8);
        assert_eq!(params.clip_id.as_deref(), Some("piano"));

        let notes = doc.models().find(|(_, m)| m.name() == "notes").unwrap().0;
        assert_eq!(doc.play_parameters(notes).unwrap().clip_id.as_deref(), Some("organ"));

        assert!(report.mentions("unknown model id #7"));
        assert!(report.mentions("plugin found outside derivation or play parameters"));
    }

    #[test]
    fn test_derivations_regenerate_once() {
        let mut engine = CountingEngine::default();
        let (doc, report) = read_with_engine(TEST_DERIVATIONS, &mut engine);

        assert_eq!(engine.runs, 1);
        assert_eq!(report.warnings().count(), 0);
        assert_eq!(doc.model_count(), 3);

        let (derived, model) = doc
            .models()
            .find(|(_, m)| m.name().is_empty() && m.kind() == ModelKind::Instants)
            .unwrap();
        assert_eq!(
            model.events().unwrap()[0].label,
            "vamp:qm-vamp-plugins:qm-onsetdetector:onsets"
        );
        let derivation = doc.derivation(derived).unwrap();
        assert_eq!(derivation.source, doc.main_model());

        let stored = doc.models().find(|(_, m)| m.name() == "stored").unwrap().0;
        let link = doc.derivation(stored).unwrap();
        assert!(!link.regenerated);
        assert_eq!(link.channel, 0);
        assert_eq!(link.transform.identifier, "vamp:example:percussiononsets:onsets");
    }

    #[test]
    fn test_first_derivation_keeps_parameters() {
        let mut engine = CountingEngine::default();
        let xml = TEST_DERIVATIONS.replace(
            r#"<derivation model="9" source="1" channel="-1" type="transform">
      <transform id="vamp:qm-vamp-plugins:qm-onsetdetector:onsets"/>
    </derivation>"#,
            "",
        );
        let (doc, _) = read_with_engine(&xml, &mut engine);

        let derived = doc
            .models()
            .find(|(_, m)| m.name().is_empty())
            .unwrap()
            .0;
        let derivation = doc.derivation(derived).unwrap();
        assert!(derivation.regenerated);
        assert_eq!(derivation.transform.parameter("sensitivity"), Some(50.0));
        assert_eq!(derivation.transform.parameter("x"), None);
        assert_eq!(derivation.transform.step_size, 512);
    }

    #[test]
    fn test_regeneration_problems_are_warnings() {
        let (doc, report) = read(TEST_DERIVATIONS);
        assert!(report.ok);
        assert!(report.mentions("no transform engine available"));
        assert_eq!(doc.model_count(), 2);

        let mut engine = CountingEngine {
            fail: true,
            ..Default::default()
        };
        let (_, report) = read_with_engine(TEST_DERIVATIONS, &mut engine);
        assert!(report.mentions(
            "regeneration failed for transform \"vamp:qm-vamp-plugins:qm-onsetdetector:onsets\""
        ));

        let mut engine = CountingEngine {
            message: Some("step size adjusted".into()),
            ..Default::default()
        };
        let (_, report) = read_with_engine(TEST_DERIVATIONS, &mut engine);
        assert_eq!(report.with_severity(Severity::Advisory).count(), 1);
        assert_eq!(report.warnings().count(), 0);
    }

    #[test]
    fn test_legacy_derivation() {
        let mut engine = CountingEngine::default();
        let (doc, report) = read_with_engine(TEST_LEGACY_DERIVATION, &mut engine);
        assert_eq!(report.warnings().count(), 0);

        let derived = doc.models().find(|(_, m)| m.name().is_empty()).unwrap().0;
        let transform = &doc.derivation(derived).unwrap().transform;
        assert_eq!(transform.identifier, "vamp:example:zerocrossing:counts");
        assert_eq!(transform.window_type, sv_session_model::WindowType::Hamming);
        assert_eq!(transform.start_time, sv_session_model::RealTime::new(0, 500_000_000));
        assert_eq!(transform.duration, sv_session_model::RealTime::new(1, 0));
        assert_eq!(transform.program, "default");
        assert_eq!(transform.parameter("threshold"), Some(0.25));
    }

    #[test]
    fn test_derivation_scope_errors() {
        let (_, report) = read(
            r#"<sv>
                <transform id="x"/>
                <parameter name="a" value="1"/>
                <derivation type="transform"><transform id="y"/></derivation>
            </sv>"#,
        );
        assert!(report.mentions("transform found outside derivation"));
        assert!(report.mentions("parameter found outside derivation"));
        assert!(report.mentions("no valid output model id"));
    }

    #[test]
    fn test_alignment() {
        let (doc, report) = read(TEST_ALIGNMENT);

        let performance = doc.models().find(|(_, m)| m.name() == "performance").unwrap().0;
        let sync = doc.models().find(|(_, m)| m.name() == "sync").unwrap().0;
        assert_eq!(doc.alignment_for(performance), Some(sync));

        match doc.model(sync) {
            Some(Model::Alignment(alignment)) => assert_eq!(alignment.path.points.len(), 2),
            other => panic!("expected alignment, got {:?}", other),
        }

        assert!(report.mentions("aligned model #8 not found"));
        assert!(report.mentions("path #9 not found"));
        assert!(report.mentions("alignment model #6 refers to unknown models or paths"));
        assert!(model_named(&doc, "broken").is_none());
        assert_eq!(report.released_paths, 1);
    }

    #[test]
    fn test_missing_audio_marks_incomplete() {
        let (doc, report) = read(
            r#"<sv><data>
                <model id="1" name="gone" sampleRate="44100" type="wavefile" file="missing.wav" mainModel="true"/>
                <model id="2" name="kept" sampleRate="44100" type="sparse" dimensions="1"/>
            </data></sv>"#,
        );

        assert!(report.ok);
        assert!(report.incomplete);
        assert!(doc.is_incomplete());
        assert!(doc.main_model().is_none());
        assert!(model_named(&doc, "kept").is_some());
    }

    #[test]
    fn test_unknown_elements_are_skipped() {
        let (doc, report) = read(
            r#"<SV><Data>
                <hologram id="1"><model id="1" name="inner" sampleRate="8000" type="sparse" dimensions="1"/></hologram>
            </Data></SV>"#,
        );

        assert!(report.mentions("unexpected element \"hologram\""));
        assert!(model_named(&doc, "inner").is_some());
    }

    #[test]
    fn test_fatal_xml_errors() {
        let mut doc = Document::new();
        let mut reader = SessionReader::new(&mut doc);
        assert!(reader.parse("<sv>\n<data>\n</sv>").is_err());
        assert!(!reader.is_ok());
        assert!(reader.error_string().starts_with("ERROR: SV-XML: "));
        let report = reader.finish();
        assert_eq!(report.with_severity(Severity::Fatal).count(), 1);

        let mut doc = Document::new();
        let mut reader = SessionReader::new(&mut doc);
        assert!(reader.parse("<sv><data>").is_err());
        assert!(!reader.is_ok());
    }

    #[test]
    fn test_element_errors_keep_success() {
        let (_, report) = read(r#"<sv><model id="x" sampleRate="1" type="sparse"/><point frame="1"/></sv>"#);
        assert!(report.ok);
        assert!(report.error.is_none());
        assert!(report.mentions("invalid id \"x\" for attribute \"id\""));
        assert!(report.mentions("point found outside dataset"));
    }

    #[test]
    fn test_cleanup_runs_once_on_drop() {
        let mut doc = Document::new();
        {
            let mut reader = SessionReader::new(&mut doc);
            reader
                .parse(r#"<sv><model id="1" sampleRate="1" type="sparse" dimensions="1"/></sv>"#)
                .unwrap();
        }
        assert_eq!(doc.released().len(), 1);
    }

    #[test]
    fn test_pushed_events() {
        let mut doc = Document::new();
        let report = {
            let mut reader = SessionReader::new(&mut doc);
            reader.start_element("DATA", &Attributes::new());
            reader.start_element(
                "model",
                &Attributes::from_pairs([
                    ("id", "1"),
                    ("name", "grid"),
                    ("sampleRate", "100"),
                    ("type", "dense"),
                    ("dimensions", "3"),
                    ("windowSize", "1"),
                    ("yBinCount", "2"),
                    ("dataset", "2"),
                ]),
            );
            reader.start_element("dataset", &Attributes::from_pairs([("id", "2"), ("dimensions", "3")]));
            reader.start_element("row", &Attributes::from_pairs([("n", "0")]));
            reader.characters("1 ");
            reader.characters("2");
            reader.end_element("row");
            reader.end_element("dataset");
            reader.end_element("data");
            reader.finish()
        };

        assert_eq!(report.warnings().count(), 0);
        match model_named(&doc, "grid") {
            Some(Model::DenseGrid(grid)) => assert_eq!(grid.column(0), Some(&[1.0, 2.0][..])),
            other => panic!("expected grid, got {:?}", other),
        }
    }

    #[test]
    fn test_line_column() {
        assert_eq!(line_column("abc", 0), (1, 1));
        assert_eq!(line_column("ab\ncd", 4), (2, 2));
        assert_eq!(line_column("ab\n", 3), (2, 1));
    }
}
