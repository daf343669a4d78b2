// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session writer
//!
//! Serializes a [`Document`] back to session XML that [`SessionReader`]
//! reads into an equivalent document. Export ids are assigned in write
//! order, so writing a document read from this writer's output reproduces
//! that output exactly.
//!
//! [`SessionReader`]: crate::SessionReader

use crate::document::Document;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use rustc_hash::FxHashMap;
use std::fmt::Display;
use sv_session_model::{
    DenseGridModel, Event as Point, ExportId, Layer, LayerHandle, Model, ModelHandle, Pane,
    ParseError, RawPath, Result, SessionDocument, ZoomLevel,
};

/// Serialize a document as session XML
pub fn write_session(doc: &Document) -> Result<String> {
    let mut session = SessionWriter::new();
    session.write_document(doc)?;
    let bytes = session.writer.into_inner();
    String::from_utf8(bytes).map_err(|e| ParseError::other(format!("session is not UTF-8: {}", e)))
}

fn write_error<E: Display>(e: E) -> ParseError {
    ParseError::other(e.to_string())
}

fn flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn digit(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Start tag under construction
struct Tag {
    start: BytesStart<'static>,
}

impl Tag {
    fn new(name: &'static str) -> Self {
        Self {
            start: BytesStart::new(name),
        }
    }

    fn attr(mut self, key: &str, value: impl Display) -> Self {
        self.start.push_attribute((key, value.to_string().as_str()));
        self
    }

    fn opt_attr(self, key: &str, value: Option<impl Display>) -> Self {
        match value {
            Some(value) => self.attr(key, value),
            None => self,
        }
    }
}

struct SessionWriter {
    writer: Writer<Vec<u8>>,
    model_ids: FxHashMap<ModelHandle, ExportId>,
    layer_ids: FxHashMap<LayerHandle, ExportId>,
    next_model: u32,
    next_dataset: u32,
}

impl SessionWriter {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
            model_ids: FxHashMap::default(),
            layer_ids: FxHashMap::default(),
            next_model: 0,
            next_dataset: 0,
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).map_err(write_error)
    }

    fn open(&mut self, tag: Tag) -> Result<()> {
        self.event(Event::Start(tag.start))
    }

    fn empty(&mut self, tag: Tag) -> Result<()> {
        self.event(Event::Empty(tag.start))
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn model_id(&mut self, handle: ModelHandle) -> ExportId {
        let id = ExportId(self.next_model);
        self.next_model += 1;
        self.model_ids.insert(handle, id);
        id
    }

    fn path_id(&mut self) -> ExportId {
        let id = ExportId(self.next_model);
        self.next_model += 1;
        id
    }

    fn dataset_id(&mut self) -> ExportId {
        let id = ExportId(self.next_dataset);
        self.next_dataset += 1;
        id
    }

    fn write_document(&mut self, doc: &Document) -> Result<()> {
        self.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.event(Event::DocType(BytesText::from_escaped("sonic-visualiser")))?;
        self.open(Tag::new("sv"))?;

        self.open(Tag::new("data"))?;
        self.write_models(doc)?;
        self.write_derivations(doc)?;
        self.write_layers(doc)?;
        self.close("data")?;

        self.write_play_parameters(doc)?;
        self.write_display(doc)?;
        self.write_selections(doc)?;

        self.close("sv")
    }

    // Models

    /// Plain models first, then aggregates, then alignments, each group
    /// in handle order
    fn write_models(&mut self, doc: &Document) -> Result<()> {
        let main = doc.main_model();
        for (handle, model) in doc.models() {
            if !matches!(model, Model::AggregateWave(_) | Model::Alignment(_)) {
                self.write_model(handle, model, main == Some(handle))?;
            }
        }
        for (handle, model) in doc.models() {
            if let Model::AggregateWave(aggregate) = model {
                let components: Vec<String> = aggregate
                    .components
                    .iter()
                    .filter_map(|c| self.model_ids.get(&c.model))
                    .map(|id| id.0.to_string())
                    .collect();
                let id = self.model_id(handle);
                self.empty(
                    Tag::new("model")
                        .attr("id", id.0)
                        .attr("name", &aggregate.name)
                        .attr("sampleRate", aggregate.sample_rate)
                        .attr("type", "aggregatewave")
                        .attr("components", components.join(",")),
                )?;
            }
        }
        for (handle, model) in doc.models() {
            if let Model::Alignment(alignment) = model {
                let (Some(reference), Some(aligned)) = (
                    self.model_ids.get(&alignment.reference).copied(),
                    self.model_ids.get(&alignment.aligned).copied(),
                ) else {
                    log::warn!("skipping alignment {:?} with unwritten models", handle);
                    continue;
                };
                let path = self.write_path(&alignment.path)?;
                let id = self.model_id(handle);
                self.empty(
                    Tag::new("model")
                        .attr("id", id.0)
                        .attr("name", &alignment.name)
                        .attr("sampleRate", alignment.sample_rate)
                        .attr("type", "alignment")
                        .attr("reference", reference.0)
                        .attr("aligned", aligned.0)
                        .attr("path", path.0),
                )?;
            }
        }
        Ok(())
    }

    fn write_model(&mut self, handle: ModelHandle, model: &Model, main: bool) -> Result<()> {
        let id = self.model_id(handle);
        let tag = Tag::new("model")
            .attr("id", id.0)
            .attr("name", model.name())
            .attr("sampleRate", model.sample_rate());

        match model {
            Model::WaveFile(wave) => {
                let tag = tag.attr("type", "wavefile").attr("file", &wave.original_path);
                let tag = if main { tag.attr("mainModel", "true") } else { tag };
                self.empty(tag)
            }
            Model::DenseGrid(grid) => {
                let dataset = self.dataset_id();
                self.empty(
                    tag.attr("type", "dense")
                        .attr("dimensions", 3)
                        .attr("windowSize", grid.resolution)
                        .attr("yBinCount", grid.height)
                        .opt_attr("minimum", grid.minimum)
                        .opt_attr("maximum", grid.maximum)
                        .attr("startFrame", grid.start_frame)
                        .attr("dataset", dataset.0),
                )?;
                self.write_grid(dataset, grid)
            }
            Model::Instants(m) | Model::Image(m) | Model::Text(m) => {
                let (dimensions, subtype) = match model {
                    Model::Image(_) => (1, Some("image")),
                    Model::Text(_) => (2, Some("text")),
                    _ => (1, None),
                };
                let dataset = self.dataset_id();
                self.empty(
                    tag.attr("type", "sparse")
                        .attr("dimensions", dimensions)
                        .attr("resolution", m.resolution)
                        .attr("notifyOnAdd", flag(m.notify_on_add))
                        .opt_attr("subtype", subtype)
                        .attr("dataset", dataset.0),
                )?;
                self.write_points(dataset, dimensions, model, &m.events)
            }
            Model::TimeValues(m) | Model::Boxes(m) | Model::Notes(m) | Model::FlexiNotes(m) | Model::Regions(m) => {
                let (dimensions, subtype) = match model {
                    Model::Boxes(_) => (2, Some("box")),
                    Model::Notes(_) => (3, Some("note")),
                    Model::FlexiNotes(_) => (3, Some("flexinote")),
                    Model::Regions(_) => (3, Some("region")),
                    _ => (2, None),
                };
                let dataset = self.dataset_id();
                self.empty(
                    tag.attr("type", "sparse")
                        .attr("dimensions", dimensions)
                        .attr("resolution", m.resolution)
                        .attr("notifyOnAdd", flag(m.notify_on_add))
                        .opt_attr("subtype", subtype)
                        .opt_attr("minimum", m.minimum)
                        .opt_attr("maximum", m.maximum)
                        .attr("units", &m.units)
                        .attr("valueQuantization", m.value_quantization)
                        .attr("dataset", dataset.0),
                )?;
                self.write_points(dataset, dimensions, model, &m.events)
            }
            Model::AggregateWave(_) | Model::Alignment(_) => Ok(()),
        }
    }

    fn write_path(&mut self, path: &RawPath) -> Result<ExportId> {
        let id = self.path_id();
        let dataset = self.dataset_id();
        self.empty(
            Tag::new("model")
                .attr("id", id.0)
                .attr("name", "")
                .attr("sampleRate", path.sample_rate)
                .attr("type", "sparse")
                .attr("dimensions", 2)
                .attr("subtype", "path")
                .attr("resolution", path.resolution)
                .attr("dataset", dataset.0),
        )?;
        self.open(Tag::new("dataset").attr("id", dataset.0).attr("dimensions", 2))?;
        for point in &path.points {
            self.empty(
                Tag::new("point")
                    .attr("frame", point.frame)
                    .attr("mapframe", point.map_frame),
            )?;
        }
        self.close("dataset")?;
        Ok(id)
    }

    fn write_points(&mut self, dataset: ExportId, dimensions: i64, model: &Model, events: &[Point]) -> Result<()> {
        self.open(Tag::new("dataset").attr("id", dataset.0).attr("dimensions", dimensions))?;
        for event in events {
            let tag = Tag::new("point").attr("frame", event.frame);
            let tag = match model {
                Model::Image(_) => tag.opt_attr("image", event.uri.as_deref()),
                Model::Text(_) => tag.opt_attr("height", event.value),
                Model::TimeValues(_) => tag.opt_attr("value", event.value),
                Model::Boxes(_) => tag
                    .opt_attr("frequency", event.value)
                    .opt_attr("duration", event.duration)
                    .opt_attr("extent", event.extent),
                Model::Notes(_) | Model::FlexiNotes(_) => tag
                    .opt_attr("value", event.value)
                    .opt_attr("duration", event.duration)
                    .opt_attr("level", event.level),
                Model::Regions(_) => tag
                    .opt_attr("value", event.value)
                    .opt_attr("duration", event.duration),
                _ => tag,
            };
            let tag = if event.label.is_empty() {
                tag
            } else {
                tag.attr("label", &event.label)
            };
            self.empty(tag)?;
        }
        self.close("dataset")
    }

    fn write_grid(&mut self, dataset: ExportId, grid: &DenseGridModel) -> Result<()> {
        self.open(Tag::new("dataset").attr("id", dataset.0).attr("dimensions", 3))?;
        for (number, name) in &grid.bin_names {
            self.empty(Tag::new("bin").attr("number", number).attr("name", name))?;
        }
        for (n, column) in &grid.columns {
            let text: Vec<String> = column.iter().map(f32::to_string).collect();
            self.open(Tag::new("row").attr("n", n))?;
            self.event(Event::Text(BytesText::new(&text.join(" "))))?;
            self.close("row")?;
        }
        self.close("dataset")
    }

    // Derivations, layers and playback

    /// Handles written so far, in export id order
    fn written_models(&self) -> Vec<(ExportId, ModelHandle)> {
        let mut written: Vec<_> = self.model_ids.iter().map(|(handle, id)| (*id, *handle)).collect();
        written.sort_unstable();
        written
    }

    fn write_derivations(&mut self, doc: &Document) -> Result<()> {
        for (output, handle) in self.written_models() {
            let Some(derivation) = doc.derivation(handle) else {
                continue;
            };
            let source = derivation.source.and_then(|s| self.model_ids.get(&s).copied());
            self.open(
                Tag::new("derivation")
                    .attr("model", output.0)
                    .opt_attr("source", source.map(|s| s.0))
                    .attr("channel", derivation.channel)
                    .attr("type", "transform"),
            )?;

            let transform = &derivation.transform;
            self.empty(
                Tag::new("transform")
                    .attr("id", &transform.identifier)
                    .attr("pluginVersion", &transform.plugin_version)
                    .attr("program", &transform.program)
                    .attr("stepSize", transform.step_size)
                    .attr("blockSize", transform.block_size)
                    .attr("windowType", transform.window_type.name())
                    .attr("startTime", transform.start_time)
                    .attr("duration", transform.duration)
                    .attr("sampleRate", transform.sample_rate)
                    .attr("summaryType", &transform.summary_type),
            )?;
            for (name, value) in &transform.parameters {
                self.empty(Tag::new("parameter").attr("name", name).attr("value", value))?;
            }
            self.close("derivation")?;
        }
        Ok(())
    }

    fn write_layers(&mut self, doc: &Document) -> Result<()> {
        for (index, layer) in doc.layers().enumerate() {
            let id = ExportId(index as u32);
            self.layer_ids.insert(layer.handle, id);
            self.write_layer(id, layer)?;
        }
        Ok(())
    }

    fn write_layer(&mut self, id: ExportId, layer: &Layer) -> Result<()> {
        let model = layer.model.and_then(|m| self.model_ids.get(&m).copied());
        let mut tag = Tag::new("layer")
            .attr("id", id.0)
            .attr("type", layer.layer_type.name())
            .attr("name", &layer.name)
            .attr("presentationName", &layer.presentation_name)
            .opt_attr("model", model.map(|m| m.0));
        for (key, value) in &layer.properties {
            tag = tag.attr(key, value);
        }

        if layer.measurements.is_empty() {
            return self.empty(tag);
        }
        self.open(tag)?;
        for rect in &layer.measurements {
            self.empty(
                Tag::new("measurement")
                    .attr("startFrame", rect.start_frame)
                    .attr("endFrame", rect.end_frame)
                    .attr("startY", rect.start_y)
                    .attr("endY", rect.end_y),
            )?;
        }
        self.close("layer")
    }

    fn write_play_parameters(&mut self, doc: &Document) -> Result<()> {
        for (id, handle) in self.written_models() {
            let Some(params) = doc.play_parameters(handle) else {
                continue;
            };
            self.empty(
                Tag::new("playparameters")
                    .attr("model", id.0)
                    .attr("mute", flag(params.muted))
                    .attr("pan", params.pan)
                    .attr("gain", params.gain)
                    .opt_attr("clipId", params.clip_id.as_deref()),
            )?;
        }
        Ok(())
    }

    // Display

    fn write_display(&mut self, doc: &Document) -> Result<()> {
        self.open(Tag::new("display"))?;
        if let Some((width, height)) = doc.window_size() {
            self.empty(Tag::new("window").attr("width", width).attr("height", height))?;
        }
        for pane in doc.panes() {
            self.write_pane(doc, pane)?;
        }
        self.close("display")
    }

    fn write_pane(&mut self, doc: &Document, pane: &Pane) -> Result<()> {
        let tag = Tag::new("view")
            .attr("type", "pane")
            .attr("centre", pane.centre_frame);
        let tag = match pane.zoom {
            ZoomLevel::FramesPerPixel(frames) => tag.attr("zoom", frames),
            ZoomLevel::PixelsPerFrame(pixels) => tag.attr("zoom", 1).attr("deepZoom", pixels),
        };
        self.open(
            tag.attr("followPan", digit(pane.follow_pan))
                .attr("followZoom", digit(pane.follow_zoom))
                .attr("tracking", pane.tracking.name())
                .attr("centreLineVisible", digit(pane.centre_line_visible))
                .opt_attr("height", pane.height),
        )?;

        for layer in &pane.layers {
            let Some(id) = self.layer_ids.get(layer).copied() else {
                continue;
            };
            let dormant = doc.layer(*layer).is_some_and(|l| l.is_dormant(pane.handle));
            self.empty(
                Tag::new("layer")
                    .attr("id", id.0)
                    .attr("visible", flag(!dormant)),
            )?;
        }
        self.close("view")
    }

    fn write_selections(&mut self, doc: &Document) -> Result<()> {
        self.open(Tag::new("selections"))?;
        for selection in doc.selections() {
            self.empty(
                Tag::new("selection")
                    .attr("start", selection.start)
                    .attr("end", selection.end),
            )?;
        }
        self.close("selections")
    }
}
