// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model variants that can appear in a session document
//!
//! Every model a session file can declare is one arm of the closed [`Model`]
//! sum type. Consumers match on it exhaustively instead of probing for
//! capabilities at runtime.

use crate::{Frame, ModelHandle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Discriminant of a [`Model`], used in diagnostics and compatibility tables
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    WaveFile,
    AggregateWave,
    DenseGrid,
    Instants,
    Image,
    Text,
    TimeValues,
    Boxes,
    Notes,
    FlexiNotes,
    Regions,
    Alignment,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::WaveFile => "wave file",
            ModelKind::AggregateWave => "aggregate wave",
            ModelKind::DenseGrid => "dense 3-D grid",
            ModelKind::Instants => "sparse instants",
            ModelKind::Image => "images",
            ModelKind::Text => "text",
            ModelKind::TimeValues => "time values",
            ModelKind::Boxes => "boxes",
            ModelKind::Notes => "notes",
            ModelKind::FlexiNotes => "flexible notes",
            ModelKind::Regions => "regions",
            ModelKind::Alignment => "alignment",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One event in a sparse model
///
/// Which optional fields are populated depends on the owning model: notes
/// carry value, duration and level; boxes carry value, duration and extent;
/// images carry a URI; instants carry only frame and label.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Event {
    pub frame: Frame,
    pub value: Option<f32>,
    pub duration: Option<Frame>,
    pub level: Option<f32>,
    pub extent: Option<f32>,
    pub label: String,
    pub uri: Option<String>,
}

impl Event {
    /// Create an event at the given frame with no other fields
    pub fn at(frame: Frame) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    pub fn with_value(mut self, value: f32) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_duration(mut self, duration: Frame) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_level(mut self, level: f32) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_extent(mut self, extent: f32) -> Self {
        self.extent = Some(extent);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }
}

/// Insert keeping events ordered by frame; equal frames keep arrival order
fn insert_ordered(events: &mut Vec<Event>, event: Event) {
    let at = events.partition_point(|e| e.frame <= event.frame);
    events.insert(at, event);
}

/// File-backed waveform
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaveFileModel {
    pub name: String,
    pub sample_rate: f64,
    /// Path or URL as written in the session file
    pub original_path: String,
    /// Location the source resolved to
    pub location: String,
}

/// One component of an aggregate waveform; `channel == -1` means all channels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentChannel {
    pub model: ModelHandle,
    pub channel: i32,
}

/// Waveform composed of the channels of other waveform models
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateWaveModel {
    pub name: String,
    pub sample_rate: f64,
    /// Components in declaration order
    pub components: Vec<ComponentChannel>,
}

/// Editable dense 3-D grid (columns of `height` bins each)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DenseGridModel {
    pub name: String,
    pub sample_rate: f64,
    /// Frames per column
    pub resolution: u32,
    /// Bins per column
    pub height: usize,
    pub minimum: Option<f32>,
    pub maximum: Option<f32>,
    pub start_frame: Frame,
    pub bin_names: BTreeMap<usize, String>,
    pub columns: BTreeMap<usize, Vec<f32>>,
}

impl DenseGridModel {
    pub fn new(sample_rate: f64, resolution: u32, height: usize) -> Self {
        Self {
            name: String::new(),
            sample_rate,
            resolution,
            height,
            minimum: None,
            maximum: None,
            start_frame: 0,
            bin_names: BTreeMap::new(),
            columns: BTreeMap::new(),
        }
    }

    pub fn set_bin_name(&mut self, bin: usize, name: impl Into<String>) {
        self.bin_names.insert(bin, name.into());
    }

    /// Replace a column; values beyond `height` are dropped
    pub fn set_column(&mut self, index: usize, mut values: Vec<f32>) {
        values.truncate(self.height);
        self.columns.insert(index, values);
    }

    pub fn column(&self, index: usize) -> Option<&[f32]> {
        self.columns.get(&index).map(|c| c.as_slice())
    }
}

/// Sparse model without a value axis (instants, images, text)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SparseModel {
    pub name: String,
    pub sample_rate: f64,
    pub resolution: u32,
    pub notify_on_add: bool,
    pub events: Vec<Event>,
}

impl SparseModel {
    pub fn new(sample_rate: f64, resolution: u32, notify_on_add: bool) -> Self {
        Self {
            name: String::new(),
            sample_rate,
            resolution,
            notify_on_add,
            events: Vec::new(),
        }
    }
}

/// Sparse model with a value axis (time values, boxes, notes, regions)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueModel {
    pub name: String,
    pub sample_rate: f64,
    pub resolution: u32,
    pub notify_on_add: bool,
    pub minimum: Option<f32>,
    pub maximum: Option<f32>,
    pub units: String,
    pub value_quantization: f32,
    pub events: Vec<Event>,
}

impl ValueModel {
    pub fn new(sample_rate: f64, resolution: u32, notify_on_add: bool) -> Self {
        Self {
            name: String::new(),
            sample_rate,
            resolution,
            notify_on_add,
            minimum: None,
            maximum: None,
            units: String::new(),
            value_quantization: 0.0,
            events: Vec::new(),
        }
    }

    pub fn with_extents(mut self, minimum: f32, maximum: f32) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }
}

/// One (frame, mapped frame) pair of a raw alignment path
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPoint {
    pub frame: Frame,
    pub map_frame: Frame,
}

/// Raw two-point path used as alignment data
///
/// Paths live in their own export-id namespace and are never handed to the
/// document directly; alignment models copy them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawPath {
    pub sample_rate: f64,
    pub resolution: u32,
    pub points: Vec<PathPoint>,
}

impl RawPath {
    pub fn new(sample_rate: f64, resolution: u32) -> Self {
        Self {
            sample_rate,
            resolution,
            points: Vec::new(),
        }
    }

    /// Add a point keeping the path ordered by frame
    pub fn add(&mut self, point: PathPoint) {
        let at = self.points.partition_point(|p| p.frame <= point.frame);
        self.points.insert(at, point);
    }
}

/// Alignment between a reference model and an aligned model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentModel {
    pub name: String,
    pub sample_rate: f64,
    pub reference: ModelHandle,
    pub aligned: ModelHandle,
    pub path: RawPath,
}

/// Closed set of model variants a session can contain
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Model {
    WaveFile(WaveFileModel),
    AggregateWave(AggregateWaveModel),
    DenseGrid(DenseGridModel),
    Instants(SparseModel),
    Image(SparseModel),
    Text(SparseModel),
    TimeValues(ValueModel),
    Boxes(ValueModel),
    Notes(ValueModel),
    FlexiNotes(ValueModel),
    Regions(ValueModel),
    Alignment(AlignmentModel),
}

impl Model {
    pub fn kind(&self) -> ModelKind {
        match self {
            Model::WaveFile(_) => ModelKind::WaveFile,
            Model::AggregateWave(_) => ModelKind::AggregateWave,
            Model::DenseGrid(_) => ModelKind::DenseGrid,
            Model::Instants(_) => ModelKind::Instants,
            Model::Image(_) => ModelKind::Image,
            Model::Text(_) => ModelKind::Text,
            Model::TimeValues(_) => ModelKind::TimeValues,
            Model::Boxes(_) => ModelKind::Boxes,
            Model::Notes(_) => ModelKind::Notes,
            Model::FlexiNotes(_) => ModelKind::FlexiNotes,
            Model::Regions(_) => ModelKind::Regions,
            Model::Alignment(_) => ModelKind::Alignment,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Model::WaveFile(m) => &m.name,
            Model::AggregateWave(m) => &m.name,
            Model::DenseGrid(m) => &m.name,
            Model::Instants(m) | Model::Image(m) | Model::Text(m) => &m.name,
            Model::TimeValues(m)
            | Model::Boxes(m)
            | Model::Notes(m)
            | Model::FlexiNotes(m)
            | Model::Regions(m) => &m.name,
            Model::Alignment(m) => &m.name,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        match self {
            Model::WaveFile(m) => m.name = name,
            Model::AggregateWave(m) => m.name = name,
            Model::DenseGrid(m) => m.name = name,
            Model::Instants(m) | Model::Image(m) | Model::Text(m) => m.name = name,
            Model::TimeValues(m)
            | Model::Boxes(m)
            | Model::Notes(m)
            | Model::FlexiNotes(m)
            | Model::Regions(m) => m.name = name,
            Model::Alignment(m) => m.name = name,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        match self {
            Model::WaveFile(m) => m.sample_rate,
            Model::AggregateWave(m) => m.sample_rate,
            Model::DenseGrid(m) => m.sample_rate,
            Model::Instants(m) | Model::Image(m) | Model::Text(m) => m.sample_rate,
            Model::TimeValues(m)
            | Model::Boxes(m)
            | Model::Notes(m)
            | Model::FlexiNotes(m)
            | Model::Regions(m) => m.sample_rate,
            Model::Alignment(m) => m.sample_rate,
        }
    }

    /// Minimum time unit in frames (1 for waveforms and alignments)
    pub fn resolution(&self) -> u32 {
        match self {
            Model::WaveFile(_) | Model::AggregateWave(_) | Model::Alignment(_) => 1,
            Model::DenseGrid(m) => m.resolution,
            Model::Instants(m) | Model::Image(m) | Model::Text(m) => m.resolution,
            Model::TimeValues(m)
            | Model::Boxes(m)
            | Model::Notes(m)
            | Model::FlexiNotes(m)
            | Model::Regions(m) => m.resolution,
        }
    }

    /// Whether channels of this model can be summarised into an aggregate
    pub fn is_channel_summarizable(&self) -> bool {
        matches!(self, Model::WaveFile(_) | Model::AggregateWave(_))
    }

    /// Whether the model can be played back and so gets play parameters
    pub fn is_playable(&self) -> bool {
        matches!(
            self,
            Model::WaveFile(_)
                | Model::AggregateWave(_)
                | Model::Instants(_)
                | Model::TimeValues(_)
                | Model::Notes(_)
                | Model::FlexiNotes(_)
                | Model::Regions(_)
        )
    }

    /// Events of a sparse model, or `None` for non-sparse variants
    pub fn events(&self) -> Option<&[Event]> {
        match self {
            Model::Instants(m) | Model::Image(m) | Model::Text(m) => Some(&m.events),
            Model::TimeValues(m)
            | Model::Boxes(m)
            | Model::Notes(m)
            | Model::FlexiNotes(m)
            | Model::Regions(m) => Some(&m.events),
            Model::WaveFile(_)
            | Model::AggregateWave(_)
            | Model::DenseGrid(_)
            | Model::Alignment(_) => None,
        }
    }

    /// Add an event to a sparse model, keeping frame order
    ///
    /// Returns `false` if the model holds no events.
    pub fn add_event(&mut self, event: Event) -> bool {
        match self {
            Model::Instants(m) | Model::Image(m) | Model::Text(m) => {
                insert_ordered(&mut m.events, event);
                true
            }
            Model::TimeValues(m)
            | Model::Boxes(m)
            | Model::Notes(m)
            | Model::FlexiNotes(m)
            | Model::Regions(m) => {
                insert_ordered(&mut m.events, event);
                true
            }
            Model::WaveFile(_)
            | Model::AggregateWave(_)
            | Model::DenseGrid(_)
            | Model::Alignment(_) => false,
        }
    }

    /// Models this one refers to by handle
    pub fn references(&self) -> Vec<ModelHandle> {
        match self {
            Model::AggregateWave(m) => m.components.iter().map(|c| c.model).collect(),
            Model::Alignment(m) => vec![m.reference, m.aligned],
            _ => Vec::new(),
        }
    }
}
