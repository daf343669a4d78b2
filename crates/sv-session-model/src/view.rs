// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layers, panes, selections and playback parameters

use crate::{Frame, LayerHandle, ModelHandle, PaneHandle};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Type of display layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerType {
    Waveform,
    Spectrogram,
    MelodicRangeSpectrogram,
    PeakFrequencySpectrogram,
    TimeRuler,
    TimeInstants,
    TimeValues,
    Notes,
    FlexiNotes,
    Regions,
    Boxes,
    Text,
    Image,
    Colour3DPlot,
    Spectrum,
    Slice,
}

impl LayerType {
    const ALL: [LayerType; 16] = [
        LayerType::Waveform,
        LayerType::Spectrogram,
        LayerType::MelodicRangeSpectrogram,
        LayerType::PeakFrequencySpectrogram,
        LayerType::TimeRuler,
        LayerType::TimeInstants,
        LayerType::TimeValues,
        LayerType::Notes,
        LayerType::FlexiNotes,
        LayerType::Regions,
        LayerType::Boxes,
        LayerType::Text,
        LayerType::Image,
        LayerType::Colour3DPlot,
        LayerType::Spectrum,
        LayerType::Slice,
    ];

    /// Layer type for the name used in `layer type="..."` (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// Name written in session files
    pub fn name(&self) -> &'static str {
        match self {
            LayerType::Waveform => "waveform",
            LayerType::Spectrogram => "spectrogram",
            LayerType::MelodicRangeSpectrogram => "melodicrange",
            LayerType::PeakFrequencySpectrogram => "peakfrequency",
            LayerType::TimeRuler => "timeruler",
            LayerType::TimeInstants => "timeinstants",
            LayerType::TimeValues => "timevalues",
            LayerType::Notes => "notes",
            LayerType::FlexiNotes => "flexinotes",
            LayerType::Regions => "regions",
            LayerType::Boxes => "boxes",
            LayerType::Text => "text",
            LayerType::Image => "image",
            LayerType::Colour3DPlot => "colour3dplot",
            LayerType::Spectrum => "spectrum",
            LayerType::Slice => "slice",
        }
    }

    /// Whether a layer of this type is useful without any model
    pub fn can_exist_without_model(&self) -> bool {
        matches!(self, LayerType::TimeRuler)
    }
}

/// Rectangle recorded by a measurement layer
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct MeasureRect {
    pub start_frame: Frame,
    pub end_frame: Frame,
    pub start_y: f64,
    pub end_y: f64,
}

/// Display layer bound to (at most) one model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub handle: LayerHandle,
    pub layer_type: LayerType,
    pub name: String,
    pub presentation_name: String,
    pub model: Option<ModelHandle>,
    /// Remaining layer attributes (colour, scale, plot style, ...)
    pub properties: BTreeMap<String, String>,
    pub measurements: Vec<MeasureRect>,
    /// Panes in which the layer is hidden
    pub dormant_in: BTreeSet<PaneHandle>,
}

impl Layer {
    pub fn new(handle: LayerHandle, layer_type: LayerType) -> Self {
        Self {
            handle,
            layer_type,
            name: String::new(),
            presentation_name: String::new(),
            model: None,
            properties: BTreeMap::new(),
            measurements: Vec::new(),
            dormant_in: BTreeSet::new(),
        }
    }

    pub fn set_dormant(&mut self, pane: PaneHandle, dormant: bool) {
        if dormant {
            self.dormant_in.insert(pane);
        } else {
            self.dormant_in.remove(&pane);
        }
    }

    pub fn is_dormant(&self, pane: PaneHandle) -> bool {
        self.dormant_in.contains(&pane)
    }
}

/// How a pane follows the playback position
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaybackFollowMode {
    ScrollContinuous,
    #[default]
    ScrollPageWithCentre,
    ScrollPage,
    Ignore,
}

impl PlaybackFollowMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "scroll" => Some(PlaybackFollowMode::ScrollContinuous),
            "page" => Some(PlaybackFollowMode::ScrollPageWithCentre),
            "daw" => Some(PlaybackFollowMode::ScrollPage),
            "ignore" => Some(PlaybackFollowMode::Ignore),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlaybackFollowMode::ScrollContinuous => "scroll",
            PlaybackFollowMode::ScrollPageWithCentre => "page",
            PlaybackFollowMode::ScrollPage => "daw",
            PlaybackFollowMode::Ignore => "ignore",
        }
    }
}

/// Horizontal zoom of a pane
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoomLevel {
    FramesPerPixel(u32),
    PixelsPerFrame(u32),
}

impl Default for ZoomLevel {
    fn default() -> Self {
        ZoomLevel::FramesPerPixel(1024)
    }
}

/// A view pane and the layers stacked in it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pane {
    pub handle: PaneHandle,
    pub centre_frame: Frame,
    pub zoom: ZoomLevel,
    pub follow_pan: bool,
    pub follow_zoom: bool,
    pub tracking: PlaybackFollowMode,
    pub centre_line_visible: bool,
    pub height: Option<u32>,
    pub layers: Vec<LayerHandle>,
}

impl Pane {
    pub fn new(handle: PaneHandle) -> Self {
        Self {
            handle,
            centre_frame: 0,
            zoom: ZoomLevel::default(),
            follow_pan: true,
            follow_zoom: true,
            tracking: PlaybackFollowMode::default(),
            centre_line_visible: true,
            height: None,
            layers: Vec::new(),
        }
    }
}

/// Selected frame range
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Selection {
    pub start: Frame,
    pub end: Frame,
}

impl Selection {
    /// Build a selection, swapping the ends if given backwards
    pub fn new(start: Frame, end: Frame) -> Self {
        if end < start {
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }
}

/// Playback settings for one playable model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayParameters {
    pub muted: bool,
    pub pan: f32,
    pub gain: f32,
    pub clip_id: Option<String>,
}

impl Default for PlayParameters {
    fn default() -> Self {
        Self {
            muted: false,
            pan: 0.0,
            gain: 1.0,
            clip_id: None,
        }
    }
}
