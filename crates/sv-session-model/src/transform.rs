// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transform descriptors and derivation records

use crate::{ModelHandle, RealTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Analysis window shape
///
/// Legacy derivations write the window as its integer index, new-style
/// transforms use the name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WindowType {
    Rectangular,
    Bartlett,
    Hamming,
    #[default]
    Hann,
    Blackman,
    Gaussian,
    Parzen,
    Nuttall,
    BlackmanHarris,
}

impl WindowType {
    const ALL: [WindowType; 9] = [
        WindowType::Rectangular,
        WindowType::Bartlett,
        WindowType::Hamming,
        WindowType::Hann,
        WindowType::Blackman,
        WindowType::Gaussian,
        WindowType::Parzen,
        WindowType::Nuttall,
        WindowType::BlackmanHarris,
    ];

    /// Window for a legacy integer index
    pub fn from_index(index: i64) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Window for a name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|w| w.name().eq_ignore_ascii_case(name))
    }

    pub fn name(&self) -> &'static str {
        match self {
            WindowType::Rectangular => "rectangular",
            WindowType::Bartlett => "bartlett",
            WindowType::Hamming => "hamming",
            WindowType::Hann => "hanning",
            WindowType::Blackman => "blackman",
            WindowType::Gaussian => "gaussian",
            WindowType::Parzen => "parzen",
            WindowType::Nuttall => "nuttall",
            WindowType::BlackmanHarris => "blackman-harris",
        }
    }
}

impl fmt::Display for WindowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Description of an analysis transform
///
/// Accumulated across a `derivation` element and its `transform`, `plugin`
/// and `parameter` children.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    /// Plugin and output identifier, e.g. `vamp:qm-vamp-plugins:qm-onsetdetector:onsets`
    pub identifier: String,
    pub plugin_version: String,
    pub program: String,
    /// Step size in frames; 0 means the plugin default
    pub step_size: u32,
    /// Block size in frames; 0 means the plugin default
    pub block_size: u32,
    pub window_type: WindowType,
    pub start_time: RealTime,
    pub duration: RealTime,
    /// Requested sample rate; 0 means the source rate
    pub sample_rate: f64,
    pub summary_type: String,
    pub parameters: BTreeMap<String, f32>,
}

impl Transform {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Default::default()
        }
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: f32) {
        self.parameters.insert(name.into(), value);
    }

    pub fn parameter(&self, name: &str) -> Option<f32> {
        self.parameters.get(name).copied()
    }
}

/// Provenance record linking an output model to the transform that made it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Derivation {
    pub transform: Transform,
    /// Source model; `None` when neither the file nor the document named one
    pub source: Option<ModelHandle>,
    /// Source channel; -1 means all channels mixed
    pub channel: i32,
    /// Whether the output was recomputed while reading rather than loaded
    pub regenerated: bool,
}
