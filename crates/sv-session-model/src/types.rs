// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core identifier and time types shared by the session reader and its document

use serde::{Deserialize, Serialize};
use std::fmt;

/// Audio frame index (sample position within a model)
pub type Frame = i64;

/// File-local export identifier
///
/// Wraps the integer written in `id="3"`, `model="3"`, `dataset="3"` and
/// friends. Export ids are only meaningful inside one session file and are
/// never stable across sessions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize, Default)]
pub struct ExportId(pub u32);

impl fmt::Display for ExportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for ExportId {
    fn from(id: u32) -> Self {
        ExportId(id)
    }
}

impl From<ExportId> for u32 {
    fn from(id: ExportId) -> Self {
        id.0
    }
}

/// Opaque arena handle to a constructed model
///
/// Handles are allocated by the reader in construction order and stay valid
/// for the lifetime of the document that eventually owns the model.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct ModelHandle(pub u32);

impl fmt::Display for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model@{}", self.0)
    }
}

/// Handle to a layer created by the document
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct LayerHandle(pub u32);

impl fmt::Display for LayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer@{}", self.0)
    }
}

/// Handle to a view pane created by the document
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct PaneHandle(pub u32);

impl fmt::Display for PaneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pane@{}", self.0)
    }
}

/// Seconds plus nanoseconds, the time representation used by transforms
///
/// Negative times carry the sign on both fields, so `-1.5s` is
/// `RealTime { sec: -1, nsec: -500_000_000 }`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize, Default)]
pub struct RealTime {
    pub sec: i32,
    pub nsec: i32,
}

impl RealTime {
    pub const ZERO: RealTime = RealTime { sec: 0, nsec: 0 };

    pub fn new(sec: i32, nsec: i32) -> Self {
        Self { sec, nsec }
    }

    /// Convert a frame count at the given sample rate to real time
    pub fn from_frame(frame: Frame, sample_rate: f64) -> Self {
        if sample_rate <= 0.0 || frame == 0 {
            return Self::ZERO;
        }
        let seconds = frame as f64 / sample_rate;
        let whole = seconds.trunc();
        let nsec = ((seconds - whole) * 1_000_000_000.0).round() as i32;
        if nsec.abs() >= 1_000_000_000 {
            return Self::new(whole as i32 + nsec.signum(), 0);
        }
        Self::new(whole as i32, nsec)
    }

    /// Convert back to a frame count at the given sample rate
    pub fn to_frame(&self, sample_rate: f64) -> Frame {
        (self.to_seconds() * sample_rate).round() as Frame
    }

    pub fn to_seconds(&self) -> f64 {
        self.sec as f64 + self.nsec as f64 / 1_000_000_000.0
    }

    pub fn is_negative(&self) -> bool {
        self.sec < 0 || self.nsec < 0
    }
}

impl fmt::Display for RealTime {
    /// Writes the `sec.nsecR` form read back by the session parser
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        write!(
            f,
            "{}{}.{:09}R",
            sign,
            self.sec.unsigned_abs(),
            self.nsec.unsigned_abs()
        )
    }
}
