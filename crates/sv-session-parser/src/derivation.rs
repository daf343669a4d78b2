// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Derivation context
//!
//! A `derivation` element and its children describe how an output model was
//! computed. The transform descriptor is accumulated here across the nested
//! `transform`, `parameter` and `plugin` elements and consumed when the
//! derivation closes.

use crate::attributes::{parse_float, Attributes};
use crate::realtime::parse_real_time;
use sv_session_model::{
    AttrError, ElementError, ExportId, ModelHandle, RealTime, Transform, WindowType,
};

/// Prefix of legacy per-parameter attributes on `plugin` elements
const PARAM_PREFIX: &str = "param-";

/// State of the one open derivation
#[derive(Clone, Debug, PartialEq)]
pub struct DerivationContext {
    /// Export id of the output model, when the attribute was usable
    pub output: Option<ExportId>,
    /// Handle the output id already had when the derivation opened
    pub existing: Option<ModelHandle>,
    pub source: Option<ModelHandle>,
    /// Source channel; -1 mixes all channels
    pub channel: i32,
    pub transform: Transform,
    /// Old-style derivation configured through attributes and `plugin`
    pub legacy: bool,
}

impl DerivationContext {
    pub fn new(output: Option<ExportId>, existing: Option<ModelHandle>, source: Option<ModelHandle>, attrs: &Attributes) -> Self {
        let channel = attrs
            .opt_int("channel")
            .and_then(|c| i32::try_from(c).ok())
            .unwrap_or(-1);
        Self {
            output,
            existing,
            source,
            channel,
            transform: Transform::default(),
            legacy: !attrs.value("type").trim().eq_ignore_ascii_case("transform"),
        }
    }
}

/// Window type written either as a name or as a numeric index
fn window_type(attrs: &Attributes) -> Result<Option<WindowType>, AttrError> {
    let Some(raw) = attrs.text("windowType") else {
        return Ok(None);
    };
    let parsed = match attrs.opt_int("windowType") {
        Some(index) => WindowType::from_index(index),
        None => WindowType::from_name(raw),
    };
    parsed
        .map(Some)
        .ok_or_else(|| AttrError::invalid("windowType", raw, "window type"))
}

fn real_time(attrs: &Attributes, name: &str) -> Result<Option<RealTime>, AttrError> {
    match attrs.text(name) {
        Some(raw) => parse_real_time(raw)
            .map(Some)
            .ok_or_else(|| AttrError::invalid(name, raw, "real time")),
        None => Ok(None),
    }
}

/// Apply the attributes of an old-style `derivation` element
///
/// Start frame and duration are in frames of the source model, converted
/// to real time with `source_rate`.
pub fn apply_legacy_attributes(transform: &mut Transform, attrs: &Attributes, source_rate: f64) -> Result<(), AttrError> {
    let window = window_type(attrs)?;

    if let Some(id) = attrs.text("transform") {
        transform.identifier = id.to_string();
    }
    if let Some(step) = attrs.opt_uint("stepSize") {
        transform.step_size = step;
    }
    if let Some(block) = attrs.opt_uint("blockSize") {
        transform.block_size = block;
    }
    if let Some(window) = window {
        transform.window_type = window;
    }
    if let Some(frame) = attrs.opt_int("startFrame") {
        transform.start_time = RealTime::from_frame(frame, source_rate);
    }
    if let Some(frames) = attrs.opt_int("duration") {
        transform.duration = RealTime::from_frame(frames, source_rate);
    }
    Ok(())
}

/// Apply a new-style `transform` element
///
/// Nothing is applied if any time or window attribute is malformed.
pub fn apply_transform_element(transform: &mut Transform, attrs: &Attributes) -> Result<(), AttrError> {
    let start_time = real_time(attrs, "startTime")?;
    let duration = real_time(attrs, "duration")?;
    let window = window_type(attrs)?;

    if let Some(id) = attrs.text("id") {
        transform.identifier = id.to_string();
    }
    if let Some(version) = attrs.get("pluginVersion") {
        transform.plugin_version = version.to_string();
    }
    if let Some(program) = attrs.get("program") {
        transform.program = program.to_string();
    }
    if let Some(step) = attrs.opt_uint("stepSize") {
        transform.step_size = step;
    }
    if let Some(block) = attrs.opt_uint("blockSize") {
        transform.block_size = block;
    }
    if let Some(window) = window {
        transform.window_type = window;
    }
    if let Some(start) = start_time {
        transform.start_time = start;
    }
    if let Some(duration) = duration {
        transform.duration = duration;
    }
    if let Some(rate) = attrs.opt_float("sampleRate") {
        transform.sample_rate = rate;
    }
    if let Some(summary) = attrs.get("summaryType") {
        transform.summary_type = summary.to_string();
    }
    Ok(())
}

/// Apply a legacy `plugin` configuration element
///
/// Every well-formed `param-<name>` attribute is applied; the first
/// malformed one is reported after the rest have been taken.
pub fn apply_plugin_attributes(transform: &mut Transform, attrs: &Attributes) -> Result<(), AttrError> {
    if let Some(program) = attrs.get("program") {
        transform.program = program.to_string();
    }

    let mut first_bad = None;
    for (key, value) in attrs.iter() {
        let Some(name) = key.strip_prefix(PARAM_PREFIX) else {
            continue;
        };
        match parse_float(value) {
            Some(v) => transform.set_parameter(name, v as f32),
            None if first_bad.is_none() => {
                first_bad = Some(AttrError::invalid(key, value, "number"));
            }
            None => {}
        }
    }
    first_bad.map_or(Ok(()), Err)
}

/// Apply one `parameter` element
pub fn apply_parameter(transform: &mut Transform, attrs: &Attributes) -> Result<(), ElementError> {
    let name = attrs.text("name").ok_or(ElementError::NamelessParameter)?;
    let value = attrs.float("value")?;
    transform.set_parameter(name, value as f32);
    Ok(())
}
