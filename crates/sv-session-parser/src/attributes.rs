// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Attribute coercion
//!
//! Converts raw attribute text into typed values. Every accessor reports
//! per-attribute success or failure so handlers can tell a missing
//! mandatory attribute from a malformed one.

use quick_xml::events::BytesStart;
use sv_session_model::{AttrError, ExportId};

/// Attribute set of one element, in document order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attributes {
    items: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, value)` pairs
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            items: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Collect and unescape the attributes of a start tag
    pub fn from_start(start: &BytesStart<'_>) -> Result<Self, quick_xml::Error> {
        let mut items = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            items.push((key, value));
        }
        Ok(Self { items })
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.items.push((name.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Raw value of an attribute
    pub fn get(&self, name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Raw value, or the empty string when absent
    pub fn value(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    /// Non-empty trimmed value
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<&str, AttrError> {
        self.get(name)
            .map(str::trim)
            .ok_or_else(|| AttrError::Missing(name.to_string()))
    }

    /// Mandatory integer
    pub fn int(&self, name: &str) -> Result<i64, AttrError> {
        let raw = self.required(name)?;
        parse_int(raw).ok_or_else(|| AttrError::invalid(name, raw, "integer"))
    }

    /// Mandatory non-negative integer
    pub fn uint(&self, name: &str) -> Result<u32, AttrError> {
        let raw = self.required(name)?;
        parse_int(raw)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| AttrError::invalid(name, raw, "non-negative integer"))
    }

    /// Mandatory floating-point number
    pub fn float(&self, name: &str) -> Result<f64, AttrError> {
        let raw = self.required(name)?;
        parse_float(raw).ok_or_else(|| AttrError::invalid(name, raw, "number"))
    }

    /// Mandatory export id
    pub fn export_id(&self, name: &str) -> Result<ExportId, AttrError> {
        let raw = self.required(name)?;
        parse_export_id(raw).ok_or_else(|| AttrError::invalid(name, raw, "id"))
    }

    /// Optional integer; absent or malformed both give `None`
    pub fn opt_int(&self, name: &str) -> Option<i64> {
        self.int(name).ok()
    }

    pub fn opt_uint(&self, name: &str) -> Option<u32> {
        self.uint(name).ok()
    }

    pub fn opt_float(&self, name: &str) -> Option<f64> {
        self.float(name).ok()
    }

    pub fn opt_export_id(&self, name: &str) -> Option<ExportId> {
        self.export_id(name).ok()
    }

    /// Boolean flag; only the literal `true` is true
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).map(str::trim) == Some("true")
    }
}

/// Parse a decimal integer, allowing surrounding whitespace
pub fn parse_int(raw: &str) -> Option<i64> {
    lexical_core::parse::<i64>(raw.trim().as_bytes()).ok()
}

/// Parse a floating-point number, allowing surrounding whitespace
pub fn parse_float(raw: &str) -> Option<f64> {
    lexical_core::parse::<f64>(raw.trim().as_bytes()).ok()
}

/// Parse a non-negative export id
pub fn parse_export_id(raw: &str) -> Option<ExportId> {
    lexical_core::parse::<u32>(raw.trim().as_bytes())
        .ok()
        .map(ExportId)
}
