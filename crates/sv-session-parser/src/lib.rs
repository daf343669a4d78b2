// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SV-Session Parser - Streaming reader for audio annotation sessions
//!
//! This crate rebuilds a session graph (waveforms, derived analysis models,
//! layers, panes and selections) from session XML, handing every entity to
//! a [`SessionDocument`](sv_session_model::SessionDocument) as soon as it
//! is complete.
//!
//! # Features
//!
//! - **Streaming dispatch** over `quick-xml` events, or events pushed by a caller
//! - **Forward references** - datasets, aggregates and derivations may
//!   appear in any order relative to the models they belong to
//! - **Per-element recovery** - a broken element is reported and skipped,
//!   only malformed XML fails the parse
//! - **Exactly-once ownership** - every model is either added to the
//!   document or released back to it
//! - **Session writer** producing XML the reader accepts unchanged
//!
//! # Example
//!
//! ```ignore
//! use sv_session_parser::SessionParser;
//!
//! let parser = SessionParser::new().with_location("/music/song.sv");
//! let session = parser.parse(&xml)?;
//!
//! println!("{} models", session.document.model_count());
//! for warning in session.report.warnings() {
//!     println!("{}", warning.message);
//! }
//! ```

mod attributes;
mod cleanup;
mod dataset;
mod derivation;
mod document;
mod factory;
mod options;
mod pending;
mod reader;
mod realtime;
mod registry;
mod report;
mod source;
mod writer;

#[cfg(test)]
mod testing;

pub use attributes::Attributes;
pub use document::Document;
pub use options::ReaderOptions;
pub use reader::SessionReader;
pub use realtime::parse_real_time;
pub use report::{Diagnostic, ParseReport, Severity};
pub use source::LocalFileResolver;
pub use writer::write_session;

use std::path::{Path, PathBuf};
use sv_session_model::{Result, TransformEngine};

/// A session read into a [`Document`]
#[derive(Debug)]
pub struct ParsedSession {
    pub document: Document,
    pub report: ParseReport,
}

/// Session parser with fixed options
///
/// Reads into a fresh [`Document`] and resolves audio on the local
/// filesystem. Use [`SessionReader`] directly to fill another document
/// type or to plug in a different source resolver.
#[derive(Clone, Debug, Default)]
pub struct SessionParser {
    pub options: ReaderOptions,
}

impl SessionParser {
    /// Create a parser with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the session file; relative audio paths resolve against it
    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.options = self.options.with_location(location);
        self
    }

    /// Force every wave file to this sample rate
    pub fn with_fixed_sample_rate(mut self, rate: f64) -> Self {
        self.options = self.options.with_fixed_sample_rate(rate);
        self
    }

    /// Resample non-main wave files of unknown rate to the main model's rate
    pub fn with_resample_on_load(mut self, enabled: bool) -> Self {
        self.options = self.options.with_resample_on_load(enabled);
        self
    }

    /// Reject view-section layers the data section never declared
    pub fn with_strict_view_layers(mut self, enabled: bool) -> Self {
        self.options = self.options.with_strict_view_layers(enabled);
        self
    }

    /// Parse session XML; derived models missing from the file stay missing
    pub fn parse(&self, content: &str) -> Result<ParsedSession> {
        self.run(content, None)
    }

    /// Parse session XML, regenerating missing derived models with `engine`
    pub fn parse_with_engine(&self, content: &str, engine: &mut dyn TransformEngine) -> Result<ParsedSession> {
        self.run(content, Some(engine))
    }

    /// Read and parse a session file
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<ParsedSession> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let parser = match self.options.location {
            Some(_) => self.clone(),
            None => self.clone().with_location(path),
        };
        parser.parse(&content)
    }

    fn run(&self, content: &str, engine: Option<&mut dyn TransformEngine>) -> Result<ParsedSession> {
        let mut document = Document::new();
        let report = {
            let mut reader = SessionReader::new(&mut document).with_options(self.options.clone());
            if let Some(engine) = engine {
                reader = reader.with_transform_engine(engine);
            }
            reader.parse(content)?;
            reader.finish()
        };
        Ok(ParsedSession { document, report })
    }
}

/// Quick parse function for simple use cases
pub fn parse(content: &str) -> Result<ParsedSession> {
    SessionParser::new().parse(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_session_model::ParseError;

    const TEST_SESSION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sv>
  <data>
    <model id="0" name="Beats" sampleRate="48000" type="sparse" dimensions="1" resolution="512" dataset="1"/>
    <dataset id="1" dimensions="1">
      <point frame="512" label="1"/>
    </dataset>
  </data>
</sv>"#;

    #[test]
    fn test_quick_parse() {
        let session = parse(TEST_SESSION).unwrap();
        assert!(session.report.ok);
        assert_eq!(session.document.model_count(), 1);
    }

    #[test]
    fn test_fatal_error_is_returned() {
        let result = SessionParser::new().parse("<sv><data></sv>");
        assert!(matches!(result, Err(ParseError::Xml { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = SessionParser::new().parse_file("/definitely/not/a/session.sv");
        assert!(matches!(result, Err(ParseError::Io(_))));
    }

    #[test]
    fn test_report_serializes() {
        let session = SessionParser::new()
            .with_strict_view_layers(true)
            .parse(r#"<sv><model id="1" sampleRate="8000" type="sparse" dimensions="1"/></sv>"#)
            .unwrap();
        let json = session.report.to_json().unwrap();
        assert!(json.contains("\"released_models\": 1"));
    }
}
