// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared test doubles

use crate::document::Document;
use crate::reader::SessionReader;
use crate::report::ParseReport;
use sv_session_model::{
    AudioSource, Event, Model, SourceError, SourceResolver, SparseModel, Transform,
    TransformEngine, TransformError, TransformOutput,
};

/// Resolves every path except those containing "missing"
pub struct AnyResolver;

impl SourceResolver for AnyResolver {
    fn resolve(&self, requested: &str, _location: Option<&str>) -> Result<AudioSource, SourceError> {
        if requested.contains("missing") {
            return Err(SourceError::new(requested, "file not found"));
        }
        Ok(AudioSource {
            location: format!("/audio/{}", requested),
            remote: false,
        })
    }
}

/// Engine producing one labelled instant per run
#[derive(Default)]
pub struct CountingEngine {
    pub runs: usize,
    pub fail: bool,
    pub message: Option<String>,
}

impl TransformEngine for CountingEngine {
    fn run(&mut self, transform: &Transform, source: &Model, _channel: i32) -> Result<TransformOutput, TransformError> {
        self.runs += 1;
        if self.fail {
            return Err(TransformError("plugin not installed".into()));
        }
        let mut model = SparseModel::new(source.sample_rate(), transform.step_size.max(1), false);
        model.events.push(Event::at(0).with_label(transform.identifier.clone()));
        Ok(TransformOutput {
            model: Model::Instants(model),
            message: self.message.clone(),
        })
    }
}

/// Read a session into a fresh document with default options
pub fn read(xml: &str) -> (Document, ParseReport) {
    let mut doc = Document::new();
    let report = {
        let mut reader = SessionReader::new(&mut doc).with_source_resolver(AnyResolver);
        let _ = reader.parse(xml);
        reader.finish()
    };
    (doc, report)
}

/// Model of a document by name
pub fn model_named<'d>(doc: &'d Document, name: &str) -> Option<&'d Model> {
    doc.models().map(|(_, m)| m).find(|m| m.name() == name)
}
