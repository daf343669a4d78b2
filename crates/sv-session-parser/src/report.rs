// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parse report
//!
//! Everything the reader has to say about a session ends up here, one
//! [`Diagnostic`] per problem. Each entry is also forwarded to the `log`
//! facade as it is recorded.

use serde::{Deserialize, Serialize};

/// How bad a diagnostic is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Malformed XML; the parse was aborted
    Fatal,
    /// One element was skipped
    Warning,
    /// Informational; nothing was skipped
    Advisory,
}

/// A single message about the session being read
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Element the message concerns, if any
    pub element: Option<String>,
    pub message: String,
}

/// Outcome of reading one session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParseReport {
    /// False only after a fatal XML error
    pub ok: bool,
    /// Human-readable description of the fatal error
    pub error: Option<String>,
    /// Some part of the session (typically audio) could not be loaded
    pub incomplete: bool,
    pub diagnostics: Vec<Diagnostic>,
    /// Models built but never handed to the document
    pub released_models: usize,
    /// Raw paths no alignment used
    pub released_paths: usize,
    /// Datasets some model asked for that never arrived
    pub unfilled_datasets: usize,
}

impl Default for ParseReport {
    fn default() -> Self {
        Self {
            ok: true,
            error: None,
            incomplete: false,
            diagnostics: Vec::new(),
            released_models: 0,
            released_paths: 0,
            unfilled_datasets: 0,
        }
    }
}

impl ParseReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic and log it
    pub fn push(&mut self, diagnostic: Diagnostic) {
        let element = diagnostic.element.as_deref().unwrap_or("-");
        match diagnostic.severity {
            Severity::Fatal => log::error!("{}", diagnostic.message),
            Severity::Warning => log::warn!("<{}>: {}", element, diagnostic.message),
            Severity::Advisory => log::info!("{}", diagnostic.message),
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn warning(&mut self, element: Option<&str>, message: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Warning,
            element: element.map(str::to_string),
            message: message.into(),
        });
    }

    pub fn advisory(&mut self, element: Option<&str>, message: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Advisory,
            element: element.map(str::to_string),
            message: message.into(),
        });
    }

    /// Mark the parse failed with a fatal error
    pub fn fatal(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.ok = false;
        self.error = Some(message.clone());
        self.push(Diagnostic {
            severity: Severity::Fatal,
            element: None,
            message,
        });
    }

    /// Diagnostics of one severity
    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.severity == severity)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.with_severity(Severity::Warning)
    }

    /// Whether any diagnostic message contains `needle`
    pub fn mentions(&self, needle: &str) -> bool {
        self.diagnostics.iter().any(|d| d.message.contains(needle))
    }

    /// Serialize the report as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
