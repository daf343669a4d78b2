// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for session reading
//!
//! [`ParseError`] is fatal and aborts a parse. [`ElementError`] only fails
//! the element that caused it; the reader logs it and moves on.

use crate::{ExportId, ModelKind};
use thiserror::Error;

/// Result type alias for fatal parser operations
pub type Result<T> = std::result::Result<T, ParseError>;

/// Errors that abort a parse (the document is not well-formed XML)
#[derive(Error, Debug)]
pub enum ParseError {
    /// Malformed XML
    #[error("{message} at line {line}, column {column}")]
    Xml {
        message: String,
        line: usize,
        column: usize,
    },

    /// Input ended while elements were still open
    #[error("Unexpected end of document with {0} element(s) still open")]
    UnexpectedEof(usize),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl ParseError {
    /// Create a new XML error at a line/column position
    pub fn xml(message: impl Into<String>, line: usize, column: usize) -> Self {
        ParseError::Xml {
            message: message.into(),
            line,
            column,
        }
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        ParseError::Other(msg.into())
    }
}

/// Failure to coerce a single attribute
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttrError {
    #[error("missing attribute \"{0}\"")]
    Missing(String),

    #[error("invalid {expected} \"{value}\" for attribute \"{name}\"")]
    Invalid {
        name: String,
        value: String,
        expected: &'static str,
    },
}

impl AttrError {
    pub fn invalid(name: &str, value: &str, expected: &'static str) -> Self {
        AttrError::Invalid {
            name: name.to_string(),
            value: value.to_string(),
            expected,
        }
    }
}

/// Failure to resolve a file-backed model's source
#[derive(Error, Debug, Clone, PartialEq)]
#[error("failed to retrieve \"{path}\": {reason}")]
pub struct SourceError {
    pub path: String,
    pub reason: String,
}

impl SourceError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by the transform engine
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct TransformError(pub String);

/// Recoverable failure of one element
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ElementError {
    #[error(transparent)]
    Attribute(#[from] AttrError),

    #[error("ignoring duplicate model id {0}")]
    DuplicateModelId(ExportId),

    #[error("ignoring duplicate layer id {0} in data section")]
    DuplicateLayerId(ExportId),

    #[error("unexpected model shape: type \"{model_type}\", {dimensions} dimension(s), subtype \"{subtype}\"")]
    UnrecognizedShape {
        model_type: String,
        dimensions: i64,
        subtype: String,
    },

    #[error("unknown model id {0}")]
    UnknownModel(ExportId),

    #[error("aggregate model {aggregate} cannot mix component {component}, a {kind} model")]
    UnmixableComponent {
        aggregate: ExportId,
        component: ExportId,
        kind: String,
    },

    #[error("alignment model {0} refers to unknown models or paths")]
    UnresolvedAlignment(ExportId),

    #[error("unwanted dataset {0}")]
    UnwantedDataset(ExportId),

    #[error("{kind} model has wrong dimensionality or type for {dimensions}-D dataset {dataset}")]
    IncompatibleDataset {
        dataset: ExportId,
        dimensions: i64,
        kind: String,
    },

    #[error("{element} found in {kind} dataset")]
    WrongDatasetKind {
        element: &'static str,
        kind: String,
    },

    #[error("{element} found outside {scope}")]
    OutsideScope {
        element: &'static str,
        scope: &'static str,
    },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("unknown layer type \"{0}\"")]
    UnknownLayerType(String),

    #[error("layer {0} in view section has not been defined")]
    UndefinedViewLayer(ExportId),

    #[error("no current pane for layer {0} in view section")]
    NoCurrentPane(ExportId),

    #[error("support for non-pane view type \"{0}\" is not implemented")]
    UnsupportedView(String),

    #[error("derivation nested inside another derivation")]
    NestedDerivation,

    #[error("play parameters for model {0} not found")]
    PlayParametersMissing(ExportId),

    #[error("ignoring nameless transform parameter")]
    NamelessParameter,

    #[error("unexpected element \"{0}\"")]
    UnknownElement(String),
}

impl ElementError {
    /// Shape error for a `model` element
    pub fn shape(model_type: &str, dimensions: i64, subtype: &str) -> Self {
        ElementError::UnrecognizedShape {
            model_type: model_type.to_string(),
            dimensions,
            subtype: subtype.to_string(),
        }
    }

    pub fn incompatible(dataset: ExportId, dimensions: i64, kind: impl Into<String>) -> Self {
        ElementError::IncompatibleDataset {
            dataset,
            dimensions,
            kind: kind.into(),
        }
    }

    pub fn wrong_kind(element: &'static str, kind: ModelKind) -> Self {
        ElementError::WrongDatasetKind {
            element,
            kind: kind.name().to_string(),
        }
    }
}
