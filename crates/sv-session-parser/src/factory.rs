// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity factory
//!
//! Picks the concrete model variant for a `model` element from its
//! `(type, dimensions, subtype)` triple. Variants that reference other
//! entities (aggregates and alignments) come back as declarations for the
//! reader to resolve against the registry.

use crate::attributes::{parse_export_id, Attributes};
use crate::options::ReaderOptions;
use crate::pending::PendingAggregate;
use sv_session_model::{
    AttrError, DenseGridModel, ElementError, ExportId, Model, RawPath, SourceResolver,
    SparseModel, ValueModel, WaveFileModel,
};

/// What a `model` element turned out to declare
#[derive(Debug)]
pub enum Declaration {
    /// A self-contained model, ready for the registry
    Model {
        model: Model,
        main: bool,
        dataset: Option<ExportId>,
    },
    /// A raw path for alignment data
    Path {
        path: RawPath,
        dataset: Option<ExportId>,
    },
    /// An aggregate whose components may not exist yet
    Aggregate(PendingAggregate),
    /// An alignment between two models via a path
    Alignment {
        name: String,
        sample_rate: f64,
        reference: ExportId,
        aligned: ExportId,
        path: ExportId,
    },
}

/// Collaborators the factory needs besides the attributes
pub struct FactoryContext<'a> {
    pub resolver: &'a dyn SourceResolver,
    pub options: &'a ReaderOptions,
    /// Sample rate of the current main model
    pub main_rate: Option<f64>,
}

/// Build the declaration for one `model` element
pub fn declare(attrs: &Attributes, ctx: &FactoryContext<'_>) -> Result<(ExportId, Declaration), ElementError> {
    let id = attrs.export_id("id")?;
    let sample_rate = attrs.float("sampleRate")?;
    let name = attrs.value("name").to_string();
    let model_type = attrs.value("type").trim().to_ascii_lowercase();

    let declaration = match model_type.as_str() {
        "wavefile" => wave_file(attrs, ctx, name, sample_rate)?,
        "aggregatewave" => Declaration::Aggregate(PendingAggregate {
            id,
            name,
            sample_rate,
            components: component_ids(attrs)?,
        }),
        "dense" => dense(attrs, name, sample_rate)?,
        "sparse" => sparse(attrs, name, sample_rate)?,
        "alignment" => Declaration::Alignment {
            name,
            sample_rate,
            reference: attrs.export_id("reference")?,
            aligned: attrs.export_id("aligned")?,
            path: attrs.export_id("path")?,
        },
        other => {
            return Err(ElementError::shape(
                other,
                attrs.opt_int("dimensions").unwrap_or(0),
                attrs.value("subtype"),
            ))
        }
    };
    Ok((id, declaration))
}

/// Resolve the audio source and build the waveform; blocks on the resolver
fn wave_file(
    attrs: &Attributes,
    ctx: &FactoryContext<'_>,
    name: String,
    declared_rate: f64,
) -> Result<Declaration, ElementError> {
    let file = attrs
        .text("file")
        .ok_or_else(|| AttrError::Missing("file".into()))?;
    let main = attrs.flag("mainModel");
    let source = ctx.resolver.resolve(file, ctx.options.location_str())?;
    let sample_rate = ctx
        .options
        .effective_sample_rate(declared_rate, main, ctx.main_rate);

    Ok(Declaration::Model {
        model: Model::WaveFile(WaveFileModel {
            name,
            sample_rate,
            original_path: file.to_string(),
            location: source.location,
        }),
        main,
        dataset: None,
    })
}

/// Parse a comma-separated component list, keeping declaration order
fn component_ids(attrs: &Attributes) -> Result<Vec<ExportId>, ElementError> {
    let raw = attrs
        .text("components")
        .ok_or_else(|| AttrError::Missing("components".into()))?;
    raw.split(',')
        .map(|part| {
            parse_export_id(part)
                .ok_or_else(|| ElementError::from(AttrError::invalid("components", raw, "id list")))
        })
        .collect()
}

fn dense(attrs: &Attributes, name: String, sample_rate: f64) -> Result<Declaration, ElementError> {
    let dimensions = attrs.int("dimensions")?;
    if dimensions != 3 {
        return Err(ElementError::shape("dense", dimensions, attrs.value("subtype")));
    }
    let resolution = attrs.uint("windowSize")?;
    let height = attrs.uint("yBinCount")? as usize;

    let mut grid = DenseGridModel::new(sample_rate, resolution, height);
    grid.name = name;
    grid.minimum = attrs.opt_float("minimum").map(|v| v as f32);
    grid.maximum = attrs.opt_float("maximum").map(|v| v as f32);
    grid.start_frame = attrs.opt_int("startFrame").unwrap_or(0);

    Ok(Declaration::Model {
        model: Model::DenseGrid(grid),
        main: false,
        dataset: attrs.opt_export_id("dataset"),
    })
}

fn sparse(attrs: &Attributes, name: String, sample_rate: f64) -> Result<Declaration, ElementError> {
    let dimensions = attrs.int("dimensions")?;
    let subtype = attrs.value("subtype").trim().to_ascii_lowercase();
    let resolution = attrs.opt_uint("resolution").unwrap_or(1).max(1);
    let notify = attrs.flag("notifyOnAdd");
    let dataset = attrs.opt_export_id("dataset");

    let plain = || {
        let mut m = SparseModel::new(sample_rate, resolution, notify);
        m.name = name.clone();
        m
    };
    let valued = || {
        let mut m = ValueModel::new(sample_rate, resolution, notify);
        m.name = name.clone();
        m.minimum = attrs.opt_float("minimum").map(|v| v as f32);
        m.maximum = attrs.opt_float("maximum").map(|v| v as f32);
        m.units = attrs.value("units").to_string();
        m.value_quantization = attrs.opt_float("valueQuantization").unwrap_or(0.0) as f32;
        m
    };

    let model = match (dimensions, subtype.as_str()) {
        (1, "image") => Model::Image(plain()),
        (1, _) => Model::Instants(plain()),
        (2, "path") => {
            return Ok(Declaration::Path {
                path: RawPath::new(sample_rate, resolution),
                dataset,
            })
        }
        (2, "box" | "timefrequencybox") => Model::Boxes(valued()),
        (2, "text") => Model::Text(plain()),
        (2, _) => Model::TimeValues(valued()),
        (3, "region") => Model::Regions(valued()),
        (3, "flexinote") => Model::FlexiNotes(valued()),
        // Older files write notes without a subtype
        (3, "note" | "") => Model::Notes(valued()),
        _ => return Err(ElementError::shape("sparse", dimensions, &subtype)),
    };

    Ok(Declaration::Model {
        model,
        main: false,
        dataset,
    })
}
