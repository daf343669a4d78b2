// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dataset binding
//!
//! A dataset fills in a model or path declared elsewhere. This module holds
//! the dimensionality table that decides which targets a dataset may fill,
//! and the code that turns `point`, `bin` and `row` elements into content.

use crate::attributes::{parse_float, Attributes};
use memchr::memmem;
use sv_session_model::{
    AttrError, DenseGridModel, ElementError, Event, ExportId, Model, ModelKind, PathPoint,
    RawPath,
};

/// Name used for raw paths in dataset diagnostics
const PATH_KIND: &str = "raw path";

/// Check a dataset's dimensionality against the kind of its target
///
/// `None` stands for a raw path.
pub fn check_compatible(dataset: ExportId, dimensions: i64, target: Option<ModelKind>) -> Result<(), ElementError> {
    let ok = match (dimensions, target) {
        (1, Some(ModelKind::Instants | ModelKind::Image)) => true,
        (2, Some(ModelKind::TimeValues | ModelKind::Text | ModelKind::Boxes) | None) => true,
        (
            3,
            Some(ModelKind::DenseGrid | ModelKind::Notes | ModelKind::FlexiNotes | ModelKind::Regions),
        ) => true,
        _ => false,
    };
    if ok {
        return Ok(());
    }
    let kind = target.map(|k| k.name()).unwrap_or(PATH_KIND);
    Err(ElementError::incompatible(dataset, dimensions, kind))
}

fn label(attrs: &Attributes) -> String {
    attrs.value("label").to_string()
}

fn value_f32(attrs: &Attributes, name: &str) -> Result<f32, AttrError> {
    attrs.float(name).map(|v| v as f32)
}

/// Add one `point` to a sparse model
pub fn add_point(model: &mut Model, attrs: &Attributes) -> Result<(), ElementError> {
    let frame = attrs.int("frame")?;
    let kind = model.kind();
    let event = match model {
        Model::Instants(_) => Event::at(frame).with_label(label(attrs)),
        Model::Image(_) => {
            let event = Event::at(frame).with_label(label(attrs));
            match attrs.get("image") {
                Some(uri) => event.with_uri(uri),
                None => event,
            }
        }
        Model::Text(_) => Event::at(frame)
            .with_value(attrs.opt_float("height").unwrap_or(0.0) as f32)
            .with_label(label(attrs)),
        Model::TimeValues(_) => Event::at(frame)
            .with_value(value_f32(attrs, "value")?)
            .with_label(label(attrs)),
        Model::Boxes(_) => {
            let value = match attrs.opt_float("frequency") {
                Some(v) => v as f32,
                None => value_f32(attrs, "value")?,
            };
            Event::at(frame)
                .with_value(value)
                .with_duration(attrs.int("duration")?)
                .with_extent(attrs.opt_float("extent").unwrap_or(0.0) as f32)
                .with_label(label(attrs))
        }
        Model::Notes(_) | Model::FlexiNotes(_) => Event::at(frame)
            .with_value(value_f32(attrs, "value")?)
            .with_duration(attrs.int("duration")?)
            .with_level(attrs.opt_float("level").unwrap_or(1.0) as f32)
            .with_label(label(attrs)),
        Model::Regions(_) => Event::at(frame)
            .with_value(value_f32(attrs, "value")?)
            .with_duration(attrs.int("duration")?)
            .with_label(label(attrs)),
        Model::WaveFile(_)
        | Model::AggregateWave(_)
        | Model::DenseGrid(_)
        | Model::Alignment(_) => return Err(ElementError::wrong_kind("point", kind)),
    };
    model.add_event(event);
    Ok(())
}

/// Add one `point` to a raw path
pub fn add_path_point(path: &mut RawPath, attrs: &Attributes) -> Result<(), ElementError> {
    path.add(PathPoint {
        frame: attrs.int("frame")?,
        map_frame: attrs.int("mapframe")?,
    });
    Ok(())
}

/// Name one bin of a dense grid
pub fn set_bin(model: &mut Model, attrs: &Attributes) -> Result<(), ElementError> {
    let kind = model.kind();
    let Model::DenseGrid(grid) = model else {
        return Err(ElementError::wrong_kind("bin", kind));
    };
    let number = attrs.uint("number")? as usize;
    grid.set_bin_name(number, attrs.value("name"));
    Ok(())
}

/// Error for a `bin` or `row` aimed at a raw path
pub fn path_rejects(element: &'static str) -> ElementError {
    ElementError::WrongDatasetKind {
        element,
        kind: PATH_KIND.to_string(),
    }
}

/// What happened to the cells of one row
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RowOutcome {
    /// Cells stored in the column
    pub stored: usize,
    /// Numeric cells past the grid height
    pub overflow: usize,
    /// Tokens that were not numbers
    pub bad_tokens: usize,
}

/// Split row text into trimmed, non-empty tokens
///
/// With a separator the text is cut exactly at each occurrence of it;
/// without one, any run of whitespace separates tokens.
pub fn split_row<'t>(text: &'t str, separator: Option<&str>) -> Vec<&'t str> {
    let separator = separator.filter(|s| !s.is_empty());
    let Some(separator) = separator else {
        return text.split_whitespace().collect();
    };

    let mut tokens = Vec::new();
    let mut start = 0;
    for at in memmem::find_iter(text.as_bytes(), separator.as_bytes()) {
        tokens.push(&text[start..at]);
        start = at + separator.len();
    }
    tokens.push(&text[start..]);

    tokens
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Fill column `n` of a dense grid from row text
pub fn fill_row(grid: &mut DenseGridModel, n: usize, text: &str, separator: Option<&str>) -> RowOutcome {
    let mut outcome = RowOutcome::default();
    let tokens = split_row(text, separator);
    let mut values = Vec::with_capacity(tokens.len().min(grid.height));

    for token in tokens {
        match parse_float(token) {
            Some(v) if values.len() < grid.height => values.push(v as f32),
            Some(_) => outcome.overflow += 1,
            None => outcome.bad_tokens += 1,
        }
    }

    outcome.stored = values.len();
    grid.set_column(n, values);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_session_model::{SparseModel, ValueModel};

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        Attributes::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_compatibility_table() {
        let id = ExportId(0);
        assert!(check_compatible(id, 1, Some(ModelKind::Instants)).is_ok());
        assert!(check_compatible(id, 1, Some(ModelKind::Image)).is_ok());
        assert!(check_compatible(id, 2, None).is_ok());
        assert!(check_compatible(id, 2, Some(ModelKind::Boxes)).is_ok());
        assert!(check_compatible(id, 3, Some(ModelKind::DenseGrid)).is_ok());
        assert!(check_compatible(id, 3, Some(ModelKind::Regions)).is_ok());

        assert!(check_compatible(id, 2, Some(ModelKind::Instants)).is_err());
        assert!(check_compatible(id, 1, None).is_err());
        assert!(check_compatible(id, 3, Some(ModelKind::WaveFile)).is_err());
        assert!(check_compatible(id, 4, Some(ModelKind::Notes)).is_err());
    }

    #[test]
    fn test_note_level_defaults() {
        let mut notes = Model::Notes(ValueModel::new(44100.0, 1, false));
        add_point(
            &mut notes,
            &attrs(&[("frame", "100"), ("value", "60"), ("duration", "50"), ("level", "loud")]),
        )
        .unwrap();
        add_point(
            &mut notes,
            &attrs(&[("frame", "10"), ("value", "62"), ("duration", "5"), ("level", "0.5")]),
        )
        .unwrap();

        let events = notes.events().unwrap();
        assert_eq!(events[0].frame, 10);
        assert_eq!(events[0].level, Some(0.5));
        assert_eq!(events[1].level, Some(1.0));

        let missing = add_point(&mut notes, &attrs(&[("frame", "10"), ("value", "62")]));
        assert_eq!(
            missing,
            Err(ElementError::Attribute(AttrError::Missing("duration".into())))
        );
    }

    #[test]
    fn test_box_frequency_fallback() {
        let mut boxes = Model::Boxes(ValueModel::new(44100.0, 1, false));
        add_point(
            &mut boxes,
            &attrs(&[("frame", "0"), ("duration", "10"), ("frequency", "440"), ("value", "1")]),
        )
        .unwrap();
        add_point(
            &mut boxes,
            &attrs(&[("frame", "5"), ("duration", "10"), ("value", "220"), ("extent", "30")]),
        )
        .unwrap();

        let events = boxes.events().unwrap();
        assert_eq!(events[0].value, Some(440.0));
        assert_eq!(events[1].value, Some(220.0));
        assert_eq!(events[1].extent, Some(30.0));
    }

    #[test]
    fn test_points_rejected_by_grids() {
        let mut grid = Model::DenseGrid(DenseGridModel::new(44100.0, 512, 4));
        assert!(matches!(
            add_point(&mut grid, &attrs(&[("frame", "0")])),
            Err(ElementError::WrongDatasetKind { element: "point", .. })
        ));

        let mut instants = Model::Instants(SparseModel::new(44100.0, 1, false));
        assert!(set_bin(&mut instants, &attrs(&[("number", "0"), ("name", "x")])).is_err());
        assert!(set_bin(&mut grid, &attrs(&[("number", "2"), ("name", "C4")])).is_ok());
    }

    #[test]
    fn test_split_row() {
        assert_eq!(split_row(" 1  2\n3 ", None), vec!["1", "2", "3"]);
        assert_eq!(split_row("1, 2,,3,", Some(",")), vec!["1", "2", "3"]);
        assert_eq!(split_row("1::2::3", Some("::")), vec!["1", "2", "3"]);
        assert_eq!(split_row("4 5", Some("")), vec!["4", "5"]);
    }

    #[test]
    fn test_fill_row_aggregates_problems() {
        let mut grid = DenseGridModel::new(44100.0, 512, 3);
        let outcome = fill_row(&mut grid, 2, "0.5:x:1.5:2.5:3.5:nan?", Some(":"));

        assert_eq!(
            outcome,
            RowOutcome {
                stored: 3,
                overflow: 1,
                bad_tokens: 2,
            }
        );
        assert_eq!(grid.column(2), Some(&[0.5, 1.5, 2.5][..]));
    }

    #[test]
    fn test_fill_row_sized_by_tokens() {
        let mut grid = DenseGridModel::new(44100.0, 512, usize::MAX);
        let outcome = fill_row(&mut grid, 0, "1 2", None);

        assert_eq!(outcome.stored, 2);
        assert_eq!(grid.column(0), Some(&[1.0, 2.0][..]));
    }

    #[test]
    fn test_path_points_ordered() {
        let mut path = RawPath::new(44100.0, 1);
        add_path_point(&mut path, &attrs(&[("frame", "200"), ("mapframe", "210")])).unwrap();
        add_path_point(&mut path, &attrs(&[("frame", "100"), ("mapframe", "90")])).unwrap();
        assert!(add_path_point(&mut path, &attrs(&[("frame", "300")])).is_err());

        assert_eq!(path.points[0], PathPoint { frame: 100, map_frame: 90 });
        assert_eq!(path.points.len(), 2);
    }
}
