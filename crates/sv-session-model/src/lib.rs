// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SV-Session Model - Trait definitions and shared types for session reading
//!
//! This crate provides the core abstractions for working with audio
//! annotation session documents: the models a session declares, the layers
//! and panes that display them, and the boundary traits through which a
//! reader hands a finished graph to its owner.
//!
//! # Architecture
//!
//! - [`Model`] - closed sum type over every model variant a session can hold
//! - [`SessionDocument`] - receives models, layers, panes and selections
//! - [`TransformEngine`] - regenerates derived models
//! - [`SourceResolver`] - locates the audio behind file-backed waveforms
//!
//! # Example
//!
//! ```ignore
//! use sv_session_model::{Model, SessionDocument};
//!
//! fn describe(doc: &dyn SessionDocument, handle: ModelHandle) {
//!     if let Some(model) = doc.model(handle) {
//!         println!("{} at {} Hz", model.kind(), model.sample_rate());
//!     }
//! }
//! ```

pub mod error;
pub mod models;
pub mod traits;
pub mod transform;
pub mod types;
pub mod view;

// Re-export all public types
pub use error::*;
pub use models::*;
pub use traits::*;
pub use transform::*;
pub use types::*;
pub use view::*;
