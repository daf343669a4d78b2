// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reader teardown
//!
//! Reports whatever the session left dangling and gives every model the
//! reader still owns back to the document, once.

use crate::reader::SessionReader;

impl SessionReader<'_> {
    /// Report unfilled expectations and release unadded models
    ///
    /// Runs at most once; [`finish`](SessionReader::finish) and `Drop` both
    /// call it.
    pub(crate) fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;

        let awaiting = self.queues.drain_awaiting();
        if !awaiting.is_empty() {
            let ids: Vec<String> = awaiting.iter().map(|(id, _)| id.to_string()).collect();
            self.report.unfilled_datasets = awaiting.len();
            self.report.advisory(
                None,
                format!("{} dataset(s) never arrived: {}", awaiting.len(), ids.join(", ")),
            );
        }

        for early in self.queues.drain_early() {
            self.report.advisory(
                Some("dataset"),
                format!("dataset {} was never claimed by a model", early.id),
            );
        }

        for record in self.queues.pending_aggregates() {
            self.report.advisory(
                Some("model"),
                format!("aggregate model {} could not be resolved", record.id),
            );
        }

        let unadded = self.registry.drain_unadded();
        if !unadded.is_empty() {
            self.report.released_models = unadded.len();
            self.report.advisory(
                None,
                format!("{} model(s) were never added to the document", unadded.len()),
            );
            for (handle, model) in unadded {
                debug_assert!(!self.registry.is_added(handle), "model {:?} both added and released", handle);
                log::debug!("releasing unadded model {:?} ({})", handle, model.kind());
                self.doc.release_model(handle, model);
            }
        }

        let orphans = self.registry.drain_orphan_paths();
        if !orphans.is_empty() {
            self.report.released_paths = orphans.len();
            for (id, path) in &orphans {
                log::debug!("dropping path {} with {} point(s)", id, path.points.len());
            }
            self.report.advisory(
                None,
                format!("{} path(s) were never used by an alignment", orphans.len()),
            );
        }
    }
}

impl Drop for SessionReader<'_> {
    fn drop(&mut self) {
        self.cleanup();
    }
}
