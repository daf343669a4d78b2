// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Local audio source resolution

use std::path::{Path, PathBuf};
use sv_session_model::{AudioSource, SourceError, SourceResolver};

const FILE_SCHEME: &str = "file://";

/// Resolves audio paths on the local filesystem
///
/// Relative paths are taken relative to the session file's directory. An
/// absolute path that no longer exists is retried as a bare file name next
/// to the session, which finds audio moved together with its session.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFileResolver;

impl LocalFileResolver {
    pub fn new() -> Self {
        Self
    }

    fn candidates(requested: &Path, location: Option<&Path>) -> Vec<PathBuf> {
        let session_dir = location.and_then(Path::parent);
        let mut candidates = Vec::new();

        if requested.is_absolute() {
            candidates.push(requested.to_path_buf());
            if let (Some(dir), Some(name)) = (session_dir, requested.file_name()) {
                candidates.push(dir.join(name));
            }
        } else {
            if let Some(dir) = session_dir {
                candidates.push(dir.join(requested));
            }
            candidates.push(requested.to_path_buf());
        }
        candidates
    }
}

/// Whether a string names a remote resource
fn is_remote(requested: &str) -> bool {
    match requested.find("://") {
        Some(at) => {
            let scheme = &requested[..at];
            !scheme.eq_ignore_ascii_case("file") && scheme.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

impl SourceResolver for LocalFileResolver {
    fn resolve(&self, requested: &str, location: Option<&str>) -> Result<AudioSource, SourceError> {
        if is_remote(requested) {
            return Err(SourceError::new(requested, "remote sources are not supported"));
        }
        let local = requested.strip_prefix(FILE_SCHEME).unwrap_or(requested);
        let location = location.map(|l| Path::new(l.strip_prefix(FILE_SCHEME).unwrap_or(l)));

        Self::candidates(Path::new(local), location)
            .into_iter()
            .find(|p| p.is_file())
            .map(|found| AudioSource {
                location: found.to_string_lossy().into_owned(),
                remote: false,
            })
            .ok_or_else(|| SourceError::new(requested, "file not found"))
    }
}
