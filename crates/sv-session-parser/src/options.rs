// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reader configuration

use std::path::PathBuf;

/// Options controlling how a session is read
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReaderOptions {
    /// Load every file-backed waveform at this rate
    pub fixed_sample_rate: Option<f64>,
    /// Give waveforms with no declared rate the main model's rate
    pub resample_on_load: bool,
    /// Reject view-section layers that the data section never declared
    pub strict_view_layers: bool,
    /// Path of the session file itself, for resolving relative audio paths
    pub location: Option<PathBuf>,
}

impl ReaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fixed_sample_rate(mut self, rate: f64) -> Self {
        self.fixed_sample_rate = Some(rate);
        self
    }

    pub fn with_resample_on_load(mut self, enabled: bool) -> Self {
        self.resample_on_load = enabled;
        self
    }

    pub fn with_strict_view_layers(mut self, enabled: bool) -> Self {
        self.strict_view_layers = enabled;
        self
    }

    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Location as a string for source resolvers
    pub fn location_str(&self) -> Option<&str> {
        self.location.as_deref().and_then(|p| p.to_str())
    }

    /// Rate a file-backed waveform should be loaded at
    ///
    /// A fixed rate wins outright. Otherwise a non-main model that declared
    /// no rate takes the main model's rate when resampling on load.
    pub fn effective_sample_rate(&self, declared: f64, is_main: bool, main_rate: Option<f64>) -> f64 {
        if let Some(fixed) = self.fixed_sample_rate {
            return fixed;
        }
        if declared == 0.0 && !is_main && self.resample_on_load {
            if let Some(rate) = main_rate {
                return rate;
            }
        }
        declared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate_policy() {
        let plain = ReaderOptions::new();
        assert_eq!(plain.effective_sample_rate(0.0, false, Some(48000.0)), 0.0);
        assert_eq!(plain.effective_sample_rate(22050.0, false, Some(48000.0)), 22050.0);

        let resample = ReaderOptions::new().with_resample_on_load(true);
        assert_eq!(resample.effective_sample_rate(0.0, false, Some(48000.0)), 48000.0);
        assert_eq!(resample.effective_sample_rate(0.0, true, Some(48000.0)), 0.0);
        assert_eq!(resample.effective_sample_rate(0.0, false, None), 0.0);

        let fixed = ReaderOptions::new()
            .with_resample_on_load(true)
            .with_fixed_sample_rate(16000.0);
        assert_eq!(fixed.effective_sample_rate(44100.0, true, None), 16000.0);
        assert_eq!(fixed.effective_sample_rate(0.0, false, Some(48000.0)), 16000.0);
    }
}
