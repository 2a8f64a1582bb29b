// Copyright 2025 LogCask contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Filter configuration

use crate::probabilistic::FilterKind;

/// Target false positive rate for dictionary and schema filters. At 7%
/// the filter stays a small fraction of the dictionary it guards while
/// still skipping the vast majority of irrelevant archives.
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.07;

/// Build-time configuration for a filter attached to a dictionary or
/// schema section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterConfig {
    /// Which filter implementation to build. `None` disables filtering.
    pub kind: FilterKind,
    /// Target false positive rate.
    pub false_positive_rate: f64,
    /// Lower-case values before insertion and needles before lookup.
    pub normalize: bool,
}

impl FilterConfig {
    pub fn new(kind: FilterKind, false_positive_rate: f64) -> Self {
        Self {
            kind,
            false_positive_rate,
            normalize: false,
        }
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Whether this configuration produces a filter at all.
    pub fn is_enabled(&self) -> bool {
        self.kind != FilterKind::None
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kind: FilterKind::None,
            false_positive_rate: DEFAULT_FALSE_POSITIVE_RATE,
            normalize: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disabled() {
        let config = FilterConfig::default();
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_builder_style() {
        let config = FilterConfig::new(FilterKind::BloomV1, 0.01).with_normalize(true);
        assert!(config.is_enabled());
        assert!(config.normalize);
        assert_eq!(config.false_positive_rate, 0.01);
    }
}
