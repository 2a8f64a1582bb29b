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

//! Dictionary filter companion
//!
//! `DictionaryFilterWriter` rides alongside a dictionary writer: every
//! value the dictionary is asked to add is forwarded here verbatim, and
//! when the dictionary closes the accumulated set becomes a filter file
//! next to the dictionary.
//!
//! `DictionaryFilterHook` is the reader side: loaded (or not) before the
//! dictionary's entries, it answers `might_contain` so the reader can skip
//! the dictionary load entirely when no query term can match.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use parking_lot::RwLock;
use tracing::{debug, warn};

use logcask_core::Result;
use logcask_filter::file::{read_filter_file, write_filter_file};
use logcask_filter::probabilistic::{FilterKind, ProbabilisticFilter};
use logcask_filter::FilterConfig;

/// Writer-side companion owning the value set a dictionary filter is built
/// from.
///
/// The set must cover every value ever inserted into the dictionary,
/// including values the dictionary later evicts from its in-memory
/// value→id map (e.g. invariant values stored elsewhere in the archive).
/// Dropping evicted values here would admit false negatives and silently
/// lose search results.
#[derive(Debug)]
pub struct DictionaryFilterWriter {
    config: FilterConfig,
    values: HashSet<Vec<u8>>,
}

impl DictionaryFilterWriter {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            values: HashSet::new(),
        }
    }

    /// Records a value exactly as the dictionary received it. Called for
    /// every `dictionary.add`, never rolled back.
    pub fn record(&mut self, value: &[u8]) {
        if !self.config.is_enabled() {
            return;
        }
        if self.config.normalize {
            self.values.insert(value.to_ascii_lowercase());
        } else {
            self.values.insert(value.to_vec());
        }
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Builds the configured filter over the complete value set and writes
    /// the filter file. Returns the number of bytes written (0 when
    /// filtering is disabled). Consumes the value set.
    pub fn write(&mut self, path: &Path) -> Result<u64> {
        if !self.config.is_enabled() {
            return Ok(0);
        }

        let values: Vec<Vec<u8>> = self.values.drain().collect();
        let filter = ProbabilisticFilter::from_keys(
            self.config.kind,
            &values,
            self.config.false_positive_rate,
        )?;

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        write_filter_file(&mut writer, &self.config, &filter, values.len() as u64)?;
        drop(writer);

        let written = std::fs::metadata(path)?.len();
        debug!(
            path = %path.display(),
            num_values = values.len(),
            bytes = written,
            "wrote dictionary filter"
        );
        Ok(written)
    }
}

struct LoadedFilter {
    filter: ProbabilisticFilter,
    normalize: bool,
}

/// Reader-side observer of a dictionary's filter.
///
/// Owns at most one filter and never exposes it; every lookup goes through
/// [`might_contain`](Self::might_contain). Once loaded the filter is
/// immutable, so concurrent readers share it freely.
#[derive(Default)]
pub struct DictionaryFilterHook {
    loaded: RwLock<Option<LoadedFilter>>,
    enabled: RwLock<bool>,
}

impl DictionaryFilterHook {
    pub fn new() -> Self {
        Self {
            loaded: RwLock::new(None),
            enabled: RwLock::new(true),
        }
    }

    /// Loads a filter file. Failure is non-fatal: the hook records
    /// "absent" and the dictionary falls back to a full load.
    pub fn load(&self, path: &Path) -> bool {
        let result = File::open(path)
            .map_err(Into::into)
            .and_then(|mut file| read_filter_file(&mut file));

        match result {
            Ok((metadata, filter)) if metadata.kind != FilterKind::None => {
                debug!(path = %path.display(), kind = ?metadata.kind, "loaded dictionary filter");
                *self.loaded.write() = Some(LoadedFilter {
                    filter,
                    normalize: metadata.normalize,
                });
                true
            }
            Ok(_) => {
                debug!(path = %path.display(), "dictionary filter file is a placeholder");
                *self.loaded.write() = None;
                false
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to load dictionary filter");
                *self.loaded.write() = None;
                false
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.read().is_some()
    }

    /// Enables or disables filter consultation without dropping the
    /// loaded bytes.
    pub fn set_enabled(&self, enabled: bool) {
        *self.enabled.write() = enabled;
    }

    /// Returns false only when the loaded filter proves `needle` absent.
    /// With no filter loaded, or the hook disabled, everything might
    /// match.
    ///
    /// Filters are byte-exact, so a case-insensitive probe can only be
    /// answered by a filter built over normalized values; against any
    /// other filter it passes unconditionally. A normalized filter
    /// lower-cases the needle before lookup.
    pub fn might_contain(&self, needle: &str, ignore_case: bool) -> bool {
        if !*self.enabled.read() {
            return true;
        }
        let guard = self.loaded.read();
        let Some(loaded) = guard.as_ref() else {
            return true;
        };
        if loaded.normalize {
            loaded.filter.possibly_contains(needle.to_lowercase().as_bytes())
        } else if ignore_case {
            true
        } else {
            loaded.filter.possibly_contains(needle.as_bytes())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::dictionary_filter_path;
    use tempfile::TempDir;

    fn write_filter(dir: &Path, config: FilterConfig, values: &[&str]) -> std::path::PathBuf {
        let mut writer = DictionaryFilterWriter::new(config);
        for value in values {
            writer.record(value.as_bytes());
        }
        let path = dictionary_filter_path(&dir.join("var.dict"));
        let written = writer.write(&path).unwrap();
        assert!(written > 0);
        path
    }

    #[test]
    fn test_writer_then_hook_roundtrip() {
        let dir = TempDir::new().unwrap();
        let config = FilterConfig::new(FilterKind::BloomV1, 0.01);
        let path = write_filter(dir.path(), config, &["alpha", "beta"]);

        let hook = DictionaryFilterHook::new();
        assert!(hook.load(&path));
        assert!(hook.is_loaded());
        assert!(hook.might_contain("alpha", false));
        assert!(hook.might_contain("beta", false));
    }

    #[test]
    fn test_missing_filter_is_nonfatal() {
        let dir = TempDir::new().unwrap();
        let hook = DictionaryFilterHook::new();
        assert!(!hook.load(&dir.path().join("missing.filter")));
        assert!(!hook.is_loaded());
        // Absent filter: everything might match
        assert!(hook.might_contain("anything", false));
    }

    #[test]
    fn test_corrupt_filter_is_nonfatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.filter");
        std::fs::write(&path, b"not a filter file").unwrap();

        let hook = DictionaryFilterHook::new();
        assert!(!hook.load(&path));
        assert!(hook.might_contain("anything", false));
    }

    #[test]
    fn test_disabled_hook_passes_everything() {
        let dir = TempDir::new().unwrap();
        let config = FilterConfig::new(FilterKind::BloomV1, 0.01);
        let path = write_filter(dir.path(), config, &["only"]);

        let hook = DictionaryFilterHook::new();
        assert!(hook.load(&path));
        hook.set_enabled(false);
        assert!(hook.might_contain("definitely-not-present-9999", false));
    }

    #[test]
    fn test_normalized_filter_lowercases_needle() {
        let dir = TempDir::new().unwrap();
        let config = FilterConfig::new(FilterKind::BloomV1, 0.01).with_normalize(true);
        let path = write_filter(dir.path(), config, &["MixedCase"]);

        let hook = DictionaryFilterHook::new();
        assert!(hook.load(&path));
        assert!(hook.might_contain("mixedcase", false));
        assert!(hook.might_contain("MIXEDCASE", true));
    }

    #[test]
    fn test_ignore_case_bypasses_non_normalized_filter() {
        let dir = TempDir::new().unwrap();
        let config = FilterConfig::new(FilterKind::BloomV1, 0.01);
        let path = write_filter(dir.path(), config, &["Error"]);

        let hook = DictionaryFilterHook::new();
        assert!(hook.load(&path));

        // Byte-exact probes are answered exactly
        assert!(hook.might_contain("Error", false));
        assert!(!hook.might_contain("error", false));
        // A case-insensitive probe cannot be refuted by this filter, even
        // for a casing that was never inserted
        assert!(hook.might_contain("error", true));
        assert!(hook.might_contain("ERROR", true));
    }

    #[test]
    fn test_disabled_config_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut writer = DictionaryFilterWriter::new(FilterConfig::default());
        writer.record(b"ignored");
        let path = dir.path().join("none.filter");
        assert_eq!(writer.write(&path).unwrap(), 0);
        assert!(!path.exists());
    }
}
