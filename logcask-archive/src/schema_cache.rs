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

//! Per-schema filters
//!
//! A schema's filters summarize which variable-dictionary ids and which
//! low-cardinality column values its records reference. The writer
//! collects them while rows are appended and persists three sections at
//! close; the reader preloads them into a per-archive cache *before* any
//! packed stream is opened: checking a reader in and out for a filter
//! section is incompatible with concurrent packed-stream checkouts.
//!
//! Sections are zstd-compressed like the archive's other sections.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::debug;

use logcask_core::compression::{compress_section, decompress_section};
use logcask_core::Result;
use logcask_filter::column::{SchemaIntColumnFilter, SchemaStringColumnFilter};
use logcask_filter::probabilistic::{FilterKind, ProbabilisticFilter};

use crate::paths::{schema_int_filter_path, schema_str_filter_path, schema_var_filter_path};

/// Rate for the per-schema variable-id filter; matches the dictionary
/// filter so the two tiers skip at comparable confidence.
const VAR_ID_FILTER_FPR: f64 = 0.07;

/// Writer-side collector for one schema's filters.
#[derive(Debug, Default)]
pub struct SchemaFilterWriter {
    var_ids: HashSet<u64>,
    int_filter: SchemaIntColumnFilter,
    str_filter: SchemaStringColumnFilter,
}

impl SchemaFilterWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a variable-dictionary id referenced by this schema.
    pub fn record_var_id(&mut self, var_id: u64) {
        self.var_ids.insert(var_id);
    }

    /// Records an integer column value.
    pub fn record_int(&mut self, column_id: i32, value: i64) {
        self.int_filter.add_value(column_id, value);
    }

    /// Records a string column value.
    pub fn record_str(&mut self, column_id: i32, value: &[u8]) {
        self.str_filter.add_value(column_id, value);
    }

    /// Persists the three filter sections for `schema_id` under
    /// `archive_dir`. Returns the total compressed bytes written.
    pub fn write(&self, archive_dir: &Path, schema_id: i32) -> Result<u64> {
        let mut total = 0u64;

        // Variable ids are serialized as decimal strings, the same form the
        // query side uses when probing
        let id_strings: Vec<String> = self.var_ids.iter().map(u64::to_string).collect();
        let var_filter = ProbabilisticFilter::from_keys(
            FilterKind::BloomV1,
            &id_strings,
            VAR_ID_FILTER_FPR,
        )?;
        let mut var_bytes = Vec::new();
        var_filter.write(&mut var_bytes)?;
        total += write_section(&schema_var_filter_path(archive_dir, schema_id), &var_bytes)?;

        let mut int_bytes = Vec::new();
        self.int_filter.write_to(&mut int_bytes)?;
        total += write_section(&schema_int_filter_path(archive_dir, schema_id), &int_bytes)?;

        let mut str_bytes = Vec::new();
        self.str_filter.write_to(&mut str_bytes)?;
        total += write_section(&schema_str_filter_path(archive_dir, schema_id), &str_bytes)?;

        debug!(schema_id, var_ids = self.var_ids.len(), bytes = total, "wrote schema filters");
        Ok(total)
    }
}

fn write_section(path: &Path, payload: &[u8]) -> Result<u64> {
    let compressed = compress_section(payload)?;
    std::fs::write(path, &compressed)?;
    Ok(compressed.len() as u64)
}

fn read_section(path: &Path) -> Result<Vec<u8>> {
    let compressed = std::fs::read(path)?;
    decompress_section(&compressed)
}

/// Per-archive cache of schema filters.
///
/// Owned by one worker at a time; after `preload` the cached filters are
/// immutable and may be read without synchronization. `release` drops
/// every cache atomically when the archive reader closes.
#[derive(Default)]
pub struct SchemaFilterCache {
    var_filters: HashMap<i32, ProbabilisticFilter>,
    int_filters: HashMap<i32, SchemaIntColumnFilter>,
    str_filters: HashMap<i32, SchemaStringColumnFilter>,
    enabled: bool,
}

impl SchemaFilterCache {
    pub fn new() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Enables or disables schema filtering for this archive.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Loads the filters for the given schemas. Missing or unreadable
    /// sections leave that schema unfiltered; queries against it pass
    /// conservatively.
    pub fn preload(&mut self, archive_dir: &Path, schema_ids: &[i32]) {
        for &schema_id in schema_ids {
            match read_section(&schema_var_filter_path(archive_dir, schema_id))
                .and_then(|bytes| ProbabilisticFilter::read(&mut bytes.as_slice()))
            {
                Ok(filter) => {
                    self.var_filters.insert(schema_id, filter);
                }
                Err(err) => {
                    debug!(schema_id, %err, "schema var filter unavailable");
                }
            }

            match read_section(&schema_int_filter_path(archive_dir, schema_id))
                .and_then(|bytes| SchemaIntColumnFilter::read_from(&mut bytes.as_slice()))
            {
                Ok(filter) => {
                    self.int_filters.insert(schema_id, filter);
                }
                Err(err) => {
                    debug!(schema_id, %err, "schema int filter unavailable");
                }
            }

            match read_section(&schema_str_filter_path(archive_dir, schema_id))
                .and_then(|bytes| SchemaStringColumnFilter::read_from(&mut bytes.as_slice()))
            {
                Ok(filter) => {
                    self.str_filters.insert(schema_id, filter);
                }
                Err(err) => {
                    debug!(schema_id, %err, "schema str filter unavailable");
                }
            }
        }
    }

    /// Returns true when at least one of `var_ids` might be referenced by
    /// the schema. No cached filter, or an empty id set, passes
    /// conservatively.
    pub fn might_contain(&self, schema_id: i32, var_ids: &[u64]) -> bool {
        if !self.enabled {
            return true;
        }
        let Some(filter) = self.var_filters.get(&schema_id) else {
            return true;
        };
        if var_ids.is_empty() {
            return true;
        }
        var_ids
            .iter()
            .any(|id| filter.possibly_contains(id.to_string().as_bytes()))
    }

    /// Exact check against the schema's integer column filter.
    pub fn int_might_contain(&self, schema_id: i32, column_id: i32, value: i64) -> bool {
        if !self.enabled {
            return true;
        }
        match self.int_filters.get(&schema_id) {
            Some(filter) => filter.contains(column_id, value),
            None => true,
        }
    }

    /// Exact check against the schema's string column filter. The stored
    /// value sets are byte-exact, so a case-insensitive query passes
    /// unconditionally. (Integer checks need no such bypass; integers have
    /// no case form.)
    pub fn str_might_contain(
        &self,
        schema_id: i32,
        column_id: i32,
        value: &[u8],
        ignore_case: bool,
    ) -> bool {
        if !self.enabled || ignore_case {
            return true;
        }
        match self.str_filters.get(&schema_id) {
            Some(filter) => filter.contains(column_id, value),
            None => true,
        }
    }

    pub fn is_preloaded(&self, schema_id: i32) -> bool {
        self.var_filters.contains_key(&schema_id)
    }

    /// Drops every cached filter. Called when the archive reader closes.
    pub fn release(&mut self) {
        self.var_filters.clear();
        self.int_filters.clear();
        self.str_filters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_schema(dir: &Path, schema_id: i32, var_ids: &[u64]) {
        let mut writer = SchemaFilterWriter::new();
        for &id in var_ids {
            writer.record_var_id(id);
        }
        // A low-cardinality int column and a high-cardinality one
        for i in 0..100 {
            writer.record_int(1, i64::from(i % 2));
            writer.record_int(2, i64::from(i));
            writer.record_str(3, if i % 2 == 0 { b"up" } else { b"down" });
        }
        let written = writer.write(dir, schema_id).unwrap();
        assert!(written > 0);
    }

    #[test]
    fn test_preload_and_var_id_check() {
        let dir = TempDir::new().unwrap();
        write_schema(dir.path(), 1, &[10, 20, 30]);

        let mut cache = SchemaFilterCache::new();
        cache.preload(dir.path(), &[1]);
        assert!(cache.is_preloaded(1));

        // Any matching id passes
        assert!(cache.might_contain(1, &[10]));
        assert!(cache.might_contain(1, &[99999, 20]));
    }

    #[test]
    fn test_unloaded_schema_passes() {
        let cache = SchemaFilterCache::new();
        assert!(cache.might_contain(42, &[1, 2, 3]));
        assert!(cache.int_might_contain(42, 0, 7));
        assert!(cache.str_might_contain(42, 0, b"x", false));
    }

    #[test]
    fn test_int_column_checks() {
        let dir = TempDir::new().unwrap();
        write_schema(dir.path(), 5, &[1]);

        let mut cache = SchemaFilterCache::new();
        cache.preload(dir.path(), &[5]);

        // Column 1 was persisted with values {0, 1}
        assert!(cache.int_might_contain(5, 1, 0));
        assert!(cache.int_might_contain(5, 1, 1));
        assert!(!cache.int_might_contain(5, 1, 7));
        // Column 2 was too high-cardinality to persist
        assert!(cache.int_might_contain(5, 2, 7));
    }

    #[test]
    fn test_str_column_checks() {
        let dir = TempDir::new().unwrap();
        write_schema(dir.path(), 6, &[1]);

        let mut cache = SchemaFilterCache::new();
        cache.preload(dir.path(), &[6]);

        assert!(cache.str_might_contain(6, 3, b"up", false));
        assert!(cache.str_might_contain(6, 3, b"down", false));
        assert!(!cache.str_might_contain(6, 3, b"sideways", false));
        // A case-insensitive query cannot be refuted by the byte-exact set
        assert!(cache.str_might_contain(6, 3, b"UP", true));
        assert!(cache.str_might_contain(6, 3, b"sideways", true));
    }

    #[test]
    fn test_disabled_cache_passes_everything() {
        let dir = TempDir::new().unwrap();
        write_schema(dir.path(), 7, &[10]);

        let mut cache = SchemaFilterCache::new();
        cache.preload(dir.path(), &[7]);
        cache.set_enabled(false);
        assert!(cache.might_contain(7, &[424242]));
        assert!(cache.int_might_contain(7, 1, 999));
    }

    #[test]
    fn test_release_drops_caches() {
        let dir = TempDir::new().unwrap();
        write_schema(dir.path(), 8, &[10]);

        let mut cache = SchemaFilterCache::new();
        cache.preload(dir.path(), &[8]);
        assert!(cache.is_preloaded(8));
        cache.release();
        assert!(!cache.is_preloaded(8));
        // After release, checks fall back to conservative
        assert!(cache.might_contain(8, &[424242]));
    }
}
