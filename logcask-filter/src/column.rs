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

//! Per-schema exact column-value filters
//!
//! Observes `(column_id, value)` pairs during schema writing and keeps the
//! exact distinct-value set per column. At close, only low-cardinality
//! columns (those whose distinct count is at most `threshold` of the
//! total insertions) are persisted; they are the columns whose entire
//! value set fits in bounded memory. Queries on columns that were not
//! persisted answer "might contain".

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use logcask_core::Result;

/// A column is persisted when `distinct / insertions ≤ threshold`.
pub const DEFAULT_SELECTION_THRESHOLD: f64 = 1.0 / 100.0;

/// Exact value-set filter for integer columns.
#[derive(Debug, Clone)]
pub struct SchemaIntColumnFilter {
    column_values: HashMap<i32, HashSet<i64>>,
    column_counts: HashMap<i32, u64>,
    threshold: f64,
}

impl Default for SchemaIntColumnFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaIntColumnFilter {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_SELECTION_THRESHOLD)
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            column_values: HashMap::new(),
            column_counts: HashMap::new(),
            threshold,
        }
    }

    pub fn add_value(&mut self, column_id: i32, value: i64) {
        self.column_values.entry(column_id).or_default().insert(value);
        *self.column_counts.entry(column_id).or_insert(0) += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.column_values.is_empty()
    }

    /// Returns true if the column might contain `value`. A column that was
    /// not persisted (high cardinality, or never observed) always answers
    /// true.
    pub fn contains(&self, column_id: i32, value: i64) -> bool {
        match self.column_values.get(&column_id) {
            Some(values) => values.contains(&value),
            None => true,
        }
    }

    /// Serializes the selected (low-cardinality) columns.
    ///
    /// Layout: `u32 num_columns`, then per column `i32 column_id`,
    /// `u64 num_values`, `i64` values.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut selected: Vec<(i32, &HashSet<i64>)> = self
            .column_values
            .iter()
            .filter_map(|(&column_id, values)| {
                let count = self.column_counts.get(&column_id).copied().unwrap_or(0);
                if count == 0 {
                    return None;
                }
                let ratio = values.len() as f64 / count as f64;
                (ratio <= self.threshold).then_some((column_id, values))
            })
            .collect();
        selected.sort_by_key(|(column_id, _)| *column_id);

        writer.write_u32::<LittleEndian>(selected.len() as u32)?;
        for (column_id, values) in selected {
            writer.write_i32::<LittleEndian>(column_id)?;
            writer.write_u64::<LittleEndian>(values.len() as u64)?;
            let mut sorted: Vec<i64> = values.iter().copied().collect();
            sorted.sort_unstable();
            for value in sorted {
                writer.write_i64::<LittleEndian>(value)?;
            }
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut filter = Self::new();
        let num_columns = reader.read_u32::<LittleEndian>()?;
        for _ in 0..num_columns {
            let column_id = reader.read_i32::<LittleEndian>()?;
            let num_values = reader.read_u64::<LittleEndian>()?;
            let values = filter.column_values.entry(column_id).or_default();
            for _ in 0..num_values {
                values.insert(reader.read_i64::<LittleEndian>()?);
            }
            // Counts only matter at build time
            filter.column_counts.insert(column_id, 0);
        }
        Ok(filter)
    }
}

/// Exact value-set filter for string columns.
#[derive(Debug, Clone)]
pub struct SchemaStringColumnFilter {
    column_values: HashMap<i32, HashSet<Vec<u8>>>,
    column_counts: HashMap<i32, u64>,
    threshold: f64,
}

impl Default for SchemaStringColumnFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaStringColumnFilter {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_SELECTION_THRESHOLD)
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            column_values: HashMap::new(),
            column_counts: HashMap::new(),
            threshold,
        }
    }

    pub fn add_value(&mut self, column_id: i32, value: &[u8]) {
        self.column_values
            .entry(column_id)
            .or_default()
            .insert(value.to_vec());
        *self.column_counts.entry(column_id).or_insert(0) += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.column_values.is_empty()
    }

    /// Returns true if the column might contain `value`; non-persisted
    /// columns always answer true.
    pub fn contains(&self, column_id: i32, value: &[u8]) -> bool {
        match self.column_values.get(&column_id) {
            Some(values) => values.contains(value),
            None => true,
        }
    }

    /// Serializes the selected columns.
    ///
    /// Layout: `u32 num_columns`, then per column `i32 column_id`,
    /// `u64 num_values`, length-prefixed (`u64`) byte strings.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut selected: Vec<(i32, &HashSet<Vec<u8>>)> = self
            .column_values
            .iter()
            .filter_map(|(&column_id, values)| {
                let count = self.column_counts.get(&column_id).copied().unwrap_or(0);
                if count == 0 {
                    return None;
                }
                let ratio = values.len() as f64 / count as f64;
                (ratio <= self.threshold).then_some((column_id, values))
            })
            .collect();
        selected.sort_by_key(|(column_id, _)| *column_id);

        writer.write_u32::<LittleEndian>(selected.len() as u32)?;
        for (column_id, values) in selected {
            writer.write_i32::<LittleEndian>(column_id)?;
            writer.write_u64::<LittleEndian>(values.len() as u64)?;
            let mut sorted: Vec<&Vec<u8>> = values.iter().collect();
            sorted.sort_unstable();
            for value in sorted {
                writer.write_u64::<LittleEndian>(value.len() as u64)?;
                writer.write_all(value)?;
            }
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut filter = Self::new();
        let num_columns = reader.read_u32::<LittleEndian>()?;
        for _ in 0..num_columns {
            let column_id = reader.read_i32::<LittleEndian>()?;
            let num_values = reader.read_u64::<LittleEndian>()?;
            let values = filter.column_values.entry(column_id).or_default();
            for _ in 0..num_values {
                let len = reader.read_u64::<LittleEndian>()?;
                let mut value = vec![0u8; len as usize];
                reader.read_exact(&mut value)?;
                values.insert(value);
            }
            filter.column_counts.insert(column_id, 0);
        }
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_cardinality_column_persisted() {
        let mut filter = SchemaIntColumnFilter::with_threshold(0.05);
        // 2 distinct values over 100 insertions: ratio 0.02, persisted
        for i in 0..100 {
            filter.add_value(7, i64::from(i % 2));
        }

        let mut buf = Vec::new();
        filter.write_to(&mut buf).unwrap();
        let restored = SchemaIntColumnFilter::read_from(&mut buf.as_slice()).unwrap();

        assert!(restored.contains(7, 0));
        assert!(restored.contains(7, 1));
        assert!(!restored.contains(7, 2));
    }

    #[test]
    fn test_high_cardinality_column_dropped() {
        let mut filter = SchemaIntColumnFilter::with_threshold(0.05);
        // Every insertion distinct: ratio 1.0, not persisted
        for i in 0..100 {
            filter.add_value(3, i64::from(i));
        }

        let mut buf = Vec::new();
        filter.write_to(&mut buf).unwrap();
        let restored = SchemaIntColumnFilter::read_from(&mut buf.as_slice()).unwrap();

        assert!(restored.is_empty());
        // Non-persisted columns are conservative
        assert!(restored.contains(3, 12345));
    }

    #[test]
    fn test_selection_is_per_column() {
        let mut filter = SchemaIntColumnFilter::with_threshold(0.05);
        for i in 0..100 {
            filter.add_value(1, i64::from(i % 2)); // persisted
            filter.add_value(2, i64::from(i)); // dropped
        }

        let mut buf = Vec::new();
        filter.write_to(&mut buf).unwrap();
        let restored = SchemaIntColumnFilter::read_from(&mut buf.as_slice()).unwrap();

        assert!(!restored.contains(1, 5));
        assert!(restored.contains(2, 5));
    }

    #[test]
    fn test_unobserved_column_is_conservative() {
        let filter = SchemaIntColumnFilter::new();
        assert!(filter.contains(99, 1));
    }

    #[test]
    fn test_string_filter_roundtrip() {
        let mut filter = SchemaStringColumnFilter::with_threshold(0.1);
        for _ in 0..50 {
            filter.add_value(4, b"up");
            filter.add_value(4, b"down");
        }

        let mut buf = Vec::new();
        filter.write_to(&mut buf).unwrap();
        let restored = SchemaStringColumnFilter::read_from(&mut buf.as_slice()).unwrap();

        assert!(restored.contains(4, b"up"));
        assert!(restored.contains(4, b"down"));
        assert!(!restored.contains(4, b"sideways"));
        assert!(restored.contains(9, b"anything"));
    }

    #[test]
    fn test_empty_filter_serializes_no_columns() {
        let filter = SchemaStringColumnFilter::new();
        let mut buf = Vec::new();
        filter.write_to(&mut buf).unwrap();
        assert_eq!(buf, 0u32.to_le_bytes().to_vec());
    }
}
