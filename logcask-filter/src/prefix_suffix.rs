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

//! Prefix/suffix filter
//!
//! Answers single-anchored wildcard queries (`prefix*`, `*suffix`) with a
//! pair of Bloom filters: the forward filter holds every prefix of every
//! key, the reverse filter holds every prefix of every reversed key. An
//! unanchored `*infix*` query cannot be answered and always passes.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use logcask_core::{LogCaskError, Result};

use crate::bloom::BloomFilter;
use crate::probabilistic::FilterKind;

/// Prefixes shorter than this are not indexed ("a", "ab" would saturate
/// the filter with near-universal entries).
const MIN_LENGTH: usize = 3;

/// Index every Nth prefix length. 1 = all.
const STRIDE: usize = 1;

#[derive(Debug, Clone, Default)]
pub struct PrefixSuffixFilter {
    forward: BloomFilter,
    reverse: BloomFilter,
}

/// Capacity estimate per key when the key set is not known up front.
const ASSUMED_AVG_KEY_LENGTH: usize = 32;

impl PrefixSuffixFilter {
    /// Creates an empty filter sized for incremental insertion of
    /// `expected_num_elements` keys of roughly average length.
    pub fn new(expected_num_elements: u64, false_positive_rate: f64) -> Self {
        let items_per_key = ((ASSUMED_AVG_KEY_LENGTH - MIN_LENGTH) / STRIDE + 1) as u64;
        let total_capacity = expected_num_elements * items_per_key;
        Self {
            forward: BloomFilter::new(total_capacity, false_positive_rate),
            reverse: BloomFilter::new(total_capacity, false_positive_rate),
        }
    }

    /// Builds the filter over a complete key set. Capacity is computed
    /// exactly from the prefix counts before any insertion.
    pub fn from_keys<K: AsRef<[u8]>>(keys: &[K], false_positive_rate: f64) -> Self {
        let mut total_items = 0u64;
        for key in keys {
            let len = key.as_ref().len();
            if len >= MIN_LENGTH {
                total_items += ((len - MIN_LENGTH) / STRIDE + 1) as u64;
            }
        }
        if total_items == 0 {
            total_items = keys.len() as u64;
        }

        let mut filter = Self {
            forward: BloomFilter::new(total_items, false_positive_rate),
            reverse: BloomFilter::new(total_items, false_positive_rate),
        };
        for key in keys {
            filter.add(key.as_ref());
        }
        filter
    }

    /// Inserts `value` and its reversal into the two inner filters.
    pub fn add(&mut self, value: &[u8]) {
        if value.is_empty() {
            return;
        }
        Self::add_prefixes(value, &mut self.forward);

        let reversed: Vec<u8> = value.iter().rev().copied().collect();
        Self::add_prefixes(&reversed, &mut self.reverse);
    }

    fn add_prefixes(value: &[u8], filter: &mut BloomFilter) {
        if value.len() < MIN_LENGTH {
            // Too short to prefix-index; store the exact value so exact
            // queries still find it
            filter.add(value);
            return;
        }

        let mut len = MIN_LENGTH;
        while len <= value.len() {
            filter.add(&value[..len]);
            len += STRIDE;
        }
        // The stride may have skipped the full value
        if (value.len() - MIN_LENGTH) % STRIDE != 0 {
            filter.add(value);
        }
    }

    /// Evaluates a possibly-wildcarded query:
    ///
    /// - `*infix*`: unanswerable, always passes
    /// - `*suffix`: reversed suffix against the reverse filter
    /// - `prefix*`: prefix against the forward filter
    /// - exact: value against the forward filter
    pub fn possibly_contains(&self, value: &[u8]) -> bool {
        if self.is_empty() {
            return false;
        }

        let has_start_wildcard = value.first() == Some(&b'*');
        let has_end_wildcard = value.last() == Some(&b'*');

        if has_start_wildcard && has_end_wildcard {
            return true;
        }

        if has_start_wildcard {
            let suffix = &value[1..];
            let reversed: Vec<u8> = suffix.iter().rev().copied().collect();
            return self.reverse.possibly_contains(&reversed);
        }

        if has_end_wildcard {
            let prefix = &value[..value.len() - 1];
            return self.forward.possibly_contains(prefix);
        }

        self.forward.possibly_contains(value)
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.forward.memory_usage() + self.reverse.memory_usage()
    }

    /// Writes the filter body. The kind tag byte is written by the caller;
    /// each inner Bloom filter carries its own tag.
    pub fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(FilterKind::BloomV1 as u8)?;
        self.forward.write_body(writer)?;
        writer.write_u8(FilterKind::BloomV1 as u8)?;
        self.reverse.write_body(writer)?;
        Ok(())
    }

    /// Reads the filter body, after the outer kind tag has been consumed.
    pub fn read_body<R: Read>(reader: &mut R) -> Result<Self> {
        let forward = Self::read_inner(reader)?;
        let reverse = Self::read_inner(reader)?;
        Ok(Self { forward, reverse })
    }

    fn read_inner<R: Read>(reader: &mut R) -> Result<BloomFilter> {
        let tag = reader.read_u8()?;
        if tag != FilterKind::BloomV1 as u8 {
            return Err(LogCaskError::FilterFormatInvalid(format!(
                "prefix/suffix inner filter has tag {tag}, expected bloom"
            )));
        }
        BloomFilter::read_body(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sys_filter() -> PrefixSuffixFilter {
        PrefixSuffixFilter::from_keys(&["syserror", "sysinfo"], 0.01)
    }

    #[test]
    fn test_prefix_wildcard() {
        let filter = sys_filter();
        assert!(filter.possibly_contains(b"sys*"));
        assert!(filter.possibly_contains(b"syserr*"));
    }

    #[test]
    fn test_suffix_wildcard() {
        let filter = sys_filter();
        assert!(filter.possibly_contains(b"*error"));
        assert!(filter.possibly_contains(b"*info"));
    }

    #[test]
    fn test_infix_always_passes() {
        let filter = sys_filter();
        assert!(filter.possibly_contains(b"*inf*"));
        assert!(filter.possibly_contains(b"*nomatch*"));
    }

    #[test]
    fn test_absent_prefix_rejected() {
        let filter = sys_filter();
        assert!(!filter.possibly_contains(b"xxx*"));
    }

    #[test]
    fn test_exact_match() {
        let filter = sys_filter();
        assert!(filter.possibly_contains(b"syserror"));
        assert!(filter.possibly_contains(b"sysinfo"));
    }

    #[test]
    fn test_short_keys_exact_only() {
        let filter = PrefixSuffixFilter::from_keys(&["ab"], 0.01);
        assert!(filter.possibly_contains(b"ab"));
    }

    #[test]
    fn test_empty_filter_rejects() {
        let filter = PrefixSuffixFilter::from_keys::<&str>(&[], 0.01);
        assert!(filter.is_empty());
        assert!(!filter.possibly_contains(b"sys*"));
    }

    #[test]
    fn test_body_roundtrip_preserves_answers() {
        let filter = sys_filter();
        let mut buf = Vec::new();
        filter.write_body(&mut buf).unwrap();
        let restored = PrefixSuffixFilter::read_body(&mut buf.as_slice()).unwrap();

        for probe in ["sys*", "*error", "*inf*", "xxx*", "syserror"] {
            assert_eq!(
                filter.possibly_contains(probe.as_bytes()),
                restored.possibly_contains(probe.as_bytes()),
            );
        }
    }
}
