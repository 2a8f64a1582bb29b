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

//! N-gram prefix filter
//!
//! Keys are grouped by length into separate inner filters. Long keys are
//! decomposed into fixed-width n-grams and the inner filter is built over
//! the distinct grams; short keys (below the gram width) are stored whole.
//! A query passes only if every one of its n-grams passes the inner filter
//! for its length class, so a single missing gram rejects the whole query.
//!
//! The gram width `n` is derived from the key count and alphabet size to
//! keep the expected gram collision rate under a configured bound.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, warn};

use logcask_core::{LogCaskError, Result};

use crate::policy::BloomFilterPolicy;
use crate::probabilistic::{FilterKind, ProbabilisticFilter};

/// Bound on the expected n-gram collision rate used to derive `n`.
const TARGET_COLLISION_RATE: f64 = 0.01;

/// Assumed alphabet size of dictionary values.
const ALPHABET_SIZE: f64 = 26.0;

#[derive(Debug, Clone, Default)]
pub struct NGramPrefixFilter {
    n: u32,
    length_filters: HashMap<u32, ProbabilisticFilter>,
}

impl NGramPrefixFilter {
    /// Builds the filter over a complete key set.
    pub fn from_keys<K: AsRef<[u8]>>(keys: &[K], false_positive_rate: f64) -> Result<Self> {
        let mut length_key_map: HashMap<u32, HashSet<&[u8]>> = HashMap::new();
        for key in keys {
            let key = key.as_ref();
            length_key_map.entry(key.len() as u32).or_default().insert(key);
        }

        let n = Self::calculate_n(&length_key_map);
        let mut length_filters = HashMap::with_capacity(length_key_map.len());

        for (&length, key_set) in &length_key_map {
            let filter = if n == 0 || length < n {
                Self::build_inner(key_set.iter().copied(), false_positive_rate)?
            } else {
                let mut ngram_set: HashSet<&[u8]> = HashSet::new();
                for key in key_set {
                    for gram in key.windows(n as usize) {
                        ngram_set.insert(gram);
                    }
                }
                if ngram_set.is_empty() {
                    Self::build_inner(key_set.iter().copied(), false_positive_rate)?
                } else {
                    let per_ngram_fpr = Self::per_ngram_fpr(
                        false_positive_rate,
                        key_set.len() as u32,
                        ngram_set.len() as u32,
                    );
                    debug!(
                        length,
                        keys = key_set.len(),
                        ngrams = ngram_set.len(),
                        per_ngram_fpr,
                        "building n-gram class filter"
                    );
                    Self::build_inner(ngram_set.iter().copied(), per_ngram_fpr)?
                }
            };
            length_filters.insert(length, filter);
        }

        Ok(Self { n, length_filters })
    }

    /// The gram width in use; zero when the filter was built empty.
    pub fn n(&self) -> u32 {
        self.n
    }

    /// Inner filters are binary fuse; an unpeelable gram set falls back to
    /// a Bloom filter at the same target rate rather than failing the
    /// whole build.
    fn build_inner<'a>(
        keys: impl IntoIterator<Item = &'a [u8]>,
        false_positive_rate: f64,
    ) -> Result<ProbabilisticFilter> {
        let keys: Vec<&[u8]> = keys.into_iter().collect();
        match ProbabilisticFilter::from_keys(FilterKind::BinaryFuse, &keys, false_positive_rate) {
            Ok(filter) => Ok(filter),
            Err(LogCaskError::FilterConstructionFailed(reason)) => {
                warn!(%reason, "fuse construction failed, falling back to bloom");
                ProbabilisticFilter::from_keys(FilterKind::BloomV1, &keys, false_positive_rate)
            }
            Err(err) => Err(err),
        }
    }

    /// Derives `n` so the expected gram collision rate stays under the
    /// target: `n ≈ log_A(K / -ln(1 - T))`, clamped to `[1, ⌊avg_len⌋]`.
    fn calculate_n(length_key_map: &HashMap<u32, HashSet<&[u8]>>) -> u32 {
        let mut total_length = 0u64;
        let mut key_count = 0u64;
        for (&length, set) in length_key_map {
            total_length += u64::from(length) * set.len() as u64;
            key_count += set.len() as u64;
        }
        if key_count == 0 {
            return 0;
        }
        let average_key_length = total_length as f64 / key_count as f64;

        let denom = -(1.0 - TARGET_COLLISION_RATE).ln();
        let alphabet_power = key_count as f64 / denom;
        let n_real = alphabet_power.ln() / ALPHABET_SIZE.ln();

        let n = n_real.round() as i64;
        n.clamp(1, average_key_length.floor().max(1.0) as i64) as u32
    }

    /// Distributes the length class's Bloom bit budget evenly over its
    /// distinct grams and inverts the policy to get the per-gram rate.
    fn per_ngram_fpr(target_fpr: f64, num_entries: u32, ngram_count: u32) -> f64 {
        if target_fpr <= 0.0 || target_fpr >= 1.0 {
            return target_fpr;
        }
        if num_entries == 0 || ngram_count == 0 {
            return target_fpr;
        }

        let bits_per_key = BloomFilterPolicy::compute_bits_per_key(target_fpr);
        let total_bits = bits_per_key * f64::from(num_entries);
        let bits_per_ngram = total_bits / f64::from(ngram_count);
        let (_, per_ngram_fpr) = BloomFilterPolicy::fpr_from_bits_per_key(bits_per_ngram);
        per_ngram_fpr
    }

    /// A query passes iff every n-gram of it passes the inner filter for
    /// its length class. A missing length class is a definite miss.
    pub fn possibly_contains(&self, value: &[u8]) -> bool {
        let Some(filter) = self.length_filters.get(&(value.len() as u32)) else {
            return false;
        };

        if self.n == 0 || value.len() < self.n as usize {
            return filter.possibly_contains(value);
        }

        value
            .windows(self.n as usize)
            .all(|gram| filter.possibly_contains(gram))
    }

    pub fn is_empty(&self) -> bool {
        self.length_filters.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.length_filters.values().map(ProbabilisticFilter::memory_usage).sum()
    }

    /// Writes the filter body. The kind tag byte is written by the caller.
    ///
    /// Layout: `u32 n`, `u32 num_lengths`, then per class `u32 length`
    /// followed by the inner filter (which carries its own kind tag).
    pub fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.n)?;
        writer.write_u32::<LittleEndian>(self.length_filters.len() as u32)?;

        let mut lengths: Vec<u32> = self.length_filters.keys().copied().collect();
        lengths.sort_unstable();
        for length in lengths {
            writer.write_u32::<LittleEndian>(length)?;
            self.length_filters[&length].write(writer)?;
        }
        Ok(())
    }

    /// Reads the filter body, after the kind tag byte has been consumed.
    pub fn read_body<R: Read>(reader: &mut R) -> Result<Self> {
        let n = reader.read_u32::<LittleEndian>()?;
        let num_lengths = reader.read_u32::<LittleEndian>()?;

        let mut length_filters = HashMap::with_capacity(num_lengths as usize);
        for _ in 0..num_lengths {
            let length = reader.read_u32::<LittleEndian>()?;
            let inner = ProbabilisticFilter::read(reader)?;
            length_filters.insert(length, inner);
        }

        Ok(Self { n, length_filters })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_and_reject() {
        let keys = ["abcdef", "abcxyz", "zyxwvu"];
        let filter = NGramPrefixFilter::from_keys(&keys, 0.01).unwrap();

        assert!(filter.possibly_contains(b"abcdef"));
        assert!(filter.possibly_contains(b"abcxyz"));
        assert!(filter.possibly_contains(b"zyxwvu"));
        assert!(!filter.possibly_contains(b"qqqqqq"));
    }

    #[test]
    fn test_missing_length_class_rejects() {
        let keys = ["abcdef"];
        let filter = NGramPrefixFilter::from_keys(&keys, 0.01).unwrap();
        assert!(!filter.possibly_contains(b"abc"));
        assert!(!filter.possibly_contains(b"abcdefgh"));
    }

    #[test]
    fn test_short_keys_stored_whole() {
        let keys = ["ab", "xy", "longenoughvalue"];
        let filter = NGramPrefixFilter::from_keys(&keys, 0.01).unwrap();
        assert!(filter.possibly_contains(b"ab"));
        assert!(filter.possibly_contains(b"xy"));
        assert!(filter.possibly_contains(b"longenoughvalue"));
    }

    #[test]
    fn test_query_passes_iff_every_gram_passes() {
        let keys: Vec<String> = (0..50).map(|i| format!("service-{i:04}-up")).collect();
        let filter = NGramPrefixFilter::from_keys(&keys, 0.01).unwrap();
        let n = filter.n() as usize;
        assert!(n >= 1);

        let inner = filter.length_filters.get(&(keys[0].len() as u32)).unwrap();
        for probe in ["service-0001-up", "service-QQQQ-up", "sqrvice-0001-up"] {
            let expected = probe
                .as_bytes()
                .windows(n)
                .all(|gram| inner.possibly_contains(gram));
            assert_eq!(filter.possibly_contains(probe.as_bytes()), expected);
        }
    }

    #[test]
    fn test_empty_key_set() {
        let filter = NGramPrefixFilter::from_keys::<&str>(&[], 0.01).unwrap();
        assert!(filter.is_empty());
        assert!(!filter.possibly_contains(b"anything"));
    }

    #[test]
    fn test_body_roundtrip_preserves_answers() {
        let keys: Vec<String> = (0..200).map(|i| format!("value-{i}")).collect();
        let filter = NGramPrefixFilter::from_keys(&keys, 0.01).unwrap();

        let mut buf = Vec::new();
        filter.write_body(&mut buf).unwrap();
        let restored = NGramPrefixFilter::read_body(&mut buf.as_slice()).unwrap();

        assert_eq!(filter.n(), restored.n());
        for key in &keys {
            assert!(restored.possibly_contains(key.as_bytes()));
        }
        for i in 0..500 {
            let probe = format!("other-{i}");
            assert_eq!(
                filter.possibly_contains(probe.as_bytes()),
                restored.possibly_contains(probe.as_bytes())
            );
        }
    }
}
