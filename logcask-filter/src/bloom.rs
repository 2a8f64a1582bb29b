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

//! Bloom filter for fast negative lookups
//!
//! Uses SHA-256 based double hashing: two independent digests generate k
//! hash functions via `h_i(x) = h1(x) + i·h2(x)`, the scheme proven
//! equivalent to k independent hashes in Kirsch & Mitzenmacher (2008).

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};

use logcask_core::Result;

use crate::policy::{BloomFilterPolicy, FilterPolicy};

/// Salt appended to the value for the second digest. Keeping the two
/// digests domain-separated is what makes h1 and h2 independent.
const SECOND_HASH_SALT: &[u8] = b"_bloom_";

/// Minimum bit-array size. Tiny key sets would otherwise get arrays so
/// small that the k probe positions cover most of them, inflating the
/// false positive rate far past the target.
const MIN_BIT_ARRAY_SIZE: u64 = 64;

#[derive(Debug, Clone, Default)]
pub struct BloomFilter {
    bit_array: Vec<u8>,
    bit_array_size: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_num_elements` keys at the given
    /// target false positive rate. Zero expected elements produce an empty
    /// filter that rejects every query.
    pub fn new(expected_num_elements: u64, false_positive_rate: f64) -> Self {
        if expected_num_elements == 0 {
            return Self::default();
        }

        let params = BloomFilterPolicy.compute_parameters(false_positive_rate);
        let bit_array_size = ((params.bits_per_key * expected_num_elements as f64).ceil() as u64)
            .max(MIN_BIT_ARRAY_SIZE);
        let num_bytes = bit_array_size.div_ceil(8) as usize;

        Self {
            bit_array: vec![0u8; num_bytes],
            bit_array_size,
            num_hashes: params.num_hashes,
        }
    }

    /// Builds a filter over a complete key set.
    pub fn from_keys<K: AsRef<[u8]>>(keys: &[K], false_positive_rate: f64) -> Self {
        let mut filter = Self::new(keys.len() as u64, false_positive_rate);
        for key in keys {
            filter.add(key.as_ref());
        }
        filter
    }

    /// Sets the k bits for `value`. Never fails.
    pub fn add(&mut self, value: &[u8]) {
        if self.bit_array.is_empty() {
            return;
        }
        let (h1, h2) = Self::digest_pair(value);
        for i in 0..self.num_hashes {
            let hash = h1.wrapping_add(u64::from(i).wrapping_mul(h2));
            self.set_bit(hash % self.bit_array_size);
        }
    }

    /// Returns `false` if `value` is definitely absent, `true` if it might
    /// be present.
    pub fn possibly_contains(&self, value: &[u8]) -> bool {
        if self.bit_array.is_empty() {
            return false;
        }
        let (h1, h2) = Self::digest_pair(value);
        for i in 0..self.num_hashes {
            let hash = h1.wrapping_add(u64::from(i).wrapping_mul(h2));
            if !self.test_bit(hash % self.bit_array_size) {
                return false;
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.bit_array.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.bit_array.len()
    }

    pub fn bit_array_size(&self) -> u64 {
        self.bit_array_size
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Double hashing inputs: the first 8 bytes (little-endian) of the
    /// SHA-256 digest of the value, and of the salted value.
    fn digest_pair(value: &[u8]) -> (u64, u64) {
        let digest1 = Sha256::digest(value);

        let mut hasher = Sha256::new();
        hasher.update(value);
        hasher.update(SECOND_HASH_SALT);
        let digest2 = hasher.finalize();

        let h1 = u64::from_le_bytes(digest1[..8].try_into().expect("digest is 32 bytes"));
        let h2 = u64::from_le_bytes(digest2[..8].try_into().expect("digest is 32 bytes"));
        (h1, h2)
    }

    fn set_bit(&mut self, bit_index: u64) {
        let byte_index = (bit_index / 8) as usize;
        let bit_offset = (bit_index % 8) as u32;
        self.bit_array[byte_index] |= 1u8 << bit_offset;
    }

    fn test_bit(&self, bit_index: u64) -> bool {
        let byte_index = (bit_index / 8) as usize;
        let bit_offset = (bit_index % 8) as u32;
        (self.bit_array[byte_index] & (1u8 << bit_offset)) != 0
    }

    /// Writes the filter body. The kind tag byte is written by the caller
    /// (the polymorphic wrapper) before this.
    ///
    /// Layout: `u32 num_hashes`, `u64 size_bits`, `u64 size_bytes`, bytes.
    pub fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.num_hashes)?;
        writer.write_u64::<LittleEndian>(self.bit_array_size)?;
        writer.write_u64::<LittleEndian>(self.bit_array.len() as u64)?;
        writer.write_all(&self.bit_array)?;
        Ok(())
    }

    /// Reads the filter body, after the kind tag byte has been consumed.
    pub fn read_body<R: Read>(reader: &mut R) -> Result<Self> {
        let num_hashes = reader.read_u32::<LittleEndian>()?;
        let bit_array_size = reader.read_u64::<LittleEndian>()?;
        let num_bytes = reader.read_u64::<LittleEndian>()?;

        let mut bit_array = vec![0u8; num_bytes as usize];
        reader.read_exact(&mut bit_array)?;

        Ok(Self {
            bit_array,
            bit_array_size,
            num_hashes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_no_false_negatives() {
        let keys: Vec<String> = (0..1000).map(|i| format!("key{i}")).collect();
        let filter = BloomFilter::from_keys(&keys, 0.01);

        for key in &keys {
            assert!(filter.possibly_contains(key.as_bytes()));
        }
    }

    #[test]
    fn test_false_positive_rate_within_bound() {
        let p = 0.01;
        let n = 10_000usize;
        let keys: Vec<String> = (0..n).map(|i| format!("present-{i}")).collect();
        let filter = BloomFilter::from_keys(&keys, p);

        let mut rng = StdRng::seed_from_u64(7);
        let mut false_positives = 0usize;
        let queries = 10 * n;
        for _ in 0..queries {
            let probe: String = format!("absent-{}", rng.gen::<u64>());
            if filter.possibly_contains(probe.as_bytes()) {
                false_positives += 1;
            }
        }

        let measured = false_positives as f64 / queries as f64;
        assert!(measured <= 2.0 * p, "measured FPR {measured} exceeds {}", 2.0 * p);
    }

    #[test]
    fn test_single_key() {
        let filter = BloomFilter::from_keys(&["hello"], 0.01);
        assert!(filter.possibly_contains(b"hello"));

        let mut rng = StdRng::seed_from_u64(11);
        let mut false_positives = 0usize;
        for _ in 0..10_000 {
            let probe = format!("r{}", rng.gen::<u64>());
            if filter.possibly_contains(probe.as_bytes()) {
                false_positives += 1;
            }
        }
        assert!(false_positives as f64 / 10_000.0 <= 0.02);
    }

    #[test]
    fn test_empty_filter_rejects_everything() {
        let filter = BloomFilter::new(0, 0.01);
        assert!(filter.is_empty());
        assert!(!filter.possibly_contains(b"anything"));
    }

    #[test]
    fn test_minimum_size_floor() {
        let filter = BloomFilter::new(1, 0.99);
        assert_eq!(filter.bit_array_size(), 64);
        assert_eq!(filter.memory_usage(), 8);
    }

    #[test]
    fn test_body_roundtrip_preserves_answers() {
        let keys: Vec<String> = (0..100).map(|i| format!("v{i}")).collect();
        let filter = BloomFilter::from_keys(&keys, 0.05);

        let mut buf = Vec::new();
        filter.write_body(&mut buf).unwrap();
        let restored = BloomFilter::read_body(&mut buf.as_slice()).unwrap();

        for key in &keys {
            assert!(restored.possibly_contains(key.as_bytes()));
        }
        for i in 0..1000 {
            let probe = format!("w{i}");
            assert_eq!(
                filter.possibly_contains(probe.as_bytes()),
                restored.possibly_contains(probe.as_bytes())
            );
        }
    }
}
