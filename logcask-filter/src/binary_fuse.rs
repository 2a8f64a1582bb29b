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

//! Binary fuse filter
//!
//! Static 3-wise XOR filter: every key owns one slot in each of three
//! disjoint segments, and the XOR of the three slot values equals the key's
//! fingerprint. Construction orders keys by peeling singly-covered slots;
//! lookups are three reads and two XORs. The filter is immutable once
//! built.
//!
//! Fingerprints of arbitrary width (e.g. 7, 10, 13 bits) are stored
//! contiguously in a raw bit-stream, so a 10-bit fingerprint takes exactly
//! 10 bits rather than a padded 16.

use std::collections::HashSet;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, warn};

use logcask_core::{LogCaskError, Result};

use crate::policy::{BinaryFuseFilterPolicy, FilterPolicy};

/// Peeling is randomized; one retry per seed, bounded.
const MAX_CONSTRUCTION_SEEDS: u32 = 500;

/// Below 32 keys the expansion math becomes unstable, so the array is sized
/// as if 32 keys were present.
const MIN_SIZING_KEYS: usize = 32;

/// Fast 64-bit mixer (wyhash style).
#[inline]
fn mix(a: u64, b: u64) -> u64 {
    let r = u128::from(a) * u128::from(b);
    (r as u64) ^ ((r >> 64) as u64)
}

/// Range reduction without modulo: `(x * n) >> 64`.
#[inline]
fn fast_range(hash: u64, range: u64) -> usize {
    ((u128::from(hash) * u128::from(range)) >> 64) as usize
}

#[derive(Debug, Clone, Default)]
pub struct BinaryFuseFilter {
    /// Bit-packed fingerprint slots
    data: Vec<u8>,
    array_size: u64,
    segment_length: u64,
    fingerprint_bits: u32,
    fingerprint_mask: u32,
    seed: u32,
}

#[derive(Clone, Copy)]
struct KeyHashes {
    p0: usize,
    p1: usize,
    p2: usize,
    fingerprint: u32,
}

impl BinaryFuseFilter {
    /// Allocates a zeroed filter sized for `expected_num_elements` keys.
    /// Until [`from_keys`](Self::from_keys) style construction fills it,
    /// every query answers false.
    pub fn new(expected_num_elements: u64, false_positive_rate: f64) -> Self {
        if expected_num_elements == 0 {
            return Self::default();
        }

        let n = (expected_num_elements as usize).max(MIN_SIZING_KEYS);
        let params = BinaryFuseFilterPolicy.compute_parameters(false_positive_rate);
        let fingerprint_bits = params.num_hashes.min(32);

        let expansion = Self::expansion_factor(n);
        let segment_length = ((n as f64 * expansion) / 3.0).ceil() as u64;
        let array_size = 3 * segment_length;

        let total_bits = array_size * u64::from(fingerprint_bits);
        let total_bytes = total_bits.div_ceil(8) as usize;

        Self {
            data: vec![0u8; total_bytes],
            array_size,
            segment_length,
            fingerprint_bits,
            fingerprint_mask: fingerprint_mask(fingerprint_bits),
            seed: 0,
        }
    }

    /// Builds the filter over a complete key set. Duplicate keys are
    /// collapsed before peeling; an unpeelable dataset (after exhausting
    /// every seed) fails with `FilterConstructionFailed`.
    pub fn from_keys<K: AsRef<[u8]>>(keys: &[K], false_positive_rate: f64) -> Result<Self> {
        let distinct: Vec<&[u8]> = {
            let mut seen = HashSet::with_capacity(keys.len());
            keys.iter()
                .map(AsRef::as_ref)
                .filter(|k| seen.insert(*k))
                .collect()
        };

        let mut filter = Self::new(distinct.len() as u64, false_positive_rate);
        if distinct.is_empty() {
            return Ok(filter);
        }

        for seed in 0..MAX_CONSTRUCTION_SEEDS {
            filter.seed = seed;
            if filter.try_construct(&distinct) {
                debug!(seed, num_keys = distinct.len(), "binary fuse construction succeeded");
                return Ok(filter);
            }
        }

        warn!(
            attempts = MAX_CONSTRUCTION_SEEDS,
            num_keys = distinct.len(),
            "binary fuse construction exhausted seeds"
        );
        Err(LogCaskError::FilterConstructionFailed(format!(
            "peeling failed for {} keys after {} seeds",
            distinct.len(),
            MAX_CONSTRUCTION_SEEDS
        )))
    }

    /// Partitioned XOR filters fail to peel below ~1.23x expansion; small
    /// sets need a little extra slack.
    fn expansion_factor(n: usize) -> f64 {
        let margin: f64 = if n < 10_000 { 0.02 } else { 0.005 };
        (1.23 + margin).min(2.0)
    }

    fn try_construct(&mut self, keys: &[&[u8]]) -> bool {
        self.data.fill(0);

        let hashes: Vec<KeyHashes> = keys
            .iter()
            .map(|key| self.locations_and_fingerprint(key))
            .collect();

        let array_size = self.array_size as usize;
        let mut counts = vec![0u32; array_size];
        let mut xor_keys = vec![0u64; array_size];

        for (i, h) in hashes.iter().enumerate() {
            for pos in [h.p0, h.p1, h.p2] {
                counts[pos] += 1;
                xor_keys[pos] ^= i as u64;
            }
        }

        // Peel: repeatedly remove keys that are the sole occupant of a slot
        let mut queue: Vec<usize> = (0..array_size).filter(|&i| counts[i] == 1).collect();
        let mut stack: Vec<(usize, usize)> = Vec::with_capacity(keys.len());

        let mut head = 0;
        while head < queue.len() {
            let pos = queue[head];
            head += 1;
            if counts[pos] != 1 {
                continue;
            }
            let key_index = xor_keys[pos] as usize;
            stack.push((key_index, pos));

            let h = hashes[key_index];
            for p in [h.p0, h.p1, h.p2] {
                xor_keys[p] ^= key_index as u64;
                counts[p] -= 1;
                if counts[p] == 1 {
                    queue.push(p);
                }
            }
        }

        if stack.len() != keys.len() {
            return false;
        }

        // Assign in reverse peel order so each key's slot is finalized last
        for &(key_index, pos) in stack.iter().rev() {
            let h = hashes[key_index];
            let xor_val =
                self.slot_value(h.p0) ^ self.slot_value(h.p1) ^ self.slot_value(h.p2);
            self.set_slot_value(pos, h.fingerprint ^ xor_val);
        }

        true
    }

    /// Returns `false` if `value` is definitely absent.
    pub fn possibly_contains(&self, value: &[u8]) -> bool {
        if self.data.is_empty() {
            return false;
        }
        let h = self.locations_and_fingerprint(value);
        let stored = self.slot_value(h.p0) ^ self.slot_value(h.p1) ^ self.slot_value(h.p2);
        stored == h.fingerprint
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.data.len()
    }

    pub fn fingerprint_bits(&self) -> u32 {
        self.fingerprint_bits
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn segment_length(&self) -> u64 {
        self.segment_length
    }

    fn hash_key(&self, key: &[u8]) -> u64 {
        let mut h = u64::from(self.seed) ^ 0x9E37_79B9_7F4A_7C15;
        for &byte in key {
            h ^= u64::from(byte);
            h = mix(h, 0xbf58_476d_1ce4_e5b9);
        }
        mix(h, 0x94d0_49bb_1331_11eb)
    }

    fn locations_and_fingerprint(&self, key: &[u8]) -> KeyHashes {
        let h = self.hash_key(key);

        let mut fingerprint = (h as u32) & self.fingerprint_mask;
        if fingerprint == 0 {
            // Zero is the empty-slot value; storing it would make every
            // unbuilt slot triple a match
            fingerprint = 1;
        }

        let segment = self.segment_length;
        KeyHashes {
            p0: fast_range(h, segment),
            p1: fast_range(h.rotate_right(21), segment) + segment as usize,
            p2: fast_range(h.rotate_right(42), segment) + 2 * segment as usize,
            fingerprint,
        }
    }

    /// Reads the fingerprint stored at slot `pos` from the bit-stream.
    fn slot_value(&self, pos: usize) -> u32 {
        let bit_index = pos as u64 * u64::from(self.fingerprint_bits);
        let byte_index = (bit_index / 8) as usize;
        let bit_offset = (bit_index % 8) as u32;

        let window = if byte_index + 8 <= self.data.len() {
            u64::from_le_bytes(self.data[byte_index..byte_index + 8].try_into().unwrap())
        } else {
            let mut raw = 0u64;
            for (i, &byte) in self.data[byte_index..].iter().enumerate() {
                raw |= u64::from(byte) << (8 * i);
            }
            raw
        };

        ((window >> bit_offset) as u32) & self.fingerprint_mask
    }

    /// Writes `value` into slot `pos`. Uses an aligned 64-bit window
    /// read-modify-write; the last few bytes of the buffer cannot fit a
    /// full window and fall back to a byte-at-a-time bit-stream write.
    fn set_slot_value(&mut self, pos: usize, value: u32) {
        let bit_index = pos as u64 * u64::from(self.fingerprint_bits);
        let byte_index = (bit_index / 8) as usize;
        let bit_offset = (bit_index % 8) as u32;

        let masked = u64::from(value & self.fingerprint_mask);

        if byte_index + 8 <= self.data.len() {
            let mut window =
                u64::from_le_bytes(self.data[byte_index..byte_index + 8].try_into().unwrap());
            let mask = u64::from(self.fingerprint_mask) << bit_offset;
            window = (window & !mask) | (masked << bit_offset);
            self.data[byte_index..byte_index + 8].copy_from_slice(&window.to_le_bytes());
            return;
        }

        let mut bits_remaining = self.fingerprint_bits;
        let mut current_bit = bit_offset;
        let mut current_byte = byte_index;
        let mut pending = value & self.fingerprint_mask;

        while bits_remaining > 0 && current_byte < self.data.len() {
            let bits_in_this_byte = (8 - current_bit).min(bits_remaining);
            let value_mask = (1u32 << bits_in_this_byte) - 1;
            let byte_mask = (value_mask << current_bit) as u8;
            let byte_val = ((pending & value_mask) << current_bit) as u8;

            self.data[current_byte] &= !byte_mask;
            self.data[current_byte] |= byte_val;

            pending >>= bits_in_this_byte;
            bits_remaining -= bits_in_this_byte;
            current_byte += 1;
            current_bit = 0;
        }
    }

    /// Writes the filter body. The kind tag byte is written by the caller.
    ///
    /// Layout: `u32 fingerprint_bits`, `u32 seed`, `u64 array_size`,
    /// `u64 segment_length`, `u64 packed_len`, packed bytes.
    pub fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.fingerprint_bits)?;
        writer.write_u32::<LittleEndian>(self.seed)?;
        writer.write_u64::<LittleEndian>(self.array_size)?;
        writer.write_u64::<LittleEndian>(self.segment_length)?;
        writer.write_u64::<LittleEndian>(self.data.len() as u64)?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    /// Reads the filter body, after the kind tag byte has been consumed.
    pub fn read_body<R: Read>(reader: &mut R) -> Result<Self> {
        let fingerprint_bits = reader.read_u32::<LittleEndian>()?;
        let seed = reader.read_u32::<LittleEndian>()?;
        let array_size = reader.read_u64::<LittleEndian>()?;
        let segment_length = reader.read_u64::<LittleEndian>()?;

        if fingerprint_bits > 32 || (fingerprint_bits == 0 && array_size != 0) {
            return Err(LogCaskError::FilterFormatInvalid(format!(
                "fingerprint width {fingerprint_bits} out of range"
            )));
        }
        if array_size != 3 * segment_length {
            return Err(LogCaskError::FilterFormatInvalid(format!(
                "array size {array_size} is not three segments of {segment_length}"
            )));
        }

        let packed_len = reader.read_u64::<LittleEndian>()?;
        let mut data = vec![0u8; packed_len as usize];
        reader.read_exact(&mut data)?;

        Ok(Self {
            data,
            array_size,
            segment_length,
            fingerprint_bits,
            fingerprint_mask: fingerprint_mask(fingerprint_bits),
            seed,
        })
    }
}

fn fingerprint_mask(fingerprint_bits: u32) -> u32 {
    if fingerprint_bits >= 32 {
        u32::MAX
    } else {
        (1u32 << fingerprint_bits) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_keys(count: usize, len: usize, seed: u64) -> Vec<Vec<u8>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| (0..len).map(|_| rng.gen::<u8>()).collect())
            .collect()
    }

    #[test]
    fn test_construction_and_membership() {
        let keys = random_keys(100, 16, 1);
        let filter = BinaryFuseFilter::from_keys(&keys, 0.01).unwrap();

        assert!(filter.seed() <= 20, "construction took {} seeds", filter.seed());
        for key in &keys {
            assert!(filter.possibly_contains(key));
        }
    }

    #[test]
    fn test_false_positive_rate() {
        let keys = random_keys(100, 16, 2);
        let filter = BinaryFuseFilter::from_keys(&keys, 0.01).unwrap();

        let probes = random_keys(100_000, 16, 3);
        let false_positives = probes
            .iter()
            .filter(|probe| filter.possibly_contains(probe))
            .count();

        let bound = 2.0 * 2.0_f64.powi(-(filter.fingerprint_bits() as i32));
        let measured = false_positives as f64 / probes.len() as f64;
        assert!(measured <= bound, "measured {measured} exceeds {bound}");
    }

    #[test]
    fn test_xor_identity_holds_for_every_key() {
        let keys = random_keys(500, 8, 4);
        let filter = BinaryFuseFilter::from_keys(&keys, 0.01).unwrap();

        for key in &keys {
            let h = filter.locations_and_fingerprint(key);
            let stored =
                filter.slot_value(h.p0) ^ filter.slot_value(h.p1) ^ filter.slot_value(h.p2);
            assert_eq!(stored, h.fingerprint);
            assert_ne!(h.fingerprint, 0);
        }
    }

    #[test]
    fn test_duplicate_keys_collapse() {
        let keys = vec![b"dup".to_vec(), b"dup".to_vec(), b"other".to_vec()];
        let filter = BinaryFuseFilter::from_keys(&keys, 0.01).unwrap();
        assert!(filter.possibly_contains(b"dup"));
        assert!(filter.possibly_contains(b"other"));
    }

    #[test]
    fn test_empty_key_set() {
        let filter = BinaryFuseFilter::from_keys::<&[u8]>(&[], 0.01).unwrap();
        assert!(filter.is_empty());
        assert!(!filter.possibly_contains(b"anything"));
    }

    #[test]
    fn test_slot_io_across_byte_boundaries() {
        // 14-bit slots guarantee unaligned offsets; exercise every slot
        // including the tail that falls back to byte-wise writes
        let mut filter = BinaryFuseFilter::new(64, 0.0001);
        assert_eq!(filter.fingerprint_bits(), 14);

        let mask = filter.fingerprint_mask;
        let array_size = filter.array_size as usize;
        for pos in 0..array_size {
            filter.set_slot_value(pos, (pos as u32 * 2654435761) & mask);
        }
        for pos in 0..array_size {
            assert_eq!(filter.slot_value(pos), (pos as u32 * 2654435761) & mask);
        }
    }

    #[test]
    fn test_body_roundtrip_preserves_answers() {
        let keys = random_keys(200, 12, 5);
        let filter = BinaryFuseFilter::from_keys(&keys, 0.01).unwrap();

        let mut buf = Vec::new();
        filter.write_body(&mut buf).unwrap();
        let restored = BinaryFuseFilter::read_body(&mut buf.as_slice()).unwrap();

        for key in &keys {
            assert!(restored.possibly_contains(key));
        }
        for probe in random_keys(1000, 12, 6) {
            assert_eq!(
                filter.possibly_contains(&probe),
                restored.possibly_contains(&probe)
            );
        }
    }

    #[test]
    fn test_rejects_corrupt_fingerprint_width() {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(40).unwrap();
        buf.write_u32::<LittleEndian>(0).unwrap();
        buf.write_u64::<LittleEndian>(3).unwrap();
        buf.write_u64::<LittleEndian>(1).unwrap();
        buf.write_u64::<LittleEndian>(0).unwrap();
        assert!(BinaryFuseFilter::read_body(&mut buf.as_slice()).is_err());
    }
}
