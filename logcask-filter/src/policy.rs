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

//! Filter sizing policies
//!
//! A policy turns a target false positive rate into concrete filter
//! parameters. Policies are stateless and cloneable; a filter consults one
//! at construction and never again.
//!
//! Standard formulas:
//! - Bloom: `bits_per_key = -log₂(p) / ln(2)`, `k = bits_per_key × ln(2)`
//! - Binary fuse: `fingerprint_bits = ⌈-log₂(p)⌉`, `bits_per_key ≈ 1.25 × fingerprint_bits`

/// Parameters computed by a filter policy.
///
/// For Bloom filters `num_hashes` is the hash function count; for binary
/// fuse filters it carries the fingerprint width in bits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParameters {
    /// Bits per element
    pub bits_per_key: f64,
    /// Number of hash functions (k), or fingerprint bits for fuse filters
    pub num_hashes: u32,
}

/// Sizing strategy a filter uses at construction.
pub trait FilterPolicy: Send + Sync + std::fmt::Debug {
    /// Computes optimal filter parameters for a given false positive rate.
    fn compute_parameters(&self, false_positive_rate: f64) -> FilterParameters;
}

/// Clamp range shared by the Bloom formulas. Beyond 20 bits/key or 20
/// hashes the marginal FPR gain is noise while the query cost keeps rising.
const BLOOM_MIN: f64 = 1.0;
const BLOOM_MAX: f64 = 20.0;

/// Policy for computing optimal Bloom filter parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct BloomFilterPolicy;

impl BloomFilterPolicy {
    /// Bits per key for a target false positive rate, clamped to `[1, 20]`.
    ///
    /// `p ≤ 0` asks for an impossible filter and gets the maximum practical
    /// configuration; `p ≥ 1` gets the minimum.
    pub fn compute_bits_per_key(false_positive_rate: f64) -> f64 {
        if false_positive_rate <= 0.0 {
            return BLOOM_MAX;
        }
        if false_positive_rate >= 1.0 {
            return BLOOM_MIN;
        }
        let bits_per_key = -false_positive_rate.log2() / std::f64::consts::LN_2;
        bits_per_key.clamp(BLOOM_MIN, BLOOM_MAX)
    }

    /// Optimal number of hash functions for given bits per key:
    /// `k = (m/n) × ln(2)`, clamped to `[1, 20]`.
    pub fn compute_num_hashes(bits_per_key: f64) -> u32 {
        let k = (bits_per_key * std::f64::consts::LN_2).round();
        (k as u32).clamp(BLOOM_MIN as u32, BLOOM_MAX as u32)
    }

    /// Inverts the sizing: given a bits-per-key budget, the optimal hash
    /// count and the false positive rate it actually achieves.
    ///
    /// `FPR ≈ (1 - e^(-k / bpk))^k`
    pub fn fpr_from_bits_per_key(bits_per_key: f64) -> (u32, f64) {
        if bits_per_key <= 0.0 {
            return (1, 1.0);
        }
        let num_hashes = Self::compute_num_hashes(bits_per_key);
        let exponent = -f64::from(num_hashes) / bits_per_key;
        let base = 1.0 - exponent.exp();
        (num_hashes, base.powi(num_hashes as i32))
    }

    /// Achieved parameters for an existing filter of `bit_array_size` bits
    /// holding `num_elements` keys.
    pub fn fpr_from_size(num_elements: u64, bit_array_size: u64) -> (u32, f64) {
        if bit_array_size == 0 || num_elements == 0 {
            return (0, 0.0);
        }
        Self::fpr_from_bits_per_key(bit_array_size as f64 / num_elements as f64)
    }
}

impl FilterPolicy for BloomFilterPolicy {
    fn compute_parameters(&self, false_positive_rate: f64) -> FilterParameters {
        let bits_per_key = Self::compute_bits_per_key(false_positive_rate);
        FilterParameters {
            bits_per_key,
            num_hashes: Self::compute_num_hashes(bits_per_key),
        }
    }
}

/// Policy for computing optimal binary fuse filter parameters.
///
/// Fuse filters do not hash repeatedly; the `num_hashes` slot of the
/// returned parameters carries the fingerprint width instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryFuseFilterPolicy;

/// Fingerprint widths below 4 bits saturate immediately; above 32 the
/// fingerprint no longer fits the packed-slot reader.
const FUSE_MIN_BITS: u32 = 4;
const FUSE_MAX_BITS: u32 = 32;

impl BinaryFuseFilterPolicy {
    /// Fingerprint bits for a target FPR: `⌈-log₂(p)⌉`, clamped to `[4, 32]`.
    pub fn compute_fingerprint_bits(false_positive_rate: f64) -> u32 {
        if false_positive_rate <= 0.0 {
            return 16;
        }
        if false_positive_rate >= 1.0 {
            return FUSE_MIN_BITS;
        }
        let bits = (-false_positive_rate.log2()).ceil();
        (bits as u32).clamp(FUSE_MIN_BITS, FUSE_MAX_BITS)
    }

    /// Space cost per key: the ~1.25x expansion the peeling construction needs.
    pub fn compute_bits_per_key(fingerprint_bits: u32) -> f64 {
        f64::from(fingerprint_bits) * 1.25
    }

    /// Achieved FPR for a fingerprint width: `2^-bits`.
    pub fn fpr_from_fingerprint_bits(fingerprint_bits: u32) -> f64 {
        2.0_f64.powi(-(fingerprint_bits as i32))
    }

    /// Inverts the sizing: fingerprint width and achieved FPR for a
    /// bits-per-key budget.
    pub fn fpr_from_bits_per_key(bits_per_key: f64) -> (u32, f64) {
        if bits_per_key <= 0.0 {
            return (FUSE_MIN_BITS, Self::fpr_from_fingerprint_bits(FUSE_MIN_BITS));
        }
        let bits = ((bits_per_key / 1.25).round() as u32).clamp(FUSE_MIN_BITS, FUSE_MAX_BITS);
        (bits, Self::fpr_from_fingerprint_bits(bits))
    }
}

impl FilterPolicy for BinaryFuseFilterPolicy {
    fn compute_parameters(&self, false_positive_rate: f64) -> FilterParameters {
        let fingerprint_bits = Self::compute_fingerprint_bits(false_positive_rate);
        FilterParameters {
            bits_per_key: Self::compute_bits_per_key(fingerprint_bits),
            num_hashes: fingerprint_bits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bloom_one_percent() {
        let params = BloomFilterPolicy.compute_parameters(0.01);
        assert!((params.bits_per_key - 9.585).abs() < 0.01);
        assert_eq!(params.num_hashes, 7);
    }

    #[test]
    fn test_bloom_degenerate_rates() {
        let max = BloomFilterPolicy.compute_parameters(0.0);
        assert_eq!(max.bits_per_key, 20.0);
        let min = BloomFilterPolicy.compute_parameters(1.5);
        assert_eq!(min.bits_per_key, 1.0);
        assert_eq!(min.num_hashes, 1);
    }

    #[test]
    fn test_bloom_inversion_is_consistent() {
        let bits_per_key = BloomFilterPolicy::compute_bits_per_key(0.01);
        let (k, fpr) = BloomFilterPolicy::fpr_from_bits_per_key(bits_per_key);
        assert_eq!(k, 7);
        // Optimal sizing should land near the requested rate
        assert!(fpr > 0.005 && fpr < 0.02, "fpr = {fpr}");
    }

    #[test]
    fn test_fuse_fingerprint_bits() {
        assert_eq!(BinaryFuseFilterPolicy::compute_fingerprint_bits(0.01), 7);
        assert_eq!(BinaryFuseFilterPolicy::compute_fingerprint_bits(0.5), 4);
        assert_eq!(BinaryFuseFilterPolicy::compute_fingerprint_bits(0.0), 16);
        assert_eq!(BinaryFuseFilterPolicy::compute_fingerprint_bits(1e-12), 32);
    }

    #[test]
    fn test_fuse_parameters_carry_fingerprint_bits() {
        let params = BinaryFuseFilterPolicy.compute_parameters(0.01);
        assert_eq!(params.num_hashes, 7);
        assert!((params.bits_per_key - 8.75).abs() < 1e-9);
    }
}
