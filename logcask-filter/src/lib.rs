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

//! LogCask probabilistic filters
//!
//! This crate provides the filter family used to answer "might this set
//! contain X?" without loading dictionaries or decompressing column
//! streams:
//!
//! - **Bloom Filter** (`bloom`): classic bit-array filter with SHA-256
//!   double hashing
//! - **Binary Fuse Filter** (`binary_fuse`): static 3-wise XOR filter with
//!   bit-packed fingerprints, smaller and faster than Bloom but immutable
//!   after construction
//! - **N-Gram Prefix Filter** (`ngram`): length-bucketed n-gram
//!   decomposition over an inner filter
//! - **Prefix/Suffix Filter** (`prefix_suffix`): forward + reversed prefix
//!   filters answering `prefix*` / `*suffix` wildcard queries
//!
//! plus the value-type polymorphic wrapper (`probabilistic`), the sizing
//! policies (`policy`), per-schema exact column-value filters (`column`),
//! and the on-disk envelopes: single-filter files (`file`) and
//! multi-archive filter packs (`pack`).
//!
//! ## Information-Theoretic Analysis
//!
//! For a filter with false positive rate p:
//! - Information-theoretic minimum: log₂(1/p) bits per key
//! - Bloom filter: ~1.44 × log₂(1/p) bits per key (44% overhead)
//! - Binary fuse filter: ~1.23 × log₂(1/p) bits per key

pub mod binary_fuse;
pub mod bloom;
pub mod column;
pub mod config;
pub mod file;
pub mod ngram;
pub mod pack;
pub mod policy;
pub mod prefix_suffix;
pub mod probabilistic;

pub use binary_fuse::BinaryFuseFilter;
pub use bloom::BloomFilter;
pub use column::{SchemaIntColumnFilter, SchemaStringColumnFilter};
pub use config::FilterConfig;
pub use file::{read_filter_file, write_filter_file, FilterFileMetadata};
pub use ngram::NGramPrefixFilter;
pub use pack::{FilterPackBuilder, FilterPackReader};
pub use policy::{BinaryFuseFilterPolicy, BloomFilterPolicy, FilterParameters, FilterPolicy};
pub use prefix_suffix::PrefixSuffixFilter;
pub use probabilistic::{FilterKind, ProbabilisticFilter};
