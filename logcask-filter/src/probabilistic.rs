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

//! Polymorphic filter wrapper
//!
//! `ProbabilisticFilter` is a tagged variant owning one concrete filter
//! implementation. Dispatch is a match on the tag, clones are deep, and
//! the serialized form leads with a single kind byte so readers can
//! construct the right variant before parsing the body.

use std::io::{Read, Write};
use std::str::FromStr;

use byteorder::{ReadBytesExt, WriteBytesExt};

use logcask_core::{LogCaskError, Result};

use crate::binary_fuse::BinaryFuseFilter;
use crate::bloom::BloomFilter;
use crate::ngram::NGramPrefixFilter;
use crate::prefix_suffix::PrefixSuffixFilter;

/// Filter kind tag. Persisted as a single byte; `None` is the sentinel
/// "filter absent" and carries no body.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    None = 0,
    BloomV1 = 1,
    BinaryFuse = 2,
    NGramPrefix = 3,
    PrefixSuffix = 4,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::None => "none",
            FilterKind::BloomV1 => "bloom_v1",
            FilterKind::BinaryFuse => "binary_fuse",
            FilterKind::NGramPrefix => "ngram_prefix",
            FilterKind::PrefixSuffix => "prefix_suffix",
        }
    }
}

impl TryFrom<u8> for FilterKind {
    type Error = LogCaskError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(FilterKind::None),
            1 => Ok(FilterKind::BloomV1),
            2 => Ok(FilterKind::BinaryFuse),
            3 => Ok(FilterKind::NGramPrefix),
            4 => Ok(FilterKind::PrefixSuffix),
            other => Err(LogCaskError::FilterKindUnknown(other)),
        }
    }
}

impl FromStr for FilterKind {
    type Err = LogCaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(FilterKind::None),
            "bloom" | "bloom_v1" => Ok(FilterKind::BloomV1),
            "fuse" | "binary_fuse" => Ok(FilterKind::BinaryFuse),
            "ngram" | "ngram_prefix" => Ok(FilterKind::NGramPrefix),
            "prefix_suffix" => Ok(FilterKind::PrefixSuffix),
            other => Err(LogCaskError::InvalidArgument(format!(
                "unknown filter kind '{other}'"
            ))),
        }
    }
}

/// Value-type wrapper owning one concrete filter implementation.
///
/// Copying performs an arm-dispatched deep clone; moves transfer the inner
/// buffer. The hot `possibly_contains` path is a match on the tag.
#[derive(Debug, Clone, Default)]
pub enum ProbabilisticFilter {
    #[default]
    None,
    Bloom(BloomFilter),
    BinaryFuse(BinaryFuseFilter),
    NGramPrefix(NGramPrefixFilter),
    PrefixSuffix(PrefixSuffixFilter),
}

impl ProbabilisticFilter {
    /// Creates an empty filter of the given kind sized for later
    /// population. Kinds that require the complete key set up front
    /// (binary fuse, n-gram) start empty and must be built with
    /// [`from_keys`](Self::from_keys).
    pub fn new(kind: FilterKind, expected_num_elements: u64, false_positive_rate: f64) -> Self {
        match kind {
            FilterKind::None => ProbabilisticFilter::None,
            FilterKind::BloomV1 => {
                ProbabilisticFilter::Bloom(BloomFilter::new(expected_num_elements, false_positive_rate))
            }
            FilterKind::BinaryFuse => ProbabilisticFilter::BinaryFuse(BinaryFuseFilter::new(
                expected_num_elements,
                false_positive_rate,
            )),
            FilterKind::NGramPrefix => ProbabilisticFilter::NGramPrefix(NGramPrefixFilter::default()),
            FilterKind::PrefixSuffix => ProbabilisticFilter::PrefixSuffix(PrefixSuffixFilter::new(
                expected_num_elements,
                false_positive_rate,
            )),
        }
    }

    /// Builds a filter of the given kind over a complete key set.
    pub fn from_keys<K: AsRef<[u8]>>(
        kind: FilterKind,
        keys: &[K],
        false_positive_rate: f64,
    ) -> Result<Self> {
        match kind {
            FilterKind::None => Ok(ProbabilisticFilter::None),
            FilterKind::BloomV1 => Ok(ProbabilisticFilter::Bloom(BloomFilter::from_keys(
                keys,
                false_positive_rate,
            ))),
            FilterKind::BinaryFuse => Ok(ProbabilisticFilter::BinaryFuse(
                BinaryFuseFilter::from_keys(keys, false_positive_rate)?,
            )),
            FilterKind::NGramPrefix => Ok(ProbabilisticFilter::NGramPrefix(
                NGramPrefixFilter::from_keys(keys, false_positive_rate)?,
            )),
            FilterKind::PrefixSuffix => Ok(ProbabilisticFilter::PrefixSuffix(
                PrefixSuffixFilter::from_keys(keys, false_positive_rate),
            )),
        }
    }

    /// Adds a value to an incremental filter. Static kinds (binary fuse,
    /// n-gram) reject mutation after construction.
    pub fn add(&mut self, value: &[u8]) -> Result<()> {
        match self {
            ProbabilisticFilter::None => Ok(()),
            ProbabilisticFilter::Bloom(filter) => {
                filter.add(value);
                Ok(())
            }
            ProbabilisticFilter::BinaryFuse(_) => Err(LogCaskError::InvalidArgument(
                "binary fuse filter is static; build it from the complete key set".into(),
            )),
            ProbabilisticFilter::NGramPrefix(_) => Err(LogCaskError::InvalidArgument(
                "n-gram prefix filter is static; build it from the complete key set".into(),
            )),
            ProbabilisticFilter::PrefixSuffix(filter) => {
                filter.add(value);
                Ok(())
            }
        }
    }

    /// Returns `false` if `value` is definitely absent, `true` if it might
    /// be present. The `None` variant holds nothing and rejects everything.
    pub fn possibly_contains(&self, value: &[u8]) -> bool {
        match self {
            ProbabilisticFilter::None => false,
            ProbabilisticFilter::Bloom(filter) => filter.possibly_contains(value),
            ProbabilisticFilter::BinaryFuse(filter) => filter.possibly_contains(value),
            ProbabilisticFilter::NGramPrefix(filter) => filter.possibly_contains(value),
            ProbabilisticFilter::PrefixSuffix(filter) => filter.possibly_contains(value),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ProbabilisticFilter::None => true,
            ProbabilisticFilter::Bloom(filter) => filter.is_empty(),
            ProbabilisticFilter::BinaryFuse(filter) => filter.is_empty(),
            ProbabilisticFilter::NGramPrefix(filter) => filter.is_empty(),
            ProbabilisticFilter::PrefixSuffix(filter) => filter.is_empty(),
        }
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            ProbabilisticFilter::None => FilterKind::None,
            ProbabilisticFilter::Bloom(_) => FilterKind::BloomV1,
            ProbabilisticFilter::BinaryFuse(_) => FilterKind::BinaryFuse,
            ProbabilisticFilter::NGramPrefix(_) => FilterKind::NGramPrefix,
            ProbabilisticFilter::PrefixSuffix(_) => FilterKind::PrefixSuffix,
        }
    }

    pub fn memory_usage(&self) -> usize {
        match self {
            ProbabilisticFilter::None => 0,
            ProbabilisticFilter::Bloom(filter) => filter.memory_usage(),
            ProbabilisticFilter::BinaryFuse(filter) => filter.memory_usage(),
            ProbabilisticFilter::NGramPrefix(filter) => filter.memory_usage(),
            ProbabilisticFilter::PrefixSuffix(filter) => filter.memory_usage(),
        }
    }

    /// Writes the kind tag byte followed by the kind-specific body.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.kind() as u8)?;
        self.write_body(writer)
    }

    /// Writes the kind-specific body without the tag byte, for containers
    /// (e.g. a filter-file header) that record the kind themselves.
    pub fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            ProbabilisticFilter::None => Ok(()),
            ProbabilisticFilter::Bloom(filter) => filter.write_body(writer),
            ProbabilisticFilter::BinaryFuse(filter) => filter.write_body(writer),
            ProbabilisticFilter::NGramPrefix(filter) => filter.write_body(writer),
            ProbabilisticFilter::PrefixSuffix(filter) => filter.write_body(writer),
        }
    }

    /// Reads the kind tag byte and dispatches to the matching body parser.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let tag = reader.read_u8()?;
        let kind = FilterKind::try_from(tag)?;
        Self::read_body(kind, reader)
    }

    /// Reads the kind-specific body when the tag byte has already been
    /// consumed (e.g. from a filter-file header).
    pub fn read_body<R: Read>(kind: FilterKind, reader: &mut R) -> Result<Self> {
        match kind {
            FilterKind::None => Ok(ProbabilisticFilter::None),
            FilterKind::BloomV1 => Ok(ProbabilisticFilter::Bloom(BloomFilter::read_body(reader)?)),
            FilterKind::BinaryFuse => Ok(ProbabilisticFilter::BinaryFuse(
                BinaryFuseFilter::read_body(reader)?,
            )),
            FilterKind::NGramPrefix => Ok(ProbabilisticFilter::NGramPrefix(
                NGramPrefixFilter::read_body(reader)?,
            )),
            FilterKind::PrefixSuffix => Ok(ProbabilisticFilter::PrefixSuffix(
                PrefixSuffixFilter::read_body(reader)?,
            )),
        }
    }
}
