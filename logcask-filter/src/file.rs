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

//! Filter file envelope
//!
//! Single-filter on-disk record:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Magic "CLPF" (4 bytes)                       │
//! │ Version (u32)                                │
//! │ Kind (u8)  Flags (u8)  Reserved (u16)        │
//! │ False positive rate (f64)                    │
//! │ Num elements (u64)                           │
//! ├──────────────────────────────────────────────┤
//! │ Kind-specific body (absent for kind None)    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! All integers little-endian. Flag bit 0 marks a filter whose values were
//! lower-cased before insertion; readers must lower-case needles to match.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use logcask_core::{LogCaskError, Result};

use crate::config::FilterConfig;
use crate::probabilistic::{FilterKind, ProbabilisticFilter};

pub const FILTER_FILE_MAGIC: [u8; 4] = *b"CLPF";
pub const FILTER_FILE_VERSION: u32 = 1;

/// Flag bit 0: values were normalized to lower case before insertion.
pub const FILTER_FLAG_NORMALIZED: u8 = 0x1;

/// Metadata decoded from a filter file header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterFileMetadata {
    pub kind: FilterKind,
    pub normalize: bool,
    pub false_positive_rate: f64,
    pub num_elements: u64,
}

/// Writes the envelope and the filter body. A `None` kind writes the
/// header only.
pub fn write_filter_file<W: Write>(
    writer: &mut W,
    config: &FilterConfig,
    filter: &ProbabilisticFilter,
    num_elements: u64,
) -> Result<()> {
    writer.write_all(&FILTER_FILE_MAGIC)?;
    writer.write_u32::<LittleEndian>(FILTER_FILE_VERSION)?;
    writer.write_u8(config.kind as u8)?;

    let mut flags = 0u8;
    if config.normalize {
        flags |= FILTER_FLAG_NORMALIZED;
    }
    writer.write_u8(flags)?;
    writer.write_u16::<LittleEndian>(0)?;
    writer.write_f64::<LittleEndian>(config.false_positive_rate)?;
    writer.write_u64::<LittleEndian>(num_elements)?;

    if config.kind != FilterKind::None {
        filter.write_body(writer)?;
    }
    Ok(())
}

/// Validates the envelope and decodes the filter. Violations fail with
/// `FilterFormatInvalid`; an unrecognized kind byte with
/// `FilterKindUnknown`.
pub fn read_filter_file<R: Read>(reader: &mut R) -> Result<(FilterFileMetadata, ProbabilisticFilter)> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != FILTER_FILE_MAGIC {
        return Err(LogCaskError::FilterFormatInvalid(
            "bad filter file magic".into(),
        ));
    }

    let version = reader.read_u32::<LittleEndian>()?;
    if version != FILTER_FILE_VERSION {
        return Err(LogCaskError::FilterFormatInvalid(format!(
            "unsupported filter file version {version}"
        )));
    }

    let kind = FilterKind::try_from(reader.read_u8()?)?;
    let flags = reader.read_u8()?;
    let _reserved = reader.read_u16::<LittleEndian>()?;
    let false_positive_rate = reader.read_f64::<LittleEndian>()?;
    let num_elements = reader.read_u64::<LittleEndian>()?;

    let metadata = FilterFileMetadata {
        kind,
        normalize: (flags & FILTER_FLAG_NORMALIZED) != 0,
        false_positive_rate,
        num_elements,
    };

    let filter = if kind == FilterKind::None {
        ProbabilisticFilter::None
    } else {
        ProbabilisticFilter::read_body(kind, reader)?
    };

    Ok((metadata, filter))
}
