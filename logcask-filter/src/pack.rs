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

//! Filter pack container
//!
//! A filter pack aggregates many archives' filter files into one seekable
//! blob:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Body: filter files packed back to back                  │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index: "CLPI" ‖ version ‖ count ‖                       │
//! │        { id_len u8 ‖ id ‖ offset u64 ‖ size u32 }*      │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (32 bytes): "CLPF" ‖ version ‖ body_offset ‖     │
//! │                    index_offset ‖ index_size            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The builder streams each input into the output and holds only the index
//! entries in memory. The reader memory-maps the pack (falling back to a
//! full read) and resolves archive ids to body byte ranges.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;
use tracing::debug;

use logcask_core::{LogCaskError, Result};

pub const PACK_MAGIC: [u8; 4] = *b"CLPF";
pub const PACK_VERSION: u32 = 1;
pub const INDEX_MAGIC: [u8; 4] = *b"CLPI";
pub const INDEX_VERSION: u32 = 1;

/// magic + version + body_offset + index_offset + index_size
pub const PACK_FOOTER_SIZE: usize = 4 + 4 + 8 + 8 + 8;

/// magic + version + entry count
const INDEX_HEADER_SIZE: usize = 4 + 4 + 4;

const MAX_ARCHIVE_ID_LEN: usize = u8::MAX as usize;

/// One manifest input: an archive id and the filter file that describes it.
#[derive(Debug, Clone)]
pub struct FilterPackInput {
    pub archive_id: String,
    pub filter_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPackIndexEntry {
    pub archive_id: String,
    /// Offset relative to the start of the pack body
    pub offset: u64,
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterPackFooter {
    /// Always 0 in version 1; reserved for packs with a preamble
    pub body_offset: u64,
    pub index_offset: u64,
    pub index_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterPackBuildResult {
    pub num_filters: usize,
    pub size: u64,
    pub index_offset: u64,
    pub index_size: u64,
}

pub struct FilterPackBuilder;

impl FilterPackBuilder {
    /// Streams the manifest's filter files into `output_path` and appends
    /// the index and footer.
    ///
    /// The manifest must be non-empty; archive ids are limited to 255
    /// bytes; a single filter above `u32::MAX` bytes fails with
    /// `FilterTooLarge`. Duplicate ids are permitted; readers keep the
    /// last occurrence.
    pub fn build(output_path: &Path, inputs: &[FilterPackInput]) -> Result<FilterPackBuildResult> {
        if inputs.is_empty() {
            return Err(LogCaskError::InvalidArgument(
                "filter pack manifest contains no entries".into(),
            ));
        }

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer = BufWriter::new(File::create(output_path)?);
        let mut entries = Vec::with_capacity(inputs.len());
        let mut offset = 0u64;

        for input in inputs {
            if input.archive_id.len() > MAX_ARCHIVE_ID_LEN {
                return Err(LogCaskError::InvalidArgument(format!(
                    "archive id of {} bytes is too long to encode (limit {})",
                    input.archive_id.len(),
                    MAX_ARCHIVE_ID_LEN
                )));
            }

            let size = std::fs::metadata(&input.filter_path)?.len();
            if size > u64::from(u32::MAX) {
                return Err(LogCaskError::FilterTooLarge {
                    size,
                    max: u64::from(u32::MAX),
                });
            }

            let mut reader = File::open(&input.filter_path)?;
            let copied = io::copy(&mut reader, &mut writer)?;
            if copied != size {
                return Err(LogCaskError::FilterFormatInvalid(format!(
                    "filter file {} changed size during packing",
                    input.filter_path.display()
                )));
            }

            entries.push(FilterPackIndexEntry {
                archive_id: input.archive_id.clone(),
                offset,
                size: size as u32,
            });
            offset += size;
        }

        let index_offset = offset;
        let index_bytes = encode_index(&entries)?;
        writer.write_all(&index_bytes)?;

        let footer = FilterPackFooter {
            body_offset: 0,
            index_offset,
            index_size: index_bytes.len() as u64,
        };
        write_footer(&mut writer, &footer)?;
        writer.flush()?;

        let size = index_offset + index_bytes.len() as u64 + PACK_FOOTER_SIZE as u64;
        debug!(
            path = %output_path.display(),
            num_filters = entries.len(),
            size,
            "built filter pack"
        );

        Ok(FilterPackBuildResult {
            num_filters: entries.len(),
            size,
            index_offset,
            index_size: index_bytes.len() as u64,
        })
    }

    /// Groups manifest entries so no group's filter bytes exceed
    /// `max_pack_size`. A single oversized entry still forms its own
    /// group; order is preserved.
    pub fn split_by_size(
        inputs: &[FilterPackInput],
        max_pack_size: u64,
    ) -> Result<Vec<Vec<FilterPackInput>>> {
        let mut groups = Vec::new();
        let mut current: Vec<FilterPackInput> = Vec::new();
        let mut current_size = 0u64;

        for input in inputs {
            let size = std::fs::metadata(&input.filter_path)?.len();
            if !current.is_empty() && current_size + size > max_pack_size {
                groups.push(std::mem::take(&mut current));
                current_size = 0;
            }
            current.push(input.clone());
            current_size += size;
        }
        if !current.is_empty() {
            groups.push(current);
        }
        Ok(groups)
    }
}

fn encode_index(entries: &[FilterPackIndexEntry]) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(
        INDEX_HEADER_SIZE + entries.iter().map(|e| 1 + e.archive_id.len() + 12).sum::<usize>(),
    );
    buffer.write_all(&INDEX_MAGIC)?;
    buffer.write_u32::<LittleEndian>(INDEX_VERSION)?;
    buffer.write_u32::<LittleEndian>(entries.len() as u32)?;

    for entry in entries {
        buffer.write_u8(entry.archive_id.len() as u8)?;
        buffer.write_all(entry.archive_id.as_bytes())?;
        buffer.write_u64::<LittleEndian>(entry.offset)?;
        buffer.write_u32::<LittleEndian>(entry.size)?;
    }
    Ok(buffer)
}

fn decode_index(data: &[u8]) -> Result<Vec<FilterPackIndexEntry>> {
    if data.len() < INDEX_HEADER_SIZE {
        return Err(LogCaskError::PackIndexTruncated(
            "index header is incomplete".into(),
        ));
    }
    if data[..4] != INDEX_MAGIC {
        return Err(LogCaskError::FilterFormatInvalid("bad pack index magic".into()));
    }

    let mut cursor = Cursor::new(&data[4..]);
    let version = cursor.read_u32::<LittleEndian>()?;
    if version != INDEX_VERSION {
        return Err(LogCaskError::FilterFormatInvalid(format!(
            "unsupported pack index version {version}"
        )));
    }
    let num_entries = cursor.read_u32::<LittleEndian>()?;

    let mut offset = INDEX_HEADER_SIZE;
    let mut entries = Vec::with_capacity(num_entries as usize);
    for _ in 0..num_entries {
        if offset >= data.len() {
            return Err(LogCaskError::PackIndexTruncated(format!(
                "index ends after {} of {} entries",
                entries.len(),
                num_entries
            )));
        }
        let id_len = data[offset] as usize;
        offset += 1;
        if offset + id_len + 12 > data.len() {
            return Err(LogCaskError::PackIndexTruncated(format!(
                "entry {} extends past the index region",
                entries.len()
            )));
        }

        let archive_id = String::from_utf8_lossy(&data[offset..offset + id_len]).into_owned();
        offset += id_len;

        let mut tail = Cursor::new(&data[offset..offset + 12]);
        let entry_offset = tail.read_u64::<LittleEndian>()?;
        let entry_size = tail.read_u32::<LittleEndian>()?;
        offset += 12;

        entries.push(FilterPackIndexEntry {
            archive_id,
            offset: entry_offset,
            size: entry_size,
        });
    }
    Ok(entries)
}

fn write_footer<W: Write>(writer: &mut W, footer: &FilterPackFooter) -> Result<()> {
    writer.write_all(&PACK_MAGIC)?;
    writer.write_u32::<LittleEndian>(PACK_VERSION)?;
    writer.write_u64::<LittleEndian>(footer.body_offset)?;
    writer.write_u64::<LittleEndian>(footer.index_offset)?;
    writer.write_u64::<LittleEndian>(footer.index_size)?;
    Ok(())
}

fn parse_footer(data: &[u8]) -> Result<FilterPackFooter> {
    if data.len() < PACK_FOOTER_SIZE {
        return Err(LogCaskError::FilterFormatInvalid(
            "pack is too small for a footer".into(),
        ));
    }
    let footer_bytes = &data[data.len() - PACK_FOOTER_SIZE..];
    if footer_bytes[..4] != PACK_MAGIC {
        return Err(LogCaskError::FilterFormatInvalid("bad pack magic".into()));
    }

    let mut cursor = Cursor::new(&footer_bytes[4..]);
    let version = cursor.read_u32::<LittleEndian>()?;
    if version != PACK_VERSION {
        return Err(LogCaskError::FilterFormatInvalid(format!(
            "unsupported pack version {version}"
        )));
    }

    let footer = FilterPackFooter {
        body_offset: cursor.read_u64::<LittleEndian>()?,
        index_offset: cursor.read_u64::<LittleEndian>()?,
        index_size: cursor.read_u64::<LittleEndian>()?,
    };

    let index_end = footer
        .index_offset
        .checked_add(footer.index_size)
        .ok_or_else(|| LogCaskError::PackIndexTruncated("index range overflows".into()))?;
    if index_end > data.len() as u64 {
        return Err(LogCaskError::PackIndexTruncated(format!(
            "index region [{}, {}) is outside the {}-byte pack",
            footer.index_offset,
            index_end,
            data.len()
        )));
    }
    Ok(footer)
}

enum PackBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl PackBytes {
    fn as_slice(&self) -> &[u8] {
        match self {
            PackBytes::Mapped(map) => map,
            PackBytes::Owned(buf) => buf,
        }
    }
}

/// Read-only view over a filter pack. No concurrent writer may exist over
/// the pack file while a reader is open.
pub struct FilterPackReader {
    data: PackBytes,
    footer: FilterPackFooter,
    /// Later duplicates replace earlier ones during construction
    entries: HashMap<String, FilterPackIndexEntry>,
}

impl FilterPackReader {
    /// Opens and indexes a pack. The file is memory-mapped when possible
    /// and fully read otherwise.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let data = match unsafe { Mmap::map(&file) } {
            Ok(map) => PackBytes::Mapped(map),
            Err(_) => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf)?;
                PackBytes::Owned(buf)
            }
        };
        Self::from_bytes(data)
    }

    /// Indexes a pack already resident in memory.
    pub fn from_buffer(buffer: Vec<u8>) -> Result<Self> {
        Self::from_bytes(PackBytes::Owned(buffer))
    }

    fn from_bytes(data: PackBytes) -> Result<Self> {
        let footer = parse_footer(data.as_slice())?;
        let index_region = &data.as_slice()
            [footer.index_offset as usize..(footer.index_offset + footer.index_size) as usize];
        let decoded = decode_index(index_region)?;

        let mut entries = HashMap::with_capacity(decoded.len());
        for entry in decoded {
            entries.insert(entry.archive_id.clone(), entry);
        }

        Ok(Self {
            data,
            footer,
            entries,
        })
    }

    /// Resolves an archive id to its filter file bytes. Unknown ids and
    /// entries whose recorded range falls outside the pack return `None`
    /// ("filter absent": callers default to letting the archive pass).
    pub fn lookup(&self, archive_id: &str) -> Option<&[u8]> {
        let entry = self.entries.get(archive_id)?;
        let start = self.footer.body_offset.checked_add(entry.offset)?;
        let end = start.checked_add(u64::from(entry.size))?;
        let data = self.data.as_slice();
        if end > data.len() as u64 {
            return None;
        }
        Some(&data[start as usize..end as usize])
    }

    pub fn contains(&self, archive_id: &str) -> bool {
        self.entries.contains_key(archive_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn archive_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
