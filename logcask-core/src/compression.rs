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

//! Section compression helpers
//!
//! Archive-side filter sections (per-schema variable-id and column filters)
//! are stored zstd-compressed, matching the rest of an archive's sections.
//! Standalone filter files and filter packs are stored uncompressed; their
//! layouts are fixed and external readers parse them directly.

use crate::error::Result;

/// Compression level for filter sections. Matches the archive's warm-tier
/// level: fast enough for write-time, compact enough for cold storage.
pub const SECTION_COMPRESSION_LEVEL: i32 = 3;

/// Compress a serialized section body.
pub fn compress_section(data: &[u8]) -> Result<Vec<u8>> {
    Ok(zstd::encode_all(data, SECTION_COMPRESSION_LEVEL)?)
}

/// Decompress a section body previously produced by [`compress_section`].
pub fn decompress_section(data: &[u8]) -> Result<Vec<u8>> {
    Ok(zstd::decode_all(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_roundtrip() {
        let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let compressed = compress_section(&payload).unwrap();
        assert!(compressed.len() < payload.len());
        let restored = decompress_section(&compressed).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn test_empty_section() {
        let compressed = compress_section(&[]).unwrap();
        let restored = decompress_section(&compressed).unwrap();
        assert!(restored.is_empty());
    }
}
