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

//! Error types for LogCask

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogCaskError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid filter format: {0}")]
    FilterFormatInvalid(String),

    #[error("Unknown filter kind tag: {0}")]
    FilterKindUnknown(u8),

    #[error("Filter construction failed: {0}")]
    FilterConstructionFailed(String),

    #[error("Filter too large: {size} bytes exceeds {max} byte limit")]
    FilterTooLarge { size: u64, max: u64 },

    #[error("Filter pack index truncated: {0}")]
    PackIndexTruncated(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, LogCaskError>;
