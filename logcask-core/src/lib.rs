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

//! LogCask core
//!
//! Shared building blocks for the LogCask filter subsystem:
//!
//! - **Errors** (`error`): the error taxonomy used across every crate in
//!   the workspace.
//! - **Compression** (`compression`): zstd helpers for archive filter
//!   sections.

pub mod compression;
pub mod error;

pub use error::{LogCaskError, Result};
