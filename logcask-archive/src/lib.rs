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

//! LogCask archive-side filter plumbing
//!
//! The pieces that attach filters to an archive's dictionaries and
//! schemas:
//!
//! - **Dictionary filters** (`dictionary`): a writer-side companion that
//!   observes every value a dictionary ever sees, and a reader-side hook
//!   that answers `might_contain` before dictionary entries are loaded.
//! - **Schema filters** (`schema_cache`): a writer that collects each
//!   schema's variable ids and column values, and a per-archive cache the
//!   reader preloads before opening packed streams.
//! - **Paths** (`paths`): the archive's filter section naming convention.

pub mod dictionary;
pub mod paths;
pub mod schema_cache;

pub use dictionary::{DictionaryFilterHook, DictionaryFilterWriter};
pub use schema_cache::{SchemaFilterCache, SchemaFilterWriter};
