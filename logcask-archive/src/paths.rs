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

//! Archive filter section naming
//!
//! Filter sections live next to the sections they describe. A dictionary
//! at `<archive>/var.dict` gets its filter at `<archive>/var.dict.filter`;
//! per-schema filters are named by schema id and section type.

use std::path::{Path, PathBuf};

/// Suffix appended to a dictionary path for its companion filter file.
pub const FILTER_FILE_SUFFIX: &str = ".filter";

/// Path of the filter file guarding the dictionary at `dictionary_path`.
pub fn dictionary_filter_path(dictionary_path: &Path) -> PathBuf {
    let mut os_string = dictionary_path.as_os_str().to_os_string();
    os_string.push(FILTER_FILE_SUFFIX);
    PathBuf::from(os_string)
}

/// Path of a schema's variable-id filter section.
pub fn schema_var_filter_path(archive_dir: &Path, schema_id: i32) -> PathBuf {
    archive_dir.join(format!("{schema_id}.var.filter"))
}

/// Path of a schema's integer column filter section.
pub fn schema_int_filter_path(archive_dir: &Path, schema_id: i32) -> PathBuf {
    archive_dir.join(format!("{schema_id}.int.filter"))
}

/// Path of a schema's string column filter section.
pub fn schema_str_filter_path(archive_dir: &Path, schema_id: i32) -> PathBuf {
    archive_dir.join(format!("{schema_id}.str.filter"))
}
