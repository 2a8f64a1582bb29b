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

//! End-to-end skip decisions: write dictionary and schema filters the way
//! an archive writer would, pack the archive filters, then drive a query
//! through all three tiers.

use std::path::Path;

use tempfile::TempDir;

use logcask_archive::paths::dictionary_filter_path;
use logcask_archive::{
    DictionaryFilterHook, DictionaryFilterWriter, SchemaFilterCache, SchemaFilterWriter,
};
use logcask_filter::pack::{FilterPackBuilder, FilterPackInput};
use logcask_filter::probabilistic::FilterKind;
use logcask_filter::{FilterConfig, FilterPackReader};
use logcask_query::parse::parse_query;
use logcask_query::pipeline::{PipelineState, SchemaCandidate, SkipDecisionPipeline};
use logcask_query::{collect_filter_terms, extract::dedup_terms};

struct TestArchive {
    id: String,
    dir: std::path::PathBuf,
}

/// Writes one archive's dictionary filter the way the dictionary writer
/// does at close, and returns the filter file path for packing.
fn write_archive(root: &Path, id: &str, dictionary_values: &[&str]) -> TestArchive {
    let dir = root.join(id);
    std::fs::create_dir_all(&dir).unwrap();

    let config = FilterConfig::new(FilterKind::BloomV1, 0.01);
    let mut writer = DictionaryFilterWriter::new(config);
    for value in dictionary_values {
        writer.record(value.as_bytes());
    }
    let filter_path = dictionary_filter_path(&dir.join("var.dict"));
    writer.write(&filter_path).unwrap();

    TestArchive {
        id: id.to_owned(),
        dir,
    }
}

fn pack_archives(root: &Path, archives: &[&TestArchive]) -> FilterPackReader {
    let inputs: Vec<FilterPackInput> = archives
        .iter()
        .map(|archive| FilterPackInput {
            archive_id: archive.id.clone(),
            filter_path: dictionary_filter_path(&archive.dir.join("var.dict")),
        })
        .collect();
    let pack_path = root.join("filters.clpf");
    FilterPackBuilder::build(&pack_path, &inputs).unwrap();
    FilterPackReader::open(&pack_path).unwrap()
}

#[test]
fn three_tier_walkthrough() {
    let root = TempDir::new().unwrap();

    // web-1 logs reference "timeout"; db-1 and db-2 do not
    let web = write_archive(root.path(), "web-1", &["timeout", "retrying", "connected"]);
    let db1 = write_archive(root.path(), "db-1", &["commit", "rollback"]);
    let db2 = write_archive(root.path(), "db-2", &["vacuum", "checkpoint"]);
    let pack = pack_archives(root.path(), &[&web, &db1, &db2]);

    let expr = parse_query("msg: timeout").unwrap();
    let archive_ids: Vec<String> = ["web-1", "db-1", "db-2"].map(String::from).to_vec();

    // Tier 1: only web-1 survives the archive scan
    let mut pipeline = SkipDecisionPipeline::new();
    let outcome = pipeline
        .scan_archives(&pack, &archive_ids, &expr, false)
        .unwrap();
    assert_eq!(outcome.passed, vec!["web-1"]);
    assert_eq!(outcome.skipped, 2);

    // Tier 2: web-1's dictionary filter admits "timeout"
    let hook = DictionaryFilterHook::new();
    assert!(hook.load(&dictionary_filter_path(&web.dir.join("var.dict"))));

    let extraction = collect_filter_terms(&expr);
    let (terms, _) = dedup_terms(&extraction.terms);
    assert!(pipeline.evaluate_dictionary(&hook, &terms, false).unwrap());
    assert_eq!(pipeline.state(), PipelineState::DictionaryLoaded);

    // Tier 3: schema 1 references the term's var id, schema 2 does not
    let mut writer = SchemaFilterWriter::new();
    writer.record_var_id(77);
    writer.write(&web.dir, 1).unwrap();
    let mut writer = SchemaFilterWriter::new();
    writer.record_var_id(5000);
    writer.write(&web.dir, 2).unwrap();

    let mut cache = SchemaFilterCache::new();
    cache.preload(&web.dir, &[1, 2]);

    let candidates = vec![SchemaCandidate::new(1), SchemaCandidate::new(2)];
    let matched = pipeline.evaluate_schemas(&cache, &candidates, &[77], false).unwrap();
    assert_eq!(matched, vec![1]);
    assert_eq!(pipeline.state(), PipelineState::SchemaEvaluated);

    cache.release();
}

#[test]
fn dictionary_tier_short_circuits_archive() {
    let root = TempDir::new().unwrap();
    let web = write_archive(root.path(), "web-1", &["connected", "retrying"]);
    let pack = pack_archives(root.path(), &[&web]);

    // The archive filter is conservative enough to pass, but suppose it
    // did: the dictionary tier must still reject a term that is absent
    let expr = parse_query("msg: connected AND msg: retrying").unwrap();
    let mut pipeline = SkipDecisionPipeline::new();
    let outcome = pipeline
        .scan_archives(&pack, &[web.id.clone()], &expr, false)
        .unwrap();
    assert_eq!(outcome.passed, vec!["web-1"]);

    let hook = DictionaryFilterHook::new();
    assert!(hook.load(&dictionary_filter_path(&web.dir.join("var.dict"))));

    // A term the dictionary never saw: skip the load, archive is done
    let must_load = pipeline
        .evaluate_dictionary(&hook, &["nonexistent-term-zzz".into()], false)
        .unwrap();
    assert!(!must_load);
    assert_eq!(pipeline.state(), PipelineState::Done);
}

#[test]
fn unreadable_pack_entry_is_conservative() {
    let root = TempDir::new().unwrap();
    let web = write_archive(root.path(), "web-1", &["timeout"]);

    // Pack a garbage filter body under a different archive id
    let garbage_path = root.path().join("garbage.filter");
    std::fs::write(&garbage_path, b"definitely not a filter file").unwrap();

    let inputs = vec![
        FilterPackInput {
            archive_id: "web-1".into(),
            filter_path: dictionary_filter_path(&web.dir.join("var.dict")),
        },
        FilterPackInput {
            archive_id: "broken-1".into(),
            filter_path: garbage_path,
        },
    ];
    let pack_path = root.path().join("filters.clpf");
    FilterPackBuilder::build(&pack_path, &inputs).unwrap();
    let pack = FilterPackReader::open(&pack_path).unwrap();

    let expr = parse_query("msg: timeout").unwrap();
    let ids: Vec<String> = ["web-1", "broken-1"].map(String::from).to_vec();

    let mut pipeline = SkipDecisionPipeline::new();
    let outcome = pipeline.scan_archives(&pack, &ids, &expr, false).unwrap();

    // The unreadable filter never skips its archive
    assert!(outcome.passed.contains(&"broken-1".to_string()));
    assert!(outcome.passed.contains(&"web-1".to_string()));
}
