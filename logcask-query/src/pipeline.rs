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

//! Skip decision pipeline
//!
//! Orchestrates the three decision tiers in fixed order:
//!
//! 1. **Archive tier**: per-archive filters from the filter pack decide
//!    which archives could contain every query term. Skipping here avoids
//!    all IO for the archive.
//! 2. **Dictionary tier**: before variable dictionary entries load, the
//!    dictionary hook decides whether any term can exist at all. Skipping
//!    here avoids the largest single read in a passing archive.
//! 3. **Schema tier**: after dictionaries resolve terms to variable ids,
//!    per-schema filters decide which schemas' packed streams to open.
//!
//! A later tier must not run unless the earlier tier passed. Read-path
//! failures collapse to "might match": a filter that cannot be loaded
//! never skips anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use logcask_archive::{DictionaryFilterHook, SchemaFilterCache};
use logcask_core::{LogCaskError, Result};
use logcask_filter::file::read_filter_file;
use logcask_filter::probabilistic::FilterKind;
use logcask_filter::FilterPackReader;

use crate::ast::Expression;
use crate::extract::{collect_filter_terms, dedup_terms};

/// Pipeline progress. Any negative answer transitions directly to `Done`
/// with an empty result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    ArchivePassed,
    DictionaryLoaded,
    SchemaEvaluated,
    Done,
}

/// Archive-tier result, also the CLI's JSON payload.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveScanOutcome {
    pub supported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub passed: Vec<String>,
    pub total: usize,
    pub skipped: usize,
}

impl ArchiveScanOutcome {
    fn pass_all(archive_ids: &[String], supported: bool, reason: Option<String>) -> Self {
        Self {
            supported,
            reason,
            passed: archive_ids.to_vec(),
            total: archive_ids.len(),
            skipped: 0,
        }
    }
}

/// One schema to evaluate in the schema tier, with the query's resolvable
/// column predicates.
#[derive(Debug, Clone)]
pub struct SchemaCandidate {
    pub schema_id: i32,
    /// `(column_id, value)` integer equality predicates
    pub int_predicates: Vec<(i32, i64)>,
    /// `(column_id, value)` string equality predicates
    pub str_predicates: Vec<(i32, Vec<u8>)>,
}

impl SchemaCandidate {
    pub fn new(schema_id: i32) -> Self {
        Self {
            schema_id,
            int_predicates: Vec::new(),
            str_predicates: Vec::new(),
        }
    }
}

/// State machine driving the skip decisions for one query over one pack's
/// archives. Owned by a single worker; archives are processed
/// cooperatively within it.
pub struct SkipDecisionPipeline {
    state: PipelineState,
    cancel: Option<Arc<AtomicBool>>,
}

impl Default for SkipDecisionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl SkipDecisionPipeline {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            cancel: None,
        }
    }

    /// Attaches a cancellation signal, honored between tiers and between
    /// schemas.
    pub fn with_cancellation(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn check_cancelled(&mut self) -> Result<()> {
        if let Some(cancel) = &self.cancel {
            if cancel.load(Ordering::Relaxed) {
                self.state = PipelineState::Done;
                return Err(LogCaskError::Cancelled);
            }
        }
        Ok(())
    }

    fn require_state(&self, expected: PipelineState) -> Result<()> {
        if self.state != expected {
            return Err(LogCaskError::InvalidArgument(format!(
                "pipeline tier entered from {:?}, requires {:?}",
                self.state, expected
            )));
        }
        Ok(())
    }

    /// Archive tier. Every extracted term must pass an archive's filter
    /// for the archive to stay in the candidate set; archives without an
    /// index entry, with unreadable filters, or with the `None`
    /// placeholder pass conservatively.
    pub fn scan_archives(
        &mut self,
        pack: &FilterPackReader,
        archive_ids: &[String],
        expr: &Expression,
        ignore_case: bool,
    ) -> Result<ArchiveScanOutcome> {
        self.require_state(PipelineState::Idle)?;
        self.check_cancelled()?;

        let extraction = collect_filter_terms(expr);
        if !extraction.supported || extraction.terms.is_empty() {
            debug!(
                supported = extraction.supported,
                reason = ?extraction.reason,
                "query is not prunable, all archives pass"
            );
            self.state = if archive_ids.is_empty() {
                PipelineState::Done
            } else {
                PipelineState::ArchivePassed
            };
            return Ok(ArchiveScanOutcome::pass_all(
                archive_ids,
                extraction.supported,
                extraction.reason.map(str::to_owned),
            ));
        }

        let (terms, terms_lower) = dedup_terms(&extraction.terms);

        let mut passed = Vec::with_capacity(archive_ids.len());
        let mut skipped = 0usize;

        for archive_id in archive_ids {
            let Some(bytes) = pack.lookup(archive_id) else {
                passed.push(archive_id.clone());
                continue;
            };

            let (metadata, filter) = match read_filter_file(&mut &bytes[..]) {
                Ok(decoded) => decoded,
                Err(err) => {
                    warn!(%archive_id, %err, "unreadable archive filter, passing conservatively");
                    passed.push(archive_id.clone());
                    continue;
                }
            };

            if metadata.kind == FilterKind::None {
                passed.push(archive_id.clone());
                continue;
            }

            // Filters are byte-exact; a case-insensitive query can only be
            // answered by a filter built over normalized values
            if ignore_case && !metadata.normalize {
                passed.push(archive_id.clone());
                continue;
            }

            let terms_to_check = if metadata.normalize { &terms_lower } else { &terms };
            let matches = terms_to_check
                .iter()
                .all(|term| filter.possibly_contains(term.as_bytes()));

            if matches {
                passed.push(archive_id.clone());
            } else {
                skipped += 1;
            }
        }

        info!(
            total = archive_ids.len(),
            passed = passed.len(),
            skipped,
            "archive filter scan complete"
        );

        self.state = if passed.is_empty() {
            PipelineState::Done
        } else {
            PipelineState::ArchivePassed
        };

        Ok(ArchiveScanOutcome {
            supported: true,
            reason: None,
            passed,
            total: archive_ids.len(),
            skipped,
        })
    }

    /// Dictionary-load tier. Returns true when the dictionary must be
    /// loaded (some term might exist, or the query is not prunable);
    /// false when every term is rejected and the archive can be
    /// short-circuited with no matches.
    ///
    /// A case-insensitive query passes through the hook unrefuted unless
    /// the dictionary filter was built over normalized values.
    pub fn evaluate_dictionary(
        &mut self,
        hook: &DictionaryFilterHook,
        terms: &[String],
        ignore_case: bool,
    ) -> Result<bool> {
        self.require_state(PipelineState::ArchivePassed)?;
        self.check_cancelled()?;

        if terms.is_empty() {
            self.state = PipelineState::DictionaryLoaded;
            return Ok(true);
        }

        let passes = terms
            .iter()
            .filter(|t| hook.might_contain(t, ignore_case))
            .count();
        debug!(
            terms = terms.len(),
            passes,
            "dictionary filter pre-check"
        );

        if passes > 0 {
            self.state = PipelineState::DictionaryLoaded;
            Ok(true)
        } else {
            info!("all terms rejected by dictionary filter, skipping dictionary load");
            self.state = PipelineState::Done;
            Ok(false)
        }
    }

    /// Schema tier. Returns the schemas whose packed streams must still be
    /// read. A schema is skipped when none of the searched variable ids
    /// pass its filter, or when a resolvable column predicate is proven
    /// absent.
    ///
    /// String predicates are byte-exact and cannot refute a
    /// case-insensitive query; var-id checks are unaffected because the
    /// dictionary resolved the ids case-appropriately already.
    pub fn evaluate_schemas(
        &mut self,
        cache: &SchemaFilterCache,
        candidates: &[SchemaCandidate],
        searched_var_ids: &[u64],
        ignore_case: bool,
    ) -> Result<Vec<i32>> {
        self.require_state(PipelineState::DictionaryLoaded)?;

        let mut matched = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            self.check_cancelled()?;

            if !cache.might_contain(candidate.schema_id, searched_var_ids) {
                debug!(schema_id = candidate.schema_id, "schema skipped by var-id filter");
                continue;
            }

            let int_rejected = candidate
                .int_predicates
                .iter()
                .any(|&(column_id, value)| {
                    !cache.int_might_contain(candidate.schema_id, column_id, value)
                });
            if int_rejected {
                debug!(schema_id = candidate.schema_id, "schema skipped by int column filter");
                continue;
            }

            let str_rejected = candidate
                .str_predicates
                .iter()
                .any(|(column_id, value)| {
                    !cache.str_might_contain(candidate.schema_id, *column_id, value, ignore_case)
                });
            if str_rejected {
                debug!(schema_id = candidate.schema_id, "schema skipped by str column filter");
                continue;
            }

            matched.push(candidate.schema_id);
        }

        self.state = if matched.is_empty() {
            PipelineState::Done
        } else {
            PipelineState::SchemaEvaluated
        };
        Ok(matched)
    }

    /// Marks the pipeline complete.
    pub fn finish(&mut self) {
        self.state = PipelineState::Done;
    }
}
