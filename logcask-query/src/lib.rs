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

//! LogCask query-side skip decisions
//!
//! Turns a parsed query tree into skip decisions over archives, schemas,
//! and dictionary loads:
//!
//! - **AST** (`ast`): the boolean query tree contract shared with the
//!   search front-end
//! - **Parser** (`parse`): a minimal `column: value` query parser for the
//!   CLI surface
//! - **Extraction** (`extract`): collects the equality terms a filter can
//!   answer, under AND/inversion rules
//! - **Pipeline** (`pipeline`): the archive → dictionary → schema skip
//!   state machine

pub mod ast;
pub mod extract;
pub mod parse;
pub mod pipeline;

pub use ast::{Expression, FilterExpr, FilterOperation, Literal};
pub use extract::{collect_filter_terms, TermExtraction};
pub use pipeline::{ArchiveScanOutcome, PipelineState, SchemaCandidate, SkipDecisionPipeline};
