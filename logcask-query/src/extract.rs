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

//! Query term extraction
//!
//! Collects the equality terms a membership filter can answer. Only pure
//! conjunctions qualify: an OR branch could match through its other arm,
//! and an inverted subtree turns "must contain" into "must not", which a
//! filter cannot refute. In both cases the whole query is reported
//! unsupported and every archive passes conservatively.

use std::collections::HashSet;

use crate::ast::{Expression, FilterOperation};

/// Result of scanning an AST for skippable terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermExtraction {
    pub supported: bool,
    pub reason: Option<&'static str>,
    pub terms: Vec<String>,
}

impl TermExtraction {
    fn unsupported(reason: &'static str) -> Self {
        Self {
            supported: false,
            reason: Some(reason),
            terms: Vec::new(),
        }
    }
}

/// Walks the AST and collects candidate equality terms.
///
/// Traversal tracks the inversion context as the XOR of `is_inverted`
/// flags along the path. Non-EQ leaves and wildcard-bearing literals are
/// ignored (no term); OR and inversion make the query unsupported.
pub fn collect_filter_terms(expr: &Expression) -> TermExtraction {
    let mut result = TermExtraction {
        supported: true,
        reason: None,
        terms: Vec::new(),
    };
    collect(expr, false, &mut result);
    if !result.supported {
        result.terms.clear();
    }
    result
}

fn collect(expr: &Expression, inverted_context: bool, result: &mut TermExtraction) {
    if !result.supported {
        return;
    }

    let inverted = inverted_context ^ expr.is_inverted();
    if inverted {
        *result = TermExtraction::unsupported("inverted-expression");
        return;
    }

    match expr {
        Expression::Or { .. } => {
            *result = TermExtraction::unsupported("or-expression");
        }
        Expression::And { children, .. } => {
            for child in children {
                collect(child, inverted, result);
                if !result.supported {
                    return;
                }
            }
        }
        Expression::Filter(filter) => {
            if filter.operation != FilterOperation::Eq {
                return;
            }
            let Some(value) = filter.operand.as_ref().and_then(|l| l.as_var_string()) else {
                return;
            };
            if has_unescaped_wildcards(value) {
                return;
            }
            result.terms.push(unescape_string(value));
        }
    }
}

/// Deduplicates terms preserving first-seen order, and produces the
/// lower-cased variant set used against normalized filters.
pub fn dedup_terms(terms: &[String]) -> (Vec<String>, Vec<String>) {
    let mut seen = HashSet::new();
    let unique: Vec<String> = terms
        .iter()
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect();
    let lowered = unique.iter().map(|t| t.to_lowercase()).collect();
    (unique, lowered)
}

/// Whether `value` contains a `*` or `?` wildcard not escaped by a
/// backslash.
pub fn has_unescaped_wildcards(value: &str) -> bool {
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '*' | '?' => return true,
            _ => {}
        }
    }
    false
}

/// Removes one level of backslash escaping.
pub fn unescape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            out.push(c);
        }
    }
    if escaped {
        out.push('\\');
    }
    out
}
