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

//! Search query AST
//!
//! The boolean query tree the search front-end hands to the skip
//! pipeline: AND/OR nodes and filter leaves, each carrying an inversion
//! flag. The parser producing this tree is an external collaborator; the
//! types here are its contract surface.

/// Comparison operation of a filter leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperation {
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    Exists,
    NotExists,
}

/// A typed literal operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    VarString(String),
}

impl Literal {
    /// The literal as a dictionary-variable string, when it is one.
    pub fn as_var_string(&self) -> Option<&str> {
        match self {
            Literal::VarString(value) => Some(value),
            Literal::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Int(value) => Some(*value),
            Literal::VarString(_) => None,
        }
    }
}

/// Reference to the column a filter leaf constrains.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    /// Column path as written in the query (e.g. `attr.level`)
    pub name: String,
    /// Resolved column id, when schema resolution has run
    pub column_id: Option<i32>,
}

impl ColumnRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_id: None,
        }
    }
}

/// A single predicate leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpr {
    pub column: ColumnRef,
    pub operation: FilterOperation,
    pub operand: Option<Literal>,
    pub inverted: bool,
}

impl FilterExpr {
    pub fn eq(column: impl Into<String>, operand: Literal) -> Self {
        Self {
            column: ColumnRef::named(column),
            operation: FilterOperation::Eq,
            operand: Some(operand),
            inverted: false,
        }
    }
}

/// A boolean combination of predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    And {
        children: Vec<Expression>,
        inverted: bool,
    },
    Or {
        children: Vec<Expression>,
        inverted: bool,
    },
    Filter(FilterExpr),
}

impl Expression {
    pub fn and(children: Vec<Expression>) -> Self {
        Expression::And {
            children,
            inverted: false,
        }
    }

    pub fn or(children: Vec<Expression>) -> Self {
        Expression::Or {
            children,
            inverted: false,
        }
    }

    pub fn filter(filter: FilterExpr) -> Self {
        Expression::Filter(filter)
    }

    /// This node's own inversion flag (not the path-accumulated context).
    pub fn is_inverted(&self) -> bool {
        match self {
            Expression::And { inverted, .. } | Expression::Or { inverted, .. } => *inverted,
            Expression::Filter(filter) => filter.inverted,
        }
    }

    /// Toggles this node's inversion flag.
    pub fn invert(mut self) -> Self {
        match &mut self {
            Expression::And { inverted, .. } | Expression::Or { inverted, .. } => {
                *inverted = !*inverted;
            }
            Expression::Filter(filter) => filter.inverted = !filter.inverted,
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invert_toggles() {
        let expr = Expression::and(vec![]);
        assert!(!expr.is_inverted());
        let inverted = expr.invert();
        assert!(inverted.is_inverted());
        assert!(!inverted.invert().is_inverted());
    }

    #[test]
    fn test_literal_accessors() {
        assert_eq!(Literal::Int(5).as_int(), Some(5));
        assert_eq!(Literal::Int(5).as_var_string(), None);
        assert_eq!(
            Literal::VarString("x".into()).as_var_string(),
            Some("x")
        );
    }
}
