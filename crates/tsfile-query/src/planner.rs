//! Query requests: selected paths plus an optional filter

use tsfile_common::types::{Path, Timestamp};

use crate::expression::{Expression, Operator};

/// Bound value meaning "no limit" in [`QueryExpression::begin_end`]
pub const UNBOUNDED: Timestamp = -1;

/// Columns to return and the predicate rows must satisfy
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExpression {
    selected: Vec<Path>,
    expression: Option<Expression>,
}

impl QueryExpression {
    pub fn new(selected: Vec<Path>, expression: Option<Expression>) -> Self {
        Self {
            selected,
            expression,
        }
    }

    /// Every row of the selected columns
    pub fn read_all(selected: Vec<Path>) -> Self {
        Self::new(selected, None)
    }

    /// Rows with `begin <= time <= end`; a missing bound is open
    pub fn time_range(selected: Vec<Path>, begin: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        let lower = begin.map(|t| Expression::global_time(Operator::Ge, t));
        let upper = end.map(|t| Expression::global_time(Operator::Le, t));
        let expression = match (lower, upper) {
            (Some(lower), Some(upper)) => Some(Expression::and(lower, upper)),
            (lower, upper) => lower.or(upper),
        };
        Self::new(selected, expression)
    }

    /// [`QueryExpression::time_range`] with [`UNBOUNDED`] marking an open side
    pub fn begin_end(selected: Vec<Path>, begin: Timestamp, end: Timestamp) -> Self {
        let bound = |t: Timestamp| (t != UNBOUNDED).then_some(t);
        Self::time_range(selected, bound(begin), bound(end))
    }

    pub fn selected(&self) -> &[Path] {
        &self.selected
    }

    pub fn expression(&self) -> Option<&Expression> {
        self.expression.as_ref()
    }

    pub fn into_parts(self) -> (Vec<Path>, Option<Expression>) {
        (self.selected, self.expression)
    }
}
