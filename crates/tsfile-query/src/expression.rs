//! Filter expression trees
//!
//! An [`Expression`] is either a composite (`And`/`Or`) owning its
//! children, or a leaf owning only its [`Filter`]: `GlobalTime` tests the
//! row timestamp, `Series` tests one column path. Composite children live
//! in a [`Group`], which is either binary (left/right slots, grown by
//! nesting) or flat (bounded list).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use tsfile_common::error::{Error, QueryError, Rejected, Result};
use tsfile_common::types::{Path, Timestamp, Value};

/// Fan-out bound of a flat group
pub const MAX_COLUMN_FILTER_NUM: usize = 10;

// ============================================================================
// Operators and Filters
// ============================================================================

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Lt,
    Le,
    Eq,
    Gt,
    Ge,
    NotEq,
}

impl Operator {
    /// Whether `lhs <op> rhs` holds given `lhs.cmp(rhs)`
    #[must_use]
    pub fn matches(self, ordering: Ordering) -> bool {
        match self {
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::NotEq => ordering != Ordering::Equal,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Eq => "=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::NotEq => "!=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            "=" | "==" => Ok(Operator::Eq),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "!=" | "<>" => Ok(Operator::NotEq),
            other => Err(Error::InvalidArgument(format!("unknown operator {other}"))),
        }
    }
}

/// Bound a filter compares against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Time(Timestamp),
    Value(Value),
}

/// A single comparison: operator plus bound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    op: Operator,
    operand: Operand,
}

impl Filter {
    /// Predicate over the row timestamp
    pub fn time(op: Operator, bound: Timestamp) -> Self {
        Self {
            op,
            operand: Operand::Time(bound),
        }
    }

    /// Predicate over a column value
    pub fn value(op: Operator, bound: impl Into<Value>) -> Self {
        Self {
            op,
            operand: Operand::Value(bound.into()),
        }
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    pub fn is_time_filter(&self) -> bool {
        matches!(self.operand, Operand::Time(_))
    }

    /// Test a timestamp against this filter
    pub fn test_time(&self, timestamp: Timestamp) -> bool {
        match &self.operand {
            Operand::Time(bound) => self.op.matches(timestamp.cmp(bound)),
            Operand::Value(bound) => self.test_value(&Value::Int64(timestamp)),
        }
    }

    /// Test a value against this filter. Incomparable pairs never match.
    pub fn test_value(&self, value: &Value) -> bool {
        let bound = match &self.operand {
            Operand::Time(bound) => Value::Int64(*bound),
            Operand::Value(bound) => bound.clone(),
        };
        value
            .compare(&bound)
            .is_some_and(|ordering| self.op.matches(ordering))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Operand::Time(bound) => write!(f, "time {} {}", self.op, bound),
            Operand::Value(bound) => write!(f, "{} {}", self.op, bound),
        }
    }
}

// ============================================================================
// Expression Tree
// ============================================================================

/// Children of an `And`/`Or` node
#[derive(Debug)]
pub enum Group {
    /// Two slots; a third child nests a new node under `right`
    Binary {
        left: Option<Box<Expression>>,
        right: Option<Box<Expression>>,
    },
    /// Up to [`MAX_COLUMN_FILTER_NUM`] children
    Flat(Vec<Expression>),
}

impl Group {
    fn empty_binary() -> Self {
        Group::Binary {
            left: None,
            right: None,
        }
    }

    /// Direct children in order
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Group::Binary { left, right } => left.iter().chain(right.iter()).map(|child| &**child).collect(),
            Group::Flat(children) => children.iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Group::Binary { left, right } => usize::from(left.is_some()) + usize::from(right.is_some()),
            Group::Flat(children) => children.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn into_children(mut self) -> Vec<Expression> {
        self.take_children()
    }

    fn take_children(&mut self) -> Vec<Expression> {
        match self {
            Group::Binary { left, right } => left.take().into_iter().chain(right.take()).map(|child| *child).collect(),
            Group::Flat(children) => std::mem::take(children),
        }
    }

    /// Same kind and slot layout, ignoring the children themselves
    fn same_shape(&self, other: &Group) -> bool {
        match (self, other) {
            (Group::Binary { left: l1, right: r1 }, Group::Binary { left: l2, right: r2 }) => {
                l1.is_some() == l2.is_some() && r1.is_some() == r2.is_some()
            }
            (Group::Flat(a), Group::Flat(b)) => a.len() == b.len(),
            _ => false,
        }
    }

    /// Copy of the layout with `children` (in order) placed into the slots
    fn rebuild(&self, children: Vec<Expression>) -> Group {
        match self {
            Group::Binary { left, right } => {
                let mut children = children.into_iter().map(Box::new);
                let left = if left.is_some() { children.next() } else { None };
                let right = if right.is_some() { children.next() } else { None };
                Group::Binary { left, right }
            }
            Group::Flat(_) => Group::Flat(children),
        }
    }
}

impl Drop for Group {
    /// Releases nested children from a heap stack; binary groups nest one
    /// level per added child.
    fn drop(&mut self) {
        let mut stack = self.take_children();
        while let Some(mut expr) = stack.pop() {
            if let Expression::And(group) | Expression::Or(group) = &mut expr {
                stack.extend(group.take_children());
            }
        }
    }
}

/// Query predicate tree.
///
/// Every traversal (evaluation, formatting, cloning, comparison and drop)
/// runs on an explicit stack, so arbitrarily deep binary groups are safe.
pub enum Expression {
    And(Group),
    Or(Group),
    /// Time-only predicate applied to every row
    GlobalTime(Filter),
    /// Predicate on one column
    Series { path: Path, filter: Filter },
}

impl Expression {
    /// Series leaf testing the timestamps at which `owner.column` has a point
    pub fn time_filter(
        owner: impl Into<String>,
        column: impl Into<String>,
        op: Operator,
        bound: Timestamp,
    ) -> Self {
        Expression::Series {
            path: Path::new(owner, column),
            filter: Filter::time(op, bound),
        }
    }

    /// Series leaf testing the values of `owner.column`
    pub fn column_filter(
        owner: impl Into<String>,
        column: impl Into<String>,
        op: Operator,
        bound: impl Into<Value>,
    ) -> Self {
        Expression::Series {
            path: Path::new(owner, column),
            filter: Filter::value(op, bound),
        }
    }

    /// Time-only leaf, independent of any column
    pub fn global_time(op: Operator, bound: Timestamp) -> Self {
        Expression::GlobalTime(Filter::time(op, bound))
    }

    /// Empty binary AND
    pub fn and_group() -> Self {
        Expression::And(Group::empty_binary())
    }

    /// Empty binary OR
    pub fn or_group() -> Self {
        Expression::Or(Group::empty_binary())
    }

    /// Binary AND of two expressions
    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::And(Group::Binary {
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        })
    }

    /// Binary OR of two expressions
    pub fn or(left: Expression, right: Expression) -> Self {
        Expression::Or(Group::Binary {
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        })
    }

    /// Empty flat AND
    pub fn flat_and() -> Self {
        Expression::And(Group::Flat(Vec::new()))
    }

    /// Empty flat OR
    pub fn flat_or() -> Self {
        Expression::Or(Group::Flat(Vec::new()))
    }

    /// Flat AND of up to [`MAX_COLUMN_FILTER_NUM`] children
    pub fn all_of(children: Vec<Expression>) -> Result<Self> {
        if children.len() > MAX_COLUMN_FILTER_NUM {
            return Err(QueryError::FilterGroupFull(MAX_COLUMN_FILTER_NUM).into());
        }
        Ok(Expression::And(Group::Flat(children)))
    }

    /// Flat OR of up to [`MAX_COLUMN_FILTER_NUM`] children
    pub fn any_of(children: Vec<Expression>) -> Result<Self> {
        if children.len() > MAX_COLUMN_FILTER_NUM {
            return Err(QueryError::FilterGroupFull(MAX_COLUMN_FILTER_NUM).into());
        }
        Ok(Expression::Or(Group::Flat(children)))
    }

    /// Add `child` to this AND node.
    ///
    /// A full binary node moves its right child under a new AND node and
    /// adds `child` there, so every added child stays in the conjunction.
    /// A full flat node refuses the child and hands it back.
    pub fn add_to_and_group(&mut self, child: Expression) -> std::result::Result<(), Rejected<Expression>> {
        match self {
            Expression::And(group) => push_child(group, child, Expression::And),
            _ => Err(Rejected::new(QueryError::NotAGroup("AND"), child)),
        }
    }

    /// Add `child` to this OR node; see [`Expression::add_to_and_group`]
    pub fn add_to_or_group(&mut self, child: Expression) -> std::result::Result<(), Rejected<Expression>> {
        match self {
            Expression::Or(group) => push_child(group, child, Expression::Or),
            _ => Err(Rejected::new(QueryError::NotAGroup("OR"), child)),
        }
    }

    /// Evaluate against the row at `timestamp`.
    ///
    /// `And` stops at the first false child and `Or` at the first true one.
    pub fn evaluate<L: PointLookup + ?Sized>(&self, timestamp: Timestamp, lookup: &L) -> bool {
        // (is_and, children not yet visited)
        let mut frames: Vec<(bool, std::vec::IntoIter<&Expression>)> = Vec::new();
        let mut current = self;
        loop {
            let mut done = match current {
                Expression::And(group) => {
                    frames.push((true, group.children().into_iter()));
                    None
                }
                Expression::Or(group) => {
                    frames.push((false, group.children().into_iter()));
                    None
                }
                leaf => Some(leaf.test_leaf(timestamp, lookup)),
            };

            current = loop {
                let Some((is_and, children)) = frames.last_mut() else {
                    return done.unwrap_or(false);
                };
                let is_and = *is_and;
                if done.is_some_and(|value| value != is_and) {
                    frames.pop();
                    continue;
                }
                match children.next() {
                    Some(child) => break child,
                    None => {
                        frames.pop();
                        done = Some(is_and);
                    }
                }
            };
        }
    }

    fn test_leaf<L: PointLookup + ?Sized>(&self, timestamp: Timestamp, lookup: &L) -> bool {
        match self {
            Expression::And(_) | Expression::Or(_) => false,
            Expression::GlobalTime(filter) => filter.test_time(timestamp),
            Expression::Series { path, filter } => match lookup.value_at(path, timestamp) {
                Some(_) if filter.is_time_filter() => filter.test_time(timestamp),
                Some(value) => filter.test_value(value),
                None => false,
            },
        }
    }

    /// Every column path referenced by a `Series` leaf
    pub fn paths(&self) -> Vec<&Path> {
        let mut paths = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expression::And(group) | Expression::Or(group) => stack.extend(group.children()),
                Expression::Series { path, .. } => paths.push(path),
                Expression::GlobalTime(_) => {}
            }
        }
        paths
    }

    /// Number of filters held by leaves
    pub fn filter_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expression::And(group) | Expression::Or(group) => stack.extend(group.children()),
                Expression::GlobalTime(_) | Expression::Series { .. } => count += 1,
            }
        }
        count
    }

    /// Height of the tree; a leaf is 1
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((expr, level)) = stack.pop() {
            deepest = deepest.max(level);
            if let Expression::And(group) | Expression::Or(group) = expr {
                stack.extend(group.children().into_iter().map(|child| (child, level + 1)));
            }
        }
        deepest
    }

    /// Tear the tree down without recursion, returning the number of
    /// filters released.
    ///
    /// Composite nodes hand their children to the work stack before being
    /// dropped; leaves release only their filter.
    pub fn destroy(self) -> usize {
        let mut released = 0;
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expression::And(group) | Expression::Or(group) => stack.extend(group.into_children()),
                Expression::GlobalTime(filter) | Expression::Series { filter, .. } => {
                    drop(filter);
                    released += 1;
                }
            }
        }
        released
    }
}

fn push_child(
    group: &mut Group,
    child: Expression,
    wrap: fn(Group) -> Expression,
) -> std::result::Result<(), Rejected<Expression>> {
    match group {
        Group::Binary { left, right } => {
            if left.is_none() {
                *left = Some(Box::new(child));
            } else if right.is_none() {
                *right = Some(Box::new(child));
            } else {
                let mut nested = wrap(Group::Binary {
                    left: right.take(),
                    right: None,
                });
                if let Expression::And(inner) | Expression::Or(inner) = &mut nested {
                    push_child(inner, child, wrap)?;
                }
                *right = Some(Box::new(nested));
            }
            Ok(())
        }
        Group::Flat(children) => {
            if children.len() >= MAX_COLUMN_FILTER_NUM {
                return Err(Rejected::new(
                    QueryError::FilterGroupFull(MAX_COLUMN_FILTER_NUM),
                    child,
                ));
            }
            children.push(child);
            Ok(())
        }
    }
}

impl Clone for Expression {
    fn clone(&self) -> Self {
        enum Step<'a> {
            Visit(&'a Expression),
            Build(&'a Expression, usize),
        }

        let mut steps = vec![Step::Visit(self)];
        let mut built: Vec<Expression> = Vec::new();
        while let Some(step) = steps.pop() {
            match step {
                Step::Visit(expr) => match expr {
                    Expression::And(group) | Expression::Or(group) => {
                        let children = group.children();
                        steps.push(Step::Build(expr, children.len()));
                        steps.extend(children.into_iter().rev().map(Step::Visit));
                    }
                    Expression::GlobalTime(filter) => built.push(Expression::GlobalTime(filter.clone())),
                    Expression::Series { path, filter } => built.push(Expression::Series {
                        path: path.clone(),
                        filter: filter.clone(),
                    }),
                },
                Step::Build(expr, count) => {
                    let children = built.split_off(built.len() - count);
                    built.push(match expr {
                        Expression::And(group) => Expression::And(group.rebuild(children)),
                        Expression::Or(group) => Expression::Or(group.rebuild(children)),
                        leaf => leaf.clone(),
                    });
                }
            }
        }
        built.pop().unwrap_or_else(Expression::and_group)
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        let mut pairs = vec![(self, other)];
        while let Some((a, b)) = pairs.pop() {
            match (a, b) {
                (Expression::And(x), Expression::And(y)) | (Expression::Or(x), Expression::Or(y)) => {
                    if !x.same_shape(y) {
                        return false;
                    }
                    pairs.extend(x.children().into_iter().zip(y.children()));
                }
                (Expression::GlobalTime(x), Expression::GlobalTime(y)) => {
                    if x != y {
                        return false;
                    }
                }
                (
                    Expression::Series { path: p1, filter: f1 },
                    Expression::Series { path: p2, filter: f2 },
                ) => {
                    if p1 != p2 || f1 != f2 {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        enum Token<'a> {
            Node(&'a Expression),
            Text(&'static str),
        }

        let mut tokens = vec![Token::Node(self)];
        while let Some(token) = tokens.pop() {
            let expr = match token {
                Token::Text(text) => {
                    f.write_str(text)?;
                    continue;
                }
                Token::Node(expr) => expr,
            };
            let (group, joiner) = match expr {
                Expression::And(group) => (group, " AND "),
                Expression::Or(group) => (group, " OR "),
                Expression::GlobalTime(filter) => {
                    write!(f, "{filter}")?;
                    continue;
                }
                Expression::Series { path, filter } if filter.is_time_filter() => {
                    write!(f, "{path}: {filter}")?;
                    continue;
                }
                Expression::Series { path, filter } => {
                    write!(f, "{path} {filter}")?;
                    continue;
                }
            };

            tokens.push(Token::Text(")"));
            for (i, child) in group.children().into_iter().enumerate().rev() {
                tokens.push(Token::Node(child));
                if i > 0 {
                    tokens.push(Token::Text(joiner));
                }
            }
            tokens.push(Token::Text("("));
        }
        Ok(())
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expression({self})")
    }
}

/// Point access used while evaluating a row
pub trait PointLookup {
    /// Value of `path` at exactly `timestamp`, if one was written
    fn value_at(&self, path: &Path, timestamp: Timestamp) -> Option<&Value>;
}
