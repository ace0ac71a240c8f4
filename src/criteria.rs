use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Right-hand side of a binary comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// Bound as a positional parameter.
    Value(Value),
    /// Another column of the same table, rendered as its quoted identifier.
    Column(String),
}

impl Operand {
    pub fn column(name: impl Into<String>) -> Self {
        Operand::Column(name.into())
    }
}

/// Comparison operators for criteria leaves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryOperator {
    Equal(Operand),
    NotEqual(Operand),
    GreaterThan(Operand),
    GreaterThanOrEqual(Operand),
    LessThan(Operand),
    LessThanOrEqual(Operand),
    Like(String),
    In(Vec<Value>),
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
    }
}

/// WHERE-clause condition before translation to SQL.
///
/// Grouping is carried by the tree shape alone: every combinator is rendered
/// with both sides parenthesized, so `a.and(b).or(c)` and `a.and(b.or(c))`
/// translate to different SQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Criteria {
    Compare {
        column: String,
        operator: QueryOperator,
    },
    Combine {
        left: Box<Criteria>,
        op: LogicalOperator,
        right: Box<Criteria>,
    },
}

impl Criteria {
    pub fn compare(column: impl Into<String>, operator: QueryOperator) -> Self {
        Criteria::Compare {
            column: column.into(),
            operator,
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, QueryOperator::Equal(Operand::Value(value.into())))
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, QueryOperator::NotEqual(Operand::Value(value.into())))
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, QueryOperator::GreaterThan(Operand::Value(value.into())))
    }

    pub fn ge(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, QueryOperator::GreaterThanOrEqual(Operand::Value(value.into())))
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, QueryOperator::LessThan(Operand::Value(value.into())))
    }

    pub fn le(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, QueryOperator::LessThanOrEqual(Operand::Value(value.into())))
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(column, QueryOperator::Like(pattern.into()))
    }

    pub fn in_list<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::compare(
            column,
            QueryOperator::In(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::compare(column, QueryOperator::IsNull)
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::compare(column, QueryOperator::IsNotNull)
    }

    pub fn combine(left: Criteria, op: LogicalOperator, right: Criteria) -> Self {
        Criteria::Combine {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn and(self, other: Criteria) -> Self {
        Self::combine(self, LogicalOperator::And, other)
    }

    pub fn or(self, other: Criteria) -> Self {
        Self::combine(self, LogicalOperator::Or, other)
    }

    /// Number of combinator nodes in the tree.
    pub fn combinator_count(&self) -> usize {
        match self {
            Criteria::Compare { .. } => 0,
            Criteria::Combine { left, right, .. } => {
                1 + left.combinator_count() + right.combinator_count()
            }
        }
    }
}
