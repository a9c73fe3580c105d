//! Helpers for writing backend filter expressions.
//!
//! Filters are plain strings of the form `{fid.OP.value}` joined with `AND`
//! / `OR`. The query builder treats them as opaque text; these helpers only
//! make the common cases less error prone.
//!
//! ```
//! use qbtable_common::filter::{Condition, FilterOperator};
//! use qbtable_common::RECORD_ID_FIELD;
//!
//! let by_id = Condition::new(RECORD_ID_FIELD, FilterOperator::Equals, 42);
//! assert_eq!(by_id.to_string(), "{3.EX.42}");
//!
//! let both = by_id.and(Condition::new(6, FilterOperator::Contains, "new york"));
//! assert_eq!(both, "{3.EX.42} AND {6.CT.'new york'}");
//! ```

use std::fmt;

use crate::record::FieldId;

/// Comparison operators understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FilterOperator {
    /// `EX`: equals.
    Equals,
    /// `XEX`: not equal.
    NotEquals,
    /// `CT`: contains.
    Contains,
    /// `XCT`: does not contain.
    NotContains,
    /// `SW`: starts with.
    StartsWith,
    /// `XSW`: does not start with.
    NotStartsWith,
    /// `GT`: greater than.
    GreaterThan,
    /// `GTE`: greater than or equal.
    GreaterThanOrEqual,
    /// `LT`: less than.
    LessThan,
    /// `LTE`: less than or equal.
    LessThanOrEqual,
}

impl FilterOperator {
    /// Backend token for this operator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "EX",
            Self::NotEquals => "XEX",
            Self::Contains => "CT",
            Self::NotContains => "XCT",
            Self::StartsWith => "SW",
            Self::NotStartsWith => "XSW",
            Self::GreaterThan => "GT",
            Self::GreaterThanOrEqual => "GTE",
            Self::LessThan => "LT",
            Self::LessThanOrEqual => "LTE",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `{fid.OP.value}` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    field_id: FieldId,
    operator: FilterOperator,
    value: String,
}

impl Condition {
    /// Builds a clause comparing `field_id` against `value`.
    pub fn new(field_id: FieldId, operator: FilterOperator, value: impl fmt::Display) -> Self {
        Self {
            field_id,
            operator,
            value: value.to_string(),
        }
    }

    /// Shorthand for an equality clause.
    pub fn equals(field_id: FieldId, value: impl fmt::Display) -> Self {
        Self::new(field_id, FilterOperator::Equals, value)
    }

    /// Joins this clause and `other` with `AND`.
    #[must_use]
    pub fn and(&self, other: impl fmt::Display) -> String {
        format!("{self} AND {other}")
    }

    /// Joins this clause and `other` with `OR`.
    #[must_use]
    pub fn or(&self, other: impl fmt::Display) -> String {
        format!("{self} OR {other}")
    }
}

fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if needs_quotes(&self.value) {
            // single quotes inside a quoted value are escaped by doubling
            let escaped = self.value.replace('\'', "''");
            write!(f, "{{{}.{}.'{escaped}'}}", self.field_id, self.operator)
        } else {
            write!(f, "{{{}.{}.{}}}", self.field_id, self.operator, self.value)
        }
    }
}

/// Joins several clauses with `AND`.
pub fn all_of<I, C>(conditions: I) -> String
where
    I: IntoIterator<Item = C>,
    C: fmt::Display,
{
    join(conditions, " AND ")
}

/// Joins several clauses with `OR`.
pub fn any_of<I, C>(conditions: I) -> String
where
    I: IntoIterator<Item = C>,
    C: fmt::Display,
{
    join(conditions, " OR ")
}

fn join<I, C>(conditions: I, separator: &str) -> String
where
    I: IntoIterator<Item = C>,
    C: fmt::Display,
{
    conditions
        .into_iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RECORD_ID_FIELD;

    #[test]
    fn test_plain_values_are_not_quoted() {
        assert_eq!(Condition::equals(RECORD_ID_FIELD, 42).to_string(), "{3.EX.42}");
        assert_eq!(
            Condition::new(7, FilterOperator::GreaterThan, "2024-01-01").to_string(),
            "{7.GT.2024-01-01}"
        );
    }

    #[test]
    fn test_quoting_and_escaping() {
        assert_eq!(
            Condition::new(6, FilterOperator::Contains, "o'brien st").to_string(),
            "{6.CT.'o''brien st'}"
        );
        assert_eq!(
            Condition::new(6, FilterOperator::Equals, "").to_string(),
            "{6.EX.''}"
        );
    }

    #[test]
    fn test_combinators() {
        let a = Condition::new(3, FilterOperator::GreaterThan, 10);
        let b = Condition::new(3, FilterOperator::LessThan, 20);
        assert_eq!(a.and(&b), "{3.GT.10} AND {3.LT.20}");
        assert_eq!(a.or(&b), "{3.GT.10} OR {3.LT.20}");
        assert_eq!(all_of([&a, &b]), "{3.GT.10} AND {3.LT.20}");
        assert_eq!(any_of(Vec::<Condition>::new()), "");
    }
}
