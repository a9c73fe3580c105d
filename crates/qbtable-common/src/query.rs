use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::record::FieldId;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending.
    #[default]
    #[serde(rename = "ASC")]
    Asc,
    /// Descending.
    #[serde(rename = "DESC")]
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "ASC"),
            Self::Desc => write!(f, "DESC"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort order '{other}' (expected asc or desc)")),
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortField {
    /// Field to sort by.
    pub field_id: FieldId,
    /// Direction.
    pub order: SortOrder,
}

impl SortField {
    /// Ascending sort on `field_id`.
    #[must_use]
    pub const fn asc(field_id: FieldId) -> Self {
        Self {
            field_id,
            order: SortOrder::Asc,
        }
    }

    /// Descending sort on `field_id`.
    #[must_use]
    pub const fn desc(field_id: FieldId) -> Self {
        Self {
            field_id,
            order: SortOrder::Desc,
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    /// Parses `6`, `6:asc` or `6:desc`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, order) = s.split_once(':').unwrap_or((s, "asc"));
        let field_id = id
            .trim()
            .parse::<FieldId>()
            .map_err(|e| format!("invalid field id '{id}': {e}"))?;
        Ok(Self {
            field_id,
            order: order.trim().parse()?,
        })
    }
}

/// A record search against one table.
///
/// `filter` is opaque backend query-language text (see [`crate::filter`]).
///
/// # Examples
///
/// ```
/// use qbtable_common::{Query, SortField};
///
/// let query = Query::builder()
///     .filter("{3.EX.42}")
///     .select(vec![6, 7])
///     .sort_by(vec![SortField::desc(6)])
///     .limit(10)
///     .build();
///
/// assert_eq!(query.filter, "{3.EX.42}");
/// assert_eq!(query.offset, None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct Query {
    /// Backend filter expression.
    #[builder(setter(into))]
    pub filter: String,
    /// Field ids to return. The primary key is always added.
    #[builder(default, setter(strip_option))]
    pub select: Option<Vec<FieldId>>,
    /// Sort keys, passed through verbatim.
    #[builder(default, setter(strip_option))]
    pub sort_by: Option<Vec<SortField>>,
    /// Maximum number of records.
    #[builder(default, setter(strip_option))]
    pub limit: Option<u32>,
    /// Records to skip. Only sent together with `limit`.
    #[builder(default, setter(strip_option))]
    pub offset: Option<u32>,
}

impl Query {
    /// A query returning the backend's default fields for `filter`.
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_field_parse() {
        assert_eq!("6".parse::<SortField>(), Ok(SortField::asc(6)));
        assert_eq!("7:DESC".parse::<SortField>(), Ok(SortField::desc(7)));
        assert!("x:asc".parse::<SortField>().is_err());
        assert!("6:sideways".parse::<SortField>().is_err());
    }

    #[test]
    fn test_sort_field_wire_shape() {
        let json = serde_json::to_value(SortField::desc(6)).unwrap_or_default();
        assert_eq!(json, serde_json::json!({"fieldId": 6, "order": "DESC"}));
    }

    #[test]
    fn test_query_new() {
        let query = Query::new("{6.CT.'abc'}");
        assert_eq!(query.filter, "{6.CT.'abc'}");
        assert!(query.select.is_none());
        assert!(query.limit.is_none());
    }
}
