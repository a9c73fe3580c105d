use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Numeric identifier of a table field.
pub type FieldId = u32;

/// Field id of the built-in "Record ID#" field present on every table.
pub const RECORD_ID_FIELD: FieldId = 3;

/// Metadata describing one table field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// Field identifier.
    pub id: FieldId,
    /// Human readable label.
    pub label: String,
    /// Backend field type (`text`, `numeric`, `file`, ...).
    #[serde(rename = "type")]
    pub field_type: String,
    /// Whether this is the table's primary key.
    pub is_primary_key: bool,
}

/// A record value annotated with its field's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValue {
    /// Field the value belongs to.
    pub field_id: FieldId,
    /// Value exactly as returned by the backend.
    pub value: serde_json::Value,
    /// Field label.
    pub label: String,
    /// Field type.
    #[serde(rename = "type")]
    pub field_type: String,
    /// Whether the field is the table's primary key.
    pub is_primary_key: bool,
}

impl FieldValue {
    /// Builds a value from a field descriptor and a raw value.
    #[must_use]
    pub fn new(field: &Field, value: serde_json::Value) -> Self {
        Self {
            field_id: field.id,
            value,
            label: field.label.clone(),
            field_type: field.field_type.clone(),
            is_primary_key: field.is_primary_key,
        }
    }

    /// The value as a string slice, if it is a JSON string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// The value as an `i64`, if it is an integral JSON number.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        self.value.as_i64()
    }
}

/// A record: field values keyed and ordered by field id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Values by field id.
    pub values: BTreeMap<FieldId, FieldValue>,
    /// Primary-key field id of the owning table, when known.
    pub primary_key_field_id: Option<FieldId>,
}

impl Record {
    /// Looks up a value by field id.
    #[must_use]
    pub fn get(&self, field_id: FieldId) -> Option<&FieldValue> {
        self.values.get(&field_id)
    }

    /// Looks up a value by its field label.
    #[must_use]
    pub fn get_by_label(&self, label: &str) -> Option<&FieldValue> {
        self.values.values().find(|v| v.label == label)
    }

    /// The record's primary-key value, when present.
    #[must_use]
    pub fn primary_key(&self) -> Option<&FieldValue> {
        self.primary_key_field_id.and_then(|id| self.get(id))
    }

    /// Number of values in the record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates values in field-id order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldValue> {
        self.values.values()
    }
}

/// Paging metadata returned alongside query and report results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    /// Records matching the query across all pages.
    #[serde(default)]
    pub total_records: u64,
    /// Records in this page.
    #[serde(default)]
    pub num_records: u64,
    /// Fields in this page.
    #[serde(default)]
    pub num_fields: u64,
    /// Records skipped before this page.
    #[serde(default)]
    pub skip: u64,
    /// Page size limit, when one applied.
    #[serde(default)]
    pub top: Option<u64>,
}

/// Rehydrated result of a query or report run.
///
/// Every [`FieldValue`] in `records` has a matching entry in `fields_by_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// Records in backend order.
    pub records: Vec<Record>,
    /// Field descriptors in backend order.
    pub fields: Vec<Field>,
    /// Field descriptors keyed by id.
    pub fields_by_id: BTreeMap<FieldId, Field>,
    /// Paging metadata, when the backend supplied it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResultMetadata>,
}

impl ResponseEnvelope {
    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The field flagged as primary key, if any.
    #[must_use]
    pub fn primary_field(&self) -> Option<&Field> {
        self.fields_by_id.values().find(|f| f.is_primary_key)
    }

    /// Consumes the envelope returning its first record.
    #[must_use]
    pub fn into_first(self) -> Option<Record> {
        self.records.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn field(id: FieldId, label: &str, primary: bool) -> Field {
        Field {
            id,
            label: label.to_string(),
            field_type: "text".to_string(),
            is_primary_key: primary,
        }
    }

    #[test]
    fn test_record_lookups() {
        let pk = field(3, "Record ID#", true);
        let name = field(6, "Name", false);
        let mut record = Record {
            primary_key_field_id: Some(3),
            ..Record::default()
        };
        record.values.insert(3, FieldValue::new(&pk, json!(42)));
        record.values.insert(6, FieldValue::new(&name, json!("Ada")));

        assert_eq!(record.len(), 2);
        assert_eq!(record.primary_key().and_then(FieldValue::as_i64), Some(42));
        assert_eq!(
            record.get_by_label("Name").and_then(FieldValue::as_str),
            Some("Ada")
        );
        assert!(record.get(7).is_none());
        let ids: Vec<FieldId> = record.iter().map(|v| v.field_id).collect();
        assert_eq!(ids, vec![3, 6]);
    }

    #[test]
    fn test_field_serializes_camel_case() {
        let value = serde_json::to_value(field(6, "Name", false)).unwrap_or_default();
        assert_eq!(value["type"], "text");
        assert_eq!(value["isPrimaryKey"], false);
    }

    #[test]
    fn test_envelope_primary_field() {
        let mut envelope = ResponseEnvelope::default();
        assert!(envelope.is_empty());
        assert!(envelope.primary_field().is_none());
        envelope.fields_by_id.insert(3, field(3, "Record ID#", true));
        envelope.fields_by_id.insert(6, field(6, "Name", false));
        assert_eq!(envelope.primary_field().map(|f| f.id), Some(3));
    }
}
