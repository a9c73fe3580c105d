//! Request and response bodies exchanged with the backend.
//!
//! These mirror the JSON the REST API speaks. Callers normally work with the
//! rehydrated types in [`crate::record`] instead.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::query::SortField;
use crate::record::{FieldId, ResultMetadata};

/// A single cell as sent and received on the wire: `{"value": ...}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCell {
    /// The cell value.
    #[serde(default)]
    pub value: serde_json::Value,
}

impl From<serde_json::Value> for RawCell {
    fn from(value: serde_json::Value) -> Self {
        Self { value }
    }
}

/// Field properties relevant to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldProperties {
    /// Whether the field is the table's primary key.
    #[serde(default)]
    pub primary_key: bool,
}

/// A field descriptor as returned by `/fields`, `/records/query` and
/// report runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field identifier.
    pub id: FieldId,
    /// Field label.
    #[serde(default)]
    pub label: String,
    /// Field type; `/fields` names it `fieldType`.
    #[serde(rename = "type", alias = "fieldType", default)]
    pub field_type: String,
    /// Field properties, present on `/fields` responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<FieldProperties>,
}

impl FieldDescriptor {
    /// Whether the descriptor itself flags the field as primary key.
    #[must_use]
    pub fn is_flagged_primary(&self) -> bool {
        self.properties.as_ref().is_some_and(|p| p.primary_key)
    }
}

/// One raw record: field id (as a JSON object key) to cell.
pub type RawRecord = BTreeMap<String, RawCell>;

/// Body of `/records/query` and report-run responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordsResponse {
    /// Raw records.
    #[serde(default)]
    pub data: Vec<RawRecord>,
    /// Field descriptors for every field referenced by `data`.
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    /// Paging metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResultMetadata>,
}

/// `options` object of a query payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Maximum number of records.
    pub top: u32,
    /// Records to skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,
}

/// Body of `POST /records/query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    /// Table id.
    pub from: String,
    /// Filter expression.
    #[serde(rename = "where")]
    pub filter: String,
    /// Field ids to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<FieldId>>,
    /// Sort keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<Vec<SortField>>,
    /// Paging options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<QueryOptions>,
}

/// A record to create: field id to plain value.
pub type NewRecord = BTreeMap<FieldId, serde_json::Value>;

/// Body of `POST /records`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePayload {
    /// Table id.
    pub to: String,
    /// Records to insert or update.
    pub data: Vec<BTreeMap<FieldId, RawCell>>,
    /// Every field id referenced by `data`, in first-seen order.
    pub fields_to_return: Vec<FieldId>,
    /// Field used to match existing records for an upsert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_field_id: Option<FieldId>,
}

/// `metadata` of a `POST /records` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMetadata {
    /// Ids of newly created records.
    #[serde(default)]
    pub created_record_ids: Vec<u64>,
    /// Ids of records updated through the merge field.
    #[serde(default)]
    pub updated_record_ids: Vec<u64>,
    /// Ids of records matched but left unchanged.
    #[serde(default)]
    pub unchanged_record_ids: Vec<u64>,
    /// Number of input records processed.
    #[serde(default)]
    pub total_number_of_records_processed: u64,
    /// Per-line error messages keyed by input line number.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub line_errors: BTreeMap<String, Vec<String>>,
}

/// Response of `POST /records`, returned to callers without rehydration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateResult {
    /// Echoed field values of the written records.
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    /// Created / updated id lists.
    #[serde(default)]
    pub metadata: CreateMetadata,
}

/// Body of `DELETE /records`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePayload {
    /// Table id.
    pub from: String,
    /// Filter selecting the records to delete.
    #[serde(rename = "where")]
    pub filter: String,
}

/// Response of `DELETE /records`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// Number of records removed.
    #[serde(default)]
    pub number_deleted: u64,
}

/// Report definition returned by `GET /reports/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMeta {
    /// Report id.
    #[serde(default)]
    pub id: String,
    /// Report name.
    #[serde(default)]
    pub name: String,
    /// Report type (`table`, `chart`, ...).
    #[serde(rename = "type", default)]
    pub report_type: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Saved query definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<serde_json::Value>,
    /// Report specific properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
}

/// Response of `GET /auth/temporary/{tableId}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryAuthResponse {
    /// The issued token, absent when the session is not authorized.
    #[serde(default)]
    pub temporary_authorization: Option<String>,
}
