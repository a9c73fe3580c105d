//! Turning raw `{fieldId: {value}}` records into self-describing ones.

use std::collections::BTreeMap;

use log::debug;

use qbtable_common::wire::{FieldDescriptor, RecordsResponse};
use qbtable_common::{Field, FieldId, FieldValue, Record, ResponseEnvelope};

use crate::error::{ClientError, Result};

/// Rehydrates a query or report response.
///
/// A field is flagged primary when its id equals `primary_key`. Without a
/// known primary key the descriptor's own `properties.primaryKey` is used.
///
/// # Errors
///
/// Returns an error if a record references a field id that is missing from
/// the response's field list, or if a record key is not a field id.
pub fn rehydrate(raw: RecordsResponse, primary_key: Option<FieldId>) -> Result<ResponseEnvelope> {
    let fields: Vec<Field> = raw
        .fields
        .iter()
        .map(|descriptor| to_field(descriptor, primary_key))
        .collect();
    let fields_by_id: BTreeMap<FieldId, Field> =
        fields.iter().map(|f| (f.id, f.clone())).collect();

    let primary_key_field_id =
        primary_key.or_else(|| fields.iter().find(|f| f.is_primary_key).map(|f| f.id));

    let records = raw
        .data
        .into_iter()
        .enumerate()
        .map(|(record_index, raw_record)| {
            let values = raw_record
                .into_iter()
                .map(|(key, cell)| {
                    let field_id: FieldId = key.parse().map_err(|_| {
                        ClientError::InvalidResponse(format!(
                            "record {record_index} has non-numeric field key '{key}'"
                        ))
                    })?;
                    let field = fields_by_id.get(&field_id).ok_or(ClientError::UnknownField {
                        record_index,
                        field_id,
                    })?;
                    Ok((field_id, FieldValue::new(field, cell.value)))
                })
                .collect::<Result<BTreeMap<_, _>>>()?;
            Ok(Record {
                values,
                primary_key_field_id,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(
        "Rehydrated {} record(s) across {} field(s)",
        records.len(),
        fields.len()
    );

    Ok(ResponseEnvelope {
        records,
        fields,
        fields_by_id,
        metadata: raw.metadata,
    })
}

fn to_field(descriptor: &FieldDescriptor, primary_key: Option<FieldId>) -> Field {
    let is_primary_key = match primary_key {
        Some(pk) => descriptor.id == pk,
        None => descriptor.is_flagged_primary(),
    };
    Field {
        id: descriptor.id,
        label: descriptor.label.clone(),
        field_type: descriptor.field_type.clone(),
        is_primary_key,
    }
}
