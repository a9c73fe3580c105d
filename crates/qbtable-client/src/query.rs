//! Conversion of caller-facing descriptions into request payloads.

use std::collections::{BTreeMap, HashSet};

use qbtable_common::wire::{CreatePayload, DeletePayload, QueryOptions, QueryPayload, RawCell};
use qbtable_common::{FieldId, NewRecord, Query};

use crate::error::{ClientError, Result};

/// Builds the body of `POST /records/query`.
///
/// The select list keeps the caller's order, drops repeated ids and gains
/// `primary_key` at the end unless already present. The filter is passed
/// through untouched.
#[must_use]
pub fn build_query(table_id: &str, query: &Query, primary_key: Option<FieldId>) -> QueryPayload {
    let select = query.select.as_ref().map(|fields| {
        let mut seen = HashSet::with_capacity(fields.len() + 1);
        let mut select: Vec<FieldId> = fields.iter().copied().filter(|id| seen.insert(*id)).collect();
        if let Some(pk) = primary_key
            && seen.insert(pk)
        {
            select.push(pk);
        }
        select
    });

    let options = query.limit.map(|top| QueryOptions {
        top,
        skip: query.offset,
    });

    QueryPayload {
        from: table_id.to_string(),
        filter: query.filter.clone(),
        select,
        sort_by: query.sort_by.clone(),
        options,
    }
}

/// Builds the body of `POST /records`.
///
/// `fieldsToReturn` lists every field referenced by any record, in the order
/// first seen. With `merge_field_id`, existing records matching on that field
/// are updated instead of duplicated.
///
/// # Errors
///
/// Returns an error if `records` is empty.
pub fn build_create(
    table_id: &str,
    records: &[NewRecord],
    merge_field_id: Option<FieldId>,
) -> Result<CreatePayload> {
    if records.is_empty() {
        return Err(ClientError::InvalidRequest(
            "at least one record is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut fields_to_return = Vec::new();
    let data = records
        .iter()
        .map(|record| {
            record
                .iter()
                .map(|(id, value)| {
                    if seen.insert(*id) {
                        fields_to_return.push(*id);
                    }
                    (*id, RawCell::from(value.clone()))
                })
                .collect::<BTreeMap<_, _>>()
        })
        .collect();

    Ok(CreatePayload {
        to: table_id.to_string(),
        data,
        fields_to_return,
        merge_field_id,
    })
}

/// Builds the body of `DELETE /records`.
///
/// # Errors
///
/// Returns an error if `filter` is blank, which the backend would otherwise
/// be free to interpret as "every record".
pub fn build_delete(table_id: &str, filter: &str) -> Result<DeletePayload> {
    if filter.trim().is_empty() {
        return Err(ClientError::InvalidRequest(
            "refusing to delete without a filter".to_string(),
        ));
    }
    Ok(DeletePayload {
        from: table_id.to_string(),
        filter: filter.to_string(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use proptest::prelude::*;
    use qbtable_common::SortField;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_select_gains_primary_key() {
        let query = Query::builder().filter("{3.EX.42}").select(vec![6]).build();
        let payload = build_query("bqtable", &query, Some(3));

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"from": "bqtable", "where": "{3.EX.42}", "select": [6, 3]})
        );
    }

    #[test]
    fn test_primary_key_not_duplicated() {
        let query = Query::builder()
            .filter("{6.CT.'x'}")
            .select(vec![3, 6, 3])
            .build();
        let payload = build_query("bqtable", &query, Some(3));
        assert_eq!(payload.select, Some(vec![3, 6]));
    }

    #[test]
    fn test_no_select_leaves_backend_defaults() {
        let payload = build_query("bqtable", &Query::new("{3.GT.0}"), Some(3));
        assert!(payload.select.is_none());
        assert!(payload.options.is_none());
        assert!(payload.sort_by.is_none());
    }

    #[test]
    fn test_options_only_with_limit() {
        let offset_only = Query::builder().filter("").offset(5).build();
        assert!(build_query("t", &offset_only, None).options.is_none());

        let limited = Query::builder().filter("").limit(10).build();
        let payload = build_query("t", &limited, None);
        assert_eq!(
            serde_json::to_value(payload.options).unwrap(),
            json!({"top": 10})
        );

        let paged = Query::builder().filter("").limit(10).offset(20).build();
        let payload = build_query("t", &paged, None);
        assert_eq!(
            serde_json::to_value(payload.options).unwrap(),
            json!({"top": 10, "skip": 20})
        );
    }

    #[test]
    fn test_sort_passed_verbatim() {
        let sort = vec![SortField::desc(7), SortField::asc(6)];
        let query = Query::builder().filter("").sort_by(sort.clone()).build();
        assert_eq!(build_query("t", &query, None).sort_by, Some(sort));
    }

    #[test]
    fn test_create_collects_fields_in_first_seen_order() {
        let records = vec![
            NewRecord::from([(7, json!("b")), (6, json!("a"))]),
            NewRecord::from([(8, json!(1)), (6, json!("c"))]),
        ];
        let payload = build_create("bqtable", &records, None).unwrap();

        assert_eq!(payload.fields_to_return, vec![6, 7, 8]);
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "to": "bqtable",
                "data": [
                    {"6": {"value": "a"}, "7": {"value": "b"}},
                    {"6": {"value": "c"}, "8": {"value": 1}}
                ],
                "fieldsToReturn": [6, 7, 8]
            })
        );
    }

    #[test]
    fn test_upsert_sets_merge_field() {
        let records = vec![NewRecord::from([(6, json!("a"))])];
        let payload = build_create("bqtable", &records, Some(6)).unwrap();
        assert_eq!(serde_json::to_value(&payload).unwrap()["mergeFieldId"], 6);
    }

    #[test]
    fn test_create_rejects_empty_batch() {
        assert!(matches!(
            build_create("bqtable", &[], None),
            Err(ClientError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_delete_requires_filter() {
        assert!(build_delete("bqtable", "  ").is_err());
        let payload = build_delete("bqtable", "{3.EX.42}").unwrap();
        assert_eq!(
            serde_json::to_value(payload).unwrap(),
            json!({"from": "bqtable", "where": "{3.EX.42}"})
        );
    }

    proptest! {
        #[test]
        fn prop_build_is_deterministic(
            filter in ".{0,24}",
            select in proptest::option::of(proptest::collection::vec(1u32..40, 0..12)),
            limit in proptest::option::of(1u32..500),
            offset in proptest::option::of(0u32..500),
            pk in proptest::option::of(1u32..40),
        ) {
            let query = Query { filter, select, sort_by: None, limit, offset };
            prop_assert_eq!(build_query("t", &query, pk), build_query("t", &query, pk));
        }

        #[test]
        fn prop_select_has_no_duplicates_and_contains_pk(
            select in proptest::collection::vec(1u32..20, 0..16),
            pk in 1u32..20,
        ) {
            let query = Query { select: Some(select.clone()), ..Query::default() };
            let built = build_query("t", &query, Some(pk)).select.unwrap();

            let unique: HashSet<_> = built.iter().collect();
            prop_assert_eq!(unique.len(), built.len());
            prop_assert_eq!(built.iter().filter(|id| **id == pk).count(), 1);
            for id in &select {
                prop_assert!(built.contains(id));
            }
        }
    }
}
