//! Command implementations for the CLI.
//!
//! Every command returns `Outcome::Unreachable` when the backend could not
//! be contacted so that `main` can pick the exit status.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use colored::Colorize;

use qbtable_client::QuickbaseTable;
use qbtable_common::{FieldId, NewRecord, Outcome, Query, SortField};

use crate::display::{
    display_create_result, display_envelope, display_fields, display_record,
    display_report_meta, print_json,
};

/// Parses a `FIELD=VALUE` assignment.
///
/// The value is read as JSON when it parses as JSON and kept as a string
/// otherwise, so `7=36` is a number and `6=Ada` a string.
pub fn parse_assignment(s: &str) -> std::result::Result<(FieldId, serde_json::Value), String> {
    let (id, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{s}'"))?;
    let id = id
        .trim()
        .parse::<FieldId>()
        .map_err(|e| format!("invalid field id '{id}': {e}"))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((id, value))
}

/// Options for `search`.
#[derive(Debug, Default)]
pub struct SearchOptions {
    pub filter: String,
    pub select: Vec<FieldId>,
    pub sort: Vec<SortField>,
    pub top: Option<u32>,
    pub skip: Option<u32>,
}

impl SearchOptions {
    fn into_query(self) -> Query {
        Query {
            filter: self.filter,
            select: (!self.select.is_empty()).then_some(self.select),
            sort_by: (!self.sort.is_empty()).then_some(self.sort),
            limit: self.top,
            offset: self.skip,
        }
    }
}

/// Searches the table and prints matching records.
pub async fn search(table: &QuickbaseTable, options: SearchOptions, json: bool) -> Result<Outcome<()>> {
    let query = options.into_query();
    let outcome = table.search(&query).await.context("Search failed")?;
    outcome.try_map(|envelope| {
        if json {
            print_json(&envelope)
        } else {
            display_envelope(&envelope);
            Ok(())
        }
    })
}

/// Prints one record by id.
pub async fn record(
    table: &QuickbaseTable,
    record_id: u64,
    select: Vec<FieldId>,
    json: bool,
) -> Result<Outcome<()>> {
    let select = (!select.is_empty()).then_some(select);
    let outcome = table
        .get_record(record_id, select)
        .await
        .with_context(|| format!("Failed to fetch record {record_id}"))?;
    outcome.try_map(|record| match record {
        Some(record) if json => print_json(&record),
        Some(record) => {
            display_record(&record);
            Ok(())
        }
        None => bail!("Record {record_id} not found"),
    })
}

/// Lists the table's fields.
pub async fn fields(table: &QuickbaseTable, json: bool) -> Result<Outcome<()>> {
    let outcome = table.list_fields().await.context("Failed to list fields")?;
    outcome.try_map(|fields| {
        if json {
            print_json(&fields)
        } else {
            display_fields(&fields);
            Ok(())
        }
    })
}

/// Prints the primary-key field id.
pub async fn primary_key(table: &QuickbaseTable) -> Result<Outcome<()>> {
    let outcome = table
        .primary_key()
        .await
        .context("Failed to discover primary key")?;
    Ok(outcome.map(|pk| println!("{pk}")))
}

/// Runs a saved report.
pub async fn report(
    table: &QuickbaseTable,
    report_id: &str,
    top: Option<u32>,
    skip: Option<u32>,
    json: bool,
) -> Result<Outcome<()>> {
    let outcome = table
        .run_report(report_id, top, skip)
        .await
        .with_context(|| format!("Failed to run report {report_id}"))?;
    outcome.try_map(|envelope| {
        if json {
            print_json(&envelope)
        } else {
            display_envelope(&envelope);
            Ok(())
        }
    })
}

/// Prints a report's definition.
pub async fn report_meta(table: &QuickbaseTable, report_id: &str, json: bool) -> Result<Outcome<()>> {
    let outcome = table
        .report_meta(report_id)
        .await
        .with_context(|| format!("Failed to fetch report {report_id}"))?;
    outcome.try_map(|meta| {
        if json {
            print_json(&meta)
        } else {
            display_report_meta(&meta);
            Ok(())
        }
    })
}

/// Creates (or, with `merge`, upserts) one record.
pub async fn create(
    table: &QuickbaseTable,
    assignments: Vec<(FieldId, serde_json::Value)>,
    merge: Option<FieldId>,
    json: bool,
) -> Result<Outcome<()>> {
    if assignments.is_empty() {
        bail!("At least one --field FIELD=VALUE is required");
    }
    let record: NewRecord = assignments.into_iter().collect();
    let records = [record];

    let outcome = match merge {
        Some(merge_field_id) => table.upsert_records(&records, merge_field_id).await,
        None => table.create_records(&records).await,
    }
    .context("Failed to write record")?;

    outcome.try_map(|result| {
        if json {
            print_json(&result)
        } else {
            display_create_result(&result);
            Ok(())
        }
    })
}

/// Deletes records matching `filter`, asking first unless `yes`.
pub async fn delete(table: &QuickbaseTable, filter: &str, yes: bool) -> Result<Outcome<()>> {
    if !yes && !confirm(&format!("Delete every record matching {filter}?"))? {
        println!("Aborted");
        return Ok(Outcome::Data(()));
    }

    let outcome = table
        .delete_records(filter)
        .await
        .context("Failed to delete records")?;
    Ok(outcome.map(|result| {
        println!(
            "{} Deleted {} record(s)",
            "✓".bright_green(),
            result.number_deleted
        );
    }))
}

/// Prints a binary resource as a `data:` URI.
pub async fn href(table: &QuickbaseTable, path: &str) -> Result<Outcome<()>> {
    let outcome = table
        .get_href(path)
        .await
        .with_context(|| format!("Failed to fetch {path}"))?;
    Ok(outcome.map(|uri| println!("{uri}")))
}

/// Saves a binary resource to `output`.
pub async fn download(table: &QuickbaseTable, path: &str, output: &Path) -> Result<Outcome<()>> {
    let outcome = table
        .download(path)
        .await
        .with_context(|| format!("Failed to fetch {path}"))?;
    let Outcome::Data(bytes) = outcome else {
        return Ok(Outcome::Unreachable);
    };

    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "{} Saved {} byte(s) to {}",
        "✓".bright_green(),
        bytes.len(),
        output.display()
    );
    Ok(Outcome::Data(()))
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use qbtable_common::Config;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment("7=36").unwrap(), (7, json!(36)));
        assert_eq!(parse_assignment("6=Ada").unwrap(), (6, json!("Ada")));
        assert_eq!(parse_assignment("6=\"42\"").unwrap(), (6, json!("42")));
        assert_eq!(parse_assignment("8=a=b").unwrap(), (8, json!("a=b")));
        assert!(parse_assignment("Ada").is_err());
        assert!(parse_assignment("x=1").is_err());
    }

    #[test]
    fn test_search_options_into_query() {
        let query = SearchOptions {
            filter: "{3.GT.0}".to_string(),
            top: Some(5),
            ..SearchOptions::default()
        }
        .into_query();
        assert!(query.select.is_none());
        assert!(query.sort_by.is_none());
        assert_eq!(query.limit, Some(5));
    }

    fn table(server: &MockServer) -> QuickbaseTable {
        let config = Config::new("bqtable", "realm.quickbase.com")
            .with_base_url(server.uri())
            .with_user_token("b7738j");
        QuickbaseTable::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_create_builds_single_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/records"))
            .and(body_json(json!({
                "to": "bqtable",
                "data": [{"6": {"value": "Ada"}, "7": {"value": 36}}],
                "fieldsToReturn": [6, 7]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [],
                "metadata": {"createdRecordIds": [1], "totalNumberOfRecordsProcessed": 1}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = create(
            &table(&server),
            vec![(6, json!("Ada")), (7, json!(36))],
            None,
            true,
        )
        .await
        .unwrap();
        assert!(outcome.is_data());
    }

    #[tokio::test]
    async fn test_create_requires_fields() {
        let server = MockServer::start().await;
        assert!(create(&table(&server), Vec::new(), None, false).await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_is_reported_as_outcome() {
        let config = Config::new("bqtable", "realm.quickbase.com")
            .with_base_url("http://127.0.0.1:9")
            .with_user_token("b7738j");
        let table = QuickbaseTable::new(config).unwrap();

        let outcome = report(&table, "1", None, None, false).await.unwrap();
        assert!(outcome.is_unreachable());
    }
}
