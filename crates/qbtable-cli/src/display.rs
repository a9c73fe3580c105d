//! Display utilities for CLI output formatting
//!
//! Renders rehydrated records, field lists and write results as plain
//! coloured tables, or as JSON with `--json`.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use qbtable_common::{CreateResult, Field, FieldValue, Record, ReportMeta, ResponseEnvelope};

/// Longest cell rendered before truncation.
const MAX_CELL_WIDTH: usize = 40;

/// Print any serializable value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render a single value for a table cell.
pub fn format_value(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    truncate(&text, MAX_CELL_WIDTH)
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(1)).collect();
    format!("{kept}…")
}

fn cell(record: &Record, field: &Field) -> String {
    record
        .get(field.id)
        .map(|v: &FieldValue| format_value(&v.value))
        .unwrap_or_default()
}

/// Display records as a table, one column per field in response order
pub fn display_envelope(envelope: &ResponseEnvelope) {
    if envelope.is_empty() {
        println!("{}", "No matching records".dimmed());
        return;
    }

    let widths: Vec<usize> = envelope
        .fields
        .iter()
        .map(|field| {
            envelope
                .records
                .iter()
                .map(|r| cell(r, field).chars().count())
                .chain(std::iter::once(field.label.chars().count()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let header: Vec<String> = envelope
        .fields
        .iter()
        .zip(&widths)
        .map(|(field, width)| {
            let label = format!("{:<width$}", field.label);
            if field.is_primary_key {
                label.bright_yellow().bold().to_string()
            } else {
                label.bright_cyan().bold().to_string()
            }
        })
        .collect();
    println!("{}", header.join("  "));

    for record in &envelope.records {
        let row: Vec<String> = envelope
            .fields
            .iter()
            .zip(&widths)
            .map(|(field, width)| format!("{:<width$}", cell(record, field)))
            .collect();
        println!("{}", row.join("  ").trim_end());
    }

    let shown = envelope.len();
    match envelope.metadata {
        Some(meta) if meta.total_records > u64::try_from(shown).unwrap_or(u64::MAX) => println!(
            "\n{} Showing {shown} of {} records (skipped {})",
            "○".bright_blue(),
            meta.total_records,
            meta.skip
        ),
        _ => println!("\n{} {shown} record(s)", "○".bright_blue()),
    }
}

/// Display a single record as `label (id): value` lines
pub fn display_record(record: &Record) {
    for value in record.iter() {
        let label = format!("{} ({})", value.label, value.field_id);
        let label = if value.is_primary_key {
            label.bright_yellow().bold()
        } else {
            label.bright_cyan()
        };
        println!("{label}: {}", format_value(&value.value));
    }
}

/// Display the field list of a table
pub fn display_fields(fields: &[Field]) {
    for field in fields {
        let marker = if field.is_primary_key {
            " [primary key]".bright_yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "{:>5}  {} {}{marker}",
            field.id.to_string().bright_cyan(),
            field.label,
            format!("({})", field.field_type).dimmed()
        );
    }
}

/// Display the outcome of a create or upsert
pub fn display_create_result(result: &CreateResult) {
    let meta = &result.metadata;
    println!(
        "{} Processed {} record(s)",
        "✓".bright_green(),
        meta.total_number_of_records_processed
    );
    if !meta.created_record_ids.is_empty() {
        println!("  Created:   {:?}", meta.created_record_ids);
    }
    if !meta.updated_record_ids.is_empty() {
        println!("  Updated:   {:?}", meta.updated_record_ids);
    }
    if !meta.unchanged_record_ids.is_empty() {
        println!("  Unchanged: {:?}", meta.unchanged_record_ids);
    }
    for (line, errors) in &meta.line_errors {
        for error in errors {
            eprintln!("  {} line {line}: {error}", "✗".bright_red());
        }
    }
}

/// Display a report definition
pub fn display_report_meta(meta: &ReportMeta) {
    println!("{} {}", meta.id.bright_cyan(), meta.name.bold());
    println!("  Type: {}", meta.report_type.bright_yellow());
    if !meta.description.is_empty() {
        println!("  Description: {}", meta.description);
    }
    if let Some(query) = &meta.query {
        println!("  Query: {query}");
    }
}
