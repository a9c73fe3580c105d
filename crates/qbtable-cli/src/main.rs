//! qbtable - command-line access to a single Quickbase table
//!
//! Thin front end over `qbtable-client`: every subcommand maps to one
//! `QuickbaseTable` operation. Exits with status 2 when the backend cannot
//! be reached.
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use secrecy::SecretString;

use qbtable_client::QuickbaseTable;
use qbtable_common::{FieldId, Outcome, SortField};

mod commands;
mod display;
mod profile;

use commands::SearchOptions;
use profile::{Overrides, Profile};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML profile (default: $XDG_CONFIG_HOME/qbtable/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Realm hostname, e.g. example.quickbase.com
    #[arg(long, env = "QB_REALM", global = true)]
    realm: Option<String>,

    /// Table id
    #[arg(long, env = "QB_TABLE", global = true)]
    table: Option<String>,

    /// Pre-issued user token (skips the temporary-auth flow)
    #[arg(long, env = "QB_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Application token sent when requesting temporary tokens
    #[arg(long, env = "QB_APP_TOKEN", global = true, hide_env_values = true)]
    app_token: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search records with a filter expression
    Search {
        /// Filter expression, e.g. "{6.CT.'Ada'}"
        #[arg(long = "where")]
        filter: String,
        /// Field ids to return (the primary key is always added)
        #[arg(long, value_delimiter = ',')]
        select: Vec<FieldId>,
        /// Sort keys as FIELD[:asc|desc]
        #[arg(long, value_delimiter = ',')]
        sort: Vec<SortField>,
        /// Maximum number of records
        #[arg(long)]
        top: Option<u32>,
        /// Records to skip (requires --top)
        #[arg(long, requires = "top")]
        skip: Option<u32>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one record by record id
    Record {
        record_id: u64,
        #[arg(long, value_delimiter = ',')]
        select: Vec<FieldId>,
        #[arg(long)]
        json: bool,
    },
    /// List the table's fields
    Fields {
        #[arg(long)]
        json: bool,
    },
    /// Print the primary-key field id
    PrimaryKey,
    /// Run a saved report
    Report {
        report_id: String,
        #[arg(long)]
        top: Option<u32>,
        #[arg(long)]
        skip: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Show a report's definition
    ReportMeta {
        report_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Create a record, or upsert it with --merge
    Create {
        /// Field assignment FIELD=VALUE (repeatable)
        #[arg(long = "field", value_parser = commands::parse_assignment)]
        fields: Vec<(FieldId, serde_json::Value)>,
        /// Update existing records matching on this field
        #[arg(long)]
        merge: Option<FieldId>,
        #[arg(long)]
        json: bool,
    },
    /// Delete records matching a filter expression
    Delete {
        #[arg(long = "where")]
        filter: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Print a file attachment as a data: URI
    Href { path: String },
    /// Save a file attachment to disk
    Download {
        path: String,
        #[arg(long, short)]
        output: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(log::LevelFilter::Info);
        }
        _ => {
            builder.filter_level(log::LevelFilter::Debug);
        }
    }
    builder.init();
}

async fn run(table: &QuickbaseTable, command: Command) -> Result<Outcome<()>> {
    match command {
        Command::Search {
            filter,
            select,
            sort,
            top,
            skip,
            json,
        } => {
            let options = SearchOptions {
                filter,
                select,
                sort,
                top,
                skip,
            };
            commands::search(table, options, json).await
        }
        Command::Record {
            record_id,
            select,
            json,
        } => commands::record(table, record_id, select, json).await,
        Command::Fields { json } => commands::fields(table, json).await,
        Command::PrimaryKey => commands::primary_key(table).await,
        Command::Report {
            report_id,
            top,
            skip,
            json,
        } => commands::report(table, &report_id, top, skip, json).await,
        Command::ReportMeta { report_id, json } => {
            commands::report_meta(table, &report_id, json).await
        }
        Command::Create {
            fields,
            merge,
            json,
        } => commands::create(table, fields, merge, json).await,
        Command::Delete { filter, yes } => commands::delete(table, &filter, yes).await,
        Command::Href { path } => commands::href(table, &path).await,
        Command::Download { path, output } => commands::download(table, &path, &output).await,
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    let profile = Profile::load(args.config.as_deref())?;
    let overrides = Overrides {
        realm: args.realm,
        table: args.table,
        token: args.token.map(SecretString::from),
        app_token: args.app_token.map(SecretString::from),
    };
    let table = QuickbaseTable::new(profile.into_config(overrides)?)?;

    match run(&table, args.command).await? {
        Outcome::Data(()) => Ok(ExitCode::SUCCESS),
        Outcome::Unreachable => {
            eprintln!(
                "{} Could not reach {}",
                "Warning:".bright_yellow(),
                table.config().base_url()
            );
            Ok(ExitCode::from(2))
        }
    }
}
