//! # qbtable-client
//!
//! Async client for a single Quickbase table.
//!
//! [`QuickbaseTable`] is the entry point. Underneath it:
//! - [`TokenManager`] keeps one live credential and serializes its acquisition
//! - [`RequestExecutor`] attaches the credential and retries rate-limited or
//!   rejected requests within a fixed budget
//! - [`query`] builds request payloads and [`rehydrate`] turns raw records
//!   into self-describing [`qbtable_common::Record`]s
//!
//! A backend that cannot be reached is not an error: operations return
//! [`Outcome::Unreachable`](qbtable_common::Outcome::Unreachable).
//!
//! ## Example
//!
//! ```no_run
//! use qbtable_client::QuickbaseTable;
//! use qbtable_common::{Config, NewRecord, Outcome};
//! use serde_json::json;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let table = QuickbaseTable::new(Config::new("bqx7xre7a", "example.quickbase.com"))?;
//!
//! let record = NewRecord::from([(6, json!("Ada")), (7, json!(36))]);
//! if let Outcome::Data(result) = table.create_records(&[record]).await? {
//!     println!("created {:?}", result.metadata.created_record_ids);
//! }
//! # Ok(())
//! # }
//! ```

pub mod credentials;
pub mod error;
pub mod executor;
pub mod query;
pub mod rehydrate;
pub mod table;
pub mod token;

pub use credentials::{CredentialSource, StaticToken, TemporaryAuth};
pub use error::{ClientError, Result};
pub use executor::{ApiRequest, Payload, RequestExecutor};
pub use table::QuickbaseTable;
pub use token::{TokenManager, TokenSnapshot};
