//! # qbtable-common
//!
//! Common types and data structures for Quickbase table clients.
//!
//! This crate holds everything that does not perform I/O:
//! - Client configuration and retry settings
//! - Credentials and their authorization header rendering
//! - Rehydrated records, fields and response envelopes
//! - Query descriptions and the JSON payloads exchanged with the backend
//! - Filter-expression helpers
//!
//! ## Example
//!
//! ```
//! use qbtable_common::{Config, Query, SortField};
//! use qbtable_common::filter::Condition;
//!
//! let config = Config::new("bqx7xre7a", "example.quickbase.com")
//!     .with_user_token("b7738j_xxx");
//!
//! let query = Query::builder()
//!     .filter(Condition::equals(6, "open").to_string())
//!     .select(vec![6, 7])
//!     .sort_by(vec![SortField::asc(7)])
//!     .limit(25)
//!     .build();
//!
//! assert_eq!(query.filter, "{6.EX.open}");
//! assert!(config.validate().is_ok());
//! ```

/// Client configuration.
///
/// Contains the per-table `Config` and the executor's `RetryConfig`.
pub mod config;
/// Credentials attached to backend requests.
pub mod credential;
pub mod filter;
/// The `Outcome` type separating "backend unreachable" from real results.
pub mod outcome;
/// Query descriptions.
pub mod query;
/// Rehydrated records and fields.
///
/// Values here carry their field's label, type and primary-key flag.
pub mod record;
pub mod wire;

pub use config::{Config, ConfigError, DEFAULT_BASE_URL, RetryConfig};
pub use credential::{Credential, CredentialKind};
pub use outcome::Outcome;
pub use query::{Query, SortField, SortOrder};
pub use record::{
    Field, FieldId, FieldValue, RECORD_ID_FIELD, Record, ResponseEnvelope, ResultMetadata,
};
pub use wire::{CreateResult, DeleteResult, NewRecord, ReportMeta};
