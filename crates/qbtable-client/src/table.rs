//! High-level operations against one Quickbase table.
//!
//! # Examples
//!
//! ```no_run
//! use qbtable_client::QuickbaseTable;
//! use qbtable_common::filter::Condition;
//! use qbtable_common::{Config, Outcome, Query};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::new("bqx7xre7a", "example.quickbase.com")
//!     .with_user_token("b7738j_xxx");
//! let table = QuickbaseTable::new(config)?;
//!
//! let query = Query::builder()
//!     .filter(Condition::equals(6, "open").to_string())
//!     .select(vec![6, 7])
//!     .limit(25)
//!     .build();
//!
//! match table.search(&query).await? {
//!     Outcome::Data(envelope) => println!("{} record(s)", envelope.len()),
//!     Outcome::Unreachable => eprintln!("backend unreachable"),
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use log::{debug, info};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use qbtable_common::filter::Condition;
use qbtable_common::wire::{FieldDescriptor, RecordsResponse};
use qbtable_common::{
    Config, CreateResult, DeleteResult, Field, FieldId, NewRecord, Outcome, Query,
    RECORD_ID_FIELD, Record, ReportMeta, ResponseEnvelope,
};

use crate::credentials::{CredentialSource, StaticToken, TemporaryAuth};
use crate::error::{ClientError, Result};
use crate::executor::{ApiRequest, Payload, RequestExecutor, build_http_client};
use crate::query::{build_create, build_delete, build_query};
use crate::rehydrate::rehydrate;
use crate::token::TokenManager;

/// Client bound to a single table.
///
/// Cheap to clone; clones share the credential and the primary-key memo.
#[derive(Debug, Clone)]
pub struct QuickbaseTable {
    config: Arc<Config>,
    executor: RequestExecutor,
    primary_key: Arc<OnceCell<FieldId>>,
}

/// Why primary-key discovery produced no id.
enum Discovery {
    Unreachable,
    Failed(ClientError),
}

impl From<ClientError> for Discovery {
    fn from(err: ClientError) -> Self {
        Self::Failed(err)
    }
}

impl QuickbaseTable {
    /// Creates a client for the table described by `config`.
    ///
    /// A configured `user_token` is adopted as-is; otherwise short-lived
    /// tokens are requested from the temporary-authorization endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let http = build_http_client(&config)?;
        let source: Arc<dyn CredentialSource> = match &config.user_token {
            Some(token) => Arc::new(StaticToken::new(token.clone())),
            None => Arc::new(TemporaryAuth::new(&config, http.clone())),
        };
        Ok(Self::assemble(config, http, source))
    }

    /// Creates a client drawing credentials from a custom source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn with_credential_source(
        config: Config,
        source: Arc<dyn CredentialSource>,
    ) -> Result<Self> {
        config.validate()?;
        let http = build_http_client(&config)?;
        Ok(Self::assemble(config, http, source))
    }

    fn assemble(config: Config, http: reqwest::Client, source: Arc<dyn CredentialSource>) -> Self {
        let tokens = Arc::new(TokenManager::new(source, config.proactive_expiry));
        let executor = RequestExecutor::new(&config, http, tokens);
        Self {
            config: Arc::new(config),
            executor,
            primary_key: Arc::new(OnceCell::new()),
        }
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The token manager shared by every request of this client.
    #[must_use]
    pub fn token_manager(&self) -> &Arc<TokenManager> {
        self.executor.tokens()
    }

    fn table_id(&self) -> &str {
        &self.config.table_id
    }

    /// Lists every field of the table.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after retries or the response
    /// is malformed.
    pub async fn list_fields(&self) -> Result<Outcome<Vec<Field>>> {
        let request = ApiRequest::get("/fields").with_query("tableId", self.table_id());
        self.executor.execute(&request).await?.try_map(|payload| {
            let descriptors: Vec<FieldDescriptor> = payload.into_json()?;
            Ok(descriptors
                .into_iter()
                .map(|d| Field {
                    is_primary_key: d.is_flagged_primary(),
                    id: d.id,
                    label: d.label,
                    field_type: d.field_type,
                })
                .collect())
        })
    }

    /// Returns the table's primary-key field id.
    ///
    /// Discovered from the field list on first use and cached for the
    /// lifetime of the client. An unreachable backend is not cached.
    ///
    /// # Errors
    ///
    /// Returns an error if no field is flagged as primary key, or if the
    /// field list cannot be fetched.
    pub async fn primary_key(&self) -> Result<Outcome<FieldId>> {
        let discovered = self
            .primary_key
            .get_or_try_init(|| async {
                let Outcome::Data(fields) = self.list_fields().await? else {
                    return Err(Discovery::Unreachable);
                };
                let pk = fields
                    .iter()
                    .find(|f| f.is_primary_key)
                    .map(|f| f.id)
                    .ok_or_else(|| ClientError::MissingPrimaryKey(self.table_id().to_string()))?;
                info!("Discovered primary key {pk} for table {}", self.table_id());
                Ok(pk)
            })
            .await;

        match discovered {
            Ok(pk) => Ok(Outcome::Data(*pk)),
            Err(Discovery::Unreachable) => Ok(Outcome::Unreachable),
            Err(Discovery::Failed(e)) => Err(e),
        }
    }

    /// Searches the table.
    ///
    /// The primary key is always among the returned fields when `select` is
    /// given.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after retries, the response is
    /// inconsistent, or primary-key discovery fails.
    pub async fn search(&self, query: &Query) -> Result<Outcome<ResponseEnvelope>> {
        self.search_inner(query, None).await
    }

    /// Like [`Self::search`], aborting when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cancelled`] when cancelled, otherwise as
    /// [`Self::search`].
    pub async fn search_with_cancel(
        &self,
        query: &Query,
        cancel: CancellationToken,
    ) -> Result<Outcome<ResponseEnvelope>> {
        self.search_inner(query, Some(cancel)).await
    }

    async fn search_inner(
        &self,
        query: &Query,
        cancel: Option<CancellationToken>,
    ) -> Result<Outcome<ResponseEnvelope>> {
        let Outcome::Data(pk) = self.primary_key().await? else {
            return Ok(Outcome::Unreachable);
        };

        let payload = build_query(self.table_id(), query, Some(pk));
        let request = ApiRequest::post("/records/query", &payload)?.with_cancellation(cancel);

        self.executor.execute(&request).await?.try_map(|payload| {
            let raw: RecordsResponse = payload.into_json()?;
            rehydrate(raw, Some(pk))
        })
    }

    /// Fetches one record by its record id, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// As [`Self::search`].
    pub async fn get_record(
        &self,
        record_id: u64,
        select: Option<Vec<FieldId>>,
    ) -> Result<Outcome<Option<Record>>> {
        let query = Query {
            filter: Condition::equals(RECORD_ID_FIELD, record_id).to_string(),
            select,
            limit: Some(1),
            ..Query::default()
        };
        Ok(self.search(&query).await?.map(ResponseEnvelope::into_first))
    }

    /// Inserts records.
    ///
    /// The result is returned as sent by the backend, without rehydration.
    ///
    /// # Errors
    ///
    /// Returns an error if `records` is empty or the request fails after
    /// retries.
    pub async fn create_records(&self, records: &[NewRecord]) -> Result<Outcome<CreateResult>> {
        self.write_records(records, None).await
    }

    /// Inserts records, updating existing ones whose `merge_field_id` value
    /// matches.
    ///
    /// # Errors
    ///
    /// As [`Self::create_records`].
    pub async fn upsert_records(
        &self,
        records: &[NewRecord],
        merge_field_id: FieldId,
    ) -> Result<Outcome<CreateResult>> {
        self.write_records(records, Some(merge_field_id)).await
    }

    async fn write_records(
        &self,
        records: &[NewRecord],
        merge_field_id: Option<FieldId>,
    ) -> Result<Outcome<CreateResult>> {
        let payload = build_create(self.table_id(), records, merge_field_id)?;
        let request = ApiRequest::post("/records", &payload)?;
        let outcome = self
            .executor
            .execute(&request)
            .await?
            .try_map(Payload::into_json::<CreateResult>)?;

        if let Outcome::Data(result) = &outcome {
            info!(
                "Wrote {} record(s): {} created, {} updated",
                result.metadata.total_number_of_records_processed,
                result.metadata.created_record_ids.len(),
                result.metadata.updated_record_ids.len()
            );
        }
        Ok(outcome)
    }

    /// Deletes every record matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if `filter` is blank or the request fails after
    /// retries.
    pub async fn delete_records(&self, filter: &str) -> Result<Outcome<DeleteResult>> {
        let payload = build_delete(self.table_id(), filter)?;
        let request = ApiRequest::delete("/records", &payload)?;
        self.executor
            .execute(&request)
            .await?
            .try_map(Payload::into_json::<DeleteResult>)
    }

    /// Runs a saved report.
    ///
    /// Fields keep the report's order. The primary flag comes from the
    /// report's own field descriptors, falling back to the primary key when it
    /// has already been discovered; no discovery call is made here.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after retries or the response is
    /// inconsistent.
    pub async fn run_report(
        &self,
        report_id: &str,
        top: Option<u32>,
        skip: Option<u32>,
    ) -> Result<Outcome<ResponseEnvelope>> {
        let request = ApiRequest::get(format!("/reports/{report_id}/run"))
            .with_query("tableId", self.table_id())
            .with_optional_query("top", top)
            .with_optional_query("skip", skip);

        let known_pk = self.primary_key.get().copied();
        self.executor.execute(&request).await?.try_map(|payload| {
            let raw: RecordsResponse = payload.into_json()?;
            let pk = if raw.fields.iter().any(FieldDescriptor::is_flagged_primary) {
                None
            } else {
                known_pk
            };
            rehydrate(raw, pk)
        })
    }

    /// Fetches a report's definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after retries or the response is
    /// malformed.
    pub async fn report_meta(&self, report_id: &str) -> Result<Outcome<ReportMeta>> {
        let request = ApiRequest::get(format!("/reports/{report_id}"))
            .with_query("tableId", self.table_id());
        self.executor
            .execute(&request)
            .await?
            .try_map(Payload::into_json::<ReportMeta>)
    }

    /// Fetches a binary resource as a `data:` URI.
    ///
    /// The backend serves file contents as base64 text, which is used
    /// verbatim apart from line breaks; any other body is encoded first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after retries or the body is a
    /// JSON document rather than file contents.
    pub async fn get_href(&self, path: &str) -> Result<Outcome<String>> {
        self.fetch_file(path).await?.try_map(|(mime, body)| {
            let encoded = match decode_base64_text(&body) {
                Some((text, _)) => text,
                None => STANDARD.encode(&body),
            };
            Ok(format!("data:{mime};base64,{encoded}"))
        })
    }

    /// Fetches a binary resource and returns its decoded bytes.
    ///
    /// # Errors
    ///
    /// As [`Self::get_href`].
    pub async fn download(&self, path: &str) -> Result<Outcome<Vec<u8>>> {
        self.fetch_file(path).await?.try_map(|(_, body)| {
            Ok(match decode_base64_text(&body) {
                Some((_, bytes)) => bytes,
                None => body,
            })
        })
    }

    async fn fetch_file(&self, path: &str) -> Result<Outcome<(String, Vec<u8>)>> {
        let outcome = self.executor.execute(&ApiRequest::get(path)).await?;
        outcome.try_map(|payload| match payload {
            Payload::Binary {
                content_type,
                bytes,
            } => {
                let mime = content_type
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                debug!("Fetched {} byte(s) of {mime} from {path}", bytes.len());
                Ok((mime, bytes))
            }
            // Some deployments label the base64 text as a JSON string.
            Payload::Json(serde_json::Value::String(text)) => {
                Ok(("application/octet-stream".to_string(), text.into_bytes()))
            }
            Payload::Json(_) => Err(ClientError::InvalidResponse(format!(
                "expected file contents from {path}, got a JSON document"
            ))),
        })
    }
}

/// Standard alphabet, padding optional.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// URL-safe alphabet, padding optional.
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The body as base64 text with whitespace removed, and its decoded bytes,
/// if the body is entirely base64.
fn decode_base64_text(body: &[u8]) -> Option<(String, Vec<u8>)> {
    let text: String = std::str::from_utf8(body)
        .ok()?
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if text.is_empty() {
        return None;
    }
    let bytes = LENIENT
        .decode(&text)
        .or_else(|_| LENIENT_URL_SAFE.decode(&text))
        .ok()?;
    Some((text, bytes))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn test_base64_detection() {
        let hello = Some(("aGVsbG8=".to_string(), b"hello".to_vec()));
        assert_eq!(decode_base64_text(b"aGVsbG8=\n"), hello);
        assert_eq!(decode_base64_text(&[0x89, b'P', b'N', b'G']), None);
        assert_eq!(decode_base64_text(b"not base64!"), None);
        assert_eq!(decode_base64_text(b""), None);
        assert_eq!(decode_base64_text(b" \r\n"), None);
    }

    #[test]
    fn test_base64_detection_tolerates_missing_padding() {
        assert_eq!(
            decode_base64_text(b"aGVsbG8"),
            Some(("aGVsbG8".to_string(), b"hello".to_vec()))
        );
    }

    #[test]
    fn test_base64_detection_joins_wrapped_lines() {
        assert_eq!(
            decode_base64_text(b"aGVs\nbG8=\r\n"),
            Some(("aGVsbG8=".to_string(), b"hello".to_vec()))
        );
    }

    #[test]
    fn test_base64_detection_accepts_url_safe_alphabet() {
        assert_eq!(
            decode_base64_text(b"-_8="),
            Some(("-_8=".to_string(), vec![0xfb, 0xff]))
        );
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = QuickbaseTable::new(Config::new("", "realm.quickbase.com")).unwrap_err();
        assert!(matches!(err, ClientError::ConfigurationError(_)));
    }

    #[test]
    fn test_clones_share_state() {
        let table = QuickbaseTable::new(
            Config::new("bqtable", "realm.quickbase.com").with_user_token("b7738j"),
        )
        .unwrap();
        let clone = table.clone();
        assert!(Arc::ptr_eq(table.token_manager(), clone.token_manager()));
        assert!(Arc::ptr_eq(&table.primary_key, &clone.primary_key));
        assert_eq!(clone.config().table_id, "bqtable");
    }
}
