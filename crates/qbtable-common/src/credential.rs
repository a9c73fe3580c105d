use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

/// Authorization scheme used for externally issued user tokens.
pub const USER_TOKEN_SCHEME: &str = "QB-USER-TOKEN";

/// Authorization scheme used for temporary tokens fetched from the backend.
pub const TEMP_TOKEN_SCHEME: &str = "QB-TEMP-TOKEN";

/// Where a [`Credential`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// Supplied by the host environment; adopted without a network call.
    External,
    /// Issued by the backend's temporary-authorization endpoint.
    Fetched,
}

/// The bearer credential attached to backend requests.
///
/// A client holds at most one live credential. Refreshing replaces it
/// wholesale; credentials are never merged or persisted.
#[derive(Clone)]
pub struct Credential {
    value: SecretString,
    kind: CredentialKind,
    expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"[REDACTED]")
            .field("kind", &self.kind)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Credential {
    /// Wraps an externally issued token. External tokens never expire locally.
    #[must_use]
    pub const fn external(value: SecretString) -> Self {
        Self {
            value,
            kind: CredentialKind::External,
            expires_at: None,
        }
    }

    /// Wraps a token fetched from the backend, expiring at `expires_at`.
    #[must_use]
    pub const fn fetched(value: SecretString, expires_at: DateTime<Utc>) -> Self {
        Self {
            value,
            kind: CredentialKind::Fetched,
            expires_at: Some(expires_at),
        }
    }

    /// Where this credential came from.
    #[must_use]
    pub const fn kind(&self) -> CredentialKind {
        self.kind
    }

    /// Local expiry instant, if any.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// The raw token value.
    #[must_use]
    pub const fn value(&self) -> &SecretString {
        &self.value
    }

    /// Whether the credential is past its local expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Whether the credential is past its local expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Renders the `Authorization` header value.
    ///
    /// External values that already carry a `QB-` scheme are sent verbatim.
    #[must_use]
    pub fn authorization(&self) -> String {
        let token = self.value.expose_secret();
        match self.kind {
            CredentialKind::External if token.starts_with("QB-") => token.to_string(),
            CredentialKind::External => format!("{USER_TOKEN_SCHEME} {token}"),
            CredentialKind::Fetched => format!("{TEMP_TOKEN_SCHEME} {token}"),
        }
    }
}
