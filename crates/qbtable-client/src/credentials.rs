//! Credential sources.
//!
//! A [`CredentialSource`] produces a fresh [`Credential`] on demand. Sources
//! never fail loudly: an unavailable token is reported as `None` and logged,
//! and the request executor's retry path notices the continued rejection.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use log::{debug, info, warn};
use reqwest::header::{CONTENT_TYPE, COOKIE, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};

use qbtable_common::wire::TemporaryAuthResponse;
use qbtable_common::{Config, Credential};

use crate::executor::REALM_HEADER;

/// Header carrying an application token on the temporary-auth request.
pub const APP_TOKEN_HEADER: &str = "QB-App-Token";

/// Produces credentials for the token manager.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Obtains a credential, or `None` when none can be issued right now.
    async fn acquire(&self) -> Option<Credential>;
}

/// A pre-issued token supplied by the host environment.
///
/// Adopted as-is on every acquisition, without any network call.
#[derive(Clone)]
pub struct StaticToken {
    token: SecretString,
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticToken")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl StaticToken {
    /// Wraps an externally issued token.
    #[must_use]
    pub const fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl CredentialSource for StaticToken {
    async fn acquire(&self) -> Option<Credential> {
        debug!("Adopting externally supplied token");
        Some(Credential::external(self.token.clone()))
    }
}

/// Requests short-lived tokens from `GET /auth/temporary/{tableId}`.
///
/// The request authenticates with the ambient session (a session cookie
/// and/or an application token), never with the application credential the
/// token manager hands out.
#[derive(Clone)]
pub struct TemporaryAuth {
    http: reqwest::Client,
    url: String,
    realm_host: String,
    user_agent: String,
    app_token: Option<SecretString>,
    session_cookie: Option<SecretString>,
    ttl: TimeDelta,
}

impl fmt::Debug for TemporaryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryAuth")
            .field("url", &self.url)
            .field("realm_host", &self.realm_host)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TemporaryAuth {
    /// Builds a source for the table described by `config`.
    #[must_use]
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            http,
            url: format!("{}/auth/temporary/{}", config.base_url(), config.table_id),
            realm_host: config.realm_host.clone(),
            user_agent: config.user_agent.clone(),
            app_token: config.app_token.clone(),
            session_cookie: config.session_cookie.clone(),
            ttl: ttl_from(config.token_ttl()),
        }
    }
}

fn ttl_from(ttl: Duration) -> TimeDelta {
    TimeDelta::from_std(ttl).unwrap_or_else(|_| TimeDelta::minutes(5))
}

#[async_trait]
impl CredentialSource for TemporaryAuth {
    async fn acquire(&self) -> Option<Credential> {
        let mut request = self
            .http
            .get(&self.url)
            .header(REALM_HEADER, &self.realm_host)
            .header(USER_AGENT, &self.user_agent)
            .header(CONTENT_TYPE, "application/json");

        if let Some(app_token) = &self.app_token {
            request = request.header(APP_TOKEN_HEADER, app_token.expose_secret());
        }
        if let Some(cookie) = &self.session_cookie {
            request = request.header(COOKIE, cookie.expose_secret());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Temporary token request failed: {e}");
                return None;
            }
        };

        let status = response.status();
        let body = match response.json::<TemporaryAuthResponse>().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Unable to authenticate (status {status}): unreadable token response: {e}");
                return None;
            }
        };

        match body.temporary_authorization.filter(|t| !t.is_empty()) {
            Some(token) => {
                info!("Obtained temporary token (valid for {}s)", self.ttl.num_seconds());
                Some(Credential::fetched(
                    SecretString::new(token.into()),
                    Utc::now() + self.ttl,
                ))
            }
            None => {
                warn!("Unable to authenticate (status {status}): no temporary token in response");
                None
            }
        }
    }
}
