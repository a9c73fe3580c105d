//! Token lifecycle management.
//!
//! The [`TokenManager`] owns the single live [`Credential`] of a client:
//! - adopts or fetches one on first use through its [`CredentialSource`]
//! - serializes acquisition so concurrent callers share one fetch
//! - checks the credential's expiry on every access
//! - optionally clears a fetched credential at expiry from a background task

use std::fmt;
use std::sync::{Arc, Weak};

use chrono::Utc;
use log::{debug, info};
use tokio::sync::{Mutex, RwLock};
use tokio::task::AbortHandle;

use qbtable_common::{Credential, CredentialKind};

use crate::credentials::CredentialSource;

/// A point-in-time view of the managed credential.
///
/// `generation` increases every time the credential is replaced or
/// invalidated; callers hand it back to [`TokenManager::refresh`] so that a
/// refresh already performed by someone else is not repeated.
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    /// The live credential, if any.
    pub credential: Option<Credential>,
    /// Replacement counter at the time of the snapshot.
    pub generation: u64,
}

#[derive(Default)]
struct TokenState {
    credential: Option<Credential>,
    generation: u64,
    expiry_task: Option<AbortHandle>,
}

impl TokenState {
    fn live(&self) -> Option<Credential> {
        self.credential
            .as_ref()
            .filter(|c| !c.is_expired())
            .cloned()
    }

    fn cancel_expiry(&mut self) {
        if let Some(task) = self.expiry_task.take() {
            task.abort();
        }
    }
}

impl Drop for TokenState {
    fn drop(&mut self) {
        self.cancel_expiry();
    }
}

/// Owns the current credential and decides when to acquire a new one.
pub struct TokenManager {
    source: Arc<dyn CredentialSource>,
    state: Arc<RwLock<TokenState>>,
    acquire_lock: Mutex<()>,
    proactive_expiry: bool,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("proactive_expiry", &self.proactive_expiry)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Creates a manager drawing credentials from `source`.
    ///
    /// With `proactive_expiry`, a fetched credential is cleared by a
    /// background task at its expiry instant in addition to the check
    /// performed on every access.
    #[must_use]
    pub fn new(source: Arc<dyn CredentialSource>, proactive_expiry: bool) -> Self {
        Self {
            source,
            state: Arc::new(RwLock::new(TokenState::default())),
            acquire_lock: Mutex::new(()),
            proactive_expiry,
        }
    }

    /// Returns the current valid credential, acquiring one only if absent.
    ///
    /// Concurrent callers that find no credential wait for a single
    /// acquisition. Never fails: `None` means no credential could be
    /// obtained, and the request is expected to proceed without one.
    pub async fn ensure_token(&self) -> Option<Credential> {
        let observed = {
            let state = self.state.read().await;
            if let Some(credential) = state.live() {
                return Some(credential);
            }
            state.generation
        };

        let _guard = self.acquire_lock.lock().await;
        {
            let state = self.state.read().await;
            if state.generation != observed {
                // acquired by another caller while we waited
                return state.live();
            }
        }
        self.acquire().await
    }

    /// Forces a new credential, unless one was already installed after
    /// `observed_generation`.
    pub async fn refresh(&self, observed_generation: u64) -> Option<Credential> {
        let _guard = self.acquire_lock.lock().await;
        {
            let state = self.state.read().await;
            if state.generation != observed_generation {
                debug!("Credential already refreshed by another request");
                return state.live();
            }
        }
        info!("Refreshing credential");
        self.acquire().await
    }

    /// Returns the credential (if live) and the current generation.
    pub async fn snapshot(&self) -> TokenSnapshot {
        let state = self.state.read().await;
        TokenSnapshot {
            credential: state.live(),
            generation: state.generation,
        }
    }

    /// Drops the current credential.
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.cancel_expiry();
        state.credential = None;
        state.generation += 1;
        debug!("Credential invalidated");
    }

    /// Whether a live credential is held.
    pub async fn has_token(&self) -> bool {
        self.state.read().await.live().is_some()
    }

    async fn acquire(&self) -> Option<Credential> {
        let credential = self.source.acquire().await;

        let mut state = self.state.write().await;
        state.cancel_expiry();
        state.generation += 1;
        state.credential.clone_from(&credential);
        let generation = state.generation;

        match &credential {
            Some(c) if c.kind() == CredentialKind::Fetched && self.proactive_expiry => {
                state.expiry_task = c
                    .expires_at()
                    .map(|at| self.schedule_expiry(at, generation));
            }
            Some(_) => {}
            None => debug!("No credential available; requests will be sent unauthenticated"),
        }

        credential
    }

    fn schedule_expiry(&self, at: chrono::DateTime<Utc>, generation: u64) -> AbortHandle {
        let delay = (at - Utc::now()).to_std().unwrap_or_default();
        let state: Weak<RwLock<TokenState>> = Arc::downgrade(&self.state);

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(state) = state.upgrade() else {
                return;
            };
            let mut state = state.write().await;
            if state.generation == generation {
                state.credential = None;
                state.expiry_task = None;
                info!("Token expired");
            }
        });
        task.abort_handle()
    }
}
