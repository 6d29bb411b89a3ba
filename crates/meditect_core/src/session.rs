//! crates/meditect_core/src/session.rs
//!
//! The session & profile reconciliation workflow: sign-in with profile
//! bootstrap, sign-up, session restore, sign-out and password reset.
//!
//! The workflow owns the signed-in state and publishes read-only snapshots of it
//! through a `watch` channel. Screens subscribe instead of reaching for a global.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{NewProfile, Principal, PrincipalMetadata, StoredSession, UserProfile};
use crate::error::AuthError;
use crate::link::parse_confirmation_link;
use crate::ports::{AuthService, CredentialStore, DatabaseService, PortError};
use crate::validation::validate_registration;

/// The single credential-store slot holding the persisted session.
pub const SESSION_KEY: &str = "session";

/// What the screen layer sees of the authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub user: Option<UserProfile>,
    /// True while any workflow operation is in flight. Advisory only.
    pub loading: bool,
}

impl AuthSnapshot {
    pub fn user_id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|u| u.id)
    }
}

//=========================================================================================
// The Workflow
//=========================================================================================

pub struct SessionWorkflow {
    auth: Arc<dyn AuthService>,
    db: Arc<dyn DatabaseService>,
    store: Arc<dyn CredentialStore>,
    state: watch::Sender<AuthSnapshot>,
    session: Mutex<Option<StoredSession>>,
    in_flight: AtomicUsize,
}

/// Keeps `loading` raised for as long as at least one operation holds a guard.
struct BusyGuard<'a> {
    workflow: &'a SessionWorkflow,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let in_flight = &self.workflow.in_flight;
        self.workflow.state.send_if_modified(|s| {
            if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                s.loading = false;
                true
            } else {
                false
            }
        });
    }
}

impl SessionWorkflow {
    pub fn new(
        auth: Arc<dyn AuthService>,
        db: Arc<dyn DatabaseService>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let (state, _) = watch::channel(AuthSnapshot::default());
        Self {
            auth,
            db,
            store,
            state,
            session: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
        }
    }

    // --- Read-only state ---

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.state.borrow().user.clone()
    }

    pub fn current_session(&self) -> Option<StoredSession> {
        self.session_slot().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    // --- Operations ---

    /// Loads the persisted session, if any. Never fails: every problem degrades
    /// to the signed-out state and is only logged.
    #[instrument(skip(self))]
    pub async fn restore_session(&self) {
        let _busy = self.begin();

        let raw = match self.store.get(SESSION_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("no persisted session");
                return;
            }
            Err(e) => {
                warn!(error = %e, "failed to read persisted session");
                return;
            }
        };

        let stored: StoredSession = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "persisted session is unreadable; starting signed out");
                return;
            }
        };

        self.auth.adopt_tokens(&stored.tokens).await;

        match self.db.get_profile(stored.user.id).await {
            Ok(profile) => {
                info!(user_id = %profile.id, "session restored");
                self.set_authenticated(StoredSession {
                    tokens: stored.tokens,
                    user: profile,
                });
            }
            Err(e) => {
                error!(error = %e, user_id = %stored.user.id, "failed to load profile for persisted session");
            }
        }
    }

    /// Signs in, making sure a profile row exists for the principal before any
    /// authenticated state becomes visible. On failure nothing changes, the auth
    /// client included.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, AuthError> {
        let _busy = self.begin();

        let previous = self.current_session();
        let grant = self
            .auth
            .sign_in_with_password(email, password)
            .await
            .map_err(|e| {
                warn!(error = %e, "password sign-in failed");
                classify_sign_in_error(e)
            })?;

        let profile = match self.admit(&grant.principal).await {
            Ok(profile) => profile,
            Err(e) => {
                self.reinstate_auth_client(previous.as_ref()).await;
                return Err(e);
            }
        };

        let stored = StoredSession {
            tokens: grant.tokens,
            user: profile.clone(),
        };
        if let Err(e) = self.persist(&stored).await {
            warn!(error = %e, user_id = %profile.id, "signed in, but the session could not be persisted");
        }
        self.set_authenticated(stored);

        info!(user_id = %profile.id, "user signed in");
        Ok(profile)
    }

    /// Registers a principal without signing in. A session only ever comes from
    /// `sign_in` after the email has been verified.
    #[instrument(skip(self, password))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Principal, AuthError> {
        let _busy = self.begin();

        validate_registration(email, password, name)?;

        let metadata = PrincipalMetadata {
            name: name.trim().to_string(),
        };
        let principal = self
            .auth
            .sign_up(email, password, &metadata)
            .await
            .map_err(|e| {
                warn!(error = %e, "registration failed");
                match e {
                    PortError::Rejected(reason) | PortError::Conflict(reason) => {
                        AuthError::RegistrationFailed(reason)
                    }
                    other => AuthError::RegistrationFailed(other.to_string()),
                }
            })?;

        info!(user_id = %principal.id, "user registered; awaiting email verification");
        Ok(principal)
    }

    /// Ends the session. Local state and the persisted entry are always cleared;
    /// a failed remote call is reported afterwards as `SignOutFailed`.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let _busy = self.begin();

        let remote = self.auth.sign_out().await;

        let user_id = self.clear_authenticated();
        if let Err(e) = self.store.delete(SESSION_KEY).await {
            warn!(error = %e, "failed to delete persisted session");
        }

        match remote {
            Ok(()) => {
                info!(user_id = ?user_id, "user signed out");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, user_id = ?user_id, "remote sign-out failed; local session cleared");
                Err(AuthError::SignOutFailed(e.to_string()))
            }
        }
    }

    /// Asks the auth service to send a reset email. The outcome never reveals
    /// whether the address is registered.
    #[instrument(skip(self, email))]
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let _busy = self.begin();

        self.auth
            .reset_password_for_email(email)
            .await
            .map_err(|e| {
                warn!(error = %e, "password reset request failed");
                AuthError::ResetRequestFailed
            })
    }

    /// Checks an email verification deep link. Returns the verified principal;
    /// the user still has to sign in.
    #[instrument(skip(self, link))]
    pub async fn confirm_email(&self, link: &str) -> Result<Principal, AuthError> {
        let _busy = self.begin();

        let tokens = parse_confirmation_link(link, Utc::now())?;
        let principal = self.auth.verify_tokens(&tokens).await.map_err(|e| {
            warn!(error = %e, "email confirmation tokens rejected");
            AuthError::ConfirmationFailed(e.to_string())
        })?;

        if !principal.is_email_verified() {
            return Err(AuthError::ConfirmationFailed(
                "email address is still unverified".into(),
            ));
        }

        info!(user_id = %principal.id, "email verified");
        Ok(principal)
    }

    /// Exchanges the refresh token for a new pair and re-persists the session.
    #[instrument(skip(self))]
    pub async fn refresh_session(&self) -> Result<(), AuthError> {
        let _busy = self.begin();

        let current = self.current_session().ok_or(AuthError::NotSignedIn)?;
        let grant = self
            .auth
            .refresh_session(&current.tokens.refresh_token)
            .await
            .map_err(|e| {
                warn!(error = %e, user_id = %current.user.id, "session refresh failed");
                AuthError::SessionRefreshFailed(e.to_string())
            })?;

        if grant.principal.id != current.user.id {
            error!(expected = %current.user.id, actual = %grant.principal.id, "refreshed session belongs to another user");
            self.reinstate_auth_client(Some(&current)).await;
            return Err(AuthError::SessionRefreshFailed(
                "refreshed session belongs to a different user".into(),
            ));
        }

        let refreshed = StoredSession {
            tokens: grant.tokens,
            user: current.user,
        };

        let superseded = {
            let mut slot = self.session_slot();
            match slot.as_ref() {
                Some(s) if s.user.id == refreshed.user.id => {
                    *slot = Some(refreshed.clone());
                    None
                }
                other => Some(other.cloned()),
            }
        };
        if let Some(latest) = superseded {
            debug!("session changed while refreshing; discarding refreshed tokens");
            self.reinstate_auth_client(latest.as_ref()).await;
            return Err(AuthError::NotSignedIn);
        }

        if let Err(e) = self.persist(&refreshed).await {
            warn!(error = %e, user_id = %refreshed.user.id, "refreshed session could not be persisted");
        }
        debug!(user_id = %refreshed.user.id, "session refreshed");
        Ok(())
    }

    //=====================================================================================
    // Profile reconciliation
    //=====================================================================================

    /// Checks a freshly authenticated principal and resolves its profile.
    async fn admit(&self, principal: &Principal) -> Result<UserProfile, AuthError> {
        if !principal.is_email_verified() {
            warn!(user_id = %principal.id, "sign-in refused: email not verified");
            return Err(AuthError::EmailNotVerified);
        }
        self.resolve_profile(principal).await
    }

    async fn resolve_profile(&self, principal: &Principal) -> Result<UserProfile, AuthError> {
        match self.db.get_profile(principal.id).await {
            Ok(profile) => Ok(profile),
            Err(PortError::NotFound(_)) => {
                info!(user_id = %principal.id, "no profile yet; creating one");
                self.bootstrap_profile(principal).await
            }
            Err(e) => {
                error!(error = %e, user_id = %principal.id, "profile fetch failed");
                Err(AuthError::ProfileFetchFailed(e.to_string()))
            }
        }
    }

    /// Insert, falling back to an upsert when another device won the race, then
    /// re-fetch to pick up server-assigned fields.
    async fn bootstrap_profile(&self, principal: &Principal) -> Result<UserProfile, AuthError> {
        self.ensure_current_principal(principal.id).await?;

        let draft = NewProfile::from_principal(principal, Utc::now());
        match self.db.insert_profile(&draft).await {
            Ok(_) => {}
            Err(PortError::Conflict(reason)) => {
                info!(user_id = %draft.id, reason = %reason, "profile created concurrently; upserting");
                self.db.upsert_profile(&draft).await.map_err(|e| {
                    error!(error = %e, user_id = %draft.id, "profile upsert failed");
                    AuthError::ProfileCreationFailed(e.to_string())
                })?;
            }
            Err(e) => {
                error!(error = %e, user_id = %draft.id, "profile insert failed");
                return Err(AuthError::ProfileCreationFailed(e.to_string()));
            }
        }

        self.db.get_profile(draft.id).await.map_err(|e| {
            error!(error = %e, user_id = %draft.id, "failed to fetch newly created profile");
            AuthError::ProfileCreationFailed(e.to_string())
        })
    }

    /// A profile may only be written for the principal the auth service
    /// currently considers signed in.
    async fn ensure_current_principal(&self, expected: Uuid) -> Result<(), AuthError> {
        match self.auth.current_principal().await {
            Ok(Some(current)) if current.id == expected => Ok(()),
            Ok(Some(current)) => {
                error!(expected = %expected, actual = %current.id, "principal mismatch");
                Err(AuthError::ProfileCreationFailed(
                    "authenticated user does not match the profile being created".into(),
                ))
            }
            Ok(None) => Err(AuthError::ProfileCreationFailed(
                "no authenticated user".into(),
            )),
            Err(e) => {
                error!(error = %e, "failed to resolve current principal");
                Err(AuthError::ProfileCreationFailed(e.to_string()))
            }
        }
    }

    //=====================================================================================
    // State helpers
    //=====================================================================================

    /// Puts the auth client back on the tokens of `session`, or clears it.
    async fn reinstate_auth_client(&self, session: Option<&StoredSession>) {
        match session {
            Some(session) => self.auth.adopt_tokens(&session.tokens).await,
            None => self.auth.discard_tokens().await,
        }
    }

    fn begin(&self) -> BusyGuard<'_> {
        self.state.send_modify(|s| {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            s.loading = true;
        });
        BusyGuard { workflow: self }
    }

    fn session_slot(&self) -> MutexGuard<'_, Option<StoredSession>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn persist(&self, stored: &StoredSession) -> Result<(), AuthError> {
        let json = serde_json::to_string(stored)
            .map_err(|e| AuthError::CredentialStore(e.to_string()))?;
        self.store
            .set(SESSION_KEY, &json)
            .await
            .map_err(|e| AuthError::CredentialStore(e.to_string()))
    }

    fn set_authenticated(&self, stored: StoredSession) {
        let user = stored.user.clone();
        *self.session_slot() = Some(stored);
        self.state.send_modify(|s| s.user = Some(user));
    }

    fn clear_authenticated(&self) -> Option<Uuid> {
        let previous = self.session_slot().take();
        self.state.send_modify(|s| s.user = None);
        previous.map(|s| s.user.id)
    }
}

fn classify_sign_in_error(e: PortError) -> AuthError {
    match e {
        PortError::Rejected(_) | PortError::Unauthorized | PortError::NotFound(_) => {
            AuthError::InvalidCredentials
        }
        PortError::Unverified => AuthError::EmailNotVerified,
        PortError::Conflict(reason) | PortError::Unexpected(reason) => {
            AuthError::ServiceUnavailable(reason)
        }
    }
}
