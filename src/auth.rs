//! Session guard and authentication.
//!
//! Identity truth lives with an [`AuthProvider`]. Views never read a global;
//! they are handed a [`SessionContext`] (or, over HTTP, a session id resolved
//! through a [`SessionStore`]) and ask the [`SessionGuard`] what to render.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::Role;

/// Where unauthenticated visitors are sent. No return target is kept.
pub const LOGIN_PATH: &str = "/login";

/// Shortest password the auth service accepts.
pub const MIN_PASSWORD_LEN: usize = 6;

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub role: Role,
}

/// `Pending` until the provider has decided, then one of the other two.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Pending,
    Authenticated(Identity),
    Unauthenticated,
}

/// Operations consumed from the external authentication service.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// On failure the current state is left untouched.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    async fn sign_out(&self);

    /// Stream of state changes, starting from the current state.
    fn subscribe(&self) -> watch::Receiver<AuthState>;

    /// Registers a new identity without signing it in.
    async fn create_identity(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<Identity, AuthError>;
}

/// Hash a password using Argon2
///
/// # Arguments
/// * `password` - The plaintext password to hash
///
/// # Returns
/// * `Result<String, AuthError>` - The PHC-encoded hash or an error
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Verify a password against a stored hash
///
/// # Returns
/// * `Result<bool, AuthError>` - Whether the password matches, or an error for a malformed hash
fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| AuthError::Hash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

struct Account {
    identity: Identity,
    password_hash: String,
}

/// In-process auth provider with argon2 password hashes.
pub struct LocalAuthProvider {
    accounts: RwLock<HashMap<String, Account>>,
    state: watch::Sender<AuthState>,
}

impl Default for LocalAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalAuthProvider {
    /// Starts `Pending`; call [`settle`](Self::settle) once ready.
    pub fn new() -> Self {
        let (state, _) = watch::channel(AuthState::Pending);
        Self {
            accounts: RwLock::new(HashMap::new()),
            state,
        }
    }

    /// Leaves `Pending` for `Unauthenticated`. No-op once settled.
    pub fn settle(&self) {
        self.state.send_if_modified(|state| {
            if *state == AuthState::Pending {
                *state = AuthState::Unauthenticated;
                true
            } else {
                false
            }
        });
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Creates the initial admin account unless the address is already taken.
    pub async fn bootstrap_admin(&self, email: &str, password: &str) -> Result<(), AuthError> {
        match self.create_identity(email, password, Role::Admin).await {
            Ok(identity) => {
                info!("bootstrap admin {} created", identity.email);
                Ok(())
            }
            Err(AuthError::EmailInUse) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn lookup(&self, email: &str) -> Option<(Identity, String)> {
        let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
        accounts
            .get(&normalize_email(email))
            .map(|a| (a.identity.clone(), a.password_hash.clone()))
    }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let Some((identity, hash)) = self.lookup(email) else {
            debug!("sign-in for unknown address");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password, &hash)? {
            debug!("sign-in with wrong password for {}", identity.email);
            return Err(AuthError::InvalidCredentials);
        }

        self.state
            .send_replace(AuthState::Authenticated(identity.clone()));
        info!("{} signed in", identity.email);
        Ok(identity)
    }

    async fn sign_out(&self) {
        self.state.send_replace(AuthState::Unauthenticated);
    }

    fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    async fn create_identity(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<Identity, AuthError> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(AuthError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        if self.lookup(email).is_some() {
            return Err(AuthError::EmailInUse);
        }

        let password_hash = hash_password(password)?;
        let identity = Identity {
            uid: Uuid::new_v4().simple().to_string(),
            email: email.to_string(),
            role,
        };

        let mut accounts = self
            .accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let key = normalize_email(email);
        if accounts.contains_key(&key) {
            return Err(AuthError::EmailInUse);
        }
        accounts.insert(
            key,
            Account {
                identity: identity.clone(),
                password_hash,
            },
        );

        Ok(identity)
    }
}

/// Injected view of the current auth state.
#[derive(Debug, Clone)]
pub struct SessionContext {
    rx: watch::Receiver<AuthState>,
}

impl SessionContext {
    pub fn new(rx: watch::Receiver<AuthState>) -> Self {
        Self { rx }
    }

    pub fn from_provider(provider: &dyn AuthProvider) -> Self {
        Self::new(provider.subscribe())
    }

    pub fn current(&self) -> AuthState {
        self.rx.borrow().clone()
    }

    /// Waits until the state leaves `Pending`. Never resolves while the
    /// provider stays pending.
    pub async fn settled(&mut self) -> AuthState {
        let settled = self
            .rx
            .wait_for(|state| *state != AuthState::Pending)
            .await
            .map(|state| state.clone());

        // The provider went away; report whatever it left behind.
        settled.unwrap_or_else(|_| self.rx.borrow().clone())
    }

    /// Next state change, or `None` once the provider is gone.
    pub async fn changed(&mut self) -> Option<AuthState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Who may see protected views once authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPolicy {
    #[default]
    AnyAuthenticated,
    AdminOnly,
}

impl AccessPolicy {
    pub fn admits(&self, identity: &Identity) -> bool {
        match self {
            AccessPolicy::AnyAuthenticated => true,
            AccessPolicy::AdminOnly => identity.role == Role::Admin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Neutral placeholder, nothing protected is shown.
    Loading,
    RedirectToLogin,
    Forbidden,
    Render(Identity),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionGuard {
    pub policy: AccessPolicy,
}

impl SessionGuard {
    pub fn new(policy: AccessPolicy) -> Self {
        Self { policy }
    }

    pub fn decide(&self, state: &AuthState) -> GuardOutcome {
        match state {
            AuthState::Pending => GuardOutcome::Loading,
            AuthState::Unauthenticated => GuardOutcome::RedirectToLogin,
            AuthState::Authenticated(identity) if self.policy.admits(identity) => {
                GuardOutcome::Render(identity.clone())
            }
            AuthState::Authenticated(identity) => {
                warn!("{} denied by access policy", identity.email);
                GuardOutcome::Forbidden
            }
        }
    }
}

struct Session {
    identity: Identity,
    expires_at: SystemTime,
}

/// Server-side sessions keyed by an opaque cookie value.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn with_hours(hours: u64) -> Self {
        Self::new(Duration::from_secs(hours * 60 * 60))
    }

    /// Create a new session and return its id
    pub fn create(&self, identity: Identity) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = Session {
            identity,
            expires_at: SystemTime::now() + self.ttl,
        };

        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.clone(), session);

        session_id
    }

    /// The identity behind a live session
    pub fn validate(&self, session_id: &str) -> Option<Identity> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);

        sessions
            .get(session_id)
            .filter(|session| session.expires_at > SystemTime::now())
            .map(|session| session.identity.clone())
    }

    pub fn revoke(&self, session_id: &str) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
    }

    /// Drops expired sessions and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = SystemTime::now();
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        before - sessions.len()
    }

    /// Auth state of a request carrying `session_id` (if any).
    pub fn state_for(&self, session_id: Option<&str>) -> AuthState {
        match session_id.and_then(|id| self.validate(id)) {
            Some(identity) => AuthState::Authenticated(identity),
            None => AuthState::Unauthenticated,
        }
    }
}
