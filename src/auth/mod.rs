//! Registration, credential checks and session lifecycle.
//!
//! Sessions move from active to expired purely by time. Expiry is noticed
//! lazily by [`AuthService::validate_token`], which also schedules the
//! deletion; [`AuthService::sweep_expired_sessions`] removes the rest in bulk.

pub mod password;
pub mod token;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::db::{CredentialStore, SessionStore, StoreError};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Identity, Session, User};
use crate::tasks;

pub use password::{PasswordError, PolicyViolation};

const DUMMY_PASSWORD: &str = "Dummy-passw0rd!";

pub struct AuthService {
    users: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    admin_token: String,
    token_duration: Duration,
    bcrypt_cost: u32,
    /// Verified against on unknown logins so both failures cost one bcrypt run.
    dummy_hash: OnceCell<String>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        admin_token: impl Into<String>,
        token_duration: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            admin_token: admin_token.into(),
            token_duration,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            dummy_hash: OnceCell::new(),
        }
    }

    /// Overrides the bcrypt work factor (4..=31).
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Creates an account. Requires the configured admin secret.
    pub async fn register(
        &self,
        admin_token: &str,
        login: &str,
        password: &str,
    ) -> ServiceResult<User> {
        if !constant_time_eq(admin_token, &self.admin_token) {
            tracing::warn!(login, "Invalid admin token provided during registration");
            return Err(ServiceError::unauthorized("invalid admin token"));
        }

        password::validate_login(login).map_err(|e| {
            tracing::warn!(login, error = %e, "Invalid login format during registration");
            ServiceError::bad_request(e.to_string())
        })?;
        password::validate_password(password).map_err(|e| {
            tracing::warn!(login, error = %e, "Invalid password during registration");
            ServiceError::bad_request(e.to_string())
        })?;

        match self.users.get_by_login(login).await {
            Ok(_) => {
                tracing::warn!(login, "Attempt to register existing user");
                return Err(ServiceError::bad_request("user already exists"));
            }
            Err(StoreError::NotFound) => {}
            Err(e) => {
                tracing::error!(login, error = %e, "Failed to look up user during registration");
                return Err(ServiceError::internal("failed to create user"));
            }
        }

        let hash = match password::hash_password(password, self.bcrypt_cost).await {
            Ok(hash) => hash,
            Err(PasswordError::HashingError(reason)) => {
                tracing::error!(login, %reason, "Failed to hash password");
                return Err(ServiceError::internal("failed to hash password"));
            }
        };

        let user = User::new(login, hash);
        match self.users.create(&user).await {
            Ok(()) => {}
            Err(StoreError::Conflict) => {
                tracing::warn!(login, "Concurrent registration of the same login");
                return Err(ServiceError::bad_request("user already exists"));
            }
            Err(e) => {
                tracing::error!(login, error = %e, "Failed to create user");
                return Err(ServiceError::internal("failed to create user"));
            }
        }

        tracing::info!(user_id = %user.id, login, "User registered");
        Ok(user)
    }

    /// Checks credentials and opens a session, returning its token.
    ///
    /// Unknown logins and wrong passwords fail identically.
    pub async fn authenticate(&self, login: &str, password: &str) -> ServiceResult<String> {
        let user = match self.users.get_by_login(login).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                self.burn_verification(password).await;
                tracing::warn!(login, "Authentication failed: unknown login");
                return Err(invalid_credentials());
            }
            Err(e) => {
                tracing::error!(login, error = %e, "Failed to look up user");
                return Err(ServiceError::internal("failed to authenticate"));
            }
        };

        if !password::verify_password(password, &user.password_hash).await {
            tracing::warn!(login, user_id = %user.id, "Authentication failed: wrong password");
            return Err(invalid_credentials());
        }

        let lifetime = chrono::Duration::from_std(self.token_duration)
            .map_err(|_| ServiceError::internal("invalid token duration"))?;
        let session = Session::new(user.id, token::generate_token(), Utc::now() + lifetime);

        self.sessions.create(&session).await.map_err(|e| {
            tracing::error!(user_id = %user.id, error = %e, "Failed to create session");
            ServiceError::internal("failed to create session")
        })?;

        tracing::info!(
            user_id = %user.id,
            login,
            expires_at = %session.expires_at,
            "User authenticated"
        );
        Ok(session.token)
    }

    /// Runs one bcrypt verification against a throwaway hash of the
    /// configured cost. The outcome is ignored.
    async fn burn_verification(&self, password: &str) {
        let cost = self.bcrypt_cost;
        let dummy = self
            .dummy_hash
            .get_or_try_init(|| password::hash_password(DUMMY_PASSWORD, cost))
            .await;
        match dummy {
            Ok(hash) => {
                password::verify_password(password, hash).await;
            }
            Err(e) => tracing::warn!(error = %e, "Failed to prepare dummy password hash"),
        }
    }

    /// Resolves a bearer token to the identity that owns it.
    pub async fn validate_token(&self, token: &str) -> ServiceResult<Identity> {
        let session = match self.sessions.get_by_token(token).await {
            Ok(session) => session,
            Err(StoreError::NotFound) => {
                tracing::debug!("Token validation failed: no session");
                return Err(ServiceError::unauthorized("invalid token"));
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to look up session");
                return Err(ServiceError::internal("failed to validate token"));
            }
        };

        if session.is_expired_at(Utc::now()) {
            tracing::info!(
                user_id = %session.user_id,
                expires_at = %session.expires_at,
                "Token expired"
            );
            let sessions = Arc::clone(&self.sessions);
            let token = token.to_string();
            tasks::spawn_guarded("delete expired session", async move {
                sessions.delete(&token).await
            });
            return Err(ServiceError::unauthorized("token expired"));
        }

        match self.users.get_by_id(session.user_id).await {
            Ok(user) => Ok(user.identity()),
            Err(StoreError::NotFound) => {
                tracing::warn!(user_id = %session.user_id, "Session owner no longer exists");
                Err(ServiceError::unauthorized("user not found"))
            }
            Err(e) => {
                tracing::error!(user_id = %session.user_id, error = %e, "Failed to load session owner");
                Err(ServiceError::internal("failed to validate token"))
            }
        }
    }

    /// Ends the session for `token`. Unknown tokens are accepted silently.
    pub async fn logout(&self, token: &str) -> ServiceResult<()> {
        self.sessions.delete(token).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to delete session during logout");
            ServiceError::internal("failed to logout")
        })?;
        tracing::debug!("Session closed");
        Ok(())
    }

    /// Deletes every expired session, returning how many were removed.
    pub async fn sweep_expired_sessions(&self) -> ServiceResult<u64> {
        let removed = self.sessions.delete_expired().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to sweep expired sessions");
            ServiceError::internal("failed to sweep sessions")
        })?;
        if removed > 0 {
            tracing::info!(removed, "Swept expired sessions");
        }
        Ok(removed)
    }

    /// Looks up the identity registered under `login`.
    pub async fn find_identity(&self, login: &str) -> ServiceResult<Identity> {
        match self.users.get_by_login(login).await {
            Ok(user) => Ok(user.identity()),
            Err(StoreError::NotFound) => Err(ServiceError::not_found("user not found")),
            Err(e) => {
                tracing::error!(login, error = %e, "Failed to look up user");
                Err(ServiceError::internal("failed to get user"))
            }
        }
    }
}

fn invalid_credentials() -> ServiceError {
    ServiceError::unauthorized("invalid credentials")
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}
