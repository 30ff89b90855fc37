//! Signup, login, and bearer-token authentication.

mod password;
mod token;

pub use password::PasswordHasher;
pub use token::{Claims, IssuedToken, TokenIssuer};

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::access::Caller;
use super::domain::{normalize_email, NewUser, Role, User};
use super::forms::{LoginForm, SignupForm};
use super::store::{HostelStore, StoreError};
use crate::config::AuthConfig;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("authentication required")]
    MissingToken,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("email already registered")]
    EmailTaken,
    #[error("{0} accounts cannot be created through signup")]
    RoleNotSelfService(Role),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("token signing failed: {0}")]
    Token(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Login result handed back to clients.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    #[serde(flatten)]
    pub token: IssuedToken,
    pub user: User,
}

pub struct Accounts<S> {
    store: Arc<S>,
    hasher: PasswordHasher,
    tokens: TokenIssuer,
}

impl<S> Accounts<S>
where
    S: HostelStore,
{
    pub fn new(store: Arc<S>, config: &AuthConfig) -> Self {
        Self {
            store,
            hasher: PasswordHasher::new(),
            tokens: TokenIssuer::new(config),
        }
    }

    /// Self-service registration. Only students and wardens may sign up.
    pub async fn signup(&self, form: SignupForm) -> Result<User, AuthError> {
        if form.role == Role::Admin {
            return Err(AuthError::RoleNotSelfService(Role::Admin));
        }
        self.register(&form.name, &form.email, &form.password, form.role)
            .await
    }

    /// Creates an account of any role. Used by seeding and signup.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, AuthError> {
        let password_hash = self.hasher.hash_password(password)?;
        let user = self
            .store
            .insert_user(NewUser {
                email: normalize_email(email),
                name: name.trim().to_string(),
                password_hash,
                role,
            })
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => AuthError::EmailTaken,
                other => AuthError::Store(other),
            })?;
        info!(user_id = user.id.0, role = %user.role, "account registered");
        Ok(user)
    }

    pub async fn login(&self, form: LoginForm) -> Result<Session, AuthError> {
        let email = normalize_email(&form.email);
        let Some(user) = self.store.user_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        if !self
            .hasher
            .verify_password(&form.password, &user.password_hash)?
        {
            return Err(AuthError::InvalidCredentials);
        }
        let token = self.tokens.issue(&user)?;
        info!(user_id = user.id.0, "login succeeded");
        Ok(Session { token, user })
    }

    /// Resolves a bearer token to the account it was issued for. The account
    /// is reloaded so removed users and role changes take effect immediately.
    pub async fn authenticate(&self, token: &str) -> Result<Caller, AuthError> {
        let claims = self.tokens.verify(token)?;
        let user = self
            .store
            .user(claims.user_id())
            .await?
            .ok_or(AuthError::InvalidToken)?;
        Ok(Caller::from(&user))
    }
}
