use std::sync::Arc;

use axum::extract::FromRef;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest},
        jwt::{Claims, IssuedToken, JwtKeys},
        password::{hash_password, verify_password},
        repo::{CreateUserError, UserRepo},
        repo_types::{NewUser, Role, User},
        validation::{is_valid_email, normalize_email, validate_registration, ValidationErrors},
    },
    error::{AppError, AppResult},
    state::AppState,
};

pub const EMAIL_TAKEN: &str = "The email has already been taken.";

/// Owns user records and the bearer credentials issued for them.
///
/// Handlers get one through `State<AuthService>`; nothing here reads global state.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepo>,
    keys: JwtKeys,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.users.clone(), JwtKeys::from_ref(state))
    }
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepo>, keys: JwtKeys) -> Self {
        Self { users, keys }
    }

    /// Validate, hash and store a new student account.
    #[instrument(skip_all)]
    pub async fn register(&self, req: &RegisterRequest) -> AppResult<User> {
        let email_taken = match req.email.as_ref().and_then(Value::as_str).map(normalize_email) {
            Some(email) if is_valid_email(&email) => {
                self.users.find_by_email(&email).await?.is_some()
            }
            _ => false,
        };

        let valid = match validate_registration(req) {
            Ok(v) if !email_taken => v,
            Ok(v) => {
                warn!(email = %v.email, "email already registered");
                return Err(email_taken_error());
            }
            Err(mut errors) => {
                if email_taken {
                    errors.add("email", EMAIL_TAKEN);
                }
                warn!(?errors, "registration rejected");
                return Err(AppError::Validation(errors));
            }
        };

        let password_hash = hash_password(&valid.password)?;
        let user = self
            .users
            .create(NewUser {
                name: valid.name,
                email: valid.email,
                password_hash,
                role: Role::Student,
            })
            .await
            .map_err(|e| match e {
                CreateUserError::EmailTaken => {
                    warn!("email claimed by a concurrent registration");
                    email_taken_error()
                }
                CreateUserError::Other(e) => AppError::Internal(e),
            })?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Check an email/password pair and issue a token for the matching live user.
    #[instrument(skip_all)]
    pub async fn login(&self, req: &LoginRequest) -> AppResult<(User, IssuedToken)> {
        let email = req.email.as_ref().and_then(Value::as_str).map(normalize_email);
        let password = req.password.as_ref().and_then(Value::as_str);
        let (Some(email), Some(password)) = (email, password) else {
            warn!("login with missing credentials");
            return Err(AppError::InvalidCredentials);
        };

        let Some(user) = self.users.find_by_email(&email).await? else {
            warn!(email = %email, "login unknown email");
            return Err(AppError::InvalidCredentials);
        };

        if !verify_password(password, &user.password_hash)? {
            warn!(email = %email, user_id = %user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        let token = self.keys.issue(&user)?;
        info!(user_id = %user.id, email = %user.email, admin = user.is_admin(), "user logged in");
        Ok((user, token))
    }

    /// Resolve a bearer token to the live user it was issued for.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, token: &str) -> AppResult<(User, Claims)> {
        let claims = self.keys.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            AppError::Unauthenticated
        })?;
        let user = self.live_subject(&claims).await?;
        Ok((user, claims))
    }

    /// Exchange a still-valid (or grace-window) token for a new one. The old
    /// token is left untouched.
    #[instrument(skip_all)]
    pub async fn refresh(&self, token: &str) -> AppResult<IssuedToken> {
        let claims = self.keys.verify_for_refresh(token).map_err(|e| {
            warn!(error = %e, "refresh with unusable token");
            AppError::Unauthenticated
        })?;
        let user = self.live_subject(&claims).await?;

        let issued = self.keys.issue_after(&user, Some(claims.exp))?;
        info!(user_id = %user.id, "token refreshed");
        Ok(issued)
    }

    /// Tokens are stateless, so there is nothing to revoke; the client drops
    /// its copy and the token lapses at `exp`.
    pub fn logout(&self, user: &User, claims: &Claims) {
        info!(user_id = %user.id, jti = %claims.jti, exp = claims.exp, "user logged out");
    }

    async fn live_subject(&self, claims: &Claims) -> AppResult<User> {
        self.users.find_by_id(claims.sub).await?.ok_or_else(|| {
            warn!(user_id = %claims.sub, "token subject no longer exists");
            AppError::Unauthenticated
        })
    }
}

fn email_taken_error() -> AppError {
    let mut errors = ValidationErrors::default();
    errors.add("email", EMAIL_TAKEN);
    AppError::Validation(errors)
}
