use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::{
    jwt::IssuedToken,
    repo_types::{Role, User},
};

pub const TOKEN_TYPE: &str = "Bearer";

/// Request body for user registration.
///
/// Fields stay untyped so validation can report "required" and "must be a
/// string" per field instead of rejecting the whole body. Anything else the
/// client sends, `role` included, is dropped.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<Value>,
    pub email: Option<Value>,
    pub password: Option<Value>,
    pub password_confirmation: Option<Value>,
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<Value>,
    pub password: Option<Value>,
}

/// Public part of the user returned by register and login.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccessToken {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

impl From<IssuedToken> for AccessToken {
    fn from(t: IssuedToken) -> Self {
        let expires_in = t.expires_in();
        Self {
            token: t.token,
            token_type: TOKEN_TYPE,
            expires_in,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub user: PublicUser,
    pub access: AccessToken,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access: AccessToken,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
