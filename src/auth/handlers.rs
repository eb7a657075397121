use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            LoginRequest, LoginResponse, MessageResponse, PublicUser, RefreshResponse,
            RegisterRequest, RegisterResponse,
        },
        extractors::{AuthUser, BearerToken, LenientJson},
        repo_types::User,
        services::AuthService,
    },
    error::AppResult,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

#[instrument(skip(svc, payload))]
pub async fn register(
    State(svc): State<AuthService>,
    LenientJson(payload): LenientJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let user = svc.register(&payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User created successfully",
            user: PublicUser::from(&user),
        }),
    ))
}

#[instrument(skip(svc, payload))]
pub async fn login(
    State(svc): State<AuthService>,
    LenientJson(payload): LenientJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let (user, token) = svc.login(&payload).await?;
    Ok(Json(LoginResponse {
        message: "Login successful",
        user: PublicUser::from(&user),
        access: token.into(),
    }))
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn logout(State(svc): State<AuthService>, auth: AuthUser) -> Json<MessageResponse> {
    svc.logout(&auth.user, &auth.claims);
    Json(MessageResponse {
        message: "Logout successful",
    })
}

#[instrument(skip_all)]
pub async fn refresh(
    State(svc): State<AuthService>,
    BearerToken(token): BearerToken,
) -> AppResult<Json<RefreshResponse>> {
    let issued = svc.refresh(&token).await?;
    Ok(Json(RefreshResponse {
        access: issued.into(),
    }))
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}
