use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{CredentialsRequest, LoginResponse, MeResponse, SignupResponse},
        extractors::AuthUser,
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/signup", post(signup))
        .route("/api/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/api/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SignupResponse>), AppError> {
    let Json(payload) = payload?;
    let email = payload.email.unwrap_or_default();
    let password = payload.password.unwrap_or_default();

    let user = state.auth.signup(&email, &password).await?;
    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User created successfully",
            user,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(payload) = payload?;
    let email = payload.email.unwrap_or_default();
    let password = payload.password.unwrap_or_default();

    let session = state.auth.login(&email, &password).await?;
    Ok(Json(LoginResponse {
        message: "Login successful",
        token: session.token,
        user: session.user,
    }))
}

#[instrument(skip(state, claims))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<MeResponse>, AppError> {
    let user = state.auth.current_user(&claims).await?;
    Ok(Json(MeResponse { user }))
}
