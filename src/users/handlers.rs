use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    state::AppState,
    users::{
        dto::{AuthResponse, LoginRequest, RegisterRequest},
        error::UserError,
        model::User,
        services::{authenticate, create_user, LoginGrant},
        token::AuthUser,
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me)).route(
        "/me/favourites/:property_id",
        put(add_favourite).delete(remove_favourite),
    )
}

fn http(e: UserError) -> (StatusCode, String) {
    e.into_http()
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), (StatusCode, String)> {
    let user = create_user(state.users.as_ref(), payload.into(), state.config.bcrypt_cost)
        .await
        .map_err(http)?;
    let token = user.generate_auth_token(&state.keys).await.map_err(http)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    match authenticate(
        state.users.as_ref(),
        &state.keys,
        &payload.email,
        &payload.password,
    )
    .await
    .map_err(http)?
    {
        Some(LoginGrant { user, token }) => Ok(Json(AuthResponse { token, user })),
        None => Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into())),
    }
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<User>, (StatusCode, String)> {
    let user = state
        .users
        .find_by_id(user_id)
        .await
        .map_err(http)?
        .ok_or_else(|| http(UserError::NotFound))?;
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn add_favourite(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(property_id): Path<Uuid>,
) -> Result<Json<User>, (StatusCode, String)> {
    let user = state
        .users
        .add_favourite(user_id, property_id)
        .await
        .map_err(http)?;
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn remove_favourite(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(property_id): Path<Uuid>,
) -> Result<Json<User>, (StatusCode, String)> {
    let user = state
        .users
        .remove_favourite(user_id, property_id)
        .await
        .map_err(http)?;
    Ok(Json(user))
}
