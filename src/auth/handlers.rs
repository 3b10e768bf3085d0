use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::instrument;

use super::{
    dto::{LoginRequest, LoginResponse, MeResponse, SignupRequest, SignupResponse},
    extractors::{AuthUser, TOKEN_COOKIE},
    services,
};
use crate::{
    error::{ApiJson, AppError},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

/// Readable by the browser app, so not HttpOnly.
fn token_cookie(token: String) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .path("/")
        .http_only(false)
        .same_site(SameSite::Lax)
        .build()
}

#[instrument(skip(state, jar, payload))]
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<SignupResponse>), AppError> {
    let (user, token) = services::register(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        jar.add(token_cookie(token.clone())),
        Json(SignupResponse {
            success: true,
            message: "User signed up successfully",
            user,
            token,
        }),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let (user, token) = services::authenticate(&state, payload).await?;
    Ok((
        jar.add(token_cookie(token.clone())),
        Json(LoginResponse {
            success: true,
            message: "User logged in successfully",
            token,
            user_id: user.id,
        }),
    ))
}

#[instrument(skip_all)]
pub async fn me(AuthUser(user): AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        success: true,
        data: user,
    })
}
