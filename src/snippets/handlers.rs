use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{
        CreateSnippetRequest, Envelope, ListQuery, PublicListQuery, PublicSnippetView,
        SnippetView, UpdateSnippetRequest,
    },
    services,
};
use crate::{
    auth::{AuthUser, MaybeAuthUser},
    error::{ApiJson, ApiQuery, AppError},
    rate_limit::CreateQuota,
    state::AppState,
};

pub fn owner_routes() -> Router<AppState> {
    Router::new()
        .route("/api/snippets", get(list_mine).post(create))
        .route(
            "/api/snippets/:id",
            get(get_snippet).put(update).delete(delete),
        )
        .route("/api/snippets/:id/favorite", patch(toggle_favorite))
}

/// No identity needed or consulted.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/snippets/public/shared", get(list_public))
        .route("/api/snippets/public/shared/:id", get(get_shared))
        .route("/api/snippets/public/shared/:id/raw", get(raw))
}

#[instrument(skip(state, user, query))]
pub async fn list_mine(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<Envelope<Vec<SnippetView>>>, AppError> {
    let page = services::list_mine(&state, &user, query).await?;
    Ok(Json(Envelope::page(page.map(SnippetView::from))))
}

#[instrument(skip(state, _quota, user, payload))]
pub async fn create(
    State(state): State<AppState>,
    _quota: CreateQuota,
    MaybeAuthUser(user): MaybeAuthUser,
    ApiJson(payload): ApiJson<CreateSnippetRequest>,
) -> Result<(StatusCode, Json<Envelope<SnippetView>>), AppError> {
    if user.is_none() && !state.config.allow_anonymous_create {
        return Err(AppError::Unauthorized("No token provided".into()));
    }
    let snippet = services::create(&state, user.as_ref(), payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::data(snippet.into()).with_message("Snippet created successfully")),
    ))
}

#[instrument(skip(state, user))]
pub async fn get_snippet(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<SnippetView>>, AppError> {
    let snippet = services::get(&state, &user, &id).await?;
    Ok(Json(Envelope::data(snippet.into())))
}

#[instrument(skip(state, user, payload))]
pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdateSnippetRequest>,
) -> Result<Json<Envelope<SnippetView>>, AppError> {
    let snippet = services::update(&state, &user, &id, payload).await?;
    Ok(Json(
        Envelope::data(snippet.into()).with_message("Snippet updated successfully"),
    ))
}

#[instrument(skip(state, user))]
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<()>>, AppError> {
    services::delete(&state, &user, &id).await?;
    Ok(Json(Envelope::message("Snippet deleted successfully")))
}

#[instrument(skip(state, user))]
pub async fn toggle_favorite(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<SnippetView>>, AppError> {
    let snippet = services::toggle_favorite(&state, &user, &id).await?;
    let message = if snippet.favorite {
        "Snippet added to favorites"
    } else {
        "Snippet removed from favorites"
    };
    Ok(Json(Envelope::data(snippet.into()).with_message(message)))
}

#[instrument(skip(state, query))]
pub async fn list_public(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PublicListQuery>,
) -> Result<Json<Envelope<Vec<PublicSnippetView>>>, AppError> {
    let page = services::list_public(&state, query).await?;
    Ok(Json(Envelope::page(page.map(PublicSnippetView::from))))
}

#[instrument(skip(state))]
pub async fn get_shared(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<PublicSnippetView>>, AppError> {
    let snippet = services::get_shared(&state, &id).await?;
    Ok(Json(Envelope::data(snippet.into())))
}

#[instrument(skip(state))]
pub async fn raw(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let code = services::raw(&state, &id).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], code))
}
