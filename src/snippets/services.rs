use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{CreateSnippetRequest, ListQuery, PublicListQuery, UpdateSnippetRequest},
    repo::SnippetStore,
    repo_types::{
        NewSnippet, Page, PageRequest, Snippet, SnippetFilter, SnippetPatch, Visibility,
    },
    slug,
};
use crate::{auth::Identity, db::StoreError, error::AppError, state::AppState};

const MAX_TITLE: usize = 200;
const MAX_DESCRIPTION: usize = 500;
const MAX_LANGUAGE: usize = 50;
const MAX_TAG: usize = 20;
const MAX_TAGS: usize = 20;
const MAX_EXPIRY_DAYS: i64 = 365;
const DEFAULT_LANGUAGE: &str = "plaintext";

fn store_err(e: StoreError) -> AppError {
    AppError::Internal(e.into())
}

fn too_long(field: &str, max: usize, value: &str) -> Option<String> {
    (value.chars().count() > max).then(|| format!("{field} must be at most {max} characters"))
}

/// Trim tags, drop blanks, keep order.
fn clean_tags(tags: Vec<String>, errors: &mut Vec<String>) -> Vec<String> {
    let tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if tags.len() > MAX_TAGS {
        errors.push(format!("at most {MAX_TAGS} tags are allowed"));
    }
    for tag in &tags {
        errors.extend(too_long("tag", MAX_TAG, tag));
    }
    tags
}

fn pick_visibility(visibility: Option<Visibility>, is_public: Option<bool>) -> Option<Visibility> {
    visibility.or(is_public.map(Visibility::from_is_public))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Validated create input, everything but the slug.
struct Draft {
    title: Option<String>,
    description: String,
    code: String,
    language: String,
    tags: Vec<String>,
    visibility: Visibility,
    favorite: bool,
    expires_in_days: Option<i64>,
}

fn validate_create(req: CreateSnippetRequest) -> Result<Draft, AppError> {
    let mut errors = Vec::new();

    let title = non_blank(req.title);
    if let Some(t) = &title {
        errors.extend(too_long("title", MAX_TITLE, t));
    }
    let description = req.description.unwrap_or_default();
    errors.extend(too_long("description", MAX_DESCRIPTION, &description));
    let code = req.code.unwrap_or_default();
    if code.trim().is_empty() {
        errors.push("code is required".to_string());
    }
    let language = non_blank(req.language).unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
    errors.extend(too_long("language", MAX_LANGUAGE, &language));
    let tags = clean_tags(req.tags.unwrap_or_default(), &mut errors);
    if let Some(days) = req.expires_in_days {
        if !(1..=MAX_EXPIRY_DAYS).contains(&days) {
            errors.push(format!("expiresInDays must be between 1 and {MAX_EXPIRY_DAYS}"));
        }
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }
    Ok(Draft {
        title,
        description,
        code,
        language,
        tags,
        visibility: pick_visibility(req.visibility, req.is_public).unwrap_or(Visibility::Private),
        favorite: req.favorite.unwrap_or(false),
        expires_in_days: req.expires_in_days,
    })
}

fn validate_update(req: UpdateSnippetRequest) -> Result<SnippetPatch, AppError> {
    let mut errors = Vec::new();

    if let Some(t) = &req.title {
        errors.extend(too_long("title", MAX_TITLE, t.trim()));
    }
    if let Some(d) = &req.description {
        errors.extend(too_long("description", MAX_DESCRIPTION, d));
    }
    if req.code.as_deref().is_some_and(|c| c.trim().is_empty()) {
        errors.push("code must not be empty".to_string());
    }
    if let Some(l) = &req.language {
        if l.trim().is_empty() {
            errors.push("language must not be empty".to_string());
        }
        errors.extend(too_long("language", MAX_LANGUAGE, l.trim()));
    }
    let tags = req.tags.map(|tags| clean_tags(tags, &mut errors));

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }
    Ok(SnippetPatch {
        // A blank title clears it.
        title: req.title.map(|t| non_blank(Some(t))),
        description: req.description,
        code: req.code,
        language: req.language.map(|l| l.trim().to_string()),
        tags,
        visibility: pick_visibility(req.visibility, req.is_public),
        favorite: req.favorite,
    })
}

/// Insert `new`, retrying exactly once with a longer suffix if its slug is taken.
pub(crate) async fn insert_with_slug_retry(
    store: &dyn SnippetStore,
    mut new: NewSnippet,
    mut make_slug: impl FnMut(usize) -> String,
) -> Result<Snippet, AppError> {
    new.slug = make_slug(slug::SUFFIX_LEN);
    match store.insert(new.clone()).await {
        Ok(s) => return Ok(s),
        Err(StoreError::DuplicateSlug) => warn!(slug = %new.slug, "slug collision, retrying once"),
        Err(e) => return Err(store_err(e)),
    }

    new.slug = make_slug(slug::RETRY_SUFFIX_LEN);
    match store.insert(new).await {
        Ok(s) => Ok(s),
        Err(StoreError::DuplicateSlug) => {
            Err(AppError::Conflict("Could not allocate a unique slug".into()))
        }
        Err(e) => Err(store_err(e)),
    }
}

pub async fn create(
    st: &AppState,
    owner: Option<&Identity>,
    req: CreateSnippetRequest,
) -> Result<Snippet, AppError> {
    let draft = validate_create(req)?;
    let now = st.clock.now();
    let title = draft.title.clone();
    let new = NewSnippet {
        slug: String::new(),
        owner_id: owner.map(|o| o.id),
        title: draft.title,
        description: draft.description,
        code: draft.code,
        language: draft.language,
        tags: draft.tags,
        visibility: draft.visibility,
        favorite: draft.favorite,
        expires_at: draft.expires_in_days.map(|d| now + Duration::days(d)),
        created_at: now,
    };
    let snippet = insert_with_slug_retry(st.snippets.as_ref(), new, |len| {
        slug::generate(title.as_deref(), len)
    })
    .await?;
    info!(snippet_id = %snippet.id, slug = %snippet.slug, "snippet created");
    Ok(snippet)
}

/// Identifiers are either the UUID or the slug.
async fn lookup(st: &AppState, ident: &str, now: OffsetDateTime) -> Result<Option<Snippet>, AppError> {
    let found = match Uuid::parse_str(ident) {
        Ok(id) => st.snippets.find_by_id(id, now).await,
        Err(_) if slug::is_well_formed(ident) => st.snippets.find_by_slug(ident, now).await,
        Err(_) => return Ok(None),
    };
    found.map_err(store_err)
}

/// Private records of other users look exactly like missing ones.
fn ensure_owner(s: &Snippet, user: &Identity) -> Result<(), AppError> {
    if s.is_owned_by(user.id) {
        Ok(())
    } else if s.visibility == Visibility::Private {
        Err(AppError::not_found())
    } else {
        Err(AppError::Forbidden("You do not own this snippet".into()))
    }
}

async fn count_view(st: &AppState, s: Snippet, now: OffsetDateTime) -> Result<Snippet, AppError> {
    if s.visibility == Visibility::Private {
        return Ok(s);
    }
    st.snippets
        .increment_views(s.id, now)
        .await
        .map_err(store_err)?
        .ok_or_else(AppError::not_found)
}

/// Read by an authenticated user: owners see everything, others only non-private.
pub async fn get(st: &AppState, viewer: &Identity, ident: &str) -> Result<Snippet, AppError> {
    let now = st.clock.now();
    let s = lookup(st, ident, now).await?.ok_or_else(AppError::not_found)?;
    if s.visibility == Visibility::Private && !s.is_owned_by(viewer.id) {
        return Err(AppError::not_found());
    }
    count_view(st, s, now).await
}

/// Read through a share link; identity plays no part.
pub async fn get_shared(st: &AppState, ident: &str) -> Result<Snippet, AppError> {
    let now = st.clock.now();
    let s = lookup(st, ident, now)
        .await?
        .filter(|s| s.visibility != Visibility::Private)
        .ok_or_else(AppError::not_found)?;
    count_view(st, s, now).await
}

pub async fn raw(st: &AppState, ident: &str) -> Result<String, AppError> {
    let now = st.clock.now();
    lookup(st, ident, now)
        .await?
        .filter(|s| s.visibility != Visibility::Private)
        .map(|s| s.code)
        .ok_or_else(AppError::not_found)
}

fn split_tags(tags: Option<&str>) -> Vec<String> {
    tags.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn list_mine(st: &AppState, owner: &Identity, q: ListQuery) -> Result<Page<Snippet>, AppError> {
    let filter = SnippetFilter {
        owner_id: Some(owner.id),
        visibility: None,
        search: non_blank(q.search),
        language: non_blank(q.language),
        tags: split_tags(q.tags.as_deref()),
        favorite: match q.favorite.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(v) => Some(v.eq_ignore_ascii_case("true")),
        },
    };
    st.snippets
        .list(&filter, PageRequest::new(q.page, q.limit), st.clock.now())
        .await
        .map_err(store_err)
}

pub async fn list_public(st: &AppState, q: PublicListQuery) -> Result<Page<Snippet>, AppError> {
    let filter = SnippetFilter {
        visibility: Some(Visibility::Public),
        language: non_blank(q.language),
        ..Default::default()
    };
    st.snippets
        .list(&filter, PageRequest::new(q.page, q.limit), st.clock.now())
        .await
        .map_err(store_err)
}

/// Partial update, last write wins.
pub async fn update(
    st: &AppState,
    owner: &Identity,
    ident: &str,
    req: UpdateSnippetRequest,
) -> Result<Snippet, AppError> {
    let patch = validate_update(req)?;
    let now = st.clock.now();
    let s = lookup(st, ident, now).await?.ok_or_else(AppError::not_found)?;
    ensure_owner(&s, owner)?;
    let updated = st
        .snippets
        .update(s.id, &patch, now)
        .await
        .map_err(store_err)?
        .ok_or_else(AppError::not_found)?;
    info!(snippet_id = %updated.id, "snippet updated");
    Ok(updated)
}

pub async fn delete(st: &AppState, owner: &Identity, ident: &str) -> Result<(), AppError> {
    let now = st.clock.now();
    let s = lookup(st, ident, now).await?.ok_or_else(AppError::not_found)?;
    ensure_owner(&s, owner)?;
    if !st.snippets.delete(s.id, now).await.map_err(store_err)? {
        return Err(AppError::not_found());
    }
    info!(snippet_id = %s.id, "snippet deleted");
    Ok(())
}

pub async fn toggle_favorite(st: &AppState, owner: &Identity, ident: &str) -> Result<Snippet, AppError> {
    let now = st.clock.now();
    let s = lookup(st, ident, now).await?.ok_or_else(AppError::not_found)?;
    ensure_owner(&s, owner)?;
    st.snippets
        .toggle_favorite(s.id, now)
        .await
        .map_err(store_err)?
        .ok_or_else(AppError::not_found)
}
