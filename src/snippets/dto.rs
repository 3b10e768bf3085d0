use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Page, Snippet, Visibility};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnippetRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "content")]
    pub code: Option<String>,
    pub language: Option<String>,
    pub tags: Option<Vec<String>>,
    pub visibility: Option<Visibility>,
    /// Older clients send a boolean instead of `visibility`.
    pub is_public: Option<bool>,
    pub favorite: Option<bool>,
    pub expires_in_days: Option<i64>,
}

/// Unknown keys (`id`, `slug`, `ownerId`, timestamps...) are ignored, which
/// keeps server-managed fields out of reach.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSnippetRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "content")]
    pub code: Option<String>,
    pub language: Option<String>,
    pub tags: Option<Vec<String>>,
    pub visibility: Option<Visibility>,
    pub is_public: Option<bool>,
    pub favorite: Option<bool>,
}

/// Query string of `GET /api/snippets`. Empty values mean "no filter".
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub language: Option<String>,
    /// Comma separated.
    pub tags: Option<String>,
    /// `"true"` or `"false"`.
    pub favorite: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PublicListQuery {
    pub language: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Full record as its owner sees it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetView {
    pub id: Uuid,
    pub slug: String,
    pub owner_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: String,
    pub code: String,
    pub language: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub is_public: bool,
    pub favorite: bool,
    pub views: i64,
    pub forks: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Snippet> for SnippetView {
    fn from(s: Snippet) -> Self {
        Self {
            id: s.id,
            slug: s.slug,
            owner_id: s.owner_id,
            title: s.title,
            description: s.description,
            code: s.code,
            language: s.language,
            tags: s.tags,
            is_public: s.visibility == Visibility::Public,
            visibility: s.visibility,
            favorite: s.favorite,
            views: s.views,
            forks: s.forks,
            expires_at: s.expires_at,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// What anonymous readers see: no owner-scoped flags.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSnippetView {
    pub id: Uuid,
    pub slug: String,
    pub owner_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: String,
    pub code: String,
    pub language: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub views: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Snippet> for PublicSnippetView {
    fn from(s: Snippet) -> Self {
        Self {
            id: s.id,
            slug: s.slug,
            owner_id: s.owner_id,
            title: s.title,
            description: s.description,
            code: s.code,
            language: s.language,
            tags: s.tags,
            visibility: s.visibility,
            views: s.views,
            expires_at: s.expires_at,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub current: u32,
    pub pages: u64,
    pub total: u64,
}

/// `{success, message?, data?, pagination?}`
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T> Envelope<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            pagination: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Envelope<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            pagination: None,
        }
    }
}

impl<T> Envelope<Vec<T>> {
    pub fn page(page: Page<T>) -> Self {
        let pagination = Pagination {
            current: page.request.page,
            pages: page.pages(),
            total: page.total,
        };
        Self {
            success: true,
            message: None,
            data: Some(page.items),
            pagination: Some(pagination),
        }
    }
}
