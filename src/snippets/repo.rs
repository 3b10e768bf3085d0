use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{NewSnippet, Page, PageRequest, Snippet, SnippetFilter, SnippetPatch};
use crate::db::{like_pattern, StoreError};

/// Persistence for snippets. Reads never return a record whose expiry has
/// passed at `now`.
#[async_trait]
pub trait SnippetStore: Send + Sync {
    /// Insert; a taken slug yields `StoreError::DuplicateSlug`.
    async fn insert(&self, new: NewSnippet) -> Result<Snippet, StoreError>;
    async fn find_by_id(&self, id: Uuid, now: OffsetDateTime) -> Result<Option<Snippet>, StoreError>;
    async fn find_by_slug(&self, slug: &str, now: OffsetDateTime) -> Result<Option<Snippet>, StoreError>;
    /// Newest first, ties broken by ID.
    async fn list(
        &self,
        filter: &SnippetFilter,
        page: PageRequest,
        now: OffsetDateTime,
    ) -> Result<Page<Snippet>, StoreError>;
    async fn update(
        &self,
        id: Uuid,
        patch: &SnippetPatch,
        now: OffsetDateTime,
    ) -> Result<Option<Snippet>, StoreError>;
    async fn increment_views(&self, id: Uuid, now: OffsetDateTime) -> Result<Option<Snippet>, StoreError>;
    async fn toggle_favorite(&self, id: Uuid, now: OffsetDateTime) -> Result<Option<Snippet>, StoreError>;
    /// Returns whether a live record was removed.
    async fn delete(&self, id: Uuid, now: OffsetDateTime) -> Result<bool, StoreError>;
    /// Physically remove expired records; returns how many went.
    async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, StoreError>;
}

const COLUMNS: &str = "id, slug, owner_id, title, description, code, language, tags, visibility, \
                       favorite, views, forks, expires_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgSnippetStore {
    db: PgPool,
}

impl PgSnippetStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &SnippetFilter, now: OffsetDateTime) {
    qb.push(" WHERE (expires_at IS NULL OR expires_at > ")
        .push_bind(now)
        .push(")");
    if let Some(owner_id) = filter.owner_id {
        qb.push(" AND owner_id = ").push_bind(owner_id);
    }
    if let Some(visibility) = filter.visibility {
        qb.push(" AND visibility = ").push_bind(visibility);
    }
    if let Some(term) = &filter.search {
        let pattern = like_pattern(term);
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR EXISTS (SELECT 1 FROM unnest(tags) AS t WHERE t ILIKE ")
            .push_bind(pattern)
            .push("))");
    }
    if let Some(language) = &filter.language {
        qb.push(" AND language ILIKE ").push_bind(like_pattern(language));
    }
    if !filter.tags.is_empty() {
        let patterns: Vec<String> = filter.tags.iter().map(|t| like_pattern(t)).collect();
        qb.push(" AND EXISTS (SELECT 1 FROM unnest(tags) AS t WHERE t ILIKE ANY(")
            .push_bind(patterns)
            .push("))");
    }
    if let Some(favorite) = filter.favorite {
        qb.push(" AND favorite = ").push_bind(favorite);
    }
}

#[async_trait]
impl SnippetStore for PgSnippetStore {
    async fn insert(&self, new: NewSnippet) -> Result<Snippet, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO snippets (id, slug, owner_id, title, description, code, language, tags,
                                  visibility, favorite, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING {COLUMNS}
            "#
        );
        let snippet = sqlx::query_as::<_, Snippet>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.slug)
            .bind(new.owner_id)
            .bind(&new.title)
            .bind(&new.description)
            .bind(&new.code)
            .bind(&new.language)
            .bind(&new.tags)
            .bind(new.visibility)
            .bind(new.favorite)
            .bind(new.expires_at)
            .bind(new.created_at)
            .fetch_one(&self.db)
            .await?;
        Ok(snippet)
    }

    async fn find_by_id(&self, id: Uuid, now: OffsetDateTime) -> Result<Option<Snippet>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM snippets \
             WHERE id = $1 AND (expires_at IS NULL OR expires_at > $2)"
        );
        let row = sqlx::query_as::<_, Snippet>(&sql)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn find_by_slug(&self, slug: &str, now: OffsetDateTime) -> Result<Option<Snippet>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM snippets \
             WHERE slug = $1 AND (expires_at IS NULL OR expires_at > $2)"
        );
        let row = sqlx::query_as::<_, Snippet>(&sql)
            .bind(slug)
            .bind(now)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn list(
        &self,
        filter: &SnippetFilter,
        page: PageRequest,
        now: OffsetDateTime,
    ) -> Result<Page<Snippet>, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM snippets");
        push_filters(&mut count, filter, now);
        let total: i64 = count.build_query_scalar().fetch_one(&self.db).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM snippets"));
        push_filters(&mut select, filter, now);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit as i64)
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = select
            .build_query_as::<Snippet>()
            .fetch_all(&self.db)
            .await?;

        Ok(Page {
            items,
            total: total.max(0) as u64,
            request: page,
        })
    }

    async fn update(
        &self,
        id: Uuid,
        patch: &SnippetPatch,
        now: OffsetDateTime,
    ) -> Result<Option<Snippet>, StoreError> {
        let sql = format!(
            r#"
            UPDATE snippets SET
                title       = CASE WHEN $10 THEN $2 ELSE title END,
                description = COALESCE($3, description),
                code        = COALESCE($4, code),
                language    = COALESCE($5, language),
                tags        = COALESCE($6, tags),
                visibility  = COALESCE($7, visibility),
                favorite    = COALESCE($8, favorite),
                updated_at  = $9
            WHERE id = $1 AND (expires_at IS NULL OR expires_at > $9)
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Snippet>(&sql)
            .bind(id)
            .bind(patch.title.clone().flatten())
            .bind(&patch.description)
            .bind(&patch.code)
            .bind(&patch.language)
            .bind(&patch.tags)
            .bind(patch.visibility)
            .bind(patch.favorite)
            .bind(now)
            .bind(patch.title.is_some())
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn increment_views(&self, id: Uuid, now: OffsetDateTime) -> Result<Option<Snippet>, StoreError> {
        let sql = format!(
            "UPDATE snippets SET views = views + 1 \
             WHERE id = $1 AND (expires_at IS NULL OR expires_at > $2) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, Snippet>(&sql)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn toggle_favorite(&self, id: Uuid, now: OffsetDateTime) -> Result<Option<Snippet>, StoreError> {
        let sql = format!(
            "UPDATE snippets SET favorite = NOT favorite, updated_at = $2 \
             WHERE id = $1 AND (expires_at IS NULL OR expires_at > $2) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, Snippet>(&sql)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn delete(&self, id: Uuid, now: OffsetDateTime) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "DELETE FROM snippets WHERE id = $1 AND (expires_at IS NULL OR expires_at > $2)",
        )
        .bind(id)
        .bind(now)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM snippets WHERE expires_at IS NOT NULL AND expires_at <= $1")
            .bind(now)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected())
    }
}
