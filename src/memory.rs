//! In-process stores with the same contracts as the Postgres ones.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::repo::{NewUser, User, UserStore},
    db::StoreError,
    snippets::{
        repo::SnippetStore,
        repo_types::{NewSnippet, Page, PageRequest, Snippet, SnippetFilter, SnippetPatch},
    },
};

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == new.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            username: new.username,
            password_hash: new.password_hash,
            created_at: new.created_at,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }
}

#[derive(Default)]
pub struct MemorySnippetStore {
    snippets: Mutex<HashMap<Uuid, Snippet>>,
}

impl MemorySnippetStore {
    /// Count of stored records, expired ones included.
    pub fn len(&self) -> usize {
        self.snippets.lock().unwrap().len()
    }

    fn modify_live(
        &self,
        id: Uuid,
        now: OffsetDateTime,
        f: impl FnOnce(&mut Snippet),
    ) -> Option<Snippet> {
        let mut snippets = self.snippets.lock().unwrap();
        let s = snippets.get_mut(&id).filter(|s| s.is_live_at(now))?;
        f(s);
        Some(s.clone())
    }
}

#[async_trait]
impl SnippetStore for MemorySnippetStore {
    async fn insert(&self, new: NewSnippet) -> Result<Snippet, StoreError> {
        let mut snippets = self.snippets.lock().unwrap();
        if snippets.values().any(|s| s.slug == new.slug) {
            return Err(StoreError::DuplicateSlug);
        }
        let snippet = Snippet {
            id: Uuid::new_v4(),
            slug: new.slug,
            owner_id: new.owner_id,
            title: new.title,
            description: new.description,
            code: new.code,
            language: new.language,
            tags: new.tags,
            visibility: new.visibility,
            favorite: new.favorite,
            views: 0,
            forks: 0,
            expires_at: new.expires_at,
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        snippets.insert(snippet.id, snippet.clone());
        Ok(snippet)
    }

    async fn find_by_id(&self, id: Uuid, now: OffsetDateTime) -> Result<Option<Snippet>, StoreError> {
        let snippets = self.snippets.lock().unwrap();
        Ok(snippets.get(&id).filter(|s| s.is_live_at(now)).cloned())
    }

    async fn find_by_slug(&self, slug: &str, now: OffsetDateTime) -> Result<Option<Snippet>, StoreError> {
        let snippets = self.snippets.lock().unwrap();
        Ok(snippets
            .values()
            .find(|s| s.slug == slug && s.is_live_at(now))
            .cloned())
    }

    async fn list(
        &self,
        filter: &SnippetFilter,
        page: PageRequest,
        now: OffsetDateTime,
    ) -> Result<Page<Snippet>, StoreError> {
        let snippets = self.snippets.lock().unwrap();
        let mut hits: Vec<&Snippet> = snippets
            .values()
            .filter(|s| s.is_live_at(now) && filter.matches(s))
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = hits.len() as u64;
        let items = hits
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();
        Ok(Page {
            items,
            total,
            request: page,
        })
    }

    async fn update(
        &self,
        id: Uuid,
        patch: &SnippetPatch,
        now: OffsetDateTime,
    ) -> Result<Option<Snippet>, StoreError> {
        Ok(self.modify_live(id, now, |s| {
            if let Some(title) = &patch.title {
                s.title = title.clone();
            }
            if let Some(description) = &patch.description {
                s.description = description.clone();
            }
            if let Some(code) = &patch.code {
                s.code = code.clone();
            }
            if let Some(language) = &patch.language {
                s.language = language.clone();
            }
            if let Some(tags) = &patch.tags {
                s.tags = tags.clone();
            }
            if let Some(visibility) = patch.visibility {
                s.visibility = visibility;
            }
            if let Some(favorite) = patch.favorite {
                s.favorite = favorite;
            }
            s.updated_at = now;
        }))
    }

    async fn increment_views(&self, id: Uuid, now: OffsetDateTime) -> Result<Option<Snippet>, StoreError> {
        Ok(self.modify_live(id, now, |s| s.views += 1))
    }

    async fn toggle_favorite(&self, id: Uuid, now: OffsetDateTime) -> Result<Option<Snippet>, StoreError> {
        Ok(self.modify_live(id, now, |s| {
            s.favorite = !s.favorite;
            s.updated_at = now;
        }))
    }

    async fn delete(&self, id: Uuid, now: OffsetDateTime) -> Result<bool, StoreError> {
        let mut snippets = self.snippets.lock().unwrap();
        match snippets.get(&id) {
            Some(s) if s.is_live_at(now) => {
                snippets.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, StoreError> {
        let mut snippets = self.snippets.lock().unwrap();
        let before = snippets.len();
        snippets.retain(|_, s| s.is_live_at(now));
        Ok((before - snippets.len()) as u64)
    }
}
