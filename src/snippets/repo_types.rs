use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Access tier of a snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "snippet_visibility", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Listed and readable by anyone.
    Public,
    /// Readable by anyone holding the link, never listed.
    Unlisted,
    /// Readable by the owner only.
    Private,
}

impl Visibility {
    pub fn from_is_public(is_public: bool) -> Self {
        if is_public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

/// Snippet row in the database.
#[derive(Debug, Clone, FromRow)]
pub struct Snippet {
    pub id: Uuid,
    pub slug: String,
    pub owner_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: String,
    pub code: String,
    pub language: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub favorite: bool,
    pub views: i64,
    pub forks: i64,
    pub expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Snippet {
    #[cfg(test)]
    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == Some(user_id)
    }
}

/// Everything needed to insert a snippet; the store assigns the ID.
#[derive(Debug, Clone)]
pub struct NewSnippet {
    pub slug: String,
    pub owner_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: String,
    pub code: String,
    pub language: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub favorite: bool,
    pub expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct SnippetPatch {
    /// `Some(None)` clears the title.
    pub title: Option<Option<String>>,
    pub description: Option<String>,
    pub code: Option<String>,
    pub language: Option<String>,
    pub tags: Option<Vec<String>>,
    pub visibility: Option<Visibility>,
    pub favorite: Option<bool>,
}

/// Query filters; every text match is a case-insensitive substring match.
#[derive(Debug, Clone, Default)]
pub struct SnippetFilter {
    pub owner_id: Option<Uuid>,
    pub visibility: Option<Visibility>,
    /// Matched against title, description and each tag.
    pub search: Option<String>,
    pub language: Option<String>,
    /// A snippet matches when any of its tags contains any of these.
    pub tags: Vec<String>,
    pub favorite: Option<bool>,
}

#[cfg(test)]
impl SnippetFilter {
    /// In-process evaluation of the same predicate the SQL filters express.
    pub fn matches(&self, s: &Snippet) -> bool {
        fn contains(haystack: &str, needle: &str) -> bool {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        }

        if self.owner_id.is_some() && s.owner_id != self.owner_id {
            return false;
        }
        if self.visibility.is_some_and(|v| v != s.visibility) {
            return false;
        }
        if let Some(term) = &self.search {
            let hit = s.title.as_deref().is_some_and(|t| contains(t, term))
                || contains(&s.description, term)
                || s.tags.iter().any(|t| contains(t, term));
            if !hit {
                return false;
            }
        }
        if let Some(lang) = &self.language {
            if !contains(&s.language, lang) {
                return false;
            }
        }
        if !self.tags.is_empty()
            && !s
                .tags
                .iter()
                .any(|have| self.tags.iter().any(|want| contains(have, want)))
        {
            return false;
        }
        if self.favorite.is_some_and(|f| f != s.favorite) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Page numbers start at 1; the size is clamped to `1..=MAX_PAGE_SIZE`.
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.unwrap_or(1).clamp(1, u32::MAX as i64) as u32;
        let limit = limit
            .unwrap_or(DEFAULT_PAGE_SIZE as i64)
            .clamp(1, MAX_PAGE_SIZE as i64) as u32;
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub request: PageRequest,
}

impl<T> Page<T> {
    pub fn pages(&self) -> u64 {
        self.total.div_ceil(self.request.limit as u64)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            request: self.request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snippet {
        let now = OffsetDateTime::now_utc();
        Snippet {
            id: Uuid::new_v4(),
            slug: "hello-abc123".into(),
            owner_id: Some(Uuid::new_v4()),
            title: Some("Hello World".into()),
            description: "prints a greeting".into(),
            code: "console.log(1)".into(),
            language: "JavaScript".into(),
            tags: vec!["Intro".into(), "node".into()],
            visibility: Visibility::Public,
            favorite: false,
            views: 0,
            forks: 0,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn page_request_clamps() {
        assert_eq!(PageRequest::new(None, None), PageRequest { page: 1, limit: 10 });
        assert_eq!(PageRequest::new(Some(0), Some(0)), PageRequest { page: 1, limit: 1 });
        assert_eq!(PageRequest::new(Some(-4), Some(10_000)).limit, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(Some(3), Some(20)).offset(), 40);
    }

    #[test]
    fn pages_round_up() {
        let page = Page::<()> {
            items: vec![],
            total: 21,
            request: PageRequest::new(None, Some(10)),
        };
        assert_eq!(page.pages(), 3);
        let empty = Page::<()> { total: 0, ..page };
        assert_eq!(empty.pages(), 0);
    }

    #[test]
    fn filter_search_spans_title_description_and_tags() {
        let s = sample();
        let by = |term: &str| SnippetFilter {
            search: Some(term.into()),
            ..Default::default()
        };
        assert!(by("hello").matches(&s));
        assert!(by("GREETING").matches(&s));
        assert!(by("intr").matches(&s));
        assert!(!by("python").matches(&s));
    }

    #[test]
    fn filter_language_and_tags_are_substring_matches() {
        let s = sample();
        let lang = SnippetFilter {
            language: Some("script".into()),
            ..Default::default()
        };
        assert!(lang.matches(&s));
        let tags = SnippetFilter {
            tags: vec!["rust".into(), "NO".into()],
            ..Default::default()
        };
        assert!(tags.matches(&s));
        let miss = SnippetFilter {
            tags: vec!["rust".into()],
            ..Default::default()
        };
        assert!(!miss.matches(&s));
    }

    #[test]
    fn filter_owner_and_favorite() {
        let s = sample();
        let other = SnippetFilter {
            owner_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        assert!(!other.matches(&s));
        let fav = SnippetFilter {
            favorite: Some(true),
            ..Default::default()
        };
        assert!(!fav.matches(&s));
    }

    #[test]
    fn expiry_boundary() {
        let mut s = sample();
        let now = OffsetDateTime::now_utc();
        assert!(s.is_live_at(now));
        s.expires_at = Some(now);
        assert!(!s.is_live_at(now));
    }
}
