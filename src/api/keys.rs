//! Query keys of the API reads and the functions fetching them

use serde::Serialize;

use super::Api;
use crate::error::Error;
use crate::key::QueryKey;
use crate::query::{query_fn, QueryFn};

pub const POSTS: &str = "posts";
pub const POST_DETAILS: &str = "post-details";
pub const CATEGORIES: &str = "categories";
pub const PROFILE: &str = "profile";
pub const NOTIFICATIONS: &str = "notifications";

/// Parameters of the post list read
///
/// Blank filters are left out of both the key and the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    pub category: Option<String>,
    pub title: Option<String>,
    pub page: u32,
    pub limit: u32,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl PostQuery {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            category: None,
            title: None,
            page,
            limit,
        }
    }

    pub fn key(&self) -> QueryKey {
        QueryKey::new(POSTS)
            .with_opt("category", non_blank(self.category.as_deref()))
            .with_opt("title", non_blank(self.title.as_deref()))
            .with("page", self.page)
            .with("limit", self.limit)
    }

    /// Recover the parameters from a key built by [`PostQuery::key`]
    pub fn from_key(key: &QueryKey) -> Self {
        let int = |name: &str, default: u32| {
            key.get(name)
                .and_then(|p| p.as_int())
                .and_then(|i| u32::try_from(i).ok())
                .unwrap_or(default)
        };
        Self {
            category: key.get("category").and_then(|p| p.as_str()).map(str::to_string),
            title: key.get("title").and_then(|p| p.as_str()).map(str::to_string),
            page: int("page", 1),
            limit: int("limit", 6),
        }
    }

    pub(crate) fn to_pairs(&self) -> Vec<(String, String)> {
        self.key().query_pairs()
    }
}

pub fn post_details(id: &str) -> QueryKey {
    QueryKey::new(POST_DETAILS).with("id", id)
}

pub fn categories() -> QueryKey {
    QueryKey::new(CATEGORIES)
}

pub fn profile() -> QueryKey {
    QueryKey::new(PROFILE)
}

pub fn notifications() -> QueryKey {
    QueryKey::new(NOTIFICATIONS)
}

fn to_value<T: Serialize>(value: T) -> Result<serde_json::Value, Error> {
    Ok(serde_json::to_value(value)?)
}

impl Api {
    /// Fetches pages of the post list, parameters taken from the key
    pub fn posts_fn(&self) -> QueryFn {
        let api = self.clone();
        query_fn(move |key| {
            let api = api.clone();
            async move { to_value(api.fetch_posts(&PostQuery::from_key(&key)).await?) }
        })
    }

    pub fn post_details_fn(&self) -> QueryFn {
        let api = self.clone();
        query_fn(move |key| {
            let api = api.clone();
            async move {
                let id = key
                    .get("id")
                    .map(|p| p.to_string())
                    .unwrap_or_default();
                to_value(api.fetch_post(&id).await?)
            }
        })
    }

    pub fn categories_fn(&self) -> QueryFn {
        let api = self.clone();
        query_fn(move |_| {
            let api = api.clone();
            async move { to_value(api.fetch_categories().await?) }
        })
    }

    pub fn profile_fn(&self) -> QueryFn {
        let api = self.clone();
        query_fn(move |_| {
            let api = api.clone();
            async move { to_value(api.profile().await?) }
        })
    }

    pub fn notifications_fn(&self) -> QueryFn {
        let api = self.clone();
        query_fn(move |_| {
            let api = api.clone();
            async move { to_value(api.fetch_notifications().await?) }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_keys_the_post_list_by_its_filters() {
        let query = PostQuery {
            category: Some("c1".into()),
            title: Some("  ".into()),
            page: 2,
            limit: 6,
        };
        assert_eq!(query.key().to_string(), "posts?category=c1&limit=6&page=2");
        assert_eq!(
            query.to_pairs(),
            vec![
                ("category".to_string(), "c1".to_string()),
                ("limit".to_string(), "6".to_string()),
                ("page".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn it_recovers_the_query_from_its_key() {
        let query = PostQuery {
            category: None,
            title: Some("etf".into()),
            page: 3,
            limit: 10,
        };
        assert_eq!(PostQuery::from_key(&query.key()), query);
        assert_eq!(
            PostQuery::from_key(&QueryKey::new(POSTS)),
            PostQuery::new(1, 6)
        );
    }

    #[test]
    fn it_keys_details_by_post_id() {
        assert_eq!(post_details("p1"), post_details("p1"));
        assert_ne!(post_details("p1"), post_details("p2"));
        assert_eq!(post_details("p1").to_string(), "post-details?id=p1");
    }
}
