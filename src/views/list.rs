use tokio::sync::RwLock;
use tracing::debug;

use crate::api::{keys, Api, PostQuery};
use crate::cache::{Observer, QueryEntry};
use crate::key::QueryKey;
use crate::model::{Category, CategoryList, PostPage};
use crate::query::{QueryFn, QueryRunner};

/// Filters and page of a post list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    pub category: Option<String>,
    pub title: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

impl FilterState {
    pub fn new(page_size: u32) -> Self {
        Self {
            category: None,
            title: None,
            page: 1,
            page_size,
        }
    }

    pub fn key(&self) -> QueryKey {
        self.query().key()
    }

    pub fn query(&self) -> PostQuery {
        PostQuery {
            category: self.category.clone(),
            title: self.title.clone(),
            page: self.page,
            limit: self.page_size,
        }
    }

    /// Change a filter; the page always goes back to 1
    fn refilter(&mut self, category: Option<String>, title: Option<String>) {
        self.category = category;
        self.title = title;
        self.page = 1;
    }
}

struct ListState {
    filters: FilterState,
    search_input: String,
    /// Page count of the last successful fetch for the current filters
    total_pages: Option<u32>,
    observer: Option<Observer>,
    categories: Option<Observer>,
}

/// Controller of the paginated, filterable post list
///
/// Every transition recomputes the list key from the filters and fetches
/// it. Transitions only borrow the controller, so a new one may start while
/// an earlier fetch is still pending.
pub struct PostList {
    queries: QueryRunner,
    posts: QueryFn,
    categories: QueryFn,
    state: RwLock<ListState>,
}

impl PostList {
    pub(crate) fn new(queries: QueryRunner, api: &Api, page_size: u32) -> Self {
        Self {
            queries,
            posts: api.posts_fn(),
            categories: api.categories_fn(),
            state: RwLock::new(ListState {
                filters: FilterState::new(page_size),
                search_input: String::new(),
                total_pages: None,
                observer: None,
                categories: None,
            }),
        }
    }

    /// Load the first page and the categories of the filter bar
    pub async fn open(&self) -> QueryEntry {
        let key = keys::categories();
        {
            let mut state = self.state.write().await;
            if state.categories.is_none() {
                state.categories = Some(
                    self.queries
                        .cache()
                        .observe(&key, self.categories.clone())
                        .await,
                );
            }
        }
        let (_, entry) = tokio::join!(
            self.queries.ensure(&key, &self.categories),
            self.transition(|_| true)
        );
        match entry {
            Some(entry) => entry,
            None => self.entry().await,
        }
    }

    /// Select a category, `None` shows every category
    pub async fn set_category(&self, category: Option<String>) -> QueryEntry {
        self.filter(|state| {
            let title = state.filters.title.take();
            state.filters.refilter(category, title);
        })
        .await
    }

    /// Update the search box, without fetching
    pub async fn set_search_input(&self, input: impl Into<String>) {
        self.state.write().await.search_input = input.into();
    }

    /// Search for the current content of the search box
    pub async fn submit_search(&self) -> QueryEntry {
        self.filter(|state| {
            let category = state.filters.category.take();
            let title = Some(state.search_input.clone()).filter(|t| !t.trim().is_empty());
            state.filters.refilter(category, title);
        })
        .await
    }

    /// Fill the search box and submit it
    pub async fn set_search(&self, term: impl Into<String>) -> QueryEntry {
        self.set_search_input(term).await;
        self.submit_search().await
    }

    /// Go to the page
    ///
    /// Nothing happens unless the page is within the page count of the last
    /// successful fetch.
    pub async fn set_page(&self, page: u32) -> Option<QueryEntry> {
        // an invalidation may have refreshed the page count since
        let refreshed = self.page().await.map(|p| p.total_pages);
        self.transition(|state| match refreshed.or(state.total_pages) {
            Some(total) if (1..=total).contains(&page) => {
                state.filters.page = page;
                true
            }
            _ => {
                debug!(page, "page out of range");
                false
            }
        })
        .await
    }

    pub async fn next_page(&self) -> Option<QueryEntry> {
        let page = self.state.read().await.filters.page;
        self.set_page(page.saturating_add(1)).await
    }

    pub async fn prev_page(&self) -> Option<QueryEntry> {
        let page = self.state.read().await.filters.page;
        self.set_page(page.saturating_sub(1)).await
    }

    /// Drop every filter and go back to the first page
    pub async fn clear(&self) -> QueryEntry {
        self.filter(|state| {
            state.search_input.clear();
            state.filters.refilter(None, None);
        })
        .await
    }

    pub async fn filters(&self) -> FilterState {
        self.state.read().await.filters.clone()
    }

    pub async fn search_input(&self) -> String {
        self.state.read().await.search_input.clone()
    }

    pub async fn total_pages(&self) -> Option<u32> {
        let refreshed = self.page().await.map(|p| p.total_pages);
        refreshed.or(self.state.read().await.total_pages)
    }

    /// Entry of the current filters
    pub async fn entry(&self) -> QueryEntry {
        let key = self.state.read().await.filters.key();
        self.queries
            .cache()
            .get(&key)
            .await
            .unwrap_or_else(|| QueryEntry::new(key))
    }

    /// Posts of the current page, if loaded
    ///
    /// While a refetch is pending this is the data of the previous fetch.
    pub async fn page(&self) -> Option<PostPage> {
        self.entry().await.data_as().ok().flatten()
    }

    pub async fn category_list(&self) -> Vec<Category> {
        self.queries
            .cache()
            .get(&keys::categories())
            .await
            .and_then(|entry| entry.data_as::<CategoryList>().ok().flatten())
            .map(|list| list.categories)
            .unwrap_or_default()
    }

    async fn filter<F: FnOnce(&mut ListState)>(&self, change: F) -> QueryEntry {
        let entry = self
            .transition(|state| {
                change(state);
                state.total_pages = None;
                true
            })
            .await;
        match entry {
            Some(entry) => entry,
            None => self.entry().await,
        }
    }

    /// Apply the change and fetch the resulting key
    ///
    /// Returns `None` without fetching if the change is rejected.
    async fn transition<F>(&self, change: F) -> Option<QueryEntry>
    where
        F: FnOnce(&mut ListState) -> bool,
    {
        let key = {
            let mut state = self.state.write().await;
            if !change(&mut state) {
                return None;
            }
            let key = state.filters.key();
            if state.observer.as_ref().map(Observer::key) != Some(&key) {
                // the previous key stops being observed
                state.observer = Some(self.queries.cache().observe(&key, self.posts.clone()).await);
            }
            key
        };

        debug!(key = %key, "loading post list");
        let entry = self.queries.run(&key, &self.posts).await;

        if let Ok(Some(page)) = entry.data_as::<PostPage>() {
            let mut state = self.state.write().await;
            if state.filters.key() == key {
                state.total_pages = Some(page.total_pages);
            }
        }
        Some(entry)
    }
}
