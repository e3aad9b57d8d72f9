#![cfg_attr(docsrs, feature(doc_cfg))]
//! remora keeps the screens of the social platform client in sync with its REST API.
//!
//! Reads and writes go through a small set of components sharing one cache:
//!
//! - the [Cache](`cache::Cache`) stores one [QueryEntry](`cache::QueryEntry`) per
//!   [QueryKey](`key::QueryKey`), and notifies watchers of every change;
//! - the [QueryRunner](`query::QueryRunner`) fetches keys into the cache, de-duplicating
//!   concurrent fetches and dropping responses that arrive out of order;
//! - a [Mutation](`mutation::Mutation`) runs a write and, once it succeeds, invalidates the
//!   keys depending on it so observing views refetch them;
//! - view controllers ([views]) own the interaction state of a screen (filters, page, form
//!   values) and derive the keys to read from it.
//!
//! For more detailed logging, the library uses the [tracing crate](https://crates.io/crates/tracing).
//!
//! # Client
//!
//! A [Client] is the session: it creates the view controllers and forms, all sharing its
//! cache.
//!
//! ```rust,no_run
//! use remora::{Client, Opts};
//!
//! # tokio_test::block_on(async {
//! let client = Client::new(Opts::default().base_url("http://localhost:5000/api/v1")).unwrap();
//!
//! let list = client.post_list();
//! list.open().await;
//!
//! // filters always go back to the first page
//! list.set_category(Some("64f0c2".to_string())).await;
//! list.set_page(2).await;
//!
//! if let Some(page) = list.page().await {
//!     println!("{} posts, {} pages", page.posts.len(), page.total_pages);
//! }
//! # })
//! ```
//!
//! # Queries
//!
//! A query is identified by a key: a resource name plus parameters. Parameters are compared
//! regardless of the order they were given in.
//!
//! ```rust
//! use remora::QueryKey;
//!
//! let a = QueryKey::new("posts").with("page", 1u32).with("limit", 6u32);
//! let b = QueryKey::new("posts").with("limit", 6u32).with("page", 1u32);
//! assert_eq!(a, b);
//! ```
//!
//! Running a key updates its entry to `Loading`, then `Success` or `Error`. A failed
//! refetch keeps the data of the previous success visible.
//!
//! ```rust
//! use remora::{query_fn, Cache, QueryKey, QueryRunner, QueryStatus};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let runner = QueryRunner::new(Cache::default());
//! let fetch = query_fn(|key: QueryKey| async move { Ok(json!({"resource": key.resource()})) });
//!
//! let entry = runner.run(&QueryKey::new("categories"), &fetch).await;
//! assert_eq!(entry.status, QueryStatus::Success);
//! assert_eq!(entry.data, Some(json!({"resource": "categories"})));
//! # })
//! ```
//!
//! # Mutations
//!
//! Mutations never write into the cache. They declare which keys depend on them, and those
//! keys are invalidated after the write succeeds. Only one mutation per identity may run at a
//! time, a second call while the first is pending fails with
//! [ErrorKind::Conflict](`error::ErrorKind::Conflict`).
//!
//! ```rust
//! use remora::{Cache, Identities, KeyFilter, Mutation, QueryRunner};
//!
//! # tokio_test::block_on(async {
//! let runner = QueryRunner::new(Cache::default());
//! let create = Mutation::new(
//!     "create-post",
//!     runner.clone(),
//!     Identities::new(),
//!     |title: String| async move { Ok(format!("created {title}")) },
//! )
//! .invalidates(|_, _| vec![KeyFilter::family("posts")]);
//!
//! assert_eq!(create.run("ETFs".to_string()).await.unwrap(), "created ETFs");
//! # })
//! ```

pub mod api;
pub mod cache;
pub mod error;
pub mod errors;
pub mod key;
pub mod model;
pub mod mutation;
pub mod query;
pub mod validate;
pub mod views;

mod client;
mod config;

#[cfg(debug_assertions)]
pub mod testing;

pub use cache::{Cache, CacheEvent, Observer, QueryEntry, QueryStatus};
pub use client::Client;
pub use config::Opts;
pub use error::{Error, ErrorKind};
pub use key::{KeyFilter, Param, QueryKey};
pub use mutation::{Identities, Mutation, MutationEntry, MutationStatus};
pub use query::{query_fn, QueryFn, QueryRunner};
pub use validate::Validate;
