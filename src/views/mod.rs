//! View controllers
//!
//! A view controller owns the interaction state of one screen (filters, page,
//! form values...) and derives from it the query keys the screen reads. It
//! never writes into the cache: data only changes through the query runner,
//! either because the controller fetched a new key or because a mutation
//! invalidated one it observes.
//!
//! Controllers are created from a [`Client`](crate::Client), and keep their
//! keys observed for as long as they live.

mod dashboard;
mod detail;
mod form;
mod list;
mod notifications;

pub use dashboard::{AccountSummary, Stats};
pub use detail::PostDetails;
pub use form::Form;
pub use list::{FilterState, PostList};
pub use notifications::Notifications;
