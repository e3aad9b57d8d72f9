use tokio::sync::Mutex;

use crate::api::{keys, Api};
use crate::cache::{Observer, QueryEntry};
use crate::error::Error;
use crate::model::{Message, Profile, User};
use crate::mutation::{Identities, Mutation, MutationEntry};
use crate::query::{QueryFn, QueryRunner};

/// Totals shown on the account summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub views: usize,
    pub likes: usize,
    pub dislikes: usize,
    pub comments: usize,
    pub followers: usize,
    pub following: usize,
    pub posts: usize,
}

impl Stats {
    /// Aggregate the user's counters
    ///
    /// Interactions are only counted on posts the profile came back
    /// populated with.
    pub fn from_user(user: &User) -> Self {
        let mut stats = Stats {
            followers: user.followers.len(),
            following: user.following.len(),
            posts: user.posts.len(),
            ..Stats::default()
        };
        for post in user.posts.iter().filter_map(|p| p.record()) {
            stats.views += post.viewers.len();
            stats.likes += post.likes.len();
            stats.dislikes += post.dislikes.len();
            stats.comments += post.comments.len();
        }
        stats
    }
}

/// Controller of the account summary of the signed in user
pub struct AccountSummary {
    queries: QueryRunner,
    fetch: QueryFn,
    observer: Mutex<Option<Observer>>,
    verify: Mutation<(), Message>,
}

impl AccountSummary {
    pub(crate) fn new(queries: QueryRunner, identities: Identities, api: &Api) -> Self {
        let verify = {
            let api = api.clone();
            Mutation::new(
                "send-email-verification-token",
                queries.clone(),
                identities,
                move |_: ()| {
                    let api = api.clone();
                    async move { api.send_verification_email().await }
                },
            )
        };

        Self {
            queries,
            fetch: api.profile_fn(),
            observer: Mutex::new(None),
            verify,
        }
    }

    pub async fn open(&self) -> QueryEntry {
        let key = keys::profile();
        {
            let mut observer = self.observer.lock().await;
            if observer.is_none() {
                *observer = Some(self.queries.cache().observe(&key, self.fetch.clone()).await);
            }
        }
        self.queries.ensure(&key, &self.fetch).await
    }

    pub async fn user(&self) -> Option<User> {
        self.queries
            .cache()
            .get(&keys::profile())
            .await
            .and_then(|entry| entry.data_as::<Profile>().ok().flatten())
            .map(|profile| profile.user)
    }

    pub async fn stats(&self) -> Option<Stats> {
        self.user().await.map(|user| Stats::from_user(&user))
    }

    /// Ask for a new verification email
    pub async fn send_verification_email(&self) -> Result<Message, Error> {
        self.verify.run(()).await
    }

    pub fn verification(&self) -> MutationEntry<Message> {
        self.verify.entry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn it_sums_interactions_over_populated_posts() {
        let user: User = serde_json::from_value(json!({
            "_id": "u1",
            "username": "ada",
            "followers": ["u2", "u3"],
            "following": ["u2"],
            "posts": [
                {
                    "_id": "p1",
                    "viewers": ["u2", "u3"],
                    "likes": ["u2"],
                    "dislikes": [],
                    "comments": ["c1"]
                },
                {
                    "_id": "p2",
                    "viewers": ["u3"],
                    "likes": ["u2", "u3"],
                    "dislikes": ["u4"],
                    "comments": []
                },
                "p3"
            ]
        }))
        .unwrap();

        assert_eq!(
            Stats::from_user(&user),
            Stats {
                views: 3,
                likes: 3,
                dislikes: 1,
                comments: 1,
                followers: 2,
                following: 1,
                posts: 3,
            }
        );
    }
}
