use tokio::sync::Mutex;

use crate::api::{keys, Api};
use crate::cache::{Observer, QueryEntry};
use crate::error::Error;
use crate::errors::ValidationError;
use crate::key::{KeyFilter, QueryKey};
use crate::model::{CommentInput, Message, Post, PostDetail, Profile, Ref, User};
use crate::mutation::{Identities, Mutation};
use crate::query::{QueryFn, QueryRunner};
use crate::validate::Validate;

/// Controller of the post detail screen
///
/// Follows the post and the profile of the signed in user, which tells
/// whether the post author is being followed.
pub struct PostDetails {
    id: String,
    queries: QueryRunner,
    post_fn: QueryFn,
    profile_fn: QueryFn,
    observers: Mutex<Vec<Observer>>,
    like: Mutation<String, Message>,
    dislike: Mutation<String, Message>,
    comment: Mutation<CommentInput, Message>,
    follow: Mutation<String, Message>,
    unfollow: Mutation<String, Message>,
    delete: Mutation<String, Message>,
}

fn post_mutation<F, Fut>(
    id: String,
    queries: &QueryRunner,
    identities: &Identities,
    mutate: F,
) -> Mutation<String, Message>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Message, Error>> + Send + 'static,
{
    Mutation::new(id, queries.clone(), identities.clone(), mutate)
        .invalidates(|post_id: &String, _| vec![keys::post_details(post_id).into()])
}

impl PostDetails {
    pub(crate) fn new(id: &str, queries: QueryRunner, identities: Identities, api: &Api) -> Self {
        let like = {
            let api = api.clone();
            post_mutation(format!("like/{id}"), &queries, &identities, move |post| {
                let api = api.clone();
                async move { api.like_post(&post).await }
            })
        };
        let dislike = {
            let api = api.clone();
            post_mutation(format!("dislike/{id}"), &queries, &identities, move |post| {
                let api = api.clone();
                async move { api.dislike_post(&post).await }
            })
        };
        let comment = {
            let api = api.clone();
            Mutation::new(
                format!("comment/{id}"),
                queries.clone(),
                identities.clone(),
                move |input: CommentInput| {
                    let api = api.clone();
                    async move { api.create_comment(&input).await }
                },
            )
            .invalidates(|input, _| vec![keys::post_details(&input.post_id).into()])
        };
        let follow = {
            let api = api.clone();
            Mutation::new(
                "follow",
                queries.clone(),
                identities.clone(),
                move |user: String| {
                    let api = api.clone();
                    async move { api.follow(&user).await }
                },
            )
            .invalidates(|_, _| vec![keys::profile().into()])
        };
        let unfollow = {
            let api = api.clone();
            Mutation::new(
                "follow",
                queries.clone(),
                identities.clone(),
                move |user: String| {
                    let api = api.clone();
                    async move { api.unfollow(&user).await }
                },
            )
            .invalidates(|_, _| vec![keys::profile().into()])
        };
        let delete = {
            let api = api.clone();
            Mutation::new(
                format!("delete-post/{id}"),
                queries.clone(),
                identities.clone(),
                move |post: String| {
                    let api = api.clone();
                    async move { api.delete_post(&post).await }
                },
            )
            .invalidates(|_, _| {
                vec![
                    KeyFilter::family(keys::POSTS),
                    keys::categories().into(),
                    keys::profile().into(),
                ]
            })
        };

        Self {
            id: id.to_string(),
            queries,
            post_fn: api.post_details_fn(),
            profile_fn: api.profile_fn(),
            observers: Mutex::new(Vec::new()),
            like,
            dislike,
            comment,
            follow,
            unfollow,
            delete,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> QueryKey {
        keys::post_details(&self.id)
    }

    /// Load the post and the profile
    pub async fn open(&self) -> QueryEntry {
        let post_key = self.key();
        let profile_key = keys::profile();
        {
            let mut observers = self.observers.lock().await;
            if observers.is_empty() {
                let cache = self.queries.cache();
                observers.push(cache.observe(&post_key, self.post_fn.clone()).await);
                observers.push(cache.observe(&profile_key, self.profile_fn.clone()).await);
            }
        }

        let (post, _) = tokio::join!(
            self.queries.run(&post_key, &self.post_fn),
            self.queries.ensure(&profile_key, &self.profile_fn)
        );
        post
    }

    pub async fn entry(&self) -> QueryEntry {
        let key = self.key();
        self.queries
            .cache()
            .get(&key)
            .await
            .unwrap_or_else(|| QueryEntry::new(key))
    }

    pub async fn post(&self) -> Option<Post> {
        self.entry()
            .await
            .data_as::<PostDetail>()
            .ok()
            .flatten()
            .map(|detail| detail.post_found)
    }

    /// The signed in user
    pub async fn viewer(&self) -> Option<User> {
        self.queries
            .cache()
            .get(&keys::profile())
            .await
            .and_then(|entry| entry.data_as::<Profile>().ok().flatten())
            .map(|profile| profile.user)
    }

    /// Whether the signed in user follows the post author
    pub async fn is_following(&self) -> bool {
        let (Some(post), Some(viewer)) = (self.post().await, self.viewer().await) else {
            return false;
        };
        post.author
            .as_ref()
            .is_some_and(|author| viewer.is_following(author.id()))
    }

    pub async fn like(&self) -> Result<Message, Error> {
        self.like.run(self.id.clone()).await
    }

    pub async fn dislike(&self) -> Result<Message, Error> {
        self.dislike.run(self.id.clone()).await
    }

    /// Comment on the post
    pub async fn comment(&self, content: impl Into<String>) -> Result<Message, Error> {
        let input = CommentInput {
            content: content.into(),
            post_id: self.id.clone(),
        };
        input.validate()?;
        self.comment.run(input).await
    }

    pub async fn follow_author(&self) -> Result<Message, Error> {
        let author = self.author().await?;
        self.follow.run(author).await
    }

    pub async fn unfollow_author(&self) -> Result<Message, Error> {
        let author = self.author().await?;
        self.unfollow.run(author).await
    }

    /// Delete the post, refreshing every list it may appear in
    pub async fn delete(&self) -> Result<Message, Error> {
        self.delete.run(self.id.clone()).await
    }

    async fn author(&self) -> Result<String, Error> {
        self.post()
            .await
            .and_then(|post| post.author)
            .map(|author: Ref<User>| author.id().to_string())
            .ok_or_else(|| ValidationError::single("author", "Post author is not loaded").into())
    }
}
