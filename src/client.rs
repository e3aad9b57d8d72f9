use std::future::Future;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::api::{keys, Api, HttpTransport, Transport};
use crate::cache::Cache;
use crate::config::Opts;
use crate::error::Error;
use crate::key::KeyFilter;
use crate::model::{
    CategoryInput, Credentials, Message, PostInput, ProfilePicture, Registration,
};
use crate::mutation::{Identities, Mutation};
use crate::query::QueryRunner;
use crate::views::{AccountSummary, Form, Notifications, PostDetails, PostList};

/// Session state of the client
///
/// Holds the cache shared by every view, the registry of pending mutation
/// identities and the API. A client starts with an empty cache; cloning it
/// gives another handle to the same session.
#[derive(Clone)]
pub struct Client {
    opts: Opts,
    api: Api,
    queries: QueryRunner,
    identities: Identities,
}

impl Client {
    /// Create a client talking HTTP to the configured API
    pub fn new(opts: Opts) -> Result<Self, Error> {
        let transport = HttpTransport::new(&opts)?;
        Ok(Self::with_transport(opts, Arc::new(transport)))
    }

    /// Create a client over any transport
    pub fn with_transport(opts: Opts, transport: Arc<dyn Transport>) -> Self {
        let cache = Cache::new(opts.get_event_capacity());
        let queries = QueryRunner::new(cache).with_stale_time(opts.get_stale_time());
        Self {
            opts,
            api: Api::new(transport),
            queries,
            identities: Identities::new(),
        }
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn queries(&self) -> &QueryRunner {
        &self.queries
    }

    pub fn cache(&self) -> &Cache {
        self.queries.cache()
    }

    /// Create a mutation sharing this session's cache and identities
    pub fn mutation<I, O, F, Fut>(&self, id: impl Into<String>, mutate: F) -> Mutation<I, O>
    where
        I: Clone + Send + 'static,
        O: Clone + Send + Sync + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, Error>> + Send + 'static,
    {
        Mutation::new(id, self.queries.clone(), self.identities.clone(), mutate)
    }

    pub fn post_list(&self) -> PostList {
        PostList::new(self.queries.clone(), &self.api, self.opts.get_page_size())
    }

    pub fn post_details(&self, id: &str) -> PostDetails {
        PostDetails::new(id, self.queries.clone(), self.identities.clone(), &self.api)
    }

    pub fn notifications(&self) -> Notifications {
        Notifications::new(self.queries.clone(), self.identities.clone(), &self.api)
    }

    pub fn account_summary(&self) -> AccountSummary {
        AccountSummary::new(self.queries.clone(), self.identities.clone(), &self.api)
    }

    /// Form creating a post
    ///
    /// A new post shows up in every post list, in its category and in the
    /// author's profile.
    pub fn create_post_form(&self) -> Form<PostInput, Message> {
        let api = self.api.clone();
        let mutation = self
            .mutation("create-post", move |input: PostInput| {
                let api = api.clone();
                async move { api.create_post(input).await }
            })
            .invalidates(|_, _| {
                vec![
                    KeyFilter::family(keys::POSTS),
                    keys::categories().into(),
                    keys::profile().into(),
                ]
            });
        Form::new(mutation)
    }

    pub fn update_post_form(&self, id: &str) -> Form<PostInput, Message> {
        let api = self.api.clone();
        let post = id.to_string();
        let detail = keys::post_details(id);
        let mutation = self
            .mutation(format!("update-post/{id}"), move |input: PostInput| {
                let api = api.clone();
                let post = post.clone();
                async move { api.update_post(&post, input).await }
            })
            .invalidates(move |_, _| vec![detail.clone().into(), KeyFilter::family(keys::POSTS)]);
        Form::new(mutation)
    }

    pub fn category_form(&self) -> Form<CategoryInput, Message> {
        let api = self.api.clone();
        let mutation = self
            .mutation("add-category", move |input: CategoryInput| {
                let api = api.clone();
                async move { api.add_category(&input).await }
            })
            .invalidates(|_, _| vec![keys::categories().into()]);
        Form::new(mutation)
    }

    pub fn login_form(&self) -> Form<Credentials, Message> {
        let api = self.api.clone();
        let mutation = self
            .mutation("login", move |input: Credentials| {
                let api = api.clone();
                async move { api.login(&input).await }
            })
            .invalidates(|_, _| vec![keys::profile().into()]);
        Form::new(mutation)
    }

    pub fn register_form(&self) -> Form<Registration, Message> {
        let api = self.api.clone();
        let mutation = self.mutation("register", move |input: Registration| {
            let api = api.clone();
            async move { api.register(&input).await }
        });
        Form::new(mutation)
    }

    pub fn profile_picture_form(&self) -> Form<ProfilePicture, Message> {
        let api = self.api.clone();
        let mutation = self
            .mutation("upload-profile-picture", move |input: ProfilePicture| {
                let api = api.clone();
                async move { api.upload_profile_picture(input).await }
            })
            .invalidates(|_, _| vec![keys::profile().into()]);
        Form::new(mutation)
    }

    /// End the session
    ///
    /// The cache is emptied once the server acknowledges, so no data of the
    /// previous user survives.
    #[instrument(skip(self), err)]
    pub async fn logout(&self) -> Result<Message, Error> {
        let message = self.api.logout().await?;
        self.cache().clear().await;
        info!("signed out");
        Ok(message)
    }
}
