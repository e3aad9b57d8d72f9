//! Typed access to the REST API
//!
//! [`Api`] turns each endpoint into a method that parses the response
//! envelope into the records of [`crate::model`]. The actual I/O goes through
//! a [`Transport`], so the same calls run over HTTP ([`HttpTransport`]) or
//! against a test double.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::Error;
use crate::errors::ServerError;
use crate::model::{
    CategoryInput, CategoryList, CommentInput, Credentials, Message, Notification, PostDetail,
    PostInput, PostPage, Profile, ProfilePicture, Registration, Upload,
};

mod http;
pub mod keys;

pub use http::HttpTransport;
pub use keys::PostQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartValue {
    Text(String),
    File(Upload),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub name: String,
    pub value: PartValue,
}

impl Part {
    pub fn text(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: PartValue::Text(value.into()),
        }
    }

    pub fn file(name: &str, upload: Upload) -> Self {
        Self {
            name: name.to_string(),
            value: PartValue::File(upload),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    Json(Value),
    Multipart(Vec<Part>),
}

/// A request relative to the API root
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Body,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn with_query(self, query: Vec<(String, String)>) -> Self {
        Self { query, ..self }
    }

    pub fn with_body(self, body: Body) -> Self {
        Self { body, ..self }
    }

    /// Value of a query parameter
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to the API
///
/// Implementations only fail with network errors; any response the server
/// sends back, whatever its status, is returned as a [`Response`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, Error>;
}

/// Typed endpoints of the social platform API
#[derive(Clone)]
pub struct Api {
    transport: Arc<dyn Transport>,
}

impl Api {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn call<T: DeserializeOwned>(&self, request: Request) -> Result<T, Error> {
        let method = request.method;
        let path = request.path.clone();
        let response = self.transport.send(request).await?;
        debug!(%method, %path, status = response.status, "response");
        decode(response)
    }

    async fn call_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let body = serde_json::to_value(body)?;
        self.call(Request::new(method, path).with_body(Body::Json(body))).await
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_posts(&self, query: &PostQuery) -> Result<PostPage, Error> {
        self.call(Request::new(Method::Get, "/posts").with_query(query.to_pairs()))
            .await
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_post(&self, id: &str) -> Result<PostDetail, Error> {
        self.call(Request::new(Method::Get, format!("/posts/{id}"))).await
    }

    #[instrument(skip_all, err)]
    pub async fn create_post(&self, input: PostInput) -> Result<Message, Error> {
        self.call(Request::new(Method::Post, "/posts/create").with_body(post_form(input)))
            .await
    }

    #[instrument(skip(self, input), err)]
    pub async fn update_post(&self, id: &str, input: PostInput) -> Result<Message, Error> {
        self.call(Request::new(Method::Put, format!("/posts/{id}")).with_body(post_form(input)))
            .await
    }

    #[instrument(skip(self), err)]
    pub async fn delete_post(&self, id: &str) -> Result<Message, Error> {
        self.call(Request::new(Method::Delete, format!("/posts/{id}"))).await
    }

    #[instrument(skip(self), err)]
    pub async fn like_post(&self, id: &str) -> Result<Message, Error> {
        self.call(Request::new(Method::Put, format!("/posts/likes/{id}"))).await
    }

    #[instrument(skip(self), err)]
    pub async fn dislike_post(&self, id: &str) -> Result<Message, Error> {
        self.call(Request::new(Method::Put, format!("/posts/dislikes/{id}"))).await
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_categories(&self) -> Result<CategoryList, Error> {
        self.call(Request::new(Method::Get, "/categories")).await
    }

    #[instrument(skip(self), err)]
    pub async fn add_category(&self, input: &CategoryInput) -> Result<Message, Error> {
        self.call_json(Method::Post, "/categories/create", input).await
    }

    #[instrument(skip(self), err)]
    pub async fn create_comment(&self, input: &CommentInput) -> Result<Message, Error> {
        self.call_json(Method::Post, "/comments/create", input).await
    }

    #[instrument(skip(self), err)]
    pub async fn profile(&self) -> Result<Profile, Error> {
        self.call(Request::new(Method::Get, "/users/profile")).await
    }

    #[instrument(skip(self), err)]
    pub async fn follow(&self, user_id: &str) -> Result<Message, Error> {
        self.call(Request::new(Method::Put, format!("/users/follow/{user_id}"))).await
    }

    #[instrument(skip(self), err)]
    pub async fn unfollow(&self, user_id: &str) -> Result<Message, Error> {
        self.call(Request::new(Method::Put, format!("/users/unfollow/{user_id}"))).await
    }

    #[instrument(skip_all, fields(username = %credentials.username), err)]
    pub async fn login(&self, credentials: &Credentials) -> Result<Message, Error> {
        self.call_json(Method::Post, "/users/login", credentials).await
    }

    #[instrument(skip_all, fields(username = %registration.username), err)]
    pub async fn register(&self, registration: &Registration) -> Result<Message, Error> {
        self.call_json(Method::Post, "/users/register", registration).await
    }

    #[instrument(skip(self), err)]
    pub async fn logout(&self) -> Result<Message, Error> {
        self.call(Request::new(Method::Post, "/users/logout")).await
    }

    #[instrument(skip_all, err)]
    pub async fn upload_profile_picture(&self, input: ProfilePicture) -> Result<Message, Error> {
        let parts = input
            .image
            .map(|image| vec![Part::file("image", image)])
            .unwrap_or_default();
        self.call(
            Request::new(Method::Put, "/users/upload-profile-picture")
                .with_body(Body::Multipart(parts)),
        )
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn send_verification_email(&self) -> Result<Message, Error> {
        self.call(Request::new(Method::Put, "/users/account-verification-email")).await
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_notifications(&self) -> Result<Vec<Notification>, Error> {
        self.call(Request::new(Method::Get, "/notifications")).await
    }

    #[instrument(skip(self), err)]
    pub async fn read_notification(&self, id: &str) -> Result<Message, Error> {
        self.call(Request::new(Method::Put, format!("/notifications/{id}"))).await
    }
}

fn post_form(input: PostInput) -> Body {
    let PostInput {
        description,
        category,
        image,
    } = input;
    let mut parts = vec![
        Part::text("description", description),
        Part::text("category", category),
    ];
    if let Some(image) = image {
        parts.push(Part::file("image", image));
    }
    Body::Multipart(parts)
}

/// Parse a response envelope
///
/// Non-2xx responses become a [`ServerError`] carrying the envelope message,
/// or the reason of the status when the envelope has none.
pub(crate) fn decode<T: DeserializeOwned>(response: Response) -> Result<T, Error> {
    if !response.is_success() {
        let message = response
            .body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| status_reason(response.status));
        return Err(ServerError {
            status: response.status,
            message,
        }
        .into());
    }

    Ok(serde_json::from_value(response.body)?)
}

fn status_reason(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| format!("request failed with status {status}"))
}
