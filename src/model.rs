//! Records exchanged with the REST API
//!
//! Responses are parsed into these types once, when they enter the client.
//! References to other records (a post's author, a user's followers...) may
//! come back either as a bare id or populated, see [`Ref`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Records with a server assigned id
pub trait Identified {
    fn id(&self) -> &str;
}

/// Reference to another record, either by id or populated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ref<T> {
    Id(String),
    Record(T),
}

impl<T: Identified> Ref<T> {
    pub fn id(&self) -> &str {
        match self {
            Ref::Id(id) => id,
            Ref::Record(record) => record.id(),
        }
    }

    pub fn record(&self) -> Option<&T> {
        match self {
            Ref::Id(_) => None,
            Ref::Record(record) => Some(record),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Ref<Category>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Ref<User>>,
    #[serde(default)]
    pub likes: Vec<Ref<User>>,
    #[serde(default)]
    pub dislikes: Vec<Ref<User>>,
    #[serde(default)]
    pub viewers: Vec<Ref<User>>,
    #[serde(default)]
    pub comments: Vec<Ref<Comment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Identified for Post {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(rename = "_id")]
    pub id: String,
    pub category_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub posts: Vec<Ref<Post>>,
}

impl Identified for Category {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<Image>,
    #[serde(default)]
    pub is_email_verified: bool,
    #[serde(default)]
    pub has_selected_plan: bool,
    #[serde(default)]
    pub followers: Vec<Ref<User>>,
    #[serde(default)]
    pub following: Vec<Ref<User>>,
    #[serde(default)]
    pub posts: Vec<Ref<Post>>,
}

impl Identified for User {
    fn id(&self) -> &str {
        &self.id
    }
}

impl User {
    pub fn is_following(&self, user_id: &str) -> bool {
        self.following.iter().any(|u| u.id() == user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Ref<User>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Identified for Comment {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Identified for Notification {
    fn id(&self) -> &str {
        &self.id
    }
}

/// One page of the post list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetail {
    pub post_found: Post,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryList {
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user: User,
}

/// Envelope returned by every write
///
/// Any field besides `message` (the updated record, a status flag...) is kept
/// untouched in `entity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub entity: Map<String, Value>,
}

/// File picked by the user for upload
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Fields of the create and update post forms
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostInput {
    pub description: String,
    pub category: String,
    pub image: Option<Upload>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInput {
    pub category_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentInput {
    pub content: String,
    pub post_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Profile picture form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilePicture {
    pub image: Option<Upload>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn it_parses_a_post_page() {
        let page: PostPage = serde_json::from_value(json!({
            "posts": [{
                "_id": "p1",
                "description": "<p>Index funds</p>",
                "image": {"path": "https://cdn.example.com/p1.png"},
                "category": {"_id": "c1", "categoryName": "Investing"},
                "author": "u1",
                "likes": ["u2", "u3"],
                "dislikes": [],
                "viewers": ["u2"],
                "comments": [],
                "createdAt": "2024-05-01T10:00:00.000Z"
            }],
            "totalPages": 3
        }))
        .unwrap();

        assert_eq!(page.total_pages, 3);
        let post = &page.posts[0];
        assert_eq!(post.author.as_ref().map(Ref::id), Some("u1"));
        assert_eq!(
            post.category
                .as_ref()
                .and_then(Ref::record)
                .map(|c| c.category_name.as_str()),
            Some("Investing")
        );
        assert_eq!(post.likes.len(), 2);
        assert!(post.created_at.is_some());
    }

    #[test]
    fn it_resolves_follows_by_id_or_record() {
        let profile: Profile = serde_json::from_value(json!({
            "user": {
                "_id": "u1",
                "username": "ada",
                "following": ["u2", {"_id": "u3", "username": "grace"}]
            }
        }))
        .unwrap();

        assert!(profile.user.is_following("u2"));
        assert!(profile.user.is_following("u3"));
        assert!(!profile.user.is_following("u4"));
        assert!(profile.user.followers.is_empty());
    }

    #[test]
    fn it_keeps_extra_fields_of_write_responses() {
        let message: Message = serde_json::from_value(json!({
            "message": "Post created successfully",
            "postCreated": {"_id": "p9"}
        }))
        .unwrap();

        assert_eq!(message.message, "Post created successfully");
        assert_eq!(message.entity.get("postCreated"), Some(&json!({"_id": "p9"})));
    }

    #[test]
    fn it_rejects_malformed_records() {
        let res = serde_json::from_value::<PostPage>(json!({"posts": "nope"}));
        assert!(res.is_err());
    }
}
