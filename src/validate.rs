//! Client-side form validation
//!
//! Inputs are checked before they are submitted. A failing check produces a
//! [`ValidationError`] listing every field at fault, and nothing is sent.

use crate::errors::{FieldError, ValidationError};
use crate::model::{
    CategoryInput, CommentInput, Credentials, PostInput, ProfilePicture, Registration, Upload,
};

/// Largest accepted image upload (1 MiB)
pub const MAX_IMAGE_BYTES: usize = 1_048_576;

/// Accepted image content types
pub const IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

#[derive(Default)]
struct Rules(Vec<FieldError>);

impl Rules {
    fn fail(&mut self, field: &'static str, message: &str) {
        // first failure per field wins
        if self.0.iter().all(|f| f.field != field) {
            self.0.push(FieldError {
                field,
                message: message.to_string(),
            });
        }
    }

    fn required(mut self, field: &'static str, value: &str, message: &str) -> Self {
        if value.trim().is_empty() {
            self.fail(field, message);
        }
        self
    }

    fn email(mut self, field: &'static str, value: &str) -> Self {
        if !value.trim().is_empty() && !is_email(value.trim()) {
            self.fail(field, "Enter valid email");
        }
        self
    }

    fn image(mut self, field: &'static str, value: Option<&Upload>) -> Self {
        match value {
            None => self.fail(field, "Image is required"),
            Some(upload) if upload.bytes.len() > MAX_IMAGE_BYTES => {
                self.fail(field, "File size exceeds 1MB")
            }
            Some(upload) if !IMAGE_TYPES.contains(&upload.content_type.as_str()) => {
                self.fail(field, "Invalid file type")
            }
            Some(_) => {}
        }
        self
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::from_fields(self.0))
        }
    }
}

fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.contains(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(name, tld)| !name.is_empty() && !tld.is_empty())
}

impl Validate for PostInput {
    fn validate(&self) -> Result<(), ValidationError> {
        Rules::default()
            .required("description", &self.description, "Description is required")
            .required("category", &self.category, "Category is required")
            .image("image", self.image.as_ref())
            .finish()
    }
}

impl Validate for CategoryInput {
    fn validate(&self) -> Result<(), ValidationError> {
        Rules::default()
            .required("categoryName", &self.category_name, "Category name is required")
            .finish()
    }
}

impl Validate for CommentInput {
    fn validate(&self) -> Result<(), ValidationError> {
        Rules::default()
            .required("content", &self.content, "Comment content is required")
            .finish()
    }
}

impl Validate for Credentials {
    fn validate(&self) -> Result<(), ValidationError> {
        Rules::default()
            .required("username", &self.username, "Username is required")
            .required("password", &self.password, "Password is required")
            .finish()
    }
}

impl Validate for Registration {
    fn validate(&self) -> Result<(), ValidationError> {
        Rules::default()
            .required("username", &self.username, "Username is required")
            .required("email", &self.email, "Email is required")
            .email("email", &self.email)
            .required("password", &self.password, "Password is required")
            .finish()
    }
}

impl Validate for ProfilePicture {
    fn validate(&self) -> Result<(), ValidationError> {
        Rules::default().image("image", self.image.as_ref()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn png(size: usize) -> Upload {
        Upload {
            file_name: "cover.png".into(),
            content_type: "image/png".into(),
            bytes: vec![0; size],
        }
    }

    #[test]
    fn it_requires_every_post_field() {
        let err = PostInput::default().validate().unwrap_err();
        let fields: Vec<&str> = err.fields().iter().map(|f| f.field).collect();
        assert_eq!(fields, vec!["description", "category", "image"]);
        assert_eq!(err.get("image"), Some("Image is required"));
    }

    #[test]
    fn it_treats_blank_text_as_missing() {
        let input = CommentInput {
            content: "   ".into(),
            post_id: "p1".into(),
        };
        assert_eq!(
            input.validate().unwrap_err().get("content"),
            Some("Comment content is required")
        );
    }

    #[test]
    fn it_limits_image_size_and_type() {
        let mut input = PostInput {
            description: "<p>ETF basics</p>".into(),
            category: "c1".into(),
            image: Some(png(MAX_IMAGE_BYTES + 1)),
        };
        assert_eq!(
            input.validate().unwrap_err().get("image"),
            Some("File size exceeds 1MB")
        );

        input.image = Some(Upload {
            content_type: "image/gif".into(),
            ..png(10)
        });
        assert_eq!(
            input.validate().unwrap_err().get("image"),
            Some("Invalid file type")
        );

        input.image = Some(png(MAX_IMAGE_BYTES));
        assert!(input.validate().is_ok());
    }

    #[test]
    fn it_checks_the_email_shape() {
        let mut input = Registration {
            username: "ada".into(),
            email: "ada.example.com".into(),
            password: "secret".into(),
        };
        assert_eq!(
            input.validate().unwrap_err().get("email"),
            Some("Enter valid email")
        );

        input.email = String::new();
        assert_eq!(
            input.validate().unwrap_err().get("email"),
            Some("Email is required")
        );

        input.email = "ada@example.com".into();
        assert!(input.validate().is_ok());
    }

    #[test]
    fn it_accepts_complete_forms() {
        assert!(Credentials {
            username: "ada".into(),
            password: "123456".into()
        }
        .validate()
        .is_ok());
        assert!(CategoryInput {
            category_name: "Stocks".into(),
            description: None
        }
        .validate()
        .is_ok());
        assert!(ProfilePicture {
            image: Some(png(512))
        }
        .validate()
        .is_ok());
    }
}
