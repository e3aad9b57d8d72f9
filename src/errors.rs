//! Leaf error type definitions

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("network error: {0}")]
/// The request never reached the server or no response came back
pub struct NetworkError(Box<dyn std::error::Error + Send + Sync>);

impl NetworkError {
    pub fn new<E: Into<Box<dyn std::error::Error + Send + Sync>>>(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message} (status {status})")]
/// The server answered with a non-2xx status
///
/// The message is taken from the `message` field of the failure envelope.
pub struct ServerError {
    pub status: u16,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A single field constraint that failed
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Client-side validation failed before submission
///
/// These never reach the network.
pub struct ValidationError {
    fields: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            fields: vec![FieldError {
                field,
                message: message.into(),
            }],
        }
    }

    pub(crate) fn from_fields(fields: Vec<FieldError>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.fields
    }

    /// Message for the given field, if it failed
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.field == field)
            .map(|f| f.message.as_str())
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed")?;
        for (i, field) in self.fields.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{field}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, Error)]
#[error("mutation '{0}' already in progress")]
/// A mutation with the same identity is still pending
pub struct ConflictError(pub String);

#[derive(Debug, Error)]
#[error("serialization error: {0}")]
/// An error happened while serializing or deserializing a payload
pub struct SerializationError(#[from] serde_json::Error);

#[derive(Debug, Error)]
#[error("internal error, this may be a bug: {0:?}")]
/// Some unexpected error happened in the client
///
/// These errors should not happen, unless there is a bug in the implementation.
pub struct InternalError(#[from] anyhow::Error);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_lists_every_failed_field() {
        let err = ValidationError::from_fields(vec![
            FieldError {
                field: "description",
                message: "Description is required".into(),
            },
            FieldError {
                field: "category",
                message: "Category is required".into(),
            },
        ]);

        assert_eq!(
            err.to_string(),
            "validation failed: description: Description is required; category: Category is required"
        );
        assert_eq!(err.get("category"), Some("Category is required"));
        assert_eq!(err.get("image"), None);
    }

    #[test]
    fn it_shows_the_server_message() {
        let err = ServerError {
            status: 409,
            message: "Category already exists".into(),
        };
        assert_eq!(err.to_string(), "Category already exists (status 409)");
    }
}
