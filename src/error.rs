use std::fmt;
use std::sync::Arc;

use crate::errors::{
    ConflictError, InternalError, NetworkError, SerializationError, ServerError, ValidationError,
};

#[doc(hidden)]
type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// A list specifying categories of client errors
///
/// used with the [`Error`] type
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request never reached the server or no response came back
    Network,
    /// A client-side field constraint failed before submission
    Validation,
    /// The server answered with a non-2xx status
    Server,
    /// A mutation with the same identity is already pending
    Conflict,
    /// A payload could not be serialized or parsed into the expected record
    Serialization,
    /// An internal error happened, this is probably a bug
    Internal,
}

impl ErrorKind {
    pub(crate) fn as_str(&self) -> &'static str {
        use ErrorKind::*;
        match *self {
            Network => "network error",
            Validation => "validation failed",
            Server => "server error",
            Conflict => "mutation already in progress",
            Serialization => "serialization failed",
            Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    /// Shows a human-readable description of the `ErrorKind`.
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

/// Error stored in query and mutation entries
///
/// The source is reference counted so the same error can be handed to every
/// caller awaiting a shared fetch.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    error: Option<SharedError>,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    /// Shows a human-readable description of the `Error`.
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = self.error.as_ref() {
            write!(fmt, "{source}")
        } else {
            write!(fmt, "{}", self.kind.as_str())
        }
    }
}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(kind: ErrorKind, error: E) -> Self {
        Self {
            kind,
            error: Some(Arc::new(error)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn source(&self) -> Option<&SharedError> {
        self.error.as_ref()
    }

    /// Downcast the source to a concrete leaf error
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.error.as_ref().and_then(|e| e.downcast_ref::<E>())
    }

    /// Text a view can show to the user
    ///
    /// For server errors this is the message sent by the API.
    pub fn message(&self) -> String {
        match self.downcast_ref::<ServerError>() {
            Some(err) => err.message.clone(),
            None => self.to_string(),
        }
    }

    pub fn internal<E: Into<anyhow::Error>>(error: E) -> Self {
        InternalError::from(error.into()).into()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error { kind, error: None }
    }
}

impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::new(ErrorKind::Network, e)
    }
}

impl From<ServerError> for Error {
    fn from(e: ServerError) -> Self {
        Error::new(ErrorKind::Server, e)
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::new(ErrorKind::Validation, e)
    }
}

impl From<ConflictError> for Error {
    fn from(e: ConflictError) -> Self {
        Error::new(ErrorKind::Conflict, e)
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::new(ErrorKind::Serialization, e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        SerializationError::from(e).into()
    }
}

impl From<InternalError> for Error {
    fn from(e: InternalError) -> Self {
        Error::new(ErrorKind::Internal, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_keeps_the_kind_of_converted_errors() {
        let err = Error::from(ConflictError("create-post".into()));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "mutation 'create-post' already in progress");

        let err = Error::from(ErrorKind::Network);
        assert_eq!(err.to_string(), "network error");
    }

    #[test]
    fn it_exposes_the_server_message() {
        let err = Error::from(ServerError {
            status: 401,
            message: "Invalid login credentials".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.message(), "Invalid login credentials");
        assert_eq!(err.downcast_ref::<ServerError>().map(|e| e.status), Some(401));
    }

    #[test]
    fn it_shares_the_source_between_clones() {
        let err = Error::from(ServerError {
            status: 500,
            message: "boom".into(),
        });
        let copy = err.clone();
        assert!(Arc::ptr_eq(
            err.source().expect("source"),
            copy.source().expect("source")
        ));
    }
}
