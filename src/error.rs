//! Unified error type.
//!
//! Every failure a chain can produce is an [`Error`]. Handlers return one via
//! [`Outcome::Fail`](crate::Outcome::Fail) (or `Err(_)` from a `Result`), the
//! dispatcher switches into error-chain mode, and an error handler may inspect
//! [`Error::kind`] to decide what the client sees.

use std::fmt;
use std::time::Duration;

use http::StatusCode;
use serde::Serialize;
use serde_json::json;

use crate::response::Response;

/// One rejected input field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// The error type flowing through the chain and out of fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no route matches the request")]
    RouteNotFound,

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation failed on {} field(s)", .0.len())]
    ValidationFailed(Vec<FieldError>),

    #[error("handler fault: {0}")]
    HandlerFault(Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("handler exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("response already sent")]
    DoubleWrite,

    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },

    #[error("config: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Discriminant of [`Error`], for error handlers that branch on the category.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    RouteNotFound,
    Unauthenticated,
    Forbidden,
    ValidationFailed,
    HandlerFault,
    Timeout,
    DoubleWrite,
    InvalidPattern,
    Config,
    Io,
}

impl Error {
    /// Wraps any error as an uncategorized [`Error::HandlerFault`].
    pub fn fault<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::HandlerFault(Box::new(err))
    }

    /// A [`Error::HandlerFault`] carrying only a message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::HandlerFault(message.to_string().into())
    }

    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated(reason.into())
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }

    /// A single-field [`Error::ValidationFailed`].
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationFailed(vec![FieldError { field: field.into(), message: message.into() }])
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RouteNotFound        => ErrorKind::RouteNotFound,
            Self::Unauthenticated(_)   => ErrorKind::Unauthenticated,
            Self::Forbidden(_)         => ErrorKind::Forbidden,
            Self::ValidationFailed(_)  => ErrorKind::ValidationFailed,
            Self::HandlerFault(_)      => ErrorKind::HandlerFault,
            Self::Timeout(_)           => ErrorKind::Timeout,
            Self::DoubleWrite          => ErrorKind::DoubleWrite,
            Self::InvalidPattern { .. } => ErrorKind::InvalidPattern,
            Self::Config(_)            => ErrorKind::Config,
            Self::Io(_)                => ErrorKind::Io,
        }
    }

    /// Status class the client sees when this error reaches the fallback.
    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::RouteNotFound    => StatusCode::NOT_FOUND,
            ErrorKind::Unauthenticated  => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden        => StatusCode::FORBIDDEN,
            ErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorKind::Timeout          => StatusCode::REQUEST_TIMEOUT,
            _                           => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `true` for kinds whose message may be shown to the client.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Client-safe response for this error.
    ///
    /// Server-class errors render a generic body; the original message is
    /// never included.
    pub fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::ValidationFailed(fields) => json!({
                "error": "Validation failed",
                "fields": fields,
            }),
            _ => json!({ "error": status.canonical_reason().unwrap_or("Error") }),
        };

        let builder = Response::builder().status(status);
        let builder = match self {
            Self::Unauthenticated(_) => builder.header("www-authenticate", "Bearer"),
            _ => builder,
        };
        builder.json(body.to_string().into_bytes())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::fault(e)
    }
}

/// Accumulates field-level failures and converts them into
/// [`Error::ValidationFailed`].
///
/// ```rust
/// use weir::Violations;
///
/// let name = "";
/// let age = 212;
/// let result = Violations::new()
///     .check("name", !name.is_empty(), "must not be empty")
///     .check("age", age < 150, "out of range")
///     .finish();
/// assert!(result.is_err());
/// ```
#[derive(Debug, Default)]
pub struct Violations(Vec<FieldError>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` against `field` unless `ok` holds.
    pub fn check(mut self, field: &str, ok: bool, message: &str) -> Self {
        if !ok {
            self.push(field, message);
        }
        self
    }

    pub fn push(&mut self, field: &str, message: &str) {
        self.0.push(FieldError { field: field.to_owned(), message: message.to_owned() });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn finish(self) -> Result<(), Error> {
        if self.0.is_empty() { Ok(()) } else { Err(Error::ValidationFailed(self.0)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_json(res: &Response) -> serde_json::Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[test]
    fn taxonomy_maps_to_status_classes() {
        assert_eq!(Error::RouteNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::unauthenticated("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(Error::invalid("a", "b").status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::msg("boom").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(Error::DoubleWrite.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn fault_body_does_not_leak_message() {
        let res = Error::msg("db password is hunter2").into_response();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let text = String::from_utf8_lossy(res.body()).into_owned();
        assert!(!text.contains("hunter2"));
        assert_eq!(body_json(&res)["error"], "Internal Server Error");
    }

    #[test]
    fn validation_body_lists_fields() {
        let err = Violations::new()
            .check("name", false, "required")
            .check("email", true, "unused")
            .check("age", false, "must be positive")
            .finish()
            .unwrap_err();
        let res = err.into_response();
        let body = body_json(&res);
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(body["fields"][0]["field"], "name");
        assert_eq!(body["fields"][1]["message"], "must be positive");
        assert_eq!(body["fields"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn unauthenticated_sets_challenge_header() {
        let res = Error::unauthenticated("missing token").into_response();
        assert_eq!(res.header("WWW-Authenticate"), Some("Bearer"));
    }
}
