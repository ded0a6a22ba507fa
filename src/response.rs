//! Outgoing response type, the [`IntoResponse`] conversion trait, and the
//! single-write [`ResponseSink`].

use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::error::Error;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing response descriptor.
///
/// ```rust
/// use http::StatusCode;
/// use weir::Response;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub(crate) body: Bytes,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) status: StatusCode,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK` with `value` serialized as JSON. A value that fails to
    /// serialize becomes a bare `500`.
    pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => Self::json(bytes),
            Err(e) => {
                error!(error = %e, "response serialization failed");
                Self::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Bytes::new(), headers: Vec::new(), status: code }
    }

    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }

    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &[u8] { &self.body }

    pub(crate) fn into_parts(self) -> (StatusCode, Vec<(String, String)>, Bytes) {
        (self.status, self.headers, self.body)
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`]. Defaults to `200 OK`.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish(ContentType::Json.as_str(), body.into())
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text.as_str(), Bytes::from(body.into()))
    }

    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(content_type.as_str(), body.into())
    }

    pub fn no_body(self) -> Response {
        Response { body: Bytes::new(), headers: self.headers, status: self.status }
    }

    fn finish(self, content_type: &str, body: Bytes) -> Response {
        let mut headers = vec![("content-type".to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { body, headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into a [`Response`].
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response { Error::into_response(self) }
}

// ── ResponseSink ──────────────────────────────────────────────────────────────

/// The outbound side of one request: accepts exactly one write.
///
/// A second write is a programming defect. It is logged, rejected with
/// [`Error::DoubleWrite`], and leaves the first response untouched.
#[derive(Debug, Default)]
pub struct ResponseSink {
    sent: bool,
    written: Option<Response>,
}

impl ResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Writes `(status, headers, body)`.
    pub fn respond(
        &mut self,
        status: StatusCode,
        headers: Vec<(String, String)>,
        body: impl Into<Bytes>,
    ) -> Result<(), Error> {
        self.send(Response { status, headers, body: body.into() })
    }

    pub fn send(&mut self, response: Response) -> Result<(), Error> {
        if self.sent {
            error!(
                first = %self.written.as_ref().map_or(0, |r| r.status.as_u16()),
                rejected = %response.status.as_u16(),
                "double write: response already sent",
            );
            return Err(Error::DoubleWrite);
        }
        self.sent = true;
        self.written = Some(response);
        Ok(())
    }

    /// The response that was written, for handing to the transport.
    pub fn take(&mut self) -> Option<Response> {
        self.written.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_puts_content_type_first() {
        let res = Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/users/42")
            .json(br#"{"id":42}"#.to_vec());
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.headers()[0].0, "content-type");
        assert_eq!(res.header("Location"), Some("/users/42"));
    }

    #[test]
    fn to_json_serializes() {
        let res = Response::to_json(&serde_json::json!({ "id": 1 }));
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(res.body(), br#"{"id":1}"#);
    }

    #[test]
    fn second_write_is_rejected_and_first_kept() {
        let mut sink = ResponseSink::new();
        sink.respond(StatusCode::OK, Vec::new(), "first").unwrap();
        assert!(sink.is_sent());

        let err = sink.send(Response::text("second")).unwrap_err();
        assert!(matches!(err, Error::DoubleWrite));

        let sent = sink.take().unwrap();
        assert_eq!(sent.body(), b"first");
        assert_eq!(sent.status_code(), StatusCode::OK);
    }
}
