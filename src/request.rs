//! Per-request context.
//!
//! A [`Request`] is a cheap handle: method, headers, query, body, the
//! extension bag and the cancellation flag live behind one shared allocation,
//! while the params and the mount-relative path are the view of the entry
//! currently running. The dispatcher hands each chain entry its own handle,
//! so an entry inside a nested router sees that router's params and path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method};
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::path::Params;

// ── Query ─────────────────────────────────────────────────────────────────────

/// Decoded query string. Repeated keys keep every value, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Query(Vec<(String, String)>);

impl Query {
    /// Parses `a=1&b=2&a=3` form encoding. `+` decodes to a space.
    pub fn parse(raw: &str) -> Self {
        let pairs = raw
            .split('&')
            .filter(|p| !p.is_empty())
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_component(k), decode_component(v))
            })
            .collect();
        Self(pairs)
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0.iter().filter(move |(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, key: String, value: String) {
        self.0.push((key, value));
    }
}

fn decode_component(s: &str) -> String {
    let s = s.replace('+', " ");
    percent_decode_str(&s).decode_utf8_lossy().into_owned()
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// A payload already decoded by an external body parser, keyed by the
/// content type it was decoded from.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedBody {
    pub content_type: String,
    pub value: serde_json::Value,
}

// ── Cancellation ──────────────────────────────────────────────────────────────

/// Transport-side handle used to flag a request as abandoned by the client.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ── Request ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Shared {
    method: Method,
    path: String,
    query: Query,
    headers: HeaderMap,
    body: Bytes,
    parsed: Option<ParsedBody>,
    extensions: Mutex<Extensions>,
    cancel: CancelHandle,
}

/// The request context seen by a chain entry.
#[derive(Clone, Debug)]
pub struct Request {
    shared: Arc<Shared>,
    params: Params,
    base_path: String,
    route_path: String,
}

impl Request {
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// Builds a request from transport parts and the collected body.
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        let builder = RequestBuilder {
            method: parts.method,
            path: parts.uri.path().to_owned(),
            query: parts.uri.query().map(Query::parse).unwrap_or_default(),
            headers: parts.headers,
            body,
            parsed: None,
        };
        builder.build()
    }

    pub fn method(&self) -> &Method { &self.shared.method }

    /// The full request path, as received.
    pub fn path(&self) -> &str { &self.shared.path }

    /// The path relative to the mount the current entry lives under.
    pub fn route_path(&self) -> &str { &self.route_path }

    /// The portion of the path consumed by enclosing mounts.
    pub fn base_path(&self) -> &str { &self.base_path }

    pub fn query(&self) -> &Query { &self.shared.query }

    pub fn headers(&self) -> &HeaderMap { &self.shared.headers }

    /// First value of a header. Names are case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.shared.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of a header, in received order.
    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.shared.headers.get_all(name).iter().filter_map(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &[u8] { &self.shared.body }

    pub fn parsed_body(&self) -> Option<&ParsedBody> { self.shared.parsed.as_ref() }

    /// Deserializes the body, preferring a pre-parsed payload over raw bytes.
    ///
    /// A payload that does not fit `T` is a validation failure on `body`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let result = match &self.shared.parsed {
            Some(parsed) => serde_json::from_value(parsed.value.clone()),
            None => serde_json::from_slice(&self.shared.body),
        };
        result.map_err(|e| Error::invalid("body", e.to_string()))
    }

    pub fn params(&self) -> &Params { &self.params }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Stores a value in the extension bag, returning any previous value of
    /// the same type.
    pub fn insert_extension<T>(&self, value: T) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.extensions().insert(value)
    }

    /// Reads a value from the extension bag.
    pub fn extension<T>(&self) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.extensions().get::<T>().cloned()
    }

    pub fn remove_extension<T>(&self) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.extensions().remove::<T>()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.shared.cancel.clone()
    }

    /// The view handed to one chain entry.
    pub(crate) fn scoped(&self, params: Params, base_path: &str, route_path: &str) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            params,
            base_path: base_path.to_owned(),
            route_path: route_path.to_owned(),
        }
    }

    fn extensions(&self) -> std::sync::MutexGuard<'_, Extensions> {
        self.shared.extensions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── RequestBuilder ────────────────────────────────────────────────────────────

/// Builds a normalized request descriptor.
///
/// Transports use [`Request::from_parts`]; the builder is for tests and for
/// adapters that are not hyper-based.
///
/// ```rust
/// use http::Method;
/// use weir::Request;
///
/// let req = Request::builder()
///     .method(Method::POST)
///     .uri("/users?tag=a&tag=b")
///     .header("authorization", "Bearer abc")
///     .body(r#"{"name":"ada"}"#)
///     .build();
/// assert_eq!(req.query().get_all("tag").count(), 2);
/// ```
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    path: String,
    query: Query,
    headers: HeaderMap,
    body: Bytes,
    parsed: Option<ParsedBody>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self {
            method: Method::GET,
            path: "/".to_owned(),
            query: Query::default(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            parsed: None,
        }
    }
}

impl RequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the path and, if present, the query string.
    pub fn uri(mut self, uri: &str) -> Self {
        match uri.split_once('?') {
            Some((path, query)) => {
                self.path = path.to_owned();
                self.query = Query::parse(query);
            }
            None => self.path = uri.to_owned(),
        }
        self
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push(key.to_owned(), value.to_owned());
        self
    }

    /// Appends a header value. Invalid names or values are dropped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(n), Ok(v)) => {
                self.headers.append(n, v);
            }
            _ => tracing::warn!(header = name, "dropping invalid header"),
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn parsed_body(mut self, content_type: &str, value: serde_json::Value) -> Self {
        self.parsed = Some(ParsedBody { content_type: content_type.to_owned(), value });
        self
    }

    pub fn build(self) -> Request {
        let path = if self.path.is_empty() { "/".to_owned() } else { self.path };
        let route_path = path.clone();
        Request {
            shared: Arc::new(Shared {
                method: self.method,
                path,
                query: self.query,
                headers: self.headers,
                body: self.body,
                parsed: self.parsed,
                extensions: Mutex::new(Extensions::new()),
                cancel: CancelHandle::default(),
            }),
            params: Params::new(),
            base_path: String::new(),
            route_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn query_preserves_repeated_keys() {
        let q = Query::parse("tag=a&x=1&tag=b&empty&sp=a+b%21");
        assert_eq!(q.get("tag"), Some("a"));
        assert_eq!(q.get_all("tag").collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(q.get("empty"), Some(""));
        assert_eq!(q.get("sp"), Some("a b!"));
        assert_eq!(q.get("missing"), None);
    }

    #[test]
    fn query_value_outlives_the_lookup_key() {
        let q = Query::parse("page=2");
        let value = {
            let key = String::from("page");
            q.get(&key)
        };
        assert_eq!(value, Some("2"));
    }

    #[test]
    fn headers_are_case_insensitive_and_multi_valued() {
        let req = Request::builder()
            .header("X-Trace", "one")
            .header("x-trace", "two")
            .build();
        assert_eq!(req.header("x-TRACE"), Some("one"));
        assert_eq!(req.header_all("X-Trace").collect::<Vec<_>>(), ["one", "two"]);
    }

    #[test]
    fn extension_bag_is_shared_across_scoped_views() {
        #[derive(Clone, Debug, PartialEq)]
        struct Identity(&'static str);

        let req = Request::builder().uri("/a/b").build();
        let inner = req.scoped(Params::new(), "/a", "/b");
        inner.insert_extension(Identity("ada"));
        assert_eq!(req.extension::<Identity>(), Some(Identity("ada")));
        assert_eq!(inner.route_path(), "/b");
        assert_eq!(inner.path(), "/a/b");
    }

    #[test]
    fn json_prefers_parsed_body() {
        #[derive(Debug, Deserialize)]
        struct Input { name: String }

        let req = Request::builder()
            .body("not json")
            .parsed_body("application/x-www-form-urlencoded", serde_json::json!({ "name": "ada" }))
            .build();
        assert_eq!(req.json::<Input>().unwrap().name, "ada");

        let bad = Request::builder().body("not json").build();
        let err = bad.json::<Input>().unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(ref f) if f[0].field == "body"));
    }

    #[test]
    fn cancellation_is_visible_to_handlers() {
        let req = Request::builder().build();
        let handle = req.cancel_handle();
        assert!(!req.is_cancelled());
        handle.cancel();
        assert!(req.clone().is_cancelled());
    }
}
