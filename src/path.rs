//! Route patterns and path matching.
//!
//! A pattern compiles into ordered segments:
//!
//! | Syntax  | Segment     | Matches                                         |
//! |---------|-------------|-------------------------------------------------|
//! | `users` | literal     | exactly `users` (request side percent-decoded)  |
//! | `:id`   | parameter   | any single segment, bound decoded under `id`    |
//! | `*`     | wildcard    | the raw remainder, bound under `*`              |
//! | `*rest` | wildcard    | the raw remainder, bound under `rest`           |
//!
//! Matching is positional and all-or-nothing. A trailing slash is equivalent
//! to its absence, except for the root path `/`.

use percent_encoding::percent_decode_str;

use crate::error::Error;

/// Key under which an anonymous `*` wildcard stores its capture.
pub const WILDCARD: &str = "*";

/// Captured path parameters, in capture order.
///
/// Inserting an existing name replaces its value in place, so a pattern
/// that repeats a name keeps the later binding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Overlays `other` onto `self`; names present in both take `other`'s value.
    pub fn merge(&mut self, other: &Params) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard(String),
}

/// A compiled route pattern.
#[derive(Clone, Debug)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

/// A successful prefix match: captures plus how much of the path was consumed.
#[derive(Debug)]
pub(crate) struct PrefixMatch<'p> {
    pub params: Params,
    pub consumed: &'p str,
    pub rest: &'p str,
}

impl Pattern {
    /// Compiles `pattern`.
    ///
    /// Fails on an unnamed `:` parameter, a wildcard that is not the final
    /// segment, or a pattern that does not start with `/`.
    pub fn parse(pattern: &str) -> Result<Self, Error> {
        let invalid = |reason| Error::InvalidPattern { pattern: pattern.to_owned(), reason };

        if pattern.is_empty() {
            return Ok(Self { source: "/".to_owned(), segments: Vec::new() });
        }
        if !pattern.starts_with('/') {
            return Err(invalid("must start with `/`"));
        }

        let raw: Vec<&str> = split(normalize(pattern)).map(|(_, s)| s).collect();
        let mut segments = Vec::with_capacity(raw.len());
        for (i, seg) in raw.iter().enumerate() {
            let compiled = if let Some(name) = seg.strip_prefix(':') {
                if name.is_empty() {
                    return Err(invalid("parameter needs a name"));
                }
                Segment::Param(name.to_owned())
            } else if let Some(name) = seg.strip_prefix('*') {
                if i + 1 != raw.len() {
                    return Err(invalid("wildcard must be the final segment"));
                }
                let name = if name.is_empty() { WILDCARD } else { name };
                Segment::Wildcard(name.to_owned())
            } else {
                Segment::Literal((*seg).to_owned())
            };
            segments.push(compiled);
        }

        Ok(Self { source: pattern.to_owned(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Names this pattern binds, in order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(n) | Segment::Wildcard(n) => Some(n.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub(crate) fn same_shape(&self, other: &Pattern) -> bool {
        self.segments == other.segments
    }

    /// Matches the whole of `path`. `None` means no match.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let m = self.match_prefix(path)?;
        if m.rest == "/" { Some(m.params) } else { None }
    }

    /// Matches the pattern against the leading segments of `path`.
    ///
    /// Used for mount prefixes: `/api` matches `/api` and `/api/users` but not
    /// `/apix`. `rest` is the unconsumed remainder, always starting with `/`.
    pub(crate) fn match_prefix<'p>(&self, path: &'p str) -> Option<PrefixMatch<'p>> {
        let path = normalize(path);
        let mut params = Params::new();
        let mut parts = split(path).peekable();
        let mut consumed_end = 0;

        for seg in &self.segments {
            match seg {
                Segment::Wildcard(name) => {
                    let rest = match parts.peek() {
                        Some((offset, _)) => &path[*offset..],
                        None => "",
                    };
                    params.insert(name.as_str(), rest);
                    return Some(PrefixMatch { params, consumed: path, rest: "/" });
                }
                Segment::Literal(lit) => {
                    let (offset, part) = parts.next()?;
                    if decode(part) != *lit {
                        return None;
                    }
                    consumed_end = offset + part.len();
                }
                Segment::Param(name) => {
                    let (offset, part) = parts.next()?;
                    params.insert(name.as_str(), decode(part));
                    consumed_end = offset + part.len();
                }
            }
        }

        let rest = &path[consumed_end..];
        let rest = if rest.is_empty() { "/" } else { rest };
        Some(PrefixMatch { params, consumed: &path[..consumed_end], rest })
    }
}

/// Strips one trailing slash unless the path is the root.
fn normalize(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path,
    }
}

/// Splits a normalized path into `(byte offset, segment)` pairs, skipping
/// the leading `/`.
fn split(path: &str) -> impl Iterator<Item = (usize, &str)> {
    let body = path.strip_prefix('/').unwrap_or(path);
    let base = path.len() - body.len();
    let mut offset = base;
    let empty_root = body.is_empty();
    body.split('/')
        .filter(move |_| !empty_root)
        .map(move |seg| {
            let start = offset;
            offset += seg.len() + 1;
            (start, seg)
        })
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pattern: &str, path: &str) -> Option<Params> {
        Pattern::parse(pattern).unwrap().matches(path)
    }

    #[test]
    fn named_parameter() {
        let p = params("/users/:id", "/users/42").unwrap();
        assert_eq!(p.get("id"), Some("42"));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn literal_mismatch_and_length_mismatch() {
        assert!(params("/users/:id", "/posts/42").is_none());
        assert!(params("/users/:id", "/users").is_none());
        assert!(params("/users/:id", "/users/42/extra").is_none());
    }

    #[test]
    fn wildcard_captures_raw_remainder() {
        let p = params("/files/*", "/files/a/b/c").unwrap();
        assert_eq!(p.get(WILDCARD), Some("a/b/c"));

        let p = params("/files/*path", "/files/a%20b/c").unwrap();
        assert_eq!(p.get("path"), Some("a%20b/c"));

        let p = params("/files/*", "/files").unwrap();
        assert_eq!(p.get(WILDCARD), Some(""));
    }

    #[test]
    fn wildcard_must_be_last() {
        let err = Pattern::parse("/files/*/meta").unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
        assert!(Pattern::parse("/users/:").is_err());
        assert!(Pattern::parse("users").is_err());
    }

    #[test]
    fn trailing_slash_is_normalized() {
        assert!(params("/users", "/users/").is_some());
        assert!(params("/users/", "/users").is_some());
        assert!(params("/", "/").is_some());
        assert!(params("/", "").is_some());
        assert!(params("/", "/users").is_none());
    }

    #[test]
    fn request_side_is_percent_decoded() {
        assert!(params("/caf\u{e9}", "/caf%C3%A9").is_some());
        let p = params("/tags/:tag", "/tags/rust%20lang").unwrap();
        assert_eq!(p.get("tag"), Some("rust lang"));
    }

    #[test]
    fn repeated_name_keeps_later_binding() {
        let p = params("/:x/:x", "/first/second").unwrap();
        assert_eq!(p.get("x"), Some("second"));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn prefix_respects_segment_boundaries() {
        let api = Pattern::parse("/api").unwrap();
        let m = api.match_prefix("/api/users/7").unwrap();
        assert_eq!(m.consumed, "/api");
        assert_eq!(m.rest, "/users/7");
        assert_eq!(api.match_prefix("/api").unwrap().rest, "/");
        assert!(api.match_prefix("/apix").is_none());

        let root = Pattern::parse("/").unwrap();
        let m = root.match_prefix("/anything/here").unwrap();
        assert_eq!(m.consumed, "");
        assert_eq!(m.rest, "/anything/here");
    }

    #[test]
    fn prefix_captures_parameters() {
        let p = Pattern::parse("/users/:userId").unwrap();
        let m = p.match_prefix("/users/7/55").unwrap();
        assert_eq!(m.params.get("userId"), Some("7"));
        assert_eq!(m.rest, "/55");
    }

    #[test]
    fn merge_overlays_later_values() {
        let mut a: Params = [("userId", "7"), ("x", "1")].into_iter().collect();
        let b: Params = [("x", "2"), ("postId", "55")].into_iter().collect();
        a.merge(&b);
        assert_eq!(a.get("x"), Some("2"));
        assert_eq!(a.get("postId"), Some("55"));
        assert_eq!(a.len(), 3);
    }
}
