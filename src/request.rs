//! Incoming HTTP request type.

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::{Extensions, HeaderMap, Method, Uri};

use crate::middleware::trace::RequestBody;

/// An incoming HTTP request with its body fully buffered.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Body,
    pub(crate) params: HashMap<String, String>,
    pub(crate) extensions: Extensions,
}

impl Request {
    /// Builds a request from already-split hyper/http parts and a collected
    /// body. The declared body size comes from `content-length` when present.
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        let declared = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let mut body = Body::new(body);
        if let Some(len) = declared {
            body = body.with_declared_len(len);
        }

        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            extensions: parts.extensions,
        }
    }

    /// Convenience for tests and in-process callers.
    ///
    /// ```rust
    /// use routetrace::Request;
    ///
    /// let req = Request::from_http(
    ///     http::Request::get("/users/42?verbose=1").body(bytes::Bytes::new()).unwrap(),
    /// );
    /// assert_eq!(req.path(), "/users/42");
    /// assert_eq!(req.query(), Some("verbose=1"));
    /// ```
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body)
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    /// The whole buffered body, regardless of the read position.
    pub fn body(&self) -> &[u8] { self.body.as_bytes() }

    /// The body as a seekable stream.
    pub fn body_mut(&mut self) -> &mut Body { &mut self.body }

    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// Header lookup. Names are case-insensitive; non-UTF-8 values are skipped.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// A buffered request body that can be read like a stream and rewound.
///
/// Cloning is cheap: the bytes are reference-counted.
#[derive(Clone, Debug, Default)]
pub struct Body {
    cursor: Cursor<Bytes>,
    declared_len: Option<u64>,
}

impl Body {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self { cursor: Cursor::new(bytes.into()), declared_len: None }
    }

    /// Overrides the size reported by [`RequestBody::declared_size`], normally
    /// taken from `content-length`.
    pub fn with_declared_len(mut self, len: u64) -> Self {
        self.declared_len = Some(len);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.cursor.get_ref()
    }

    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.get_ref().is_empty()
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for Body {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl RequestBody for Body {
    fn declared_size(&self) -> u64 {
        self.declared_len.unwrap_or(self.len() as u64)
    }

    fn read_position(&mut self) -> Option<u64> {
        Some(self.cursor.position())
    }

    fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.cursor.seek(SeekFrom::Start(pos)).map(|_| ())
    }

    fn raw(&self) -> Bytes {
        self.cursor.get_ref().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_size_prefers_content_length() {
        let req = Request::from_http(
            http::Request::post("/upload")
                .header("content-length", "5000")
                .body(Bytes::from_static(b"short"))
                .unwrap(),
        );
        assert_eq!(req.body.declared_size(), 5000);
        assert_eq!(req.body(), b"short");
    }

    #[test]
    fn declared_size_falls_back_to_buffered_length() {
        let req = Request::from_http(
            http::Request::post("/upload")
                .header("content-length", "not a number")
                .body(Bytes::from_static(b"abc"))
                .unwrap(),
        );
        assert_eq!(req.body.declared_size(), 3);
    }

    #[test]
    fn body_reads_and_rewinds() {
        let mut body = Body::new(Bytes::from_static(b"hello world"));
        let mut head = [0u8; 5];
        body.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"hello");
        assert_eq!(body.position(), 5);

        body.seek_to(0).unwrap();
        let mut all = String::new();
        body.read_to_string(&mut all).unwrap();
        assert_eq!(all, "hello world");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = Request::from_http(
            http::Request::get("/")
                .header("Content-Type", "application/json")
                .body(Bytes::new())
                .unwrap(),
        );
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("x-missing"), None);
    }
}
