//! Outgoing HTTP response type and the conversion traits handlers rely on.
//!
//! Build a [`Response`] in your handler and return it, or return a
//! `Result<Response, E>` when the handler can fail. A failure travels back
//! through the trace layer untouched and becomes a `500` at the server.

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use tracing::error;

use crate::error::BoxError;

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK, no custom headers needed)
///
/// ```rust
/// use routetrace::Response;
/// use http::StatusCode;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use routetrace::Response;
/// use http::StatusCode;
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) body: Vec<u8>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) status: StatusCode,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::bytes_raw("application/json", body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::bytes_raw("text/plain; charset=utf-8", body.into().into_bytes())
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Vec::new(), headers: Vec::new(), status: code }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn body(&self) -> &[u8] { &self.body }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn bytes_raw(content_type: &str, body: Vec<u8>) -> Self {
        Self {
            body,
            headers: vec![("content-type".to_owned(), content_type.to_owned())],
            status: StatusCode::OK,
        }
    }

    /// Converts into the hyper-facing response. A header that is not valid
    /// HTTP turns the whole response into a bare `500`.
    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut builder = http::Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        match builder.body(Full::new(Bytes::from(self.body))) {
            Ok(res) => res,
            Err(e) => {
                error!("invalid response: {e}");
                let mut res = http::Response::new(Full::default());
                *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                res
            }
        }
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
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

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish("application/json", body)
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish("text/plain; charset=utf-8", body.into().into_bytes())
    }

    /// Terminate with no body.
    pub fn no_body(self) -> Response {
        Response { body: Vec::new(), headers: self.headers, status: self.status }
    }

    fn finish(self, content_type: &str, body: Vec<u8>) -> Response {
        let mut headers = vec![("content-type".to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { body, headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
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

/// Return a status directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

// ── IntoOutcome ───────────────────────────────────────────────────────────────

/// What a handler may return: anything [`IntoResponse`], or a `Result` whose
/// error converts into [`BoxError`].
///
/// ```rust,ignore
/// async fn load(req: Request) -> Result<Response, std::io::Error> {
///     let bytes = std::fs::read("/etc/motd")?;
///     Ok(Response::text(String::from_utf8_lossy(&bytes)))
/// }
/// ```
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<Response, BoxError>;
}

impl IntoOutcome for Response {
    fn into_outcome(self) -> Result<Response, BoxError> { Ok(self) }
}

impl IntoOutcome for &'static str {
    fn into_outcome(self) -> Result<Response, BoxError> { Ok(self.into_response()) }
}

impl IntoOutcome for String {
    fn into_outcome(self) -> Result<Response, BoxError> { Ok(self.into_response()) }
}

impl IntoOutcome for StatusCode {
    fn into_outcome(self) -> Result<Response, BoxError> { Ok(self.into_response()) }
}

impl<R, E> IntoOutcome for Result<R, E>
where
    R: IntoResponse,
    E: Into<BoxError>,
{
    fn into_outcome(self) -> Result<Response, BoxError> {
        self.map(IntoResponse::into_response).map_err(Into::into)
    }
}
