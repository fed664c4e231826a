//! # routetrace
//!
//! A minimal radix-tree HTTP framework with route-aware request tracing.
//!
//! Every request handled under a [`TraceLayer`] gets two nested trace
//! scopes: one around routing, one around the matched handler. While the
//! router descends its tree, each match is recorded on the request, and
//! once the handler succeeds the recorded fragments become the
//! transaction name, e.g. `GET admin/users/{id}`.
//!
//! Parameters attached to a scope are sanitized against a deny-list read
//! from `FILTERED_PARAMS`, and body parameters are only parsed when the body
//! is small enough. Tracing never fails a request.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::{Method, StatusCode};
//! use routetrace::{Request, Response, Router, Server, TraceLayer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), routetrace::Error> {
//!     tracing_subscriber::fmt::init();
//!
//!     let app = Router::new()
//!         .on(Method::GET,  "/users/{id}", get_user)
//!         .on(Method::POST, "/users",      create_user)
//!         .layer(TraceLayer::from_env());
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//!
//! async fn create_user(req: Request) -> Response {
//!     if req.body().is_empty() {
//!         return Response::status(StatusCode::BAD_REQUEST);
//!     }
//!     Response::builder()
//!         .status(StatusCode::CREATED)
//!         .header("location", "/users/99")
//!         .no_body()
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod config;
pub mod middleware;

pub use error::{BoxError, Error, HandlerPanic, NamingError};
pub use handler::{BoxFuture, Handler};
pub use middleware::trace::TraceLayer;
pub use middleware::{Layer, Next};
pub use request::{Body, Request};
pub use response::{IntoOutcome, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
