//! Traced JSON endpoints, one of them mounted under `/admin`.
//!
//! Run with:
//!   FILTERED_PARAMS=password,token RUST_LOG=routetrace=debug cargo run --example basic
//!
//! Try:
//!   curl 'http://localhost:3000/users/42?token=abc&verbose=1'
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice","password":"hunter2"}'
//!   curl http://localhost:3000/admin/users/7
//!   curl http://localhost:3000/admin/users/0     # handler error -> 500

use http::{Method, StatusCode};
use routetrace::{Request, Response, Router, Server, TraceLayer};

#[derive(Debug, thiserror::Error)]
#[error("user {0} does not exist")]
struct UnknownUser(String);

#[tokio::main]
async fn main() -> Result<(), routetrace::Error> {
    tracing_subscriber::fmt::init();

    let admin = Router::new().on(Method::GET, "/users/{id}", audit_user);

    let app = Router::new()
        .on(Method::GET, "/users/{id}", get_user)
        .on(Method::POST, "/users", create_user)
        .nest("/admin", admin)
        .layer(TraceLayer::from_env());

    Server::bind("0.0.0.0:3000").serve(app).await
}

// Traced as "GET users/{id}".
async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#).into_bytes())
}

// The handler scope carries the body's keys, minus FILTERED_PARAMS.
async fn create_user(req: Request) -> Response {
    if req.body().is_empty() {
        return Response::status(StatusCode::BAD_REQUEST);
    }
    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/users/99")
        .json(br#"{"id":"99"}"#.to_vec())
}

// Traced as "GET admin/users/{id}"; id 0 fails and is reported as an error.
async fn audit_user(req: Request) -> Result<Response, UnknownUser> {
    match req.param("id") {
        Some("0") | None => Err(UnknownUser(req.param("id").unwrap_or("").to_owned())),
        Some(id) => Ok(Response::text(format!("audit log for {id}"))),
    }
}
