//! End-to-end behaviour of the trace layer, driven through `Router::handle`
//! with a reporter that records every call.

use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use routetrace::config::{DenyList, TraceConfig};
use routetrace::middleware::trace::{
    Fragment, MatchRecord, NamingScheme, Outcome, SanitizedParams, TraceReporter,
};
use routetrace::{Layer, Request, Response, Router, TraceLayer};
use serde_json::{Value, json};
use tracing::Level;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Begin { scope: usize, category: &'static str, params: Value },
    End { scope: usize, outcome: Outcome },
    Named { scope: usize, name: String, scheme: NamingScheme },
    Error(String),
    Log { level: Level, message: String, error: Option<String> },
    Matched(String),
}

#[derive(Default)]
struct RecordingReporter {
    next_scope: AtomicUsize,
    events: Mutex<Vec<Event>>,
}

impl RecordingReporter {
    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn params_of(&self, scope: usize) -> Value {
        self.events()
            .into_iter()
            .find_map(|e| match e {
                Event::Begin { scope: s, params, .. } if s == scope => Some(params),
                _ => None,
            })
            .unwrap()
    }

    fn names(&self) -> Vec<(usize, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Named { scope, name, .. } => Some((scope, name)),
                _ => None,
            })
            .collect()
    }

    fn matched(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Matched(segment) => Some(segment),
                _ => None,
            })
            .collect()
    }

    fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Error(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }
}

impl TraceReporter for RecordingReporter {
    type Scope = usize;

    fn begin_scope(&self, category: &'static str, params: &SanitizedParams) -> usize {
        let scope = self.next_scope.fetch_add(1, Ordering::SeqCst);
        let params = serde_json::to_value(params).unwrap();
        self.push(Event::Begin { scope, category, params });
        scope
    }

    fn end_scope(&self, scope: usize, outcome: Outcome, _elapsed: Duration) {
        self.push(Event::End { scope, outcome });
    }

    fn set_default_transaction_name(&self, scope: &usize, name: &str, scheme: NamingScheme) {
        self.push(Event::Named { scope: *scope, name: name.to_owned(), scheme });
    }

    fn notice_error(&self, error: &(dyn StdError + 'static)) {
        self.push(Event::Error(error.to_string()));
    }

    fn log(&self, level: Level, message: &str, error: Option<&(dyn StdError + 'static)>) {
        self.push(Event::Log {
            level,
            message: message.to_owned(),
            error: error.map(|e| e.to_string()),
        });
    }

    fn route_matched(&self, fragment: &Fragment) {
        self.push(Event::Matched(fragment.describe()));
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

const DISPATCH: usize = 0;
const HANDLER: usize = 1;

fn with_reporter(router: Router, deny: &str) -> (Router, Arc<RecordingReporter>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let reporter = Arc::new(RecordingReporter::default());
    let config = TraceConfig::default().deny_list(DenyList::parse(deny));
    let router = router.layer(TraceLayer::with_shared(Arc::clone(&reporter), &config));
    (router, reporter)
}

fn traced(router: Router, deny: &str) -> (Arc<Router>, Arc<RecordingReporter>) {
    let (router, reporter) = with_reporter(router, deny);
    (Arc::new(router), reporter)
}

fn get(uri: &str) -> Request {
    Request::from_http(http::Request::get(uri).body(Bytes::new()).unwrap())
}

fn post(uri: &str, content_type: &str, body: impl Into<Bytes>) -> Request {
    Request::from_http(
        http::Request::post(uri)
            .header("content-type", content_type)
            .body(body.into())
            .unwrap(),
    )
}

async fn show_user(req: Request) -> Response {
    Response::text(req.param("id").unwrap_or_default().to_owned())
}

async fn body_len(req: Request) -> Response {
    Response::text(req.body().len().to_string())
}

#[derive(Debug)]
struct Missing;

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("record missing")
    }
}

impl StdError for Missing {}

async fn broken(_req: Request) -> Result<Response, Missing> {
    Err(Missing)
}

async fn explode(_req: Request) -> Response {
    panic!("handler blew up")
}

// ── Naming ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_request_is_named_after_its_route() {
    let (app, reporter) = traced(Router::new().on(Method::GET, "/users/{id}", show_user), "");

    let res = app.handle(get("/users/42")).await.unwrap();
    assert_eq!(res.body(), b"42");

    assert_eq!(reporter.names(), [(DISPATCH, "GET users/{id}".to_owned())]);
    let events = reporter.events();
    assert!(events.contains(&Event::Named {
        scope: DISPATCH,
        name: "GET users/{id}".into(),
        scheme: NamingScheme::ROUTE,
    }));
    assert!(events.contains(&Event::End { scope: HANDLER, outcome: Outcome::Success }));
    assert!(events.contains(&Event::End { scope: DISPATCH, outcome: Outcome::Success }));
}

#[tokio::test]
async fn mounted_routes_contribute_every_level() {
    let admin = Router::new().on(Method::GET, "/users/{id}", show_user);
    let (app, reporter) = traced(Router::new().nest("/admin", admin), "");

    app.handle(get("/admin/users/7")).await.unwrap();

    assert_eq!(reporter.names(), [(DISPATCH, "GET admin/users/{id}".to_owned())]);
}

#[tokio::test]
async fn every_route_match_is_reported_in_order() {
    let admin = Router::new().on(Method::GET, "/users/{id}", show_user);
    let (app, reporter) = traced(Router::new().nest("/admin", admin), "");

    app.handle(get("/admin/users/7")).await.unwrap();
    assert_eq!(reporter.matched(), ["admin", "users/{id}"]);

    app.handle(get("/admin/nothing")).await.unwrap();
    assert_eq!(reporter.matched().len(), 2, "a dead-end mount is not reported");
}

#[tokio::test]
async fn stacked_trace_layers_each_name_their_own_transaction() {
    let router = Router::new().on(Method::GET, "/users/{id}", show_user);
    let (router, outer) = with_reporter(router, "");
    let (router, inner) = with_reporter(router, "");
    let app = Arc::new(router);

    app.handle(get("/users/1")).await.unwrap();

    for reporter in [&outer, &inner] {
        assert_eq!(reporter.names(), [(DISPATCH, "GET users/{id}".to_owned())]);
        assert_eq!(reporter.matched(), ["users/{id}"]);
        let events = reporter.events();
        assert!(events.contains(&Event::End { scope: HANDLER, outcome: Outcome::Success }));
        assert!(events.contains(&Event::End { scope: DISPATCH, outcome: Outcome::Success }));
    }
}

#[tokio::test]
async fn root_route_is_named_slash() {
    let (app, reporter) = traced(Router::new().on(Method::GET, "/", show_user), "");

    app.handle(get("/")).await.unwrap();

    assert_eq!(reporter.names(), [(DISPATCH, "GET /".to_owned())]);
}

#[tokio::test]
async fn unmatched_request_is_not_named() {
    let (app, reporter) = traced(Router::new().on(Method::GET, "/users/{id}", show_user), "");

    let res = app.handle(get("/nowhere")).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);

    assert!(reporter.names().is_empty());
    let begins = reporter
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Begin { .. }))
        .count();
    assert_eq!(begins, 1, "no handler scope without a handler");
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn handler_error_is_noticed_once_and_returned() {
    let (app, reporter) = traced(Router::new().on(Method::GET, "/broken", broken), "");

    let err = app.handle(get("/broken")).await.unwrap_err();
    assert!(err.downcast_ref::<Missing>().is_some());

    assert_eq!(reporter.errors(), ["record missing"]);
    assert!(reporter.names().is_empty());
    let events = reporter.events();
    assert!(events.contains(&Event::End { scope: HANDLER, outcome: Outcome::Failure }));
    assert!(events.contains(&Event::End { scope: DISPATCH, outcome: Outcome::Failure }));
}

#[tokio::test]
async fn handler_panic_closes_both_scopes_and_keeps_unwinding() {
    let (app, reporter) = traced(Router::new().on(Method::GET, "/explode", explode), "");

    let joined = tokio::spawn(app.handle(get("/explode"))).await;
    assert!(joined.unwrap_err().is_panic());

    assert_eq!(reporter.errors(), ["handler panicked: handler blew up"]);
    assert!(reporter.names().is_empty());
    let events = reporter.events();
    assert!(events.contains(&Event::End { scope: HANDLER, outcome: Outcome::Failure }));
    assert!(events.contains(&Event::End { scope: DISPATCH, outcome: Outcome::Failure }));
}

/// Records a capture that cannot be rendered, so naming fails.
struct Exploding;

impl fmt::Display for Exploding {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        panic!("cannot render")
    }
}

impl fmt::Debug for Exploding {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        panic!("cannot render")
    }
}

struct ExplodingCapture;

impl Layer for ExplodingCapture {
    fn on_match(&self, req: &mut Request, _fragment: &Fragment) {
        MatchRecord::get_or_init(req.extensions_mut()).push(Fragment::capture(Exploding));
    }
}

#[tokio::test]
async fn naming_failure_is_logged_and_request_succeeds() {
    let router = Router::new()
        .on(Method::GET, "/users/{id}", show_user)
        .layer(ExplodingCapture);
    let (app, reporter) = traced(router, "");

    let res = app.handle(get("/users/1")).await.unwrap();
    assert_eq!(res.body(), b"1");

    assert!(reporter.names().is_empty());
    assert!(reporter.errors().is_empty());
    let warned = reporter.events().into_iter().any(|e| {
        matches!(
            e,
            Event::Log { level, ref message, error: Some(ref err) }
                if level == Level::WARN
                    && message == "failed to set transaction name"
                    && err.contains("cannot render")
        )
    });
    assert!(warned, "expected a warning, got {:?}", reporter.events());
}

// ── Parameters ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn deny_listed_query_params_never_reach_a_scope() {
    let (app, reporter) =
        traced(Router::new().on(Method::GET, "/users/{id}", show_user), "token");

    app.handle(get("/users/3?token=abc&page=2")).await.unwrap();

    assert_eq!(reporter.params_of(DISPATCH), json!({ "page": "2" }));
    assert_eq!(reporter.params_of(HANDLER), json!({ "page": "2" }));
}

#[tokio::test]
async fn json_body_params_are_parsed_and_sanitized() {
    let (app, reporter) = traced(Router::new().on(Method::POST, "/users", body_len), "b");

    let res = app
        .handle(post("/users", "application/json", r#"{"a":1,"b":2}"#))
        .await
        .unwrap();
    assert_eq!(res.body(), b"13");

    assert_eq!(reporter.params_of(DISPATCH), json!({}));
    assert_eq!(reporter.params_of(HANDLER), json!({ "a": 1 }));
}

#[tokio::test]
async fn oversize_body_is_skipped_but_stays_readable() {
    let (app, reporter) = traced(Router::new().on(Method::POST, "/upload", body_len), "");

    let body = "x".repeat(5000);
    let res = app
        .handle(post("/upload", "application/x-www-form-urlencoded", body))
        .await
        .unwrap();
    assert_eq!(res.body(), b"5000");

    assert_eq!(reporter.params_of(HANDLER), json!({}));
    assert_eq!(reporter.names(), [(DISPATCH, "POST upload".to_owned())]);
}

#[tokio::test]
async fn every_scope_is_a_controller_scope() {
    let (app, reporter) = traced(Router::new().on(Method::GET, "/users/{id}", show_user), "");

    app.handle(get("/users/5")).await.unwrap();

    let categories: Vec<_> = reporter
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Begin { category, .. } => Some(category),
            _ => None,
        })
        .collect();
    assert_eq!(categories, ["controller", "controller"]);
}
