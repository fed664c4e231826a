//! Route-aware request tracing.
//!
//! [`TraceLayer`] observes a request at every point the router exposes:
//!
//! ```text
//! dispatch ──► begin "controller" scope (sanitized query params)
//!   on_match* ─► report each fragment the router recorded
//!   invoke ────► parse body params (bounded) ─► begin "controller" scope
//!                  handler runs inside it
//!                end scope; on success compute the transaction name
//! ◄── set the name on the dispatch scope, notice any error, end scope
//! ```
//!
//! Nothing here can fail a request. Oversize and malformed bodies degrade to
//! fewer parameters, and a failure while naming is logged as a warning.
//! Handler errors are reported once, at dispatch, and returned unchanged. A
//! handler panic closes both scopes as failures, is reported the same way,
//! and keeps unwinding.
//!
//! Several trace layers may share a router; each names only its own
//! dispatch scope.
//!
//! ```rust,no_run
//! use routetrace::{Request, Response, Router, Server};
//! use routetrace::middleware::trace::TraceLayer;
//! use http::Method;
//!
//! # async fn show(_: Request) -> Response { Response::text("") }
//! # async fn run() -> Result<(), routetrace::Error> {
//! let app = Router::new()
//!     .on(Method::GET, "/users/{id}", show)
//!     .layer(TraceLayer::from_env());
//!
//! Server::bind("0.0.0.0:3000").serve(app).await
//! # }
//! ```

mod body;
mod naming;
mod params;
mod record;
mod reporter;

pub use body::{BoundedBodyParser, ParamSource, RequestBody};
pub use naming::{ROOT_FRAGMENT, transaction_name};
pub use params::{DecodedParams, ParameterSanitizer, Params, SanitizedParams};
pub use record::{Capture, Fragment, MatchRecord, MatchResult, record};
pub use reporter::{CONTROLLER, NamingScheme, Outcome, TraceReporter, TracingReporter};

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use futures_util::FutureExt;
use http::Method;
use tracing::{Level, debug, info};

use super::{Layer, Next};
use crate::config::TraceConfig;
use crate::error::{HandlerPanic, NamingError};
use crate::handler::BoxFuture;
use crate::request::Request;

/// Per-request slot the handler scope fills and the dispatch scope reads.
#[derive(Clone, Default)]
struct NameSlot(Arc<OnceLock<String>>);

/// One [`NameSlot`] per trace layer the request passed through.
#[derive(Clone, Default)]
struct NameSlots(HashMap<u64, NameSlot>);

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(0);

/// Traces requests through a [`TraceReporter`].
pub struct TraceLayer<R: TraceReporter = TracingReporter> {
    id: u64,
    reporter: Arc<R>,
    parser: BoundedBodyParser,
    scheme: NamingScheme,
}

impl TraceLayer<TracingReporter> {
    /// A `tracing`-backed layer configured from the environment.
    pub fn from_env() -> Self {
        Self::new(TracingReporter, &TraceConfig::from_env())
    }
}

impl<R: TraceReporter> TraceLayer<R> {
    pub fn new(reporter: R, config: &TraceConfig) -> Self {
        Self::with_shared(Arc::new(reporter), config)
    }

    /// Like [`new`](Self::new), for a reporter the caller keeps a handle to.
    pub fn with_shared(reporter: Arc<R>, config: &TraceConfig) -> Self {
        info!(
            denied_params = config.deny_list.len(),
            max_parseable_size = config.max_parseable_size,
            "installing route tracing",
        );
        let sanitizer = ParameterSanitizer::new(config.deny_list.clone());
        Self {
            id: NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed),
            reporter,
            parser: BoundedBodyParser::new(sanitizer).max_size(config.max_parseable_size),
            scheme: NamingScheme::ROUTE,
        }
    }

    pub fn naming_scheme(mut self, scheme: NamingScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }
}

impl<R: TraceReporter> Layer for TraceLayer<R> {
    fn dispatch(&self, mut req: Request, next: Next) -> BoxFuture {
        let reporter = Arc::clone(&self.reporter);
        let scheme = self.scheme;
        let query = DecodedParams::from_query(req.query().unwrap_or_default());
        let params = self.parser.sanitizer().filter(&query.to_params());

        let slot = NameSlot::default();
        req.extensions_mut()
            .get_or_insert_default::<NameSlots>()
            .0
            .insert(self.id, slot.clone());

        Box::pin(async move {
            let started = Instant::now();
            let scope = reporter.begin_scope(CONTROLLER, &params);
            let handled = reporter.instrument(&scope, next.run(req));
            let result = match AssertUnwindSafe(handled).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    reporter.notice_error(&HandlerPanic::from_panic(&*payload));
                    reporter.end_scope(scope, Outcome::Failure, started.elapsed());
                    panic::resume_unwind(payload);
                }
            };

            if let Some(name) = slot.0.get() {
                reporter.set_default_transaction_name(&scope, name, scheme);
            }
            if let Err(err) = &result {
                reporter.notice_error(&**err);
            }
            reporter.end_scope(scope, Outcome::of(&result), started.elapsed());
            result
        })
    }

    fn on_match(&self, _req: &mut Request, fragment: &Fragment) {
        self.reporter.route_matched(fragment);
    }

    fn invoke(&self, mut req: Request, next: Next) -> BoxFuture {
        let reporter = Arc::clone(&self.reporter);
        let decoded = DecodedParams::from_request(&req);
        let params = self
            .parser
            .parse(req.body_mut(), &decoded)
            .into_params(self.parser.sanitizer());

        let record = MatchRecord::get(req.extensions()).cloned();
        let slot = req
            .extensions()
            .get::<NameSlots>()
            .and_then(|slots| slots.0.get(&self.id))
            .cloned();
        let method = req.method().clone();

        Box::pin(async move {
            let started = Instant::now();
            let scope = reporter.begin_scope(CONTROLLER, &params);
            let handled = reporter.instrument(&scope, next.run(req));
            let result = match AssertUnwindSafe(handled).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    reporter.end_scope(scope, Outcome::Failure, started.elapsed());
                    panic::resume_unwind(payload);
                }
            };
            reporter.end_scope(scope, Outcome::of(&result), started.elapsed());

            if result.is_ok() {
                name_transaction(&*reporter, slot, record.as_ref(), &method);
            }
            result
        })
    }
}

fn name_transaction<R: TraceReporter>(
    reporter: &R,
    slot: Option<NameSlot>,
    record: Option<&MatchRecord>,
    method: &Method,
) {
    let Some(slot) = slot else {
        debug!("no dispatch scope to name");
        return;
    };

    match panic::catch_unwind(AssertUnwindSafe(|| transaction_name(record, method.as_str()))) {
        Ok(name) if !name.is_empty() => {
            if slot.0.set(name).is_err() {
                debug!("transaction already named");
            }
        }
        Ok(_) => {}
        Err(payload) => {
            let err = NamingError::from_panic(&*payload);
            let err: &(dyn std::error::Error + 'static) = &err;
            reporter.log(Level::WARN, "failed to set transaction name", Some(err));
        }
    }
}
