//! The reporting boundary.
//!
//! [`TraceLayer`](super::TraceLayer) decides *what* to report; a
//! [`TraceReporter`] decides where it goes. [`TracingReporter`] sends
//! everything to the `tracing` ecosystem, which is enough to get spans into
//! any subscriber or OpenTelemetry bridge.

use std::error::Error as StdError;
use std::time::Duration;

use tracing::field::Empty;
use tracing::{Instrument, Level, Span, debug, error, info, info_span, trace, warn};

use super::params::SanitizedParams;
use super::record::Fragment;
use crate::handler::BoxFuture;

/// Category of every scope the trace layer opens.
pub const CONTROLLER: &str = "controller";

/// Tells the reporter which naming rules produced a transaction name.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NamingScheme(&'static str);

impl NamingScheme {
    /// Names built from matched route fragments.
    pub const ROUTE: Self = Self("route");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(self) -> &'static str {
        self.0
    }
}

/// How a scope ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn of<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() { Self::Success } else { Self::Failure }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Receives scopes, names, errors and log lines from the trace layer.
///
/// Every method is called on the request's own task; implementations that
/// buffer across requests must synchronize themselves.
pub trait TraceReporter: Send + Sync + 'static {
    /// Whatever the reporter needs to close a scope later.
    type Scope: Send + 'static;

    fn begin_scope(&self, category: &'static str, params: &SanitizedParams) -> Self::Scope;

    fn end_scope(&self, scope: Self::Scope, outcome: Outcome, elapsed: Duration);

    /// Names the in-flight transaction `scope` belongs to.
    fn set_default_transaction_name(&self, scope: &Self::Scope, name: &str, scheme: NamingScheme);

    fn notice_error(&self, error: &(dyn StdError + 'static));

    fn log(&self, level: Level, message: &str, error: Option<&(dyn StdError + 'static)>);

    /// One route-tree match, in the order the router made them. Called
    /// before the handler scope opens.
    fn route_matched(&self, _fragment: &Fragment) {}

    /// Runs `fut` inside `scope`. The default runs it as-is.
    fn instrument(&self, _scope: &Self::Scope, fut: BoxFuture) -> BoxFuture {
        fut
    }
}

// ── TracingReporter ───────────────────────────────────────────────────────────

/// Reports scopes as `tracing` spans and everything else as events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl TraceReporter for TracingReporter {
    type Scope = Span;

    fn begin_scope(&self, category: &'static str, params: &SanitizedParams) -> Span {
        info_span!(
            "trace_scope",
            category,
            params = %params,
            transaction = Empty,
            outcome = Empty,
            elapsed_ms = Empty,
        )
    }

    fn end_scope(&self, scope: Span, outcome: Outcome, elapsed: Duration) {
        scope.record("outcome", outcome.as_str());
        scope.record("elapsed_ms", elapsed.as_millis() as u64);
        debug!(parent: &scope, outcome = outcome.as_str(), "scope closed");
    }

    fn set_default_transaction_name(&self, scope: &Span, name: &str, scheme: NamingScheme) {
        scope.record("transaction", name);
        trace!(parent: scope, scheme = scheme.as_str(), name, "transaction named");
    }

    fn notice_error(&self, err: &(dyn StdError + 'static)) {
        error!(error = %err, "request failed");
    }

    fn log(&self, level: Level, message: &str, err: Option<&(dyn StdError + 'static)>) {
        let err = err.map(|e| e.to_string());
        let err = err.as_deref();
        if level == Level::ERROR {
            error!(error = err, "{message}");
        } else if level == Level::WARN {
            warn!(error = err, "{message}");
        } else if level == Level::INFO {
            info!(error = err, "{message}");
        } else if level == Level::DEBUG {
            debug!(error = err, "{message}");
        } else {
            trace!(error = err, "{message}");
        }
    }

    fn route_matched(&self, fragment: &Fragment) {
        trace!(segment = %fragment.describe(), "route matched");
    }

    fn instrument(&self, scope: &Span, fut: BoxFuture) -> BoxFuture {
        Box::pin(fut.instrument(scope.clone()))
    }
}
