//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup, plus optional mounted
//! sub-routers that are descended like branches of a routing tree. Every
//! match is appended to the request's [`MatchRecord`] as it happens; once a
//! handler is found, the matches are announced to the registered [`Layer`]s
//! in order, before the handler runs.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::trace;

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::trace::{Fragment, MatchRecord, record};
use crate::middleware::{Layer, Layers, Next};
use crate::request::Request;
use crate::response::Response;

struct Route {
    handler: BoxedHandler,
    fragment: Fragment,
}

struct Mount {
    prefix: String,
    fragment: Fragment,
    router: Router,
}

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Each builder call returns `self` so registrations chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
    mounts: Vec<Mount>,
    layers: Layers,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), mounts: Vec::new(), layers: Arc::new([]) }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use routetrace::{Request, Response, Router};
    /// # use http::Method;
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/users/{id}", get_user)
    ///     .on(Method::POST, "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        let route = Route { handler: handler.into_boxed_handler(), fragment: pattern_fragment(path) };
        self.routes
            .entry(method)
            .or_default()
            .insert(path, route)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Mounts `router` under `prefix`. A request whose path falls under the
    /// prefix is resolved by `router` only; there is no fallback to routes
    /// registered after the mount.
    ///
    /// Layers registered on `router` are ignored: layers belong to the root.
    ///
    /// ```rust,no_run
    /// # use routetrace::{Request, Response, Router};
    /// # use http::Method;
    /// # async fn list(_: Request) -> Response { Response::text("") }
    /// let admin = Router::new().on(Method::GET, "/users", list);
    /// let app = Router::new().nest("/admin", admin);   // GET /admin/users
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `prefix` normalizes to `/`.
    pub fn nest(mut self, prefix: &str, router: Router) -> Self {
        let prefix = normalize_prefix(prefix);
        if prefix == "/" {
            panic!("cannot nest a router at `/`");
        }
        let fragment = Fragment::literal(prefix[1..].to_owned());
        self.mounts.push(Mount { prefix, fragment, router });
        self
    }

    /// Appends a layer. The first layer added is the outermost.
    pub fn layer(mut self, layer: impl Layer) -> Self {
        let mut layers = self.layers.to_vec();
        layers.push(Arc::new(layer));
        self.layers = layers.into();
        self
    }

    /// Runs one request through the layers and the routing tree.
    ///
    /// Unmatched requests resolve to `404 Not Found`. Handler errors are
    /// returned as-is.
    pub fn handle(self: &Arc<Self>, req: Request) -> BoxFuture {
        Next::dispatch(Arc::clone(self)).run(req)
    }

    pub(crate) fn layers(&self) -> Layers {
        Arc::clone(&self.layers)
    }

    /// Resolves `req` and invokes the matched handler through the layers.
    pub(crate) fn route(self: Arc<Self>, mut req: Request) -> BoxFuture {
        let path = req.path().to_owned();
        let start = recorded(&req);
        match self.resolve(&mut req, &path) {
            Some(handler) => {
                let matched = MatchRecord::get(req.extensions())
                    .map(|rec| rec.fragments()[start..].to_vec())
                    .unwrap_or_default();
                for fragment in &matched {
                    for layer in self.layers.iter() {
                        layer.on_match(&mut req, fragment);
                    }
                }
                Next::invoke(self.layers(), handler).run(req)
            }
            None => {
                trace!(method = %req.method(), path = %path, "no route matched");
                Box::pin(async { Ok(Response::status(StatusCode::NOT_FOUND)) })
            }
        }
    }

    /// Walks the tree, recording every match. A mount whose sub-router finds
    /// nothing is rolled back out of the record.
    fn resolve(&self, req: &mut Request, path: &str) -> Option<BoxedHandler> {
        if let Some(tree) = self.routes.get(req.method()) {
            let found = record(req.extensions_mut(), tree.at(path), |m| m.value.fragment.clone());
            if let Ok(matched) = found {
                req.params.extend(
                    matched.params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())),
                );
                return Some(Arc::clone(&matched.value.handler));
            }
        }

        let mark = recorded(req);
        let mount = self
            .mounts
            .iter()
            .find_map(|m| under_prefix(path, &m.prefix).map(|rest| (m, rest)));
        let (mount, rest) = record(req.extensions_mut(), mount, |(m, _)| m.fragment.clone())?;

        let handler = mount.router.resolve(req, rest);
        if handler.is_none() {
            if let Some(rec) = MatchRecord::get_mut(req.extensions_mut()) {
                rec.truncate(mark);
            }
        }
        handler
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

fn recorded(req: &Request) -> usize {
    MatchRecord::get(req.extensions()).map_or(0, MatchRecord::len)
}

/// `/users/{id}` is recorded as `["users", "{id}"]`; `/` as an empty compound.
fn pattern_fragment(path: &str) -> Fragment {
    Fragment::compound(
        path.split('/')
            .filter(|s| !s.is_empty())
            .map(|s| Fragment::literal(s.to_owned())),
    )
}

/// Leading slash, no trailing slash, no empty segments.
fn normalize_prefix(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for segment in prefix.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// The part of `path` below `prefix`, always starting with `/`.
fn under_prefix<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
