//! Middleware layer.
//!
//! A [`Layer`] sits in the router's composition chain at three points:
//!
//! | Hook | When | Typical use |
//! |---|---|---|
//! | [`Layer::dispatch`] | once per request, around route resolution | transaction scope, error reporting |
//! | [`Layer::on_match`] | once per recorded match, after a handler is found | observing the matched route |
//! | [`Layer::invoke`] | around the matched handler | handler scope, parameters |
//!
//! Layers run in registration order on the way in and unwind in reverse.
//! Every hook has a pass-through default, so a layer only overrides what it
//! needs.
//!
//! Built-in middleware:
//! - [`trace`]: route-named trace scopes with sanitized parameters

pub mod trace;

use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler};
use crate::request::Request;
use crate::router::Router;

use self::trace::Fragment;

/// A request interceptor. See the [module docs](self).
pub trait Layer: Send + Sync + 'static {
    fn dispatch(&self, req: Request, next: Next) -> BoxFuture {
        next.run(req)
    }

    fn on_match(&self, _req: &mut Request, _fragment: &Fragment) {}

    fn invoke(&self, req: Request, next: Next) -> BoxFuture {
        next.run(req)
    }
}

pub(crate) type Layers = Arc<[Arc<dyn Layer>]>;

/// The rest of the chain after the current layer.
pub struct Next {
    layers: Layers,
    index: usize,
    target: Target,
}

enum Target {
    Route(Arc<Router>),
    Handler(BoxedHandler),
}

impl Next {
    pub(crate) fn dispatch(router: Arc<Router>) -> Self {
        Self { layers: router.layers(), index: 0, target: Target::Route(router) }
    }

    pub(crate) fn invoke(layers: Layers, handler: BoxedHandler) -> Self {
        Self { layers, index: 0, target: Target::Handler(handler) }
    }

    /// Hands `req` to the next layer, or to the router / handler once every
    /// layer has had its turn.
    pub fn run(self, req: Request) -> BoxFuture {
        let Some(layer) = self.layers.get(self.index).cloned() else {
            return match self.target {
                Target::Route(router) => router.route(req),
                Target::Handler(handler) => handler.call(req),
            };
        };

        let routing = matches!(self.target, Target::Route(_));
        let next = Self { index: self.index + 1, ..self };
        if routing { layer.dispatch(req, next) } else { layer.invoke(req, next) }
    }
}
