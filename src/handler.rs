//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! Every route tree stores its handlers as `dyn ErasedHandler`, so handlers of
//! different concrete types share one `MatchitRouter<Route>`. The trace layer
//! wraps the same erased handler when it opens a scope around it, which is why
//! the erased call is also what [`Next`](crate::middleware::Next) bottoms out in.
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ router.on(Method::GET, "/", hello)
//! hello.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                       ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req)  at request time               ← one vtable dispatch
//!        ↓
//! Box::pin(async { hello(req).await.into_outcome() })   ← BoxFuture
//! ```
//!
//! Every handler resolves to `Result<Response, BoxError>`. Infallible handlers
//! are wrapped in `Ok`; fallible ones keep their error so the trace layer can
//! report it and hand it back unchanged.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::BoxError;
use crate::request::Request;
use crate::response::{IntoOutcome, Response};

/// The future every erased handler, layer and router call returns.
pub type BoxFuture = Pin<Box<dyn Future<Output = Result<Response, BoxError>> + Send + 'static>>;

/// Object-safe handler call. Public only because [`Handler`] names it.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// Sealed, and satisfied by any `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoOutcome
/// ```
///
/// which covers `Response`, `String`, `&'static str`, `StatusCode`, and
/// `Result<impl IntoResponse, impl Into<BoxError>>`.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_outcome() })
    }
}
