//! Middleware layer.
//!
//! A middleware receives the request and a [`Next`] handle for everything
//! registered after it. It may
//!
//! - answer on its own and never call `next` (short-circuit),
//! - call `next.run(req).await` and return what comes back (delegate),
//! - inspect or rewrite the outcome of `next`, including its `Err` (wrap).
//!
//! Any closure `Fn(Request, Next) -> impl Future<Output = HandlerResult>`
//! is a middleware:
//!
//! ```rust
//! use warren::{App, Next, Request};
//!
//! let app = App::new();
//! app.middleware(|req: Request, next: Next| async move {
//!     let mut res = next.run(req).await?;
//!     res.headers_mut().insert("x-powered-by", "warren".parse().unwrap());
//!     Ok::<_, warren::HttpError>(res)
//! });
//! ```

use std::future::Future;
use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, HandlerResult};
use crate::request::Request;
use crate::response::Response;

pub mod auth;
pub mod boundary;
pub mod compress;
pub mod cors;
pub mod directory;
pub mod logger;
pub mod serve;

pub use auth::BasicAuth;
pub use boundary::{ErrorBoundary, FaultContext};
pub use compress::Compress;
pub use cors::Cors;
pub use directory::Directory;
pub use logger::Logger;
pub use serve::{Favicon, ServeDir};

/// One entry of a [`MiddlewareChain`].
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture<HandlerResult>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, req: Request, next: Next) -> BoxFuture<HandlerResult> {
        Box::pin((self)(req, next))
    }
}

pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

/// The rest of the chain, as seen from one middleware.
///
/// Consumed by [`run`](Next::run), so each entry can delegate at most once.
pub struct Next {
    entries: Arc<[BoxedMiddleware]>,
    index: usize,
    endpoint: Option<BoxedHandler>,
}

impl Next {
    /// Runs the remaining entries, then the endpoint.
    ///
    /// When the chain is exhausted and there is no endpoint the outcome is
    /// [`Response::empty`]: no status, no body, which later resolves to 404.
    pub async fn run(mut self, req: Request) -> HandlerResult {
        match self.entries.get(self.index).cloned() {
            Some(entry) => {
                self.index += 1;
                entry.handle(req, self).await
            }
            None => match self.endpoint.take() {
                Some(endpoint) => endpoint.call(req).await,
                None => Ok(Response::empty()),
            },
        }
    }
}

/// Ordered middleware entries owned by one app.
///
/// Requests enter at the head. [`prepend`](Self::prepend) is for
/// cross-cutting entries that must observe everything else, such as the
/// error boundary; [`push`](Self::push) keeps registration order.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    entries: Vec<BoxedMiddleware>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mw: impl Middleware) {
        self.entries.push(Arc::new(mw));
    }

    pub fn prepend(&mut self, mw: impl Middleware) {
        self.entries.insert(0, Arc::new(mw));
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Snapshot of the entries, taken once per request.
    pub(crate) fn snapshot(&self) -> Arc<[BoxedMiddleware]> {
        Arc::from(self.entries.as_slice())
    }

    /// Runs `req` through every entry and finally `endpoint`.
    pub async fn run(&self, req: Request, endpoint: Option<BoxedHandler>) -> HandlerResult {
        run_entries(self.snapshot(), req, endpoint).await
    }
}

pub(crate) async fn run_entries(
    entries: Arc<[BoxedMiddleware]>,
    req: Request,
    endpoint: Option<BoxedHandler>,
) -> HandlerResult {
    Next { entries, index: 0, endpoint }.run(req).await
}
