//! Request dispatch through an app tree.
//!
//! ```text
//! http::Request ──► collect body (Limited) ──► descend by mount prefix
//!                                                   │
//!                        terminal app: chain[0..n] ──► route table
//!                                                   │
//!                    unset status ⇒ 404 JSON  ◄─────┘
//! ```
//!
//! Descent is terminal: once a request moves into a child, only the child's
//! own chain runs. Among the children whose prefix matches, the longest wins;
//! ties go to the one mounted first.

use std::convert::Infallible;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use tracing::{Instrument, info_span};

use crate::error::HttpError;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, HandlerResult};
use crate::middleware::boundary::{self, FaultContext};
use crate::middleware::run_entries;
use crate::node::{App, MountedApp, Mount, Node};
use crate::request::Request;
use crate::response::Response;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Remainder of `path` below `prefix`, respecting segment boundaries.
///
/// `"/a"` owns `"/a"` and `"/a/b"` but not `"/ab"`; `""` owns everything.
pub(crate) fn strip_prefix(prefix: &str, path: &str) -> Option<String> {
    if prefix.is_empty() {
        return Some(path.to_owned());
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/".to_owned())
    } else if rest.starts_with('/') {
        Some(rest.to_owned())
    } else {
        None
    }
}

fn select_child<'a>(children: &'a [Mount], path: &str) -> Option<(&'a Mount, String)> {
    let mut best: Option<(&Mount, String)> = None;
    for mount in children {
        let Some(rest) = strip_prefix(&mount.prefix, path) else { continue };
        if best.as_ref().is_none_or(|(b, _)| mount.prefix.len() > b.prefix.len()) {
            best = Some((mount, rest));
        }
    }
    best
}

/// Follows mount prefixes down from `node`, rewriting the request path.
fn descend(mut node: Arc<Node>, req: &mut Request) -> Arc<Node> {
    loop {
        let next = {
            let st = node.state.read();
            select_child(&st.children, req.path())
                .map(|(m, rest)| (m.prefix.clone(), Arc::clone(&m.node), rest))
        };
        match next {
            Some((prefix, child, rest)) => {
                req.strip_mount(&prefix, rest);
                node = child;
            }
            None => return node,
        }
    }
}

/// The route table as the final link of a chain.
struct RouteEndpoint {
    node: Weak<Node>,
}

impl ErasedHandler for RouteEndpoint {
    fn call(&self, mut req: Request) -> BoxFuture<HandlerResult> {
        let found = self.node.upgrade().and_then(|node| {
            node.state.read().routes.lookup(req.method(), req.path())
        });
        Box::pin(async move {
            match found {
                Some((handler, params)) => {
                    req.params = params;
                    handler.call(req).await
                }
                None => Ok(Response::empty()),
            }
        })
    }
}

/// Runs an already-built request through the tree below `node`.
pub(crate) async fn dispatch(node: Arc<Node>, mut req: Request) -> Response {
    req.fault_sink = node.root().state.read().fault_sink.clone();
    let ctx = FaultContext {
        method: req.method().clone(),
        path: req.original_path().to_owned(),
    };
    let sink = req.fault_sink.clone();

    let node = descend(node, &mut req);
    let entries = node.state.read().chain.snapshot();
    let endpoint: BoxedHandler = Arc::new(RouteEndpoint { node: Arc::downgrade(&node) });

    match run_entries(entries, req, Some(endpoint)).await {
        Ok(res) => finalize(res),
        // Only reachable when middleware was prepended ahead of the boundary.
        Err(err) => {
            boundary::report(&err, &ctx, sink.as_deref());
            boundary::error_response(&err)
        }
    }
}

fn finalize(mut res: Response) -> Response {
    match (res.status_code(), res.body()) {
        (None, None) => boundary::error_response(&HttpError::not_found()),
        (None, Some(_)) => {
            res.set_status(StatusCode::OK);
            res
        }
        _ => res,
    }
}

/// Collects the body, builds the [`Request`] and dispatches it.
///
/// `mount` is stripped from the path first; requests outside it get `404`.
pub(crate) async fn serve<B>(node: Arc<Node>, mount: String, req: http::Request<B>) -> http::Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let (parts, body) = req.into_parts();
    let span = info_span!("request", method = %parts.method, path = %parts.uri.path());

    async move {
        let Some(rest) = strip_prefix(&mount, parts.uri.path()) else {
            return boundary::error_response(&HttpError::not_found()).into_http();
        };

        let limit = node.state.read().body_limit;
        let bytes = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return boundary::error_response(&HttpError::status(StatusCode::PAYLOAD_TOO_LARGE))
                    .into_http();
            }
            Err(e) => {
                return boundary::error_response(&HttpError::bad_request(format!("failed to read body: {e}")))
                    .into_http();
            }
        };

        let mut req = Request::new(parts.method, parts.uri, parts.headers, bytes);
        if !mount.is_empty() {
            req.strip_mount(&mount, rest);
        }
        dispatch(node, req).await.into_http()
    }
    .instrument(span)
    .await
}

impl App {
    /// Handles one request end to end, without a socket.
    ///
    /// This is what the server runs per request, and the simplest way to
    /// drive an app from tests.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        serve(Arc::clone(&self.node), String::new(), req).await
    }
}

impl MountedApp {
    /// Like [`App::handle`], after stripping this view's prefix.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        serve(Arc::clone(&self.app.node), self.prefix.clone(), req).await
    }
}

impl<B> hyper::service::Service<http::Request<B>> for App
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = BoxFuture<Result<Self::Response, Infallible>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let node = Arc::clone(&self.node);
        Box::pin(async move { Ok(serve(node, String::new(), req).await) })
    }
}

impl<B> hyper::service::Service<http::Request<B>> for MountedApp
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = BoxFuture<Result<Self::Response, Infallible>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let node = Arc::clone(&self.app.node);
        let prefix = self.prefix.clone();
        Box::pin(async move { Ok(serve(node, prefix, req).await) })
    }
}
