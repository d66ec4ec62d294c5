//! JSON error boundary.
//!
//! Every [`App`](crate::App) starts with one of these at the head of its
//! chain. It turns
//!
//! - an unanswered request (no status, or `404` with no body) into a
//!   `404 Not Found` error, and
//! - any [`HttpError`] raised below it into a JSON body of the form
//!   `{"name", "message", "status", "code"}`.
//!
//! Unexpected errors (not exposed, status >= 500) are logged and handed to
//! the fault sink of the app tree's current root.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Method, StatusCode};
use tracing::error;

use crate::error::HttpError;
use crate::handler::{BoxFuture, HandlerResult};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Callback notified of unexpected errors.
pub type FaultSink = dyn Fn(&HttpError, &FaultContext) + Send + Sync + 'static;

/// What the fault sink learns about the failed request.
#[derive(Debug, Clone)]
pub struct FaultContext {
    pub method: Method,
    pub path: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorBoundary;

impl ErrorBoundary {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for ErrorBoundary {
    fn handle(&self, req: Request, next: Next) -> BoxFuture<HandlerResult> {
        Box::pin(async move {
            let ctx = FaultContext {
                method: req.method().clone(),
                path: req.original_path().to_owned(),
            };
            let sink = req.fault_sink.clone();

            let outcome = match next.run(req).await {
                Ok(res) => check_answered(res),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(res) => Ok(res),
                Err(err) => {
                    report(&err, &ctx, sink.as_deref());
                    Ok(error_response(&err))
                }
            }
        })
    }
}

/// An unset status or a bodiless 404 means nobody handled the request.
fn check_answered(mut res: Response) -> HandlerResult {
    match res.status_code() {
        None if res.body().is_none() => Err(HttpError::not_found()),
        None => {
            res.set_status(StatusCode::OK);
            Ok(res)
        }
        Some(StatusCode::NOT_FOUND) if res.body().is_none() => Err(HttpError::not_found()),
        Some(_) => Ok(res),
    }
}

pub(crate) fn report(err: &HttpError, ctx: &FaultContext, sink: Option<&FaultSink>) {
    if !err.is_unexpected() {
        return;
    }
    error!(
        method = %ctx.method,
        path = %ctx.path,
        status = err.status_code().as_u16(),
        error = %err,
        "unhandled error",
    );
    if let Some(sink) = sink {
        sink(err, ctx);
    }
}

/// Serialises `err` into a safe, bounded response.
pub(crate) fn error_response(err: &HttpError) -> Response {
    let body = serde_json::to_vec(&err.to_body())
        .unwrap_or_else(|_| br#"{"message":"Internal Server Error"}"#.to_vec());
    let mut res = Response::status(err.status_code());
    for (name, value) in err.headers() {
        res.headers.append(name, value.clone());
    }
    res.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    res.body = Some(Bytes::from(body));
    res
}

/// Shared handle used when building requests.
pub(crate) type SharedFaultSink = Arc<FaultSink>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::MiddlewareChain;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chain_failing_with(status: StatusCode, message: &'static str) -> MiddlewareChain {
        let mut chain = MiddlewareChain::new();
        chain.push(ErrorBoundary::new());
        chain.push(move |_req: Request, _next: Next| async move {
            Err::<Response, _>(HttpError::new(status, message))
        });
        chain
    }

    fn request_with_sink(count: &Arc<AtomicUsize>) -> Request {
        let mut req = Request::from_parts(Method::GET, "/boom", "");
        let count = Arc::clone(count);
        let sink: SharedFaultSink = Arc::new(move |_err: &HttpError, _ctx: &FaultContext| {
            count.fetch_add(1, Ordering::SeqCst);
        });
        req.fault_sink = Some(sink);
        req
    }

    #[tokio::test]
    async fn client_error_keeps_message_and_skips_sink() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = chain_failing_with(StatusCode::FORBIDDEN, "you shall not pass");

        let res = chain.run(request_with_sink(&calls), None).await.unwrap();
        assert_eq!(res.status_code(), Some(StatusCode::FORBIDDEN));
        let body = std::str::from_utf8(res.body().unwrap()).unwrap();
        assert!(body.contains("you shall not pass"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn server_error_is_generic_and_reported() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = chain_failing_with(StatusCode::INTERNAL_SERVER_ERROR, "user is not defined");

        let res = chain.run(request_with_sink(&calls), None).await.unwrap();
        assert_eq!(res.status_code(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        let body = std::str::from_utf8(res.body().unwrap()).unwrap();
        assert!(body.contains("Internal Server Error"));
        assert!(!body.contains("user is not defined"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unanswered_request_is_not_found() {
        let mut chain = MiddlewareChain::new();
        chain.push(ErrorBoundary::new());
        let res = chain.run(Request::from_parts(Method::POST, "/matt", ""), None).await.unwrap();
        assert_eq!(res.status_code(), Some(StatusCode::NOT_FOUND));
        let body: serde_json::Value = serde_json::from_slice(res.body().unwrap()).unwrap();
        assert_eq!(body["message"], "Not Found");
        assert_eq!(body["name"], "NotFoundError");
    }

    #[tokio::test]
    async fn error_headers_reach_the_response() {
        let mut chain = MiddlewareChain::new();
        chain.push(ErrorBoundary::new());
        chain.push(|_req: Request, _next: Next| async {
            Err::<Response, _>(HttpError::status(StatusCode::UNAUTHORIZED).with_header(
                http::header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic"),
            ))
        });
        let res = chain.run(Request::from_parts(Method::GET, "/", ""), None).await.unwrap();
        assert_eq!(res.header("www-authenticate"), Some("Basic"));
    }
}
