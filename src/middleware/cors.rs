//! Cross-origin resource sharing.

use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD,
    HeaderValue, ORIGIN, VARY,
};
use http::{Method, StatusCode};

use crate::handler::{BoxFuture, HandlerResult};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

const DEFAULT_METHODS: &str = "GET,HEAD,PUT,POST,DELETE,PATCH";

/// CORS policy.
///
/// Without an explicit origin the request's `Origin` is echoed back.
#[derive(Clone, Debug, Default)]
pub struct Cors {
    origin: Option<String>,
    methods: Option<String>,
    headers: Option<String>,
    max_age: Option<u32>,
}

impl Cors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn methods(mut self, methods: &[Method]) -> Self {
        let list: Vec<&str> = methods.iter().map(Method::as_str).collect();
        self.methods = Some(list.join(","));
        self
    }

    pub fn allow_headers(mut self, headers: &[&str]) -> Self {
        self.headers = Some(headers.join(","));
        self
    }

    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = Some(seconds);
        self
    }

    fn allow_origin(&self, req: &Request) -> Option<HeaderValue> {
        let origin = req.header(ORIGIN.as_str())?;
        let value = self.origin.as_deref().unwrap_or(origin);
        HeaderValue::try_from(value).ok()
    }

    fn preflight(&self, req: &Request, origin: HeaderValue) -> Response {
        let mut res = Response::status(StatusCode::NO_CONTENT);
        let headers = res.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(VARY, HeaderValue::from_static("Origin"));
        let methods = self.methods.as_deref().unwrap_or(DEFAULT_METHODS);
        if let Ok(v) = HeaderValue::try_from(methods) {
            headers.insert(ACCESS_CONTROL_ALLOW_METHODS, v);
        }
        let allowed = self.headers.as_deref()
            .or_else(|| req.header(ACCESS_CONTROL_REQUEST_HEADERS.as_str()));
        if let Some(v) = allowed.and_then(|h| HeaderValue::try_from(h).ok()) {
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, v);
        }
        if let Some(age) = self.max_age {
            headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from(age));
        }
        res
    }
}

impl Middleware for Cors {
    fn handle(&self, req: Request, next: Next) -> BoxFuture<HandlerResult> {
        let Some(origin) = self.allow_origin(&req) else {
            return Box::pin(next.run(req));
        };

        let is_preflight = req.method() == Method::OPTIONS
            && req.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD);
        if is_preflight {
            let res = self.preflight(&req, origin);
            return Box::pin(async move { Ok(res) });
        }

        Box::pin(async move {
            let mut res = next.run(req).await?;
            res.headers_mut().insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            res.headers_mut().append(VARY, HeaderValue::from_static("Origin"));
            Ok(res)
        })
    }
}
