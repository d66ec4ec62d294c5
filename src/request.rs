//! Incoming HTTP request type.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::HttpError;
use crate::middleware::boundary::FaultSink;

/// An incoming HTTP request with its body already collected.
///
/// While a request travels down the mount tree the matched prefixes are
/// moved from [`path`](Request::path) to [`mount_path`](Request::mount_path):
/// an app mounted at `/a` that receives `GET /a/b` sees `path() == "/b"`.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) path: String,
    pub(crate) mount_path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) locals: Map<String, Value>,
    pub(crate) fault_sink: Option<Arc<FaultSink>>,
}

impl Request {
    pub(crate) fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        let path = uri.path().to_owned();
        Self {
            method,
            uri,
            path,
            mount_path: String::new(),
            headers,
            body,
            params: HashMap::new(),
            locals: Map::new(),
            fault_sink: None,
        }
    }

    /// Builds a request by hand, mostly useful for driving middleware in tests.
    ///
    /// A `uri` that does not parse is replaced by `/`.
    pub fn from_parts(method: Method, uri: &str, body: impl Into<Bytes>) -> Self {
        let uri: Uri = uri.parse().unwrap_or_else(|_| Uri::from_static("/"));
        Self::new(method, uri, HeaderMap::new(), body.into())
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// Path left after mount prefixes were stripped.
    pub fn path(&self) -> &str { &self.path }

    /// Concatenation of every mount prefix consumed so far (`""` at the root).
    pub fn mount_path(&self) -> &str { &self.mount_path }

    /// The path exactly as the client sent it.
    pub fn original_path(&self) -> &str { self.uri.path() }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> { &self.params }

    /// Per-request values shared between middleware and views.
    pub fn locals(&self) -> &Map<String, Value> { &self.locals }
    pub fn locals_mut(&mut self) -> &mut Map<String, Value> { &mut self.locals }

    pub fn set_local(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.locals.insert(key.into(), value.into());
    }

    /// Parses the body as JSON. A malformed body is a `400 Bad Request`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| HttpError::bad_request(format!("invalid json body: {e}")))
    }

    /// Moves `prefix` from the front of `path` onto `mount_path`.
    pub(crate) fn strip_mount(&mut self, prefix: &str, rest: String) {
        self.mount_path.push_str(prefix);
        self.path = rest;
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("mount_path", &self.mount_path)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
