//! Radix-tree route table.
//!
//! One tree per HTTP method, plus one tree for routes registered with
//! [`App::all`](crate::App::all). O(path-length) lookup via [`matchit`].
//! Method-specific routes win over `all` routes for the same path, and `GET`
//! routes also answer `HEAD`.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;

use crate::error::ConfigError;
use crate::handler::BoxedHandler;

/// Binds `{method, pattern}` pairs to handlers.
#[derive(Default)]
pub struct RouteTable {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    any: MatchitRouter<BoxedHandler>,
    len: usize,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `method` (or every method when `None`).
    ///
    /// Patterns accept `:name` / `*rest` segments as well as matchit's own
    /// `{name}` / `{*rest}` syntax.
    pub fn insert(
        &mut self,
        method: Option<Method>,
        pattern: &str,
        handler: BoxedHandler,
    ) -> Result<(), ConfigError> {
        let normalized = normalize_pattern(pattern)?;
        let tree = match method {
            Some(m) => self.routes.entry(m).or_default(),
            None => &mut self.any,
        };
        tree.insert(normalized, handler).map_err(|e| ConfigError::InvalidRoute {
            path: pattern.to_owned(),
            reason: e.to_string(),
        })?;
        self.len += 1;
        Ok(())
    }

    /// Resolves `{method, path}` to a handler and its extracted parameters.
    ///
    /// Parameter values are percent-decoded.
    pub fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree_at = |m: &Method| self.routes.get(m).and_then(|tree| tree.at(path).ok());
        let matched = tree_at(method)
            .or_else(|| if method == Method::HEAD { tree_at(&Method::GET) } else { None })
            .or_else(|| self.any.at(path).ok())?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), percent_decode_str(v).decode_utf8_lossy().into_owned()))
            .collect();
        Some((handler, params))
    }

    pub fn len(&self) -> usize { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }
}

/// Rewrites `/users/:id/*rest` into `/users/{id}/{*rest}`.
fn normalize_pattern(pattern: &str) -> Result<String, ConfigError> {
    if !pattern.starts_with('/') {
        return Err(ConfigError::InvalidRoute {
            path: pattern.to_owned(),
            reason: "route must begin with '/'".to_owned(),
        });
    }
    let segments: Vec<String> = pattern
        .split('/')
        .map(|seg| {
            if let Some(name) = seg.strip_prefix(':') {
                format!("{{{name}}}")
            } else if let Some(name) = seg.strip_prefix('*') {
                format!("{{*{name}}}")
            } else {
                seg.to_owned()
            }
        })
        .collect();
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::request::Request;
    use crate::error::HttpError;

    async fn ok(_req: Request) -> Result<&'static str, HttpError> {
        Ok("ok")
    }

    #[test]
    fn rewrites_colon_params() {
        assert_eq!(normalize_pattern("/:user").unwrap(), "/{user}");
        assert_eq!(normalize_pattern("/a/:b/c/*rest").unwrap(), "/a/{b}/c/{*rest}");
        assert_eq!(normalize_pattern("/plain/{id}").unwrap(), "/plain/{id}");
        assert!(normalize_pattern("user").is_err());
    }

    #[test]
    fn extracts_params() {
        let mut table = RouteTable::new();
        table.insert(Some(Method::POST), "/:user", ok.into_boxed_handler()).unwrap();

        let (_, params) = table.lookup(&Method::POST, "/matt").unwrap();
        assert_eq!(params.get("user").map(String::as_str), Some("matt"));
        assert!(table.lookup(&Method::GET, "/matt").is_none());
    }

    #[test]
    fn same_path_different_methods() {
        let mut table = RouteTable::new();
        table.insert(Some(Method::GET), "/user", ok.into_boxed_handler()).unwrap();
        table.insert(Some(Method::POST), "/user", ok.into_boxed_handler()).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.lookup(&Method::GET, "/user").is_some());
        assert!(table.lookup(&Method::POST, "/user").is_some());
        assert!(table.lookup(&Method::DELETE, "/user").is_none());
    }

    #[test]
    fn decodes_param_values() {
        let mut table = RouteTable::new();
        table.insert(Some(Method::GET), "/files/:name", ok.into_boxed_handler()).unwrap();

        let (_, params) = table.lookup(&Method::GET, "/files/my%20notes%40home").unwrap();
        assert_eq!(params["name"], "my notes@home");
    }

    #[test]
    fn head_falls_back_to_get() {
        let mut table = RouteTable::new();
        table.insert(Some(Method::GET), "/user", ok.into_boxed_handler()).unwrap();
        table.insert(None, "/other", ok.into_boxed_handler()).unwrap();

        assert!(table.lookup(&Method::HEAD, "/user").is_some());
        assert!(table.lookup(&Method::HEAD, "/other").is_some());
        assert!(table.lookup(&Method::POST, "/user").is_none());
    }

    #[test]
    fn any_method_is_a_fallback() {
        let mut table = RouteTable::new();
        table.insert(None, "/ping", ok.into_boxed_handler()).unwrap();
        assert!(table.lookup(&Method::PATCH, "/ping").is_some());
    }

    #[test]
    fn duplicate_route_is_a_config_error() {
        let mut table = RouteTable::new();
        table.insert(Some(Method::GET), "/x", ok.into_boxed_handler()).unwrap();
        let err = table.insert(Some(Method::GET), "/x", ok.into_boxed_handler()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRoute { .. }));
    }
}
