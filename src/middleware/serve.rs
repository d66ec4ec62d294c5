//! Static files and favicon.
//!
//! Both fall through to `next` when they have nothing to serve, so they can
//! sit anywhere in a chain.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use http::header::{CACHE_CONTROL, HeaderValue};
use http::Method;
use percent_encoding::percent_decode_str;

use crate::error::HttpError;
use crate::handler::{BoxFuture, HandlerResult};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::{ContentType, Response};

/// Serves files below `root` for `GET` and `HEAD`.
#[derive(Clone, Debug)]
pub struct ServeDir {
    root: PathBuf,
    index: String,
}

impl ServeDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), index: "index.html".to_owned() }
    }

    /// File served for directory requests. Defaults to `index.html`.
    pub fn index(mut self, file: impl Into<String>) -> Self {
        self.index = file.into();
        self
    }
}

/// Joins a percent-encoded URL path below `root`, refusing anything that
/// climbs out.
pub(crate) fn safe_join(root: &Path, url_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(url_path).decode_utf8().ok()?;
    let mut out = root.to_path_buf();
    for component in Path::new(decoded.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

async fn read_file(path: &Path) -> Result<Option<Bytes>, HttpError> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(Bytes::from(data))),
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => Ok(None),
        Err(e) => Err(HttpError::from(e)),
    }
}

fn file_response(path: &Path, data: Bytes, head: bool) -> Response {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let mut res = Response::builder().bytes(ContentType::from_extension(ext), data);
    if head {
        res.body = Some(Bytes::new());
    }
    res
}

impl Middleware for ServeDir {
    fn handle(&self, req: Request, next: Next) -> BoxFuture<HandlerResult> {
        let head = req.method() == Method::HEAD;
        if req.method() != Method::GET && !head {
            return Box::pin(next.run(req));
        }
        let Some(mut target) = safe_join(&self.root, req.path()) else {
            return Box::pin(next.run(req));
        };
        let index = self.index.clone();

        Box::pin(async move {
            if tokio::fs::metadata(&target).await.is_ok_and(|m| m.is_dir()) {
                target.push(index);
            }
            match read_file(&target).await? {
                Some(data) => Ok(file_response(&target, data, head)),
                None => next.run(req).await,
            }
        })
    }
}

/// Answers `/favicon.ico` from a single file.
#[derive(Clone, Debug)]
pub struct Favicon {
    path: PathBuf,
    max_age: u32,
}

impl Favicon {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), max_age: 86_400 }
    }

    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = seconds;
        self
    }
}

impl Middleware for Favicon {
    fn handle(&self, req: Request, next: Next) -> BoxFuture<HandlerResult> {
        if req.path() != "/favicon.ico" {
            return Box::pin(next.run(req));
        }
        let path = self.path.clone();
        let max_age = self.max_age;
        Box::pin(async move {
            let Some(data) = read_file(&path).await? else {
                return next.run(req).await;
            };
            let mut res = Response::builder().bytes(ContentType::Icon, data);
            if let Ok(v) = HeaderValue::try_from(format!("public, max-age={max_age}")) {
                res.headers_mut().insert(CACHE_CONTROL, v);
            }
            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::MiddlewareChain;
    use http::StatusCode;

    #[test]
    fn refuses_traversal() {
        let root = Path::new("/srv/www");
        assert_eq!(safe_join(root, "/a/b.js"), Some(PathBuf::from("/srv/www/a/b.js")));
        assert_eq!(safe_join(root, "/./a"), Some(PathBuf::from("/srv/www/a")));
        assert_eq!(safe_join(root, "/../etc/passwd"), None);
        assert_eq!(safe_join(root, "/%2e%2e/etc/passwd"), None);
        assert_eq!(safe_join(root, "/my%20file.js"), Some(PathBuf::from("/srv/www/my file.js")));
    }

    fn chain(mw: impl Middleware) -> MiddlewareChain {
        let mut chain = MiddlewareChain::new();
        chain.push(mw);
        chain
    }

    #[tokio::test]
    async fn serves_files_and_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.js"), "console.log('one');\n").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/index.html"), "<h1>docs</h1>").unwrap();
        let chain = chain(ServeDir::new(dir.path()));

        let res = chain.run(Request::from_parts(Method::GET, "/one.js", ""), None).await.unwrap();
        assert_eq!(res.status_code(), Some(StatusCode::OK));
        assert_eq!(res.header("content-type"), Some("application/javascript"));
        assert_eq!(res.body().unwrap(), "console.log('one');\n");

        let res = chain.run(Request::from_parts(Method::GET, "/docs", ""), None).await.unwrap();
        assert_eq!(res.body().unwrap(), "<h1>docs</h1>");

        let res = chain.run(Request::from_parts(Method::GET, "/missing", ""), None).await.unwrap();
        assert_eq!(res.status_code(), None);

        let res = chain.run(Request::from_parts(Method::POST, "/one.js", ""), None).await.unwrap();
        assert_eq!(res.status_code(), None);
    }

    #[tokio::test]
    async fn favicon_only_answers_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let icon = dir.path().join("favicon.ico");
        std::fs::write(&icon, [0u8, 0, 1, 0]).unwrap();
        let chain = chain(Favicon::new(&icon));

        let res = chain.run(Request::from_parts(Method::GET, "/favicon.ico", ""), None).await.unwrap();
        assert_eq!(res.status_code(), Some(StatusCode::OK));
        assert_eq!(res.header("content-type"), Some("image/x-icon"));
        assert_eq!(res.header("cache-control"), Some("public, max-age=86400"));

        let res = chain.run(Request::from_parts(Method::GET, "/", ""), None).await.unwrap();
        assert_eq!(res.status_code(), None);
    }
}
