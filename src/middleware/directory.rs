//! Directory listings.
//!
//! Answers `GET`/`HEAD` on a directory below `root` with its entries, as JSON
//! when the client asks for `application/json` and as an HTML list otherwise.
//! Anything that is not a directory falls through to `next`.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use http::Method;
use http::header::ACCEPT;

use crate::error::HttpError;
use crate::handler::{BoxFuture, HandlerResult};
use crate::middleware::serve::safe_join;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

#[derive(Clone, Debug)]
pub struct Directory {
    root: PathBuf,
    hidden: bool,
}

impl Directory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), hidden: false }
    }

    /// Lists dotfiles too. Off by default.
    pub fn hidden(mut self, show: bool) -> Self {
        self.hidden = show;
        self
    }
}

#[derive(Debug)]
struct Entry {
    name: String,
    dir: bool,
}

async fn list(dir: &Path, hidden: bool) -> Result<Vec<Entry>, HttpError> {
    let mut entries = Vec::new();
    let mut read = tokio::fs::read_dir(dir).await?;
    while let Some(item) = read.next_entry().await? {
        let name = item.file_name().to_string_lossy().into_owned();
        if !hidden && name.starts_with('.') {
            continue;
        }
        let dir = item.file_type().await?.is_dir();
        entries.push(Entry { name, dir });
    }
    entries.sort_by(|a, b| b.dir.cmp(&a.dir).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// `base` is the directory's URL as the client sent it, with a trailing slash.
fn render_html(base: &str, entries: &[Entry]) -> String {
    let title = html_escape(base);
    let mut out = format!("<!DOCTYPE html>\n<title>{title}</title>\n<h1>{title}</h1>\n<ul>\n");
    for entry in entries {
        let slash = if entry.dir { "/" } else { "" };
        let name = html_escape(&entry.name);
        out.push_str(&format!("  <li><a href=\"{}{name}{slash}\">{name}{slash}</a></li>\n", html_escape(base)));
    }
    out.push_str("</ul>\n");
    out
}

impl Middleware for Directory {
    fn handle(&self, req: Request, next: Next) -> BoxFuture<HandlerResult> {
        let head = req.method() == Method::HEAD;
        if req.method() != Method::GET && !head {
            return Box::pin(next.run(req));
        }
        let Some(target) = safe_join(&self.root, req.path()) else {
            return Box::pin(next.run(req));
        };
        let hidden = self.hidden;

        Box::pin(async move {
            if !tokio::fs::metadata(&target).await.is_ok_and(|m| m.is_dir()) {
                return next.run(req).await;
            }
            let entries = list(&target, hidden).await?;
            let wants_json = req.header(ACCEPT.as_str()).is_some_and(|v| v.contains("application/json"));

            let mut res = if wants_json {
                let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
                Response::json(serde_json::to_vec(&names).map_err(HttpError::internal)?)
            } else {
                let mut base = req.original_path().to_owned();
                if !base.ends_with('/') {
                    base.push('/');
                }
                Response::html(render_html(&base, &entries))
            };
            if head {
                res.body = Some(Bytes::new());
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

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("b.js"), "").unwrap();
        std::fs::write(dir.path().join("a <b>.txt"), "").unwrap();
        std::fs::write(dir.path().join(".env"), "").unwrap();
        dir
    }

    #[tokio::test]
    async fn lists_directories_first_and_skips_dotfiles() {
        let dir = fixture();
        let entries = list(dir.path(), false).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["lib", "a <b>.txt", "b.js"]);

        let all = list(dir.path(), true).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn html_listing_escapes_names() {
        let entries = [Entry { name: "a <b>.txt".to_owned(), dir: false }];
        let html = render_html("/docs/", &entries);
        assert!(html.contains(r#"<a href="/docs/a &lt;b&gt;.txt">a &lt;b&gt;.txt</a>"#));
    }

    #[tokio::test]
    async fn files_fall_through() {
        let dir = fixture();
        let mut chain = MiddlewareChain::new();
        chain.push(Directory::new(dir.path()));

        let res = chain.run(Request::from_parts(Method::GET, "/b.js", ""), None).await.unwrap();
        assert_eq!(res.status_code(), None);

        let res = chain.run(Request::from_parts(Method::GET, "/", ""), None).await.unwrap();
        assert_eq!(res.status_code(), Some(StatusCode::OK));
        assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
    }
}
