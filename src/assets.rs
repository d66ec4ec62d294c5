//! Shared asset registry and bundling.
//!
//! Apps register bundle entry points with [`App::bundle`](crate::App::bundle)
//! (a glob) or [`App::register_asset`](crate::App::register_asset). Every
//! identifier is written to the registering app *and* to each of its current
//! ancestors, and mounting an app merges its registry into its new
//! ancestors. The root therefore always sees every asset in the tree, in
//! whatever order mounts and registrations happened.
//!
//! At request time a `GET` whose path resolves to a registered identifier is
//! answered by the nearest [`Bundler`] on the way to the root.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use http::{Method, StatusCode};
use regex::Regex;
use tracing::debug;

use crate::error::{ConfigError, HttpError};
use crate::handler::{BoxFuture, HandlerResult};
use crate::middleware::serve::safe_join;
use crate::middleware::{Middleware, Next};
use crate::node::Node;
use crate::request::Request;
use crate::response::{ContentType, Response};

// ── Registry ──────────────────────────────────────────────────────────────────

/// Deduplicated, insertion-ordered set of asset paths.
#[derive(Clone, Debug, Default)]
pub struct AssetRegistry {
    order: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `path`; returns `false` if it was already present.
    pub fn insert(&mut self, path: PathBuf) -> bool {
        if self.seen.contains(&path) {
            return false;
        }
        self.seen.insert(path.clone());
        self.order.push(path);
        true
    }

    /// Union with `other`, keeping first-seen order.
    pub fn merge(&mut self, other: &AssetRegistry) {
        for path in &other.order {
            self.insert(path.clone());
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.seen.contains(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.order.iter().map(PathBuf::as_path)
    }

    pub fn to_vec(&self) -> Vec<PathBuf> {
        self.order.clone()
    }

    pub fn len(&self) -> usize { self.order.len() }
    pub fn is_empty(&self) -> bool { self.order.is_empty() }
}

/// Lexically resolves `.` and `..` without touching the filesystem.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ── Glob expansion ────────────────────────────────────────────────────────────

/// Compiles a glob into an anchored regex.
///
/// Supports `*` (within one segment), `**` (any depth), `?` and `{a,b}`.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidAssetPattern {
        pattern: pattern.to_owned(),
        reason: reason.to_owned(),
    };

    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    let mut depth = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    re.push_str("(?:.*/)?");
                } else {
                    re.push_str(".*");
                }
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '{' => {
                depth += 1;
                re.push_str("(?:");
            }
            '}' if depth > 0 => {
                depth -= 1;
                re.push(')');
            }
            ',' if depth > 0 => re.push('|'),
            '}' => return Err(invalid("unbalanced '}'")),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    if depth != 0 {
        return Err(invalid("unclosed '{'"));
    }
    re.push('$');
    Regex::new(&re).map_err(|e| invalid(&e.to_string()))
}

/// Longest leading run of segments without glob syntax.
fn literal_dir(pattern: &str) -> PathBuf {
    let is_meta = |seg: &str| seg.contains(['*', '?', '{', '}']);
    let segments: Vec<&str> = pattern.split('/').collect();
    let literal = segments
        .iter()
        .take(segments.len().saturating_sub(1))
        .take_while(|seg| !is_meta(seg))
        .copied()
        .collect::<Vec<_>>()
        .join("/");
    if literal.is_empty() && pattern.starts_with('/') {
        PathBuf::from("/")
    } else {
        PathBuf::from(literal)
    }
}

/// Expands `pattern` relative to `base` into matching files, sorted.
pub(crate) fn expand(base: &Path, pattern: &str) -> Result<Vec<PathBuf>, ConfigError> {
    let full = normalize(&base.join(pattern));
    let full = full.to_string_lossy().replace('\\', "/");
    let matcher = glob_to_regex(&full)?;
    let start = literal_dir(&full);

    let mut found = Vec::new();
    if start.is_dir() {
        walk(&start, &matcher, &mut found)?;
    }
    found.sort();
    debug!(pattern, matched = found.len(), "asset pattern expanded");
    Ok(found)
}

fn walk(dir: &Path, matcher: &Regex, found: &mut Vec<PathBuf>) -> Result<(), ConfigError> {
    let scan_err = |source| ConfigError::AssetScan {
        dir: dir.display().to_string(),
        source,
    };
    for entry in std::fs::read_dir(dir).map_err(scan_err)? {
        let entry = entry.map_err(scan_err)?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(scan_err)?;
        if file_type.is_dir() {
            walk(&path, matcher, found)?;
        } else if matcher.is_match(&path.to_string_lossy().replace('\\', "/")) {
            found.push(path);
        }
    }
    Ok(())
}

// ── Bundler ───────────────────────────────────────────────────────────────────

/// The file handed to a [`Bundler`].
#[derive(Clone, Debug)]
pub struct BundleInput {
    /// Absolute path of the entry point.
    pub path: PathBuf,
    /// File extension without the dot (`"js"`, `"css"`).
    pub kind: String,
    /// Base directory of the app serving the request.
    pub root: PathBuf,
}

/// What a [`Bundler`] produces.
#[derive(Clone, Debug)]
pub struct Bundled {
    pub src: Bytes,
    /// Extension deciding the response content type.
    pub kind: String,
}

/// Transforms an asset entry point into servable source.
///
/// Any `Fn(BundleInput) -> impl Future<Output = Result<Bundled, HttpError>>`
/// is a bundler.
pub trait Bundler: Send + Sync + 'static {
    fn transform(&self, file: BundleInput) -> BoxFuture<Result<Bundled, HttpError>>;
}

impl<F, Fut> Bundler for F
where
    F: Fn(BundleInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bundled, HttpError>> + Send + 'static,
{
    fn transform(&self, file: BundleInput) -> BoxFuture<Result<Bundled, HttpError>> {
        Box::pin((self)(file))
    }
}

/// Serves the entry point unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct Passthrough;

impl Bundler for Passthrough {
    fn transform(&self, file: BundleInput) -> BoxFuture<Result<Bundled, HttpError>> {
        Box::pin(async move {
            let src = tokio::fs::read(&file.path).await?;
            Ok(Bundled { src: Bytes::from(src), kind: file.kind })
        })
    }
}

// ── Asset-serving middleware ──────────────────────────────────────────────────

/// Answers `GET` requests for registered assets through the effective bundler.
pub(crate) struct ServeAssets {
    pub(crate) node: Weak<Node>,
}

impl Middleware for ServeAssets {
    fn handle(&self, req: Request, next: Next) -> BoxFuture<HandlerResult> {
        if req.method() != Method::GET {
            return Box::pin(next.run(req));
        }
        let Some(node) = self.node.upgrade() else {
            return Box::pin(next.run(req));
        };
        let Some(candidate) = safe_join(node.base_dir(), req.path()) else {
            return Box::pin(next.run(req));
        };
        if !node.root().state.read().assets.contains(&candidate) {
            return Box::pin(next.run(req));
        }

        let bundler = node.nearest(|st| st.bundler.clone());
        let root = node.base_dir().to_path_buf();
        Box::pin(async move {
            let Some(bundler) = bundler else {
                return Err(HttpError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("no bundler configured for {}", candidate.display()),
                ));
            };
            let kind = candidate
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_owned();
            let out = bundler.transform(BundleInput { path: candidate, kind, root }).await?;
            Ok(Response::builder().bytes(ContentType::from_extension(&out.kind), out.src))
        })
    }
}

pub(crate) type SharedBundler = Arc<dyn Bundler>;
