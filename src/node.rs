//! Mountable applications.
//!
//! An [`App`] is a node in a tree. Each node owns its middleware chain, its
//! route table and its asset registry, and holds a non-owning back-reference
//! to the parent it is mounted under:
//!
//! ```text
//!            root (App)            children: Vec<Arc<Node>>   (owning)
//!           /          \
//!      "/a" A          "/docs" D   parent: Weak<Node>          (non-owning)
//!        |
//!    "/b" B
//! ```
//!
//! Everything that depends on tree shape (the root, the root directory, the
//! effective bundler, view engines) is recomputed from the current parent
//! pointers on every call, never cached, so it stays correct no matter the
//! order in which apps are configured and mounted.
//!
//! Configuration is expected to finish before the tree starts serving.
//! Mutating it while requests are in flight is memory-safe but the outcome
//! for those requests is unspecified.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use http::{Method, StatusCode};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::assets::{self, AssetRegistry, Bundler, ServeAssets, SharedBundler};
use crate::error::{ConfigError, HttpError};
use crate::handler::Handler;
use crate::middleware::boundary::SharedFaultSink;
use crate::middleware::{
    BasicAuth, Compress, Cors, Directory, ErrorBoundary, FaultContext, Favicon, Logger, Middleware,
    MiddlewareChain, ServeDir,
};
use crate::request::Request;
use crate::response::Response;
use crate::router::RouteTable;
use crate::view::{ViewEngine, Views};

const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;
const DEFAULT_VIEW_EXT: &str = "html";

// ── Node ──────────────────────────────────────────────────────────────────────

pub(crate) struct Node {
    base_dir: PathBuf,
    pub(crate) state: RwLock<NodeState>,
}

/// An edge of the tree: a child and the prefix it is mounted at.
pub(crate) struct Mount {
    pub(crate) prefix: String,
    pub(crate) node: Arc<Node>,
}

pub(crate) struct NodeState {
    pub(crate) prefix: String,
    pub(crate) parent: Weak<Node>,
    pub(crate) children: Vec<Mount>,
    pub(crate) chain: MiddlewareChain,
    pub(crate) routes: RouteTable,
    pub(crate) assets: AssetRegistry,
    pub(crate) serves_assets: bool,
    pub(crate) bundler: Option<SharedBundler>,
    pub(crate) views: Views,
    pub(crate) root_dir: Option<PathBuf>,
    pub(crate) fault_sink: Option<SharedFaultSink>,
    pub(crate) body_limit: usize,
}

impl Node {
    fn new(base_dir: PathBuf) -> Self {
        let mut chain = MiddlewareChain::new();
        chain.push(ErrorBoundary::new());
        Self {
            base_dir,
            state: RwLock::new(NodeState {
                prefix: String::new(),
                parent: Weak::new(),
                children: Vec::new(),
                chain,
                routes: RouteTable::new(),
                assets: AssetRegistry::new(),
                serves_assets: false,
                bundler: None,
                views: Views::with_defaults(),
                root_dir: None,
                fault_sink: None,
                body_limit: DEFAULT_BODY_LIMIT,
            }),
        }
    }

    pub(crate) fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub(crate) fn parent(&self) -> Option<Arc<Node>> {
        self.state.read().parent.upgrade()
    }

    /// `self`, then each ancestor up to the root.
    pub(crate) fn lineage(self: &Arc<Self>) -> impl Iterator<Item = Arc<Node>> + use<> {
        std::iter::successors(Some(Arc::clone(self)), |n| n.parent())
    }

    /// Walks parent pointers to the ancestor-less node.
    pub(crate) fn root(self: &Arc<Self>) -> Arc<Node> {
        let mut node = Arc::clone(self);
        while let Some(parent) = node.parent() {
            node = parent;
        }
        node
    }

    /// First value `pick` yields on the way from `self` to the root.
    pub(crate) fn nearest<T>(self: &Arc<Self>, pick: impl Fn(&NodeState) -> Option<T>) -> Option<T> {
        self.lineage().find_map(|n| pick(&n.state.read()))
    }
}

// ── App ───────────────────────────────────────────────────────────────────────

/// A mountable application.
///
/// `App` is a cheap handle: clones refer to the same node. Configuration
/// methods take `&self` and return `&Self` so they chain:
///
/// ```rust
/// use warren::{App, HttpError, Request};
///
/// async fn user(req: Request) -> Result<String, HttpError> {
///     Ok(req.param("user").unwrap_or_default().to_owned())
/// }
///
/// let api = App::new();
/// api.logger().get("/:user", user);
///
/// let site = App::new();
/// site.mount("/api", &api).unwrap();
/// assert!(api.root() == site);
/// ```
#[derive(Clone)]
pub struct App {
    pub(crate) node: Arc<Node>,
}

impl App {
    /// An app whose base directory is the process's working directory.
    pub fn new() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::from_base(cwd)
    }

    /// An app rooted at `dir`. Relative paths are resolved against the
    /// working directory.
    pub fn with_base_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let absolute = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir().unwrap_or_default().join(dir)
        };
        Self::from_base(absolute)
    }

    fn from_base(dir: PathBuf) -> Self {
        Self { node: Arc::new(Node::new(assets::normalize(&dir))) }
    }

    // ── Tree ──────────────────────────────────────────────────────────────────

    /// Directory this app resolves relative paths against.
    pub fn base_dir(&self) -> &Path {
        self.node.base_dir()
    }

    /// The current root of the tree this app belongs to.
    pub fn root(&self) -> App {
        App { node: self.node.root() }
    }

    pub fn parent(&self) -> Option<App> {
        self.node.parent().map(|node| App { node })
    }

    pub fn is_root(&self) -> bool {
        self.node.parent().is_none()
    }

    /// Children in mount order.
    pub fn children(&self) -> Vec<App> {
        self.node.state.read().children.iter()
            .map(|m| App { node: Arc::clone(&m.node) })
            .collect()
    }

    /// Prefix this app is mounted at (`""` for a root).
    pub fn mount_prefix(&self) -> String {
        self.node.state.read().prefix.clone()
    }

    /// Overrides the root directory reported by [`root_dir`](Self::root_dir)
    /// for the tree this app is the root of.
    pub fn set_root_dir(&self, dir: impl AsRef<Path>) -> &Self {
        let dir = assets::normalize(&self.node.base_dir.join(dir));
        self.node.state.write().root_dir = Some(dir);
        self
    }

    /// The current root's explicit root directory, or its base directory.
    pub fn root_dir(&self) -> PathBuf {
        let root = self.node.root();
        let explicit = root.state.read().root_dir.clone();
        explicit.unwrap_or_else(|| root.base_dir.clone())
    }

    /// Attaches `child` under `prefix`.
    ///
    /// `prefix` must be empty or begin with `/`; a trailing slash is ignored.
    /// The child's asset registry is merged into this app and every one of
    /// its ancestors.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidMountPath`] for a prefix without leading `/`.
    /// - [`ConfigError::CycleDetected`] when `child` is this app or one of
    ///   its ancestors.
    /// - [`ConfigError::AlreadyMounted`] when `child` already has a parent.
    pub fn mount(&self, prefix: &str, child: &App) -> Result<&Self, ConfigError> {
        let prefix = normalize_prefix(prefix)?;
        if self.node.lineage().any(|n| Arc::ptr_eq(&n, &child.node)) {
            return Err(ConfigError::CycleDetected);
        }

        {
            let mut st = child.node.state.write();
            if st.parent.upgrade().is_some() {
                return Err(ConfigError::AlreadyMounted(st.prefix.clone()));
            }
            st.parent = Arc::downgrade(&self.node);
            st.prefix = prefix.clone();
        }
        self.node.state.write().children.push(Mount {
            prefix: prefix.clone(),
            node: Arc::clone(&child.node),
        });

        let contributed = child.node.state.read().assets.clone();
        for node in self.node.lineage() {
            node.state.write().assets.merge(&contributed);
        }

        debug!(prefix = %prefix, assets = contributed.len(), "app mounted");
        Ok(self)
    }

    /// The single-argument mount: a view of this app that can be attached
    /// at `prefix` inside a foreign hyper service.
    pub fn mounted_at(&self, prefix: &str) -> Result<MountedApp, ConfigError> {
        Ok(MountedApp { prefix: normalize_prefix(prefix)?, app: self.clone() })
    }

    // ── Middleware ────────────────────────────────────────────────────────────

    /// Appends `mw` to this app's chain.
    pub fn middleware(&self, mw: impl Middleware) -> &Self {
        self.node.state.write().chain.push(mw);
        self
    }

    /// Puts `mw` at the head of the chain, ahead of the error boundary.
    pub fn prepend(&self, mw: impl Middleware) -> &Self {
        self.node.state.write().chain.prepend(mw);
        self
    }

    /// Access log for every request.
    pub fn logger(&self) -> &Self {
        self.middleware(Logger::new())
    }

    /// Access log for requests `filter` accepts.
    pub fn logger_with(&self, filter: impl Fn(&Request) -> bool + Send + Sync + 'static) -> &Self {
        self.middleware(Logger::new().filter(filter))
    }

    pub fn auth(&self, user: &str, pass: &str) -> &Self {
        self.middleware(BasicAuth::new(user, pass))
    }

    pub fn cors(&self, cors: Cors) -> &Self {
        self.middleware(cors)
    }

    pub fn compress(&self, compress: Compress) -> &Self {
        self.middleware(compress)
    }

    /// Serves files from `dir`, relative to the base directory.
    pub fn serve_static(&self, dir: impl AsRef<Path>) -> &Self {
        self.middleware(ServeDir::new(self.node.base_dir.join(dir)))
    }

    /// Serves files below `dir` and lists directories that have no
    /// `index.html`, relative to the base directory.
    pub fn directory(&self, dir: impl AsRef<Path>) -> &Self {
        let root = self.node.base_dir.join(dir);
        self.middleware(ServeDir::new(root.clone())).middleware(Directory::new(root))
    }

    /// Serves `/favicon.ico` from `path`, relative to the base directory.
    pub fn favicon(&self, path: impl AsRef<Path>) -> &Self {
        self.middleware(Favicon::new(self.node.base_dir.join(path)))
    }

    /// Maximum request body size in bytes. Larger bodies get `413`.
    pub fn body_limit(&self, bytes: usize) -> &Self {
        self.node.state.write().body_limit = bytes;
        self
    }

    /// Callback for unexpected (non-exposed, 5xx) errors. Consulted on the
    /// root of the tree at the time of each request.
    pub fn on_error(&self, sink: impl Fn(&HttpError, &FaultContext) + Send + Sync + 'static) -> &Self {
        self.node.state.write().fault_sink = Some(Arc::new(sink));
        self
    }

    // ── Routes ────────────────────────────────────────────────────────────────

    /// Registers `handler` for `method` and `pattern`.
    ///
    /// Path parameters use `:name` (or `{name}`) syntax and are available
    /// through [`Request::param`].
    pub fn route(&self, method: Method, pattern: &str, handler: impl Handler) -> Result<&Self, ConfigError> {
        self.insert_route(Some(method), pattern, handler)
    }

    fn insert_route(&self, method: Option<Method>, pattern: &str, handler: impl Handler) -> Result<&Self, ConfigError> {
        self.node.state.write()
            .routes
            .insert(method, pattern, handler.into_boxed_handler())?;
        Ok(self)
    }

    fn add(&self, method: Option<Method>, pattern: &str, handler: impl Handler) -> &Self {
        self.insert_route(method, pattern, handler)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// # Panics
    ///
    /// Panics if `pattern` is malformed or already registered for this
    /// method; use [`route`](Self::route) to handle that as an error.
    pub fn get(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.add(Some(Method::GET), pattern, handler)
    }

    /// # Panics
    ///
    /// See [`get`](Self::get).
    pub fn post(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.add(Some(Method::POST), pattern, handler)
    }

    /// # Panics
    ///
    /// See [`get`](Self::get).
    pub fn put(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.add(Some(Method::PUT), pattern, handler)
    }

    /// # Panics
    ///
    /// See [`get`](Self::get).
    pub fn patch(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.add(Some(Method::PATCH), pattern, handler)
    }

    /// # Panics
    ///
    /// See [`get`](Self::get).
    pub fn delete(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.add(Some(Method::DELETE), pattern, handler)
    }

    /// # Panics
    ///
    /// See [`get`](Self::get).
    pub fn head(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.add(Some(Method::HEAD), pattern, handler)
    }

    /// # Panics
    ///
    /// See [`get`](Self::get).
    pub fn options(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.add(Some(Method::OPTIONS), pattern, handler)
    }

    /// Any method. Method-specific routes on the same path take precedence.
    ///
    /// # Panics
    ///
    /// See [`get`](Self::get).
    pub fn all(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.add(None, pattern, handler)
    }

    // ── Views ─────────────────────────────────────────────────────────────────

    /// Registers a route that renders `view` and responds with the HTML.
    ///
    /// Route parameters are merged into the request locals (locals win) and
    /// passed to the engine.
    pub fn view(&self, method: Method, pattern: &str, view: &str) -> Result<&Self, ConfigError> {
        let node = Arc::downgrade(&self.node);
        let view: Arc<str> = Arc::from(view);
        let handler = move |req: Request| {
            let node = node.clone();
            let view = Arc::clone(&view);
            async move {
                let node = node.upgrade().ok_or_else(|| {
                    HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, "app dropped while serving")
                })?;
                let mut locals: Map<String, Value> = req.params().iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                locals.extend(req.locals().clone());
                let html = App { node }.render(&view, locals).await?;
                Ok::<_, HttpError>(Response::html(html))
            }
        };
        self.route(method, pattern, handler)
    }

    /// Registers `engine` for templates ending in `.ext`.
    pub fn engine(&self, ext: &str, engine: impl ViewEngine) -> &Self {
        self.node.state.write().views.register(ext, engine);
        self
    }

    /// Extension assumed for view names without one. Defaults to `html`.
    pub fn default_view_ext(&self, ext: &str) -> &Self {
        self.node.state.write().views.set_default_ext(ext);
        self
    }

    /// Renders `view` (relative to the base directory) with `locals`.
    ///
    /// The engine is picked by extension, looking at this app first and then
    /// its ancestors. `basedir` is set to the current [`root_dir`](Self::root_dir).
    pub async fn render(&self, view: &str, mut locals: Map<String, Value>) -> Result<String, HttpError> {
        let mut path = self.node.base_dir.join(view);
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_owned(),
            None => {
                let ext = self.node
                    .nearest(|st| st.views.default_ext().map(str::to_owned))
                    .unwrap_or_else(|| DEFAULT_VIEW_EXT.to_owned());
                path.set_extension(&ext);
                ext
            }
        };

        let engine = self.node.nearest(|st| st.views.engine(&ext)).ok_or_else(|| {
            HttpError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("no view engine registered for `.{ext}`"),
            )
        })?;

        locals.insert(
            "basedir".to_owned(),
            Value::String(self.root_dir().to_string_lossy().into_owned()),
        );
        engine.render(path, locals).await
    }

    // ── Assets ────────────────────────────────────────────────────────────────

    /// Sets the transform used for this app's assets and, unless they set
    /// their own, for every descendant's.
    pub fn bundler(&self, bundler: impl Bundler) -> &Self {
        self.node.state.write().bundler = Some(Arc::new(bundler));
        self
    }

    /// Registers every file matching `pattern` (relative to the base
    /// directory) as a bundle entry point and starts serving them.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidAssetPattern`] for malformed globs,
    /// [`ConfigError::AssetScan`] when the directory walk fails.
    pub fn bundle(&self, pattern: &str) -> Result<&Self, ConfigError> {
        if cfg!(not(debug_assertions)) {
            warn!(pattern, "assets are bundled on request; consider pre-compiling for production");
        }
        for path in assets::expand(&self.node.base_dir, pattern)? {
            self.register_asset(path);
        }
        Ok(self)
    }

    /// Registers one asset path (relative to the base directory) and makes
    /// it visible to this app and all of its current ancestors.
    pub fn register_asset(&self, path: impl AsRef<Path>) -> &Self {
        let path = assets::normalize(&self.node.base_dir.join(path));
        for node in self.node.lineage() {
            node.state.write().assets.insert(path.clone());
        }
        self.serve_assets();
        self
    }

    /// Asset identifiers contributed by this app and its descendants.
    pub fn assets(&self) -> Vec<PathBuf> {
        self.node.state.read().assets.to_vec()
    }

    fn serve_assets(&self) {
        let mut st = self.node.state.write();
        if !st.serves_assets {
            st.serves_assets = true;
            st.chain.push(ServeAssets { node: Arc::downgrade(&self.node) });
        }
    }
}

impl Default for App {
    fn default() -> Self { Self::new() }
}

/// Handles compare by identity.
impl PartialEq for App {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for App {}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.node.state.read();
        f.debug_struct("App")
            .field("base_dir", &self.node.base_dir)
            .field("prefix", &st.prefix)
            .field("children", &st.children.len())
            .field("routes", &st.routes.len())
            .field("middleware", &st.chain.len())
            .finish()
    }
}

/// A view of an [`App`] attached at a fixed prefix inside a foreign service.
///
/// Requests outside the prefix are answered with `404`.
#[derive(Clone, Debug)]
pub struct MountedApp {
    pub(crate) prefix: String,
    pub(crate) app: App,
}

impl MountedApp {
    pub fn prefix(&self) -> &str { &self.prefix }
    pub fn app(&self) -> &App { &self.app }
}

/// `""` and `"/"` mean "everything"; otherwise a leading `/` is required and
/// a trailing one is dropped.
pub(crate) fn normalize_prefix(prefix: &str) -> Result<String, ConfigError> {
    if prefix.is_empty() {
        return Ok(String::new());
    }
    if !prefix.starts_with('/') {
        return Err(ConfigError::InvalidMountPath(prefix.to_owned()));
    }
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() && prefix != "/" {
        return Err(ConfigError::EmptyMountPath(prefix.to_owned()));
    }
    Ok(trimmed.to_owned())
}
