//! View rendering.
//!
//! warren ships no template language. A [`ViewEngine`] is registered per file
//! extension and receives the resolved template path plus its locals; the
//! app adds `basedir` (the current root's root directory) to those locals so
//! engines with include/extends support can resolve absolute includes.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::HttpError;
use crate::handler::BoxFuture;

/// Renders one template file.
///
/// Any `Fn(PathBuf, Map<String, Value>) -> impl Future<Output = Result<String, HttpError>>`
/// is an engine.
pub trait ViewEngine: Send + Sync + 'static {
    fn render(&self, path: PathBuf, locals: Map<String, Value>) -> BoxFuture<Result<String, HttpError>>;
}

impl<F, Fut> ViewEngine for F
where
    F: Fn(PathBuf, Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, HttpError>> + Send + 'static,
{
    fn render(&self, path: PathBuf, locals: Map<String, Value>) -> BoxFuture<Result<String, HttpError>> {
        Box::pin((self)(path, locals))
    }
}

/// Returns the file contents unchanged. Registered for `html` by default.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawHtml;

impl ViewEngine for RawHtml {
    fn render(&self, path: PathBuf, _locals: Map<String, Value>) -> BoxFuture<Result<String, HttpError>> {
        Box::pin(async move { Ok(tokio::fs::read_to_string(&path).await?) })
    }
}

pub(crate) type SharedEngine = Arc<dyn ViewEngine>;

/// Per-app engine registry.
#[derive(Clone, Default)]
pub struct Views {
    engines: HashMap<String, SharedEngine>,
    default_ext: Option<String>,
}

impl Views {
    pub(crate) fn with_defaults() -> Self {
        let mut views = Self::default();
        views.register("html", RawHtml);
        views
    }

    pub(crate) fn register(&mut self, ext: &str, engine: impl ViewEngine) {
        self.engines.insert(ext.trim_start_matches('.').to_owned(), Arc::new(engine));
    }

    pub(crate) fn engine(&self, ext: &str) -> Option<SharedEngine> {
        self.engines.get(ext).cloned()
    }

    pub(crate) fn set_default_ext(&mut self, ext: &str) {
        self.default_ext = Some(ext.trim_start_matches('.').to_owned());
    }

    pub(crate) fn default_ext(&self) -> Option<&str> {
        self.default_ext.as_deref()
    }
}
