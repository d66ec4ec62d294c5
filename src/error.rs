//! Error types.
//!
//! Three families:
//!
//! - [`ConfigError`]: raised synchronously while an [`App`](crate::App) is
//!   being configured (bad mount path, cyclic mount, malformed route). Never
//!   produced while serving a request.
//! - [`HttpError`]: raised by handlers and middleware while serving a
//!   request. Carries a status and an `expose` flag; the error boundary turns
//!   it into a bounded JSON body.
//! - [`Error`]: infrastructure failures from [`Server`](crate::Server):
//!   binding to a port, reading the environment.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde::Serialize;

/// The error type returned by warren's infrastructure operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Invalid setup, detected while the application tree is being built.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("mount path must begin with '/' (got `{0}`)")]
    InvalidMountPath(String),

    #[error("mount path `{0}` has no segments; use \"/\" to mount at the root")]
    EmptyMountPath(String),

    #[error("cycle detected: an app cannot be mounted inside itself or one of its descendants")]
    CycleDetected,

    #[error("already mounted: app is attached under `{0}`")]
    AlreadyMounted(String),

    #[error("invalid route `{path}`: {reason}")]
    InvalidRoute { path: String, reason: String },

    #[error("invalid asset pattern `{pattern}`: {reason}")]
    InvalidAssetPattern { pattern: String, reason: String },

    #[error("asset scan failed under `{dir}`: {source}")]
    AssetScan {
        dir: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid environment variable {name}={value:?}")]
    InvalidEnv { name: &'static str, value: String },
}

// ── HttpError ─────────────────────────────────────────────────────────────────

/// An error raised while handling a request.
///
/// ```rust
/// use warren::HttpError;
/// use http::StatusCode;
///
/// let err = HttpError::new(StatusCode::FORBIDDEN, "you shall not pass");
/// assert!(err.expose());
/// assert_eq!(err.name(), "ForbiddenError");
/// ```
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    name: Cow<'static, str>,
    message: Cow<'static, str>,
    expose: bool,
    code: Option<String>,
    headers: HeaderMap,
    extra: BTreeMap<String, serde_json::Value>,
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl HttpError {
    /// An error with `status` and a caller-chosen `message`.
    ///
    /// `expose` defaults to `true` for 4xx and `false` for 5xx.
    pub fn new(status: StatusCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            name: Cow::Owned(error_name(status)),
            message: message.into(),
            expose: status.as_u16() < 500,
            code: None,
            headers: HeaderMap::new(),
            extra: BTreeMap::new(),
            source: None,
        }
    }

    /// An error whose message is the canonical reason phrase of `status`.
    pub fn status(status: StatusCode) -> Self {
        Self::new(status, status.canonical_reason().unwrap_or("Unknown Error"))
    }

    pub fn not_found() -> Self {
        Self::status(StatusCode::NOT_FOUND)
    }

    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Wraps an arbitrary fault as a non-exposed 500.
    ///
    /// The original error is kept as [`source`](std::error::Error::source)
    /// and its text is the internal message, but clients only ever see
    /// `"Internal Server Error"`.
    pub fn internal<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut e = Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
        e.source = Some(Arc::new(err));
        e
    }

    /// Overrides whether the message may be shown to clients.
    pub fn with_expose(mut self, expose: bool) -> Self {
        self.expose = expose;
        self
    }

    /// Attaches a machine-readable `code` (e.g. `"ENOENT"`).
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attaches a header that the error boundary copies onto the response.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attaches an extra field. Serialised only when the error is exposed.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn name(&self) -> &str { &self.name }
    pub fn message(&self) -> &str { &self.message }
    pub fn expose(&self) -> bool { self.expose }
    pub fn code(&self) -> Option<&str> { self.code.as_deref() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    /// `true` for faults nobody anticipated: not exposed and 5xx.
    pub fn is_unexpected(&self) -> bool {
        !self.expose && self.status.is_server_error()
    }

    /// The whitelisted JSON body sent to clients.
    pub fn to_body(&self) -> ErrorBody<'_> {
        let message = if self.expose {
            self.message.as_ref()
        } else {
            self.status.canonical_reason().unwrap_or("Internal Server Error")
        };
        ErrorBody {
            name: &self.name,
            message,
            status: self.status.as_u16(),
            code: self.code.as_deref(),
            extra: if self.expose { Some(&self.extra) } else { None },
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.status.as_u16(), self.message)
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<StatusCode> for HttpError {
    fn from(status: StatusCode) -> Self {
        Self::status(status)
    }
}

impl From<std::io::Error> for HttpError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err)
    }
}

/// Serialised form of an [`HttpError`].
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub name: &'a str,
    pub message: &'a str,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'a str>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub extra: Option<&'a BTreeMap<String, serde_json::Value>>,
}

/// `403 Forbidden` → `"ForbiddenError"`, `500` → `"InternalServerError"`.
fn error_name(status: StatusCode) -> String {
    let reason = status.canonical_reason().unwrap_or("Unknown");
    let mut name: String = reason
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    if !name.ends_with("Error") {
        name.push_str("Error");
    }
    name
}
