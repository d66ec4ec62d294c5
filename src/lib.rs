//! # warren
//!
//! Composable HTTP applications that mount inside each other.
//!
//! Every [`App`] is a self-contained unit: its own middleware chain, its own
//! routes, its own assets and view engines. Apps mount under path prefixes
//! to form a tree, in any order and at any depth:
//!
//! ```text
//!   site ── "/api" ── api ── "/admin" ── admin
//!        └─ "/docs" ── docs
//! ```
//!
//! - A request descends to the deepest app whose prefix matches and sees its
//!   path with the consumed prefixes stripped.
//! - Assets registered anywhere are visible to the root, whatever the order
//!   of `mount` and `bundle` calls.
//! - Every app starts with an error boundary: handler errors become JSON
//!   bodies, unanswered requests become `404`, and unexpected failures are
//!   logged and reported to the root's [`on_error`](App::on_error) sink.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use warren::{App, HttpError, Request};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), warren::Error> {
//!     let api = App::new();
//!     api.get("/users/:id", get_user);
//!
//!     let site = App::new();
//!     site.logger().mount("/api", &api)?;
//!     site.get("/", |_req: Request| async { Ok::<_, HttpError>("hello") });
//!
//!     site.listen(Some(3000)).await
//! }
//!
//! async fn get_user(req: Request) -> Result<serde_json::Value, HttpError> {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Ok(serde_json::json!({ "id": id }))
//! }
//! ```
//!
//! Requests and responses on the wire use the [`http`] crate's types;
//! [`App`] is a hyper service and can also be driven directly with
//! [`App::handle`].

mod assets;
mod config;
mod dispatch;
mod error;
mod handler;
mod node;
mod request;
mod response;
mod router;
mod server;
mod view;

pub mod middleware;

pub use http;

pub use assets::{AssetRegistry, BundleInput, Bundled, Bundler, Passthrough};
pub use config::Config;
pub use error::{ConfigError, Error, ErrorBody, HttpError};
pub use handler::{BoxFuture, Handler, HandlerResult};
pub use middleware::{FaultContext, Middleware, MiddlewareChain, Next};
pub use node::{App, MountedApp};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::RouteTable;
pub use server::Server;
pub use view::{RawHtml, ViewEngine};
