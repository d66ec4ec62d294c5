//! Access logging.
//!
//! Emits one `tracing` event when a request enters (`<--`) and one when it
//! leaves (`-->`) with status and latency. An optional filter decides per
//! request whether anything is logged at all.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::handler::{BoxFuture, HandlerResult};
use crate::middleware::{Middleware, Next};
use crate::request::Request;

type Filter = dyn Fn(&Request) -> bool + Send + Sync + 'static;

#[derive(Clone, Default)]
pub struct Logger {
    filter: Option<Arc<Filter>>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only log requests for which `filter` returns `true`.
    pub fn filter(mut self, filter: impl Fn(&Request) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    fn wants(&self, req: &Request) -> bool {
        self.filter.as_ref().is_none_or(|f| f(req))
    }
}

/// Status the client will see once the outcome is finalised.
fn sent_status(outcome: &HandlerResult) -> u16 {
    match outcome {
        Ok(res) => match (res.status_code(), res.body()) {
            (Some(s), _) => s.as_u16(),
            (None, Some(_)) => 200,
            (None, None) => 404,
        },
        Err(e) => e.status_code().as_u16(),
    }
}

impl Middleware for Logger {
    fn handle(&self, req: Request, next: Next) -> BoxFuture<HandlerResult> {
        if !self.wants(&req) {
            return Box::pin(next.run(req));
        }

        let method = req.method().clone();
        let path = req.original_path().to_owned();
        Box::pin(async move {
            info!(%method, %path, "<--");
            let started = Instant::now();
            let outcome = next.run(req).await;
            let status = sent_status(&outcome);
            info!(%method, %path, status, elapsed_ms = started.elapsed().as_millis() as u64, "-->");
            outcome
        })
    }
}
