//! HTTP Basic authentication.
//!
//! Missing or wrong credentials raise a `401` [`HttpError`] carrying a
//! `WWW-Authenticate` challenge. Because it is an error and not a response,
//! a middleware registered earlier can catch it and answer differently.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::StatusCode;
use http::header::{AUTHORIZATION, HeaderValue, WWW_AUTHENTICATE};

use crate::error::HttpError;
use crate::handler::{BoxFuture, HandlerResult};
use crate::middleware::{Middleware, Next};
use crate::request::Request;

#[derive(Clone)]
pub struct BasicAuth {
    user: String,
    pass: String,
    challenge: HeaderValue,
}

impl BasicAuth {
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            pass: pass.into(),
            challenge: HeaderValue::from_static(r#"Basic realm="Secure Area""#),
        }
    }

    /// Changes the realm announced in the challenge.
    pub fn realm(mut self, realm: &str) -> Self {
        if let Ok(v) = HeaderValue::try_from(format!(r#"Basic realm="{realm}""#)) {
            self.challenge = v;
        }
        self
    }

    fn accepts(&self, req: &Request) -> bool {
        let Some(encoded) = req.header(AUTHORIZATION.as_str())
            .and_then(|h| h.strip_prefix("Basic "))
        else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(credentials) = String::from_utf8(decoded) else {
            return false;
        };
        match credentials.split_once(':') {
            Some((user, pass)) => user == self.user && pass == self.pass,
            None => false,
        }
    }
}

impl Middleware for BasicAuth {
    fn handle(&self, req: Request, next: Next) -> BoxFuture<HandlerResult> {
        if self.accepts(&req) {
            return Box::pin(next.run(req));
        }
        let err = HttpError::status(StatusCode::UNAUTHORIZED)
            .with_header(WWW_AUTHENTICATE, self.challenge.clone());
        Box::pin(async move { Err(err) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::MiddlewareChain;
    use crate::response::Response;
    use http::Method;

    fn chain() -> MiddlewareChain {
        let mut chain = MiddlewareChain::new();
        chain.push(BasicAuth::new("user", "pass"));
        chain.push(|_req: Request, _next: Next| async {
            Ok::<_, HttpError>(Response::text("you're in!"))
        });
        chain
    }

    fn with_auth(credentials: &str) -> Request {
        let mut req = Request::from_parts(Method::GET, "/", "");
        let value = format!("Basic {}", STANDARD.encode(credentials));
        req.headers_mut().insert(AUTHORIZATION, value.parse().unwrap());
        req
    }

    #[tokio::test]
    async fn rejects_missing_credentials() {
        let err = chain().run(Request::from_parts(Method::GET, "/", ""), None).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert!(err.headers().contains_key(WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn rejects_wrong_password() {
        assert!(chain().run(with_auth("user:nope"), None).await.is_err());
    }

    #[tokio::test]
    async fn accepts_valid_credentials() {
        let res = chain().run(with_auth("user:pass"), None).await.unwrap();
        assert_eq!(res.body().unwrap(), "you're in!");
    }
}
