//! Gzip response compression.

use std::io::Write;

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, HeaderValue, VARY};

use crate::error::HttpError;
use crate::handler::{BoxFuture, HandlerResult};
use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// Compresses bodies of at least `threshold` bytes for clients that accept gzip.
#[derive(Clone, Copy, Debug)]
pub struct Compress {
    threshold: usize,
    level: u32,
}

impl Default for Compress {
    fn default() -> Self {
        Self { threshold: 1024, level: 6 }
    }
}

impl Compress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threshold(mut self, bytes: usize) -> Self {
        self.threshold = bytes;
        self
    }

    /// Gzip level, clamped to `0..=9`.
    pub fn level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }
}

/// `gzip` (or `*`) listed with a non-zero quality.
fn accepts_gzip(req: &Request) -> bool {
    let Some(header) = req.header(ACCEPT_ENCODING.as_str()) else {
        return false;
    };
    header.split(',').any(|item| {
        let mut parts = item.split(';').map(str::trim);
        let coding = parts.next().unwrap_or_default();
        if !coding.eq_ignore_ascii_case("gzip") && coding != "*" {
            return false;
        }
        let quality = parts
            .find_map(|p| p.strip_prefix("q=").or_else(|| p.strip_prefix("Q=")))
            .map_or(1.0, |q| q.trim().parse::<f32>().unwrap_or(0.0));
        quality > 0.0
    })
}

fn gzip(body: &[u8], level: u32) -> Result<Bytes, HttpError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::new(level));
    encoder.write_all(body)?;
    Ok(Bytes::from(encoder.finish()?))
}

impl Middleware for Compress {
    fn handle(&self, req: Request, next: Next) -> BoxFuture<HandlerResult> {
        let wanted = accepts_gzip(&req);
        let Compress { threshold, level } = *self;
        Box::pin(async move {
            let mut res = next.run(req).await?;
            if !wanted || res.headers().contains_key(CONTENT_ENCODING) {
                return Ok(res);
            }
            let Some(body) = res.body.take() else {
                return Ok(res);
            };
            if body.len() < threshold {
                res.body = Some(body);
                return Ok(res);
            }
            res.body = Some(gzip(&body, level)?);
            let headers = res.headers_mut();
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            headers.remove(CONTENT_LENGTH);
            headers.append(VARY, HeaderValue::from_static("Accept-Encoding"));
            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::MiddlewareChain;
    use crate::response::Response;
    use flate2::read::GzDecoder;
    use http::Method;
    use std::io::Read;

    fn chain(compress: Compress) -> MiddlewareChain {
        let mut chain = MiddlewareChain::new();
        chain.push(compress);
        chain.push(|_req: Request, _next: Next| async {
            Ok::<_, HttpError>(Response::text("hi world!"))
        });
        chain
    }

    fn gzip_request() -> Request {
        let mut req = Request::from_parts(Method::GET, "/", "");
        req.headers_mut().insert(ACCEPT_ENCODING, "gzip, deflate".parse().unwrap());
        req
    }

    #[test]
    fn honours_zero_quality() {
        let with = |value: &'static str| {
            let mut req = Request::from_parts(Method::GET, "/", "");
            req.headers_mut().insert(ACCEPT_ENCODING, value.parse().unwrap());
            accepts_gzip(&req)
        };
        assert!(with("gzip"));
        assert!(with("deflate, GZIP;q=0.5"));
        assert!(with("*"));
        assert!(!with("gzip;q=0"));
        assert!(!with("gzip; q=0.0, identity"));
        assert!(!with("gzipx"));
    }

    #[tokio::test]
    async fn compresses_above_threshold() {
        let res = chain(Compress::new().threshold(1)).run(gzip_request(), None).await.unwrap();
        assert_eq!(res.header("content-encoding"), Some("gzip"));

        let mut text = String::new();
        GzDecoder::new(&res.body().unwrap()[..]).read_to_string(&mut text).unwrap();
        assert_eq!(text, "hi world!");
    }

    #[tokio::test]
    async fn leaves_small_bodies_alone() {
        let res = chain(Compress::new()).run(gzip_request(), None).await.unwrap();
        assert!(res.header("content-encoding").is_none());
        assert_eq!(res.body().unwrap(), "hi world!");
    }

    #[tokio::test]
    async fn respects_accept_encoding() {
        let req = Request::from_parts(Method::GET, "/", "");
        let res = chain(Compress::new().threshold(1)).run(req, None).await.unwrap();
        assert!(res.header("content-encoding").is_none());
    }
}
