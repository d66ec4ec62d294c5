#![allow(dead_code)]

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use warren::App;

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub fn request(method: Method, uri: &str) -> http::request::Builder {
    http::Request::builder().method(method).uri(uri)
}

pub async fn send(app: &App, req: http::request::Builder, body: &'static str) -> Reply {
    let res = app.handle(req.body(Full::new(Bytes::from_static(body.as_bytes()))).unwrap()).await;
    collect(res).await
}

pub async fn get(app: &App, uri: &str) -> Reply {
    send(app, request(Method::GET, uri), "").await
}

pub async fn collect(res: http::Response<Full<Bytes>>) -> Reply {
    let (parts, body) = res.into_parts();
    Reply {
        status: parts.status,
        headers: parts.headers,
        body: body.collect().await.unwrap().to_bytes(),
    }
}
