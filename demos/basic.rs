//! A site with a mounted JSON API, a protected admin area and bundled assets.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/
//!   curl http://localhost:3000/api/users/42
//!   curl -X POST http://localhost:3000/api/users -d '{"name":"alice"}'
//!   curl -u admin:secret http://localhost:3000/admin/
//!   curl http://localhost:3000/api/boom

use http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use warren::middleware::Cors;
use warren::{App, HttpError, Next, Passthrough, Request, Response};

#[tokio::main]
async fn main() -> Result<(), warren::Error> {
    tracing_subscriber::fmt::init();

    let api = App::new();
    api.cors(Cors::new())
        .get("/users/:id", get_user)
        .post("/users", create_user)
        .get("/boom", boom);

    let admin = App::new();
    admin.auth("admin", "secret")
        .get("/", |_req: Request| async { Ok::<_, HttpError>("welcome back") });

    let site = App::new();
    site.logger()
        .middleware(|req: Request, next: Next| async move {
            let mut res = next.run(req).await?;
            res.headers_mut().insert("x-powered-by", http::HeaderValue::from_static("warren"));
            Ok::<_, HttpError>(res)
        })
        .on_error(|err, ctx| tracing::warn!(method = %ctx.method, path = %ctx.path, "unexpected error: {err}"))
        .bundler(Passthrough)
        .mount("/api", &api)?
        .mount("/admin", &admin)?;
    site.bundle("demos/assets/*.{js,css}")?;
    site.get("/", |_req: Request| async {
        Ok::<_, HttpError>(Response::html("<script src=\"/demos/assets/app.js\"></script>"))
    });

    site.listen(Some(3000)).await
}

async fn get_user(req: Request) -> Result<serde_json::Value, HttpError> {
    let id = req.param("id").unwrap_or("unknown");
    Ok(json!({ "id": id, "name": "alice" }))
}

#[derive(Deserialize)]
struct CreateUser {
    name: String,
}

async fn create_user(req: Request) -> Result<Response, HttpError> {
    let input: CreateUser = req.json()?;
    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/api/users/99")
        .json(json!({ "id": "99", "name": input.name }).to_string()))
}

async fn boom(_req: Request) -> Result<Response, HttpError> {
    Err(HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, "database unreachable"))
}
