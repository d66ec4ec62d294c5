mod common;

use std::io::Read;
use std::sync::Arc;

use flate2::read::GzDecoder;
use http::{Method, StatusCode};
use parking_lot::Mutex;
use warren::middleware::{Compress, Cors};
use warren::{App, HttpError, Next, Request};

use common::{get, request, send};

#[tokio::test]
async fn middleware_runs_in_registration_order() {
    let app = App::new();
    let trail = Arc::new(Mutex::new(Vec::new()));
    for tag in ["first", "second"] {
        let trail = Arc::clone(&trail);
        app.middleware(move |req: Request, next: Next| {
            trail.lock().push(tag);
            next.run(req)
        });
    }
    let handler_trail = Arc::clone(&trail);
    app.get("/", move |_req: Request| {
        handler_trail.lock().push("handler");
        async { Ok::<_, HttpError>("done") }
    });

    assert_eq!(get(&app, "/").await.text(), "done");
    assert_eq!(*trail.lock(), ["first", "second", "handler"]);
}

#[tokio::test]
async fn parent_middleware_does_not_wrap_children() {
    let parent = App::new();
    let child = App::new();
    parent.middleware(|req: Request, next: Next| async move {
        let mut res = next.run(req).await?;
        res.headers_mut().insert("x-parent", http::HeaderValue::from_static("1"));
        Ok::<_, HttpError>(res)
    });
    parent.get("/", |_req: Request| async { Ok::<_, HttpError>("parent") });
    child.get("/", |_req: Request| async { Ok::<_, HttpError>("child") });
    parent.mount("/child", &child).unwrap();

    assert_eq!(get(&parent, "/").await.header("x-parent"), Some("1"));
    let res = get(&parent, "/child").await;
    assert_eq!(res.text(), "child");
    assert!(res.header("x-parent").is_none());
}

#[tokio::test]
async fn answers_cors_preflight() {
    let app = App::new();
    app.cors(Cors::new());
    app.get("/", |_req: Request| async { Ok::<_, HttpError>("hi!") });

    let preflight = request(Method::OPTIONS, "/")
        .header("origin", "http://koajs.com")
        .header("access-control-request-method", "PUT");
    let res = send(&app, preflight, "").await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
    assert_eq!(res.header("access-control-allow-origin"), Some("http://koajs.com"));
    assert_eq!(res.header("access-control-allow-methods"), Some("GET,HEAD,PUT,POST,DELETE,PATCH"));
}

#[tokio::test]
async fn cors_with_fixed_origin() {
    let app = App::new();
    app.cors(Cors::new().origin("*"));
    app.get("/", |_req: Request| async { Ok::<_, HttpError>(serde_json::json!({ "foo": "bar" })) });

    let res = send(&app, request(Method::GET, "/").header("origin", "http://koajs.com"), "").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.header("access-control-allow-origin"), Some("*"));
    assert_eq!(res.json(), serde_json::json!({ "foo": "bar" }));
}

#[tokio::test]
async fn compresses_responses() {
    let app = App::new();
    app.compress(Compress::new().threshold(1));
    app.get("/", |_req: Request| async { Ok::<_, HttpError>("hi world!") });

    let res = send(&app, request(Method::GET, "/").header("accept-encoding", "gzip"), "").await;
    assert_eq!(res.header("content-encoding"), Some("gzip"));
    let mut text = String::new();
    GzDecoder::new(&res.body[..]).read_to_string(&mut text).unwrap();
    assert_eq!(text, "hi world!");
}

#[tokio::test]
async fn serves_favicon_and_static_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("fixtures/favicon")).unwrap();
    std::fs::write(dir.path().join("fixtures/favicon/favicon.ico"), [0u8, 0, 1, 0]).unwrap();
    std::fs::create_dir_all(dir.path().join("fixtures/directory")).unwrap();
    std::fs::write(dir.path().join("fixtures/directory/one.js"), "console.log('one');\n").unwrap();

    let app = App::with_base_dir(dir.path());
    app.favicon("./fixtures/favicon/favicon.ico")
        .serve_static("./fixtures/directory");

    let res = get(&app, "/favicon.ico").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.header("content-type"), Some("image/x-icon"));

    let res = get(&app, "/one.js").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text(), "console.log('one');\n");

    assert_eq!(get(&app, "/two.js").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn lists_directories_as_html_or_json() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("public/js")).unwrap();
    std::fs::write(dir.path().join("public/readme.txt"), "read me").unwrap();
    std::fs::write(dir.path().join("public/js/app.js"), "").unwrap();
    std::fs::write(dir.path().join("public/.secret"), "").unwrap();

    let app = App::with_base_dir(dir.path());
    app.directory("public");
    app.get("/api", |_req: Request| async { Ok::<_, HttpError>("api") });

    let res = get(&app, "/").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
    assert!(res.text().contains(r#"<a href="/js/">js/</a>"#));
    assert!(res.text().contains(r#"<a href="/readme.txt">readme.txt</a>"#));
    assert!(!res.text().contains(".secret"));

    let res = send(&app, request(Method::GET, "/js").header("accept", "application/json"), "").await;
    assert_eq!(res.json(), serde_json::json!(["app.js"]));

    assert_eq!(get(&app, "/readme.txt").await.text(), "read me");
    assert_eq!(get(&app, "/api").await.text(), "api");
    assert_eq!(get(&app, "/nope").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn gzip_with_zero_quality_is_refused() {
    let app = App::new();
    app.compress(Compress::new().threshold(1));
    app.get("/", |_req: Request| async { Ok::<_, HttpError>("hi world!") });

    let res = send(&app, request(Method::GET, "/").header("accept-encoding", "gzip;q=0, identity"), "").await;
    assert!(res.header("content-encoding").is_none());
    assert_eq!(res.text(), "hi world!");
}

#[tokio::test]
async fn logger_passes_responses_through() {
    let app = App::new();
    app.logger_with(|req| !req.path().ends_with(".js"))
        .get("/user", |_req: Request| async { Ok::<_, HttpError>("user") })
        .get("/user.js", |_req: Request| async { Ok::<_, HttpError>("posts") });

    assert_eq!(get(&app, "/user").await.text(), "user");
    assert_eq!(get(&app, "/user.js").await.text(), "posts");
}
