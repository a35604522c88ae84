use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;

use crate::library::scan::tests::write_files;
use crate::library::selector::SelectionPolicy;
use crate::library::Library;
use crate::web::handlers::routes;
use crate::web::models::{ErrorBody, RandomClip};

fn video_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_files(
        dir.path(),
        &[
            ("intro.mp4", "0123456789abcdef"),
            ("shows/one.mkv", "episode one"),
            ("shows/two.webm", "episode two"),
            ("shows/notes.txt", "skip me"),
        ],
    );
    std::fs::create_dir_all(dir.path().join("empty")).unwrap();
    dir
}

fn library(dir: &TempDir) -> web::Data<Library> {
    web::Data::new(Library::new(
        dir.path().to_path_buf(),
        "clipshuffle-no-such-ffprobe",
        SelectionPolicy::balanced(),
    ))
}

macro_rules! init_app {
    ($dir:expr) => {
        test::init_service(App::new().app_data(library(&$dir)).configure(routes)).await
    };
}

macro_rules! get_json {
    ($app:expr, $uri:expr) => {{
        let req = test::TestRequest::get().uri($uri).to_request();
        let res = test::call_service(&$app, req).await;
        let status = res.status();
        let body: Value = test::read_body_json(res).await;
        (status, body)
    }};
}

macro_rules! post_session {
    ($app:expr, $action:expr, $id:expr) => {{
        let req = test::TestRequest::post()
            .uri(&format!("/session/{}", $action))
            .set_json(json!({ "id": $id }))
            .to_request();
        let res = test::call_service(&$app, req).await;
        let status = res.status();
        let body: Value = test::read_body_json(res).await;
        (status, body)
    }};
}

#[actix_web::test]
async fn test_tree() {
    let dir = video_dir();
    let app = init_app!(dir);

    let (status, first) = get_json!(app, "/tree");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        first,
        json!([
            {"type": "dir", "name": "empty", "path": "empty", "children": []},
            {"type": "file", "name": "intro.mp4", "path": "intro.mp4"},
            {"type": "dir", "name": "shows", "path": "shows", "children": [
                {"type": "file", "name": "one.mkv", "path": "shows/one.mkv"},
                {"type": "file", "name": "two.webm", "path": "shows/two.webm"},
            ]},
        ])
    );

    let (_, second) = get_json!(app, "/tree");
    assert_eq!(first, second);
}

#[actix_web::test]
async fn test_random() {
    let dir = video_dir();
    let app = init_app!(dir);

    let (status, body) = get_json!(app, "/random?target=shows");
    assert_eq!(status, StatusCode::OK);
    let clip: RandomClip = serde_json::from_value(body).unwrap();
    assert!(clip.file == "shows/one.mkv" || clip.file == "shows/two.webm");
    assert_eq!(clip.dur, 60.0);
    assert!(clip.start >= 0.0);
    assert!(clip.start + clip.length <= clip.dur);
    assert!(clip.length >= 8.0);

    // The other episode is the only one left in this generation.
    let (_, body) = get_json!(app, "/random?target=shows");
    let next: RandomClip = serde_json::from_value(body).unwrap();
    assert_ne!(next.file, clip.file);

    let (status, body) = get_json!(app, "/random?target=intro.mp4&preview=true");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["file"], "intro.mp4");

    let (status, body) = get_json!(app, "/random");
    assert_eq!(status, StatusCode::OK);
    assert!(body["file"].is_string());

    let (status, body) = get_json!(app, "/random?target=.");
    assert_eq!(status, StatusCode::OK);
    assert!(body["file"].is_string());
}

#[actix_web::test]
async fn test_random_errors() {
    let dir = video_dir();
    let app = init_app!(dir);

    let (status, body) = get_json!(app, "/random?target=empty");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(ErrorBody::new("no videos")));

    for target in ["missing", "..%2F..%2Fetc", "shows/nope.mp4"] {
        let (status, body) = get_json!(app, &format!("/random?target={target}"));
        assert_eq!(status, StatusCode::NOT_FOUND, "{target}");
        assert_eq!(body, json!({"error": "video not found"}));
    }
}

#[actix_web::test]
async fn test_video_not_found() {
    let dir = video_dir();
    let app = init_app!(dir);

    for uri in ["/video/missing.mp4", "/video/shows", "/video/..%2Fintro.mp4"] {
        let (status, body) = get_json!(app, uri);
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body, json!({"error": "video not found"}));
    }
}

macro_rules! fetch {
    ($app:expr, $uri:expr, $range:expr) => {{
        let mut req = test::TestRequest::get().uri($uri);
        if let Some(range) = $range {
            req = req.insert_header((header::RANGE, range));
        }
        let res = test::call_service(&$app, req.to_request()).await;
        let status = res.status();
        let content_type = res
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        (status, content_type, test::read_body(res).await.to_vec())
    }};
}

macro_rules! wait_until_cached {
    ($app:expr) => {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let (_, status) = get_json!($app, "/cache/status");
                if status["cached"] == status["total"] && status["caching"].is_null() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap()
    };
}

#[actix_web::test]
async fn test_cached_and_disk_responses_match() {
    let dir = video_dir();
    let app = init_app!(dir);

    let from_disk = fetch!(app, "/video/intro.mp4", None::<&str>);
    let disk_range = fetch!(app, "/video/intro.mp4", Some("bytes=2-5"));
    assert_eq!(from_disk.0, StatusCode::OK);
    assert_eq!(from_disk.1, "video/mp4");
    assert_eq!(from_disk.2, b"0123456789abcdef".to_vec());
    assert_eq!(disk_range.0, StatusCode::PARTIAL_CONTENT);
    assert_eq!(disk_range.2, b"2345".to_vec());

    post_session!(app, "start", "viewer");
    wait_until_cached!(app);

    let from_cache = fetch!(app, "/video/intro.mp4", None::<&str>);
    let cache_range = fetch!(app, "/video/intro.mp4", Some("bytes=2-5"));
    assert_eq!(from_cache, from_disk);
    assert_eq!(cache_range, disk_range);

    let unsatisfiable = fetch!(app, "/video/intro.mp4", Some("bytes=100-200"));
    assert_eq!(unsatisfiable.0, StatusCode::RANGE_NOT_SATISFIABLE);
}

macro_rules! validators {
    ($app:expr $(, $header:expr)*) => {{
        let req = test::TestRequest::get()
            .uri("/video/intro.mp4")
            $(.insert_header($header))*
            .to_request();
        let res = test::call_service(&$app, req).await;
        let value_of = |name: header::HeaderName| {
            res.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        (res.status(), value_of(header::ETAG), value_of(header::LAST_MODIFIED))
    }};
}

// Plain fetch, then revalidation and malformed requests built from its
// validators.
macro_rules! revalidate {
    ($app:expr) => {{
        let plain = validators!($app);
        let etag = plain.1.clone().unwrap();
        let last_modified = plain.2.clone().unwrap();
        let bad_range = header::HeaderValue::from_bytes(b"bytes=\xff-").unwrap();
        vec![
            plain,
            validators!($app, (header::IF_NONE_MATCH, etag.clone())),
            validators!($app, (header::IF_MODIFIED_SINCE, last_modified.clone())),
            validators!($app, (header::IF_MATCH, "\"stale\"")),
            validators!($app, (header::IF_MATCH, etag.clone()), (header::RANGE, "bytes=2-5")),
            validators!($app, (header::RANGE, bad_range)),
        ]
    }};
}

#[actix_web::test]
async fn test_cached_and_disk_revalidation_match() {
    let dir = video_dir();
    let app = init_app!(dir);

    let from_disk = revalidate!(app);
    let statuses: Vec<StatusCode> = from_disk.iter().map(|r| r.0).collect();
    assert_eq!(
        statuses,
        vec![
            StatusCode::OK,
            StatusCode::NOT_MODIFIED,
            StatusCode::NOT_MODIFIED,
            StatusCode::PRECONDITION_FAILED,
            StatusCode::PARTIAL_CONTENT,
            StatusCode::BAD_REQUEST,
        ]
    );
    assert!(from_disk.iter().all(|r| r.1.is_some() && r.2.is_some()));

    post_session!(app, "start", "viewer");
    wait_until_cached!(app);

    let from_cache = revalidate!(app);
    assert_eq!(from_cache, from_disk);
}

#[actix_web::test]
async fn test_session_lifecycle() {
    let dir = video_dir();
    let app = init_app!(dir);

    let (_, status) = get_json!(app, "/cache/status");
    assert_eq!(
        status,
        json!({"cached": 0, "total": 3, "caching": null, "videos": []})
    );

    let (code, body) = post_session!(app, "start", "a");
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "id": "a"}));
    post_session!(app, "start", "b");
    wait_until_cached!(app);

    let (_, status) = get_json!(app, "/cache/status");
    assert_eq!(
        status,
        json!({
            "cached": 3,
            "total": 3,
            "caching": null,
            "videos": ["intro.mp4", "shows/one.mkv", "shows/two.webm"],
        })
    );

    let (code, body) = post_session!(app, "end", "a");
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));
    let (_, status) = get_json!(app, "/cache/status");
    assert_eq!(status["cached"], 3);

    post_session!(app, "end", "b");
    let (_, status) = get_json!(app, "/cache/status");
    assert_eq!(status["cached"], 0);
    assert_eq!(status["videos"], json!([]));
}

#[actix_web::test]
async fn test_session_requires_id() {
    let dir = video_dir();
    let app = init_app!(dir);

    let (code, body) = post_session!(app, "start", "  ");
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "missing session id"}));
}
