pub mod health;
pub mod login;
pub mod ping;
pub mod redirect;
pub mod upload;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::state::SharedState;

/// Room for multipart headers and boundaries on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(state: SharedState) -> Router {
    let body_limit = usize::try_from(state.uploads.max_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/ping", get(ping::ping_handler))
        .route("/login", post(login::login_handler))
        .route("/upload", post(upload::upload_handler))
        .route("/redirect", get(redirect::redirect_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use super::*;
    use crate::credentials::CredentialStore;
    use crate::diagnostic::DiagnosticCommand;
    use crate::redirect::RedirectPolicy;
    use crate::state::AppState;
    use crate::upload::UploadRoot;

    const BOUNDARY: &str = "guardd-test-boundary";

    fn test_state(dir: &tempfile::TempDir) -> SharedState {
        let store = CredentialStore::open(&dir.path().join("credentials.db")).unwrap();
        store.add_user("admin", "password").unwrap();

        Arc::new(AppState {
            credentials: Mutex::new(store),
            uploads: UploadRoot::new(&dir.path().join("uploads"), 1024).unwrap(),
            redirects: RedirectPolicy::new(["example.com"]),
            // echo stands in for ping so tests see the exact argv.
            diagnostic: DiagnosticCommand {
                program: "echo".to_string(),
                ..Default::default()
            },
        })
    }

    async fn send(state: &SharedState, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
        let resp = router(state.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, headers, String::from_utf8_lossy(&bytes).into_owned())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn login(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let (status, _, body) = send(&state, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"ok\""));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ping_valid_host_returns_output() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (status, _, body) = send(&state, get_req("/ping?ip=127.0.0.1")).await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["output"].as_str().unwrap().trim_end(), "-c 4 127.0.0.1");
    }

    #[tokio::test]
    async fn test_ping_injection_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (status, _, body) = send(&state, get_req("/ping?ip=127.0.0.1%3B%20rm%20-rf%20%2F")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["kind"], "InvalidHost");
    }

    #[tokio::test]
    async fn test_ping_missing_ip_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let (status, _, _) = send(&state, get_req("/ping")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_success() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (status, _, body) = send(
            &state,
            login(serde_json::json!({"username": "admin", "password": "password"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Login successful!"));
    }

    #[tokio::test]
    async fn test_login_injection_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (status, _, body) = send(
            &state,
            login(serde_json::json!({"username": "' OR '1'='1", "password": "' OR '1'='1"})),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json, serde_json::json!({"message": "Invalid credentials"}));
    }

    #[tokio::test]
    async fn test_login_missing_fields_is_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let (status, _, _) = send(&state, login(serde_json::json!({"username": "admin"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    fn raw_login(content_type: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_login_malformed_body_is_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        for req in [
            raw_login("application/json", "not json"),
            raw_login("text/plain", r#"{"username":"admin","password":"password"}"#),
            raw_login("application/json", r#"{"username":1,"password":"x"}"#),
            Request::builder()
                .method("POST")
                .uri("/login")
                .body(Body::empty())
                .unwrap(),
        ] {
            let (status, _, body) = send(&state, req).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            let json: serde_json::Value = serde_json::from_str(&body).unwrap();
            assert_eq!(json, serde_json::json!({"message": "Invalid credentials"}));
        }
    }

    #[tokio::test]
    async fn test_ping_duplicate_ip_is_invalid_host() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (status, _, body) = send(&state, get_req("/ping?ip=127.0.0.1&ip=10.0.0.1")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json, serde_json::json!({"error": "invalid host", "kind": "InvalidHost"}));
    }

    #[tokio::test]
    async fn test_redirect_duplicate_url_is_untrusted() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (status, headers, body) = send(
            &state,
            get_req("/redirect?url=%2Fhome&url=http%3A%2F%2Fevil.example%2F"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(headers.get(header::LOCATION).is_none());
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"error": "untrusted redirect target", "kind": "UntrustedRedirectTarget"})
        );
    }

    #[tokio::test]
    async fn test_upload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (status, _, body) = send(&state, multipart("file", "report.pdf", b"%PDF-1.7")).await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["message"], "File uploaded successfully!");
        assert_eq!(json["filename"], "report.pdf");
        let stored = state.uploads.path().join("report.pdf");
        assert_eq!(std::fs::read(stored).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_upload_traversal_stays_in_root() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (status, _, body) = send(&state, multipart("file", "../../etc/passwd", b"x")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"passwd\""));
        assert!(state.uploads.path().join("passwd").is_file());
        assert!(!body.contains(&*dir.path().to_string_lossy()));
    }

    #[tokio::test]
    async fn test_upload_without_file_field() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (status, _, body) = send(&state, multipart("other", "a.txt", b"x")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("No file uploaded"));
    }

    #[tokio::test]
    async fn test_upload_not_multipart() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let req = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::from("plain"))
            .unwrap();
        let (status, _, body) = send(&state, req).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("No file uploaded"));
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (status, _, body) = send(&state, multipart("file", "big.bin", &[0u8; 2048])).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("TooLarge"));
        assert_eq!(std::fs::read_dir(state.uploads.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_redirect_allowed_target() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (status, headers, body) =
            send(&state, get_req("/redirect?url=https%3A%2F%2Fexample.com%2Fwelcome")).await;

        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(headers[header::LOCATION], "https://example.com/welcome");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_redirect_untrusted_target() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (status, headers, body) =
            send(&state, get_req("/redirect?url=http%3A%2F%2Fevil.example%2F")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(headers.get(header::LOCATION).is_none());
        assert!(!body.contains("evil.example"));
    }

    #[tokio::test]
    async fn test_redirect_script_is_never_reflected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (status, headers, body) =
            send(&state, get_req("/redirect?url=javascript%3Aalert(1)")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(headers.get(header::LOCATION).is_none());
        assert!(!body.contains("alert"));
        assert!(!body.contains("<script"));
    }
}
