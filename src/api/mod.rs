//! HTTP surface: auth check, metadata lookup, and file-streaming downloads.
//!
//! Every route is a single request/response exchange. The only deferred
//! action in the whole service is temp-file removal, which is tied to the
//! response body so it cannot run while the file is still being sent.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::extract::Extractor;

/// Header carrying the shared secret on protected routes.
const ACCESS_CODE_HEADER: &str = "x-access-code";

#[derive(Clone)]
struct AppState {
    config: Arc<AppConfig>,
    extractor: Arc<Extractor>,
}

#[derive(Deserialize)]
struct AuthRequest {
    code: Option<String>,
}

#[derive(Deserialize)]
struct InfoRequest {
    url: String,
}

#[derive(Deserialize)]
struct DownloadRequest {
    url: String,
    #[serde(default = "default_format")]
    format_id: String,
}

fn default_format() -> String {
    "best".to_string()
}

#[derive(Serialize)]
struct RootResponse {
    message: String,
}

#[derive(Serialize)]
struct AuthResponse {
    status: String,
}

#[derive(Serialize)]
struct ErrorDetail {
    detail: String,
}

/// Client-facing error: a status code and one message, nothing else.
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            detail: "Invalid Access Code".to_string(),
        }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, axum::Json(ErrorDetail { detail: self.detail })).into_response()
    }
}

/// Adapter failures all map to a 400 carrying the adapter's message.
impl From<crate::Error> for ApiError {
    fn from(e: crate::Error) -> Self {
        Self::bad_request(e.to_string())
    }
}

/// Checks the shared-secret header on protected routes.
///
/// An empty configured secret disables the check entirely; `/api/auth`
/// stays strict either way.
fn authorize(config: &AppConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    if config.access_code.is_empty() {
        return Ok(());
    }
    let presented = headers
        .get(ACCESS_CODE_HEADER)
        .and_then(|value| value.to_str().ok());
    if presented == Some(config.access_code.as_str()) {
        Ok(())
    } else {
        Err(ApiError::unauthorized())
    }
}

async fn api_root() -> impl IntoResponse {
    axum::Json(RootResponse {
        message: "reel-dl API is running".to_string(),
    })
}

async fn api_auth(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<AuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // An absent code field never matches, not even an empty secret.
    if payload.code.as_deref() == Some(state.config.access_code.as_str()) {
        Ok(axum::Json(AuthResponse {
            status: "ok".to_string(),
        }))
    } else {
        Err(ApiError::unauthorized())
    }
}

async fn api_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(payload): axum::Json<InfoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state.config, &headers)?;
    let info = state.extractor.fetch_metadata(&payload.url).await?;
    Ok(axum::Json(info))
}

async fn api_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(payload): axum::Json<DownloadRequest>,
) -> Result<Response, ApiError> {
    authorize(&state.config, &headers)?;
    let path = state
        .extractor
        .download(&payload.url, &payload.format_id)
        .await?;
    file_response(path).await
}

/// Streams `path` as a binary attachment. The temp file is removed once the
/// response body has been dropped, i.e. after the last byte went out (or
/// the connection died).
async fn file_response(path: PathBuf) -> Result<Response, ApiError> {
    let filename = path.file_name().map_or_else(
        || "download.bin".to_string(),
        |name| name.to_string_lossy().into_owned(),
    );

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            remove_quietly(&path);
            return Err(ApiError::bad_request(format!(
                "could not open downloaded file: {e}"
            )));
        }
    };
    let len = file.metadata().await.ok().map(|m| m.len());

    let stream = CleanupStream {
        inner: ReaderStream::new(file),
        _cleanup: RemoveOnDrop { path },
    };

    let mut response = Body::from_stream(stream).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Some(len) = len {
        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
        response_headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// Removes its path when dropped.
struct RemoveOnDrop {
    path: PathBuf,
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        remove_quietly(&self.path);
    }
}

/// Byte stream that owns the cleanup guard for the file it reads.
struct CleanupStream<S> {
    inner: S,
    _cleanup: RemoveOnDrop,
}

impl<S: Stream + Unpin> Stream for CleanupStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

/// Deletes a finished temp file. A file that is already gone is fine; the
/// guard may race another delete of the same path.
fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            log::warn!("could not remove temp file {}: {e}", path.display());
        }
    }
}

/// Builds the service router.
fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(api_root))
        .route("/api/auth", post(api_auth))
        .route("/api/info", post(api_info))
        .route("/api/download", post(api_download))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP service and blocks until it exits.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server loop fails.
pub async fn run_server(config: AppConfig, extractor: Extractor) -> crate::Result<()> {
    let addr = format!("{}:{}", config.api.host, config.api.port);
    let state = AppState {
        config: Arc::new(config),
        extractor: Arc::new(extractor),
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::to_bytes;
    use axum::http::Request;
    use serde_json::{Value, json};
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::engine::ProbeInfo;
    use crate::engine::stub::{FetchBehavior, StubEngine};

    fn test_app(dir: &TempDir, engine: StubEngine) -> (Router, Arc<StubEngine>) {
        app_with_code(dir, engine, "123456")
    }

    fn app_with_code(
        dir: &TempDir,
        engine: StubEngine,
        code: &str,
    ) -> (Router, Arc<StubEngine>) {
        let config = AppConfig::new()
            .with_access_code(code)
            .with_download_dir(dir.path());
        let engine = Arc::new(engine);
        let extractor = Extractor::with_engine(&config, engine.clone()).unwrap();
        let state = AppState {
            config: Arc::new(config),
            extractor: Arc::new(extractor),
        };
        (router(state), engine)
    }

    fn json_request(path: &str, code: Option<&str>, body: &Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(code) = code {
            builder = builder.header("X-Access-Code", code);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn sample_engine() -> StubEngine {
        StubEngine::probing(ProbeInfo {
            title: Some("A Video".to_string()),
            thumbnail: None,
            duration: Some(90.0),
            webpage_url: Some("https://example.com/watch?v=1".to_string()),
            extractor: Some("example".to_string()),
        })
    }

    // --- root ---

    #[tokio::test]
    async fn root_reports_running() {
        let dir = TempDir::new().unwrap();
        let (app, _) = test_app(&dir, sample_engine());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "reel-dl API is running");
    }

    // --- auth check ---

    #[tokio::test]
    async fn auth_accepts_configured_code() {
        let dir = TempDir::new().unwrap();
        let (app, _) = test_app(&dir, sample_engine());

        let response = app
            .oneshot(json_request("/api/auth", None, &json!({"code": "123456"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn auth_rejects_wrong_code() {
        let dir = TempDir::new().unwrap();
        let (app, _) = test_app(&dir, sample_engine());

        let response = app
            .oneshot(json_request("/api/auth", None, &json!({"code": "000000"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["detail"], "Invalid Access Code");
    }

    #[tokio::test]
    async fn auth_rejects_absent_code_field() {
        let dir = TempDir::new().unwrap();
        let (app, _) = test_app(&dir, sample_engine());

        let response = app
            .oneshot(json_request("/api/auth", None, &json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["detail"], "Invalid Access Code");
    }

    #[tokio::test]
    async fn auth_stays_strict_with_empty_secret() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app_with_code(&dir, sample_engine(), "");

        let response = app
            .clone()
            .oneshot(json_request("/api/auth", None, &json!({"code": "000000"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // An absent code does not match an empty secret either.
        let response = app
            .oneshot(json_request("/api/auth", None, &json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // --- header authorization ---

    #[tokio::test]
    async fn info_requires_access_code() {
        let dir = TempDir::new().unwrap();
        let (app, engine) = test_app(&dir, sample_engine());

        let response = app
            .oneshot(json_request(
                "/api/info",
                None,
                &json!({"url": "https://example.com/v"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(engine.probe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn info_rejects_wrong_access_code() {
        let dir = TempDir::new().unwrap();
        let (app, engine) = test_app(&dir, sample_engine());

        let response = app
            .oneshot(json_request(
                "/api/info",
                Some("999999"),
                &json!({"url": "https://example.com/v"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["detail"], "Invalid Access Code");
        assert_eq!(engine.probe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn download_requires_access_code() {
        let dir = TempDir::new().unwrap();
        let (app, engine) = test_app(&dir, sample_engine());

        let response = app
            .oneshot(json_request(
                "/api/download",
                None,
                &json!({"url": "https://example.com/v"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(engine.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn header_name_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let (app, _) = test_app(&dir, sample_engine());

        let request = Request::builder()
            .method("POST")
            .uri("/api/info")
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-ACCESS-CODE", "123456")
            .body(Body::from(
                json!({"url": "https://example.com/v"}).to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_secret_disables_header_check() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app_with_code(&dir, sample_engine(), "");

        let response = app
            .oneshot(json_request(
                "/api/info",
                None,
                &json!({"url": "https://example.com/v"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // --- metadata lookup ---

    #[tokio::test]
    async fn info_returns_metadata_with_fixed_formats() {
        let dir = TempDir::new().unwrap();
        let (app, _) = test_app(&dir, sample_engine());

        let response = app
            .oneshot(json_request(
                "/api/info",
                Some("123456"),
                &json!({"url": "https://example.com/watch?v=1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["title"], "A Video");
        assert_eq!(body["duration"], 90.0);
        assert_eq!(body["webpage_url"], "https://example.com/watch?v=1");
        assert!(body["thumbnail"].is_null());
        let formats = body["formats"].as_array().unwrap();
        assert_eq!(formats.len(), 2);
        assert_eq!(formats[0]["format_id"], "bestaudio");
        assert_eq!(formats[1]["format_id"], "best");
    }

    #[tokio::test]
    async fn info_maps_engine_failure_to_400() {
        let dir = TempDir::new().unwrap();
        let (app, _) = test_app(&dir, StubEngine::failing("Unsupported URL: junk"));

        let response = app
            .oneshot(json_request(
                "/api/info",
                Some("123456"),
                &json!({"url": "junk"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["detail"],
            "Failed to fetch info: Unsupported URL: junk"
        );
    }

    // --- download ---

    #[tokio::test]
    async fn download_streams_file_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let (app, _) = test_app(
            &dir,
            StubEngine::fetching(FetchBehavior::WriteFile {
                ext: "mp4",
                contents: b"media bytes",
                report_path: true,
            }),
        );

        let response = app
            .oneshot(json_request(
                "/api/download",
                Some("123456"),
                &json!({"url": "https://example.com/v", "format_id": "best"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "11");
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\""));
        assert!(disposition.contains(".mp4"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"media bytes");

        // Body fully consumed and dropped: the temp file must be gone.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn download_bestaudio_suggests_audio_filename() {
        let dir = TempDir::new().unwrap();
        let (app, engine) = test_app(
            &dir,
            StubEngine::fetching(FetchBehavior::WriteFile {
                ext: "mp3",
                contents: b"audio",
                report_path: true,
            }),
        );

        let response = app
            .oneshot(json_request(
                "/api/download",
                Some("123456"),
                &json!({"url": "https://example.com/v", "format_id": "bestaudio"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap();
        assert!(disposition.ends_with(".mp3\""));
        let request = engine.last_fetch.lock().unwrap().clone().unwrap();
        assert!(request.extract_audio);
    }

    #[tokio::test]
    async fn download_defaults_to_best_format() {
        let dir = TempDir::new().unwrap();
        let (app, engine) = test_app(
            &dir,
            StubEngine::fetching(FetchBehavior::WriteFile {
                ext: "mp4",
                contents: b"x",
                report_path: true,
            }),
        );

        let response = app
            .oneshot(json_request(
                "/api/download",
                Some("123456"),
                &json!({"url": "https://example.com/v"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let request = engine.last_fetch.lock().unwrap().clone().unwrap();
        assert_eq!(request.selector, "bestvideo+bestaudio/best");
    }

    #[tokio::test]
    async fn download_missing_output_maps_to_400() {
        let dir = TempDir::new().unwrap();
        let (app, _) = test_app(&dir, StubEngine::fetching(FetchBehavior::WriteNothing));

        let response = app
            .oneshot(json_request(
                "/api/download",
                Some("123456"),
                &json!({"url": "https://example.com/v"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["detail"],
            "File not found after download"
        );
    }

    #[tokio::test]
    async fn download_engine_failure_maps_to_400() {
        let dir = TempDir::new().unwrap();
        let (app, _) = test_app(&dir, StubEngine::fetching(FetchBehavior::Fail("boom")));

        let response = app
            .oneshot(json_request(
                "/api/download",
                Some("123456"),
                &json!({"url": "https://example.com/v"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["detail"], "Download failed: boom");
    }

    // --- cleanup ---

    #[test]
    fn cleanup_guard_removes_file_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.bin");
        std::fs::write(&path, b"abc").unwrap();

        let guard = RemoveOnDrop { path: path.clone() };
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn remove_quietly_tolerates_double_delete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("twice.bin");
        std::fs::write(&path, b"abc").unwrap();

        remove_quietly(&path);
        assert!(!path.exists());
        // Second delete simulates the race; must be a no-op.
        remove_quietly(&path);
    }
}
