use std::net::SocketAddr;

use anyhow::Result;
use askama::Template;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json};
use axum::routing::{delete, get, post};
use axum::Router;
use serde_json::Value;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::chat::ChatService;
use crate::config::AppConfig;
use crate::extract::speech::SpeechClient;
use crate::extract::DocumentExtractor;
use crate::models::{ChatRequest, PromptRequest, PromptResponse, StatusResponse, UploadResponse};
use crate::ollama::OllamaClient;
use crate::registry::ModelRegistry;
use crate::search::WebSearchClient;
use crate::storage::{HistoryFile, PromptStore, UploadStore};

const THEMES: &[&str] = &["dark", "light", "retro"];

#[derive(Clone)]
pub struct AppState {
    chat: ChatService,
    extractor: DocumentExtractor,
    registry: ModelRegistry,
    prompts: PromptStore,
    history: HistoryFile,
    uploads: UploadStore,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Self {
        let extractor = DocumentExtractor::new(
            config.extract.clone(),
            SpeechClient::new(config.speech.clone()),
        );
        let uploads = UploadStore::new(&config.upload_dir);
        let chat = ChatService::new(
            config.default_model.clone(),
            OllamaClient::new(config.ollama_base_url.clone()),
            WebSearchClient::new(config.search.clone()),
            extractor.clone(),
            uploads.clone(),
        );

        Self {
            chat,
            extractor,
            registry: ModelRegistry::new(config.ollama_bin.clone()),
            prompts: PromptStore::new(&config.prompt_file),
            history: HistoryFile::new(&config.history_file),
            uploads,
        }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let upload_dir = state.uploads.dir().to_path_buf();

    Router::new()
        .route("/", get(index_page))
        .route("/api/models", get(list_models))
        .route("/api/chat", post(chat_handler))
        .route("/api/prompt", get(get_prompt).post(update_prompt))
        .route("/api/history", delete(clear_history))
        .route("/upload", post(upload_file))
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .nest_service("/static", ServeDir::new("static"))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: AppConfig) -> Result<()> {
    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let state = AppState::from_config(&config);
    let app = router(state, config.max_upload_bytes);

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    theme: String,
}

async fn index_page(headers: HeaderMap) -> Result<Html<String>, ApiError> {
    let template = IndexTemplate {
        theme: theme_from_cookies(&headers).to_string(),
    };
    Ok(Html(template.render()?))
}

fn theme_from_cookies(headers: &HeaderMap) -> &'static str {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(name, _)| *name == "theme")
        .find_map(|(_, value)| THEMES.iter().copied().find(|theme| *theme == value.trim()))
        .unwrap_or("dark")
}

async fn list_models(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let models = state.registry.list_models().await.map_err(|err| {
        tracing::error!("model listing failed: {}", err);
        ApiError::internal(err.to_string())
    })?;
    Ok(Json(models))
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let response = state.chat.converse(request).await.map_err(|err| {
        tracing::error!("chat request failed: {:#}", err);
        ApiError::from(err)
    })?;
    Ok(Json(response))
}

async fn get_prompt(State(state): State<AppState>) -> Result<Json<PromptResponse>, ApiError> {
    let prompt = state.prompts.load().await?;
    Ok(Json(PromptResponse { prompt }))
}

async fn update_prompt(
    State(state): State<AppState>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(request) = payload?;
    let Some(prompt) = request.prompt else {
        return Err(ApiError::bad_request("No prompt provided"));
    };

    state.prompts.save(&prompt).await?;
    Ok(Json(StatusResponse {
        status: "success".to_string(),
    }))
}

async fn clear_history(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    state.history.clear().await?;
    Ok(Json(StatusResponse {
        status: "cleared".to_string(),
    }))
}

async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(err.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::bad_request(err.to_string()))?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let Some((filename, bytes)) = upload else {
        return Err(ApiError::bad_request("No file part"));
    };
    if filename.trim().is_empty() {
        return Err(ApiError::bad_request("No selected file"));
    }

    let path = state.uploads.save(&filename, &bytes).await?;
    let content = state.extractor.extract(&path).await;
    let stored_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(filename.as_str())
        .to_string();

    Ok(Json(UploadResponse {
        filename: stored_name,
        path: path.display().to_string(),
        content,
    }))
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::internal(format!("{value:#}"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self::bad_request(value.body_text())
    }
}

impl From<askama::Error> for ApiError {
    fn from(value: askama::Error) -> Self {
        Self::internal(value.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::{ExtractConfig, SearchConfig, SpeechConfig};

    fn test_config(dir: &Path, ollama_url: &str) -> AppConfig {
        AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            data_dir: dir.to_path_buf(),
            upload_dir: dir.join("uploads"),
            prompt_file: dir.join("system_prompt.txt"),
            history_file: dir.join("history.json"),
            ollama_base_url: ollama_url.to_string(),
            ollama_bin: "definitely-not-an-ollama-binary".to_string(),
            default_model: "llama3".to_string(),
            max_upload_bytes: 1024 * 1024,
            extract: ExtractConfig::default(),
            search: SearchConfig::default(),
            speech: SpeechConfig::default(),
        }
    }

    fn app(config: &AppConfig) -> Router {
        router(AppState::from_config(config), config.max_upload_bytes)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn multipart_request(field: &str, filename: &str, contents: &str) -> Request<Body> {
        let boundary = "X-TEST-BOUNDARY";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n{contents}\r\n--{boundary}--\r\n"
        );
        Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn theme_cookie_is_validated() {
        let mut headers = HeaderMap::new();
        assert_eq!(theme_from_cookies(&headers), "dark");

        headers.insert(header::COOKIE, "session=abc; theme=retro".parse().unwrap());
        assert_eq!(theme_from_cookies(&headers), "retro");

        headers.insert(header::COOKIE, "theme=<script>".parse().unwrap());
        assert_eq!(theme_from_cookies(&headers), "dark");
    }

    #[tokio::test]
    async fn index_renders_selected_theme() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "http://127.0.0.1:9");
        let request = Request::builder()
            .uri("/")
            .header(header::COOKIE, "theme=light")
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(app(&config), request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().contains("data-theme=\"light\""));
    }

    #[tokio::test]
    async fn prompt_round_trip_and_validation() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "http://127.0.0.1:9");

        let get = || Request::builder().uri("/api/prompt").body(Body::empty()).unwrap();
        let (status, body) = send_json(app(&config), get()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prompt"], "You are a helpful AI assistant.");

        let post = |json: &str| {
            Request::builder()
                .method(Method::POST)
                .uri("/api/prompt")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap()
        };

        let (status, body) = send_json(app(&config), post("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No prompt provided");

        let (status, body) = send_json(app(&config), post(r#"{"prompt":"Talk like a pirate."}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");

        let (_, body) = send_json(app(&config), get()).await;
        assert_eq!(body["prompt"], "Talk like a pirate.");
    }

    #[tokio::test]
    async fn malformed_json_bodies_get_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "http://127.0.0.1:9");

        let post = |uri: &str, content_type: &str, json: &str| {
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(json.to_string()))
                .unwrap()
        };

        let cases = [
            post("/api/chat", "application/json", "{not json"),
            post(
                "/api/chat",
                "application/json",
                r#"{"messages":[{"role":"wizard","content":"hi"}]}"#,
            ),
            post("/api/chat", "text/plain", r#"{"messages":[]}"#),
            post("/api/prompt", "application/json", r#"{"prompt": 42}"#),
        ];
        for request in cases {
            let (status, body) = send_json(app(&config), request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()), "{body}");
        }
    }

    #[tokio::test]
    async fn upload_stores_extracts_and_serves_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "http://127.0.0.1:9");

        let (status, body) =
            send_json(app(&config), multipart_request("file", "notes.txt", "Hello   world\n\n")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["filename"], "notes.txt");
        assert_eq!(body["content"], "Hello world");
        assert!(body["path"].as_str().unwrap().ends_with("notes.txt"));

        let request = Request::builder()
            .uri("/uploads/notes.txt")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(&config), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"Hello   world\n\n");
    }

    #[tokio::test]
    async fn upload_without_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "http://127.0.0.1:9");

        let (status, body) =
            send_json(app(&config), multipart_request("attachment", "notes.txt", "x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file part");

        let (status, body) = send_json(app(&config), multipart_request("file", "", "x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No selected file");
    }

    #[tokio::test]
    async fn history_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "http://127.0.0.1:9");
        std::fs::write(&config.history_file, "[1,2,3]").unwrap();

        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/api/history")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send_json(app(&config), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "cleared");
        assert_eq!(std::fs::read_to_string(&config.history_file).unwrap(), "");
    }

    #[tokio::test]
    async fn model_listing_failure_is_a_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "http://127.0.0.1:9");

        let request = Request::builder().uri("/api/models").body(Body::empty()).unwrap();
        let (status, body) = send_json(app(&config), request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("failed to run"));
    }

    #[tokio::test]
    async fn chat_relays_upstream_answer_and_errors() {
        let ollama = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "role": "assistant", "content": "pong" },
                "done": true
            })))
            .up_to_n_times(1)
            .mount(&ollama)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&ollama)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), &ollama.uri());
        let chat = || {
            Request::builder()
                .method(Method::POST)
                .uri("/api/chat")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"model":"llama3","messages":[{"role":"user","content":"ping"}],"options":{},"webSearch":false}"#,
                ))
                .unwrap()
        };

        let (status, body) = send_json(app(&config), chat()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["content"], "pong");
        assert!(body.get("web_search_results").is_none());

        let (status, body) = send_json(app(&config), chat()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("bad gateway"));
    }
}
