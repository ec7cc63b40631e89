//! 路由级测试：用脚本化推理客户端驱动完整的 Router

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use super::{build_router, AppState};
use crate::config::Config;
use crate::models::Role;
use crate::providers::scripted::{Script, ScriptedClient};

const BOUNDARY: &str = "wenzhen-test-boundary";

struct TestApp {
    state: AppState,
    client: Arc<ScriptedClient>,
    _upload_dir: TempDir,
}

impl TestApp {
    fn new(script: Script) -> Self {
        Self::with_config(script, Config::default())
    }

    fn with_config(script: Script, mut config: Config) -> Self {
        let upload_dir = TempDir::new().unwrap();
        config.upload.dir = upload_dir.path().to_path_buf();
        let client = Arc::new(ScriptedClient::new(script));
        let state = AppState::new(config, client.clone()).unwrap();
        Self {
            state,
            client,
            _upload_dir: upload_dir,
        }
    }

    fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        // 以错误结束的 SSE 流读不出完整 body，按空处理
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map(|b| b.to_vec())
            .unwrap_or_default();
        (status, body)
    }

    async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn create_session(&self, message: &str, images: &[String]) -> String {
        let body = serde_json::json!({ "message": message, "images": images });
        let (status, json) = self.send_json(post_json("/api/chat/session", body)).await;
        assert_eq!(status, StatusCode::OK, "{json}");
        json["sessionId"].as_str().unwrap().to_string()
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// (字段名, 文件名, Content-Type, 内容)
fn post_multipart(uri: &str, parts: &[(&str, &str, &str, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, filename, content_type, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn position(haystack: &str, needle: &str) -> usize {
    haystack
        .find(needle)
        .unwrap_or_else(|| panic!("missing {needle:?} in {haystack:?}"))
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(Script::Complete(vec![]));
    let (status, json) = app.send_json(get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["active_sessions"], 0);
    assert_eq!(json["available_stream_slots"], 64);
}

#[tokio::test]
async fn test_session_stream_relays_in_order_and_purges() {
    let app = TestApp::new(Script::Complete(vec!["A", "B", "C"]));
    let session_id = app.create_session("舌头发紫是怎么回事", &[]).await;
    assert_eq!(app.state.sessions.len(), 1);

    let (status, body) = app
        .send(get(&format!("/api/chat/stream?sessionId={session_id}")))
        .await;
    let body = String::from_utf8(body).unwrap();

    assert_eq!(status, StatusCode::OK);
    let a = position(&body, "data: A");
    let b = position(&body, "data: B");
    let c = position(&body, "data: C");
    let complete = position(&body, "event: complete");
    assert!(a < b && b < c && c < complete, "{body}");
    assert_eq!(body.matches("event: message").count(), 3);

    assert!(app.state.sessions.get(&session_id).is_err());
    assert_eq!(app.state.relay.available_slots(), 64);

    let request = app.client.last_request().unwrap();
    assert!(request.stream);
    assert_eq!(request.messages[0].content, "你是一个中医问诊专家");
    assert_eq!(request.messages[1].content, "舌头发紫是怎么回事");
}

#[tokio::test]
async fn test_session_stream_sends_uploaded_images() {
    let app = TestApp::new(Script::Complete(vec!["ok"]));
    let (status, upload) = app
        .send_json(post_multipart(
            "/api/upload",
            &[("file", "tongue.png", "image/png", b"tongue-bytes")],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let url = upload["url"].as_str().unwrap().to_string();

    let session_id = app.create_session("", &[url]).await;
    let (status, _) = app
        .send(get(&format!("/api/chat/stream?sessionId={session_id}")))
        .await;
    assert_eq!(status, StatusCode::OK);

    let request = app.client.last_request().unwrap();
    assert!(request.messages[0].content.contains("用户上传了1张图片"));
    assert_eq!(request.messages[1].role, Role::User);
    assert_eq!(request.messages[1].images, vec![STANDARD.encode(b"tongue-bytes")]);
}

#[tokio::test]
async fn test_session_stream_with_unreadable_image_purges_session() {
    let app = TestApp::new(Script::Complete(vec!["never"]));
    let session_id = app
        .create_session("看看", &["/api/images/missing.png".to_string()])
        .await;

    let (status, body) = app
        .send(get(&format!("/api/chat/stream?sessionId={session_id}")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!String::from_utf8_lossy(&body).contains("event: complete"));
    assert!(app.state.sessions.get(&session_id).is_err());
    assert!(app.client.last_request().is_none());
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let app = TestApp::new(Script::Complete(vec!["A"]));
    let (status, json) = app
        .send_json(get("/api/chat/stream?sessionId=does-not-exist"))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("无效的会话ID"));
    assert!(app.client.last_request().is_none());
}

#[tokio::test]
async fn test_second_stream_on_same_session_is_409() {
    let app = TestApp::new(Script::Complete(vec!["A"]));
    let session_id = app.create_session("hi", &[]).await;
    let (_session, lease) = app.state.sessions.claim(&session_id).unwrap();

    let (status, _) = app
        .send_json(get(&format!("/api/chat/stream?sessionId={session_id}")))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    drop(lease);
    assert!(app.state.sessions.is_empty());
}

#[tokio::test]
async fn test_no_capacity_is_503_and_keeps_session() {
    let mut config = Config::default();
    config.stream.max_concurrent = 1;
    let app = TestApp::with_config(Script::Complete(vec!["A"]), config);
    let session_id = app.create_session("hi", &[]).await;
    let permit = app.state.relay.try_acquire().unwrap();

    let (status, _) = app
        .send_json(get(&format!("/api/chat/stream?sessionId={session_id}")))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(app.state.sessions.get(&session_id).is_ok());

    drop(permit);
    let (status, body) = app
        .send(get(&format!("/api/chat/stream?sessionId={session_id}")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("event: complete"));
}

#[tokio::test]
async fn test_unknown_session_is_404_without_capacity() {
    let mut config = Config::default();
    config.stream.max_concurrent = 1;
    let app = TestApp::with_config(Script::Complete(vec!["A"]), config);
    let _permit = app.state.relay.try_acquire().unwrap();

    let (status, json) = app
        .send_json(get("/api/chat/stream?sessionId=does-not-exist"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"]["message"].is_string());
}

#[tokio::test]
async fn test_malformed_session_body_is_json_400() {
    let app = TestApp::new(Script::Complete(vec![]));
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/chat/session")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"message\": "))
        .unwrap();
    let (status, json) = app.send_json(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]["message"].is_string());

    let (status, json) = app
        .send_json(post_json(
            "/api/chat/session",
            serde_json::json!({"message": 5}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]["message"].is_string());
    assert!(app.state.sessions.is_empty());
}

#[tokio::test]
async fn test_missing_query_parameters_are_json_400() {
    let app = TestApp::new(Script::Complete(vec!["A"]));
    for uri in ["/api/chat/stream", "/chat-stream"] {
        let (status, json) = app.send_json(get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(json["error"]["message"].is_string(), "{uri}");
    }
    assert!(app.client.last_request().is_none());
}

#[tokio::test]
async fn test_blank_session_request_is_400() {
    let app = TestApp::new(Script::Complete(vec![]));
    let (status, _) = app
        .send_json(post_json(
            "/api/chat/session",
            serde_json::json!({"message": "  ", "images": []}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.state.sessions.is_empty());
}

#[tokio::test]
async fn test_chat_stream_without_session() {
    let app = TestApp::new(Script::Complete(vec!["你好", "，同学"]));
    let (status, body) = app.send(get("/chat-stream?message=hello")).await;
    let body = String::from_utf8(body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(position(&body, "data: 你好") < position(&body, "data: ，同学"));
    assert!(body.contains("event: complete"));
}

#[tokio::test]
async fn test_chat_returns_ollama_response() {
    let app = TestApp::new(Script::Complete(vec!["舌苔", "薄白"]));
    let request = Request::builder()
        .method(Method::POST)
        .uri("/chat?systemMessage=%E4%BD%A0%E6%98%AF%E5%8C%BB%E7%94%9F")
        .body(Body::from("最近总是失眠"))
        .unwrap();
    let (status, json) = app.send_json(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"]["content"], "舌苔薄白");
    assert_eq!(json["done"], true);

    let sent = app.client.last_request().unwrap();
    assert!(!sent.stream);
    assert_eq!(sent.messages[0].content, "你是医生");
    assert_eq!(sent.messages[1].content, "最近总是失眠");
}

#[tokio::test]
async fn test_chat_upstream_failure_is_502() {
    let app = TestApp::new(Script::Refuse("model not loaded"));
    let request = Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .body(Body::from("hi"))
        .unwrap();
    let (status, json) = app.send_json(request).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("model not loaded"));
}

#[tokio::test]
async fn test_upload_then_serve_image() {
    let app = TestApp::new(Script::Complete(vec![]));
    let (status, json) = app
        .send_json(post_multipart(
            "/api/upload",
            &[("file", "face.jpg", "image/jpeg", b"jpeg-bytes")],
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["filename"], "face.jpg");
    assert_eq!(json["size"], "10");
    let url = json["url"].as_str().unwrap();
    assert!(url.starts_with("/api/images/"));

    let response = app.router().oneshot(get(url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"jpeg-bytes");
}

#[tokio::test]
async fn test_upload_name_with_inner_dots_is_served() {
    let app = TestApp::new(Script::Complete(vec![]));
    let (status, json) = app
        .send_json(post_multipart(
            "/api/upload",
            &[("file", "tongue..front.png", "image/png", b"png-bytes")],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let url = json["url"].as_str().unwrap().to_string();

    let (status, body) = app.send(get(&url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"png-bytes");

    let session_id = app.create_session("看看舌苔", &[url]).await;
    let (status, body) = app
        .send(get(&format!("/api/chat/stream?sessionId={session_id}")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("event: complete"));
}

#[tokio::test]
async fn test_missing_image_is_404() {
    let app = TestApp::new(Script::Complete(vec![]));
    let (status, _) = app.send(get("/api/images/nope.png")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(get("/api/images/..%2Fconfig.yaml")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_report_upload_success() {
    let app = TestApp::new(Script::Complete(vec!["面部：0\n", "舌苔：1"]));
    let (status, json) = app
        .send_json(post_multipart(
            "/upload",
            &[
                ("faceImg", "face.jpg", "image/jpeg", b"face"),
                ("tongue", "tongue.png", "image/png", b"tongue"),
                ("audio", "voice.mp3", "audio/mpeg", b"voice"),
            ],
        ))
        .await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["status"], "success");
    let session_id = json["sessionId"].as_str().unwrap();
    assert_eq!(json["reportUrl"], format!("/report/{session_id}"));
    assert_eq!(json["reportContent"], "面部：0\n舌苔：1");
    assert!(app.state.media.is_empty());

    let sent = app.client.last_request().unwrap();
    assert_eq!(sent.messages[1].images.len(), 2);
}

#[tokio::test]
async fn test_report_upload_rejects_text_image() {
    let app = TestApp::new(Script::Complete(vec!["x"]));
    let (status, json) = app
        .send_json(post_multipart(
            "/upload",
            &[
                ("faceImg", "face.txt", "text/plain", b"face"),
                ("tongue", "tongue.png", "image/png", b"tongue"),
                ("audio", "voice.mp3", "audio/mpeg", b"voice"),
            ],
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("不支持的文件类型: text/plain"));
    assert!(app.state.media.is_empty());
    assert!(app.client.last_request().is_none());
}

#[tokio::test]
async fn test_report_upload_requires_all_files() {
    let app = TestApp::new(Script::Complete(vec!["x"]));
    let (status, json) = app
        .send_json(post_multipart(
            "/upload",
            &[("faceImg", "face.jpg", "image/jpeg", b"face")],
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("请上传所有必需的文件"));
    assert!(app.state.media.is_empty());
}

#[tokio::test]
async fn test_cors_mirrors_origin_with_credentials() {
    let app = TestApp::new(Script::Complete(vec![]));
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/chat/session")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.router().oneshot(request).await.unwrap();
    let headers = response.headers();

    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5173"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "3600");
}
