//! HTTP API 服务器
//!
//! 路由一览：
//! - `POST /chat`、`GET /chat-stream`：直接对话
//! - `POST /api/chat/session`、`GET /api/chat/stream`：先建会话再拉流
//! - `POST /api/upload`、`GET /api/images/:filename`：聊天图片
//! - `POST /upload`：问诊资料上传并生成报告
//! - `GET /health`

mod chat;
mod error;
mod media;
mod sessions;
#[cfg(test)]
mod tests;

pub use error::ApiError;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{DefaultBodyLimit, State},
    http::HeaderValue,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Config, CorsConfig};
use crate::models::HealthStatus;
use crate::providers::InferenceClient;
use crate::relay::SseRelay;
use crate::report::ReportService;
use crate::session::{MediaStore, SessionRegistry};
use crate::uploads::{ImageStorage, StorageError};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub inference: Arc<dyn InferenceClient>,
    pub sessions: Arc<SessionRegistry>,
    pub media: Arc<MediaStore>,
    pub images: Arc<ImageStorage>,
    pub relay: Arc<SseRelay>,
    pub reports: Arc<ReportService>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config, inference: Arc<dyn InferenceClient>) -> Result<Self, StorageError> {
        let images = ImageStorage::with_base_dir(&config.upload.dir)?;
        Ok(Self {
            sessions: Arc::new(SessionRegistry::new()),
            media: Arc::new(MediaStore::new(config.media.ttl())),
            images: Arc::new(images),
            relay: Arc::new(SseRelay::new(&config.stream)),
            reports: Arc::new(ReportService::new(Arc::clone(&inference), &config.ollama)),
            inference,
            config: Arc::new(config),
            start_time: Instant::now(),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes();
    let cors = cors_layer(&state.config.cors);

    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat::chat))
        .route("/chat-stream", get(chat::chat_stream))
        .route("/api/chat/session", post(sessions::create_session))
        .route("/api/chat/stream", get(sessions::session_stream))
        .route("/api/upload", post(media::upload_image))
        .route("/api/images/:filename", get(media::get_image))
        .route("/upload", post(media::upload_report))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 跨域策略
///
/// 带凭证时浏览器不接受 `*`，此时回显请求来源。
fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origin = if config.allows_any_origin() {
        if config.allow_credentials {
            AllowOrigin::mirror_request()
        } else {
            AllowOrigin::any()
        }
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("[SERVER] 忽略非法的跨域来源: {}", o);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(config.allow_credentials)
        .max_age(Duration::from_secs(config.max_age_secs))
}

/// 周期清理过期的多媒体数据与未拉流会话，`shutdown` 取消后退出
pub fn spawn_sweeper(state: &AppState, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    let media = Arc::clone(&state.media);
    let sessions = Arc::clone(&state.sessions);
    let session_ttl = state.config.media.session_ttl();
    let period = state.config.media.sweep_interval();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let media_evicted = media.evict_expired();
                    let sessions_evicted = sessions.evict_stale(session_ttl);
                    if sessions_evicted > 0 {
                        tracing::info!("[SESSION] 清理过期会话 {} 个", sessions_evicted);
                    }
                    tracing::debug!(
                        "[SERVER] 清理完成: media={}, sessions={}",
                        media_evicted,
                        sessions_evicted
                    );
                }
            }
        }
        tracing::debug!("[SERVER] 清理任务退出");
    })
}

/// 启动服务器，`shutdown` 取消后优雅退出
pub async fn run_server(
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: std::net::SocketAddr =
        format!("{}:{}", state.config.server.host, state.config.server.port).parse()?;

    let sweeper = spawn_sweeper(&state, shutdown.child_token());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("[SERVER] 正在监听: http://{}", addr);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.cancelled().await;
            tracing::info!("[SERVER] 收到退出信号");
        })
        .await?;

    shutdown.cancel();
    let _ = sweeper.await;
    Ok(())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthStatus {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_sessions: state.sessions.len(),
        pending_media: state.media.len(),
        available_stream_slots: state.relay.available_slots(),
    })
}
