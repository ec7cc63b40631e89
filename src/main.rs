use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wenzhen_lib::config::{load_config, resolve_config_path};
use wenzhen_lib::providers::OllamaProvider;
use wenzhen_lib::{run_server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path(std::env::args().nth(1));
    let config = load_config(config_path.as_deref()).context("加载配置失败")?;

    // RUST_LOG 优先
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.logging.level))),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "[SERVER] wenzhen v{} 启动, model={}, ollama={}, upload_dir={}",
        env!("CARGO_PKG_VERSION"),
        config.ollama.model,
        config.ollama.base_url,
        config.upload.dir.display()
    );

    let provider = OllamaProvider::new(&config.ollama).context("创建 Ollama 客户端失败")?;
    let state = AppState::new(config, Arc::new(provider)).context("初始化上传目录失败")?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    run_server(state, shutdown)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("服务器异常退出")?;

    tracing::info!("[SERVER] 已退出");
    Ok(())
}
