//! 配置类型定义
//!
//! 所有字段均有默认值，配置文件中可以只写需要覆盖的部分。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 默认的问诊系统提示词
pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一个中医问诊专家";

/// 默认模型
pub const DEFAULT_MODEL: &str = "gemma3:4b";

/// 主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub ollama: OllamaConfig,
    pub stream: StreamConfig,
    pub upload: UploadConfig,
    pub media: MediaConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

/// HTTP 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 请求体大小上限（MB），主要限制 multipart 上传
    pub body_limit_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            body_limit_mb: 50,
        }
    }
}

impl ServerConfig {
    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_mb * 1024 * 1024
    }
}

/// Ollama 推理服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    /// 未指定 systemMessage 时使用的系统提示词
    pub system_prompt: String,
    pub connect_timeout_secs: u64,
    /// 非流式请求的整体超时；流式请求由 stream.timeout_secs 控制
    pub request_timeout_secs: u64,
    /// 透传给 Ollama 的 keep_alive（如 "5m"）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<String>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 300,
            keep_alive: None,
        }
    }
}

impl OllamaConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// SSE 流式转发配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// 单个流的最长存活时间（秒）
    pub timeout_secs: u64,
    /// 同时进行中的流数量上限
    pub max_concurrent: usize,
    /// 转发任务到客户端连接之间的缓冲事件数
    pub channel_capacity: usize,
    /// SSE 心跳注释间隔（秒）
    pub keep_alive_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_concurrent: 64,
            channel_capacity: 32,
            keep_alive_secs: 15,
        }
    }
}

impl StreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// 图片上传目录配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub dir: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("file_dir"),
        }
    }
}

/// 内存数据的过期策略
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// 未被消费的多媒体数据保留时间（秒）
    pub ttl_secs: u64,
    /// 创建后一直未被拉流的会话保留时间（秒）
    pub session_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            session_ttl_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

impl MediaConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// 跨域配置
///
/// 默认是开发模式下的全放行策略，生产环境应显式列出来源。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: true,
            max_age_secs: 3600,
        }
    }
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == "*")
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// RUST_LOG 未设置时使用的过滤级别
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
