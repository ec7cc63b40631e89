//! 配置管理模块
//!
//! 提供 YAML 配置文件支持、环境变量覆盖和配置校验

mod types;
mod yaml;

pub use types::{
    Config, CorsConfig, LoggingConfig, MediaConfig, OllamaConfig, ServerConfig, StreamConfig,
    UploadConfig, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT,
};
pub use yaml::{
    load_config, parse_config, resolve_config_path, ConfigError, CONFIG_PATH_ENV,
    DEFAULT_CONFIG_FILE,
};
