//! YAML 配置加载
//!
//! 查找顺序：命令行参数 > `WENZHEN_CONFIG` > 当前目录 `config.yaml` > 内置默认值。
//! 加载后再应用环境变量覆盖并校验。

use super::types::Config;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 配置文件环境变量
pub const CONFIG_PATH_ENV: &str = "WENZHEN_CONFIG";

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件失败: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("配置无效: {0}")]
    Invalid(String),
}

/// 确定要加载的配置文件路径；返回 None 表示使用默认配置
pub fn resolve_config_path(cli_arg: Option<String>) -> Option<PathBuf> {
    if let Some(arg) = cli_arg.filter(|a| !a.trim().is_empty()) {
        return Some(PathBuf::from(arg));
    }
    if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
        if !env_path.trim().is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    local.exists().then_some(local)
}

/// 从 YAML 字符串解析配置
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    if content.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(content)?)
}

/// 加载配置：读取文件（可选）、应用环境变量覆盖、校验
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::info!("[CONFIG] 加载配置文件: {}", path.display());
            parse_config(&content)?
        }
        None => {
            tracing::info!("[CONFIG] 未找到配置文件，使用默认配置");
            Config::default()
        }
    };

    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// 应用环境变量覆盖
    ///
    /// `lookup` 便于测试时注入变量而不污染进程环境。
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("WENZHEN_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("WENZHEN_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("WENZHEN_PORT 不是合法端口: {port}")))?;
        }
        if let Some(base_url) = lookup("OLLAMA_BASE_URL") {
            self.ollama.base_url = base_url;
        }
        if let Some(dir) = lookup("WENZHEN_UPLOAD_DIR") {
            self.upload.dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port 不能为 0".to_string()));
        }
        if self.ollama.model.trim().is_empty() {
            return Err(ConfigError::Invalid("ollama.model 不能为空".to_string()));
        }
        url::Url::parse(&self.ollama.base_url).map_err(|e| {
            ConfigError::Invalid(format!(
                "ollama.base_url 无法解析 ({}): {}",
                self.ollama.base_url, e
            ))
        })?;
        if self.stream.timeout_secs == 0 {
            return Err(ConfigError::Invalid("stream.timeout_secs 必须大于 0".to_string()));
        }
        if self.stream.max_concurrent == 0 {
            return Err(ConfigError::Invalid("stream.max_concurrent 必须大于 0".to_string()));
        }
        if self.stream.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "stream.channel_capacity 必须大于 0".to_string(),
            ));
        }
        if self.upload.dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("upload.dir 不能为空".to_string()));
        }
        Ok(())
    }
}
