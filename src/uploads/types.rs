//! 上传文件类型定义

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// 图片访问路由前缀
pub const IMAGE_ROUTE_PREFIX: &str = "/api/images/";

/// 已保存的上传文件
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    /// 生成的唯一文件名（`{uuid}_{原文件名}`）
    pub filename: String,
    /// 清理后的原文件名
    pub original_name: String,
    /// 文件大小（字节）
    pub size: u64,
}

impl StoredFile {
    /// 前端访问地址
    pub fn url(&self) -> String {
        format!("{}{}", IMAGE_ROUTE_PREFIX, self.filename)
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("上传文件为空")]
    EmptyFile,
    #[error("非法文件名: {0}")]
    InvalidName(String),
    #[error("文件不存在: {0}")]
    NotFound(String),
    #[error("图片引用不在上传目录内: {0}")]
    OutsideUploadDir(String),
    #[error("图片数据不是合法的 base64: {0}")]
    InvalidInline(String),
    #[error("文件读写失败 {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
