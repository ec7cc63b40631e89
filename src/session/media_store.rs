//! 问诊多媒体暂存
//!
//! 按上传会话 ID 暂存面部照片、舌苔照片和语音。
//! 数据写入一次、被报告生成读取一次；未被读取的数据超过 TTL 后由清理任务回收。

use bytes::Bytes;
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// 上传表单中的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaField {
    FaceImg,
    Tongue,
    Audio,
}

impl MediaField {
    pub const ALL: [MediaField; 3] = [MediaField::FaceImg, MediaField::Tongue, MediaField::Audio];

    /// multipart 字段名
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::FaceImg => "faceImg",
            Self::Tongue => "tongue",
            Self::Audio => "audio",
        }
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.field_name() == name)
    }

    /// 允许的声明类型（仅校验 Content-Type，不嗅探内容）
    pub fn allowed_types(&self) -> &'static [&'static str] {
        match self {
            Self::FaceImg | Self::Tongue => &["image/jpeg", "image/png"],
            Self::Audio => &["audio/mpeg", "audio/aac"],
        }
    }
}

impl std::fmt::Display for MediaField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field_name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("请上传所有必需的文件，缺少: {0}")]
    Missing(MediaField),
    #[error("文件 {0} 为空")]
    Empty(MediaField),
    #[error("无法识别文件类型: {0}")]
    UnknownType(MediaField),
    #[error("不支持的文件类型: {content_type} 仅支持: {allowed}")]
    UnsupportedType {
        field: MediaField,
        content_type: String,
        allowed: String,
    },
    #[error("无效的sessionId: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone)]
pub struct MediaPart {
    pub content_type: String,
    pub bytes: Bytes,
}

/// 一次上传的全部文件
#[derive(Debug, Clone, Default)]
pub struct MediaBundle {
    parts: HashMap<MediaField, MediaPart>,
}

impl MediaBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入一个文件，校验非空与声明类型
    pub fn insert(
        &mut self,
        field: MediaField,
        content_type: Option<&str>,
        bytes: Bytes,
    ) -> Result<(), MediaError> {
        if bytes.is_empty() {
            return Err(MediaError::Empty(field));
        }
        let content_type = content_type.ok_or(MediaError::UnknownType(field))?;
        if !field.allowed_types().contains(&content_type) {
            return Err(MediaError::UnsupportedType {
                field,
                content_type: content_type.to_string(),
                allowed: field.allowed_types().join(", "),
            });
        }
        self.parts.insert(
            field,
            MediaPart {
                content_type: content_type.to_string(),
                bytes,
            },
        );
        Ok(())
    }

    /// 确认三个字段都已上传
    pub fn ensure_complete(&self) -> Result<(), MediaError> {
        match MediaField::ALL.into_iter().find(|f| !self.parts.contains_key(f)) {
            Some(missing) => Err(MediaError::Missing(missing)),
            None => Ok(()),
        }
    }

    pub fn get(&self, field: MediaField) -> Option<&MediaPart> {
        self.parts.get(&field)
    }

    pub fn total_size(&self) -> usize {
        self.parts.values().map(|p| p.bytes.len()).sum()
    }
}

struct MediaEntry {
    bundle: MediaBundle,
    stored_at: Instant,
}

pub struct MediaStore {
    entries: DashMap<String, MediaEntry>,
    ttl: Duration,
}

impl MediaStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// 写入；同一 ID 已有数据时覆盖
    pub fn store(&self, session_id: &str, bundle: MediaBundle) {
        tracing::debug!(
            "[MEDIA] 暂存 {} ({} 字节)",
            session_id,
            bundle.total_size()
        );
        self.entries.insert(
            session_id.to_string(),
            MediaEntry {
                bundle,
                stored_at: Instant::now(),
            },
        );
    }

    /// 取出并删除；已过期的数据视为不存在
    pub fn consume(&self, session_id: &str) -> Result<MediaBundle, MediaError> {
        match self.entries.remove(session_id) {
            Some((_, entry)) if entry.stored_at.elapsed() < self.ttl => Ok(entry.bundle),
            _ => Err(MediaError::NotFound(session_id.to_string())),
        }
    }

    /// 清理过期数据，返回清理数量
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            tracing::info!("[MEDIA] 清理过期多媒体数据 {} 条", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
