//! 上传图片存储服务
//!
//! 所有文件平铺在上传目录下，文件名由服务端生成，读取时拒绝任何路径成分。

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use uuid::Uuid;

use super::types::{StorageError, StoredFile, IMAGE_ROUTE_PREFIX};

/// 上传图片存储服务
pub struct ImageStorage {
    /// 存储根目录（规范化后的绝对路径）
    base_dir: PathBuf,
}

impl ImageStorage {
    /// 使用指定目录创建存储服务，目录不存在时自动创建
    pub fn with_base_dir(base_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_dir = base_dir.as_ref();
        fs::create_dir_all(base_dir).map_err(|source| StorageError::Io {
            path: base_dir.to_path_buf(),
            source,
        })?;
        let base_dir = fs::canonicalize(base_dir).map_err(|source| StorageError::Io {
            path: base_dir.to_path_buf(),
            source,
        })?;
        tracing::info!("[UPLOAD] 上传目录: {}", base_dir.display());
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    // ========================================================================
    // 文件读写
    // ========================================================================

    /// 保存上传文件，返回生成的唯一文件名
    pub async fn save(
        &self,
        original_name: Option<&str>,
        content: &[u8],
    ) -> Result<StoredFile, StorageError> {
        if content.is_empty() {
            return Err(StorageError::EmptyFile);
        }

        let original_name = sanitize_file_name(original_name.unwrap_or_default());
        let filename = format!("{}_{}", Uuid::new_v4(), original_name);
        let path = self.base_dir.join(&filename);

        tokio::fs::write(&path, content)
            .await
            .map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::info!("[UPLOAD] 保存文件: {} ({} 字节)", filename, content.len());
        Ok(StoredFile {
            filename,
            original_name,
            size: content.len() as u64,
        })
    }

    /// 按文件名读取
    pub async fn read(&self, filename: &str) -> Result<Bytes, StorageError> {
        let path = self.path_for(filename)?;
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(filename.to_string()))
            }
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    /// 把会话中的图片引用解析为 base64 数据
    ///
    /// 支持：`data:` URL、`/api/images/{name}`、上传目录内的绝对路径、裸文件名。
    pub async fn resolve_image(&self, reference: &str) -> Result<String, StorageError> {
        let reference = reference.trim();

        if let Some(payload) = data_url_payload(reference) {
            STANDARD
                .decode(payload)
                .map_err(|e| StorageError::InvalidInline(e.to_string()))?;
            return Ok(payload.to_string());
        }

        let filename = self.filename_for_reference(reference).await?;
        let content = self.read(&filename).await?;
        Ok(STANDARD.encode(content))
    }

    async fn filename_for_reference(&self, reference: &str) -> Result<String, StorageError> {
        if let Some(name) = reference.strip_prefix(IMAGE_ROUTE_PREFIX) {
            return Ok(name.to_string());
        }

        let path = Path::new(reference);
        if path.is_absolute() {
            let inside = match path.parent() {
                Some(parent) => tokio::fs::canonicalize(parent)
                    .await
                    .map(|p| p == self.base_dir)
                    .unwrap_or(false),
                None => false,
            };
            return match (inside, path.file_name().and_then(|n| n.to_str())) {
                (true, Some(name)) => Ok(name.to_string()),
                _ => Err(StorageError::OutsideUploadDir(reference.to_string())),
            };
        }

        Ok(reference.to_string())
    }

    fn path_for(&self, filename: &str) -> Result<PathBuf, StorageError> {
        validate_file_name(filename)?;
        Ok(self.base_dir.join(filename))
    }
}

// ============================================================================
// 辅助函数
// ============================================================================

/// 取客户端文件名的最后一段，去掉路径成分
pub fn sanitize_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_start_matches('.');
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// 只拒绝能逃出上传目录的名字；`a..b.png` 这类名字是合法的
fn validate_file_name(filename: &str) -> Result<(), StorageError> {
    let invalid = filename.is_empty()
        || filename.starts_with('.')
        || filename.contains(['/', '\\', '\0']);
    if invalid {
        Err(StorageError::InvalidName(filename.to_string()))
    } else {
        Ok(())
    }
}

fn data_url_payload(reference: &str) -> Option<&str> {
    let rest = reference.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    header.ends_with(";base64").then_some(payload)
}

/// 根据文件扩展名推断响应类型
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}
