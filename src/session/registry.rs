//! 聊天会话注册表
//!
//! 保存"已创建、待拉流"的聊天请求。会话只能被拉流一次：
//! [`SessionRegistry::claim`] 把会话标记为流式进行中并返回 [`SessionLease`]，
//! 租约释放时会话被移除，无论流是正常结束、出错还是超时。

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// 待处理的聊天请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub id: String,
    pub message: String,
    /// 图片引用，按提交顺序
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("无效的会话ID：{0}")]
    NotFound(String),
    #[error("会话 {0} 正在输出中")]
    AlreadyStreaming(String),
}

struct SessionEntry {
    session: ChatSession,
    claimed: bool,
    inserted_at: Instant,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建会话并返回新的会话 ID
    pub fn create(&self, message: impl Into<String>, images: Vec<String>) -> String {
        let id = Uuid::new_v4().to_string();
        let session = ChatSession {
            id: id.clone(),
            message: message.into(),
            images,
            created_at: Utc::now(),
        };
        tracing::debug!(
            "[SESSION] 创建会话 {} (图片 {} 张)",
            id,
            session.images.len()
        );
        self.sessions.insert(
            id.clone(),
            SessionEntry {
                session,
                claimed: false,
                inserted_at: Instant::now(),
            },
        );
        id
    }

    /// 查询会话，不修改状态
    pub fn get(&self, session_id: &str) -> Result<ChatSession, SessionError> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.session.clone())
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// 删除会话；重复删除或删除不存在的 ID 均为空操作
    pub fn remove(&self, session_id: &str) {
        if self.sessions.remove(session_id).is_some() {
            tracing::debug!("[SESSION] 移除会话 {}", session_id);
        }
    }

    /// 认领会话用于拉流
    ///
    /// 检查与标记在同一个分片锁内完成，同一会话不会被两个流同时认领。
    pub fn claim(
        self: &Arc<Self>,
        session_id: &str,
    ) -> Result<(ChatSession, SessionLease), SessionError> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        if entry.claimed {
            return Err(SessionError::AlreadyStreaming(session_id.to_string()));
        }
        entry.claimed = true;
        let session = entry.session.clone();
        drop(entry);

        Ok((
            session,
            SessionLease {
                registry: Arc::clone(self),
                session_id: session_id.to_string(),
            },
        ))
    }

    /// 清理创建后长时间未被拉流的会话，返回清理数量
    pub fn evict_stale(&self, max_age: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, entry| entry.claimed || entry.inserted_at.elapsed() < max_age);
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// 会话租约
///
/// 持有者即会话的唯一输出流；drop 时从注册表移除会话。
pub struct SessionLease {
    registry: Arc<SessionRegistry>,
    session_id: String,
}

impl SessionLease {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.registry.remove(&self.session_id);
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("session_id", &self.session_id)
            .finish()
    }
}
