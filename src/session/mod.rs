//! 会话管理模块
//!
//! 提供以下功能：
//! - 聊天会话注册表（创建、查询、一次性认领、幂等删除）
//! - 问诊多媒体暂存（写一次、读一次、TTL 回收）

mod media_store;
mod registry;

pub use media_store::{MediaBundle, MediaError, MediaField, MediaPart, MediaStore};
pub use registry::{ChatSession, SessionError, SessionLease, SessionRegistry};
