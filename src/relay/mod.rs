//! 模型输出到浏览器的 SSE 转发

mod sse_relay;
mod types;

pub use sse_relay::{RelayHandle, SseRelay};
pub use types::{normalize_newlines, RelayError, RelayEvent, RelayState, COMPLETE_EVENT, MESSAGE_EVENT};
