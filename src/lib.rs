//! 问诊后端
//!
//! 把本地 Ollama 模型的回复以 JSON 或 SSE 的形式转发给浏览器，
//! 并提供聊天图片上传与问诊资料报告生成。

pub mod config;
pub mod models;
pub mod prompts;
pub mod providers;
pub mod relay;
pub mod report;
pub mod server;
pub mod session;
pub mod uploads;

pub use config::Config;
pub use server::{build_router, run_server, AppState};
