pub mod api;
pub mod ollama;

pub use api::*;
pub use ollama::{ChatRequest, ChatResponse, ErrorBody, Message, Role};
