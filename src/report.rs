//! 问诊报告生成
//!
//! 从暂存区取出一次上传的面部与舌苔照片，交给模型做一次非流式分析。

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::config::OllamaConfig;
use crate::models::{ChatRequest, Message};
use crate::prompts::{REPORT_ANALYSIS_PROMPT, REPORT_SYSTEM_PROMPT};
use crate::providers::{InferenceClient, ProviderError};
use crate::session::{MediaError, MediaField, MediaStore};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("模型未返回报告内容")]
    EmptyReply,
}

pub struct ReportService {
    client: Arc<dyn InferenceClient>,
    model: String,
    keep_alive: Option<String>,
}

impl ReportService {
    pub fn new(client: Arc<dyn InferenceClient>, config: &OllamaConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            keep_alive: config.keep_alive.clone(),
        }
    }

    /// 生成报告正文
    ///
    /// 暂存数据在调用时即被取出，无论模型调用是否成功都不会保留第二份。
    pub async fn generate(&self, store: &MediaStore, session_id: &str) -> Result<String, ReportError> {
        let bundle = store.consume(session_id)?;

        let mut images = Vec::with_capacity(2);
        for field in [MediaField::FaceImg, MediaField::Tongue] {
            let part = bundle.get(field).ok_or(MediaError::Missing(field))?;
            images.push(STANDARD.encode(&part.bytes));
        }

        let request = ChatRequest::new(
            self.model.clone(),
            vec![
                Message::system(REPORT_SYSTEM_PROMPT),
                Message::user(REPORT_ANALYSIS_PROMPT).with_images(images),
            ],
        )
        .keep_alive(self.keep_alive.clone());

        tracing::info!("[REPORT] 开始生成报告: {}", session_id);
        let response = self.client.chat(&request).await?;
        let content = response
            .content()
            .filter(|c| !c.trim().is_empty())
            .ok_or(ReportError::EmptyReply)?
            .to_string();
        tracing::info!("[REPORT] 报告生成完成: {} ({} 字符)", session_id, content.chars().count());
        Ok(content)
    }
}
