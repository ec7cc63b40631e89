//! 文件上传与读取接口

use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::models::{ReportResponse, UploadResponse};
use crate::session::{MediaBundle, MediaField};
use crate::uploads::content_type_for;

/// 聊天图片上传，字段名 `file`
pub(super) async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().map(str::to_string);
        let content = field.bytes().await?;

        let stored = state.images.save(original_name.as_deref(), &content).await?;
        return Ok(Json(UploadResponse {
            url: stored.url(),
            filename: stored.original_name,
            size: stored.size.to_string(),
        }));
    }

    Err(ApiError::BadRequest("请选择要上传的文件".to_string()))
}

pub(super) async fn get_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let content = state.images.read(&filename).await?;
    Ok(([(header::CONTENT_TYPE, content_type_for(&filename))], content))
}

/// 问诊资料上传：面部照片、舌苔照片、语音，校验通过后立即生成报告
pub(super) async fn upload_report(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("[UPLOAD] 开始接收问诊资料");

    let mut bundle = MediaBundle::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(media_field) = field.name().and_then(MediaField::from_field_name) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let content = field.bytes().await?;
        bundle.insert(media_field, content_type.as_deref(), content)?;
    }
    bundle.ensure_complete()?;

    let session_id = Uuid::new_v4().to_string();
    state.media.store(&session_id, bundle);

    let report_content = state.reports.generate(&state.media, &session_id).await?;

    Ok(Json(ReportResponse {
        status: "success".to_string(),
        report_url: format!("/report/{}", session_id),
        session_id,
        report_content,
    }))
}
