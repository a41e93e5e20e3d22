use crate::server::AppState;
use crate::uploader::{UploadMode, UploadRequest, UploadTask};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{error, info};

use super::ApiResponse;

/// 创建上传任务请求
#[derive(Debug, Deserialize)]
pub struct CreateUploadRequest {
    /// 目标地址
    pub url: String,
    /// 源文件路径、file:// URI 或 asset:// 引用
    pub path: String,
    /// HTTP 方法（默认 POST）
    #[serde(default)]
    pub method: Option<String>,
    /// 编码模式："raw"（默认）或 "multipart"
    #[serde(default, rename = "type")]
    pub upload_type: Option<String>,
    /// multipart 文件字段名
    #[serde(default)]
    pub field: Option<String>,
    /// 调用方自定义任务 ID
    #[serde(default)]
    pub custom_upload_id: Option<String>,
    /// 传输会话分组标识
    #[serde(default)]
    pub app_group: Option<String>,
    /// 自定义请求头
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// 表单参数（仅 multipart 模式）
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// POST /api/v1/uploads
/// 创建并启动上传任务，返回对外任务 ID
pub async fn create_upload(
    State(app_state): State<AppState>,
    Json(req): Json<CreateUploadRequest>,
) -> Result<Json<ApiResponse<String>>, StatusCode> {
    let mode = match req.upload_type.as_deref() {
        None => UploadMode::Raw,
        Some(s) => match UploadMode::parse(s) {
            Some(mode) => mode,
            None => {
                return Ok(Json(ApiResponse::error(
                    40000,
                    format!("未知的上传类型: {}", s),
                )));
            }
        },
    };

    let request = UploadRequest {
        destination_url: req.url,
        method: req.method,
        source_path: req.path,
        mode,
        field_name: req.field,
        caller_task_id: req.custom_upload_id,
        headers: req.headers,
        parameters: req.parameters,
        shared_container_id: req.app_group,
    };

    match app_state.upload_manager.start_upload(request).await {
        Ok(public_id) => {
            info!("创建上传任务成功: {}", public_id);
            Ok(Json(ApiResponse::success(public_id)))
        }
        Err(e) => {
            error!("创建上传任务失败: {}", e);
            Ok(Json(ApiResponse::error(e.code(), e.to_string())))
        }
    }
}

/// POST /api/v1/uploads/:id/cancel
/// 取消上传任务（未知 ID 视为无操作，同样返回成功）
pub async fn cancel_upload(
    State(app_state): State<AppState>,
    Path(public_id): Path<String>,
) -> Result<Json<ApiResponse<bool>>, StatusCode> {
    let result = app_state.upload_manager.cancel_upload(&public_id);
    Ok(Json(ApiResponse::success(result)))
}

/// GET /api/v1/uploads
/// 获取当前存活的上传任务
pub async fn get_active_uploads(
    State(app_state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<UploadTask>>>, StatusCode> {
    let tasks = app_state.upload_manager.active_uploads();
    Ok(Json(ApiResponse::success(tasks)))
}
