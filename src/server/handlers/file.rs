use crate::filesystem::{self, FileInfo};
use crate::server::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing::warn;

use super::ApiResponse;

/// 文件信息查询参数
#[derive(Debug, Deserialize)]
pub struct FileInfoQuery {
    /// 本地文件路径或 file:// URI
    pub path: String,
}

/// GET /api/v1/files/info
/// 查询文件元信息（名称、扩展名、是否存在、MIME 类型、大小）
pub async fn get_file_info(
    State(_app_state): State<AppState>,
    Query(query): Query<FileInfoQuery>,
) -> Result<Json<ApiResponse<FileInfo>>, StatusCode> {
    match filesystem::file_info(&query.path) {
        Ok(info) => Ok(Json(ApiResponse::success(info))),
        Err(e) => {
            warn!("查询文件信息失败: {}: {}", query.path, e);
            Ok(Json(ApiResponse::error(e.code(), e.to_string())))
        }
    }
}
