// 本地文件信息模块
//
// 提供文件元信息查询和 MIME 类型推断

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 文件系统错误
/// 错误码范围：50001 - 50099
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// 路径为空或格式无法解析
    #[error("路径格式无效: {0}")]
    InvalidPath(String),
    /// 读取文件元数据失败
    #[error("读取文件元数据失败: {path:?}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    /// API 错误码
    pub fn code(&self) -> i32 {
        match self {
            FsError::InvalidPath(_) => 50001,
            FsError::Metadata { .. } => 50002,
        }
    }
}

/// 文件信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    /// 文件名（含扩展名）
    pub name: String,
    /// 扩展名（不含点号，可能为空）
    pub extension: String,
    /// 文件是否存在
    pub exists: bool,
    /// MIME 类型（仅当文件存在时返回）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// 文件大小（字节，仅当文件存在时返回）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// 规范化源路径
///
/// 支持三种写法：普通本地路径、file:// URI、带百分号编码的路径。
/// 返回可直接用于文件系统访问的路径
pub fn normalize_source_path(raw: &str) -> Result<PathBuf, FsError> {
    if raw.is_empty() {
        return Err(FsError::InvalidPath("路径为空".to_string()));
    }

    let stripped = raw.strip_prefix("file://").unwrap_or(raw);
    let decoded = urlencoding::decode(stripped)
        .map_err(|e| FsError::InvalidPath(format!("{}: {}", raw, e)))?;

    Ok(PathBuf::from(decoded.into_owned()))
}

/// 查询文件信息
///
/// 文件不存在不算错误，exists=false 且不返回 MIME/大小
pub fn file_info(raw_path: &str) -> Result<FileInfo, FsError> {
    let path = normalize_source_path(raw_path)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();

    let exists = path.exists();
    let (mime_type, size) = if exists {
        let metadata = std::fs::metadata(&path).map_err(|e| FsError::Metadata {
            path: path.clone(),
            source: e,
        })?;
        (Some(guess_mime_type(&name).to_string()), Some(metadata.len()))
    } else {
        (None, None)
    };

    Ok(FileInfo {
        name,
        extension,
        exists,
        mime_type,
        size,
    })
}

/// 按文件名推断 MIME 类型
///
/// 覆盖常见的媒体与文档类型，未识别时回退 application/octet-stream
pub fn guess_mime_type(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "m4v" => "video/x-m4v",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "aac" => "audio/aac",
        "ogg" => "audio/ogg",
        "txt" | "log" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        _ => "application/octet-stream",
    }
}
