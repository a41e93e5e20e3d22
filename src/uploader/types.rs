// 上传模块类型定义

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::uploader::multipart::EncodeError;

/// 请求体编码模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// 直接以文件内容作为请求体
    #[default]
    Raw,
    /// multipart/form-data 编码（参数 + 单个文件）
    Multipart,
}

impl UploadMode {
    /// 从字符串解析模式（API 层使用 "raw" / "multipart"）
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "raw" => Some(UploadMode::Raw),
            "multipart" => Some(UploadMode::Multipart),
            _ => None,
        }
    }
}

/// 上传请求
///
/// 调用方提交的完整描述，校验通过后才会创建传输任务
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// 目标地址（必须是绝对 URL）
    pub destination_url: String,
    /// HTTP 方法（默认 POST）
    pub method: Option<String>,
    /// 本地文件路径、file:// URI 或资源引用（asset://...）
    pub source_path: String,
    /// 请求体编码模式
    pub mode: UploadMode,
    /// multipart 文件字段名（仅 multipart 模式有效）
    pub field_name: Option<String>,
    /// 调用方自定义任务 ID（缺省时由管理器分配序号）
    pub caller_task_id: Option<String>,
    /// 自定义请求头
    pub headers: BTreeMap<String, String>,
    /// 表单参数（仅 multipart 模式有效）
    pub parameters: BTreeMap<String, String>,
    /// 传输会话分组标识（进程生命周期内仅首次生效）
    pub shared_container_id: Option<String>,
}

/// 单次传输的最终结果
///
/// 由传输会话产出，管理器据此区分完成/取消/失败，
/// 不需要检查任何传输层内部的错误码
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// 传输层正常完成（HTTP 状态码不影响该判定）
    Success,
    /// 因取消请求而终止
    Cancelled,
    /// 网络或协议层失败
    Failed(String),
}

/// 上传请求错误
///
/// 全部在任务创建之前同步返回，不会产生任何事件
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// 目标地址缺失或无法解析为绝对 URL
    #[error("目标地址无效: {0}")]
    InvalidUrl(String),
    /// HTTP 方法无法解析
    #[error("HTTP 方法无效: {0}")]
    InvalidMethod(String),
    /// 请求头名称或值非法
    #[error("请求头无效: {0}")]
    InvalidHeader(String),
    /// raw 模式携带了表单参数
    #[error("parameters 仅在 multipart 模式下有效")]
    ParametersNotAllowed,
    /// multipart 模式缺少文件字段名
    #[error("multipart 模式缺少 field 字段名")]
    MissingFieldName,
    /// 源文件路径无法解析
    #[error("源文件路径无效: {0}")]
    InvalidSourcePath(String),
    /// 资源引用无法落地为本地文件
    #[error("资源解析失败: {0}")]
    AssetResolution(String),
    /// multipart 请求体构建失败
    #[error("multipart 请求体编码失败: {0}")]
    Encoding(#[from] EncodeError),
    /// 传输会话初始化失败
    #[error("传输会话初始化失败: {0}")]
    Session(String),
}

impl UploadError {
    /// API 错误码
    /// 错误码范围：40001 - 40099
    pub fn code(&self) -> i32 {
        match self {
            UploadError::InvalidUrl(_) => 40001,
            UploadError::InvalidMethod(_) => 40002,
            UploadError::InvalidHeader(_) => 40003,
            UploadError::ParametersNotAllowed => 40004,
            UploadError::MissingFieldName => 40005,
            UploadError::InvalidSourcePath(_) => 40006,
            UploadError::AssetResolution(_) => 40007,
            UploadError::Encoding(_) => 40008,
            UploadError::Session(_) => 40009,
        }
    }
}
