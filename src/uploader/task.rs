// 上传任务定义

use serde::{Deserialize, Serialize};

use crate::uploader::types::UploadMode;

/// 上传任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadTaskStatus {
    /// 传输中
    Running,
    /// 已完成
    Completed,
    /// 已失败
    Failed,
    /// 已取消
    Cancelled,
}

impl UploadTaskStatus {
    /// 获取状态的中文描述
    pub fn description(&self) -> &'static str {
        match self {
            UploadTaskStatus::Running => "传输中",
            UploadTaskStatus::Completed => "已完成",
            UploadTaskStatus::Failed => "已失败",
            UploadTaskStatus::Cancelled => "已取消",
        }
    }

    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadTaskStatus::Running)
    }
}

/// 上传任务
///
/// 对外展示的任务快照。runtime_id 由传输会话分配，只在会话内部有意义；
/// public_id 是事件关联和取消操作使用的对外标识
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadTask {
    /// 会话内部任务 ID
    pub runtime_id: u64,
    /// 对外任务 ID
    pub public_id: String,
    /// 目标地址
    pub destination_url: String,
    /// 源文件路径
    pub source_path: String,
    /// 请求体编码模式
    pub mode: UploadMode,
    /// 任务状态
    pub status: UploadTaskStatus,
    /// 创建时间 (Unix timestamp)
    pub created_at: i64,
    /// 更新时间 (Unix timestamp)
    pub updated_at: i64,
}

impl UploadTask {
    /// 创建新的上传任务（初始即为传输中）
    pub fn new(
        runtime_id: u64,
        public_id: String,
        destination_url: String,
        source_path: String,
        mode: UploadMode,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            runtime_id,
            public_id,
            destination_url,
            source_path,
            mode,
            status: UploadTaskStatus::Running,
            created_at: now,
            updated_at: now,
        }
    }

    /// 更新时间戳
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp();
    }

    /// 标记为已完成
    pub fn mark_completed(&mut self) {
        self.status = UploadTaskStatus::Completed;
        self.touch();
    }

    /// 标记为已失败
    pub fn mark_failed(&mut self) {
        self.status = UploadTaskStatus::Failed;
        self.touch();
    }

    /// 标记为已取消
    pub fn mark_cancelled(&mut self) {
        self.status = UploadTaskStatus::Cancelled;
        self.touch();
    }
}
