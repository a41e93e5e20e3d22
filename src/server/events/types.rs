//! 上传事件类型定义
//!
//! 管理器通过广播通道发布事件，WebSocket 层订阅后实时推送给客户端

use serde::{Deserialize, Serialize};

/// 事件优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    /// 低优先级：进度更新
    Low = 0,
    /// 高优先级：完成、失败、取消等终结事件
    High = 1,
}

/// 上传任务事件
///
/// 每个成功启动的任务最终恰好产生一个终结事件
/// （completed / error / cancelled 三者之一）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// 发送进度
    Progress {
        id: String,
        /// 百分比 0-100；总大小未知时为 -1
        progress: f32,
    },
    /// 任务完成
    Completed {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        response_code: Option<u16>,
        /// 响应体文本；无数据或非 UTF-8 时为 null
        response_body: Option<String>,
    },
    /// 任务失败
    Error {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        response_code: Option<u16>,
        response_body: Option<String>,
        error: String,
    },
    /// 任务取消
    Cancelled {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        response_code: Option<u16>,
        response_body: Option<String>,
    },
}

impl UploadEvent {
    /// 事件类型名（与序列化后的 event_type 一致）
    pub fn event_type(&self) -> &'static str {
        match self {
            UploadEvent::Progress { .. } => "progress",
            UploadEvent::Completed { .. } => "completed",
            UploadEvent::Error { .. } => "error",
            UploadEvent::Cancelled { .. } => "cancelled",
        }
    }

    /// 关联的对外任务 ID
    pub fn task_id(&self) -> &str {
        match self {
            UploadEvent::Progress { id, .. }
            | UploadEvent::Completed { id, .. }
            | UploadEvent::Error { id, .. }
            | UploadEvent::Cancelled { id, .. } => id,
        }
    }

    /// 事件优先级
    pub fn priority(&self) -> EventPriority {
        match self {
            UploadEvent::Progress { .. } => EventPriority::Low,
            _ => EventPriority::High,
        }
    }

    /// 是否为终结事件
    pub fn is_terminal(&self) -> bool {
        self.priority() == EventPriority::High
    }
}

/// 带元数据的事件（WebSocket 推送格式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    /// 全局递增事件 ID
    pub event_id: u64,
    /// 服务端时间戳（毫秒）
    pub timestamp: i64,
    /// 事件内容
    #[serde(flatten)]
    pub event: UploadEvent,
}

impl TimestampedEvent {
    /// 包装事件并打上当前时间戳
    pub fn new(event_id: u64, event: UploadEvent) -> Self {
        Self {
            event_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
            event,
        }
    }
}
