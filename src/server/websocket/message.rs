//! WebSocket 消息类型定义

use crate::server::events::TimestampedEvent;
use serde::{Deserialize, Serialize};

/// 客户端发送给服务端的消息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsClientMessage {
    /// 心跳 Ping
    Ping {
        /// 客户端时间戳（毫秒）
        timestamp: i64,
    },
    /// 订阅事件
    ///
    /// 支持的订阅模式：
    /// - `upload` - 所有上传事件
    /// - `upload:*` - 所有上传事件（通配符）
    /// - `upload:progress` / `upload:progress:*` - 某一类事件
    /// - `upload:progress:<task_id>` - 精确匹配
    /// - `*` - 所有事件
    Subscribe {
        /// 要订阅的模式列表
        subscriptions: Vec<String>,
    },
    /// 取消订阅事件
    Unsubscribe {
        /// 要取消订阅的模式列表
        subscriptions: Vec<String>,
    },
}

/// 服务端发送给客户端的消息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    /// 心跳 Pong
    Pong {
        /// 服务端时间戳（毫秒）
        timestamp: i64,
        /// 回显客户端时间戳（用于计算延迟）
        client_timestamp: Option<i64>,
    },
    /// 连接成功
    Connected {
        /// 连接 ID
        connection_id: String,
        /// 服务端时间戳
        timestamp: i64,
    },
    /// 单个事件
    Event {
        /// 事件内容
        #[serde(flatten)]
        event: TimestampedEvent,
    },
    /// 订阅成功
    SubscribeSuccess {
        /// 当前订阅列表
        subscriptions: Vec<String>,
    },
    /// 错误消息
    Error {
        /// 错误码
        code: String,
        /// 错误信息
        message: String,
    },
}

impl WsServerMessage {
    /// 构造连接成功消息
    pub fn connected(connection_id: String) -> Self {
        Self::Connected {
            connection_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// 构造 Pong 消息
    pub fn pong(client_timestamp: Option<i64>) -> Self {
        Self::Pong {
            timestamp: chrono::Utc::now().timestamp_millis(),
            client_timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_parse() {
        let json = r#"{"type":"subscribe","subscriptions":["upload:*"]}"#;
        let message: WsClientMessage = serde_json::from_str(json).unwrap();
        match message {
            WsClientMessage::Subscribe { subscriptions } => {
                assert_eq!(subscriptions, vec!["upload:*"]);
            }
            other => panic!("解析结果错误: {:?}", other),
        }
    }

    #[test]
    fn test_server_message_tag() {
        let json = serde_json::to_value(WsServerMessage::pong(Some(123))).unwrap();
        assert_eq!(json["type"], "pong");
        assert_eq!(json["client_timestamp"], 123);
    }
}
