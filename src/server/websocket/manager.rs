//! WebSocket 连接管理器
//!
//! 管理所有 WebSocket 连接，实现订阅过滤和进度事件节流
//!
//! ## 设计要点
//! - 订阅过滤：支持通配符匹配（如 `upload:*`）
//! - 节流机制：按任务分桶，只节流进度事件，终结事件全部送达

use crate::config::UploadConfig;
use crate::server::events::{ProgressThrottler, TimestampedEvent, UploadEvent};
use crate::server::websocket::message::WsServerMessage;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// WebSocket 连接信息
#[derive(Debug)]
pub struct WsConnection {
    /// 消息发送通道
    pub sender: mpsc::UnboundedSender<WsServerMessage>,
    /// 最后活动时间
    pub last_active: Instant,
}

/// WebSocket 管理器
#[derive(Debug)]
pub struct WebSocketManager {
    /// 所有连接
    connections: DashMap<String, WsConnection>,
    /// 订阅管理：connection_id -> 订阅模式集合
    subscriptions: DashMap<String, HashSet<String>>,
    /// 进度节流：task_id -> 节流器，任务终结时清理
    progress_throttlers: DashMap<String, ProgressThrottler>,
    /// 全局事件 ID 计数器
    event_id_counter: AtomicU64,
    /// 进度事件最小推送间隔（毫秒）
    throttle_interval_ms: u64,
}

impl WebSocketManager {
    /// 创建新的 WebSocket 管理器
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            connections: DashMap::new(),
            subscriptions: DashMap::new(),
            progress_throttlers: DashMap::new(),
            event_id_counter: AtomicU64::new(1),
            throttle_interval_ms: config.progress_throttle_ms,
        }
    }

    /// 注册连接，返回该连接的消息接收端
    pub fn register(&self, connection_id: String) -> mpsc::UnboundedReceiver<WsServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(
            connection_id.clone(),
            WsConnection {
                sender: tx,
                last_active: Instant::now(),
            },
        );
        info!("WebSocket 连接注册: {}", connection_id);
        rx
    }

    /// 注销连接并清理其订阅
    pub fn unregister(&self, connection_id: &str) {
        self.connections.remove(connection_id);
        self.subscriptions.remove(connection_id);
        debug!("WebSocket 连接注销: {}", connection_id);
    }

    /// 更新连接活跃时间
    pub fn touch(&self, connection_id: &str) {
        if let Some(mut conn) = self.connections.get_mut(connection_id) {
            conn.last_active = Instant::now();
        }
    }

    /// 添加订阅
    pub fn subscribe(&self, connection_id: &str, patterns: Vec<String>) {
        let mut subs = self
            .subscriptions
            .entry(connection_id.to_string())
            .or_default();
        for pattern in patterns {
            subs.insert(pattern);
        }
        info!("连接 {} 订阅更新: {:?}", connection_id, subs.value());
    }

    /// 移除订阅
    pub fn unsubscribe(&self, connection_id: &str, patterns: Vec<String>) {
        if let Some(mut subs) = self.subscriptions.get_mut(connection_id) {
            for pattern in &patterns {
                subs.remove(pattern);
            }
        }
    }

    /// 当前订阅列表
    pub fn get_subscriptions(&self, connection_id: &str) -> Vec<String> {
        self.subscriptions
            .get(connection_id)
            .map(|subs| subs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 当前连接数
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// 向指定连接发送一条消息
    pub fn send_to(&self, connection_id: &str, message: WsServerMessage) {
        if let Some(conn) = self.connections.get(connection_id) {
            if conn.sender.send(message).is_err() {
                drop(conn);
                self.unregister(connection_id);
            }
        }
    }

    /// 发布事件到所有符合订阅条件的连接
    ///
    /// 进度事件按任务节流；终结事件总是推送并清理该任务的节流器
    pub fn publish(&self, event: UploadEvent) {
        let task_id = event.task_id().to_string();

        if event.is_terminal() {
            self.progress_throttlers.remove(&task_id);
        } else {
            let throttler = self
                .progress_throttlers
                .entry(task_id.clone())
                .or_insert_with(|| ProgressThrottler::with_millis(self.throttle_interval_ms));
            if !throttler.should_emit() {
                return;
            }
        }

        let event_id = self.event_id_counter.fetch_add(1, Ordering::SeqCst);
        let wrapped = TimestampedEvent::new(event_id, event);

        let mut dead = Vec::new();
        for entry in self.connections.iter() {
            if !self.should_send(entry.key(), &wrapped.event) {
                continue;
            }
            let message = WsServerMessage::Event {
                event: wrapped.clone(),
            };
            if entry.value().sender.send(message).is_err() {
                dead.push(entry.key().clone());
            }
        }

        // 发送失败说明对端已断开，统一清理
        for connection_id in dead {
            self.unregister(&connection_id);
        }
    }

    /// 检查连接是否订阅了该事件
    fn should_send(&self, connection_id: &str, event: &UploadEvent) -> bool {
        let Some(subs) = self.subscriptions.get(connection_id) else {
            return false;
        };

        let event_type = event.event_type();
        let task_id = event.task_id();

        subs.contains("*")
            || subs.contains("upload")
            || subs.contains("upload:*")
            || subs.contains(&format!("upload:{}", event_type))
            || subs.contains(&format!("upload:{}:*", event_type))
            || subs.contains(&format!("upload:{}:{}", event_type, task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_without_throttle() -> WebSocketManager {
        let config = UploadConfig {
            progress_throttle_ms: 0,
            ..Default::default()
        };
        WebSocketManager::new(&config)
    }

    fn completed_event(id: &str) -> UploadEvent {
        UploadEvent::Completed {
            id: id.to_string(),
            response_code: Some(200),
            response_body: None,
        }
    }

    #[tokio::test]
    async fn test_register_publish_unregister() {
        let manager = manager_without_throttle();
        let mut rx = manager.register("c1".to_string());
        manager.subscribe("c1", vec!["upload:*".to_string()]);

        manager.publish(completed_event("7"));

        let message = rx.try_recv().unwrap();
        match message {
            WsServerMessage::Event { event } => {
                assert_eq!(event.event.task_id(), "7");
                assert!(event.event_id >= 1);
            }
            other => panic!("预期事件消息: {:?}", other),
        }

        manager.unregister("c1");
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribed_connection_receives_nothing() {
        let manager = manager_without_throttle();
        let mut rx = manager.register("c1".to_string());

        manager.publish(completed_event("1"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pattern_matching() {
        let manager = manager_without_throttle();

        let mut exact = manager.register("exact".to_string());
        manager.subscribe("exact", vec!["upload:completed:9".to_string()]);

        let mut wildcard = manager.register("wildcard".to_string());
        manager.subscribe("wildcard", vec!["*".to_string()]);

        let mut other = manager.register("other".to_string());
        manager.subscribe("other", vec!["upload:progress".to_string()]);

        manager.publish(completed_event("9"));

        assert!(exact.try_recv().is_ok());
        assert!(wildcard.try_recv().is_ok());
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_progress_throttled_terminal_passes() {
        let config = UploadConfig {
            progress_throttle_ms: 60_000,
            ..Default::default()
        };
        let manager = WebSocketManager::new(&config);
        let mut rx = manager.register("c1".to_string());
        manager.subscribe("c1", vec!["upload".to_string()]);

        let progress = |p: f32| UploadEvent::Progress {
            id: "t".to_string(),
            progress: p,
        };

        // 第一条进度放行，同一窗口内的后续进度被节流
        manager.publish(progress(10.0));
        manager.publish(progress(20.0));
        manager.publish(progress(30.0));
        // 终结事件不受节流影响
        manager.publish(completed_event("t"));

        let mut received = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let WsServerMessage::Event { event } = message {
                received.push(event.event.event_type());
            }
        }
        assert_eq!(received, vec!["progress", "completed"]);
    }
}
