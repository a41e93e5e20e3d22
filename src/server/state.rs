// 应用状态

use crate::config::AppConfig;
use crate::server::websocket::WebSocketManager;
use crate::uploader::UploadManager;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// 应用全局状态
#[derive(Clone)]
pub struct AppState {
    /// 上传管理器
    pub upload_manager: Arc<UploadManager>,
    /// WebSocket 管理器
    pub ws_manager: Arc<WebSocketManager>,
    /// 应用配置
    pub config: Arc<RwLock<AppConfig>>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(config: AppConfig) -> Self {
        let upload_manager = Arc::new(UploadManager::new(&config.upload));
        let ws_manager = Arc::new(WebSocketManager::new(&config.upload));

        Self {
            upload_manager,
            ws_manager,
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// 启动事件转发：把管理器发布的事件送入 WebSocket 推送层
    pub fn start_event_pump(&self) {
        let mut events_rx = self.upload_manager.subscribe();
        let ws_manager = Arc::clone(&self.ws_manager);

        tokio::spawn(async move {
            loop {
                match events_rx.recv().await {
                    Ok(event) => ws_manager.publish(event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("事件转发滞后，跳过 {} 条事件", skipped);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}
