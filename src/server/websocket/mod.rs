//! WebSocket 模块
//!
//! 事件实时推送：连接管理、订阅过滤、消息类型

pub mod handler;
pub mod manager;
pub mod message;

pub use handler::handle_websocket;
pub use manager::WebSocketManager;
pub use message::{WsClientMessage, WsServerMessage};
