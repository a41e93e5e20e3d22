//! 事件模块
//!
//! 定义上传任务事件类型和推送节流工具
//! - `types.rs`: 事件类型（progress/completed/error/cancelled）
//! - `throttle.rs`: 进度事件节流器

mod throttle;
mod types;

pub use throttle::*;
pub use types::*;
