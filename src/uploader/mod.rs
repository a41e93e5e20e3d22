// 上传引擎模块
//
// 后台文件上传的核心实现：
// - `manager.rs`: 上传任务管理器（校验、派发、回调处理、事件发布）
// - `session.rs`: 传输会话（惰性创建的 HTTP 客户端 + 任务执行）
// - `registry.rs`: 任务注册表（ID 映射 + 响应体缓冲）
// - `multipart.rs`: multipart/form-data 编码器
// - `resolver.rs`: 资源引用解析
// - `task.rs` / `types.rs`: 任务与请求类型定义

pub mod manager;
pub mod multipart;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod task;
pub mod types;

pub use manager::UploadManager;
pub use multipart::EncodeError;
pub use registry::TaskRegistry;
pub use resolver::{AssetResolver, DirAssetResolver, ResolveError};
pub use session::{RequestBody, TransferEventSink, TransferSpec, TransportSession};
pub use task::{UploadTask, UploadTaskStatus};
pub use types::{TransferOutcome, UploadError, UploadMode, UploadRequest};
