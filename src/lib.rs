// Upload Hub Rust Library
// 后台文件上传协调服务核心库

// 配置管理模块
pub mod config;

// 日志模块
pub mod logging;

// 本地文件信息模块
pub mod filesystem;

// Web服务器模块
pub mod server;

// 上传引擎模块
pub mod uploader;

// 导出常用类型
pub use config::AppConfig;
pub use filesystem::{file_info, guess_mime_type, FileInfo, FsError};
pub use server::events::{TimestampedEvent, UploadEvent};
pub use server::AppState;
pub use uploader::{
    AssetResolver, DirAssetResolver, TransferEventSink, TransferOutcome, TransportSession,
    UploadError, UploadManager, UploadMode, UploadRequest, UploadTask, UploadTaskStatus,
};
