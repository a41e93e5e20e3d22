// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS允许的源
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8520
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 资源引用（asset://）对应的本地目录
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,
    /// 连接超时（秒），缺省不限制；传输本身不设超时
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    /// 请求体分块大小（字节）
    #[serde(default = "default_body_chunk_size")]
    pub body_chunk_size: usize,
    /// 事件广播通道容量
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// 进度事件推送节流间隔（毫秒）
    #[serde(default = "default_progress_throttle_ms")]
    pub progress_throttle_ms: u64,
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_body_chunk_size() -> usize {
    64 * 1024
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_progress_throttle_ms() -> u64 {
    200
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            assets_dir: default_assets_dir(),
            connect_timeout_secs: None,
            body_chunk_size: default_body_chunk_size(),
            event_channel_capacity: default_event_channel_capacity(),
            progress_throttle_ms: default_progress_throttle_ms(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    false
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("读取配置文件失败: {}", path))?;
        let config: AppConfig =
            toml::from_str(&content).with_context(|| format!("解析配置文件失败: {}", path))?;
        Ok(config)
    }

    /// 加载配置，文件不存在或解析失败时使用默认值
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => config,
            Err(e) => {
                eprintln!("加载配置失败，使用默认配置: {:#}", e);
                Self::default()
            }
        }
    }
}
