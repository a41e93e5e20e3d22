// 资源引用解析
//
// 把 asset://<名称> 形式的引用落地为可读取的本地文件。
// 解析在 start_upload 调用内同步完成，失败时不会创建任何任务。

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// 资源引用前缀
pub const ASSET_SCHEME: &str = "asset://";

/// 资源解析错误
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// 引用格式非法
    #[error("资源引用无效: {0}")]
    InvalidReference(String),
    /// 资源不存在
    #[error("资源不存在: {0}")]
    NotFound(String),
    /// 复制到临时文件失败
    #[error("资源复制失败: {reference}: {source}")]
    Copy {
        reference: String,
        #[source]
        source: std::io::Error,
    },
}

/// 资源解析器
///
/// 外部协作方接口：识别并把资源引用物化为本地文件路径
#[async_trait]
pub trait AssetResolver: Send + Sync {
    /// 该引用是否由本解析器处理
    fn handles(&self, reference: &str) -> bool;

    /// 解析引用，返回可读取的本地文件路径
    async fn resolve(&self, reference: &str) -> Result<PathBuf, ResolveError>;
}

/// 目录资源解析器
///
/// 把 asset://<名称> 映射到资源目录下的同名文件，
/// 并复制一份到临时目录供上传使用
pub struct DirAssetResolver {
    assets_dir: PathBuf,
}

impl DirAssetResolver {
    /// 创建解析器
    pub fn new(assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
        }
    }

    /// 校验资源名称，拒绝路径穿越
    fn check_name(reference: &str, name: &str) -> Result<(), ResolveError> {
        if name.is_empty()
            || name.contains("..")
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(ResolveError::InvalidReference(reference.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AssetResolver for DirAssetResolver {
    fn handles(&self, reference: &str) -> bool {
        reference.starts_with(ASSET_SCHEME)
    }

    async fn resolve(&self, reference: &str) -> Result<PathBuf, ResolveError> {
        let name = reference
            .strip_prefix(ASSET_SCHEME)
            .ok_or_else(|| ResolveError::InvalidReference(reference.to_string()))?;
        Self::check_name(reference, name)?;

        let source = self.assets_dir.join(name);
        if !source.is_file() {
            return Err(ResolveError::NotFound(reference.to_string()));
        }

        // 复制到临时文件，保留原扩展名便于 MIME 推断
        let mut temp_name = Uuid::new_v4().to_string();
        if let Some(ext) = Path::new(name).extension() {
            temp_name.push('.');
            temp_name.push_str(&ext.to_string_lossy());
        }
        let target = std::env::temp_dir().join(temp_name);

        tokio::fs::copy(&source, &target)
            .await
            .map_err(|e| ResolveError::Copy {
                reference: reference.to_string(),
                source: e,
            })?;

        debug!("资源已物化: {} -> {:?}", reference, target);
        Ok(target)
    }
}
