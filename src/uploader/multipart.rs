// multipart/form-data 编码器
//
// 把表单参数和单个文件拼装成完整的请求体。
// 文件整体读入内存，适用于本服务面向的中小文件场景。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::filesystem::guess_mime_type;

/// multipart 编码错误
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// 附件文件无法读取
    #[error("读取上传文件失败: {path:?}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 构建 multipart/form-data 请求体
///
/// 布局：按参数表迭代顺序逐个输出参数分片，然后输出唯一的文件分片，
/// 最后以 `--<boundary>--` 结尾。文件分片的 Content-Type 按文件名推断，
/// 未知类型回退 application/octet-stream
pub fn encode(
    boundary: &str,
    file_path: &Path,
    parameters: &BTreeMap<String, String>,
    field_name: &str,
) -> Result<Vec<u8>, EncodeError> {
    let data = std::fs::read(file_path).map_err(|e| EncodeError::ReadFile {
        path: file_path.to_path_buf(),
        source: e,
    })?;

    let filename = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime_type = guess_mime_type(&filename);

    let mut body = Vec::with_capacity(data.len() + 512);

    for (key, value) in parameters {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", key).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field_name, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.extend_from_slice(&data);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    Ok(body)
}
