// 传输会话
//
// 包装单个长生命周期的 reqwest 客户端，负责实际执行上传任务并派发生命周期回调。
// 会话在首个任务提交时惰性创建，创建后配置（含分组标识）在进程生命周期内固定，
// 后续请求即使携带不同的分组标识也复用首个会话。
//
// 回调契约：同一任务的回调串行派发，on_complete 恰好触发一次；
// 不同任务的回调可能并发。

use dashmap::DashMap;
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Method, Url};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::uploader::task::UploadTask;
use crate::uploader::types::{TransferOutcome, UploadError, UploadMode};

/// 传输事件接收器
///
/// 管理器实现该接口，会话通过它回报生命周期事件，
/// 传输机制与注册表/事件发布逻辑由此解耦
pub trait TransferEventSink: Send + Sync + 'static {
    /// 请求体又发送了一段数据
    fn on_body_sent(&self, runtime_id: u64, bytes: u64, total_sent: u64, total_expected: Option<u64>);

    /// 收到一段响应体数据（按到达顺序派发）
    fn on_data(&self, runtime_id: u64, chunk: &[u8]);

    /// 任务终结（每个任务恰好一次）
    fn on_complete(&self, runtime_id: u64, response_code: Option<u16>, outcome: TransferOutcome);
}

/// 请求体来源
#[derive(Debug)]
pub enum RequestBody {
    /// 从磁盘流式读取文件内容
    File { path: PathBuf },
    /// 预编码的完整请求体（multipart）
    Buffer { data: Vec<u8>, content_type: String },
}

/// 一次上传任务的完整描述
#[derive(Debug)]
pub struct TransferSpec {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
    pub public_id: String,
    pub source_path: String,
    pub mode: UploadMode,
    pub shared_container_id: Option<String>,
}

/// 会话内部状态（惰性创建后不再变更）
struct SessionInner {
    client: Client,
    container_scope: Option<String>,
}

/// 存活任务记录
struct LiveTask {
    cancel: CancellationToken,
    task: UploadTask,
}

/// 传输层失败信息
struct TransferFailure {
    response_code: Option<u16>,
    reason: String,
}

/// 传输会话
pub struct TransportSession {
    inner: OnceCell<SessionInner>,
    next_runtime_id: AtomicU64,
    /// 当前存活任务（runtime_id -> 记录），终结时移除
    live: Arc<DashMap<u64, LiveTask>>,
    connect_timeout_secs: Option<u64>,
    body_chunk_size: usize,
}

impl TransportSession {
    /// 创建传输会话外壳（HTTP 客户端延迟到首个任务时构建）
    pub fn new(connect_timeout_secs: Option<u64>, body_chunk_size: usize) -> Self {
        Self {
            inner: OnceCell::new(),
            next_runtime_id: AtomicU64::new(0),
            live: Arc::new(DashMap::new()),
            connect_timeout_secs,
            body_chunk_size,
        }
    }

    /// 分配会话任务 ID（存活任务内唯一）
    pub fn next_runtime_id(&self) -> u64 {
        self.next_runtime_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 获取会话内部状态，首次调用时创建 HTTP 客户端并固化分组标识
    async fn obtain(&self, scope: Option<&str>) -> Result<&SessionInner, UploadError> {
        let inner = self
            .inner
            .get_or_try_init(|| async {
                let mut builder = Client::builder();
                if let Some(secs) = self.connect_timeout_secs {
                    builder = builder.connect_timeout(Duration::from_secs(secs));
                }
                let client = builder
                    .build()
                    .map_err(|e| UploadError::Session(e.to_string()))?;

                info!("传输会话已创建: 分组标识={:?}", scope);
                Ok::<_, UploadError>(SessionInner {
                    client,
                    container_scope: scope.map(|s| s.to_string()),
                })
            })
            .await?;

        if let Some(requested) = scope {
            if inner.container_scope.as_deref() != Some(requested) {
                debug!("传输会话已存在，忽略新的分组标识: {}", requested);
            }
        }

        Ok(inner)
    }

    /// 启动任务
    ///
    /// 调用方必须先在注册表中登记 runtime_id，再调用本方法。
    /// 返回后传输在后台进行，结果通过接收器回报
    pub async fn start(
        &self,
        runtime_id: u64,
        spec: TransferSpec,
        sink: Arc<dyn TransferEventSink>,
    ) -> Result<(), UploadError> {
        let inner = self.obtain(spec.shared_container_id.as_deref()).await?;
        let client = inner.client.clone();

        let cancel = CancellationToken::new();
        let task = UploadTask::new(
            runtime_id,
            spec.public_id.clone(),
            spec.url.to_string(),
            spec.source_path.clone(),
            spec.mode,
        );
        self.live.insert(
            runtime_id,
            LiveTask {
                cancel: cancel.clone(),
                task,
            },
        );

        let live = Arc::clone(&self.live);
        let chunk_size = self.body_chunk_size;

        tokio::spawn(async move {
            let (response_code, outcome) = tokio::select! {
                _ = cancel.cancelled() => (None, TransferOutcome::Cancelled),
                result = execute_transfer(client, spec, runtime_id, chunk_size, Arc::clone(&sink)) => {
                    match result {
                        Ok(code) => (Some(code), TransferOutcome::Success),
                        Err(failure) => (failure.response_code, TransferOutcome::Failed(failure.reason)),
                    }
                }
            };

            // 先离开存活集合，再派发终结回调，保证取消扫描不会命中已终结的任务
            if let Some((_, mut finished)) = live.remove(&runtime_id) {
                match &outcome {
                    TransferOutcome::Success => finished.task.mark_completed(),
                    TransferOutcome::Cancelled => finished.task.mark_cancelled(),
                    TransferOutcome::Failed(_) => finished.task.mark_failed(),
                }
                debug!(
                    "任务离开传输会话: runtime_id={}, status={}",
                    runtime_id,
                    finished.task.status.description()
                );
            }

            sink.on_complete(runtime_id, response_code, outcome);
        });

        Ok(())
    }

    /// 按对外任务 ID 请求取消
    ///
    /// 扫描全部存活任务，命中即发出取消信号。取消是协作式的：
    /// 实际的终结仍然走正常的 on_complete 路径。
    /// 返回命中的任务数（0 也视为扫描成功）
    pub fn cancel_matching(&self, public_id: &str) -> usize {
        let mut matched = 0;
        for entry in self.live.iter() {
            if entry.value().task.public_id == public_id {
                entry.value().cancel.cancel();
                matched += 1;
            }
        }
        if matched > 0 {
            info!("已请求取消: public_id={}, 命中 {} 个任务", public_id, matched);
        }
        matched
    }

    /// 当前存活任务快照
    pub fn live_tasks(&self) -> Vec<UploadTask> {
        self.live.iter().map(|e| e.value().task.clone()).collect()
    }

    /// 当前存活任务数
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

/// 执行一次完整传输：构建请求、发送、流式收取响应体
///
/// HTTP 状态码不影响成功判定，非 2xx 响应同样按 Success 终结
async fn execute_transfer(
    client: Client,
    spec: TransferSpec,
    runtime_id: u64,
    chunk_size: usize,
    sink: Arc<dyn TransferEventSink>,
) -> Result<u16, TransferFailure> {
    let mut builder = client.request(spec.method, spec.url).headers(spec.headers);

    match spec.body {
        RequestBody::File { path } => {
            let file = tokio::fs::File::open(&path).await.map_err(|e| TransferFailure {
                response_code: None,
                reason: format!("打开上传文件失败: {:?}: {}", path, e),
            })?;
            let total_expected = file.metadata().await.ok().map(|m| m.len());
            if let Some(len) = total_expected {
                builder = builder.header(CONTENT_LENGTH, len);
            }
            let stream = ReaderStream::with_capacity(file, chunk_size);
            builder = builder.body(reqwest::Body::wrap_stream(count_progress(
                stream,
                runtime_id,
                total_expected,
                Arc::clone(&sink),
            )));
        }
        RequestBody::Buffer { data, content_type } => {
            let total_expected = data.len() as u64;
            builder = builder
                .header(CONTENT_TYPE, content_type)
                .header(CONTENT_LENGTH, total_expected);
            let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
                data.chunks(chunk_size.max(1)).map(|c| Ok(c.to_vec())).collect();
            builder = builder.body(reqwest::Body::wrap_stream(count_progress(
                futures::stream::iter(chunks),
                runtime_id,
                Some(total_expected),
                Arc::clone(&sink),
            )));
        }
    }

    let response = builder.send().await.map_err(|e| TransferFailure {
        response_code: None,
        reason: e.to_string(),
    })?;
    let response_code = response.status().as_u16();

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(data) => sink.on_data(runtime_id, &data),
            Err(e) => {
                return Err(TransferFailure {
                    response_code: Some(response_code),
                    reason: e.to_string(),
                })
            }
        }
    }

    Ok(response_code)
}

/// 包装请求体流，每发出一段数据就回报一次发送进度
fn count_progress<S, B>(
    stream: S,
    runtime_id: u64,
    total_expected: Option<u64>,
    sink: Arc<dyn TransferEventSink>,
) -> impl futures::Stream<Item = Result<B, std::io::Error>>
where
    S: futures::Stream<Item = Result<B, std::io::Error>>,
    B: AsRef<[u8]>,
{
    let mut total_sent = 0u64;
    stream.inspect(move |item| {
        if let Ok(chunk) = item {
            let bytes = chunk.as_ref().len() as u64;
            total_sent += bytes;
            sink.on_body_sent(runtime_id, bytes, total_sent, total_expected);
        }
    })
}
