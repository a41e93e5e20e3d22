// 上传任务管理器
//
// 负责上传请求的全流程编排：
// - 同步校验请求并构建请求体
// - 分配对外任务 ID 并登记到注册表
// - 提交传输会话执行
// - 处理会话回调：累积响应体、换算进度、发布生命周期事件
//
// 校验失败同步返回错误，不创建任务、不产生事件；
// 提交之后的一切结果只通过事件通道回报。

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::filesystem;
use crate::server::events::UploadEvent;
use crate::uploader::multipart;
use crate::uploader::registry::TaskRegistry;
use crate::uploader::resolver::{AssetResolver, DirAssetResolver};
use crate::uploader::session::{
    RequestBody, TransferEventSink, TransferSpec, TransportSession,
};
use crate::uploader::task::UploadTask;
use crate::uploader::types::{TransferOutcome, UploadError, UploadMode, UploadRequest};

/// 会话回调路由
///
/// 实现传输事件接收器：把回调落到注册表并对外发布事件
struct CallbackRouter {
    registry: Arc<TaskRegistry>,
    events_tx: broadcast::Sender<UploadEvent>,
}

impl TransferEventSink for CallbackRouter {
    fn on_body_sent(
        &self,
        runtime_id: u64,
        _bytes: u64,
        total_sent: u64,
        total_expected: Option<u64>,
    ) {
        let Some(public_id) = self.registry.public_id_of(runtime_id) else {
            return;
        };
        let progress = match total_expected {
            Some(total) if total > 0 => (100.0 * total_sent as f64 / total as f64) as f32,
            // 总大小未知时上报 -1 哨兵值
            _ => -1.0,
        };
        let _ = self.events_tx.send(UploadEvent::Progress {
            id: public_id,
            progress,
        });
    }

    fn on_data(&self, runtime_id: u64, chunk: &[u8]) {
        self.registry.append_response(runtime_id, chunk);
    }

    fn on_complete(&self, runtime_id: u64, response_code: Option<u16>, outcome: TransferOutcome) {
        // 终结时一次性取出并移除任务记录，之后不会再有任何写入
        let (public_id, body) = self.registry.finish(runtime_id);
        let Some(id) = public_id else {
            warn!("收到未登记任务的终结回调: runtime_id={}", runtime_id);
            return;
        };

        // 响应体按 UTF-8 解码，失败或无数据时降级为 null
        let response_body = body.and_then(|buf| String::from_utf8(buf).ok());

        let event = match outcome {
            TransferOutcome::Success => {
                info!(
                    "上传任务完成: public_id={}, response_code={:?}",
                    id, response_code
                );
                UploadEvent::Completed {
                    id,
                    response_code,
                    response_body,
                }
            }
            TransferOutcome::Cancelled => {
                info!("上传任务已取消: public_id={}", id);
                UploadEvent::Cancelled {
                    id,
                    response_code,
                    response_body,
                }
            }
            TransferOutcome::Failed(reason) => {
                warn!("上传任务失败: public_id={}, 错误: {}", id, reason);
                UploadEvent::Error {
                    id,
                    response_code,
                    response_body,
                    error: reason,
                }
            }
        };

        let _ = self.events_tx.send(event);
    }
}

/// 上传任务管理器
pub struct UploadManager {
    /// 传输会话（进程内唯一，惰性创建）
    session: Arc<TransportSession>,
    /// 任务注册表
    registry: Arc<TaskRegistry>,
    /// 资源解析器
    resolver: Arc<dyn AssetResolver>,
    /// 回调路由（持有事件广播通道）
    router: Arc<CallbackRouter>,
}

impl UploadManager {
    /// 创建上传管理器（使用目录资源解析器）
    pub fn new(config: &UploadConfig) -> Self {
        Self::with_resolver(config, Arc::new(DirAssetResolver::new(config.assets_dir.clone())))
    }

    /// 创建上传管理器（自定义资源解析器）
    pub fn with_resolver(config: &UploadConfig, resolver: Arc<dyn AssetResolver>) -> Self {
        let registry = Arc::new(TaskRegistry::new());
        let (events_tx, _) = broadcast::channel(config.event_channel_capacity);

        info!(
            "创建上传管理器: assets_dir={:?}, chunk_size={}",
            config.assets_dir, config.body_chunk_size
        );

        Self {
            session: Arc::new(TransportSession::new(
                config.connect_timeout_secs,
                config.body_chunk_size,
            )),
            registry: Arc::clone(&registry),
            resolver,
            router: Arc::new(CallbackRouter { registry, events_tx }),
        }
    }

    /// 订阅上传事件
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.router.events_tx.subscribe()
    }

    /// 启动上传任务
    ///
    /// 校验通过并提交后立即返回对外任务 ID，不等待任何网络活动；
    /// 传输结果只通过事件通道回报
    pub async fn start_upload(&self, request: UploadRequest) -> Result<String, UploadError> {
        // 1. 目标地址必须是绝对 URL
        if request.destination_url.is_empty() {
            return Err(UploadError::InvalidUrl("缺少目标地址".to_string()));
        }
        let url = Url::parse(&request.destination_url)
            .map_err(|e| UploadError::InvalidUrl(format!("{}: {}", request.destination_url, e)))?;

        // 2. 表单参数只允许出现在 multipart 模式
        if request.mode == UploadMode::Raw && !request.parameters.is_empty() {
            return Err(UploadError::ParametersNotAllowed);
        }

        // multipart 必须提供文件字段名
        let field_name = match request.mode {
            UploadMode::Multipart => match request.field_name.as_deref() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => return Err(UploadError::MissingFieldName),
            },
            UploadMode::Raw => String::new(),
        };

        let method_str = request.method.clone().unwrap_or_else(|| "POST".to_string());
        let method = Method::from_bytes(method_str.as_bytes())
            .map_err(|_| UploadError::InvalidMethod(method_str.clone()))?;

        let mut headers = HeaderMap::new();
        for (key, value) in &request.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| UploadError::InvalidHeader(key.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| UploadError::InvalidHeader(key.clone()))?;
            headers.insert(name, value);
        }

        // 3. 资源引用同步物化为本地文件
        let source_path = if self.resolver.handles(&request.source_path) {
            self.resolver
                .resolve(&request.source_path)
                .await
                .map_err(|e| UploadError::AssetResolution(e.to_string()))?
        } else {
            filesystem::normalize_source_path(&request.source_path)
                .map_err(|e| UploadError::InvalidSourcePath(e.to_string()))?
        };

        // 4. 构建请求体
        let body = match request.mode {
            UploadMode::Multipart => {
                let boundary = Uuid::new_v4().to_string();
                let data =
                    multipart::encode(&boundary, &source_path, &request.parameters, &field_name)?;
                RequestBody::Buffer {
                    data,
                    content_type: format!("multipart/form-data; boundary={}", boundary),
                }
            }
            // raw 模式由传输会话直接流式读取文件
            UploadMode::Raw => RequestBody::File { path: source_path },
        };

        // 5. 计算对外任务 ID，先登记再启动，保证回调一定能查到映射
        let public_id = request
            .caller_task_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.registry.mint_public_id());

        let runtime_id = self.session.next_runtime_id();
        self.registry.register(runtime_id, public_id.clone());

        let spec = TransferSpec {
            method,
            url,
            headers,
            body,
            public_id: public_id.clone(),
            source_path: request.source_path.clone(),
            mode: request.mode,
            shared_container_id: request.shared_container_id.clone(),
        };

        let sink: Arc<dyn TransferEventSink> = self.router.clone();
        if let Err(e) = self.session.start(runtime_id, spec, sink).await {
            // 启动失败回滚登记，保持"无任务则无记录"
            let _ = self.registry.finish(runtime_id);
            return Err(e);
        }

        info!(
            "上传任务已提交: public_id={}, runtime_id={}, mode={:?}, url={}",
            public_id, runtime_id, request.mode, request.destination_url
        );

        Ok(public_id)
    }

    /// 取消上传任务
    ///
    /// 扫描存活任务并对命中的任务发出取消信号。未命中（未知 ID 或已终结）
    /// 是无操作而非错误，扫描完成即返回 true
    pub fn cancel_upload(&self, public_id: &str) -> bool {
        let matched = self.session.cancel_matching(public_id);
        if matched == 0 {
            debug!("取消请求未命中任何任务: {}", public_id);
        }
        true
    }

    /// 当前存活任务快照
    pub fn active_uploads(&self) -> Vec<UploadTask> {
        self.session.live_tasks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::{HeaderMap as AxumHeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use std::io::Write;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn test_manager() -> UploadManager {
        UploadManager::new(&UploadConfig::default())
    }

    fn temp_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    fn raw_request(url: &str, path: &str) -> UploadRequest {
        UploadRequest {
            destination_url: url.to_string(),
            source_path: path.to_string(),
            ..Default::default()
        }
    }

    async fn spawn_server(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    /// 收取事件直到出现终结事件，返回收到的全部事件
    async fn collect_until_terminal(
        rx: &mut broadcast::Receiver<UploadEvent>,
    ) -> Vec<UploadEvent> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("等待事件超时")
                .expect("事件通道已关闭");
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                return events;
            }
        }
    }

    async fn assert_no_more_events(rx: &mut broadcast::Receiver<UploadEvent>) {
        let result = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(result.is_err(), "不应再有事件: {:?}", result);
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_without_events() {
        let manager = test_manager();
        let mut rx = manager.subscribe();

        let result = manager
            .start_upload(raw_request("not a url", "/tmp/f.txt"))
            .await;
        assert!(matches!(result, Err(UploadError::InvalidUrl(_))));

        let result = manager.start_upload(raw_request("", "/tmp/f.txt")).await;
        assert!(matches!(result, Err(UploadError::InvalidUrl(_))));

        assert_no_more_events(&mut rx).await;
        assert!(manager.active_uploads().is_empty());
    }

    #[tokio::test]
    async fn test_raw_with_parameters_rejected() {
        let manager = test_manager();

        let mut request = raw_request("https://example.com/up", "/tmp/f.txt");
        request.parameters.insert("a".to_string(), "1".to_string());

        let result = manager.start_upload(request).await;
        assert!(matches!(result, Err(UploadError::ParametersNotAllowed)));
    }

    #[tokio::test]
    async fn test_multipart_requires_field_name() {
        let manager = test_manager();

        let mut request = raw_request("https://example.com/up", "/tmp/f.txt");
        request.mode = UploadMode::Multipart;

        let result = manager.start_upload(request).await;
        assert!(matches!(result, Err(UploadError::MissingFieldName)));
    }

    #[tokio::test]
    async fn test_invalid_method_rejected() {
        let manager = test_manager();

        let mut request = raw_request("https://example.com/up", "/tmp/f.txt");
        request.method = Some("NOT A METHOD".to_string());

        let result = manager.start_upload(request).await;
        assert!(matches!(result, Err(UploadError::InvalidMethod(_))));
    }

    #[tokio::test]
    async fn test_asset_resolution_failure() {
        let manager = test_manager();
        let mut rx = manager.subscribe();

        let result = manager
            .start_upload(raw_request("https://example.com/up", "asset://missing.bin"))
            .await;
        assert!(matches!(result, Err(UploadError::AssetResolution(_))));

        assert_no_more_events(&mut rx).await;
    }

    #[tokio::test]
    async fn test_cancel_unknown_id_is_noop_success() {
        let manager = test_manager();
        let mut rx = manager.subscribe();

        assert!(manager.cancel_upload("does-not-exist"));
        assert_no_more_events(&mut rx).await;
    }

    #[tokio::test]
    async fn test_raw_upload_completes_with_response_body() {
        let addr = spawn_server(Router::new().route("/up", post(|_body: Bytes| async { "ok" }))).await;

        let manager = test_manager();
        let mut rx = manager.subscribe();

        let file = temp_file(b"hello upload");
        let public_id = manager
            .start_upload(raw_request(
                &format!("http://{}/up", addr),
                file.path().to_str().unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(public_id, "0");

        let events = collect_until_terminal(&mut rx).await;
        let terminal = events.last().unwrap();
        match terminal {
            UploadEvent::Completed {
                id,
                response_code,
                response_body,
            } => {
                assert_eq!(id, &public_id);
                assert_eq!(*response_code, Some(200));
                assert_eq!(response_body.as_deref(), Some("ok"));
            }
            other => panic!("预期 completed，实际 {:?}", other),
        }

        // 进度值落在 [0,100] 且按发送量单调不减
        let mut last = -1.0f32;
        let mut progress_count = 0;
        for event in &events {
            if let UploadEvent::Progress { id, progress } = event {
                assert_eq!(id, &public_id);
                assert!((0.0..=100.0).contains(progress), "进度越界: {}", progress);
                assert!(*progress >= last, "进度回退: {} -> {}", last, progress);
                last = *progress;
                progress_count += 1;
            }
        }
        assert!(progress_count >= 1);

        // 终结事件只出现一次
        assert_no_more_events(&mut rx).await;
        assert!(manager.active_uploads().is_empty());
    }

    #[tokio::test]
    async fn test_caller_task_id_used_verbatim() {
        let addr = spawn_server(Router::new().route("/up", post(|_body: Bytes| async { "ok" }))).await;

        let manager = test_manager();
        let mut rx = manager.subscribe();

        let file = temp_file(b"x");
        let mut request = raw_request(
            &format!("http://{}/up", addr),
            file.path().to_str().unwrap(),
        );
        request.caller_task_id = Some("job-42".to_string());

        let public_id = manager.start_upload(request).await.unwrap();
        assert_eq!(public_id, "job-42");

        let events = collect_until_terminal(&mut rx).await;
        assert_eq!(events.last().unwrap().task_id(), "job-42");
    }

    #[tokio::test]
    async fn test_non_2xx_response_still_completes() {
        let addr = spawn_server(Router::new().route(
            "/up",
            post(|_body: Bytes| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        ))
        .await;

        let manager = test_manager();
        let mut rx = manager.subscribe();

        let file = temp_file(b"payload");
        manager
            .start_upload(raw_request(
                &format!("http://{}/up", addr),
                file.path().to_str().unwrap(),
            ))
            .await
            .unwrap();

        let events = collect_until_terminal(&mut rx).await;
        match events.last().unwrap() {
            UploadEvent::Completed {
                response_code,
                response_body,
                ..
            } => {
                assert_eq!(*response_code, Some(500));
                assert_eq!(response_body.as_deref(), Some("boom"));
            }
            other => panic!("预期 completed，实际 {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multipart_upload_end_to_end() {
        let addr = spawn_server(Router::new().route(
            "/up",
            post(|headers: AxumHeaderMap, body: Bytes| async move {
                let content_type = headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                if content_type.starts_with("multipart/form-data; boundary=") && !body.is_empty() {
                    (StatusCode::OK, "mp-ok")
                } else {
                    (StatusCode::BAD_REQUEST, "bad")
                }
            }),
        ))
        .await;

        let manager = test_manager();
        let mut rx = manager.subscribe();

        let file = temp_file(b"xyz");
        let mut request = raw_request(
            &format!("http://{}/up", addr),
            file.path().to_str().unwrap(),
        );
        request.mode = UploadMode::Multipart;
        request.field_name = Some("file".to_string());
        request
            .parameters
            .insert("a".to_string(), "1".to_string());

        manager.start_upload(request).await.unwrap();

        let events = collect_until_terminal(&mut rx).await;
        match events.last().unwrap() {
            UploadEvent::Completed {
                response_code,
                response_body,
                ..
            } => {
                assert_eq!(*response_code, Some(200));
                assert_eq!(response_body.as_deref(), Some("mp-ok"));
            }
            other => panic!("预期 completed，实际 {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multipart_unreadable_file_fails_before_task() {
        let manager = test_manager();
        let mut rx = manager.subscribe();

        let mut request = raw_request("https://example.com/up", "/nonexistent/file.bin");
        request.mode = UploadMode::Multipart;
        request.field_name = Some("file".to_string());

        let result = manager.start_upload(request).await;
        assert!(matches!(result, Err(UploadError::Encoding(_))));

        assert_no_more_events(&mut rx).await;
        assert!(manager.active_uploads().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_transfer_emits_cancelled() {
        // 服务端读完请求体后长时间不响应，保证取消发生在传输期间
        let addr = spawn_server(Router::new().route(
            "/up",
            post(|_body: Bytes| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        ))
        .await;

        let manager = test_manager();
        let mut rx = manager.subscribe();

        let file = temp_file(b"slow upload");
        let public_id = manager
            .start_upload(raw_request(
                &format!("http://{}/up", addr),
                file.path().to_str().unwrap(),
            ))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(manager.cancel_upload(&public_id));

        let events = collect_until_terminal(&mut rx).await;
        match events.last().unwrap() {
            UploadEvent::Cancelled { id, .. } => assert_eq!(id, &public_id),
            other => panic!("预期 cancelled，实际 {:?}", other),
        }

        // 底层以取消终结，不应再出现 error 事件
        assert_no_more_events(&mut rx).await;
        assert!(manager.active_uploads().is_empty());
    }

    #[tokio::test]
    async fn test_active_uploads_lists_running_task() {
        let addr = spawn_server(Router::new().route(
            "/up",
            post(|_body: Bytes| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        ))
        .await;

        let manager = test_manager();
        let mut rx = manager.subscribe();

        let file = temp_file(b"data");
        let public_id = manager
            .start_upload(raw_request(
                &format!("http://{}/up", addr),
                file.path().to_str().unwrap(),
            ))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let tasks = manager.active_uploads();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].public_id, public_id);

        manager.cancel_upload(&public_id);
        let _ = collect_until_terminal(&mut rx).await;
    }
}
