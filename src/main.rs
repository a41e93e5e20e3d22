use axum::{
    http::HeaderValue,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use upload_hub_rust::{config::AppConfig, logging, server::handlers, server::websocket, AppState};

/// 健康检查响应结构
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
}

/// 健康检查处理器
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "upload-hub-rust".to_string(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置
    let config = AppConfig::load_or_default("config/app.toml").await;

    // 初始化日志（guard 必须保持存活）
    let _log_guard = logging::init_logging(&config.log);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let cors_origins = config.server.cors_origins.clone();

    // 初始化应用状态并启动事件转发
    let app_state = AppState::new(config);
    app_state.start_event_pump();

    // CORS：未配置来源时放开，便于本地调试
    let cors = if cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // API 路由
    let api_routes = Router::new()
        .route("/uploads", post(handlers::create_upload))
        .route("/uploads", get(handlers::get_active_uploads))
        .route("/uploads/:id/cancel", post(handlers::cancel_upload))
        .route("/files/info", get(handlers::get_file_info))
        .route("/ws", get(websocket::handle_websocket))
        .with_state(app_state.clone());

    // 构建完整应用
    let app = Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(middleware);

    // 启动服务器
    info!("服务器启动在: http://{}", addr);
    info!("API 基础路径: http://{}/api/v1", addr);
    info!("WebSocket: ws://{}/api/v1/ws", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server = axum::serve(listener, app);

    // 监听关闭信号，支持优雅关闭
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("服务器错误: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("收到 Ctrl+C，开始优雅关闭...");
        }
    }

    info!("应用已安全退出");
    Ok(())
}
