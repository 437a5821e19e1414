use axum::extract::DefaultBodyLimit;
use axum::{Router, http::StatusCode, response::Json, routing::get};
use og_backend::config::AppConfig;
use og_backend::cors::build_cors_layer;
use og_backend::features::ogimage::{self, ASSET_URL_PREFIX, AssetPublisher, AssetStore};
use og_backend::request_id::request_id_middleware;
use og_backend::shutdown::ShutdownManager;
use og_backend::startup::run_startup_checks;
use og_backend::state::AppState;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

fn compression_predicate() -> impl tower_http::compression::predicate::Predicate {
    use tower_http::compression::predicate::{NotForContentType, Predicate, SizeAbove};

    // 压缩策略：明确排除不该压缩的响应。
    //
    // - PNG 等图片本身已压缩，再压缩只浪费 CPU；
    // - application/octet-stream 是二进制下载，收益不确定。
    //
    // 保留默认的最小大小阈值（32B），避免压缩开销覆盖收益。
    SizeAbove::default()
        .and(NotForContentType::IMAGES)
        .and(NotForContentType::const_new("application/octet-stream"))
}


#[derive(OpenApi)]
#[openapi(
    paths(
        og_backend::features::ogimage::handler::generate_og_image,
        health_check,
    ),
    components(
        schemas(
            og_backend::features::ogimage::GenerateOgImageForm,
            og_backend::features::ogimage::OgImageResponse,
            og_backend::error::ErrorBody,
        )
    ),
    tags(
        (name = "OgImage", description = "Open Graph image APIs"),
        (name = "Health", description = "Health APIs"),
    ),
    info(
        title = "OG Backend API",
        version = "0.1.0",
        description = "Open Graph preview image service (Axum)"
    )
)]
pub struct ApiDoc;

#[utoipa::path(
    get,
    path = "/health",
    summary = "健康检查",
    description = "用于探活的健康检查端点，返回服务状态与版本信息。",
    responses((status = 200, description = "服务健康", body = serde_json::Value)),
    tag = "Health"
)]
async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "og-backend",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

#[tokio::main]
async fn main() {
    // 创建优雅退出管理器
    let shutdown_manager = ShutdownManager::new();

    // Load config
    if let Err(e) = AppConfig::init_global() {
        eprintln!("Config init failed: {e}");
        std::process::exit(1);
    }
    let config = AppConfig::global();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("og_backend={},tower_http=info", config.logging.level).into()
            }),
        )
        .init();

    // 启动信号处理器
    if let Err(e) = shutdown_manager.start_signal_handler().await {
        tracing::error!("信号处理器启动失败: {}", e);
        std::process::exit(1);
    }

    // Run startup checks
    if let Err(e) = run_startup_checks(config).await {
        tracing::error!("Startup checks failed: {}", e);
        std::process::exit(1);
    }

    // Shared state
    let app_state = AppState {
        assets: Arc::new(AssetStore::new(config.output_path())),
        publisher: Arc::new(AssetPublisher::new(&config.assets.public_base_url)),
        render_semaphore: Arc::new(Semaphore::new({
            let m = config.render.max_parallel as usize;
            if m == 0 { num_cpus::get() } else { m }
        })),
        render: config.render.clone(),
        branding: config.branding.clone(),
    };

    // Routes
    let mut app = Router::<AppState>::new()
        .route("/health", get(health_check))
        .merge(ogimage::create_og_router())
        // 产物读取路径：只暴露输出目录本身，目录内除生成的 PNG 外没有别的东西。
        .nest_service(ASSET_URL_PREFIX, ServeDir::new(config.output_path()))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(app_state);

    // 为产物静态资源加缓存头（仅匹配 /og-images/* 路径）。
    app = app.layer(axum::middleware::from_fn(
        ogimage::asset_cache_control_middleware,
    ));

    // 应用内响应压缩：JSON/文本启用 gzip/brotli，生成的 PNG 不压缩。
    app = app.layer(CompressionLayer::new().compress_when(compression_predicate()));

    // CORS（默认对任意来源开放，服务面向匿名前端表单）
    if let Some(cors_layer) = build_cors_layer(&config.cors) {
        app = app.layer(cors_layer);
    }

    // 全局 request_id 中间件
    app = app.layer(axum::middleware::from_fn(request_id_middleware));

    // 请求体上限：上传图片上限 + 文本字段余量
    app = app.layer(DefaultBodyLimit::max(config.render.body_limit_bytes()));

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!("Generate API: http://{}/generate-og-image", addr);
    tracing::info!("Output dir: {:?}", config.output_path());
    tracing::info!("Public base URL: {}", config.assets.public_base_url);

    // 超时保险：优雅退出迟迟未完成时强制结束进程
    {
        let manager = shutdown_manager.clone();
        let grace = config.shutdown.timeout_duration();
        tokio::spawn(async move {
            manager.wait_for_shutdown().await;
            tokio::time::sleep(grace).await;
            tracing::warn!("优雅退出超时（{}秒），强制结束进程", grace.as_secs());
            std::process::exit(1);
        });
    }

    // 运行服务器直到收到退出信号
    let graceful = axum::serve(listener, app).with_graceful_shutdown({
        let manager = shutdown_manager.clone();
        async move {
            let reason = manager.wait_for_shutdown().await;
            tracing::info!("接收到退出信号: {:?}，开始优雅关闭HTTP服务器...", reason);
        }
    });

    if let Err(e) = graceful.await {
        tracing::error!("服务器运行错误: {}", e);
        std::process::exit(1);
    }

    tracing::info!("服务器已优雅关闭");
}
