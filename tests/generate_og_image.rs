use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use uuid::Uuid;

use og_backend::config::{BrandingConfig, RenderConfig};
use og_backend::features::ogimage::{
    AssetPublisher, AssetStore, asset_cache_control_middleware, create_og_router,
};
use og_backend::state::AppState;

const BOUNDARY: &str = "og-backend-test-boundary";
const PUBLIC_BASE: &str = "http://localhost:3001";

fn temp_output_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("og-e2e-{}", Uuid::new_v4().simple()));
    std::fs::create_dir_all(&dir).expect("create temp output dir");
    dir
}

/// 按生产路由拓扑组装测试应用（生成端点 + 静态产物服务 + 缓存头中间件）
fn test_app_with_render(dir: &Path, render: RenderConfig) -> Router {
    let state = AppState {
        assets: Arc::new(AssetStore::new(dir)),
        publisher: Arc::new(AssetPublisher::new(PUBLIC_BASE)),
        render_semaphore: Arc::new(Semaphore::new(4)),
        render,
        branding: BrandingConfig::default(),
    };
    Router::new()
        .merge(create_og_router())
        .nest_service("/og-images", ServeDir::new(dir))
        .with_state(state)
        .layer(axum::middleware::from_fn(asset_cache_control_middleware))
}

fn test_app(dir: &Path) -> Router {
    test_app_with_render(dir, RenderConfig::default())
}

struct MultipartBuilder {
    body: Vec<u8>,
}

impl MultipartBuilder {
    fn new() -> Self {
        Self { body: Vec::new() }
    }

    fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    fn file(mut self, name: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn build(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}

fn generate_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate-og-image")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("build request")
}

async fn response_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

fn stored_file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).expect("list output dir").count()
}

/// 构造一张纯红色测试图片（PNG 字节）
fn red_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([255, 0, 0]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .expect("encode test png");
    out
}

/// 从 ogImageUrl 提取可在测试路由上回读的相对路径
fn asset_path_from_url(url: &str) -> String {
    let filename = url.rsplit('/').next().expect("url has filename");
    assert!(url.starts_with(PUBLIC_BASE));
    assert!(filename.ends_with(".png"));
    format!("/og-images/{filename}")
}

#[tokio::test]
async fn generate_without_image_yields_retrievable_canvas_sized_png() {
    let dir = temp_output_dir();
    let app = test_app(&dir);

    let body = MultipartBuilder::new()
        .text("title", "Hello World")
        .text("content", "A short post about testing.")
        .build();
    let resp = app
        .clone()
        .oneshot(generate_request(body))
        .await
        .expect("call app");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = response_json(resp).await;
    let url = v["ogImageUrl"].as_str().expect("ogImageUrl field");

    // 回读产物
    let get = Request::builder()
        .uri(asset_path_from_url(url))
        .body(Body::empty())
        .expect("build get");
    let asset_resp = app.oneshot(get).await.expect("fetch asset");
    assert_eq!(asset_resp.status(), StatusCode::OK);
    assert_eq!(
        asset_resp
            .headers()
            .get(header::CONTENT_TYPE)
            .expect("content type")
            .to_str()
            .unwrap(),
        "image/png"
    );
    assert_eq!(
        asset_resp
            .headers()
            .get(header::CACHE_CONTROL)
            .expect("cache control")
            .to_str()
            .unwrap(),
        "public, max-age=604800, immutable"
    );

    let bytes = axum::body::to_bytes(asset_resp.into_body(), usize::MAX)
        .await
        .expect("read asset");
    let decoded = image::load_from_memory(&bytes).expect("decode png").to_rgba8();
    assert_eq!((decoded.width(), decoded.height()), (1200, 630));
    // 左上角像素应为背景色 #f3f4f6
    assert_eq!(decoded.get_pixel(0, 0), &image::Rgba([243, 244, 246, 255]));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn uploaded_image_is_stretched_into_the_fixed_box() {
    let dir = temp_output_dir();
    let app = test_app(&dir);

    let body = MultipartBuilder::new()
        .text("title", "With photo")
        .text("content", "body")
        .file("image", "photo.png", "image/png", &red_png(2000, 2000))
        .build();
    let resp = app
        .clone()
        .oneshot(generate_request(body))
        .await
        .expect("call app");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = response_json(resp).await;
    let get = Request::builder()
        .uri(asset_path_from_url(v["ogImageUrl"].as_str().unwrap()))
        .body(Body::empty())
        .unwrap();
    let asset_resp = app.oneshot(get).await.expect("fetch asset");
    let bytes = axum::body::to_bytes(asset_resp.into_body(), usize::MAX)
        .await
        .expect("read asset");
    let decoded = image::load_from_memory(&bytes).expect("decode png").to_rgba8();

    // 边界盒 (50,200) 1100x380 的中心应是上传图片的颜色，盒外仍是背景
    assert_eq!(decoded.get_pixel(600, 390), &image::Rgba([255, 0, 0, 255]));
    assert_eq!(decoded.get_pixel(600, 190), &image::Rgba([243, 244, 246, 255]));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn missing_or_empty_text_fields_return_400_and_write_nothing() {
    let dir = temp_output_dir();
    let app = test_app(&dir);

    let bodies = vec![
        // title 缺失
        MultipartBuilder::new().text("content", "body").build(),
        // content 缺失
        MultipartBuilder::new().text("title", "t").build(),
        // title 为空
        MultipartBuilder::new()
            .text("title", "")
            .text("content", "body")
            .build(),
    ];

    for body in bodies {
        let resp = app
            .clone()
            .oneshot(generate_request(body))
            .await
            .expect("call app");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let v = response_json(resp).await;
        assert_eq!(
            v,
            serde_json::json!({"error": "title and content are required"})
        );
    }

    assert_eq!(stored_file_count(&dir), 0);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn undecodable_image_returns_400_and_writes_nothing() {
    let dir = temp_output_dir();
    let app = test_app(&dir);

    let body = MultipartBuilder::new()
        .text("title", "t")
        .text("content", "c")
        .file("image", "fake.png", "image/png", b"this is not a png")
        .build();
    let resp = app
        .clone()
        .oneshot(generate_request(body))
        .await
        .expect("call app");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let v = response_json(resp).await;
    let message = v["error"].as_str().expect("error message");
    assert!(message.starts_with("failed to decode uploaded image"));

    assert_eq!(stored_file_count(&dir), 0);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn non_image_content_type_is_rejected_before_decoding() {
    let dir = temp_output_dir();
    let app = test_app(&dir);

    let body = MultipartBuilder::new()
        .text("title", "t")
        .text("content", "c")
        .file("image", "notes.txt", "text/plain", b"hello")
        .build();
    let resp = app
        .clone()
        .oneshot(generate_request(body))
        .await
        .expect("call app");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert_eq!(stored_file_count(&dir), 0);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn oversized_image_is_rejected_before_decoding() {
    let dir = temp_output_dir();
    let render = RenderConfig {
        max_upload_bytes: 64,
        ..RenderConfig::default()
    };
    let app = test_app_with_render(&dir, render);

    let body = MultipartBuilder::new()
        .text("title", "t")
        .text("content", "c")
        .file("image", "big.png", "image/png", &red_png(64, 64))
        .build();
    let resp = app
        .clone()
        .oneshot(generate_request(body))
        .await
        .expect("call app");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let v = response_json(resp).await;
    let message = v["error"].as_str().expect("error message");
    assert!(message.contains("exceeds"));

    assert_eq!(stored_file_count(&dir), 0);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn concurrent_requests_produce_distinct_retrievable_assets() {
    let dir = temp_output_dir();
    let app = test_app(&dir);

    let mut handles = Vec::new();
    for _ in 0..50 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            let body = MultipartBuilder::new()
                .text("title", "Same title")
                .text("content", "Same content")
                .build();
            let resp = app
                .oneshot(generate_request(body))
                .await
                .expect("call app");
            assert_eq!(resp.status(), StatusCode::OK);
            let v = response_json(resp).await;
            v["ogImageUrl"].as_str().expect("url").to_string()
        }));
    }

    let mut urls = std::collections::HashSet::new();
    for handle in handles {
        urls.insert(handle.await.expect("task finished"));
    }

    // 同一内容重复生成也必须是 50 个互不相同、各自可回读的产物
    assert_eq!(urls.len(), 50);
    assert_eq!(stored_file_count(&dir), 50);

    for url in &urls {
        let get = Request::builder()
            .uri(asset_path_from_url(url))
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(get).await.expect("fetch asset");
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn unknown_asset_filename_returns_404() {
    let dir = temp_output_dir();
    let app = test_app(&dir);

    let get = Request::builder()
        .uri("/og-images/does-not-exist.png")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(get).await.expect("call app");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let _ = std::fs::remove_dir_all(&dir);
}
