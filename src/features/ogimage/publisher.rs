use axum::extract::Request;
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;

/// 产物的公开读取路径前缀（静态目录服务挂载在同一前缀下）
pub const ASSET_URL_PREFIX: &str = "/og-images";

/// 产物 URL 发布器：把落盘文件名映射为对外可访问的地址。
///
/// 不接触字节本身，只负责地址契约：`<base>/og-images/<filename>`。
pub struct AssetPublisher {
    base_url: String,
}

impl AssetPublisher {
    pub fn new(public_base_url: &str) -> Self {
        Self {
            base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// 由文件名确定性地导出公开 URL
    pub fn asset_url(&self, filename: &str) -> String {
        format!("{}{}/{}", self.base_url, ASSET_URL_PREFIX, filename)
    }
}

/// 为产物静态资源添加缓存头。
///
/// 产物一经发布即不可变（同名文件永不被改写），所以可以放心地让
/// 客户端与 CDN 长期缓存。
pub async fn asset_cache_control_middleware(req: Request, next: Next) -> Response {
    let is_asset = req
        .uri()
        .path()
        .starts_with(&format!("{ASSET_URL_PREFIX}/"));
    let mut res = next.run(req).await;
    if is_asset && res.headers().get(header::CACHE_CONTROL).is_none() {
        res.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=604800, immutable"),
        );
    }
    res
}
