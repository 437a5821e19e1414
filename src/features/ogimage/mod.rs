pub mod handler;
mod publisher;
mod renderer;
mod store;
mod types;
mod validator;

/// 启动期预热全局字体数据库（系统字体扫描 + 自定义字体加载）。
///
/// 注意：该预热只用于降低首个合成请求的长尾延迟，不参与请求处理路径。
pub(crate) fn prewarm_render_assets() {
    let _ = renderer::global_font_db();
}

pub use handler::create_og_router;
pub use publisher::{ASSET_URL_PREFIX, AssetPublisher, asset_cache_control_middleware};
pub use renderer::{
    BACKGROUND_COLOR, CANVAS_HEIGHT, CANVAS_WIDTH, ComposeOptions, FONTS_DIR, compose_og_image,
};
pub use store::AssetStore;
pub use types::{GenerateOgImageForm, GenerationRequest, OgImageResponse, UploadedImage};
pub use validator::RawGenerationForm;
