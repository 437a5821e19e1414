use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::{BrandingConfig, RenderConfig};
use crate::features::ogimage::{AssetPublisher, AssetStore};

/// 聚合的应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// 生成产物的落盘存储
    pub assets: Arc<AssetStore>,
    /// 产物 URL 发布器
    pub publisher: Arc<AssetPublisher>,
    /// 控制并发合成的信号量（限制 CPU 密集型任务数量）
    pub render_semaphore: Arc<Semaphore>,
    /// 图片合成配置快照
    pub render: RenderConfig,
    /// 品牌标识配置快照
    pub branding: BrandingConfig,
}
