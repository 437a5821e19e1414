use crate::config::AppConfig;
use crate::error::AppError;
use crate::features::ogimage::AssetStore;
use std::fs;
use std::path::Path;

/// 执行启动检查
///
/// 1. 检查并创建生成图片的落盘目录（一次性、幂等，不在请求路径上做）
/// 2. 检查字体资源（仅告警，不阻断启动）
/// 3. 预热全局字体数据库，降低首个合成请求的长尾延迟
pub async fn run_startup_checks(config: &AppConfig) -> Result<(), AppError> {
    tracing::info!("🔍 开始执行启动检查...");

    ensure_output_dir(config)?;
    ensure_font_resources();

    let t_prewarm = std::time::Instant::now();
    if let Err(e) =
        tokio::task::spawn_blocking(crate::features::ogimage::prewarm_render_assets).await
    {
        tracing::warn!("字体数据库预热任务失败: {}", e);
    } else {
        tracing::info!("字体数据库预热完成: {}ms", t_prewarm.elapsed().as_millis());
    }

    tracing::info!("✅ 启动检查完成");
    Ok(())
}

/// 确保落盘目录存在
fn ensure_output_dir(config: &AppConfig) -> Result<(), AppError> {
    let output_path = config.output_path();

    if !output_path.exists() {
        tracing::warn!("📁 未找到图片输出目录，正在创建: {:?}", output_path);
        AssetStore::new(&output_path).ensure_dir()?;
        tracing::info!("✅ 图片输出目录创建成功");
    } else {
        tracing::info!("✅ 图片输出目录已存在: {:?}", output_path);
    }

    Ok(())
}

/// 检查自定义字体目录（缺失时回退到系统字体，仅告警）
fn ensure_font_resources() {
    let font_dir = Path::new(crate::features::ogimage::FONTS_DIR);
    let has_font_file = fs::read_dir(font_dir)
        .map(|entries| {
            entries.flatten().any(|entry| {
                let path = entry.path();
                path.extension() == Some("ttf".as_ref()) || path.extension() == Some("otf".as_ref())
            })
        })
        .unwrap_or(false);

    if has_font_file {
        tracing::info!("✅ 自定义字体目录可用: {:?}", font_dir);
    } else {
        tracing::warn!("未找到自定义字体文件（{:?}），将仅使用系统字体", font_dir);
    }
}
