use base64::{Engine as _, engine::general_purpose::STANDARD as base64_engine};
use resvg::usvg::{self, Options as UsvgOptions, fontdb};
use resvg::{
    render,
    tiny_skia::{Pixmap, Transform},
};
use std::fmt::Write;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use unicode_width::UnicodeWidthChar;

use crate::error::AppError;

use super::types::GenerationRequest;

// --- 画布与版式常量 ---
//
// 这些值是生成图片的视觉契约：固定尺寸、固定锚点，与请求内容无关。

/// 画布宽度（Open Graph 预览标准宽度）
pub const CANVAS_WIDTH: u32 = 1200;
/// 画布高度
pub const CANVAS_HEIGHT: u32 = 630;
/// 背景填充色
pub const BACKGROUND_COLOR: &str = "#f3f4f6";

const TITLE_FONT_SIZE: f64 = 40.0;
const TITLE_ANCHOR: (f64, f64) = (50.0, 100.0);
const TEXT_COLOR: &str = "#000000";

const SNIPPET_FONT_SIZE: f64 = 24.0;
const SNIPPET_ANCHOR: (f64, f64) = (50.0, 160.0);
/// 摘要截断长度（Unicode 标量值计数）
const SNIPPET_MAX_CHARS: usize = 100;

/// 单行文本允许的最大渲染宽度；超出时做水平压缩而非换行
const MAX_TEXT_WIDTH: f64 = 1100.0;

/// 嵌入图片的边界盒：(x, y, 宽, 高)，拉伸填满、不保持纵横比
const IMAGE_BOX: (f64, f64, f64, f64) = (50.0, 200.0, 1100.0, 380.0);

const BRANDING_FONT_SIZE: f64 = 20.0;
const BRANDING_ANCHOR: (f64, f64) = (1050.0, 610.0);
const BRANDING_COLOR: &str = "#4b5563";

/// 自定义字体目录（可选；缺失时使用系统字体）
pub const FONTS_DIR: &str = "resources/fonts";
const MAIN_FONT_NAME: &str = "Arial";

// 全局字体数据库单例
static GLOBAL_FONT_DB: OnceLock<Arc<fontdb::Database>> = OnceLock::new();

/// 初始化全局字体数据库
fn init_global_font_db() -> Arc<fontdb::Database> {
    let mut font_db = fontdb::Database::new();
    font_db.load_system_fonts();

    // 加载自定义字体
    let fonts_dir = PathBuf::from(FONTS_DIR);
    if fonts_dir.exists()
        && let Ok(entries) = fs::read_dir(&fonts_dir)
    {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file()
                && (path.extension() == Some("ttf".as_ref())
                    || path.extension() == Some("otf".as_ref()))
                && let Err(e) = font_db.load_font_file(&path)
            {
                tracing::error!("加载字体文件失败 '{}': {}", path.display(), e);
            }
        }
    }

    Arc::new(font_db)
}

/// 获取全局字体数据库
pub fn global_font_db() -> Arc<fontdb::Database> {
    GLOBAL_FONT_DB.get_or_init(init_global_font_db).clone()
}

/// 合成选项：版式之外的少量可配置项
#[derive(Debug, Clone)]
pub struct ComposeOptions {
    /// 右下角品牌文字
    pub branding_text: String,
    /// 是否优先速度栅格化
    pub optimize_speed: bool,
}

/// 合成一张 Open Graph 预览图并编码为 PNG 字节。
///
/// 纯函数：输出只取决于请求内容、版式常量与合成选项，不读写任何共享
/// 状态。图片解码与栅格化都是 CPU/阻塞型工作，调用方负责把整个函数
/// 放到阻塞线程池上执行。
pub fn compose_og_image(
    request: &GenerationRequest,
    opts: &ComposeOptions,
) -> Result<Vec<u8>, AppError> {
    let t0 = std::time::Instant::now();

    let svg = generate_og_svg(request, opts)?;
    let t_svg = t0.elapsed();

    let png = render_svg_to_png(&svg, opts.optimize_speed)?;

    tracing::debug!(
        "OG图片合成分段: svg={:?}, 栅格化+编码={:?}, 输出={}字节",
        t_svg,
        t0.elapsed() - t_svg,
        png.len()
    );

    Ok(png)
}

/// 摘要截断规则：取正文前 100 个字符并无条件追加 `...`。
///
/// 即使正文不足 100 个字符也追加省略号，这是既有视觉契约的一部分。
fn snippet_text(content: &str) -> String {
    let mut snippet: String = content.chars().take(SNIPPET_MAX_CHARS).collect();
    snippet.push_str("...");
    snippet
}

/// 估算一行文本的自然渲染宽度（像素）。
///
/// 全角字符按一个字号宽、半角按 0.55 个字号宽估算；这与实际字形宽度
/// 存在小偏差，但压缩是否触发只需要区分"明显超宽"与"正常"两档。
fn estimate_text_width(text: &str, font_size: f64) -> f64 {
    text.chars()
        .map(|ch| match UnicodeWidthChar::width(ch) {
            Some(2) => font_size,
            Some(0) | None => 0.0,
            _ => font_size * 0.55,
        })
        .sum()
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// 写出一行带最大宽度约束的文本元素。
///
/// 估算宽度超过 `MAX_TEXT_WIDTH` 时，用 textLength 把整行字形非均匀
/// 压缩到恰好等于最大宽度：单行、不换行、不缩小字号。未超宽时正常
/// 渲染（不压缩也不拉伸）。
fn write_fitted_text(
    svg: &mut String,
    text: &str,
    x: f64,
    y: f64,
    font_size: f64,
    class: &str,
) -> Result<(), AppError> {
    let fmt_err = |e| AppError::Encode(format!("SVG formatting error: {e}"));
    let escaped = escape_xml(text);

    if estimate_text_width(text, font_size) > MAX_TEXT_WIDTH {
        writeln!(
            svg,
            r#"<text x="{x}" y="{y}" class="{class}" textLength="{MAX_TEXT_WIDTH}" lengthAdjust="spacingAndGlyphs">{escaped}</text>"#
        )
        .map_err(fmt_err)?;
    } else {
        writeln!(svg, r#"<text x="{x}" y="{y}" class="{class}">{escaped}</text>"#).map_err(fmt_err)?;
    }
    Ok(())
}

/// 解码上传的图片并归一化为 PNG data URI。
///
/// 先完整解码一次：既把"字节不是图片"在这里拦截掉，也把 WebP 等
/// SVG `<image>` 不认识的来源格式统一转成 PNG。
fn embedded_image_href(bytes: &[u8]) -> Result<String, AppError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|e| AppError::AssetDecode(e.to_string()))?;

    let mut out = Vec::new();
    decoded
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| AppError::Encode(format!("re-encode uploaded image: {e}")))?;

    Ok(format!(
        "data:image/png;base64,{}",
        base64_engine.encode(out)
    ))
}

/// 生成整张画布的 SVG 场景。
///
/// 绘制顺序固定：背景 → 标题 → 摘要 → 嵌入图片（如有）→ 品牌文字。
/// 品牌文字最后绘制，保证不会被嵌入图片遮挡。
fn generate_og_svg(request: &GenerationRequest, opts: &ComposeOptions) -> Result<String, AppError> {
    let fmt_err = |e| AppError::Encode(format!("SVG formatting error: {e}"));

    // 内嵌图片的 data URI 会显著放大字符串，按需预留容量
    let capacity = 4096 + request.image.as_ref().map_or(0, |img| img.bytes.len() * 2);
    let mut svg = String::with_capacity(capacity);

    writeln!(
        svg,
        r#"<svg width="{CANVAS_WIDTH}" height="{CANVAS_HEIGHT}" viewBox="0 0 {CANVAS_WIDTH} {CANVAS_HEIGHT}" xmlns="http://www.w3.org/2000/svg">"#
    )
    .map_err(fmt_err)?;

    writeln!(svg, "<style>").map_err(fmt_err)?;
    write!(
        svg,
        r#"
        .text-title {{ font-size: {TITLE_FONT_SIZE}px; font-weight: 700; fill: {TEXT_COLOR}; }}
        .text-snippet {{ font-size: {SNIPPET_FONT_SIZE}px; font-weight: 400; fill: {TEXT_COLOR}; }}
        .text-branding {{ font-size: {BRANDING_FONT_SIZE}px; font-weight: 700; fill: {BRANDING_COLOR}; }}
        * {{ font-family: "{MAIN_FONT_NAME}", "Helvetica", "DejaVu Sans", sans-serif; }}
        "#
    )
    .map_err(fmt_err)?;
    writeln!(svg, "</style>").map_err(fmt_err)?;

    // 背景
    writeln!(
        svg,
        r#"<rect width="100%" height="100%" fill="{BACKGROUND_COLOR}" />"#
    )
    .map_err(fmt_err)?;

    // 标题（单行，超宽时水平压缩到最大宽度）
    let (title_x, title_y) = TITLE_ANCHOR;
    write_fitted_text(
        &mut svg,
        &request.title,
        title_x,
        title_y,
        TITLE_FONT_SIZE,
        "text-title",
    )?;

    // 摘要（截断 + 无条件省略号，同样的宽度约束）
    let (snippet_x, snippet_y) = SNIPPET_ANCHOR;
    write_fitted_text(
        &mut svg,
        &snippet_text(&request.content),
        snippet_x,
        snippet_y,
        SNIPPET_FONT_SIZE,
        "text-snippet",
    )?;

    // 嵌入图片：拉伸填满边界盒（preserveAspectRatio="none"，不保持纵横比）
    if let Some(upload) = &request.image {
        let href = embedded_image_href(&upload.bytes)?;
        let (img_x, img_y, img_w, img_h) = IMAGE_BOX;
        writeln!(
            svg,
            r#"<image href="{href}" x="{img_x}" y="{img_y}" width="{img_w}" height="{img_h}" preserveAspectRatio="none" />"#
        )
        .map_err(fmt_err)?;
    }

    // 品牌文字（最后绘制）
    let (brand_x, brand_y) = BRANDING_ANCHOR;
    writeln!(
        svg,
        r#"<text x="{brand_x}" y="{brand_y}" class="text-branding">{}</text>"#,
        escape_xml(&opts.branding_text)
    )
    .map_err(fmt_err)?;

    writeln!(svg, "</svg>").map_err(fmt_err)?;

    Ok(svg)
}

/// 将 SVG 场景栅格化并编码为 PNG 字节
fn render_svg_to_png(svg_data: &str, optimize_speed: bool) -> Result<Vec<u8>, AppError> {
    // 字体数据库（全局复用）
    let font_db = global_font_db();

    let opts = UsvgOptions {
        fontdb: font_db,
        font_family: MAIN_FONT_NAME.to_string(),
        font_size: 16.0,
        languages: vec!["en".to_string()],
        shape_rendering: if optimize_speed {
            usvg::ShapeRendering::OptimizeSpeed
        } else {
            usvg::ShapeRendering::GeometricPrecision
        },
        text_rendering: if optimize_speed {
            usvg::TextRendering::OptimizeSpeed
        } else {
            usvg::TextRendering::OptimizeLegibility
        },
        image_rendering: if optimize_speed {
            usvg::ImageRendering::OptimizeSpeed
        } else {
            usvg::ImageRendering::OptimizeQuality
        },
        ..Default::default()
    };

    let tree = usvg::Tree::from_data(svg_data.as_bytes(), &opts)
        .map_err(|e| AppError::Encode(format!("Failed to parse SVG: {e}")))?;

    let pixmap_size = tree.size().to_int_size();
    let mut pixmap = Pixmap::new(pixmap_size.width(), pixmap_size.height())
        .ok_or_else(|| AppError::Encode("Failed to create pixmap".to_string()))?;

    render(&tree, Transform::default(), &mut pixmap.as_mut());

    // 使用 png crate 进行快速编码
    let mut out = Vec::with_capacity((pixmap_size.width() * pixmap_size.height()) as usize);
    {
        let mut encoder = png::Encoder::new(&mut out, pixmap_size.width(), pixmap_size.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        if optimize_speed {
            encoder.set_compression(png::Compression::Fast);
            encoder.set_filter(png::FilterType::NoFilter);
        } else {
            encoder.set_compression(png::Compression::Default);
            encoder.set_filter(png::FilterType::Paeth);
        }
        let mut writer = encoder
            .write_header()
            .map_err(|e| AppError::Encode(format!("PNG write_header error: {e}")))?;
        writer
            .write_image_data(pixmap.data())
            .map_err(|e| AppError::Encode(format!("PNG write_image_data error: {e}")))?;
        writer
            .finish()
            .map_err(|e| AppError::Encode(format!("PNG finish error: {e}")))?;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{
        ComposeOptions, compose_og_image, escape_xml, estimate_text_width, generate_og_svg,
        snippet_text,
    };
    use crate::error::AppError;
    use crate::features::ogimage::types::{GenerationRequest, UploadedImage};
    use axum::body::Bytes;

    fn opts() -> ComposeOptions {
        ComposeOptions {
            branding_text: "#reactdeveloper".to_string(),
            optimize_speed: true,
        }
    }

    fn request(title: &str, content: &str) -> GenerationRequest {
        GenerationRequest {
            title: title.to_string(),
            content: content.to_string(),
            image: None,
        }
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

    #[test]
    fn snippet_appends_ellipsis_even_for_short_content() {
        assert_eq!(snippet_text("short"), "short...");
        assert_eq!(snippet_text(""), "...");
    }

    #[test]
    fn snippet_truncates_long_content_to_100_chars() {
        let long: String = "x".repeat(150);
        let snippet = snippet_text(&long);
        assert_eq!(snippet.chars().count(), 103);
        assert_eq!(snippet, format!("{}...", "x".repeat(100)));
    }

    #[test]
    fn snippet_counts_scalar_values_not_bytes() {
        let long: String = "汉".repeat(150);
        let snippet = snippet_text(&long);
        assert_eq!(snippet, format!("{}...", "汉".repeat(100)));
    }

    #[test]
    fn width_estimate_scales_with_font_size_and_char_width() {
        let half = estimate_text_width("abc", 40.0);
        let full = estimate_text_width("汉汉汉", 40.0);
        assert!(full > half);
        assert_eq!(estimate_text_width("", 40.0), 0.0);
    }

    #[test]
    fn escape_xml_neutralizes_markup() {
        assert_eq!(
            escape_xml(r#"<b>&"'x"#),
            "&lt;b&gt;&amp;&quot;&apos;x"
        );
    }

    #[test]
    fn short_title_is_not_compressed() {
        let svg = generate_og_svg(&request("Hi", "body"), &opts()).expect("svg");
        assert!(!svg.contains("textLength"));
    }

    #[test]
    fn overlong_title_is_compressed_to_max_width() {
        let long_title = "An Exceedingly Verbose Title ".repeat(8);
        let svg = generate_og_svg(&request(&long_title, "body"), &opts()).expect("svg");
        assert!(svg.contains(r#"textLength="1100""#));
        assert!(svg.contains(r#"lengthAdjust="spacingAndGlyphs""#));
    }

    #[test]
    fn embedded_image_fills_fixed_box_without_aspect_ratio() {
        let mut req = request("t", "c");
        req.image = Some(UploadedImage {
            bytes: Bytes::from(red_png(8, 8)),
            content_type: "image/png".to_string(),
        });
        let svg = generate_og_svg(&req, &opts()).expect("svg");
        assert!(svg.contains(r#"x="50" y="200" width="1100" height="380""#));
        assert!(svg.contains(r#"preserveAspectRatio="none""#));
    }

    #[test]
    fn branding_is_drawn_after_embedded_image() {
        let mut req = request("t", "c");
        req.image = Some(UploadedImage {
            bytes: Bytes::from(red_png(4, 4)),
            content_type: "image/png".to_string(),
        });
        let svg = generate_og_svg(&req, &opts()).expect("svg");
        let image_pos = svg.find("<image ").expect("image element");
        let branding_pos = svg.find("text-branding\"").expect("branding element");
        assert!(branding_pos > image_pos);
    }

    #[test]
    fn compose_produces_canvas_sized_png_with_background() {
        let png = compose_og_image(&request("Hello World", "A short post about testing."), &opts())
            .expect("compose");
        let decoded = image::load_from_memory(&png).expect("decode output").to_rgba8();
        assert_eq!(decoded.width(), 1200);
        assert_eq!(decoded.height(), 630);
        // 左上角像素应为背景色 #f3f4f6
        assert_eq!(decoded.get_pixel(0, 0), &image::Rgba([243, 244, 246, 255]));
    }

    #[test]
    fn compose_stretches_embedded_image_into_box() {
        let mut req = request("t", "c");
        // 源图 2:2，目标盒 1100x380：拉伸后盒内应整体为红色
        req.image = Some(UploadedImage {
            bytes: Bytes::from(red_png(2, 2)),
            content_type: "image/png".to_string(),
        });
        let png = compose_og_image(&req, &opts()).expect("compose");
        let decoded = image::load_from_memory(&png).expect("decode output").to_rgba8();
        // 盒中心 (50+550, 200+190)
        assert_eq!(decoded.get_pixel(600, 390), &image::Rgba([255, 0, 0, 255]));
        // 盒外仍是背景
        assert_eq!(decoded.get_pixel(600, 190), &image::Rgba([243, 244, 246, 255]));
    }

    #[test]
    fn compose_rejects_undecodable_image_bytes() {
        let mut req = request("t", "c");
        req.image = Some(UploadedImage {
            bytes: Bytes::from_static(b"definitely not an image"),
            content_type: "image/png".to_string(),
        });
        let err = compose_og_image(&req, &opts()).expect_err("should fail");
        assert!(matches!(err, AppError::AssetDecode(_)));
    }

    #[test]
    fn compose_is_deterministic_for_identical_input() {
        let req = request("Same", "Same body");
        let a = compose_og_image(&req, &opts()).expect("compose a");
        let b = compose_og_image(&req, &opts()).expect("compose b");
        assert_eq!(a, b);
    }
}
