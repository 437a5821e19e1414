use axum::{
    Json, Router,
    extract::{Multipart, State},
    routing::post,
};
use std::time::Instant;

use crate::error::{AppError, ErrorBody};
use crate::state::AppState;

use super::renderer::{self, ComposeOptions};
use super::types::{GenerateOgImageForm, OgImageResponse};
use super::validator::{self, RawGenerationForm};

pub fn create_og_router() -> Router<AppState> {
    Router::new().route("/generate-og-image", post(generate_og_image))
}

/// 解析 multipart 表单为原始字段。
///
/// 只认 title/content/image 三个字段，未知字段直接跳过；字段级读取
/// 失败（编码问题、请求体中断）统一归为输入错误。
async fn parse_form(mut multipart: Multipart) -> Result<RawGenerationForm, AppError> {
    let invalid = |e| AppError::InvalidInput(format!("malformed multipart body: {e}"));

    let mut form = RawGenerationForm::default();
    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("title") => form.title = Some(field.text().await.map_err(invalid)?),
            Some("content") => form.content = Some(field.text().await.map_err(invalid)?),
            Some("image") => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(invalid)?;
                form.image = Some((bytes, content_type));
            }
            _ => {}
        }
    }
    Ok(form)
}

#[utoipa::path(
    post,
    path = "/generate-og-image",
    summary = "生成 Open Graph 预览图",
    description = "接收标题、正文与可选图片，合成固定尺寸（1200x630）的社交分享预览图，\
                   落盘后返回可访问的图片 URL。",
    request_body(content = GenerateOgImageForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "生成成功", body = OgImageResponse),
        (status = 400, description = "字段缺失/图片非法", body = ErrorBody),
        (status = 500, description = "合成或落盘失败", body = ErrorBody),
        (status = 503, description = "合成超时", body = ErrorBody)
    ),
    tag = "OgImage"
)]
pub async fn generate_og_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<OgImageResponse>, AppError> {
    let t_total = Instant::now();

    let form = parse_form(multipart).await?;
    let request = validator::validate(form, state.render.max_upload_bytes)?;
    let has_image = request.image.is_some();

    // 并发合成许可：限制同时进行的解码/栅格化数量
    let t_wait = Instant::now();
    let permit = state
        .render_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| AppError::Internal(format!("acquire render permit: {e}")))?;
    let wait_ms = t_wait.elapsed().as_millis() as u64;

    let opts = ComposeOptions {
        branding_text: state.branding.text.clone(),
        optimize_speed: state.render.optimize_speed,
    };

    // 解码与栅格化都是阻塞型工作，必须移出 tokio worker；
    // 超时后任务会在后台跑完被丢弃，但请求侧立即返回。
    let t_compose = Instant::now();
    let compose_task = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        renderer::compose_og_image(&request, &opts)
    });
    let png = match tokio::time::timeout(state.render.timeout_duration(), compose_task).await {
        Err(_) => return Err(AppError::Timeout(state.render.timeout_secs)),
        Ok(joined) => joined.map_err(|e| AppError::Internal(format!("compose task failed: {e}")))??,
    };
    let compose_ms = t_compose.elapsed().as_millis() as u64;

    let filename = state.assets.persist(&png).await?;
    let url = state.publisher.asset_url(&filename);

    tracing::info!(
        has_image,
        wait_ms,
        compose_ms,
        total_ms = t_total.elapsed().as_millis() as u64,
        bytes = png.len(),
        %filename,
        "OG 图片生成完成"
    );

    Ok(Json(OgImageResponse { og_image_url: url }))
}
