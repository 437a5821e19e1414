use axum::body::Bytes;

use crate::error::AppError;

use super::types::{GenerationRequest, UploadedImage};

/// 缺失/为空的标题或正文对应的稳定错误文案（对外契约，勿改动）
const MISSING_TEXT_FIELDS: &str = "title and content are required";

/// multipart 解析出的原始字段，未经校验
#[derive(Debug, Default)]
pub struct RawGenerationForm {
    pub title: Option<String>,
    pub content: Option<String>,
    pub image: Option<(Bytes, Option<String>)>,
}

/// 校验原始表单并产出 `GenerationRequest`
///
/// 规则：
/// - 标题与正文必填且非空（仅空白字符视同为空）；
/// - 图片可选；若存在则声明类型必须是 image/*，且字节数不超过上限
///   （在解码之前拦截，避免解码阶段内存失控）；
/// - 浏览器表单在未选择文件时会提交零字节的文件分片，按"未上传"处理。
///
/// 无副作用；失败返回 `InvalidInput`，调用方不得继续合成。
pub fn validate(form: RawGenerationForm, max_image_bytes: u64) -> Result<GenerationRequest, AppError> {
    let title = non_empty_text(form.title.as_deref())
        .ok_or_else(|| AppError::InvalidInput(MISSING_TEXT_FIELDS.to_string()))?;
    let content = non_empty_text(form.content.as_deref())
        .ok_or_else(|| AppError::InvalidInput(MISSING_TEXT_FIELDS.to_string()))?;

    let image = match form.image {
        None => None,
        Some((bytes, _)) if bytes.is_empty() => None,
        Some((bytes, declared_type)) => {
            let content_type = declared_type.ok_or_else(|| {
                AppError::InvalidInput("image upload must declare a content type".to_string())
            })?;
            if !content_type.starts_with("image/") {
                return Err(AppError::InvalidInput(format!(
                    "image upload must be an image type, got '{content_type}'"
                )));
            }
            if bytes.len() as u64 > max_image_bytes {
                return Err(AppError::InvalidInput(format!(
                    "image upload exceeds the maximum of {max_image_bytes} bytes"
                )));
            }
            Some(UploadedImage {
                bytes,
                content_type,
            })
        }
    };

    Ok(GenerationRequest {
        title,
        content,
        image,
    })
}

fn non_empty_text(value: Option<&str>) -> Option<String> {
    let value = value?;
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
