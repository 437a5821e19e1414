use axum::body::Bytes;
use serde::{Deserialize, Serialize};

/// 校验通过的生成请求，仅在单次调用期间存活
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// 标题（非空）
    pub title: String,
    /// 正文（非空；合成时只取截断后的摘要）
    pub content: String,
    /// 可选的嵌入图片
    pub image: Option<UploadedImage>,
}

/// 上传的图片：原始字节 + 客户端声明的 MIME 类型
///
/// 字节在合成阶段才会真正解码；这里只携带，不做格式校验。
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Bytes,
    pub content_type: String,
}

/// 生成成功的响应体
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OgImageResponse {
    /// 生成图片的可访问 URL
    #[schema(example = "http://localhost:3001/og-images/0f8fad5bd9cb469fa165b7e0f87344fe.png")]
    pub og_image_url: String,
}

/// multipart 表单的 OpenAPI 描述（仅用于文档，不参与反序列化）
#[derive(Debug, utoipa::ToSchema)]
pub struct GenerateOgImageForm {
    /// 标题（必填，非空）
    pub title: String,
    /// 正文（必填，非空）
    pub content: String,
    /// 可选的嵌入图片文件（须声明 image/* 类型）
    #[schema(value_type = Option<String>, format = Binary)]
    pub image: Option<Vec<u8>>,
}
