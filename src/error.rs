use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 应用统一错误类型
///
/// 对外契约：所有错误在边界处统一映射为 `{"error": "<message>"}` 的 JSON
/// 响应体，状态码见 `status_code()`。`InvalidInput` 的文案会原样出现在
/// 响应体中，属于稳定契约，修改前需要确认调用方。
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum AppError {
    /// 请求字段缺失、为空或不符合约束
    #[error("{0}")]
    InvalidInput(String),

    /// 上传的图片字节无法解码
    #[error("failed to decode uploaded image: {0}")]
    AssetDecode(String),

    /// 生成产物落盘失败
    #[error("failed to persist generated image: {0}")]
    Persistence(String),

    /// 画布合成或序列化失败（内部缺陷，而非用户错误）
    #[error("failed to encode canvas: {0}")]
    Encode(String),

    /// 合成超出配置的最长处理时间
    #[error("image generation timed out after {0}s")]
    Timeout(u64),

    /// 内部服务器错误
    #[error("internal error: {0}")]
    Internal(String),
}

/// 错误响应体：`{"error": "<message>"}`。
///
/// 注意：该结构只有一个字段。契约测试会对响应体做整体相等断言，
/// 追加字段属于破坏性变更。
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// 人类可读的错误信息
    pub error: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::AssetDecode(_) => StatusCode::BAD_REQUEST,
            AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 5xx 属于服务端缺陷或资源问题，记录完整信息便于排查；
        // 4xx 是调用方问题，降为 debug 避免刷日志。
        if status.is_server_error() {
            tracing::error!("请求处理失败: {}", self);
        } else {
            tracing::debug!("请求被拒绝: {}", self);
        }

        let body = ErrorBody {
            error: self.to_string(),
        };

        let mut res = Json(body).into_response();
        *res.status_mut() = status;
        res
    }
}
