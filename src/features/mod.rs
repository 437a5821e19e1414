/// Open Graph 预览图生成功能
pub mod ogimage;
