use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::AppError;

/// 生成产物的落盘存储。
///
/// 并发契约：目录是多个请求之间唯一的共享可变资源，正确性完全依赖
/// 文件名全局唯一（随机 UUID），不依赖目录锁。
pub struct AssetStore {
    dir: PathBuf,
}

impl AssetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 确保存储目录存在（幂等；进程启动时调用一次，不在请求路径上）
    pub fn ensure_dir(&self) -> Result<(), AppError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| AppError::Persistence(format!("create output dir: {e}")))
    }

    /// 分配一个不会与历史/并发产物冲突的文件名。
    ///
    /// 时间戳方案在同一毫秒内的两个请求会相撞，这里用随机 UUID，
    /// 在并发下也无需任何协调。
    fn next_filename() -> String {
        format!("{}.png", Uuid::new_v4().simple())
    }

    /// 将编码完成的字节写入存储，返回分配的文件名。
    ///
    /// 先写临时文件再重命名：任何失败路径下，公开文件名都不会指向
    /// 半成品；失败时尽力清理临时文件并返回 `Persistence`。
    pub async fn persist(&self, bytes: &[u8]) -> Result<String, AppError> {
        let filename = Self::next_filename();
        let final_path = self.dir.join(&filename);
        let tmp_path = self.dir.join(format!("{filename}.tmp"));

        if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(AppError::Persistence(format!(
                "write {}: {e}",
                tmp_path.display()
            )));
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(AppError::Persistence(format!(
                "rename into {}: {e}",
                final_path.display()
            )));
        }

        tracing::debug!("产物已落盘: {} ({} 字节)", final_path.display(), bytes.len());
        Ok(filename)
    }
}
