use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::DownloadError;
use super::models::{JobDescriptor, MAX_RUNNING_PERCENT};

/// 一次外部提取调用所需的全部信息
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub job: Arc<JobDescriptor>,
    /// 中间文件目录，任务结束后由 Worker 删除
    pub temp_dir: PathBuf,
}

/// 外部工具上报的原始进度
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtractProgress {
    Bytes { downloaded: u64, total: Option<u64> },
    Percent(f32),
}

impl ExtractProgress {
    /// 归一化为 0-99.9 的百分比，总大小未知时为 0
    pub fn percent(&self) -> f32 {
        let raw = match *self {
            ExtractProgress::Bytes {
                downloaded,
                total: Some(total),
            } if total > 0 => downloaded as f64 / total as f64 * 100.0,
            ExtractProgress::Bytes { .. } => 0.0,
            ExtractProgress::Percent(percent) => percent as f64,
        };
        (raw as f32).clamp(0.0, MAX_RUNNING_PERCENT)
    }
}

/// 外部提取/转码后端
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    /// 启动任何任务之前检查外部依赖
    async fn check_available(&self) -> Result<(), DownloadError>;

    /// 下载并转码一个任务，成功时返回最终文件路径
    async fn extract(
        &self,
        request: &ExtractRequest,
        progress_tx: mpsc::UnboundedSender<ExtractProgress>,
        cancel: CancellationToken,
    ) -> Result<PathBuf, DownloadError>;
}
