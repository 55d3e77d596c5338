use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::{DownloadError, JobFailure};
use super::extractor::{ExtractRequest, Extractor};
use super::models::{BatchId, JobDescriptor, JobEvent, JobId};

/// Worker 发往协调器的事件
#[derive(Debug, Clone)]
pub struct WorkerEvent {
    pub job_id: JobId,
    pub event: JobEvent,
}

/// 执行单个任务：等待并发名额，调用外部提取，并把回调转换为事件
pub struct DownloadWorker {
    job: Arc<JobDescriptor>,
    batch_id: BatchId,
    extractor: Arc<dyn Extractor>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    cancel: CancellationToken,
}

impl DownloadWorker {
    pub fn new(
        job: Arc<JobDescriptor>,
        batch_id: BatchId,
        extractor: Arc<dyn Extractor>,
        events: mpsc::UnboundedSender<WorkerEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job,
            batch_id,
            extractor,
            events,
            cancel,
        }
    }

    /// 中间文件目录，放在保存目录下以便最终移动是同盘重命名
    pub fn temp_dir(&self) -> PathBuf {
        self.job
            .destination
            .join(format!(".ytadl-{}-{}", self.batch_id.short(), self.job.id))
    }

    pub async fn run(self, slots: Arc<Semaphore>) {
        // 取消优先于获取名额，保证未启动的任务直接失败
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("任务 #{} 在启动前被取消", self.job.id);
                self.emit(JobEvent::Failed(JobFailure::cancelled()));
                return;
            }
            permit = slots.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    self.emit(JobEvent::Failed(JobFailure::from(
                        DownloadError::UnknownExternalError("并发控制已关闭".to_string()),
                    )));
                    return;
                }
            },
        };

        self.emit(JobEvent::Started);
        info!("开始下载任务 #{}: {}", self.job.id, self.job.url);

        match self.execute().await {
            Ok(output) => {
                info!("✅ 下载任务完成 #{}: {}", self.job.id, output.display());
                self.emit(JobEvent::Succeeded(output));
            }
            Err(DownloadError::Cancelled) => {
                info!("⏹️ 下载任务已取消 #{}", self.job.id);
                self.emit(JobEvent::Failed(JobFailure::cancelled()));
            }
            Err(e) => {
                error!("❌ 下载任务失败 #{}: {}", self.job.id, e);
                self.emit(JobEvent::Failed(JobFailure::from(&e)));
            }
        }
    }

    async fn execute(&self) -> Result<PathBuf, DownloadError> {
        let temp_dir = self.prepare_destination().await?;
        let request = ExtractRequest {
            job: Arc::clone(&self.job),
            temp_dir: temp_dir.clone(),
        };

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let extract = self
            .extractor
            .extract(&request, progress_tx, self.cancel.child_token());
        tokio::pin!(extract);

        let mut last_percent = 0.0_f32;
        let result = loop {
            tokio::select! {
                result = &mut extract => break result,
                Some(progress) = progress_rx.recv() => {
                    self.forward_progress(progress.percent(), &mut last_percent);
                }
            }
        };
        while let Ok(progress) = progress_rx.try_recv() {
            self.forward_progress(progress.percent(), &mut last_percent);
        }

        remove_temp_dir(&temp_dir).await;

        match result {
            // 取消后完成的下载也按失败处理，不保留文件
            Ok(output) if self.cancel.is_cancelled() => {
                if let Err(e) = tokio::fs::remove_file(&output).await {
                    warn!("删除已取消任务的输出失败 {}: {}", output.display(), e);
                }
                Err(DownloadError::Cancelled)
            }
            other => other,
        }
    }

    fn forward_progress(&self, percent: f32, last_percent: &mut f32) {
        if percent > *last_percent {
            *last_percent = percent;
            self.emit(JobEvent::Progress(percent));
        }
    }

    /// 确认保存目录存在且可写，并创建本任务的中间目录
    async fn prepare_destination(&self) -> Result<PathBuf, DownloadError> {
        let destination = &self.job.destination;
        tokio::fs::create_dir_all(destination).await.map_err(|e| {
            DownloadError::FilesystemFailure(format!(
                "无法创建保存目录 {}: {}",
                destination.display(),
                e
            ))
        })?;

        let temp_dir = self.temp_dir();
        tokio::fs::create_dir_all(&temp_dir).await.map_err(|e| {
            DownloadError::FilesystemFailure(format!(
                "保存目录不可写 {}: {}",
                destination.display(),
                e
            ))
        })?;

        let probe = temp_dir.join(".write-test");
        if let Err(e) = tokio::fs::write(&probe, b"").await {
            remove_temp_dir(&temp_dir).await;
            return Err(DownloadError::FilesystemFailure(format!(
                "保存目录不可写 {}: {}",
                destination.display(),
                e
            )));
        }
        if let Err(e) = tokio::fs::remove_file(&probe).await {
            warn!("删除写入测试文件失败 {}: {}", probe.display(), e);
        }

        Ok(temp_dir)
    }

    fn emit(&self, event: JobEvent) {
        if self
            .events
            .send(WorkerEvent {
                job_id: self.job.id,
                event,
            })
            .is_err()
        {
            debug!("协调器已退出，丢弃任务 #{} 的事件", self.job.id);
        }
    }
}

async fn remove_temp_dir(temp_dir: &Path) {
    match tokio::fs::remove_dir_all(temp_dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("清理中间目录失败 {}: {}", temp_dir.display(), e),
    }
}
