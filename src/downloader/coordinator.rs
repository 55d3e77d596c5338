use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::{DownloadError, FailureKind, JobFailure};
use super::extractor::Extractor;
use super::models::{
    BatchId, BatchOptions, BatchReport, BatchStatus, JobDescriptor, JobEvent, JobId, JobStatus,
};
use super::progress::ProgressSink;
use super::worker::{DownloadWorker, WorkerEvent};
use crate::common::activity_log::ActivityLog;
use crate::config::AppConfig;
use crate::parser::validate_url;

/// 批次句柄，等待结果或请求取消
pub struct BatchHandle {
    id: BatchId,
    cancel: CancellationToken,
    task: JoinHandle<BatchReport>,
}

impl BatchHandle {
    pub fn id(&self) -> BatchId {
        self.id
    }

    /// 协作式取消：未结束的任务会以 Cancelled 失败
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 等到所有任务进入终止状态
    pub async fn wait(self) -> Result<BatchReport, DownloadError> {
        Ok(self.task.await?)
    }
}

/// 批次协调器：为每条链接创建任务和 Worker，并聚合它们的事件
pub struct BatchCoordinator {
    config: Arc<AppConfig>,
    extractor: Arc<dyn Extractor>,
    sink: Arc<dyn ProgressSink>,
    batches: Arc<DashMap<BatchId, CancellationToken>>,
    shutdown: CancellationToken,
}

impl BatchCoordinator {
    pub fn new(
        config: Arc<AppConfig>,
        extractor: Arc<dyn Extractor>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config,
            extractor,
            sink,
            batches: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn start_batch<I, S>(
        &self,
        urls: I,
        options: BatchOptions,
    ) -> Result<BatchHandle, DownloadError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls: Vec<String> = urls.into_iter().map(|u| u.as_ref().to_string()).collect();
        if urls.is_empty() {
            return Err(DownloadError::InvalidInput(
                "没有提供链接，请至少输入一个 YouTube 链接".to_string(),
            ));
        }
        if options.max_parallel == 0 {
            return Err(DownloadError::InvalidInput("并发数必须大于 0".to_string()));
        }

        // 外部工具缺失时整个批次都无法进行
        self.extractor.check_available().await.map_err(|e| {
            error!("{} 不可用: {}", self.extractor.name(), e);
            e
        })?;

        let batch_id = BatchId::new();
        let cancel = self.shutdown.child_token();
        info!(
            "创建批次 {}: {} 个链接, 格式 {}, 音质 {}, 并发 {}",
            batch_id,
            urls.len(),
            options.format,
            options.quality,
            options.max_parallel
        );

        let mut statuses = Vec::with_capacity(urls.len());
        let mut runnable = Vec::new();
        for (id, raw) in urls.iter().enumerate() {
            let validated = validate_url(raw);
            let job = Arc::new(JobDescriptor {
                id,
                url: validated.as_deref().unwrap_or(raw.trim()).to_string(),
                format: options.format,
                quality: options.quality,
                destination: options.destination.clone(),
            });
            let mut status = JobStatus::new(Arc::clone(&job));
            match validated {
                Ok(_) => runnable.push(job),
                Err(e) => {
                    warn!("跳过无效链接 #{} {:?}: {}", id, raw, e);
                    status.apply(&JobEvent::Failed(JobFailure::from(&e)));
                }
            }
            statuses.push(status);
        }

        // 无效链接立即上报，不影响其它任务
        for status in &statuses {
            self.sink.on_job_update(status);
        }
        let batch_status = BatchStatus::from_jobs(batch_id, &statuses);
        self.sink.on_batch_update(&batch_status);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let slots = Arc::new(Semaphore::new(options.max_parallel));
        let workers: FuturesUnordered<_> = runnable
            .into_iter()
            .map(|job| {
                let job_id = job.id;
                let worker = DownloadWorker::new(
                    job,
                    batch_id,
                    Arc::clone(&self.extractor),
                    events_tx.clone(),
                    cancel.clone(),
                );
                let handle = tokio::spawn(worker.run(Arc::clone(&slots)));
                async move { (job_id, handle.await) }
            })
            .collect();
        // 只保留 Worker 手中的发送端，全部退出后通道关闭
        drop(events_tx);

        self.batches.insert(batch_id, cancel.clone());

        let aggregator = Aggregator {
            batch_id,
            statuses,
            batch_status,
            sink: Arc::clone(&self.sink),
        };
        let batches = Arc::clone(&self.batches);
        let activity_log = self.config.activity_log.clone().map(ActivityLog::new);
        let task = tokio::spawn(async move {
            let report = aggregator.run(events_rx, workers).await;
            batches.remove(&batch_id);
            if let Some(log) = activity_log {
                if let Err(e) = log.append(&report).await {
                    warn!("写入活动日志失败: {}", e);
                }
            }
            report
        });

        Ok(BatchHandle {
            id: batch_id,
            cancel,
            task,
        })
    }

    pub fn cancel(&self, handle: &BatchHandle) {
        info!("取消批次 {}", handle.id);
        handle.cancel();
    }

    /// 按批次ID取消，批次已结束时返回 false
    pub fn cancel_batch(&self, batch_id: &BatchId) -> bool {
        match self.batches.get(batch_id) {
            Some(token) => {
                info!("取消批次 {}", batch_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 取消所有进行中的批次，用于程序退出
    pub fn cancel_all(&self) {
        self.shutdown.cancel();
    }

    pub fn active_batches(&self) -> Vec<BatchId> {
        self.batches.iter().map(|entry| *entry.key()).collect()
    }
}

/// 批次状态的唯一写入者
struct Aggregator {
    batch_id: BatchId,
    statuses: Vec<JobStatus>,
    batch_status: BatchStatus,
    sink: Arc<dyn ProgressSink>,
}

impl Aggregator {
    async fn run<F>(
        mut self,
        mut events_rx: mpsc::UnboundedReceiver<WorkerEvent>,
        mut workers: FuturesUnordered<F>,
    ) -> BatchReport
    where
        F: std::future::Future<Output = (JobId, Result<(), JoinError>)>,
    {
        while !self.batch_status.is_complete() {
            tokio::select! {
                biased;
                Some(event) = events_rx.recv() => self.apply(event),
                Some((job_id, joined)) = workers.next(), if !workers.is_empty() => {
                    if let Err(e) = joined {
                        error!("任务 #{} 的 Worker 异常退出: {}", job_id, e);
                        self.apply(WorkerEvent {
                            job_id,
                            event: JobEvent::Failed(JobFailure::new(
                                FailureKind::UnknownExternalError,
                                format!("Worker 异常退出: {}", e),
                            )),
                        });
                    }
                }
                else => break,
            }
        }

        // 通道关闭但仍有任务未结束，不应发生
        let unfinished: Vec<JobId> = self
            .statuses
            .iter()
            .filter(|status| !status.state.is_terminal())
            .map(JobStatus::id)
            .collect();
        for job_id in unfinished {
            self.apply(WorkerEvent {
                job_id,
                event: JobEvent::Failed(JobFailure::new(
                    FailureKind::UnknownExternalError,
                    "Worker 未报告结果",
                )),
            });
        }

        info!(
            "批次 {} 完成: 成功 {}, 失败 {}",
            self.batch_id, self.batch_status.succeeded, self.batch_status.failed
        );
        BatchReport {
            status: self.batch_status,
            jobs: self.statuses,
        }
    }

    fn apply(&mut self, event: WorkerEvent) {
        let Some(status) = self.statuses.get_mut(event.job_id) else {
            warn!("收到未知任务的事件: #{}", event.job_id);
            return;
        };

        if !status.apply(&event.event) {
            if !matches!(event.event, JobEvent::Progress(_)) {
                warn!(
                    "忽略非法状态流转: 任务 #{} {} -> {:?}",
                    event.job_id, status.state, event.event
                );
            }
            return;
        }
        self.sink.on_job_update(status);

        let batch_status = BatchStatus::from_jobs(self.batch_id, &self.statuses);
        if batch_status != self.batch_status {
            debug!("批次 {} 状态: {:?}", self.batch_id, batch_status);
            self.batch_status = batch_status;
            self.sink.on_batch_update(&self.batch_status);
        }
    }
}
