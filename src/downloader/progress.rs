use dashmap::DashMap;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use super::models::{BatchStatus, JobId, JobState, JobStatus};

/// 后台任务与界面之间的观察者接口，实现方不能阻塞调用线程
pub trait ProgressSink: Send + Sync {
    fn on_job_update(&self, status: &JobStatus);
    fn on_batch_update(&self, status: &BatchStatus);
}

/// 什么都不做
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_job_update(&self, _status: &JobStatus) {}
    fn on_batch_update(&self, _status: &BatchStatus) {}
}

#[derive(Debug, Clone)]
pub enum SinkEvent {
    Job(JobStatus),
    Batch(BatchStatus),
}

/// 把事件转发到通道，由界面按自己的节奏消费
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn on_job_update(&self, status: &JobStatus) {
        // 接收端关闭说明界面已退出，丢弃即可
        let _ = self.tx.send(SinkEvent::Job(status.clone()));
    }

    fn on_batch_update(&self, status: &BatchStatus) {
        let _ = self.tx.send(SinkEvent::Batch(*status));
    }
}

/// 终端进度条
pub struct ConsoleSink {
    multi_pb: MultiProgress,
    batch_pb: ProgressBar,
    job_pbs: DashMap<JobId, ProgressBar>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        let multi_pb = MultiProgress::new();
        let batch_pb = multi_pb.add(ProgressBar::new(0));
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] 批次 {pos}/{len} {msg}",
        ) {
            batch_pb.set_style(style);
        }
        Self {
            multi_pb,
            batch_pb,
            job_pbs: DashMap::new(),
        }
    }

    fn job_bar(&self, status: &JobStatus) -> ProgressBar {
        self.job_pbs
            .entry(status.id())
            .or_insert_with(|| {
                let pb = self.multi_pb.add(ProgressBar::new(1000));
                if let Ok(style) = ProgressStyle::with_template(
                    "#{prefix} [{bar:40.cyan/blue}] {percent:>3}% {msg}",
                ) {
                    pb.set_style(style.progress_chars("#>-"));
                }
                pb.set_prefix(status.id().to_string());
                pb
            })
            .clone()
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleSink {
    fn on_job_update(&self, status: &JobStatus) {
        let pb = self.job_bar(status);
        pb.set_position((status.percent * 10.0) as u64);
        match status.state {
            JobState::Pending => pb.set_message(format!("等待中 {}", status.job.url)),
            JobState::Running => pb.set_message(format!("下载中 {}", status.job.url)),
            JobState::Succeeded => {
                let name = status
                    .output
                    .as_ref()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| status.job.url.clone());
                pb.finish_with_message(format!("✅ {}", name));
            }
            JobState::Failed => {
                let reason = status
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                pb.abandon_with_message(format!("❌ {} ({})", status.job.url, reason));
            }
        }
    }

    fn on_batch_update(&self, status: &BatchStatus) {
        self.batch_pb.set_length(status.total as u64);
        self.batch_pb.set_position(status.finished() as u64);
        self.batch_pb.set_message(format!(
            "等待 {} / 下载中 {} / 成功 {} / 失败 {}",
            status.pending, status.running, status.succeeded, status.failed
        ));
        if status.is_complete() {
            self.batch_pb.finish();
        }
    }
}
