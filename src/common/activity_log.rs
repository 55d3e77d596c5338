use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::downloader::models::{BatchReport, JobState};

/// 纯文本活动日志，每个批次追加一段
pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, report: &BatchReport) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(render(report).as_bytes()).await?;
        file.flush().await?;

        debug!("活动日志已写入: {}", self.path.display());
        Ok(())
    }
}

fn render(report: &BatchReport) -> String {
    let status = &report.status;
    let mut text = format!(
        "[{}] batch {} total={} succeeded={} failed={}\n",
        Local::now().to_rfc3339(),
        status.batch_id,
        status.total,
        status.succeeded,
        status.failed
    );
    for job in &report.jobs {
        let detail = match (job.state, &job.output, &job.error) {
            (JobState::Succeeded, Some(output), _) => format!(" -> {}", output.display()),
            (_, _, Some(error)) => format!(" error: {}", error),
            _ => String::new(),
        };
        text.push_str(&format!(
            "  #{} {} {}{}\n",
            job.id(),
            job.state,
            job.job.url,
            detail
        ));
    }
    text
}
