use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("无效的输入: {0}")]
    InvalidInput(String),

    #[error("缺少外部工具: {0}")]
    ExternalToolMissing(String),

    #[error("网络或解析失败: {0}")]
    NetworkFailure(String),

    #[error("文件系统错误: {0}")]
    FilesystemFailure(String),

    #[error("未知的外部错误: {0}")]
    UnknownExternalError(String),

    #[error("任务已取消")]
    Cancelled,

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("后台任务异常退出: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DownloadError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DownloadError::InvalidInput(_) => FailureKind::InvalidInput,
            DownloadError::ExternalToolMissing(_) => FailureKind::ExternalToolMissing,
            DownloadError::NetworkFailure(_) => FailureKind::NetworkFailure,
            DownloadError::FilesystemFailure(_) | DownloadError::Io(_) => {
                FailureKind::FilesystemFailure
            }
            DownloadError::UnknownExternalError(_) | DownloadError::Join(_) => {
                FailureKind::UnknownExternalError
            }
            DownloadError::Cancelled => FailureKind::Cancelled,
        }
    }
}

/// 任务失败的分类，供界面展示
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FailureKind {
    InvalidInput,
    ExternalToolMissing,
    NetworkFailure,
    FilesystemFailure,
    UnknownExternalError,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::InvalidInput => "InvalidInput",
            FailureKind::ExternalToolMissing => "ExternalToolMissing",
            FailureKind::NetworkFailure => "NetworkFailure",
            FailureKind::FilesystemFailure => "FilesystemFailure",
            FailureKind::UnknownExternalError => "UnknownExternalError",
            FailureKind::Cancelled => "Cancelled",
        };
        write!(f, "{}", name)
    }
}

/// 可克隆的失败摘要，挂在 JobStatus 上
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "任务已取消")
    }
}

impl From<&DownloadError> for JobFailure {
    fn from(error: &DownloadError) -> Self {
        JobFailure::new(error.kind(), error.to_string())
    }
}

impl From<DownloadError> for JobFailure {
    fn from(error: DownloadError) -> Self {
        JobFailure::from(&error)
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
