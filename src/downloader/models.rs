use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::JobFailure;

// --------------------------------------------------------------------
/// 目标音频格式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    M4a,
    Ogg,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 4] = [
        AudioFormat::Mp3,
        AudioFormat::Wav,
        AudioFormat::M4a,
        AudioFormat::Ogg,
    ];

    /// yt-dlp `--audio-format` 参数值
    pub fn codec(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::M4a => "m4a",
            // ogg 容器对应 vorbis 编码
            AudioFormat::Ogg => "vorbis",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::M4a => "m4a",
            AudioFormat::Ogg => "ogg",
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioFormat::Wav)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension().to_uppercase())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "wav" => Ok(AudioFormat::Wav),
            "m4a" => Ok(AudioFormat::M4a),
            "ogg" | "vorbis" => Ok(AudioFormat::Ogg),
            other => Err(format!("不支持的音频格式: {} (可选 mp3, wav, m4a, ogg)", other)),
        }
    }
}

// --------------------------------------------------------------------
/// 目标音质，`Best` 交给 yt-dlp 选择最佳 VBR
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AudioQuality {
    Best,
    Kbps(u32),
}

impl Default for AudioQuality {
    fn default() -> Self {
        AudioQuality::Kbps(320)
    }
}

impl AudioQuality {
    /// yt-dlp `--audio-quality` 参数值
    pub fn ytdlp_arg(&self) -> String {
        match self {
            AudioQuality::Best => "0".to_string(),
            AudioQuality::Kbps(kbps) => format!("{}K", kbps),
        }
    }
}

impl fmt::Display for AudioQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioQuality::Best => write!(f, "best"),
            AudioQuality::Kbps(kbps) => write!(f, "{}kbps", kbps),
        }
    }
}

impl FromStr for AudioQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        if value == "best" {
            return Ok(AudioQuality::Best);
        }
        let digits = value
            .strip_suffix("kbps")
            .or_else(|| value.strip_suffix('k'))
            .unwrap_or(&value);
        match digits.parse::<u32>() {
            Ok(kbps) if (32..=512).contains(&kbps) => Ok(AudioQuality::Kbps(kbps)),
            Ok(kbps) => Err(format!("码率超出范围: {}kbps (32-512)", kbps)),
            Err(_) => Err(format!("无效的音质: {} (例如 best, 192, 320k)", s)),
        }
    }
}

// --------------------------------------------------------------------
pub type JobId = usize;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// 用于临时目录名的短标识
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 一个批次共享的下载选项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOptions {
    pub format: AudioFormat,
    pub quality: AudioQuality,
    pub destination: PathBuf,
    pub max_parallel: usize,
}

impl BatchOptions {
    pub fn new(destination: impl AsRef<Path>) -> Self {
        Self {
            format: AudioFormat::default(),
            quality: AudioQuality::default(),
            destination: destination.as_ref().to_path_buf(),
            max_parallel: 3,
        }
    }
}

/// 单个下载请求，创建后不可变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobDescriptor {
    pub id: JobId,
    pub url: String,
    pub format: AudioFormat,
    pub quality: AudioQuality,
    pub destination: PathBuf,
}

// --------------------------------------------------------------------
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// 状态只能单向流转: Pending -> Running -> {Succeeded | Failed}, Pending -> Failed
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Running)
                | (JobState::Pending, JobState::Failed)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Running, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// Worker 上报给协调器的生命周期事件
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Started,
    Progress(f32),
    Succeeded(PathBuf),
    Failed(JobFailure),
}

/// 下载中的进度上限，只有成功后才显示 100%
pub const MAX_RUNNING_PERCENT: f32 = 99.9;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job: Arc<JobDescriptor>,
    pub state: JobState,
    pub percent: f32,
    pub error: Option<JobFailure>,
    pub output: Option<PathBuf>,
}

impl JobStatus {
    pub fn new(job: Arc<JobDescriptor>) -> Self {
        Self {
            job,
            state: JobState::Pending,
            percent: 0.0,
            error: None,
            output: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.job.id
    }

    /// 应用事件，返回状态是否发生了变化；非法流转会被忽略
    pub fn apply(&mut self, event: &JobEvent) -> bool {
        match event {
            JobEvent::Started => self.transition(JobState::Running),
            JobEvent::Progress(percent) => {
                if self.state != JobState::Running {
                    return false;
                }
                let percent = percent.clamp(0.0, MAX_RUNNING_PERCENT);
                if percent <= self.percent {
                    return false;
                }
                self.percent = percent;
                true
            }
            JobEvent::Succeeded(output) => {
                if !self.transition(JobState::Succeeded) {
                    return false;
                }
                self.percent = 100.0;
                self.output = Some(output.clone());
                true
            }
            JobEvent::Failed(failure) => {
                if !self.transition(JobState::Failed) {
                    return false;
                }
                self.error = Some(failure.clone());
                true
            }
        }
    }

    fn transition(&mut self, next: JobState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        true
    }
}

// --------------------------------------------------------------------
/// 批次聚合状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchStatus {
    pub batch_id: BatchId,
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchStatus {
    pub fn from_jobs(batch_id: BatchId, jobs: &[JobStatus]) -> Self {
        let mut status = Self {
            batch_id,
            total: jobs.len(),
            pending: 0,
            running: 0,
            succeeded: 0,
            failed: 0,
        };
        for job in jobs {
            match job.state {
                JobState::Pending => status.pending += 1,
                JobState::Running => status.running += 1,
                JobState::Succeeded => status.succeeded += 1,
                JobState::Failed => status.failed += 1,
            }
        }
        status
    }

    pub fn finished(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.pending == 0 && self.running == 0
    }
}

/// 批次结束后的完整结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub status: BatchStatus,
    pub jobs: Vec<JobStatus>,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &JobStatus> {
        self.jobs.iter().filter(|job| job.state == JobState::Failed)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Path> {
        self.jobs.iter().filter_map(|job| job.output.as_deref())
    }
}
