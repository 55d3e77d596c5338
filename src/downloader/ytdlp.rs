use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::DownloadError;
use super::extractor::{ExtractProgress, ExtractRequest, Extractor};
use crate::config::AppConfig;
use crate::post_process::{check_ffmpeg, check_ytdlp};

const PROGRESS_MARKER: &str = "ytadl-progress";
const OUTPUT_MARKER: &str = "ytadl-output";

/// 输出文件名模板：标题 + 视频ID，扩展名由转码格式决定
pub const OUTPUT_TEMPLATE: &str = "%(title)s_[%(id)s].%(ext)s";

lazy_static! {
    static ref PROGRESS_PATTERN: Regex = Regex::new(
        r"ytadl-progress\s+(\d+|NA|None)\s+(\d+|NA|None)\s+(\d+(?:\.\d+)?|NA|None)"
    )
    .unwrap();
    static ref PERCENT_PATTERN: Regex = Regex::new(r"^\[download\]\s+(\d+(?:\.\d+)?)%").unwrap();
}

/// 基于 yt-dlp 命令行的提取后端
pub struct YtDlpExtractor {
    config: Arc<AppConfig>,
}

impl YtDlpExtractor {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }

    pub fn build_args(&self, request: &ExtractRequest) -> Vec<OsString> {
        let job = &request.job;
        let mut args: Vec<OsString> = vec![
            "--no-playlist".into(),
            "--no-color".into(),
            "--encoding".into(),
            "utf-8".into(),
            "--force-overwrites".into(),
            "-f".into(),
            "bestaudio/best".into(),
            "-x".into(),
            "--audio-format".into(),
            job.format.codec().into(),
        ];

        if job.format.is_lossless() {
            debug!("{} 为无损格式，忽略音质参数 {}", job.format, job.quality);
        } else {
            args.push("--audio-quality".into());
            args.push(job.quality.ytdlp_arg().into());
        }

        if let Some(ffmpeg) = &self.config.ffmpeg_path {
            args.push("--ffmpeg-location".into());
            args.push(ffmpeg.into());
        }

        args.push("-P".into());
        args.push(job.destination.clone().into_os_string());
        let mut temp_path = OsString::from("temp:");
        temp_path.push(request.temp_dir.as_os_str());
        args.push("-P".into());
        args.push(temp_path);

        args.extend::<[OsString; 9]>([
            "-o".into(),
            OUTPUT_TEMPLATE.into(),
            "--newline".into(),
            "--progress".into(),
            "--progress-template".into(),
            format!(
                "download:{} %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s",
                PROGRESS_MARKER
            )
            .into(),
            "--print".into(),
            format!("after_move:{} %(filepath)s", OUTPUT_MARKER).into(),
            "--no-simulate".into(),
        ]);

        args.extend(self.config.extra_ytdlp_args.iter().map(OsString::from));
        args.push("--".into());
        args.push(job.url.clone().into());
        args
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn check_available(&self) -> Result<(), DownloadError> {
        check_ytdlp(&self.config.ytdlp_path).await?;
        check_ffmpeg(self.config.ffmpeg_cmd()).await
    }

    async fn extract(
        &self,
        request: &ExtractRequest,
        progress_tx: mpsc::UnboundedSender<ExtractProgress>,
        cancel: CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        let job_id = request.job.id;
        debug!("任务 #{} 调用 yt-dlp: {:?}", job_id, request.job.url);

        let mut child = Command::new(&self.config.ytdlp_path)
            .args(self.build_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => DownloadError::ExternalToolMissing(format!(
                    "未找到 yt-dlp ({})",
                    self.config.ytdlp_path
                )),
                _ => DownloadError::UnknownExternalError(format!("无法启动 yt-dlp: {}", e)),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            DownloadError::UnknownExternalError("无法读取 yt-dlp 标准输出".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            DownloadError::UnknownExternalError("无法读取 yt-dlp 错误输出".to_string())
        })?;
        let mut stdout = BufReader::new(stdout);
        let mut stderr = BufReader::new(stderr);
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        // 静默模式下进度会写到 stderr，所以两路输出都要解析
        let mut output_path: Option<PathBuf> = None;
        let mut error_lines: Vec<String> = Vec::new();
        let mut stdout_open = true;
        let mut stderr_open = true;

        while stdout_open || stderr_open {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("任务 #{} 已取消，终止 yt-dlp", job_id);
                    if let Err(e) = child.kill().await {
                        warn!("终止 yt-dlp 失败: {}", e);
                    }
                    return Err(DownloadError::Cancelled);
                }
                line = read_line_lossy(&mut stdout, &mut stdout_buf), if stdout_open => match line {
                    Ok(Some(line)) => handle_line(&line, &progress_tx, &mut output_path, &mut error_lines),
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        warn!("读取 yt-dlp 标准输出失败: {}", e);
                        stdout_open = false;
                    }
                },
                line = read_line_lossy(&mut stderr, &mut stderr_buf), if stderr_open => match line {
                    Ok(Some(line)) => handle_line(&line, &progress_tx, &mut output_path, &mut error_lines),
                    Ok(None) => stderr_open = false,
                    Err(e) => {
                        warn!("读取 yt-dlp 错误输出失败: {}", e);
                        stderr_open = false;
                    }
                },
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("任务 #{} 已取消，终止 yt-dlp", job_id);
                if let Err(e) = child.kill().await {
                    warn!("终止 yt-dlp 失败: {}", e);
                }
                return Err(DownloadError::Cancelled);
            }
            status = child.wait() => status?,
        };

        if !status.success() {
            warn!("任务 #{} yt-dlp 退出码异常: {:?}", job_id, status.code());
            return Err(classify_failure(&error_lines));
        }

        output_path.ok_or_else(|| {
            DownloadError::UnknownExternalError("yt-dlp 未报告输出文件路径".to_string())
        })
    }
}

/// 按行读取子进程输出，非 UTF-8 字节按替换字符处理
///
/// `buf` 在多次调用间保留，`select!` 中途丢弃时已读到的字节不会丢失
async fn read_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    reader.read_until(b'\n', buf).await?;
    if buf.is_empty() {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\n', '\r'])
        .to_string();
    buf.clear();
    Ok(Some(line))
}

fn handle_line(
    line: &str,
    progress_tx: &mpsc::UnboundedSender<ExtractProgress>,
    output_path: &mut Option<PathBuf>,
    error_lines: &mut Vec<String>,
) {
    let line = line.trim_matches(|c: char| c == '\r' || c == ' ');
    if let Some(progress) = parse_progress_line(line) {
        let _ = progress_tx.send(progress);
    } else if let Some(path) = line.strip_prefix(OUTPUT_MARKER) {
        *output_path = Some(PathBuf::from(path.trim()));
    } else if line.starts_with("ERROR:") {
        error_lines.push(line.to_string());
    } else if line.starts_with("WARNING:") {
        debug!("yt-dlp {}", line);
    }
}

/// 解析自定义进度模板或默认的 `[download]  42.0%` 行
pub fn parse_progress_line(line: &str) -> Option<ExtractProgress> {
    if line.contains(PROGRESS_MARKER) {
        let caps = PROGRESS_PATTERN.captures(line)?;
        let downloaded = caps[1].parse::<u64>().unwrap_or(0);
        let total = caps[2]
            .parse::<u64>()
            .ok()
            .or_else(|| caps[3].parse::<f64>().ok().map(|estimate| estimate as u64));
        return Some(ExtractProgress::Bytes { downloaded, total });
    }

    PERCENT_PATTERN
        .captures(line)
        .and_then(|caps| caps[1].parse::<f32>().ok())
        .map(ExtractProgress::Percent)
}

/// 根据 yt-dlp 的 ERROR 输出归类失败原因
pub fn classify_failure(error_lines: &[String]) -> DownloadError {
    let message = if error_lines.is_empty() {
        "yt-dlp 执行失败".to_string()
    } else {
        error_lines.join("\n")
    };
    let lower = message.to_lowercase();

    let has = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));

    if has(&["ffmpeg not found", "ffprobe not found", "ffprobe and ffmpeg not found"]) {
        DownloadError::ExternalToolMissing(message)
    } else if has(&[
        "permission denied",
        "read-only file system",
        "no space left",
        "unable to open for writing",
        "unable to create directory",
        "unable to rename file",
    ]) {
        DownloadError::FilesystemFailure(message)
    } else if has(&[
        "http error",
        "unable to download",
        "urlopen error",
        "timed out",
        "connection",
        "name resolution",
        "video unavailable",
        "private video",
        "sign in",
        "unable to extract",
        "unsupported url",
    ]) {
        DownloadError::NetworkFailure(message)
    } else {
        DownloadError::UnknownExternalError(message)
    }
}
