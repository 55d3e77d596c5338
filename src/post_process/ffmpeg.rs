use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error};

use crate::downloader::error::DownloadError;

/// 检查 ffmpeg 是否可用（yt-dlp 的音频提取依赖它）
pub async fn check_ffmpeg(ffmpeg_cmd: &str) -> Result<(), DownloadError> {
    debug!("检查系统中是否安装了 ffmpeg: {}", ffmpeg_cmd);
    if probe(ffmpeg_cmd, "-version").await {
        return Ok(());
    }
    error!("❌ 未检测到 ffmpeg，请确保系统中已安装并配置了 ffmpeg 可执行路径。");
    error!("安装方法参考：https://ffmpeg.org/download.html");
    error!("或者设置环境变量 FFMPEG_PATH 指向 ffmpeg 可执行文件路径");
    Err(DownloadError::ExternalToolMissing(format!(
        "未找到 ffmpeg ({})",
        ffmpeg_cmd
    )))
}

/// 检查 yt-dlp 是否可用
pub async fn check_ytdlp(ytdlp_cmd: &str) -> Result<(), DownloadError> {
    debug!("检查系统中是否安装了 yt-dlp: {}", ytdlp_cmd);
    if probe(ytdlp_cmd, "--version").await {
        return Ok(());
    }
    error!("❌ 未检测到 yt-dlp，安装方法参考：https://github.com/yt-dlp/yt-dlp#installation");
    error!("或者设置环境变量 YTDLP_PATH 指向 yt-dlp 可执行文件路径");
    Err(DownloadError::ExternalToolMissing(format!(
        "未找到 yt-dlp ({})",
        ytdlp_cmd
    )))
}

async fn probe(cmd: &str, version_flag: &str) -> bool {
    let status = Command::new(cmd)
        .arg(version_flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) => status.success(),
        Err(e) => {
            debug!("无法启动 {}: {}", cmd, e);
            false
        }
    }
}
