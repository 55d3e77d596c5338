use std::path::PathBuf;

use tracing::debug;

pub const YTDLP_ENV: &str = "YTDLP_PATH";
pub const FFMPEG_ENV: &str = "FFMPEG_PATH";

/// 显式传递的运行配置，不使用全局可变状态
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// yt-dlp 可执行文件
    pub ytdlp_path: String,
    /// 为 None 时使用 PATH 中的 ffmpeg
    pub ffmpeg_path: Option<String>,
    /// 追加给 yt-dlp 的额外参数
    pub extra_ytdlp_args: Vec<String>,
    pub activity_log: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_path: None,
            extra_ytdlp_args: Vec::new(),
            activity_log: None,
        }
    }
}

impl AppConfig {
    /// 读取环境变量 YTDLP_PATH / FFMPEG_PATH
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var(YTDLP_ENV) {
            if !path.trim().is_empty() {
                debug!("使用环境变量 {}: {}", YTDLP_ENV, path);
                config.ytdlp_path = path;
            }
        }
        if let Ok(path) = std::env::var(FFMPEG_ENV) {
            if !path.trim().is_empty() {
                debug!("使用环境变量 {}: {}", FFMPEG_ENV, path);
                config.ffmpeg_path = Some(path);
            }
        }
        config
    }

    pub fn ffmpeg_cmd(&self) -> &str {
        self.ffmpeg_path.as_deref().unwrap_or("ffmpeg")
    }
}

/// 默认保存目录：系统下载目录，找不到时退回 ./downloads
pub fn default_output_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("./downloads"))
}
