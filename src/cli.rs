use clap::Parser;
use std::io::Read;
use std::path::PathBuf;

use crate::config::{AppConfig, default_output_dir};
use crate::downloader::models::{AudioFormat, AudioQuality, BatchOptions};
use crate::parser::parse_url_list;

/// YouTube 音频批量下载器
#[derive(Parser, Debug)]
#[command(name = "ytadl")]
#[command(version = "1.0")]
#[command(author = "rpeng252@gmail.com")]
#[command(about = "一个简单的 YouTube 音频批量下载工具", long_about = None)]
pub struct Cli {
    /// 视频链接，可以有多个
    #[arg(value_name = "URL")]
    #[arg(value_hint = clap::ValueHint::Url)]
    pub urls: Vec<String>,

    /// 从文件读取链接，每行一个（"-" 表示标准输入）
    #[arg(short = 'i', long, value_name = "FILE")]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub input_file: Option<PathBuf>,

    /// 音频格式
    #[arg(short, long, value_name = "FORMAT", default_value = "mp3")]
    #[arg(help = "音频格式: mp3, wav, m4a, ogg")]
    pub format: AudioFormat,

    /// 音质
    #[arg(short, long, value_name = "QUALITY", default_value = "320")]
    #[arg(help = "音质: best 或码率 (如 128, 192, 320k)，wav 忽略此项")]
    pub quality: AudioQuality,

    /// 保存目录，默认系统下载目录
    #[arg(short, long, value_name = "DIR")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    #[arg(short = 'j', long, value_name = "并发数", default_value_t = 3)]
    pub concurrency: usize,

    /// yt-dlp 可执行文件路径 (也可用环境变量 YTDLP_PATH)
    #[arg(long, value_name = "PATH")]
    pub ytdlp_path: Option<String>,

    /// ffmpeg 可执行文件路径 (也可用环境变量 FFMPEG_PATH)
    #[arg(long, value_name = "PATH")]
    pub ffmpeg_path: Option<String>,

    /// 透传给 yt-dlp 的额外参数，可重复
    #[arg(long = "ytdlp-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub ytdlp_args: Vec<String>,

    /// 追加批次结果的纯文本日志
    #[arg(long, value_name = "FILE")]
    pub activity_log: Option<PathBuf>,

    /// 确认只下载有权使用的内容
    #[arg(long)]
    pub accept_legal: bool,

    /// 输出调试日志
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// 命令行参数优先于环境变量
    pub fn to_config(&self) -> AppConfig {
        let mut config = AppConfig::from_env();
        if let Some(path) = &self.ytdlp_path {
            config.ytdlp_path = path.clone();
        }
        if let Some(path) = &self.ffmpeg_path {
            config.ffmpeg_path = Some(path.clone());
        }
        config.extra_ytdlp_args = self.ytdlp_args.clone();
        config.activity_log = self.activity_log.clone();
        config
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            format: self.format,
            quality: self.quality,
            destination: self.output_dir.clone().unwrap_or_else(default_output_dir),
            max_parallel: self.concurrency,
        }
    }

    /// 合并命令行链接和输入文件中的链接
    pub fn collect_urls(&self) -> std::io::Result<Vec<String>> {
        let mut urls = self.urls.clone();
        if let Some(path) = &self.input_file {
            let text = if path.as_os_str() == "-" {
                let mut text = String::new();
                std::io::stdin().read_to_string(&mut text)?;
                text
            } else {
                std::fs::read_to_string(path)?
            };
            urls.extend(parse_url_list(&text));
        }
        Ok(urls)
    }
}
