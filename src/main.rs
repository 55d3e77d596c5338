use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};

use yt_audio_downloader::cli::Cli;
use yt_audio_downloader::common::logger::PrettyLogger;
use yt_audio_downloader::downloader::{BatchCoordinator, ConsoleSink, YtDlpExtractor};

const LEGAL_DISCLAIMER: &str = "Software for legal use only. Download authorized content only.";

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // 解析命令行参数
    let args = Cli::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    if !args.accept_legal {
        PrettyLogger::warning(LEGAL_DISCLAIMER);
        PrettyLogger::info("请确认后加上 --accept-legal 重新运行");
        return Ok(ExitCode::from(2));
    }

    let urls = args.collect_urls().context("读取链接列表失败")?;
    if urls.is_empty() {
        PrettyLogger::error("没有提供链接，请至少输入一个 YouTube 链接");
        return Ok(ExitCode::from(2));
    }

    let config = Arc::new(args.to_config());
    let options = args.batch_options();
    debug!("运行配置: {:?}", config);

    PrettyLogger::step_start(format!("准备下载 {} 个链接", urls.len()));
    PrettyLogger::file_info("保存目录", options.destination.display().to_string());
    info!("格式: {}, 音质: {}", options.format, options.quality);

    let extractor = Arc::new(YtDlpExtractor::new(Arc::clone(&config)));
    let coordinator = Arc::new(BatchCoordinator::new(
        Arc::clone(&config),
        extractor,
        Arc::new(ConsoleSink::new()),
    ));

    let handle = match coordinator.start_batch(&urls, options).await {
        Ok(handle) => handle,
        Err(e) => {
            PrettyLogger::error(e.to_string());
            return Ok(ExitCode::FAILURE);
        }
    };

    // Ctrl-C 时协作式取消
    let signal_coordinator = Arc::clone(&coordinator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，正在取消未完成的任务...");
            signal_coordinator.cancel_all();
        }
    });

    let report = handle.wait().await?;
    PrettyLogger::batch_summary(&report);
    if let Some(path) = &config.activity_log {
        PrettyLogger::file_info("活动日志", path.display().to_string());
    }

    if report.status.failed == 0 {
        PrettyLogger::success("全部任务完成");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
