#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use yt_audio_downloader::config::AppConfig;
use yt_audio_downloader::downloader::{
    AudioFormat, AudioQuality, BatchCoordinator, BatchOptions, DownloadError, ExtractProgress,
    ExtractRequest, Extractor, FailureKind, JobDescriptor, JobState, NoopSink, YtDlpExtractor,
};

// 写脚本与 fork 并发时可能触发 ETXTBSY，串行执行
static SPAWN_LOCK: Mutex<()> = Mutex::const_new(());

/// 写入一个可执行的假 yt-dlp 脚本
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn extractor(ytdlp: &Path) -> YtDlpExtractor {
    YtDlpExtractor::new(Arc::new(AppConfig {
        ytdlp_path: ytdlp.display().to_string(),
        ..AppConfig::default()
    }))
}

fn request(destination: &Path) -> ExtractRequest {
    ExtractRequest {
        job: Arc::new(JobDescriptor {
            id: 0,
            url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            format: AudioFormat::Mp3,
            quality: AudioQuality::default(),
            destination: destination.to_path_buf(),
        }),
        temp_dir: destination.join(".ytadl-test-0"),
    }
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_output_marker_becomes_result_path() {
    let _guard = SPAWN_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("Song_[dQw4w9WgXcQ].mp3");
    let script = write_script(
        dir.path(),
        "yt-dlp",
        &format!(
            "echo 'ytadl-progress 512 1024 NA'\n\
             printf 'audio' > '{out}'\n\
             echo 'ytadl-output {out}'\n\
             printf 'WARNING: title Caf\\351\\n' >&2\n\
             exit 0",
            out = output.display()
        ),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = extractor(&script)
        .extract(&request(dir.path()), tx, CancellationToken::new())
        .await;

    assert_eq!(result.unwrap(), output);
    assert_eq!(
        rx.recv().await,
        Some(ExtractProgress::Bytes {
            downloaded: 512,
            total: Some(1024)
        })
    );
}

#[tokio::test]
async fn test_http_error_exit_is_network_failure() {
    let _guard = SPAWN_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "yt-dlp",
        "echo 'ERROR: [youtube] dQw4w9WgXcQ: Unable to download webpage: HTTP Error 403: Forbidden' >&2\n\
         exit 1",
    );

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = extractor(&script)
        .extract(&request(dir.path()), tx, CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::NetworkFailure);
    assert!(err.to_string().contains("HTTP Error 403"), "{err}");
}

#[tokio::test]
async fn test_success_without_output_marker_is_unknown_error() {
    let _guard = SPAWN_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "yt-dlp", "exit 0");

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = extractor(&script)
        .extract(&request(dir.path()), tx, CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::UnknownExternalError);
}

#[tokio::test]
async fn test_missing_binary_is_tool_missing() {
    let _guard = SPAWN_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("no-such-yt-dlp");

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = extractor(&missing)
        .extract(&request(dir.path()), tx, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::ExternalToolMissing(_)), "{err:?}");
}

#[tokio::test]
async fn test_cancel_kills_running_process() {
    let _guard = SPAWN_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "yt-dlp",
        "echo 'ytadl-progress 1 10 NA'\nexec sleep 30",
    );
    let extractor = extractor(&script);
    let request = request(dir.path());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let cancel_after_progress = async move {
        rx.recv().await;
        trigger.cancel();
    };

    let (result, ()) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(extractor.extract(&request, tx, cancel), cancel_after_progress)
    })
    .await
    .expect("取消后 yt-dlp 应立即结束");

    assert!(matches!(result, Err(DownloadError::Cancelled)), "{result:?}");
}

#[tokio::test]
async fn test_batch_succeeds_despite_non_utf8_output() {
    let _guard = SPAWN_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let tools = tempfile::tempdir().unwrap();
    let music = dir.path().join("music");
    let output = music.join("Caf_[dQw4w9WgXcQ].mp3");

    let ytdlp = write_script(
        tools.path(),
        "yt-dlp",
        &format!(
            "case \"$1\" in --version) echo 2025.01.01; exit 0;; esac\n\
             echo 'ytadl-progress 50 100 NA'\n\
             printf 'audio' > '{out}'\n\
             echo 'ytadl-output {out}'\n\
             printf 'WARNING: title Caf\\351 \\226 live\\n' >&2\n\
             exit 0",
            out = output.display()
        ),
    );
    let ffmpeg = write_script(tools.path(), "ffmpeg", "exit 0");
    let config = Arc::new(AppConfig {
        ytdlp_path: ytdlp.display().to_string(),
        ffmpeg_path: Some(ffmpeg.display().to_string()),
        ..AppConfig::default()
    });

    let coordinator = BatchCoordinator::new(
        Arc::clone(&config),
        Arc::new(YtDlpExtractor::new(config)),
        Arc::new(NoopSink),
    );
    let handle = coordinator
        .start_batch(
            ["https://www.youtube.com/watch?v=dQw4w9WgXcQ"],
            BatchOptions::new(&music),
        )
        .await
        .unwrap();
    let report = handle.wait().await.unwrap();

    let job = &report.jobs[0];
    assert_eq!(job.state, JobState::Succeeded, "{:?}", job.error);
    assert_eq!(job.output.as_deref(), Some(output.as_path()));
    assert_eq!(job.percent, 100.0);
    assert_eq!(entries(&music), vec!["Caf_[dQw4w9WgXcQ].mp3"]);
}
