use colored::*;

use crate::downloader::models::{BatchReport, JobState};

/// 漂亮的终端输出工具
pub struct PrettyLogger;

impl PrettyLogger {
    /// 显示成功消息
    pub fn success(message: impl AsRef<str>) {
        println!("{} {}", "✓".green().bold(), message.as_ref());
    }

    /// 显示信息消息
    pub fn info(message: impl AsRef<str>) {
        println!("{} {}", "ℹ".blue().bold(), message.as_ref());
    }

    /// 显示警告消息
    pub fn warning(message: impl AsRef<str>) {
        println!("{} {}", "⚠".yellow().bold(), message.as_ref());
    }

    /// 显示错误消息
    pub fn error(message: impl AsRef<str>) {
        println!("{} {}", "✗".red().bold(), message.as_ref());
    }

    /// 显示步骤开始
    pub fn step_start(step: impl AsRef<str>) {
        println!("\n{} {}", "▶".cyan().bold(), step.as_ref().bold());
    }

    /// 显示文件信息
    pub fn file_info(label: impl AsRef<str>, path: impl AsRef<str>) {
        println!("{} {}: {}", "📁".blue().bold(), label.as_ref().bold(), path.as_ref());
    }

    /// 显示分割线
    pub fn separator() {
        println!("{}", "─".repeat(50).bright_black());
    }

    /// 显示批次总结
    pub fn batch_summary(report: &BatchReport) {
        let status = &report.status;
        Self::separator();
        if status.failed == 0 {
            println!("\n{}", "🎉 下载完成！".green().bold());
        } else {
            println!("\n{}", "⚠ 下载结束，部分任务失败".yellow().bold());
        }
        println!(
            "  共 {} 个，成功 {}，失败 {}",
            status.total,
            status.succeeded.to_string().green(),
            status.failed.to_string().red()
        );
        for job in &report.jobs {
            match job.state {
                JobState::Succeeded => {
                    let output = job
                        .output
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    println!("  {} {}", "✓".green(), output);
                }
                JobState::Failed => {
                    let reason = job.error.as_ref().map(|e| e.to_string()).unwrap_or_default();
                    let url = if job.job.url.is_empty() {
                        "<空链接>"
                    } else {
                        job.job.url.as_str()
                    };
                    println!("  {} {} {}", "✗".red(), url, reason.bright_black());
                }
                _ => {}
            }
        }
    }
}
