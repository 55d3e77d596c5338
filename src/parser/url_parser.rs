use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use crate::downloader::error::DownloadError;

lazy_static! {
    static ref VIDEO_ID_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap();
}

/// 无协议头时也接受的 YouTube 域名
const SCHEMELESS_HOSTS: &[&str] = &[
    "youtube.com/",
    "www.youtube.com/",
    "m.youtube.com/",
    "music.youtube.com/",
    "youtu.be/",
];

/// 校验并标准化一条用户输入的链接
pub fn validate_url(input: &str) -> Result<String, DownloadError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DownloadError::InvalidInput("链接为空".to_string()));
    }

    // 裸视频ID
    if VIDEO_ID_PATTERN.is_match(input) {
        return Ok(format!("https://www.youtube.com/watch?v={}", input));
    }

    let candidate = if SCHEMELESS_HOSTS
        .iter()
        .any(|host| input.to_ascii_lowercase().starts_with(host))
    {
        format!("https://{}", input)
    } else {
        input.to_string()
    };

    let url = Url::parse(&candidate)
        .map_err(|e| DownloadError::InvalidInput(format!("无法解析链接 {}: {}", input, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(DownloadError::InvalidInput(format!(
            "不支持的协议 {}: {}",
            url.scheme(),
            input
        )));
    }

    match url.host_str() {
        Some(host) if host.contains('.') && !host.starts_with('.') && !host.ends_with('.') => {
            Ok(url.into())
        }
        _ => Err(DownloadError::InvalidInput(format!("链接缺少有效主机名: {}", input))),
    }
}

/// 按行拆分输入框内容，去掉空行
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
