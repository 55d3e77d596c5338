pub mod ffmpeg;

pub use ffmpeg::{check_ffmpeg, check_ytdlp};
