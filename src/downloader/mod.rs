pub mod coordinator;
pub mod error;
pub mod extractor;
pub mod models;
pub mod progress;
pub mod worker;
pub mod ytdlp;

pub use coordinator::{BatchCoordinator, BatchHandle};
pub use error::{DownloadError, FailureKind, JobFailure};
pub use extractor::{ExtractProgress, ExtractRequest, Extractor};
pub use models::{
    AudioFormat, AudioQuality, BatchId, BatchOptions, BatchReport, BatchStatus, JobDescriptor,
    JobEvent, JobId, JobState, JobStatus,
};
pub use progress::{ChannelSink, ConsoleSink, NoopSink, ProgressSink, SinkEvent};
pub use ytdlp::YtDlpExtractor;
