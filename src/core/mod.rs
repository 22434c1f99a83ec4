pub mod artwork;
pub mod audio_reader;
pub mod backup;
pub mod clients;
pub mod fingerprint;
pub mod loudness;
pub mod matcher;
pub mod orchestrator;
pub mod queue;
pub mod scanner;
pub mod tag_codec;
pub mod watcher;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt or unreadable file: {0}")]
    CorruptFile(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
