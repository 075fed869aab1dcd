use crate::session::SessionState;
use crate::source::ChannelId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("session is already running")]
    AlreadyRunning,

    #[error("session is not running (state: {0:?})")]
    NotRunning(SessionState),

    #[error("unknown channel: {0}")]
    UnknownChannel(ChannelId),

    #[error("channel {0} is configured more than once")]
    DuplicateChannel(ChannelId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("file sink is not open for this session")]
    SinkNotOpen,

    #[error("file sink for channel {0} failed earlier; persistence is disabled")]
    SinkFailed(ChannelId),

    #[error("failed to persist {elements} elements for channel {channel}: {source}")]
    SinkWrite {
        channel: ChannelId,
        elements: usize,
        source: std::io::Error,
    },

    #[error("failed to spawn streaming worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("streaming worker panicked")]
    WorkerPanicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
