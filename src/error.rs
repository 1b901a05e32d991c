use thiserror::Error;

use crate::{TrackId, persistence::RunResult};

/// Failures while reading frames from a recording or a worker thread
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read frame source: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON frame on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid MessagePack frame: {0}")]
    MsgPack(#[from] rmp_serde::decode::Error),

    #[error("frame producer thread stopped unexpectedly")]
    ProducerGone,
}

/// Why a single detection was rejected
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    #[error("missing track id")]
    MissingTrackId,

    #[error("track id is not a non-negative integer")]
    UnreadableTrackId,

    #[error("bounding box is not four numbers")]
    UnreadableBox,

    #[error("non-finite coordinates")]
    NonFiniteCoordinates,

    #[error("inverted bounding box")]
    InvertedBox,
}

#[derive(Debug, Error)]
pub enum CounterError {
    /// The input could not be opened, or produced no frames at all. Fatal to the run.
    #[error("source \"{name}\" unavailable: {reason}")]
    SourceUnavailable { name: String, reason: String },

    /// One detection had invalid geometry or identity; the caller drops it and carries on.
    #[error("malformed detection (track {track_id:?}) in frame {frame_index}: {reason}")]
    MalformedDetection {
        track_id: Option<TrackId>,
        frame_index: u64,
        reason: MalformedReason,
    },

    /// The store rejected the final result. The result travels with the
    /// error so the caller can retry the same write.
    #[error("failed to persist run {}: {source}", .result.run_id)]
    PersistenceFailure {
        result: Box<RunResult>,
        #[source]
        source: std::io::Error,
    },
}
