//! Error types
//!
//! `Rejection` is the discoverable outcome of an invalid edit; the model is
//! untouched whenever one is returned. `LoadError` is reserved for corrupted
//! input at load time.

use crate::structure::{SegmentId, TrackId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("Unknown segment: {0}")]
    UnknownSegment(SegmentId),

    #[error("Unknown track: {0:?}")]
    UnknownTrack(TrackId),

    /// Waveform and muted lanes never hold segments
    #[error("Track {0:?} is not a speaker track")]
    NotSpeakerTrack(TrackId),

    /// Bounds are frozen once the playback rate is overridden
    #[error("Segment {0} has a modified playback rate")]
    RateLocked(SegmentId),

    #[error("Split point {at} lies outside segment {id}")]
    SplitOutOfRange { id: SegmentId, at: f64 },

    #[error("Merge needs exactly two segments, got {0}")]
    MergeArity(usize),

    #[error("Segments {0} and {1} are not touching")]
    NotTouching(SegmentId, SegmentId),

    #[error("Segments {0} and {1} belong to different tracks")]
    DifferentTracks(SegmentId, SegmentId),

    /// Destination track has no free gap long enough for the segment
    #[error("No room for segment {0} in track {1:?}")]
    NoRoom(SegmentId, TrackId),

    #[error("Timing fields must be changed through drag, resize, split or merge")]
    GeometricPatch,

    #[error("Another gesture is already in progress")]
    Busy,

    #[error("No gesture in progress")]
    NotDragging,
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Segment {id} has invalid bounds [{start}, {end})")]
    InvalidBounds { id: String, start: f64, end: f64 },

    #[error("Segment {id} lies outside [0, {duration}]")]
    OutOfRange { id: String, duration: f64 },

    #[error("Duplicate segment id: {0}")]
    DuplicateId(String),

    #[error("Segments {0} and {1} overlap")]
    Overlap(String, String),

    #[error("Invalid session duration: {0}")]
    InvalidDuration(f64),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
