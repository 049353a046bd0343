//! 分割与合并
//!
//! Split keeps the union of the two halves exactly equal to the original span;
//! merge only joins two touching segments of one track. Both refuse to run on
//! a segment whose playback rate was overridden, and both leave the resulting
//! audio unresolved: the dubbed audio cannot be re-sliced or concatenated
//! here, the host regenerates it.

use crate::error::Rejection;
use crate::model::SegmentModel;
use crate::structure::{Segment, SegmentId, TrackId};

/// Largest gap still treated as "touching".
const TOUCH_TOLERANCE: f64 = 1e-6;

/// Splits `id` at `at`. The left half keeps the id and the text, the right
/// half gets a fresh id.
pub fn split(
    model: &mut SegmentModel,
    id: &SegmentId,
    at: f64,
) -> Result<(SegmentId, SegmentId), Rejection> {
    let seg = model
        .segment(id)
        .ok_or_else(|| Rejection::UnknownSegment(id.clone()))?;
    if seg.is_rate_locked() {
        return Err(Rejection::RateLocked(id.clone()));
    }
    let epsilon = model.min_duration();
    if !(at - seg.start >= epsilon && seg.end - at >= epsilon) {
        return Err(Rejection::SplitOutOfRange { id: id.clone(), at });
    }

    let mut left = seg.clone();
    left.end = at;
    left.audio_ref = None;
    left.playback_rate = 1.0;

    let mut right_id = SegmentId::next();
    while model.segment(&right_id).is_some() {
        right_id = SegmentId::next();
    }
    let right = Segment {
        id: right_id,
        track_id: seg.track_id,
        start: at,
        end: seg.end,
        source_text: String::new(),
        target_text: String::new(),
        audio_ref: None,
        playback_rate: 1.0,
    };
    let track_id = seg.track_id;
    let right_id = right.id.clone();
    log::debug!("Split {} at {:.3}s -> {}", id, at, right_id);
    model.replace_segments(track_id, std::slice::from_ref(id), vec![left, right]);
    Ok((id.clone(), right_id))
}

/// Joins exactly two touching segments of `track_id`. The earlier segment's
/// id survives; texts are concatenated.
pub fn merge(
    model: &mut SegmentModel,
    ids: &[SegmentId],
    track_id: TrackId,
) -> Result<SegmentId, Rejection> {
    let [first, second] = ids else {
        return Err(Rejection::MergeArity(ids.len()));
    };
    if first == second {
        return Err(Rejection::MergeArity(1));
    }
    if model.track(track_id).is_none() {
        return Err(Rejection::UnknownTrack(track_id));
    }
    let a = model
        .segment(first)
        .ok_or_else(|| Rejection::UnknownSegment(first.clone()))?;
    let b = model
        .segment(second)
        .ok_or_else(|| Rejection::UnknownSegment(second.clone()))?;
    if a.track_id != track_id || b.track_id != track_id {
        return Err(Rejection::DifferentTracks(first.clone(), second.clone()));
    }
    for seg in [a, b] {
        if seg.is_rate_locked() {
            return Err(Rejection::RateLocked(seg.id.clone()));
        }
    }
    let (early, late) = if a.start <= b.start { (a, b) } else { (b, a) };
    if (late.start - early.end).abs() > TOUCH_TOLERANCE {
        return Err(Rejection::NotTouching(early.id.clone(), late.id.clone()));
    }

    let merged = Segment {
        id: early.id.clone(),
        track_id,
        start: early.start.min(late.start),
        end: early.end.max(late.end),
        source_text: join_text(&early.source_text, &late.source_text),
        target_text: join_text(&early.target_text, &late.target_text),
        audio_ref: None,
        playback_rate: 1.0,
    };
    let merged_id = merged.id.clone();
    let removed = [early.id.clone(), late.id.clone()];
    log::debug!("Merged {} + {} -> [{:.3}, {:.3})", removed[0], removed[1], merged.start, merged.end);
    model.replace_segments(track_id, &removed, vec![merged]);
    Ok(merged_id)
}

fn join_text(left: &str, right: &str) -> String {
    match (left.trim().is_empty(), right.trim().is_empty()) {
        (true, _) => right.to_string(),
        (_, true) => left.to_string(),
        _ => format!("{} {}", left.trim_end(), right.trim_start()),
    }
}
