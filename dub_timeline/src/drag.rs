//! 拖拽引擎
//!
//! Moves a segment in time and across speaker tracks. While the pointer is
//! down only a preview is produced; the model is touched once, on release,
//! after the candidate has been snapped to a free gap of the destination track.

use crate::error::Rejection;
use crate::mapper::TimeMapper;
use crate::model::{SegmentModel, TIME_EPSILON};
use crate::structure::{Segment, SegmentId, TrackId};
use egui::Pos2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitRegion {
    Body,
    StartEdge,
    EndEdge,
}

/// Edge zones are exclusive and win over the body. On a segment narrower than
/// two handles the nearer edge wins.
pub fn hit_test(left_px: f32, right_px: f32, pointer_x: f32, edge_px: f32) -> Option<HitRegion> {
    if pointer_x < left_px || pointer_x > right_px {
        return None;
    }
    let from_left = pointer_x - left_px;
    let from_right = right_px - pointer_x;
    if from_left < edge_px || from_right < edge_px {
        if from_left <= from_right {
            Some(HitRegion::StartEdge)
        } else {
            Some(HitRegion::EndEdge)
        }
    } else {
        Some(HitRegion::Body)
    }
}

/// Vertical extent of one lane in screen space, computed once per frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackLayout {
    pub track_id: TrackId,
    pub top: f32,
    pub bottom: f32,
    pub is_speaker: bool,
}

/// Speaker track under `y`, if any.
pub fn track_at(layouts: &[TrackLayout], y: f32) -> Option<TrackId> {
    layouts
        .iter()
        .find(|l| l.is_speaker && y >= l.top && y < l.bottom)
        .map(|l| l.track_id)
}

/// Closest start to `candidate` at which a segment of `length` fits between
/// `others` and inside `[0, duration]`. `None` when no gap is long enough.
pub fn resolve_placement(
    others: &[&Segment],
    candidate: f64,
    length: f64,
    duration: f64,
) -> Option<f64> {
    if length > duration + TIME_EPSILON {
        return None;
    }
    let candidate = candidate.clamp(0.0, (duration - length).max(0.0));
    let mut sorted: Vec<(f64, f64)> = others.iter().map(|s| (s.start, s.end)).collect();
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    sorted.push((duration, duration));

    let mut best: Option<f64> = None;
    let mut cursor = 0.0_f64;
    for (start, end) in sorted {
        let gap_start = cursor;
        let gap_end = start.min(duration);
        if gap_end - gap_start >= length - TIME_EPSILON {
            let pos = candidate.clamp(gap_start, (gap_end - length).max(gap_start));
            let closer = best.map_or(true, |b| (pos - candidate).abs() < (b - candidate).abs());
            if closer {
                best = Some(pos);
            }
        }
        cursor = cursor.max(end);
    }
    best
}

/// What the view renders while a drag is in flight.
#[derive(Clone, Debug, PartialEq)]
pub struct DragPreview {
    pub segment_id: SegmentId,
    pub track_id: TrackId,
    pub start: f64,
    pub end: f64,
    /// Horizontal pointer offset, for drawing the segment with a transform.
    pub offset_px: f32,
}

#[derive(Clone, Debug)]
struct DragSession {
    segment_id: SegmentId,
    origin_start: f64,
    origin_end: f64,
    origin_track: TrackId,
    pointer_origin: Pos2,
    preview: DragPreview,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DragOutcome {
    Committed {
        segment_id: SegmentId,
        from_track: TrackId,
        to_track: TrackId,
        start: f64,
        end: f64,
        /// The candidate overlapped a neighbour and was moved to its edge.
        snapped: bool,
    },
    Cancelled,
}

#[derive(Debug, Default)]
pub struct DragEngine {
    session: Option<DragSession>,
}

impl DragEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.session.is_some()
    }

    pub fn preview(&self) -> Option<&DragPreview> {
        self.session.as_ref().map(|s| &s.preview)
    }

    pub fn dragged_segment(&self) -> Option<&SegmentId> {
        self.session.as_ref().map(|s| &s.segment_id)
    }

    /// Pointer-down on a segment body.
    pub fn begin(
        &mut self,
        model: &SegmentModel,
        segment_id: &SegmentId,
        pointer: Pos2,
    ) -> Result<(), Rejection> {
        if self.session.is_some() {
            return Err(Rejection::Busy);
        }
        let seg = model
            .segment(segment_id)
            .ok_or_else(|| Rejection::UnknownSegment(segment_id.clone()))?;
        log::debug!("Drag start {} at {:.3}s", seg.id, seg.start);
        self.session = Some(DragSession {
            segment_id: seg.id.clone(),
            origin_start: seg.start,
            origin_end: seg.end,
            origin_track: seg.track_id,
            pointer_origin: pointer,
            preview: DragPreview {
                segment_id: seg.id.clone(),
                track_id: seg.track_id,
                start: seg.start,
                end: seg.end,
                offset_px: 0.0,
            },
        });
        Ok(())
    }

    /// Pointer-move: recomputes the preview only.
    pub fn update(
        &mut self,
        pointer: Pos2,
        mapper: &TimeMapper,
        layouts: &[TrackLayout],
    ) -> Option<&DragPreview> {
        let session = self.session.as_mut()?;
        let (start, track_id) = candidate(session, pointer, mapper, layouts);
        let length = session.origin_end - session.origin_start;
        session.preview = DragPreview {
            segment_id: session.segment_id.clone(),
            track_id,
            start,
            end: start + length,
            offset_px: pointer.x - session.pointer_origin.x,
        };
        Some(&session.preview)
    }

    /// Pointer-up. Released outside the timeline (`inside == false`) the drag
    /// is cancelled. Otherwise the candidate is snapped into the nearest free
    /// gap of the destination track and committed; if the track has no gap
    /// long enough the segment stays where it was.
    pub fn finish(
        &mut self,
        model: &mut SegmentModel,
        pointer: Pos2,
        inside: bool,
        mapper: &TimeMapper,
        layouts: &[TrackLayout],
    ) -> Result<DragOutcome, Rejection> {
        let session = self.session.take().ok_or(Rejection::NotDragging)?;
        if !inside {
            log::debug!("Drag of {} released outside timeline", session.segment_id);
            return Ok(DragOutcome::Cancelled);
        }
        if model.segment(&session.segment_id).is_none() {
            return Err(Rejection::UnknownSegment(session.segment_id));
        }

        let (candidate_start, mut track_id) = candidate(&session, pointer, mapper, layouts);
        if !model.track(track_id).map_or(false, |t| t.is_speaker()) {
            track_id = session.origin_track;
        }
        let length = session.origin_end - session.origin_start;
        let Some(track) = model.track(track_id) else {
            return Err(Rejection::UnknownTrack(track_id));
        };
        let others: Vec<&Segment> = track
            .segments
            .iter()
            .filter(|s| s.id != session.segment_id)
            .collect();
        let Some(start) = resolve_placement(&others, candidate_start, length, model.duration())
        else {
            log::warn!(
                "No room for {} in track {:?}, reverting drag",
                session.segment_id,
                track_id
            );
            return Err(Rejection::NoRoom(session.segment_id, track_id));
        };

        let snapped = (start - candidate_start).abs() > TIME_EPSILON;
        model.move_segment(&session.segment_id, track_id, start);
        log::debug!(
            "Drag commit {} -> track {:?} at {:.3}s{}",
            session.segment_id,
            track_id,
            start,
            if snapped { " (snapped)" } else { "" }
        );
        Ok(DragOutcome::Committed {
            segment_id: session.segment_id,
            from_track: session.origin_track,
            to_track: track_id,
            start,
            end: start + length,
            snapped,
        })
    }

    /// Focus loss or an explicit abort.
    pub fn cancel(&mut self) -> bool {
        if let Some(session) = self.session.take() {
            log::debug!("Drag of {} cancelled", session.segment_id);
            true
        } else {
            false
        }
    }
}

fn candidate(
    session: &DragSession,
    pointer: Pos2,
    mapper: &TimeMapper,
    layouts: &[TrackLayout],
) -> (f64, TrackId) {
    let dx = (pointer.x - session.pointer_origin.x) as f64;
    let length = session.origin_end - session.origin_start;
    let start = (session.origin_start + mapper.delta_to_time(dx))
        .clamp(0.0, (mapper.duration - length).max(0.0));
    let track_id = track_at(layouts, pointer.y).unwrap_or(session.origin_track);
    (start, track_id)
}
