//! 边缘调整引擎
//!
//! Trims a segment's start or end. Unlike a drag, every pointer move is
//! committed straight to the model: the clamps keep the edge between the
//! neighbours, so an intermediate state can never violate an invariant.

use crate::error::Rejection;
use crate::model::SegmentModel;
use crate::structure::SegmentId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeEdge {
    Start,
    End,
}

/// Gesture lifecycle, so expensive dependants (waveform sampling) can wait
/// for the gesture to end.
#[derive(Clone, Debug, PartialEq)]
pub enum ResizeEvent {
    Started {
        segment_id: SegmentId,
        edge: ResizeEdge,
    },
    Ended {
        segment_id: SegmentId,
        start: f64,
        end: f64,
    },
}

/// Allowed range for the moving edge of `id`.
fn edge_limits(model: &SegmentModel, id: &SegmentId, edge: ResizeEdge) -> Result<(f64, f64), Rejection> {
    let seg = model
        .segment(id)
        .ok_or_else(|| Rejection::UnknownSegment(id.clone()))?;
    if seg.is_rate_locked() {
        return Err(Rejection::RateLocked(id.clone()));
    }
    let adjacent = model.adjacent(id).unwrap_or_default();
    let epsilon = model.min_duration();
    Ok(match edge {
        ResizeEdge::Start => {
            let lower = adjacent.previous.map_or(0.0, |p| p.end);
            (lower, seg.end - epsilon)
        }
        ResizeEdge::End => {
            let upper = adjacent.next.map_or(model.duration(), |n| n.start);
            (seg.start + epsilon, upper.min(model.duration()))
        }
    })
}

/// Moves `edge` of `id` to `target`, clamped. Returns the committed bounds.
fn apply_edge(
    model: &mut SegmentModel,
    id: &SegmentId,
    edge: ResizeEdge,
    target: f64,
) -> Result<(f64, f64), Rejection> {
    let (lower, upper) = edge_limits(model, id, edge)?;
    let Some(seg) = model.segment(id) else {
        return Err(Rejection::UnknownSegment(id.clone()));
    };
    // A NaN target leaves the edge where it is.
    let clamp = |current: f64| {
        if target.is_nan() {
            current
        } else {
            target.max(lower).min(upper)
        }
    };
    let (start, end) = match edge {
        ResizeEdge::Start => (clamp(seg.start), seg.end),
        ResizeEdge::End => (seg.start, clamp(seg.end)),
    };
    model.set_bounds(id, start, end);
    Ok((start, end))
}

/// One-shot trim of `edge` by `delta_time` seconds relative to its current
/// position.
pub fn resize(
    model: &mut SegmentModel,
    id: &SegmentId,
    edge: ResizeEdge,
    delta_time: f64,
) -> Result<(f64, f64), Rejection> {
    let seg = model
        .segment(id)
        .ok_or_else(|| Rejection::UnknownSegment(id.clone()))?;
    let current = match edge {
        ResizeEdge::Start => seg.start,
        ResizeEdge::End => seg.end,
    };
    apply_edge(model, id, edge, current + delta_time)
}

#[derive(Clone, Debug)]
struct ResizeSession {
    segment_id: SegmentId,
    edge: ResizeEdge,
    origin: f64,
}

#[derive(Debug, Default)]
pub struct ResizeEngine {
    session: Option<ResizeSession>,
}

impl ResizeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_resizing(&self) -> bool {
        self.session.is_some()
    }

    pub fn active_segment(&self) -> Option<&SegmentId> {
        self.session.as_ref().map(|s| &s.segment_id)
    }

    pub fn begin(
        &mut self,
        model: &SegmentModel,
        id: &SegmentId,
        edge: ResizeEdge,
    ) -> Result<ResizeEvent, Rejection> {
        if self.session.is_some() {
            return Err(Rejection::Busy);
        }
        // Validates existence and the rate lock.
        edge_limits(model, id, edge)?;
        let Some(seg) = model.segment(id) else {
            return Err(Rejection::UnknownSegment(id.clone()));
        };
        let origin = match edge {
            ResizeEdge::Start => seg.start,
            ResizeEdge::End => seg.end,
        };
        log::debug!("Resize start {} {:?} at {:.3}s", id, edge, origin);
        self.session = Some(ResizeSession {
            segment_id: id.clone(),
            edge,
            origin,
        });
        Ok(ResizeEvent::Started {
            segment_id: id.clone(),
            edge,
        })
    }

    /// `delta_time` is measured from the pointer-down position.
    pub fn update(&mut self, model: &mut SegmentModel, delta_time: f64) -> Result<(f64, f64), Rejection> {
        let session = self.session.as_ref().ok_or(Rejection::NotDragging)?;
        apply_edge(model, &session.segment_id, session.edge, session.origin + delta_time)
    }

    pub fn end(&mut self, model: &SegmentModel) -> Option<ResizeEvent> {
        let session = self.session.take()?;
        let (start, end) = model
            .segment(&session.segment_id)
            .map(|s| (s.start, s.end))
            .unwrap_or((0.0, 0.0));
        log::debug!("Resize end {} [{:.3}, {:.3})", session.segment_id, start, end);
        Some(ResizeEvent::Ended {
            segment_id: session.segment_id,
            start,
            end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SegmentPatch;
    use crate::structure::SeedSegment;

    fn seed(id: &str, start: f64, end: f64) -> SeedSegment {
        SeedSegment {
            id: id.into(),
            speaker: "A".into(),
            start,
            end,
            source_text: String::new(),
            target_text: String::new(),
            audio_ref: None,
            playback_rate: None,
        }
    }

    fn model() -> SegmentModel {
        SegmentModel::from_seed(
            vec![seed("a", 1.0, 3.0), seed("b", 4.0, 6.0), seed("c", 6.0, 9.0)],
            10.0,
            0.05,
        )
        .unwrap()
    }

    #[test]
    fn end_edge_stops_at_next_start() {
        let mut model = model();
        let (_, end) = resize(&mut model, &"b".into(), ResizeEdge::End, 5.0).unwrap();
        assert_eq!(end, 6.0);
        let b = model.segment(&"b".into()).unwrap();
        let c = model.segment(&"c".into()).unwrap();
        assert!(b.end <= c.start);
    }

    #[test]
    fn start_edge_stops_at_previous_end_and_zero() {
        let mut model = model();
        let (start, _) = resize(&mut model, &"b".into(), ResizeEdge::Start, -10.0).unwrap();
        assert_eq!(start, 3.0);
        let (start, _) = resize(&mut model, &"a".into(), ResizeEdge::Start, -10.0).unwrap();
        assert_eq!(start, 0.0);
    }

    #[test]
    fn edges_keep_minimum_duration() {
        let mut model = model();
        let (start, end) = resize(&mut model, &"a".into(), ResizeEdge::Start, 10.0).unwrap();
        assert!((end - start - 0.05).abs() < 1e-9);
        let (start, end) = resize(&mut model, &"c".into(), ResizeEdge::End, -10.0).unwrap();
        assert!((end - start - 0.05).abs() < 1e-9);
        let (_, end) = resize(&mut model, &"c".into(), ResizeEdge::End, 100.0).unwrap();
        assert_eq!(end, 10.0);
        assert!(model.check_invariants().is_ok());
    }

    #[test]
    fn modified_rate_disables_resize() {
        let mut model = model();
        let patch = SegmentPatch {
            playback_rate: Some(1.2),
            ..Default::default()
        };
        model.update_segment(&"a".into(), patch).unwrap();
        assert_eq!(
            resize(&mut model, &"a".into(), ResizeEdge::End, 0.5),
            Err(Rejection::RateLocked("a".into()))
        );
        let mut engine = ResizeEngine::new();
        assert!(engine.begin(&model, &"a".into(), ResizeEdge::End).is_err());
        assert!(!engine.is_resizing());
        assert_eq!(model.segment(&"a".into()).unwrap().end, 3.0);
    }

    #[test]
    fn gesture_commits_continuously_from_origin() {
        let mut model = model();
        let mut engine = ResizeEngine::new();
        let started = engine.begin(&model, &"a".into(), ResizeEdge::End).unwrap();
        assert!(matches!(started, ResizeEvent::Started { edge: ResizeEdge::End, .. }));

        engine.update(&mut model, 0.5).unwrap();
        assert_eq!(model.segment(&"a".into()).unwrap().end, 3.5);
        engine.update(&mut model, 0.25).unwrap();
        assert_eq!(model.segment(&"a".into()).unwrap().end, 3.25);
        engine.update(&mut model, 4.0).unwrap();
        assert_eq!(model.segment(&"a".into()).unwrap().end, 4.0);

        let ended = engine.end(&model).unwrap();
        assert_eq!(
            ended,
            ResizeEvent::Ended {
                segment_id: "a".into(),
                start: 1.0,
                end: 4.0
            }
        );
        assert!(engine.end(&model).is_none());
    }
}
