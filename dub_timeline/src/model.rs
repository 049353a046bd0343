//! 片段模型
//!
//! Owns the speaker tracks and their segments. Text and audio fields may be
//! patched freely; timing and track membership are only changed by the drag,
//! resize and split/merge engines through the crate-private mutators below,
//! each of which leaves the invariants intact:
//!
//! 1. segments of one speaker track never overlap,
//! 2. `end - start >= ε` for every segment,
//! 3. `0 <= start` and `end <= duration`,
//! 4. every segment's `track_id` names an existing speaker track.

use crate::error::{LoadError, Rejection};
use crate::structure::{track_color, SeedSegment, Segment, SegmentId, Track, TrackId, TrackKind};
use std::collections::HashSet;

/// Slack for floating-point comparisons of segment boundaries.
pub(crate) const TIME_EPSILON: f64 = 1e-9;

/// Non-geometric fields a host may change directly (text fields, audio
/// reference, rate override). Timing fields are accepted only to be rejected,
/// so a host that tries to shortcut the engines learns about it.
#[derive(Clone, Debug, Default)]
pub struct SegmentPatch {
    pub source_text: Option<String>,
    pub target_text: Option<String>,
    pub audio_ref: Option<Option<String>>,
    pub playback_rate: Option<f64>,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub track_id: Option<TrackId>,
}

impl SegmentPatch {
    fn is_geometric(&self) -> bool {
        self.start.is_some() || self.end.is_some() || self.track_id.is_some()
    }
}

/// Nearest neighbours of a segment inside its track, ordered by `start`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Adjacent<'a> {
    pub previous: Option<&'a Segment>,
    pub next: Option<&'a Segment>,
}

pub fn find_adjacent<'a>(track_segments: &'a [Segment], id: &SegmentId) -> Option<Adjacent<'a>> {
    let target = track_segments.iter().find(|s| &s.id == id)?;
    let mut adjacent = Adjacent::default();
    for seg in track_segments.iter().filter(|s| &s.id != id) {
        if seg.start < target.start {
            if adjacent.previous.map_or(true, |p| seg.start > p.start) {
                adjacent.previous = Some(seg);
            }
        } else if adjacent.next.map_or(true, |n| seg.start < n.start) {
            adjacent.next = Some(seg);
        }
    }
    Some(adjacent)
}

/// Per speaker track, the segment whose `[start, end)` contains `time`.
pub fn segments_at(tracks: &[Track], time: f64) -> Vec<&Segment> {
    tracks
        .iter()
        .filter(|t| t.is_speaker())
        .filter_map(|t| t.segments.iter().find(|s| s.contains(time)))
        .collect()
}

#[derive(Clone, Debug)]
pub struct SegmentModel {
    tracks: Vec<Track>,
    duration: f64,
    min_duration: f64,
}

impl SegmentModel {
    /// Builds one speaker track per distinct speaker, in order of first
    /// appearance. Corrupted seed data fails the whole load.
    pub fn from_seed(
        seed: Vec<SeedSegment>,
        duration: f64,
        min_duration: f64,
    ) -> Result<Self, LoadError> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(LoadError::InvalidDuration(duration));
        }

        let mut tracks: Vec<Track> = Vec::new();
        let mut seen = HashSet::new();
        for entry in seed {
            if !seen.insert(entry.id.clone()) {
                return Err(LoadError::DuplicateId(entry.id));
            }
            let track_index = match tracks.iter().position(|t| t.label == entry.speaker) {
                Some(index) => index,
                None => {
                    let color = track_color(tracks.len());
                    tracks.push(Track::new_speaker(entry.speaker.clone(), color));
                    tracks.len() - 1
                }
            };
            let track = &mut tracks[track_index];
            let playback_rate = match entry.playback_rate {
                Some(rate) if rate.is_finite() && rate > 0.0 => rate,
                Some(rate) => {
                    log::warn!("Segment {} has unusable rate {}, using 1.0", entry.id, rate);
                    1.0
                }
                None => 1.0,
            };
            track.segments.push(Segment {
                id: SegmentId(entry.id),
                track_id: track.id,
                start: entry.start,
                end: entry.end,
                source_text: entry.source_text,
                target_text: entry.target_text,
                audio_ref: entry.audio_ref,
                playback_rate,
            });
        }

        let model = Self::from_tracks(tracks, duration, min_duration)?;
        log::info!(
            "Loaded {} segments on {} speaker tracks ({:.2}s)",
            model.segment_count(),
            model.tracks.len(),
            duration
        );
        Ok(model)
    }

    /// Validates an existing track list, e.g. a restored snapshot.
    pub fn from_tracks(
        mut tracks: Vec<Track>,
        duration: f64,
        min_duration: f64,
    ) -> Result<Self, LoadError> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(LoadError::InvalidDuration(duration));
        }
        let mut seen = HashSet::new();
        for track in &mut tracks {
            if !track.is_speaker() && !track.segments.is_empty() {
                return Err(LoadError::InvalidConfig(format!(
                    "lane {} is not a speaker track but holds segments",
                    track.label
                )));
            }
            track.id.reserve();
            track.sort_segments();
            for seg in &mut track.segments {
                if !seen.insert(seg.id.clone()) {
                    return Err(LoadError::DuplicateId(seg.id.0.clone()));
                }
                let too_short = seg.end - seg.start < min_duration - TIME_EPSILON;
                if !(seg.start < seg.end) || too_short || !seg.start.is_finite() || !seg.end.is_finite() {
                    return Err(LoadError::InvalidBounds {
                        id: seg.id.0.clone(),
                        start: seg.start,
                        end: seg.end,
                    });
                }
                if seg.start < 0.0 || seg.end > duration + TIME_EPSILON {
                    return Err(LoadError::OutOfRange {
                        id: seg.id.0.clone(),
                        duration,
                    });
                }
                seg.track_id = track.id;
            }
            for pair in track.segments.windows(2) {
                if pair[0].end > pair[1].start + TIME_EPSILON {
                    return Err(LoadError::Overlap(pair[0].id.0.clone(), pair[1].id.0.clone()));
                }
            }
        }
        Ok(Self {
            tracks,
            duration,
            min_duration,
        })
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn speaker_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.is_speaker())
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn min_duration(&self) -> f64 {
        self.min_duration
    }

    pub fn segment_count(&self) -> usize {
        self.tracks.iter().map(|t| t.segments.len()).sum()
    }

    pub fn segment(&self, id: &SegmentId) -> Option<&Segment> {
        self.tracks.iter().find_map(|t| t.segment(id))
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.tracks.iter().flat_map(|t| t.segments.iter())
    }

    /// Cloned Track/Segment snapshot for persistence.
    pub fn snapshot(&self) -> Vec<Track> {
        self.tracks.clone()
    }

    /// Neighbours of `id` in its own track.
    pub fn adjacent(&self, id: &SegmentId) -> Option<Adjacent<'_>> {
        let seg = self.segment(id)?;
        let track = self.track(seg.track_id)?;
        find_adjacent(&track.segments, id)
    }

    pub fn segments_at(&self, time: f64) -> Vec<&Segment> {
        segments_at(&self.tracks, time)
    }

    /// First segment (in track order) containing `time`.
    pub fn active_segment_id(&self, time: f64) -> Option<SegmentId> {
        self.segments_at(time).first().map(|s| s.id.clone())
    }

    pub fn update_segment(&mut self, id: &SegmentId, patch: SegmentPatch) -> Result<(), Rejection> {
        if patch.is_geometric() {
            return Err(Rejection::GeometricPatch);
        }
        let seg = self
            .segment_mut(id)
            .ok_or_else(|| Rejection::UnknownSegment(id.clone()))?;
        if let Some(text) = patch.source_text {
            seg.source_text = text;
        }
        if let Some(text) = patch.target_text {
            seg.target_text = text;
        }
        if let Some(audio_ref) = patch.audio_ref {
            seg.audio_ref = audio_ref;
        }
        if let Some(rate) = patch.playback_rate {
            if rate.is_finite() && rate > 0.0 {
                seg.playback_rate = rate;
            }
        }
        Ok(())
    }

    pub fn rename_track(&mut self, id: TrackId, label: String) -> Result<(), Rejection> {
        let track = self
            .tracks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(Rejection::UnknownTrack(id))?;
        track.label = label;
        Ok(())
    }

    /// Appends a waveform or muted lane.
    pub fn add_lane(&mut self, kind: TrackKind, label: String) -> TrackId {
        let track = Track::new_lane(kind, label);
        let id = track.id;
        self.tracks.push(track);
        id
    }

    /// Late "audio ready" report: stores the playable reference and stretches
    /// or shrinks `end` to the audio's natural span, bounded by the next
    /// neighbour and the timeline. Returns the new end.
    pub fn apply_audio_ready(
        &mut self,
        id: &SegmentId,
        audio_ref: String,
        audio_duration: f64,
    ) -> Result<f64, Rejection> {
        let seg = self
            .segment(id)
            .ok_or_else(|| Rejection::UnknownSegment(id.clone()))?;
        let limit = self
            .adjacent(id)
            .and_then(|a| a.next.map(|n| n.start))
            .unwrap_or(self.duration)
            .min(self.duration);
        let start = seg.start;
        let mut end = seg.end;
        if audio_duration.is_finite() && audio_duration > 0.0 {
            let natural = audio_duration / seg.playback_rate;
            end = (start + natural).min(limit).max(start + self.min_duration);
        }
        let min_duration = self.min_duration;
        if let Some(seg) = self.segment_mut(id) {
            seg.audio_ref = Some(audio_ref);
            // A neighbour closer than ε cannot exist, so this only guards rounding.
            seg.end = end.max(seg.start + min_duration);
        }
        Ok(end)
    }

    /// Checks all four invariants; used by tests and debug assertions.
    pub fn check_invariants(&self) -> Result<(), String> {
        for track in &self.tracks {
            if !track.is_speaker() && !track.segments.is_empty() {
                return Err(format!("lane {:?} holds segments", track.id));
            }
            for seg in &track.segments {
                if seg.track_id != track.id {
                    return Err(format!("segment {} has stale track id", seg.id));
                }
                if seg.end - seg.start < self.min_duration - TIME_EPSILON {
                    return Err(format!("segment {} shorter than minimum", seg.id));
                }
                if seg.start < -TIME_EPSILON || seg.end > self.duration + TIME_EPSILON {
                    return Err(format!("segment {} outside timeline", seg.id));
                }
            }
            for (i, a) in track.segments.iter().enumerate() {
                for b in track.segments.iter().skip(i + 1) {
                    if a.end > b.start + TIME_EPSILON && b.end > a.start + TIME_EPSILON {
                        return Err(format!("segments {} and {} overlap", a.id, b.id));
                    }
                }
            }
        }
        Ok(())
    }

    // ---- crate-private mutators used by the engines ----

    pub(crate) fn speaker_track_ids(&self) -> Vec<TrackId> {
        self.speaker_tracks().map(|t| t.id).collect()
    }

    pub(crate) fn segment_mut(&mut self, id: &SegmentId) -> Option<&mut Segment> {
        self.tracks
            .iter_mut()
            .find_map(|t| t.segments.iter_mut().find(|s| &s.id == id))
    }

    pub(crate) fn set_bounds(&mut self, id: &SegmentId, start: f64, end: f64) {
        let Some(track_id) = self.segment(id).map(|s| s.track_id) else {
            return;
        };
        if let Some(seg) = self.segment_mut(id) {
            seg.start = start;
            seg.end = end;
        }
        if let Some(track) = self.tracks.iter_mut().find(|t| t.id == track_id) {
            track.sort_segments();
        }
        debug_assert!(self.check_invariants().is_ok(), "{:?}", self.check_invariants());
    }

    pub(crate) fn move_segment(&mut self, id: &SegmentId, track_id: TrackId, start: f64) {
        let mut moved = None;
        for track in &mut self.tracks {
            if let Some(pos) = track.segments.iter().position(|s| &s.id == id) {
                moved = Some(track.segments.remove(pos));
                break;
            }
        }
        let Some(mut seg) = moved else {
            return;
        };
        let length = seg.duration();
        seg.start = start;
        seg.end = start + length;
        seg.track_id = track_id;
        if let Some(track) = self.tracks.iter_mut().find(|t| t.id == track_id) {
            track.segments.push(seg);
            track.sort_segments();
        }
        debug_assert!(self.check_invariants().is_ok(), "{:?}", self.check_invariants());
    }

    /// Removes `remove` from `track_id` and inserts `insert` in one step.
    pub(crate) fn replace_segments(
        &mut self,
        track_id: TrackId,
        remove: &[SegmentId],
        insert: Vec<Segment>,
    ) {
        if let Some(track) = self.tracks.iter_mut().find(|t| t.id == track_id) {
            track.segments.retain(|s| !remove.contains(&s.id));
            track.segments.extend(insert);
            track.sort_segments();
        }
        debug_assert!(self.check_invariants().is_ok(), "{:?}", self.check_invariants());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(id: &str, speaker: &str, start: f64, end: f64) -> SeedSegment {
        SeedSegment {
            id: id.into(),
            speaker: speaker.into(),
            start,
            end,
            source_text: String::new(),
            target_text: String::new(),
            audio_ref: Some(format!("{id}.wav")),
            playback_rate: None,
        }
    }

    fn sample_model() -> SegmentModel {
        SegmentModel::from_seed(
            vec![
                seed("b", "A", 5.0, 9.0),
                seed("a", "A", 0.0, 5.0),
                seed("c", "B", 2.0, 4.0),
                seed("d", "A", 12.0, 14.0),
            ],
            20.0,
            0.05,
        )
        .unwrap()
    }

    #[test]
    fn seed_groups_segments_by_speaker() {
        let model = sample_model();
        assert_eq!(model.tracks().len(), 2);
        assert_eq!(model.tracks()[0].label, "A");
        let ids: Vec<_> = model.tracks()[0].segments.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "d"]);
        assert_ne!(model.tracks()[0].color, model.tracks()[1].color);
        assert!(model.check_invariants().is_ok());
    }

    #[test]
    fn corrupted_seed_fails_fast() {
        let inverted = SegmentModel::from_seed(vec![seed("x", "A", 3.0, 3.0)], 10.0, 0.05);
        assert!(matches!(inverted, Err(LoadError::InvalidBounds { .. })));

        let shorter_than_minimum = SegmentModel::from_seed(
            vec![seed("tiny", "A", 0.0, 0.01), seed("b", "A", 2.0, 3.0)],
            10.0,
            0.05,
        );
        assert!(matches!(shorter_than_minimum, Err(LoadError::InvalidBounds { .. })));

        let overlapping = SegmentModel::from_seed(
            vec![seed("x", "A", 0.0, 3.0), seed("y", "A", 2.0, 4.0)],
            10.0,
            0.05,
        );
        assert!(matches!(overlapping, Err(LoadError::Overlap(..))));

        let outside = SegmentModel::from_seed(vec![seed("x", "A", 8.0, 12.0)], 10.0, 0.05);
        assert!(matches!(outside, Err(LoadError::OutOfRange { .. })));

        let duplicate = SegmentModel::from_seed(
            vec![seed("x", "A", 0.0, 1.0), seed("x", "B", 2.0, 3.0)],
            10.0,
            0.05,
        );
        assert!(matches!(duplicate, Err(LoadError::DuplicateId(_))));
    }

    #[test]
    fn adjacent_ignores_other_tracks() {
        let model = sample_model();
        let adj = model.adjacent(&"b".into()).unwrap();
        assert_eq!(adj.previous.map(|s| s.id.as_str()), Some("a"));
        assert_eq!(adj.next.map(|s| s.id.as_str()), Some("d"));

        let first = model.adjacent(&"a".into()).unwrap();
        assert!(first.previous.is_none());
    }

    #[test]
    fn segments_at_uses_half_open_spans() {
        let model = sample_model();
        let at_five: Vec<_> = model.segments_at(5.0).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(at_five, vec!["b"]);
        let at_three: Vec<_> = model.segments_at(3.0).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(at_three, vec!["a", "c"]);
        assert!(model.segments_at(10.0).is_empty());
        assert_eq!(model.active_segment_id(3.0), Some("a".into()));
    }

    #[test]
    fn update_segment_rejects_timing_changes() {
        let mut model = sample_model();
        let patch = SegmentPatch {
            start: Some(1.0),
            target_text: Some("hola".into()),
            ..Default::default()
        };
        assert_eq!(model.update_segment(&"a".into(), patch), Err(Rejection::GeometricPatch));
        assert_eq!(model.segment(&"a".into()).unwrap().target_text, "");

        let patch = SegmentPatch {
            target_text: Some("hola".into()),
            audio_ref: Some(None),
            ..Default::default()
        };
        model.update_segment(&"a".into(), patch).unwrap();
        let seg = model.segment(&"a".into()).unwrap();
        assert_eq!(seg.target_text, "hola");
        assert!(seg.audio_ref.is_none());
    }

    #[test]
    fn audio_ready_is_bounded_by_next_neighbour() {
        let mut model = sample_model();
        let end = model.apply_audio_ready(&"a".into(), "a-v2.wav".into(), 7.5).unwrap();
        assert_eq!(end, 5.0);

        let end = model.apply_audio_ready(&"d".into(), "d-v2.wav".into(), 1.0).unwrap();
        assert_eq!(end, 13.0);
        assert_eq!(model.segment(&"d".into()).unwrap().audio_ref.as_deref(), Some("d-v2.wav"));

        let end = model.apply_audio_ready(&"d".into(), "d-v3.wav".into(), 60.0).unwrap();
        assert_eq!(end, 20.0);
        assert!(model.check_invariants().is_ok());
    }

    #[test]
    fn lanes_cannot_hold_segments() {
        let mut model = sample_model();
        let lane = model.add_lane(TrackKind::Waveform, "Original".into());
        assert!(!model.track(lane).unwrap().is_speaker());
        assert_eq!(model.speaker_track_ids().len(), 2);
    }
}
