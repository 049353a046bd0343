//! 编辑器核心与命令/事件模块
//!
//! `TimelineEditor` is the single writer of a dubbing session: it owns the
//! segment model together with every engine that may change it, the playback
//! synchroniser and the waveform cache that observe it, and the queues the
//! host drains for audio resolution and waveform decoding. Host UIs talk to
//! it through `TimelineCommand` and listen through `TimelineEvent`.

use crate::audio::{AudioRegistry, AudioStatus, AudioTicket};
use crate::config::TimelineConfig;
use crate::drag::{DragEngine, DragOutcome, DragPreview, TrackLayout};
use crate::error::{LoadError, Rejection};
use crate::mapper::TimeMapper;
use crate::model::{SegmentModel, SegmentPatch};
use crate::playback::{AudioBackend, Clock, InstantClock, PlaybackState, PlaybackSynchronizer};
use crate::project::SessionSnapshot;
use crate::resize::{ResizeEdge, ResizeEngine, ResizeEvent};
use crate::split_merge;
use crate::structure::{SeedSegment, SegmentId, TimelineState, Track, TrackId, TrackKind};
use crate::ui::ViewState;
use crate::waveform::{is_segment_visible, WaveformCache, WaveformRequest, WaveformState};
use egui::Pos2;

#[derive(Clone, Debug)]
pub enum TimelineCommand {
    UpdateSegment {
        segment_id: SegmentId,
        patch: SegmentPatch,
    },
    SplitSegment {
        segment_id: SegmentId,
        at: f64,
    },
    MergeSegments {
        segment_ids: Vec<SegmentId>,
        track_id: TrackId,
    },
    RenameTrack {
        track_id: TrackId,
        label: String,
    },
    AddLane {
        kind: TrackKind,
        label: String,
    },
    SetScale {
        scale: f64,
    },
    ZoomBy {
        factor: f64,
    },
    Play,
    Pause,
    Seek {
        time: f64,
    },
    SetMasterRate {
        rate: f64,
    },
    SetStopBound {
        bound: Option<f64>,
    },
    AudioReady {
        segment_id: SegmentId,
        url: String,
        duration: f64,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum TimelineEvent {
    SegmentUpdated {
        segment_id: SegmentId,
    },
    SegmentMoved {
        segment_id: SegmentId,
        from_track: TrackId,
        to_track: TrackId,
        start: f64,
        end: f64,
    },
    ResizeStarted {
        segment_id: SegmentId,
        edge: ResizeEdge,
    },
    SegmentResized {
        segment_id: SegmentId,
        start: f64,
        end: f64,
    },
    SegmentSplit {
        left: SegmentId,
        right: SegmentId,
    },
    SegmentsMerged {
        merged: SegmentId,
        removed: SegmentId,
    },
    TrackRenamed {
        track_id: TrackId,
        label: String,
    },
    LaneAdded {
        track_id: TrackId,
        kind: TrackKind,
    },
    ScaleChanged {
        scale: f64,
    },
    PlaybackStateChanged {
        is_playing: bool,
    },
    PlayheadChanged {
        position: f64,
    },
    ActiveSegmentChanged {
        segment_id: Option<SegmentId>,
    },
    AudioReady {
        segment_id: SegmentId,
        end: f64,
    },
    OperationRejected {
        reason: Rejection,
    },
}

pub struct TimelineEditor {
    pub(crate) model: SegmentModel,
    pub(crate) timeline: TimelineState,
    pub(crate) config: TimelineConfig,
    pub(crate) drag: DragEngine,
    pub(crate) resize: ResizeEngine,
    audio: AudioRegistry,
    pub(crate) playback: PlaybackSynchronizer,
    waveforms: WaveformCache,
    last_active: Option<SegmentId>,
    audio_tickets: Vec<AudioTicket>,
    waveform_requests: Vec<WaveformRequest>,
    pending_events: Vec<TimelineEvent>,
    event_listener: Option<Box<dyn FnMut(&TimelineEvent)>>,
    pub(crate) view: ViewState,
}

impl TimelineEditor {
    pub fn new(
        model: SegmentModel,
        config: TimelineConfig,
        clock: Box<dyn Clock>,
        backend: Box<dyn AudioBackend>,
    ) -> Self {
        let duration = model.duration();
        let playback = PlaybackSynchronizer::new(
            duration,
            clock,
            backend,
            config.preroll_seconds,
            config.drift_tolerance,
        );
        let waveforms = WaveformCache::new(config.waveform_px_per_sample);
        let mut editor = Self {
            model,
            timeline: TimelineState::new(duration),
            config,
            drag: DragEngine::new(),
            resize: ResizeEngine::new(),
            audio: AudioRegistry::new(),
            playback,
            waveforms,
            last_active: None,
            audio_tickets: Vec::new(),
            waveform_requests: Vec::new(),
            pending_events: Vec::new(),
            event_listener: None,
            view: ViewState::default(),
        };
        editor.refresh_audio();
        editor.last_active = editor.model.active_segment_id(0.0);
        editor
    }

    /// Seeds a session from the host's segment list, playing against the
    /// system clock.
    pub fn from_seed(
        seed: Vec<SeedSegment>,
        duration: f64,
        config: TimelineConfig,
        backend: Box<dyn AudioBackend>,
    ) -> Result<Self, LoadError> {
        let model = SegmentModel::from_seed(seed, duration, config.min_segment_duration)?;
        Ok(Self::new(model, config, Box::new(InstantClock::default()), backend))
    }

    pub fn from_snapshot(
        snapshot: SessionSnapshot,
        config: TimelineConfig,
        clock: Box<dyn Clock>,
        backend: Box<dyn AudioBackend>,
    ) -> Result<Self, LoadError> {
        let (model, scale) = snapshot.into_model(config.min_segment_duration)?;
        let mut editor = Self::new(model, config, clock, backend);
        editor.timeline.scale = editor.config.clamp_scale(scale);
        Ok(editor)
    }

    pub fn set_event_listener(&mut self, listener: Box<dyn FnMut(&TimelineEvent)>) {
        self.event_listener = Some(listener);
    }

    pub fn take_events(&mut self) -> Vec<TimelineEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Audio references the host must resolve; replies go through
    /// `audio_completion_sender`.
    pub fn take_audio_tickets(&mut self) -> Vec<AudioTicket> {
        std::mem::take(&mut self.audio_tickets)
    }

    /// Waveforms the host must decode; replies go through
    /// `waveform_completion_sender`.
    pub fn take_waveform_requests(&mut self) -> Vec<WaveformRequest> {
        std::mem::take(&mut self.waveform_requests)
    }

    pub fn audio_completion_sender(&self) -> crossbeam_channel::Sender<crate::audio::AudioResolution> {
        self.audio.completion_sender()
    }

    pub fn waveform_completion_sender(
        &self,
    ) -> crossbeam_channel::Sender<crate::waveform::WaveformResponse> {
        self.waveforms.completion_sender()
    }

    pub fn execute_command(&mut self, command: TimelineCommand) -> Result<(), Rejection> {
        match command {
            TimelineCommand::UpdateSegment { segment_id, patch } => {
                self.update_segment(&segment_id, patch)
            }
            TimelineCommand::SplitSegment { segment_id, at } => {
                self.split(&segment_id, at).map(|_| ())
            }
            TimelineCommand::MergeSegments {
                segment_ids,
                track_id,
            } => self.merge(&segment_ids, track_id).map(|_| ()),
            TimelineCommand::RenameTrack { track_id, label } => self.rename_track(track_id, label),
            TimelineCommand::AddLane { kind, label } => {
                self.add_lane(kind, label);
                Ok(())
            }
            TimelineCommand::SetScale { scale } => {
                self.set_scale(scale);
                Ok(())
            }
            TimelineCommand::ZoomBy { factor } => {
                self.zoom_by(factor);
                Ok(())
            }
            TimelineCommand::Play => {
                self.play();
                Ok(())
            }
            TimelineCommand::Pause => {
                self.pause();
                Ok(())
            }
            TimelineCommand::Seek { time } => {
                self.seek(time);
                Ok(())
            }
            TimelineCommand::SetMasterRate { rate } => {
                self.set_master_rate(rate);
                Ok(())
            }
            TimelineCommand::SetStopBound { bound } => {
                self.set_stop_bound(bound);
                Ok(())
            }
            TimelineCommand::AudioReady {
                segment_id,
                url,
                duration,
            } => self.notify_audio_ready(&segment_id, url, duration).map(|_| ()),
        }
    }

    fn emit_event(&mut self, event: TimelineEvent) {
        if let Some(ref mut listener) = self.event_listener {
            listener(&event);
        }
        self.pending_events.push(event);
    }

    /// Reports a rejection as an event and hands it back to the caller.
    fn rejected<T>(&mut self, result: Result<T, Rejection>) -> Result<T, Rejection> {
        if let Err(reason) = &result {
            log::warn!("Operation rejected: {}", reason);
            self.emit_event(TimelineEvent::OperationRejected {
                reason: reason.clone(),
            });
        }
        result
    }

    /// Re-reads the model after a mutation: new audio references get tickets,
    /// waveform entries of vanished segments are dropped.
    fn refresh_audio(&mut self) {
        let tickets = self.audio.sync(&self.model);
        self.audio_tickets.extend(tickets);
        let model = &self.model;
        self.waveforms.retain(|id| model.segment(id).is_some());
    }

    // ---- segment mutation ----

    pub fn update_segment(&mut self, id: &SegmentId, patch: SegmentPatch) -> Result<(), Rejection> {
        let result = self.model.update_segment(id, patch);
        self.rejected(result)?;
        self.refresh_audio();
        self.emit_event(TimelineEvent::SegmentUpdated {
            segment_id: id.clone(),
        });
        Ok(())
    }

    pub fn split(&mut self, id: &SegmentId, at: f64) -> Result<(SegmentId, SegmentId), Rejection> {
        let result = split_merge::split(&mut self.model, id, at);
        let (left, right) = self.rejected(result)?;
        self.refresh_audio();
        self.emit_event(TimelineEvent::SegmentSplit {
            left: left.clone(),
            right: right.clone(),
        });
        Ok((left, right))
    }

    pub fn merge(&mut self, ids: &[SegmentId], track_id: TrackId) -> Result<SegmentId, Rejection> {
        let result = split_merge::merge(&mut self.model, ids, track_id);
        let merged = self.rejected(result)?;
        self.refresh_audio();
        let removed = ids.iter().find(|id| **id != merged).cloned().unwrap_or_else(|| merged.clone());
        self.emit_event(TimelineEvent::SegmentsMerged {
            merged: merged.clone(),
            removed,
        });
        Ok(merged)
    }

    /// Whether `split(id, at)` would be accepted, for enabling UI affordances.
    pub fn can_split(&self, id: &SegmentId, at: f64) -> bool {
        self.model.segment(id).map_or(false, |s| {
            !s.is_rate_locked()
                && at - s.start >= self.model.min_duration()
                && s.end - at >= self.model.min_duration()
        })
    }

    /// The segment touching `id` on the right, if the pair could be merged.
    pub fn merge_partner(&self, id: &SegmentId) -> Option<SegmentId> {
        let seg = self.model.segment(id)?;
        let next = self.model.adjacent(id)?.next?;
        let touching = (next.start - seg.end).abs() <= 1e-6;
        (touching && !seg.is_rate_locked() && !next.is_rate_locked()).then(|| next.id.clone())
    }

    pub fn rename_track(&mut self, track_id: TrackId, label: String) -> Result<(), Rejection> {
        let result = self.model.rename_track(track_id, label.clone());
        self.rejected(result)?;
        self.emit_event(TimelineEvent::TrackRenamed { track_id, label });
        Ok(())
    }

    pub fn add_lane(&mut self, kind: TrackKind, label: String) -> TrackId {
        let track_id = self.model.add_lane(kind, label);
        self.emit_event(TimelineEvent::LaneAdded { track_id, kind });
        track_id
    }

    /// Late audio-ready report from the host.
    pub fn notify_audio_ready(
        &mut self,
        id: &SegmentId,
        url: String,
        audio_duration: f64,
    ) -> Result<f64, Rejection> {
        let result = self.model.apply_audio_ready(id, url.clone(), audio_duration);
        let end = self.rejected(result)?;
        self.audio.mark_ready(id, &url);
        self.refresh_audio();
        log::info!("Audio ready for {} ({:.3}s), end now {:.3}s", id, audio_duration, end);
        self.emit_event(TimelineEvent::AudioReady {
            segment_id: id.clone(),
            end,
        });
        Ok(end)
    }

    // ---- zoom ----

    pub fn set_scale(&mut self, scale: f64) {
        let scale = self.config.clamp_scale(scale);
        if (scale - self.timeline.scale).abs() > f64::EPSILON {
            self.timeline.scale = scale;
            self.emit_event(TimelineEvent::ScaleChanged { scale });
        }
    }

    pub fn zoom_by(&mut self, factor: f64) {
        if factor.is_finite() && factor > 0.0 {
            self.set_scale(self.timeline.scale * factor);
        }
    }

    // ---- gestures ----

    pub fn begin_drag(&mut self, id: &SegmentId, pointer: Pos2) -> Result<(), Rejection> {
        if self.resize.is_resizing() {
            return self.rejected(Err(Rejection::Busy));
        }
        let result = self.drag.begin(&self.model, id, pointer);
        self.rejected(result)
    }

    pub fn update_drag(&mut self, pointer: Pos2, layouts: &[TrackLayout]) -> Option<DragPreview> {
        let mapper = self.mapper();
        self.drag.update(pointer, &mapper, layouts).cloned()
    }

    pub fn finish_drag(
        &mut self,
        pointer: Pos2,
        inside: bool,
        layouts: &[TrackLayout],
    ) -> Result<DragOutcome, Rejection> {
        let mapper = self.mapper();
        let result = self.drag.finish(&mut self.model, pointer, inside, &mapper, layouts);
        let outcome = self.rejected(result)?;
        if let DragOutcome::Committed {
            segment_id,
            from_track,
            to_track,
            start,
            end,
            ..
        } = &outcome
        {
            self.emit_event(TimelineEvent::SegmentMoved {
                segment_id: segment_id.clone(),
                from_track: *from_track,
                to_track: *to_track,
                start: *start,
                end: *end,
            });
        }
        Ok(outcome)
    }

    pub fn begin_resize(&mut self, id: &SegmentId, edge: ResizeEdge) -> Result<(), Rejection> {
        if self.drag.is_dragging() {
            return self.rejected(Err(Rejection::Busy));
        }
        let result = self.resize.begin(&self.model, id, edge);
        if let ResizeEvent::Started { segment_id, edge } = self.rejected(result)? {
            self.waveforms.freeze(&segment_id);
            self.emit_event(TimelineEvent::ResizeStarted { segment_id, edge });
        }
        Ok(())
    }

    /// `delta_time` is measured from where the gesture began.
    pub fn update_resize(&mut self, delta_time: f64) -> Result<(f64, f64), Rejection> {
        self.resize.update(&mut self.model, delta_time)
    }

    pub fn end_resize(&mut self) -> Option<(f64, f64)> {
        match self.resize.end(&self.model)? {
            ResizeEvent::Ended {
                segment_id,
                start,
                end,
            } => {
                self.waveforms.unfreeze(&segment_id);
                self.emit_event(TimelineEvent::SegmentResized {
                    segment_id,
                    start,
                    end,
                });
                Some((start, end))
            }
            ResizeEvent::Started { .. } => None,
        }
    }

    /// Aborts any gesture (focus loss, Escape). A drag leaves the model
    /// untouched; a resize keeps what it has already committed.
    pub fn cancel_gestures(&mut self) {
        self.drag.cancel();
        self.end_resize();
        self.playback.end_scrub();
    }

    // ---- playback ----

    pub fn play(&mut self) {
        if self.playback.is_playing() {
            return;
        }
        self.playback.play(&self.model, &self.audio);
        self.emit_event(TimelineEvent::PlaybackStateChanged { is_playing: true });
    }

    pub fn pause(&mut self) {
        if !self.playback.is_playing() {
            return;
        }
        self.playback.pause();
        self.emit_event(TimelineEvent::PlaybackStateChanged { is_playing: false });
    }

    pub fn toggle_playback(&mut self) {
        if self.playback.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Stops playback and parks the playhead at `time` (clamped).
    pub fn seek(&mut self, time: f64) {
        let was_playing = self.playback.is_playing();
        self.playback.seek(time, &self.model, &self.audio);
        if was_playing {
            self.emit_event(TimelineEvent::PlaybackStateChanged { is_playing: false });
        }
        self.emit_event(TimelineEvent::PlayheadChanged {
            position: self.playback.playhead(),
        });
        self.update_active_segment();
    }

    pub fn seek_pixel(&mut self, px: f64) {
        self.seek(self.mapper().pixel_to_time(px));
    }

    pub fn begin_scrub(&mut self) {
        let was_playing = self.playback.is_playing();
        self.playback.begin_scrub();
        if was_playing {
            self.emit_event(TimelineEvent::PlaybackStateChanged { is_playing: false });
        }
    }

    pub fn scrub_to(&mut self, time: f64) {
        self.playback.scrub_to(time, &self.model, &self.audio);
        self.emit_event(TimelineEvent::PlayheadChanged {
            position: self.playback.playhead(),
        });
        self.update_active_segment();
    }

    pub fn end_scrub(&mut self) {
        self.playback.end_scrub();
    }

    pub fn set_master_rate(&mut self, rate: f64) {
        self.playback.set_master_rate(rate);
    }

    pub fn set_stop_bound(&mut self, bound: Option<f64>) {
        self.playback.set_stop_bound(bound);
    }

    /// Per-frame entry: applies async results that arrived since the last
    /// frame, then advances the playhead and aligns audio sources.
    pub fn frame(&mut self) {
        let resolved = self.audio.poll();
        if resolved > 0 {
            log::debug!("{} audio references resolved", resolved);
        }
        self.refresh_audio();
        self.waveforms.poll();

        let outcome = self.playback.tick(&self.model, &self.audio);
        if outcome.advanced {
            self.emit_event(TimelineEvent::PlayheadChanged {
                position: self.playback.playhead(),
            });
        }
        if outcome.reached_end {
            self.emit_event(TimelineEvent::PlaybackStateChanged { is_playing: false });
        }
        self.update_active_segment();
    }

    fn update_active_segment(&mut self) {
        let active = self.model.active_segment_id(self.playback.playhead());
        if active != self.last_active {
            self.last_active = active.clone();
            self.emit_event(TimelineEvent::ActiveSegmentChanged { segment_id: active });
        }
    }

    /// Ends the session: stops the loop and releases every audio source.
    pub fn shutdown(&mut self) {
        self.cancel_gestures();
        self.playback.shutdown();
        if !self.audio_tickets.is_empty() || !self.waveform_requests.is_empty() {
            log::debug!(
                "Dropping {} audio tickets and {} waveform requests",
                self.audio_tickets.len(),
                self.waveform_requests.len()
            );
        }
        self.audio_tickets.clear();
        self.waveform_requests.clear();
    }

    // ---- waveforms ----

    /// Queues a waveform decode for a segment if it is visible, its audio is
    /// resolved and the cached waveform does not already match `width_px`.
    pub fn request_waveform(&mut self, id: &SegmentId, width_px: f32, visible: bool) {
        let Some(url) = self.audio.url(id) else {
            return;
        };
        if let Some(request) = self.waveforms.request(id, url, width_px, visible) {
            self.waveform_requests.push(request);
        }
    }

    /// Requests waveforms for every segment inside the viewport.
    pub fn request_visible_waveforms(&mut self, scroll_px: f64, viewport_px: f64) {
        let mapper = self.mapper();
        let margin = viewport_px * 0.5;
        let wanted: Vec<(SegmentId, f32, bool)> = self
            .model
            .segments()
            .map(|s| {
                let width = (mapper.time_to_pixel(s.end) - mapper.time_to_pixel(s.start)) as f32;
                let visible = is_segment_visible(s, &mapper, scroll_px, viewport_px, margin);
                (s.id.clone(), width, visible)
            })
            .collect();
        for (id, width, visible) in wanted {
            self.request_waveform(&id, width, visible);
        }
    }

    pub fn waveform(&self, id: &SegmentId) -> WaveformState<'_> {
        self.waveforms.state(id)
    }

    // ---- read-only views ----

    pub fn model(&self) -> &SegmentModel {
        &self.model
    }

    pub fn tracks(&self) -> &[Track] {
        self.model.tracks()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::new(&self.timeline, self.model.snapshot())
    }

    pub fn timeline(&self) -> &TimelineState {
        &self.timeline
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn mapper(&self) -> TimeMapper {
        TimeMapper::with_density(
            self.timeline.duration,
            self.timeline.scale,
            self.config.pixels_per_second,
        )
    }

    pub fn playhead(&self) -> f64 {
        self.playback.playhead()
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn master_rate(&self) -> f64 {
        self.playback.master_rate()
    }

    /// Derived on every read from the playhead.
    pub fn active_segment_id(&self) -> Option<SegmentId> {
        self.model.active_segment_id(self.playback.playhead())
    }

    pub fn audio_status(&self, id: &SegmentId) -> Option<&AudioStatus> {
        self.audio.status(id)
    }

    pub fn drag_preview(&self) -> Option<&DragPreview> {
        self.drag.preview()
    }

    pub fn is_resizing(&self) -> bool {
        self.resize.is_resizing()
    }

    /// Seconds covered by a viewport starting at `scroll_px`.
    pub fn visible_time_range(&self, scroll_px: f64, viewport_px: f64) -> (f64, f64) {
        let mapper = self.mapper();
        (
            mapper.pixel_to_time(scroll_px),
            mapper.pixel_to_time(scroll_px + viewport_px),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioResolution;
    use crate::playback::{ManualClock, NullBackend};
    use crate::waveform::WaveformResponse;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn seed(id: &str, speaker: &str, start: f64, end: f64) -> SeedSegment {
        SeedSegment {
            id: id.into(),
            speaker: speaker.into(),
            start,
            end,
            source_text: id.into(),
            target_text: id.into(),
            audio_ref: Some(format!("{id}-ref")),
            playback_rate: None,
        }
    }

    fn editor() -> (TimelineEditor, ManualClock) {
        let model = SegmentModel::from_seed(
            vec![
                seed("seg1", "A", 0.0, 5.0),
                seed("seg2", "A", 5.0, 9.0),
                seed("seg3", "B", 2.0, 4.0),
            ],
            12.0,
            0.05,
        )
        .unwrap();
        let clock = ManualClock::new();
        let editor = TimelineEditor::new(
            model,
            TimelineConfig::default(),
            Box::new(clock.clone()),
            Box::new(NullBackend),
        );
        (editor, clock)
    }

    #[test]
    fn new_session_requests_audio_resolution() {
        let (mut editor, _) = editor();
        let tickets = editor.take_audio_tickets();
        assert_eq!(tickets.len(), 3);
        assert!(editor.take_audio_tickets().is_empty());
    }

    #[test]
    fn rejected_merge_is_reported_and_returned() {
        let (mut editor, _) = editor();
        let track_a = editor.tracks()[0].id;
        let result = editor.merge(&["seg1".into(), "seg3".into()], track_a);
        assert!(matches!(result, Err(Rejection::DifferentTracks(..))));
        let events = editor.take_events();
        assert!(matches!(
            events.as_slice(),
            [TimelineEvent::OperationRejected { reason: Rejection::DifferentTracks(..) }]
        ));
    }

    #[test]
    fn merge_then_split_emits_events_and_requests_nothing_for_unresolved_audio() {
        let (mut editor, _) = editor();
        editor.take_audio_tickets();
        let track_a = editor.tracks()[0].id;
        let merged = editor.merge(&["seg1".into(), "seg2".into()], track_a).unwrap();
        let (_, right) = editor.split(&merged, 5.0).unwrap();
        let events = editor.take_events();
        assert_eq!(
            events[0],
            TimelineEvent::SegmentsMerged {
                merged: "seg1".into(),
                removed: "seg2".into()
            }
        );
        assert_eq!(
            events[1],
            TimelineEvent::SegmentSplit {
                left: "seg1".into(),
                right
            }
        );
        assert!(editor.take_audio_tickets().is_empty());
    }

    #[test]
    fn zoom_is_clamped_and_reported_once() {
        let (mut editor, _) = editor();
        editor.set_scale(10.0);
        editor.set_scale(3.0);
        assert_eq!(editor.timeline().scale, 2.0);
        editor.zoom_by(0.01);
        assert_eq!(editor.timeline().scale, 0.35);
        let scales: Vec<_> = editor
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                TimelineEvent::ScaleChanged { scale } => Some(scale),
                _ => None,
            })
            .collect();
        assert_eq!(scales, vec![2.0, 0.35]);
    }

    #[test]
    fn frame_advances_and_tracks_active_segment() {
        let (mut editor, clock) = editor();
        editor.seek(4.9);
        editor.play();
        editor.take_events();
        clock.advance(0.2);
        editor.frame();
        assert!((editor.playhead() - 5.1).abs() < 1e-9);
        assert_eq!(editor.active_segment_id(), Some("seg2".into()));
        let events = editor.take_events();
        assert!(events.contains(&TimelineEvent::ActiveSegmentChanged {
            segment_id: Some("seg2".into())
        }));
    }

    #[test]
    fn playback_stops_at_duration() {
        let (mut editor, clock) = editor();
        editor.seek(11.99);
        editor.play();
        clock.advance(0.05);
        editor.frame();
        assert_eq!(editor.playhead(), 12.0);
        assert!(!editor.is_playing());
        assert!(editor
            .take_events()
            .contains(&TimelineEvent::PlaybackStateChanged { is_playing: false }));
    }

    #[test]
    fn seek_stops_playback() {
        let (mut editor, clock) = editor();
        editor.play();
        clock.advance(0.1);
        editor.frame();
        editor.seek(-3.0);
        assert!(!editor.is_playing());
        assert_eq!(editor.playhead(), 0.0);
    }

    #[test]
    fn audio_ready_recomputes_end_and_marks_url() {
        let (mut editor, _) = editor();
        let end = editor
            .notify_audio_ready(&"seg3".into(), "file:///seg3.wav".into(), 3.5)
            .unwrap();
        assert_eq!(end, 5.5);
        assert_eq!(
            editor.audio_status(&"seg3".into()),
            Some(&AudioStatus::Ready("file:///seg3.wav".into()))
        );
        assert!(editor
            .notify_audio_ready(&"ghost".into(), "x".into(), 1.0)
            .is_err());
    }

    #[test]
    fn resize_freezes_waveform_until_end() {
        let (mut editor, _) = editor();
        let tickets = editor.take_audio_tickets();
        let sender = editor.audio_completion_sender();
        for ticket in tickets {
            let url = format!("file:///{}.wav", ticket.segment_id);
            sender
                .send(AudioResolution {
                    ticket,
                    result: Ok(url),
                })
                .unwrap();
        }
        editor.frame();

        editor.request_waveform(&"seg3".into(), 200.0, true);
        let first = editor.take_waveform_requests();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].sample_count, 100);

        editor.begin_resize(&"seg3".into(), ResizeEdge::End).unwrap();
        editor.update_resize(0.5).unwrap();
        editor.request_waveform(&"seg3".into(), 250.0, true);
        assert!(editor.take_waveform_requests().is_empty());
        assert_eq!(editor.end_resize(), Some((2.0, 4.5)));

        editor.request_waveform(&"seg3".into(), 250.0, true);
        let second = editor.take_waveform_requests();
        assert_eq!(second[0].sample_count, 125);

        editor
            .waveform_completion_sender()
            .send(WaveformResponse {
                request: first[0].clone(),
                result: Ok(vec![1.0; 100]),
            })
            .unwrap();
        editor.frame();
        assert!(matches!(editor.waveform(&"seg3".into()), WaveformState::Loading(_)));
    }

    #[test]
    fn gestures_exclude_each_other() {
        let (mut editor, _) = editor();
        editor.begin_drag(&"seg1".into(), Pos2::ZERO).unwrap();
        assert_eq!(
            editor.begin_resize(&"seg2".into(), ResizeEdge::Start),
            Err(Rejection::Busy)
        );
        editor.cancel_gestures();
        assert!(editor.drag_preview().is_none());
        editor.begin_resize(&"seg2".into(), ResizeEdge::Start).unwrap();
        assert!(editor.is_resizing());
    }

    #[test]
    fn listener_sees_every_event() {
        let (mut editor, _) = editor();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        editor.set_event_listener(Box::new(move |e| sink.borrow_mut().push(e.clone())));
        let track_b = editor.tracks()[1].id;
        editor.rename_track(track_b, "Narrator".into()).unwrap();
        editor.add_lane(TrackKind::Muted, "Music".into());
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(editor.take_events().len(), 2);
        assert_eq!(editor.tracks()[1].label, "Narrator");
    }

    #[test]
    fn visible_range_follows_zoom() {
        let (mut editor, _) = editor();
        assert_eq!(editor.visible_time_range(100.0, 300.0), (1.0, 4.0));
        editor.set_scale(0.5);
        assert_eq!(editor.visible_time_range(100.0, 300.0), (2.0, 8.0));
    }
}
