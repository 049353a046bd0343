//! 多轨播放同步
//!
//! One playhead, many audio sources. Every frame the playhead is advanced from
//! an injectable clock, then the set of sources that should be sounding is
//! derived from the model and the difference is sent to the backend as one
//! batch, so no track can lag another by more than a frame.

use crate::audio::AudioRegistry;
use crate::mapper::TimeMapper;
use crate::model::{SegmentModel, TIME_EPSILON};
use crate::structure::{Segment, SegmentId};
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

/// Frames further apart than this (window hidden, debugger) do not advance
/// the playhead.
const MAX_FRAME_DELTA: f64 = 1.0;

pub trait Clock {
    /// Monotonic time in seconds.
    fn now(&self) -> f64;
}

pub struct InstantClock {
    origin: Instant,
}

impl Default for InstantClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for InstantClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock; clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }

    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

/// Per-segment audio output, implemented by the host (e.g. one rodio sink per
/// segment). Offsets are in seconds of source audio.
pub trait AudioBackend {
    fn load(&mut self, id: &SegmentId, url: &str);
    fn play(&mut self, id: &SegmentId, offset: f64, rate: f64);
    fn pause(&mut self, id: &SegmentId);
    fn seek(&mut self, id: &SegmentId, offset: f64);
    /// Current source position, if the backend can report it.
    fn position(&self, id: &SegmentId) -> Option<f64>;
    fn release(&mut self, id: &SegmentId);
}

/// Backend that discards everything, for hosts without audio output.
#[derive(Default)]
pub struct NullBackend;

impl AudioBackend for NullBackend {
    fn load(&mut self, _id: &SegmentId, _url: &str) {}
    fn play(&mut self, _id: &SegmentId, _offset: f64, _rate: f64) {}
    fn pause(&mut self, _id: &SegmentId) {}
    fn seek(&mut self, _id: &SegmentId, _offset: f64) {}
    fn position(&self, _id: &SegmentId) -> Option<f64> {
        None
    }
    fn release(&mut self, _id: &SegmentId) {}
}

#[derive(Clone, Debug, PartialEq)]
pub enum SourceCommand {
    Load { id: SegmentId, url: String },
    Play { id: SegmentId, offset: f64, rate: f64 },
    Pause { id: SegmentId },
    Seek { id: SegmentId, offset: f64 },
    Release { id: SegmentId },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    /// Pointer drives the playhead; sources stay paused.
    Scrubbing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SourceState {
    Loaded,
    Playing,
}

#[derive(Clone, Debug)]
struct SourceSlot {
    url: String,
    state: SourceState,
    /// Segment start and output rate the source was last started with.
    started_at: (f64, f64),
}

impl SourceSlot {
    fn is_stale(&self, start: f64, rate: f64) -> bool {
        (self.started_at.0 - start).abs() > TIME_EPSILON || (self.started_at.1 - rate).abs() > TIME_EPSILON
    }
}

/// What one call to `tick` did.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameOutcome {
    pub advanced: bool,
    pub reached_end: bool,
}

pub struct PlaybackSynchronizer {
    clock: Box<dyn Clock>,
    backend: Box<dyn AudioBackend>,
    state: PlaybackState,
    playhead: f64,
    duration: f64,
    stop_bound: Option<f64>,
    master_rate: f64,
    last_frame: f64,
    preroll: f64,
    drift_tolerance: f64,
    slots: HashMap<SegmentId, SourceSlot>,
    last_commands: Vec<SourceCommand>,
}

impl PlaybackSynchronizer {
    pub fn new(
        duration: f64,
        clock: Box<dyn Clock>,
        backend: Box<dyn AudioBackend>,
        preroll: f64,
        drift_tolerance: f64,
    ) -> Self {
        Self {
            clock,
            backend,
            state: PlaybackState::Stopped,
            playhead: 0.0,
            duration: duration.max(0.0),
            stop_bound: None,
            master_rate: 1.0,
            last_frame: 0.0,
            preroll,
            drift_tolerance,
            slots: HashMap::new(),
            last_commands: Vec::new(),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn playhead(&self) -> f64 {
        self.playhead
    }

    pub fn master_rate(&self) -> f64 {
        self.master_rate
    }

    /// Commands sent to the backend by the most recent batch.
    pub fn last_commands(&self) -> &[SourceCommand] {
        &self.last_commands
    }

    fn end_bound(&self) -> f64 {
        self.stop_bound
            .map_or(self.duration, |b| b.clamp(0.0, self.duration))
    }

    pub fn set_stop_bound(&mut self, bound: Option<f64>) {
        self.stop_bound = bound;
    }

    pub fn set_master_rate(&mut self, rate: f64) {
        if !rate.is_finite() || rate <= 0.0 {
            return;
        }
        self.master_rate = rate.clamp(0.25, 4.0);
        // Playing sources pick up the new rate on the next sync.
        for slot in self.slots.values_mut() {
            if slot.state == SourceState::Playing {
                slot.state = SourceState::Loaded;
            }
        }
    }

    pub fn play(&mut self, model: &SegmentModel, audio: &AudioRegistry) {
        if self.state == PlaybackState::Playing {
            return;
        }
        if self.playhead >= self.end_bound() {
            self.playhead = 0.0;
        }
        self.state = PlaybackState::Playing;
        self.last_frame = self.clock.now();
        log::info!("Playback started at {:.3}s", self.playhead);
        self.sync(model, audio);
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Stopped {
            return;
        }
        self.state = PlaybackState::Stopped;
        log::info!("Playback paused at {:.3}s", self.playhead);
        let commands = self.pause_all();
        self.dispatch(commands);
    }

    /// Per-frame callback. Advances the playhead first, then aligns sources.
    pub fn tick(&mut self, model: &SegmentModel, audio: &AudioRegistry) -> FrameOutcome {
        if self.state != PlaybackState::Playing {
            return FrameOutcome::default();
        }
        let now = self.clock.now();
        let dt = now - self.last_frame;
        self.last_frame = now;
        if !(dt > 0.0 && dt < MAX_FRAME_DELTA) {
            log::debug!("Skipping frame delta {:.3}s", dt);
            self.sync(model, audio);
            return FrameOutcome::default();
        }

        let bound = self.end_bound();
        self.playhead += dt * self.master_rate;
        if self.playhead >= bound {
            self.playhead = bound;
            self.state = PlaybackState::Stopped;
            log::info!("Playback reached end at {:.3}s", bound);
            let commands = self.pause_all();
            self.dispatch(commands);
            return FrameOutcome {
                advanced: true,
                reached_end: true,
            };
        }
        self.sync(model, audio);
        FrameOutcome {
            advanced: true,
            reached_end: false,
        }
    }

    /// Click-to-seek: stops playback and parks every source at its offset.
    pub fn seek(&mut self, time: f64, model: &SegmentModel, audio: &AudioRegistry) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Stopped;
        }
        self.park_at(time, model, audio);
    }

    pub fn seek_pixel(&mut self, px: f64, mapper: &TimeMapper, model: &SegmentModel, audio: &AudioRegistry) {
        self.seek(mapper.pixel_to_time(px), model, audio);
    }

    pub fn begin_scrub(&mut self) {
        self.state = PlaybackState::Scrubbing;
        let commands = self.pause_all();
        self.dispatch(commands);
    }

    pub fn scrub_to(&mut self, time: f64, model: &SegmentModel, audio: &AudioRegistry) {
        if self.state != PlaybackState::Scrubbing {
            self.begin_scrub();
        }
        self.park_at(time, model, audio);
    }

    pub fn end_scrub(&mut self) {
        if self.state == PlaybackState::Scrubbing {
            self.state = PlaybackState::Stopped;
        }
    }

    /// Stops the frame loop and releases every source (editor closed or
    /// project switched).
    pub fn shutdown(&mut self) {
        self.state = PlaybackState::Stopped;
        let mut commands = Vec::with_capacity(self.slots.len());
        for id in self.slots.keys() {
            commands.push(SourceCommand::Release { id: id.clone() });
        }
        self.slots.clear();
        log::info!("Playback shut down, released {} sources", commands.len());
        self.dispatch(commands);
    }

    fn park_at(&mut self, time: f64, model: &SegmentModel, audio: &AudioRegistry) {
        self.playhead = if time.is_nan() {
            0.0
        } else {
            time.clamp(0.0, self.duration)
        };
        let mut commands = self.reconcile_slots(model, audio);
        let active: Vec<&Segment> = model.segments_at(self.playhead);
        for seg in &active {
            let Some(url) = audio.url(&seg.id) else {
                continue;
            };
            self.ensure_loaded(&seg.id, url, &mut commands);
            let offset = local_offset(seg, self.playhead);
            if let Some(slot) = self.slots.get_mut(&seg.id) {
                if slot.state == SourceState::Playing {
                    commands.push(SourceCommand::Pause { id: seg.id.clone() });
                    slot.state = SourceState::Loaded;
                }
            }
            commands.push(SourceCommand::Seek {
                id: seg.id.clone(),
                offset,
            });
        }
        commands.extend(self.pause_all());
        log::debug!("Parked at {:.3}s ({} active)", self.playhead, active.len());
        self.dispatch(commands);
    }

    /// Aligns sources with the current playhead while playing.
    fn sync(&mut self, model: &SegmentModel, audio: &AudioRegistry) {
        let mut commands = self.reconcile_slots(model, audio);
        let playhead = self.playhead;
        let active: Vec<&Segment> = model.segments_at(playhead);

        for seg in &active {
            let Some(url) = audio.url(&seg.id) else {
                continue;
            };
            self.ensure_loaded(&seg.id, url, &mut commands);
            let offset = local_offset(seg, playhead);
            let rate = seg.playback_rate * self.master_rate;
            let Some(slot) = self.slots.get_mut(&seg.id) else {
                continue;
            };
            match slot.state {
                SourceState::Loaded => {
                    commands.push(SourceCommand::Seek {
                        id: seg.id.clone(),
                        offset,
                    });
                    commands.push(SourceCommand::Play {
                        id: seg.id.clone(),
                        offset,
                        rate,
                    });
                    slot.state = SourceState::Playing;
                    slot.started_at = (seg.start, rate);
                }
                SourceState::Playing if slot.is_stale(seg.start, rate) => {
                    // Segment moved or re-timed while sounding.
                    log::debug!("Realign {} at {:.3}s x{:.2}", seg.id, offset, rate);
                    commands.push(SourceCommand::Seek {
                        id: seg.id.clone(),
                        offset,
                    });
                    commands.push(SourceCommand::Play {
                        id: seg.id.clone(),
                        offset,
                        rate,
                    });
                    slot.started_at = (seg.start, rate);
                }
                SourceState::Playing => {
                    if let Some(position) = self.backend.position(&seg.id) {
                        if (position - offset).abs() > self.drift_tolerance {
                            log::debug!(
                                "Resync {} drift {:.3}s",
                                seg.id,
                                position - offset
                            );
                            commands.push(SourceCommand::Seek {
                                id: seg.id.clone(),
                                offset,
                            });
                        }
                    }
                }
            }
        }

        // Pre-buffer segments about to start so they are ready at the edge.
        let horizon = playhead + self.preroll;
        for seg in model.segments() {
            if seg.start > playhead && seg.start <= horizon && !self.slots.contains_key(&seg.id) {
                if let Some(url) = audio.url(&seg.id) {
                    self.ensure_loaded(&seg.id, url, &mut commands);
                    commands.push(SourceCommand::Seek {
                        id: seg.id.clone(),
                        offset: 0.0,
                    });
                }
            }
        }

        for (id, slot) in self.slots.iter_mut() {
            if slot.state == SourceState::Playing && !active.iter().any(|s| &s.id == id) {
                commands.push(SourceCommand::Pause { id: id.clone() });
                slot.state = SourceState::Loaded;
            }
        }
        self.dispatch(commands);
    }

    /// Releases sources whose segment vanished or whose URL changed.
    fn reconcile_slots(&mut self, model: &SegmentModel, audio: &AudioRegistry) -> Vec<SourceCommand> {
        let mut commands = Vec::new();
        self.slots.retain(|id, slot| {
            let keep = model.segment(id).is_some() && audio.url(id) == Some(slot.url.as_str());
            if !keep {
                commands.push(SourceCommand::Release { id: id.clone() });
            }
            keep
        });
        commands
    }

    fn ensure_loaded(&mut self, id: &SegmentId, url: &str, commands: &mut Vec<SourceCommand>) {
        if self.slots.contains_key(id) {
            return;
        }
        commands.push(SourceCommand::Load {
            id: id.clone(),
            url: url.to_string(),
        });
        self.slots.insert(
            id.clone(),
            SourceSlot {
                url: url.to_string(),
                state: SourceState::Loaded,
                started_at: (0.0, 1.0),
            },
        );
    }

    fn pause_all(&mut self) -> Vec<SourceCommand> {
        let mut commands = Vec::new();
        for (id, slot) in self.slots.iter_mut() {
            if slot.state == SourceState::Playing {
                commands.push(SourceCommand::Pause { id: id.clone() });
                slot.state = SourceState::Loaded;
            }
        }
        commands
    }

    /// Issues one frame's commands back to back.
    fn dispatch(&mut self, commands: Vec<SourceCommand>) {
        for command in &commands {
            match command {
                SourceCommand::Load { id, url } => self.backend.load(id, url),
                SourceCommand::Play { id, offset, rate } => self.backend.play(id, *offset, *rate),
                SourceCommand::Pause { id } => self.backend.pause(id),
                SourceCommand::Seek { id, offset } => self.backend.seek(id, *offset),
                SourceCommand::Release { id } => self.backend.release(id),
            }
        }
        self.last_commands = commands;
    }
}

/// Offset into a segment's audio for a timeline position.
pub fn local_offset(segment: &Segment, playhead: f64) -> f64 {
    ((playhead - segment.start) * segment.playback_rate).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioResolution;
    use crate::structure::SeedSegment;
    use std::cell::RefCell;

    #[derive(Clone, Default)]
    struct RecordingBackend {
        log: Rc<RefCell<Vec<SourceCommand>>>,
    }

    impl AudioBackend for RecordingBackend {
        fn load(&mut self, id: &SegmentId, url: &str) {
            self.log.borrow_mut().push(SourceCommand::Load {
                id: id.clone(),
                url: url.to_string(),
            });
        }
        fn play(&mut self, id: &SegmentId, offset: f64, rate: f64) {
            self.log.borrow_mut().push(SourceCommand::Play {
                id: id.clone(),
                offset,
                rate,
            });
        }
        fn pause(&mut self, id: &SegmentId) {
            self.log.borrow_mut().push(SourceCommand::Pause { id: id.clone() });
        }
        fn seek(&mut self, id: &SegmentId, offset: f64) {
            self.log.borrow_mut().push(SourceCommand::Seek {
                id: id.clone(),
                offset,
            });
        }
        fn position(&self, _id: &SegmentId) -> Option<f64> {
            None
        }
        fn release(&mut self, id: &SegmentId) {
            self.log.borrow_mut().push(SourceCommand::Release { id: id.clone() });
        }
    }

    fn seed(id: &str, speaker: &str, start: f64, end: f64) -> SeedSegment {
        SeedSegment {
            id: id.into(),
            speaker: speaker.into(),
            start,
            end,
            source_text: String::new(),
            target_text: String::new(),
            audio_ref: Some(id.into()),
            playback_rate: None,
        }
    }

    fn setup() -> (SegmentModel, AudioRegistry) {
        let model = SegmentModel::from_seed(
            vec![
                seed("a1", "A", 0.0, 2.0),
                seed("a2", "A", 3.0, 5.0),
                seed("b1", "B", 1.0, 4.0),
            ],
            10.0,
            0.05,
        )
        .unwrap();
        let mut audio = AudioRegistry::new();
        for ticket in audio.sync(&model) {
            let url = format!("{}.wav", ticket.audio_ref);
            audio.complete(AudioResolution {
                ticket,
                result: Ok(url),
            });
        }
        (model, audio)
    }

    fn synchronizer(clock: &ManualClock, backend: &RecordingBackend) -> PlaybackSynchronizer {
        PlaybackSynchronizer::new(10.0, Box::new(clock.clone()), Box::new(backend.clone()), 0.25, 0.08)
    }

    #[test]
    fn playback_stops_exactly_at_duration() {
        let (model, audio) = setup();
        let clock = ManualClock::new();
        let mut sync = synchronizer(&clock, &RecordingBackend::default());
        sync.seek(9.99, &model, &audio);
        sync.play(&model, &audio);
        clock.advance(1.0 / 60.0);
        let outcome = sync.tick(&model, &audio);
        assert!(outcome.reached_end);
        assert_eq!(sync.playhead(), 10.0);
        assert!(!sync.is_playing());
        clock.advance(1.0 / 60.0);
        assert_eq!(sync.tick(&model, &audio), FrameOutcome::default());
        assert_eq!(sync.playhead(), 10.0);
    }

    #[test]
    fn stop_bound_halts_early() {
        let (model, audio) = setup();
        let clock = ManualClock::new();
        let mut sync = synchronizer(&clock, &RecordingBackend::default());
        sync.set_stop_bound(Some(0.5));
        sync.play(&model, &audio);
        for _ in 0..60 {
            clock.advance(0.02);
            sync.tick(&model, &audio);
        }
        assert_eq!(sync.playhead(), 0.5);
        assert_eq!(sync.state(), PlaybackState::Stopped);
    }

    #[test]
    fn active_sources_start_in_one_batch() {
        let (model, audio) = setup();
        let clock = ManualClock::new();
        let backend = RecordingBackend::default();
        let mut sync = synchronizer(&clock, &backend);
        sync.seek(1.5, &model, &audio);
        backend.log.borrow_mut().clear();

        sync.play(&model, &audio);
        let plays: Vec<_> = sync
            .last_commands()
            .iter()
            .filter_map(|c| match c {
                SourceCommand::Play { id, offset, .. } => Some((id.as_str().to_string(), *offset)),
                _ => None,
            })
            .collect();
        assert_eq!(plays.len(), 2);
        assert!(plays.contains(&("a1".to_string(), 1.5)));
        assert!(plays.contains(&("b1".to_string(), 0.5)));
        assert_eq!(*backend.log.borrow(), sync.last_commands().to_vec());
    }

    #[test]
    fn leaving_a_segment_pauses_its_source() {
        let (model, audio) = setup();
        let clock = ManualClock::new();
        let backend = RecordingBackend::default();
        let mut sync = synchronizer(&clock, &backend);
        sync.seek(1.9, &model, &audio);
        sync.play(&model, &audio);
        clock.advance(0.2);
        sync.tick(&model, &audio);
        assert!(sync
            .last_commands()
            .contains(&SourceCommand::Pause { id: "a1".into() }));
        assert!(!sync
            .last_commands()
            .iter()
            .any(|c| matches!(c, SourceCommand::Pause { id } if id.as_str() == "b1")));
    }

    #[test]
    fn upcoming_segment_is_prebuffered() {
        let (model, audio) = setup();
        let clock = ManualClock::new();
        let backend = RecordingBackend::default();
        let mut sync = synchronizer(&clock, &backend);
        sync.seek(2.8, &model, &audio);
        sync.play(&model, &audio);
        assert!(sync.last_commands().contains(&SourceCommand::Load {
            id: "a2".into(),
            url: "a2.wav".into()
        }));
        clock.advance(0.25);
        sync.tick(&model, &audio);
        let play_a2 = sync.last_commands().iter().find_map(|c| match c {
            SourceCommand::Play { id, offset, .. } if id.as_str() == "a2" => Some(*offset),
            _ => None,
        });
        assert!((play_a2.unwrap() - 0.05).abs() < 1e-9);
        // already loaded during preroll
        assert!(!sync
            .last_commands()
            .iter()
            .any(|c| matches!(c, SourceCommand::Load { .. })));
    }

    #[test]
    fn seek_stops_and_parks_sources() {
        let (model, audio) = setup();
        let clock = ManualClock::new();
        let mut sync = synchronizer(&clock, &RecordingBackend::default());
        sync.play(&model, &audio);
        sync.seek(3.5, &model, &audio);
        assert!(!sync.is_playing());
        assert_eq!(sync.playhead(), 3.5);
        let seeks: Vec<_> = sync
            .last_commands()
            .iter()
            .filter_map(|c| match c {
                SourceCommand::Seek { id, offset } => Some((id.as_str().to_string(), *offset)),
                _ => None,
            })
            .collect();
        assert!(seeks.contains(&("a2".to_string(), 0.5)));
        assert!(seeks.contains(&("b1".to_string(), 2.5)));
        assert!(sync
            .last_commands()
            .contains(&SourceCommand::Pause { id: "a1".into() }));

        sync.seek(-4.0, &model, &audio);
        assert_eq!(sync.playhead(), 0.0);
    }

    #[test]
    fn scrubbing_keeps_sources_silent() {
        let (model, audio) = setup();
        let clock = ManualClock::new();
        let mut sync = synchronizer(&clock, &RecordingBackend::default());
        sync.play(&model, &audio);
        sync.begin_scrub();
        sync.scrub_to(1.2, &model, &audio);
        assert_eq!(sync.state(), PlaybackState::Scrubbing);
        assert!(!sync
            .last_commands()
            .iter()
            .any(|c| matches!(c, SourceCommand::Play { .. })));
        clock.advance(0.5);
        sync.tick(&model, &audio);
        assert_eq!(sync.playhead(), 1.2);
        sync.end_scrub();
        assert_eq!(sync.state(), PlaybackState::Stopped);
    }

    #[test]
    fn segment_rate_scales_offset_and_speed() {
        let mut seg = Segment::new("x", crate::structure::TrackId(1), 2.0, 6.0);
        seg.playback_rate = 1.5;
        assert_eq!(local_offset(&seg, 4.0), 3.0);
        assert_eq!(local_offset(&seg, 1.0), 0.0);
    }

    #[test]
    fn moving_a_sounding_segment_realigns_its_source() {
        let (mut model, audio) = setup();
        let clock = ManualClock::new();
        let mut sync = synchronizer(&clock, &RecordingBackend::default());
        sync.seek(1.0, &model, &audio);
        sync.play(&model, &audio);

        let track_a = model.segment(&"a1".into()).unwrap().track_id;
        model.move_segment(&"a1".into(), track_a, 0.5);
        clock.advance(0.1);
        sync.tick(&model, &audio);

        let commands = sync.last_commands();
        let seek = commands.iter().find_map(|c| match c {
            SourceCommand::Seek { id, offset } if id.as_str() == "a1" => Some(*offset),
            _ => None,
        });
        let play = commands.iter().find_map(|c| match c {
            SourceCommand::Play { id, offset, rate } if id.as_str() == "a1" => Some((*offset, *rate)),
            _ => None,
        });
        assert!((seek.unwrap() - 0.6).abs() < 1e-9);
        let (offset, rate) = play.unwrap();
        assert!((offset - 0.6).abs() < 1e-9);
        assert_eq!(rate, 1.0);
        // b1 did not change, so it keeps playing untouched.
        assert!(!commands.iter().any(|c| matches!(
            c,
            SourceCommand::Seek { id, .. } | SourceCommand::Play { id, .. } if id.as_str() == "b1"
        )));

        clock.advance(0.1);
        sync.tick(&model, &audio);
        assert!(sync.last_commands().is_empty());
    }

    #[test]
    fn rate_change_on_a_sounding_segment_restarts_it_at_the_new_speed() {
        let (mut model, audio) = setup();
        let clock = ManualClock::new();
        let mut sync = synchronizer(&clock, &RecordingBackend::default());
        sync.seek(1.5, &model, &audio);
        sync.play(&model, &audio);

        let patch = crate::model::SegmentPatch {
            playback_rate: Some(1.25),
            ..Default::default()
        };
        model.update_segment(&"b1".into(), patch).unwrap();
        clock.advance(0.1);
        sync.tick(&model, &audio);

        let play = sync.last_commands().iter().find_map(|c| match c {
            SourceCommand::Play { id, offset, rate } if id.as_str() == "b1" => Some((*offset, *rate)),
            _ => None,
        });
        let (offset, rate) = play.unwrap();
        assert!((offset - 0.75).abs() < 1e-9);
        assert_eq!(rate, 1.25);
    }

    #[test]
    fn master_rate_scales_playhead_advance() {
        let (model, audio) = setup();
        let clock = ManualClock::new();
        let mut sync = synchronizer(&clock, &RecordingBackend::default());
        sync.set_master_rate(2.0);
        sync.play(&model, &audio);
        clock.advance(0.1);
        sync.tick(&model, &audio);
        assert!((sync.playhead() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn unresolved_audio_is_silent() {
        let (model, _) = setup();
        let audio = AudioRegistry::new();
        let clock = ManualClock::new();
        let mut sync = synchronizer(&clock, &RecordingBackend::default());
        sync.play(&model, &audio);
        clock.advance(0.1);
        sync.tick(&model, &audio);
        assert!(sync.is_playing());
        assert!(sync.last_commands().is_empty());
    }

    #[test]
    fn shutdown_releases_everything() {
        let (model, audio) = setup();
        let clock = ManualClock::new();
        let mut sync = synchronizer(&clock, &RecordingBackend::default());
        sync.seek(1.5, &model, &audio);
        sync.play(&model, &audio);
        sync.shutdown();
        assert!(!sync.is_playing());
        let released = sync
            .last_commands()
            .iter()
            .filter(|c| matches!(c, SourceCommand::Release { .. }))
            .count();
        assert_eq!(released, 2);
    }
}
