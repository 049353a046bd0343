//! 波形缓存
//!
//! Lazily produced amplitude arrays per segment. A request is only issued for
//! a visible segment, sized from its current pixel width; while the segment
//! is being resized the size is frozen so the gesture does not trigger a
//! decode per pixel. Decoding happens elsewhere and reports back over the
//! cache's channel; late answers for superseded requests are dropped.

use crate::mapper::TimeMapper;
use crate::structure::{Segment, SegmentId};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;

const MAX_SAMPLES: usize = 4096;

#[derive(Clone, Debug, PartialEq)]
pub struct WaveformRequest {
    pub segment_id: SegmentId,
    pub url: String,
    pub sample_count: usize,
    pub generation: u64,
}

#[derive(Clone, Debug)]
pub struct WaveformResponse {
    pub request: WaveformRequest,
    pub result: Result<Vec<f32>, String>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WaveformState<'a> {
    Missing,
    /// Carries the previous waveform, if any, to draw until the new one lands.
    Loading(Option<&'a [f32]>),
    Ready(&'a [f32]),
    Failed,
}

#[derive(Clone, Debug)]
enum EntryState {
    Loading,
    Ready(Vec<f32>),
    Failed,
}

#[derive(Clone, Debug)]
struct WaveformEntry {
    url: String,
    sample_count: usize,
    generation: u64,
    state: EntryState,
    previous: Option<Vec<f32>>,
}

pub struct WaveformCache {
    entries: HashMap<SegmentId, WaveformEntry>,
    /// Pinned sample count per resized segment; `None` until the first
    /// request made during the resize.
    frozen: HashMap<SegmentId, Option<usize>>,
    next_generation: u64,
    px_per_sample: f32,
    sender: Sender<WaveformResponse>,
    receiver: Receiver<WaveformResponse>,
}

impl WaveformCache {
    pub fn new(px_per_sample: f32) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            entries: HashMap::new(),
            frozen: HashMap::new(),
            next_generation: 1,
            px_per_sample: px_per_sample.max(0.5),
            sender,
            receiver,
        }
    }

    /// Channel end decoders reply on.
    pub fn completion_sender(&self) -> Sender<WaveformResponse> {
        self.sender.clone()
    }

    pub fn sample_count_for(&self, width_px: f32) -> usize {
        ((width_px / self.px_per_sample).round().max(1.0) as usize).min(MAX_SAMPLES)
    }

    /// Returns a decode request when the segment is visible and its cached
    /// waveform does not match the wanted URL and size.
    pub fn request(
        &mut self,
        segment_id: &SegmentId,
        url: &str,
        width_px: f32,
        visible: bool,
    ) -> Option<WaveformRequest> {
        if !visible {
            return None;
        }
        let sample_count = match self.frozen.get(segment_id) {
            Some(&Some(count)) => count,
            _ => self.sample_count_for(width_px),
        };
        if let Some(pinned) = self.frozen.get_mut(segment_id) {
            pinned.get_or_insert(sample_count);
        }
        if let Some(entry) = self.entries.get(segment_id) {
            if entry.url == url && entry.sample_count == sample_count {
                return None;
            }
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        let previous = self.entries.remove(segment_id).and_then(|e| match e.state {
            EntryState::Ready(samples) => Some(samples),
            _ => e.previous,
        });
        self.entries.insert(
            segment_id.clone(),
            WaveformEntry {
                url: url.to_string(),
                sample_count,
                generation,
                state: EntryState::Loading,
                previous,
            },
        );
        log::debug!("Waveform request {} x{} (gen {})", segment_id, sample_count, generation);
        Some(WaveformRequest {
            segment_id: segment_id.clone(),
            url: url.to_string(),
            sample_count,
            generation,
        })
    }

    /// Resize started: keep the current sample count until `unfreeze`.
    pub fn freeze(&mut self, segment_id: &SegmentId) {
        let count = self.entries.get(segment_id).map(|e| e.sample_count);
        self.frozen.insert(segment_id.clone(), count);
    }

    pub fn unfreeze(&mut self, segment_id: &SegmentId) {
        self.frozen.remove(segment_id);
    }

    pub fn is_frozen(&self, segment_id: &SegmentId) -> bool {
        self.frozen.contains_key(segment_id)
    }

    pub fn complete(&mut self, response: WaveformResponse) -> bool {
        let request = &response.request;
        let Some(entry) = self.entries.get_mut(&request.segment_id) else {
            log::debug!("Dropping waveform for removed segment {}", request.segment_id);
            return false;
        };
        if entry.generation != request.generation {
            log::debug!("Dropping stale waveform for {}", request.segment_id);
            return false;
        }
        entry.state = match response.result {
            Ok(samples) => {
                entry.previous = None;
                EntryState::Ready(samples)
            }
            Err(reason) => {
                log::warn!("Waveform for {} failed: {}", request.segment_id, reason);
                EntryState::Failed
            }
        };
        true
    }

    pub fn poll(&mut self) -> usize {
        let pending: Vec<WaveformResponse> = self.receiver.try_iter().collect();
        pending.into_iter().filter(|r| self.complete(r.clone())).count()
    }

    /// Drops entries for segments that no longer exist.
    pub fn retain<F: Fn(&SegmentId) -> bool>(&mut self, keep: F) {
        self.entries.retain(|id, _| keep(id));
        self.frozen.retain(|id, _| keep(id));
    }

    pub fn state(&self, segment_id: &SegmentId) -> WaveformState<'_> {
        match self.entries.get(segment_id) {
            None => WaveformState::Missing,
            Some(entry) => match &entry.state {
                EntryState::Loading => WaveformState::Loading(entry.previous.as_deref()),
                EntryState::Ready(samples) => WaveformState::Ready(samples),
                EntryState::Failed => WaveformState::Failed,
            },
        }
    }
}

/// Whether a segment lies inside the viewport, widened by `margin_px` so
/// segments about to scroll in are prepared early.
pub fn is_segment_visible(
    segment: &Segment,
    mapper: &TimeMapper,
    scroll_px: f64,
    viewport_px: f64,
    margin_px: f64,
) -> bool {
    let left = mapper.time_to_pixel(segment.start);
    let right = mapper.time_to_pixel(segment.end);
    right >= scroll_px - margin_px && left <= scroll_px + viewport_px + margin_px
}

/// Peak amplitude per bucket, normalised to 0..1 by the loudest bucket.
/// Deterministic for a given input and `count`.
pub fn normalize_peaks(samples: &[f32], count: usize) -> Vec<f32> {
    if count == 0 {
        return Vec::new();
    }
    if samples.is_empty() {
        return vec![0.0; count];
    }
    let len = samples.len();
    let mut peaks: Vec<f32> = (0..count)
        .map(|i| {
            let from = i * len / count;
            let to = ((i + 1) * len / count).max(from + 1).min(len);
            samples[from..to]
                .iter()
                .map(|s| if s.is_finite() { s.abs() } else { 0.0 })
                .fold(0.0_f32, f32::max)
        })
        .collect();
    let max = peaks.iter().copied().fold(0.0_f32, f32::max);
    if max > 0.0 {
        for peak in &mut peaks {
            *peak /= max;
        }
    }
    peaks
}
