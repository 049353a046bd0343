//! 数据结构模块
//!
//! Track / Segment data model shared by every engine: ids, the segment span,
//! speaker lanes and the seed record supplied by the host when a session opens.

use egui::Color32;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// Color32 序列化辅助类型
#[derive(Serialize, Deserialize)]
struct Color32Helper {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

impl From<Color32> for Color32Helper {
    fn from(color: Color32) -> Self {
        Self {
            r: color.r(),
            g: color.g(),
            b: color.b(),
            a: color.a(),
        }
    }
}

impl From<Color32Helper> for Color32 {
    fn from(helper: Color32Helper) -> Self {
        Color32::from_rgba_unmultiplied(helper.r, helper.g, helper.b, helper.a)
    }
}

fn serialize_color32<S>(color: &Color32, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    Color32Helper::from(*color).serialize(serializer)
}

fn deserialize_color32<'de, D>(deserializer: D) -> Result<Color32, D::Error>
where
    D: Deserializer<'de>,
{
    let helper = Color32Helper::deserialize(deserializer)?;
    Ok(Color32::from(helper))
}

static TRACK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static SEGMENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl TrackId {
    pub fn next() -> Self {
        TrackId(TRACK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Keeps freshly allocated ids clear of ids restored from disk.
    pub(crate) fn reserve(self) {
        TRACK_ID_COUNTER.fetch_max(self.0 + 1, Ordering::Relaxed);
    }
}

/// Segment identity. Seeded segments keep the id the host gave them;
/// segments created by a split get a fresh `seg-auto-N` id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub String);

impl SegmentId {
    pub fn next() -> Self {
        SegmentId(format!(
            "seg-auto-{}",
            SEGMENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SegmentId {
    fn from(value: &str) -> Self {
        SegmentId(value.to_string())
    }
}

impl From<String> for SegmentId {
    fn from(value: String) -> Self {
        SegmentId(value)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub track_id: TrackId,
    pub start: f64, // 秒
    pub end: f64,   // 秒
    pub source_text: String,
    pub target_text: String,
    /// Opaque key resolved by the host into a playable URL. `None` means the
    /// dubbed audio has not been generated yet.
    pub audio_ref: Option<String>,
    pub playback_rate: f64,
}

impl Segment {
    pub fn new(id: impl Into<SegmentId>, track_id: TrackId, start: f64, end: f64) -> Self {
        Self {
            id: id.into(),
            track_id,
            start,
            end,
            source_text: String::new(),
            target_text: String::new(),
            audio_ref: None,
            playback_rate: 1.0,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Half-open containment: `[start, end)`.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }

    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.start < end && start < self.end
    }

    /// Bounds edits are locked once the rate has been overridden.
    pub fn is_rate_locked(&self) -> bool {
        self.playback_rate != 1.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Speaker,
    Waveform,
    Muted,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub label: String,
    #[serde(serialize_with = "serialize_color32", deserialize_with = "deserialize_color32")]
    pub color: Color32,
    pub kind: TrackKind,
    /// Sorted by `start`, pairwise non-overlapping.
    pub segments: Vec<Segment>,
}

impl Track {
    pub fn new_speaker(label: String, color: Color32) -> Self {
        Self {
            id: TrackId::next(),
            label,
            color,
            kind: TrackKind::Speaker,
            segments: Vec::new(),
        }
    }

    /// Passive visualisation lane; never holds segments.
    pub fn new_lane(kind: TrackKind, label: String) -> Self {
        Self {
            id: TrackId::next(),
            label,
            color: Color32::from_gray(90),
            kind,
            segments: Vec::new(),
        }
    }

    pub fn is_speaker(&self) -> bool {
        self.kind == TrackKind::Speaker
    }

    pub fn segment(&self, id: &SegmentId) -> Option<&Segment> {
        self.segments.iter().find(|s| &s.id == id)
    }

    pub(crate) fn sort_segments(&mut self) {
        self.segments
            .sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));
    }
}

/// Zoom and scroll of the editor view. Playhead and transport state live in
/// the playback synchroniser.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimelineState {
    pub duration: f64,  // 总时长（秒），会话内固定
    pub scale: f64,     // 缩放系数
    pub scroll_px: f32, // 水平滚动偏移（像素）
}

impl TimelineState {
    pub fn new(duration: f64) -> Self {
        Self {
            duration: duration.max(0.0),
            scale: 1.0,
            scroll_px: 0.0,
        }
    }
}

/// One entry of the host-supplied segment list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeedSegment {
    pub id: String,
    pub speaker: String,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub source_text: String,
    #[serde(default)]
    pub target_text: String,
    #[serde(default)]
    pub audio_ref: Option<String>,
    #[serde(default)]
    pub playback_rate: Option<f64>,
}

const TRACK_PALETTE: [Color32; 6] = [
    Color32::from_rgb(100, 200, 100),
    Color32::from_rgb(150, 150, 250),
    Color32::from_rgb(240, 160, 80),
    Color32::from_rgb(220, 110, 160),
    Color32::from_rgb(90, 190, 210),
    Color32::from_rgb(200, 200, 90),
];

/// Stable per-track colour by lane order.
pub fn track_color(index: usize) -> Color32 {
    TRACK_PALETTE[index % TRACK_PALETTE.len()]
}
