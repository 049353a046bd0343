//! # dub_timeline
//!
//! 配音时间轴编辑器核心：多说话人音轨上的片段编辑与同步播放。
//!
//! ## 功能特性
//!
//! - **片段模型**：按说话人分轨，同轨片段互不重叠且按起点排序
//! - **编辑操作**：拖拽换轨、边缘调整、分割与合并
//! - **播放同步**：单一播放头驱动每个片段的音源，支持拖动预览与全局倍速
//! - **波形缓存**：异步解码，按片段宽度与可见性决定采样数
//!
//! ## 基本使用
//!
//! ```ignore
//! use dub_timeline::{TimelineConfig, TimelineEditor, NullBackend};
//!
//! let mut editor = TimelineEditor::from_seed(
//!     seed,
//!     120.0,
//!     TimelineConfig::default(),
//!     Box::new(NullBackend),
//! )?;
//!
//! // 在 egui UI 中使用
//! editor.ui(ui);
//! ```
//!
//! ## 集成到宿主应用
//!
//! ```ignore
//! use dub_timeline::{TimelineCommand, TimelineEvent};
//!
//! editor.set_event_listener(Box::new(|event| {
//!     if let TimelineEvent::SegmentMoved { segment_id, .. } = event {
//!         save_segment(segment_id);
//!     }
//! }));
//!
//! // 宿主负责解析音频引用与解码波形
//! for ticket in editor.take_audio_tickets() { /* ... */ }
//! for request in editor.take_waveform_requests() { /* ... */ }
//!
//! editor.execute_command(TimelineCommand::Play)?;
//! ```

pub mod audio;
pub mod config;
pub mod drag;
pub mod editor;
pub mod error;
pub mod mapper;
pub mod model;
pub mod playback;
pub mod project;
pub mod resize;
pub mod split_merge;
pub mod structure;
pub mod ui;
pub mod utils;
pub mod waveform;

pub use audio::{AudioResolution, AudioStatus, AudioTicket};
pub use config::TimelineConfig;
pub use drag::{DragOutcome, DragPreview, HitRegion, TrackLayout};
pub use editor::{TimelineCommand, TimelineEditor, TimelineEvent};
pub use error::{LoadError, Rejection};
pub use mapper::TimeMapper;
pub use model::{SegmentModel, SegmentPatch};
pub use playback::{
    AudioBackend, Clock, InstantClock, ManualClock, NullBackend, PlaybackState, SourceCommand,
};
pub use project::SessionSnapshot;
pub use resize::ResizeEdge;
pub use structure::{SeedSegment, Segment, SegmentId, TimelineState, Track, TrackId, TrackKind};
pub use waveform::{WaveformRequest, WaveformResponse, WaveformState};
