//! 会话快照模块
//!
//! 保存和加载当前的轨道/片段快照。

use crate::error::LoadError;
use crate::model::SegmentModel;
use crate::structure::{TimelineState, Track};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const SNAPSHOT_VERSION: &str = "1.0";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: String,
    pub duration: f64,
    pub scale: f64,
    pub tracks: Vec<Track>,
}

impl SessionSnapshot {
    pub fn new(timeline: &TimelineState, tracks: Vec<Track>) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            duration: timeline.duration,
            scale: timeline.scale,
            tracks,
        }
    }

    /// 保存快照到指定路径（JSON）
    pub fn save_to_path(&self, path: &Path) -> Result<(), LoadError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json_content = serde_json::to_string_pretty(self)?;
        fs::write(path, json_content)?;
        log::info!("Saved session snapshot to {}", path.display());
        Ok(())
    }

    /// 从指定路径加载快照
    pub fn load_from_path(path: &Path) -> Result<Self, LoadError> {
        let json_content = fs::read_to_string(path)?;
        let snapshot: SessionSnapshot = serde_json::from_str(&json_content)?;
        if snapshot.version != SNAPSHOT_VERSION {
            log::warn!(
                "Snapshot version {} differs from {}, loading anyway",
                snapshot.version,
                SNAPSHOT_VERSION
            );
        }
        Ok(snapshot)
    }

    /// Rebuilds a model, re-checking every invariant.
    pub fn into_model(self, min_duration: f64) -> Result<(SegmentModel, f64), LoadError> {
        let model = SegmentModel::from_tracks(self.tracks, self.duration, min_duration)?;
        Ok((model, self.scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{SeedSegment, TrackKind};
    use std::env;

    fn sample_model() -> SegmentModel {
        let seed = |id: &str, speaker: &str, start: f64, end: f64| SeedSegment {
            id: id.into(),
            speaker: speaker.into(),
            start,
            end,
            source_text: "hello".into(),
            target_text: "hola".into(),
            audio_ref: None,
            playback_rate: Some(1.0),
        };
        let mut model = SegmentModel::from_seed(
            vec![seed("a", "A", 0.0, 2.0), seed("b", "B", 1.0, 3.0)],
            10.0,
            0.05,
        )
        .unwrap();
        model.add_lane(TrackKind::Waveform, "Original".into());
        model
    }

    #[test]
    fn snapshot_survives_disk() {
        let model = sample_model();
        let mut timeline = TimelineState::new(model.duration());
        timeline.scale = 1.5;
        let snapshot = SessionSnapshot::new(&timeline, model.snapshot());

        let path = env::temp_dir().join(format!("dub_timeline_snapshot_{}.json", std::process::id()));
        snapshot.save_to_path(&path).unwrap();
        let loaded = SessionSnapshot::load_from_path(&path).unwrap();
        let _ = fs::remove_file(&path);

        let (restored, scale) = loaded.into_model(0.05).unwrap();
        assert_eq!(scale, 1.5);
        assert_eq!(restored.tracks().len(), 3);
        assert_eq!(restored.tracks()[0].color, model.tracks()[0].color);
        let a = restored.segment(&"a".into()).unwrap();
        assert_eq!((a.start, a.end), (0.0, 2.0));
        assert_eq!(a.target_text, "hola");
    }

    #[test]
    fn corrupted_snapshot_is_rejected() {
        let model = sample_model();
        let mut tracks = model.snapshot();
        tracks[0].segments[0].end = 50.0;
        let snapshot = SessionSnapshot {
            version: SNAPSHOT_VERSION.into(),
            duration: 10.0,
            scale: 1.0,
            tracks,
        };
        assert!(matches!(
            snapshot.into_model(0.05),
            Err(LoadError::OutOfRange { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SessionSnapshot::load_from_path(Path::new("/nonexistent/dub/session.json"));
        assert!(matches!(err, Err(LoadError::Io(_))));
    }
}
