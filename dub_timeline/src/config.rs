//! 配置模块
//!
//! Tunable constants for geometry, gestures, playback and layout.

use crate::error::LoadError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Pixel density at `scale == 1.0`.
    pub pixels_per_second: f64,
    pub scale_min: f64,
    pub scale_max: f64,
    /// Minimum segment duration ε in seconds.
    pub min_segment_duration: f64,
    /// Width of the exclusive resize zone at each segment edge.
    pub edge_handle_px: f32,
    /// How far ahead of the playhead upcoming segments are prepared.
    pub preroll_seconds: f64,
    /// Allowed gap between a playing source and the playhead before a re-seek.
    pub drift_tolerance: f64,
    pub waveform_px_per_sample: f32,
    pub track_height: f32,
    pub track_header_width: f32,
    pub ruler_height: f32,
    pub min_segment_width_px: f32,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            pixels_per_second: 100.0,
            scale_min: 0.35,
            scale_max: 2.0,
            min_segment_duration: 0.05,
            edge_handle_px: 8.0,
            preroll_seconds: 0.25,
            drift_tolerance: 0.08,
            waveform_px_per_sample: 2.0,
            track_height: 72.0,
            track_header_width: 160.0,
            ruler_height: 32.0,
            min_segment_width_px: 4.0,
        }
    }
}

impl TimelineConfig {
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let json_content = fs::read_to_string(path)?;
        let config: TimelineConfig = serde_json::from_str(&json_content)?;
        if config.scale_min <= 0.0 || config.scale_min > config.scale_max {
            return Err(LoadError::InvalidConfig(format!(
                "scale range {}..{}",
                config.scale_min, config.scale_max
            )));
        }
        if config.pixels_per_second <= 0.0 || config.min_segment_duration <= 0.0 {
            return Err(LoadError::InvalidConfig(
                "pixel density and minimum duration must be positive".into(),
            ));
        }
        Ok(config)
    }

    pub fn clamp_scale(&self, scale: f64) -> f64 {
        if scale.is_nan() {
            return 1.0_f64.clamp(self.scale_min, self.scale_max);
        }
        scale.clamp(self.scale_min, self.scale_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: TimelineConfig = serde_json::from_str(r#"{ "scale_max": 4.0 }"#).unwrap();
        assert_eq!(config.scale_max, 4.0);
        assert_eq!(config.scale_min, 0.35);
        assert_eq!(config.edge_handle_px, 8.0);
    }

    #[test]
    fn scale_is_clamped_to_bounds() {
        let config = TimelineConfig::default();
        assert_eq!(config.clamp_scale(10.0), 2.0);
        assert_eq!(config.clamp_scale(0.0), 0.35);
        assert_eq!(config.clamp_scale(f64::NAN), 1.0);
    }
}
