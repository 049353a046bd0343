//! Toolbar module
//!
//! Transport controls, time display, zoom and master rate, plus split/merge
//! for the selected segment.

use crate::editor::TimelineCommand;
use crate::structure::{SegmentId, TrackId};
use crate::utils::format_time;
use egui::*;

pub struct Toolbar {
    is_playing: bool,
    current_time: f64,
    duration: f64,
    scale: f64,
    scale_range: (f64, f64),
    master_rate: f64,
    split: Option<(SegmentId, f64)>,
    merge: Option<(SegmentId, SegmentId, TrackId)>,
}

impl Toolbar {
    pub fn new(duration: f64, scale: f64, scale_range: (f64, f64)) -> Self {
        Self {
            is_playing: false,
            current_time: 0.0,
            duration,
            scale,
            scale_range,
            master_rate: 1.0,
            split: None,
            merge: None,
        }
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.is_playing = playing;
    }

    pub fn set_current_time(&mut self, time: f64) {
        self.current_time = time;
    }

    pub fn set_master_rate(&mut self, rate: f64) {
        self.master_rate = rate;
    }

    /// Enables "Split" for a segment at the playhead.
    pub fn set_split_target(&mut self, target: Option<(SegmentId, f64)>) {
        self.split = target;
    }

    /// Enables "Merge" for a touching pair.
    pub fn set_merge_target(&mut self, target: Option<(SegmentId, SegmentId, TrackId)>) {
        self.merge = target;
    }

    pub fn ui(&mut self, ui: &mut Ui, command_callback: &mut dyn FnMut(TimelineCommand)) {
        ui.horizontal(|ui| {
            ui.label(
                RichText::new(format!(
                    "{} / {}",
                    format_time(self.current_time),
                    format_time(self.duration)
                ))
                .monospace(),
            );
            ui.separator();

            if ui
                .button(if self.is_playing { "⏸ Pause" } else { "▶ Play" })
                .clicked()
            {
                command_callback(if self.is_playing {
                    TimelineCommand::Pause
                } else {
                    TimelineCommand::Play
                });
            }
            if ui.button("⏹ Stop").clicked() {
                command_callback(TimelineCommand::Seek { time: 0.0 });
            }

            ui.separator();

            ui.label("Zoom:");
            if ui.small_button("−").clicked() {
                command_callback(TimelineCommand::ZoomBy { factor: 1.0 / 1.25 });
            }
            let mut scale = self.scale;
            if ui
                .add(
                    Slider::new(&mut scale, self.scale_range.0..=self.scale_range.1)
                        .show_value(false),
                )
                .changed()
            {
                command_callback(TimelineCommand::SetScale { scale });
            }
            if ui.small_button("+").clicked() {
                command_callback(TimelineCommand::ZoomBy { factor: 1.25 });
            }

            ui.separator();

            ui.label("Rate:");
            let mut rate = self.master_rate;
            if ui
                .add(DragValue::new(&mut rate).speed(0.01).range(0.25..=4.0).suffix("×"))
                .changed()
            {
                command_callback(TimelineCommand::SetMasterRate { rate });
            }

            ui.separator();

            let split = ui.add_enabled(self.split.is_some(), Button::new("✂ Split"));
            if split.clicked() {
                if let Some((segment_id, at)) = self.split.clone() {
                    command_callback(TimelineCommand::SplitSegment { segment_id, at });
                }
            }
            let merge = ui.add_enabled(self.merge.is_some(), Button::new("⛓ Merge next"));
            if merge.clicked() {
                if let Some((first, second, track_id)) = self.merge.clone() {
                    command_callback(TimelineCommand::MergeSegments {
                        segment_ids: vec![first, second],
                        track_id,
                    });
                }
            }
        });
    }
}
