//! UI 模块
//!
//! egui rendering of the dubbing timeline: toolbar, ruler, lane headers,
//! segments with their waveforms, the playhead and the drag preview. Pointer
//! input is translated into calls on the editor; nothing here writes to the
//! model directly.

mod ruler;
mod segment;
mod toolbar;
mod track_lane;

pub use ruler::calculate_major_interval;

use crate::drag::{hit_test, HitRegion, TrackLayout};
use crate::editor::TimelineEditor;
use crate::mapper::TimeMapper;
use crate::resize::ResizeEdge;
use crate::structure::{SegmentId, TrackId};
use egui::*;

/// View-only state: selection, gesture anchors and last frame's geometry.
#[derive(Clone, Debug, Default)]
pub(crate) struct ViewState {
    selected: Option<SegmentId>,
    resize_anchor_x: Option<f32>,
    renaming: Option<(TrackId, String)>,
    rename_needs_focus: bool,
    layouts: Vec<TrackLayout>,
    lanes_rect: Option<Rect>,
    viewport_width: f32,
}

enum LaneAction {
    BeginDrag(SegmentId, Pos2),
    BeginResize(SegmentId, ResizeEdge, f32),
    Select(Option<SegmentId>),
    Rename(TrackId, String),
}

fn segment_rect(mapper: &TimeMapper, content: Rect, scroll: f32, start: f64, end: f64, min_width: f32) -> Rect {
    let left = content.min.x + mapper.time_to_pixel(start) as f32 - scroll;
    let right = (content.min.x + mapper.time_to_pixel(end) as f32 - scroll).max(left + min_width);
    Rect::from_min_max(
        Pos2::new(left, content.min.y + 6.0),
        Pos2::new(right, content.max.y - 6.0),
    )
}

fn hit_at(rects: &[(SegmentId, Rect)], pos: Pos2, edge_px: f32) -> Option<(SegmentId, HitRegion)> {
    rects
        .iter()
        .filter(|(_, rect)| pos.y >= rect.min.y && pos.y <= rect.max.y)
        .find_map(|(id, rect)| hit_test(rect.min.x, rect.max.x, pos.x, edge_px).map(|r| (id.clone(), r)))
}

impl TimelineEditor {
    pub fn selected_segment(&self) -> Option<&SegmentId> {
        self.view.selected.as_ref()
    }

    pub fn select_segment(&mut self, id: Option<SegmentId>) {
        self.view.selected = id;
    }

    pub fn ui(&mut self, ui: &mut Ui) {
        self.frame();
        if self.is_playing() || self.drag.is_dragging() || self.resize.is_resizing() {
            ui.ctx().request_repaint();
        }

        let focus_lost = ui.input(|i| i.viewport().focused == Some(false));
        let escape = ui.input(|i| i.key_pressed(Key::Escape));
        if (focus_lost || escape) && (self.drag.is_dragging() || self.resize.is_resizing()) {
            log::debug!("Gesture aborted ({})", if focus_lost { "focus lost" } else { "escape" });
            self.cancel_gestures();
            self.view.resize_anchor_x = None;
        }

        let available_size = ui.available_size();
        ui.set_min_size(available_size);

        ui.vertical(|ui| {
            self.toolbar_ui(ui);
            ui.separator();
            self.ruler_ui(ui);

            let output = ScrollArea::vertical()
                .auto_shrink([false, false])
                .drag_to_scroll(false)
                .show(ui, |ui| self.lanes_ui(ui));
            self.view.lanes_rect = Some(output.inner_rect);
        });

        self.handle_gestures(ui);
        self.draw_drag_preview(ui);
        self.handle_shortcuts(ui);
        self.follow_playhead();
        self.clamp_scroll();

        let scroll = self.timeline.scroll_px as f64;
        let viewport = self.view.viewport_width as f64;
        self.request_visible_waveforms(scroll, viewport);
    }

    fn toolbar_ui(&mut self, ui: &mut Ui) {
        let mut toolbar = toolbar::Toolbar::new(
            self.timeline.duration,
            self.timeline.scale,
            (self.config.scale_min, self.config.scale_max),
        );
        toolbar.set_playing(self.is_playing());
        toolbar.set_current_time(self.playhead());
        toolbar.set_master_rate(self.master_rate());
        if let Some(id) = self.view.selected.clone() {
            let at = self.playhead();
            if self.can_split(&id, at) {
                toolbar.set_split_target(Some((id.clone(), at)));
            }
            if let (Some(partner), Some(seg)) = (self.merge_partner(&id), self.model.segment(&id)) {
                toolbar.set_merge_target(Some((id.clone(), partner, seg.track_id)));
            }
        }

        let mut commands = Vec::new();
        toolbar.ui(ui, &mut |cmd| commands.push(cmd));
        for command in commands {
            // Rejections surface as OperationRejected events.
            let _ = self.execute_command(command);
        }
    }

    fn ruler_ui(&mut self, ui: &mut Ui) {
        let mapper = self.mapper();
        let scroll = self.timeline.scroll_px;
        let ruler = ruler::Ruler::new(mapper, scroll, self.config.track_header_width, self.playhead());
        let (response, content) = ruler.ui(ui, self.config.ruler_height);
        self.view.viewport_width = content.width();

        let pointer = response.interact_pointer_pos();
        let time_at = |pos: Pos2| mapper.pixel_to_time(((pos.x - content.min.x).max(0.0) + scroll) as f64);

        if response.drag_started_by(PointerButton::Primary) {
            self.begin_scrub();
        }
        if response.dragged_by(PointerButton::Primary) {
            if let Some(pos) = pointer {
                self.scrub_to(time_at(pos));
            }
        }
        if response.drag_stopped() {
            self.end_scrub();
        }
        if response.clicked_by(PointerButton::Primary) {
            if let Some(pos) = pointer.filter(|p| p.x >= content.min.x) {
                self.seek(time_at(pos));
            }
        }
    }

    fn lanes_ui(&mut self, ui: &mut Ui) {
        let mapper = self.mapper();
        let header_width = self.config.track_header_width;
        let track_height = self.config.track_height;
        let edge_px = self.config.edge_handle_px;
        let min_width = self.config.min_segment_width_px;
        let scroll = self.timeline.scroll_px;
        let playhead = self.playhead();
        let active: Vec<SegmentId> = self
            .model
            .segments_at(playhead)
            .iter()
            .map(|s| s.id.clone())
            .collect();
        let dragged = self.drag.dragged_segment().cloned();
        let resizing = self.resize.active_segment().cloned();
        let drop_track = self.drag.preview().map(|p| p.track_id);
        let renaming = self.view.renaming.as_ref().map(|(id, _)| *id);

        let mut layouts = Vec::with_capacity(self.model.tracks().len());
        let mut actions = Vec::new();
        let mut cursor_icon = None;
        let mut rename_rect = None;

        for track in self.model.tracks() {
            let width = ui.available_width();
            let response = ui.allocate_response(Vec2::new(width, track_height), Sense::click_and_drag());
            let row = response.rect;
            let header_rect = Rect::from_min_max(row.min, Pos2::new(row.min.x + header_width, row.max.y));
            let content = Rect::from_min_max(Pos2::new(header_rect.max.x, row.min.y), row.max);
            layouts.push(TrackLayout {
                track_id: track.id,
                top: row.min.y,
                bottom: row.max.y,
                is_speaker: track.is_speaker(),
            });

            let painter = ui.painter_at(content);
            track_lane::paint_lane_background(&painter, content, track.kind, drop_track == Some(track.id));

            let mut segment_rects = Vec::new();
            for seg in &track.segments {
                let rect = segment_rect(&mapper, content, scroll, seg.start, seg.end, min_width);
                if !rect.intersects(content) {
                    continue;
                }
                segment_rects.push((seg.id.clone(), rect));
                if dragged.as_ref() == Some(&seg.id) {
                    // Origin stays outlined while the preview follows the pointer.
                    painter.rect_stroke(rect, 4.0, Stroke::new(1.0, Color32::from_gray(110)));
                    continue;
                }
                let highlighted =
                    self.view.selected.as_ref() == Some(&seg.id) || resizing.as_ref() == Some(&seg.id);
                segment::SegmentRenderer::new(seg, rect, track.color)
                    .selected(highlighted)
                    .active(active.contains(&seg.id))
                    .waveform(self.waveform(&seg.id))
                    .audio(self.audio_status(&seg.id))
                    .render(&painter);
            }

            let playhead_x = content.min.x + mapper.time_to_pixel(playhead) as f32 - scroll;
            if playhead_x >= content.min.x && playhead_x <= content.max.x {
                painter.line_segment(
                    [Pos2::new(playhead_x, content.min.y), Pos2::new(playhead_x, content.max.y)],
                    Stroke::new(2.0, Color32::from_rgba_premultiplied(100, 200, 255, 128)),
                );
            }

            if renaming == Some(track.id) {
                rename_rect = Some(track_lane::TrackLaneHeader::label_rect(header_rect));
            }
            track_lane::TrackLaneHeader::new(track).render(&ui.painter_at(header_rect), header_rect);

            let pointer = response.interact_pointer_pos();
            if let Some(hover) = ui.input(|i| i.pointer.hover_pos()).filter(|p| content.contains(*p)) {
                if let Some((_, region)) = hit_at(&segment_rects, hover, edge_px) {
                    cursor_icon = Some(match region {
                        HitRegion::Body => CursorIcon::Grab,
                        HitRegion::StartEdge | HitRegion::EndEdge => CursorIcon::ResizeHorizontal,
                    });
                }
            }
            if response.drag_started_by(PointerButton::Primary) {
                if let Some(pos) = pointer.filter(|p| content.contains(*p)) {
                    match hit_at(&segment_rects, pos, edge_px) {
                        Some((id, HitRegion::Body)) => actions.push(LaneAction::BeginDrag(id, pos)),
                        Some((id, HitRegion::StartEdge)) => {
                            actions.push(LaneAction::BeginResize(id, ResizeEdge::Start, pos.x))
                        }
                        Some((id, HitRegion::EndEdge)) => {
                            actions.push(LaneAction::BeginResize(id, ResizeEdge::End, pos.x))
                        }
                        None => {}
                    }
                }
            }
            if response.clicked_by(PointerButton::Primary) {
                if let Some(pos) = pointer.filter(|p| content.contains(*p)) {
                    actions.push(LaneAction::Select(hit_at(&segment_rects, pos, edge_px).map(|(id, _)| id)));
                }
            }
            if response.double_clicked() && pointer.map_or(false, |p| header_rect.contains(p)) {
                actions.push(LaneAction::Rename(track.id, track.label.clone()));
            }
            ui.add_space(2.0);
        }

        self.view.layouts = layouts;
        if let Some(icon) = cursor_icon {
            ui.output_mut(|o| o.cursor_icon = icon);
        }

        for action in actions {
            match action {
                LaneAction::BeginDrag(id, pos) => {
                    if self.begin_drag(&id, pos).is_ok() {
                        self.view.selected = Some(id);
                    }
                }
                LaneAction::BeginResize(id, edge, x) => {
                    if self.begin_resize(&id, edge).is_ok() {
                        self.view.resize_anchor_x = Some(x);
                        self.view.selected = Some(id);
                    }
                }
                LaneAction::Select(id) => self.view.selected = id,
                LaneAction::Rename(track_id, label) => {
                    self.view.renaming = Some((track_id, label));
                    self.view.rename_needs_focus = true;
                }
            }
        }

        if let Some(rect) = rename_rect {
            self.rename_field_ui(ui, rect);
        }
    }

    fn rename_field_ui(&mut self, ui: &mut Ui, rect: Rect) {
        let Some((track_id, mut text)) = self.view.renaming.take() else {
            return;
        };
        let response = ui.put(rect, TextEdit::singleline(&mut text));
        if self.view.rename_needs_focus {
            response.request_focus();
            self.view.rename_needs_focus = false;
        }
        if response.lost_focus() {
            let cancelled = ui.input(|i| i.key_pressed(Key::Escape));
            let label = text.trim();
            if !cancelled && !label.is_empty() {
                let _ = self.rename_track(track_id, label.to_string());
            }
        } else {
            self.view.renaming = Some((track_id, text));
        }
    }

    fn handle_gestures(&mut self, ui: &Ui) {
        let pointer = ui.input(|i| i.pointer.latest_pos());
        let released = !ui.input(|i| i.pointer.primary_down());
        let layouts = std::mem::take(&mut self.view.layouts);

        if self.drag.is_dragging() {
            match pointer {
                Some(pos) if released => {
                    let inside = self.view.lanes_rect.map_or(false, |r| r.contains(pos));
                    let _ = self.finish_drag(pos, inside, &layouts);
                }
                Some(pos) => {
                    self.update_drag(pos, &layouts);
                    ui.ctx().set_cursor_icon(CursorIcon::Grabbing);
                }
                None if released => {
                    self.drag.cancel();
                }
                None => {}
            }
        }

        if self.resize.is_resizing() {
            if let (Some(anchor), Some(pos)) = (self.view.resize_anchor_x, pointer) {
                let delta = self.mapper().delta_to_time((pos.x - anchor) as f64);
                let _ = self.update_resize(delta);
            }
            ui.ctx().set_cursor_icon(CursorIcon::ResizeHorizontal);
            if released {
                self.end_resize();
                self.view.resize_anchor_x = None;
            }
        }

        self.view.layouts = layouts;
    }

    fn draw_drag_preview(&self, ui: &Ui) {
        let Some(preview) = self.drag.preview() else {
            return;
        };
        let (Some(lanes), Some(seg)) = (self.view.lanes_rect, self.model.segment(&preview.segment_id)) else {
            return;
        };
        let Some(layout) = self.view.layouts.iter().find(|l| l.track_id == preview.track_id) else {
            return;
        };
        let content_left = lanes.min.x + self.config.track_header_width;
        let content = Rect::from_min_max(
            Pos2::new(content_left, layout.top),
            Pos2::new(lanes.max.x, layout.bottom),
        );
        let rect = segment_rect(
            &self.mapper(),
            content,
            self.timeline.scroll_px,
            preview.start,
            preview.end,
            self.config.min_segment_width_px,
        );
        let color = self
            .model
            .track(seg.track_id)
            .map_or(Color32::GRAY, |t| t.color);
        let painter = ui
            .ctx()
            .layer_painter(LayerId::new(Order::Foreground, Id::new("dub_timeline_drag_preview")))
            .with_clip_rect(Rect::from_min_max(Pos2::new(content_left, lanes.min.y), lanes.max));
        segment::SegmentRenderer::new(seg, rect, color)
            .ghost(true)
            .waveform(self.waveform(&seg.id))
            .render(&painter);
    }

    fn handle_shortcuts(&mut self, ui: &Ui) {
        let (zoom_delta, pan_delta, hover) = ui.input(|i| {
            let raw = i.raw_scroll_delta;
            if i.modifiers.ctrl {
                (raw.y, 0.0, i.pointer.hover_pos())
            } else if i.modifiers.shift {
                (0.0, raw.x + raw.y, None)
            } else {
                (0.0, raw.x, None)
            }
        });

        if zoom_delta != 0.0 {
            let viewport = self.view.viewport_width;
            let content_left = self
                .view
                .lanes_rect
                .map_or(0.0, |r| r.min.x + self.config.track_header_width);
            let anchor = hover
                .map(|p| p.x - content_left)
                .unwrap_or(viewport * 0.5)
                .clamp(0.0, viewport.max(0.0));
            let time = self
                .mapper()
                .pixel_to_time((self.timeline.scroll_px + anchor) as f64);
            self.zoom_by(1.0 + zoom_delta as f64 * 0.001);
            self.timeline.scroll_px = self.mapper().time_to_pixel(time) as f32 - anchor;
        }
        if pan_delta != 0.0 {
            self.timeline.scroll_px -= pan_delta;
        }

        if ui.memory(|m| m.focused().is_some()) {
            return;
        }
        let (space, split, merge) = ui.input(|i| {
            (
                i.key_pressed(Key::Space),
                i.key_pressed(Key::S) && !i.modifiers.command,
                i.key_pressed(Key::M),
            )
        });
        if space {
            self.toggle_playback();
        }
        if let Some(id) = self.view.selected.clone() {
            if split {
                let at = self.playhead();
                let _ = self.split(&id, at);
            }
            if merge {
                if let (Some(partner), Some(track_id)) =
                    (self.merge_partner(&id), self.model.segment(&id).map(|s| s.track_id))
                {
                    let _ = self.merge(&[id, partner], track_id);
                }
            }
        }
    }

    /// Keeps the playhead on screen while playing.
    fn follow_playhead(&mut self) {
        if !self.is_playing() || self.view.viewport_width <= 0.0 {
            return;
        }
        let viewport = self.view.viewport_width;
        let x = self.mapper().time_to_pixel(self.playhead()) as f32;
        if x > self.timeline.scroll_px + viewport * 0.9 {
            self.timeline.scroll_px = x - viewport * 0.1;
        } else if x < self.timeline.scroll_px {
            self.timeline.scroll_px = x;
        }
    }

    fn clamp_scroll(&mut self) {
        let max = (self.mapper().width_px() as f32 - self.view.viewport_width).max(0.0);
        self.timeline.scroll_px = self.timeline.scroll_px.clamp(0.0, max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_rect_respects_scroll_and_min_width() {
        let mapper = TimeMapper::new(20.0, 1.0);
        let content = Rect::from_min_max(Pos2::new(160.0, 0.0), Pos2::new(960.0, 72.0));
        let rect = segment_rect(&mapper, content, 50.0, 1.0, 2.0, 4.0);
        assert_eq!(rect.min.x, 210.0);
        assert_eq!(rect.max.x, 310.0);
        let tiny = segment_rect(&mapper, content, 0.0, 1.0, 1.001, 4.0);
        assert_eq!(tiny.width(), 4.0);
    }

    #[test]
    fn hit_at_picks_edges_first() {
        let rects = vec![
            (SegmentId::from("a"), Rect::from_min_max(Pos2::new(100.0, 6.0), Pos2::new(200.0, 66.0))),
            (SegmentId::from("b"), Rect::from_min_max(Pos2::new(200.0, 6.0), Pos2::new(300.0, 66.0))),
        ];
        assert_eq!(
            hit_at(&rects, Pos2::new(150.0, 30.0), 8.0),
            Some((SegmentId::from("a"), HitRegion::Body))
        );
        assert_eq!(
            hit_at(&rects, Pos2::new(297.0, 30.0), 8.0),
            Some((SegmentId::from("b"), HitRegion::EndEdge))
        );
        assert_eq!(hit_at(&rects, Pos2::new(150.0, 2.0), 8.0), None);
    }
}
