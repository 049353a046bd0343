use crate::structure::{Track, TrackKind};
use egui::*;

/// Left-hand lane header: colour swatch, label and kind.
pub struct TrackLaneHeader<'a> {
    track: &'a Track,
    segment_count: usize,
}

impl<'a> TrackLaneHeader<'a> {
    pub fn new(track: &'a Track) -> Self {
        Self {
            track,
            segment_count: track.segments.len(),
        }
    }

    pub fn render(&self, painter: &Painter, rect: Rect) {
        painter.rect_filled(rect, 0.0, Color32::from_gray(36));
        let swatch = Rect::from_min_size(rect.min + Vec2::new(6.0, 8.0), Vec2::new(6.0, rect.height() - 16.0));
        painter.rect_filled(swatch, 2.0, self.track.color);

        painter.text(
            rect.min + Vec2::new(18.0, 8.0),
            Align2::LEFT_TOP,
            &self.track.label,
            FontId::proportional(13.0),
            Color32::WHITE,
        );

        let detail = match self.track.kind {
            TrackKind::Speaker => format!("{} segments", self.segment_count),
            TrackKind::Waveform => "waveform".to_string(),
            TrackKind::Muted => "muted".to_string(),
        };
        painter.text(
            rect.min + Vec2::new(18.0, 28.0),
            Align2::LEFT_TOP,
            detail,
            FontId::proportional(10.0),
            Color32::from_gray(150),
        );
        painter.line_segment(
            [Pos2::new(rect.max.x, rect.min.y), Pos2::new(rect.max.x, rect.max.y)],
            Stroke::new(1.0, Color32::from_gray(60)),
        );
    }

    /// Where the inline rename field goes.
    pub fn label_rect(rect: Rect) -> Rect {
        Rect::from_min_size(rect.min + Vec2::new(16.0, 4.0), Vec2::new((rect.width() - 22.0).max(20.0), 20.0))
    }
}

/// Background of a lane's content area.
pub fn paint_lane_background(painter: &Painter, rect: Rect, kind: TrackKind, highlighted: bool) {
    let fill = match (kind, highlighted) {
        (TrackKind::Speaker, true) => Color32::from_gray(42),
        (TrackKind::Speaker, false) => Color32::from_gray(30),
        (TrackKind::Waveform, _) => Color32::from_rgb(28, 32, 38),
        (TrackKind::Muted, _) => Color32::from_gray(22),
    };
    painter.rect_filled(rect, 0.0, fill);
    if kind == TrackKind::Muted {
        painter.text(
            rect.left_center() + Vec2::new(8.0, 0.0),
            Align2::LEFT_CENTER,
            "muted",
            FontId::proportional(10.0),
            Color32::from_gray(80),
        );
    }
}
