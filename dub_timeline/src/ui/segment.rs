use crate::audio::AudioStatus;
use crate::structure::Segment;
use crate::waveform::WaveformState;
use egui::*;

/// Draws one segment block: fill, border, text and, when available, its
/// waveform.
pub struct SegmentRenderer<'a> {
    segment: &'a Segment,
    rect: Rect,
    color: Color32,
    is_selected: bool,
    is_active: bool,
    is_ghost: bool,
    waveform: WaveformState<'a>,
    audio: Option<&'a AudioStatus>,
}

impl<'a> SegmentRenderer<'a> {
    pub fn new(segment: &'a Segment, rect: Rect, color: Color32) -> Self {
        Self {
            segment,
            rect,
            color,
            is_selected: false,
            is_active: false,
            is_ghost: false,
            waveform: WaveformState::Missing,
            audio: None,
        }
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.is_selected = selected;
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    /// Translucent rendering for the drag preview.
    pub fn ghost(mut self, ghost: bool) -> Self {
        self.is_ghost = ghost;
        self
    }

    pub fn waveform(mut self, waveform: WaveformState<'a>) -> Self {
        self.waveform = waveform;
        self
    }

    pub fn audio(mut self, audio: Option<&'a AudioStatus>) -> Self {
        self.audio = audio;
        self
    }

    pub fn render(&self, painter: &Painter) {
        let rect = self.rect;
        let alpha = if self.is_ghost { 120 } else { 255 };
        let base = if self.is_active {
            self.color
        } else {
            self.color.gamma_multiply(0.75)
        };
        let fill = Color32::from_rgba_unmultiplied(base.r(), base.g(), base.b(), alpha);
        painter.rect_filled(rect, 4.0, fill);

        match self.waveform {
            WaveformState::Ready(samples) | WaveformState::Loading(Some(samples)) => {
                self.draw_waveform(painter, samples);
            }
            WaveformState::Failed => {
                self.placeholder(painter, "no waveform");
            }
            _ => {}
        }

        let (stroke_width, stroke_color) = if self.is_selected {
            (3.0, Color32::from_rgb(255, 255, 100))
        } else if self.segment.is_rate_locked() {
            (2.0, Color32::from_rgb(240, 140, 60))
        } else {
            (1.5, Color32::from_gray(200))
        };
        painter.rect_stroke(rect, 4.0, Stroke::new(stroke_width, stroke_color));

        if rect.width() > 40.0 {
            let text = if self.segment.target_text.is_empty() {
                &self.segment.source_text
            } else {
                &self.segment.target_text
            };
            painter.text(
                rect.left_top() + Vec2::new(5.0, 4.0),
                Align2::LEFT_TOP,
                elide(text, rect.width()),
                FontId::proportional(11.0),
                Color32::WHITE,
            );
        }

        let pending = match self.audio {
            None => self.segment.audio_ref.is_none(),
            Some(AudioStatus::Pending) | Some(AudioStatus::Failed(_)) => true,
            Some(AudioStatus::Ready(_)) => false,
        };
        if pending && rect.width() > 12.0 {
            painter.circle_filled(
                Pos2::new(rect.max.x - 7.0, rect.min.y + 7.0),
                3.0,
                Color32::from_rgb(230, 80, 80),
            );
        }
        if self.segment.is_rate_locked() && rect.width() > 60.0 {
            painter.text(
                rect.right_bottom() - Vec2::new(5.0, 4.0),
                Align2::RIGHT_BOTTOM,
                format!("×{:.2}", self.segment.playback_rate),
                FontId::monospace(10.0),
                Color32::from_gray(230),
            );
        }
    }

    fn draw_waveform(&self, painter: &Painter, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let rect = self.rect.shrink2(Vec2::new(1.0, 14.0).min(self.rect.size() * 0.25));
        let center_y = rect.center().y;
        let step = rect.width() / samples.len() as f32;
        let stroke = Stroke::new(1.0, Color32::from_rgba_unmultiplied(20, 20, 20, 140));
        for (i, &sample) in samples.iter().enumerate() {
            let x = rect.min.x + (i as f32 + 0.5) * step;
            let height = sample.clamp(0.0, 1.0) * rect.height() * 0.5;
            painter.line_segment(
                [Pos2::new(x, center_y - height), Pos2::new(x, center_y + height)],
                stroke,
            );
        }
    }

    fn placeholder(&self, painter: &Painter, text: &str) {
        if self.rect.width() > 70.0 {
            painter.text(
                self.rect.center(),
                Align2::CENTER_CENTER,
                text,
                FontId::proportional(10.0),
                Color32::from_gray(150),
            );
        }
    }
}

/// Cuts `text` to roughly fit `width` pixels of 11pt text.
fn elide(text: &str, width: f32) -> String {
    let max_chars = ((width - 10.0) / 6.5).max(0.0) as usize;
    if text.chars().count() <= max_chars {
        text.to_string()
    } else if max_chars <= 1 {
        String::new()
    } else {
        let mut cut: String = text.chars().take(max_chars - 1).collect();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_text_is_elided() {
        assert_eq!(elide("hello", 200.0), "hello");
        let cut = elide("a fairly long line of dubbed dialogue", 60.0);
        assert!(cut.ends_with('…'));
        assert!(cut.chars().count() <= 7);
        assert_eq!(elide("hello", 12.0), "");
    }
}
