use crate::mapper::TimeMapper;
use crate::utils::format_ruler_label;
use egui::*;

/// Time ruler above the lanes. Clicking seeks, dragging scrubs; both are
/// reported through the returned response and handled by the editor.
pub struct Ruler {
    mapper: TimeMapper,
    scroll_px: f32,
    header_width: f32,
    playhead: f64,
}

impl Ruler {
    pub fn new(mapper: TimeMapper, scroll_px: f32, header_width: f32, playhead: f64) -> Self {
        Self {
            mapper,
            scroll_px,
            header_width,
            playhead,
        }
    }

    pub fn ui(&self, ui: &mut Ui, height: f32) -> (Response, Rect) {
        let width = ui.available_width();
        let response = ui.allocate_response(Vec2::new(width, height), Sense::click_and_drag());
        let rect = response.rect;
        let content = Rect::from_min_max(Pos2::new(rect.min.x + self.header_width, rect.min.y), rect.max);

        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, Color32::from_gray(40));
        painter.rect_filled(
            Rect::from_min_max(rect.min, Pos2::new(content.min.x, rect.max.y)),
            0.0,
            Color32::from_gray(32),
        );

        let content_painter = ui.painter_at(content);
        self.draw_time_markers(&content_painter, content);
        self.draw_playhead(&content_painter, content);

        (response, content)
    }

    fn x_for(&self, content: Rect, time: f64) -> f32 {
        content.min.x + self.mapper.time_to_pixel(time) as f32 - self.scroll_px
    }

    fn draw_time_markers(&self, painter: &Painter, rect: Rect) {
        let start_time = self.mapper.pixel_to_time(self.scroll_px as f64);
        let end_time = self
            .mapper
            .pixel_to_time(self.scroll_px as f64 + rect.width() as f64);

        let major_interval = calculate_major_interval(self.mapper.seconds_per_pixel());
        let minor_interval = major_interval / 4.0;

        let first_minor = (start_time / minor_interval).floor() as i64;
        let last_minor = (end_time / minor_interval).ceil() as i64;
        for step in first_minor..=last_minor {
            let time = step as f64 * minor_interval;
            let x = self.x_for(rect, time);
            let major = step.rem_euclid(4) == 0;
            let top = if major { rect.min.y } else { rect.max.y - 8.0 };
            painter.line_segment(
                [Pos2::new(x, top), Pos2::new(x, rect.max.y)],
                Stroke::new(if major { 1.5 } else { 1.0 }, Color32::from_gray(if major { 90 } else { 60 })),
            );
            if major {
                painter.text(
                    Pos2::new(x + 4.0, rect.min.y + 4.0),
                    Align2::LEFT_TOP,
                    format_ruler_label(time),
                    FontId::proportional(11.0),
                    Color32::from_gray(220),
                );
            }
        }
    }

    fn draw_playhead(&self, painter: &Painter, rect: Rect) {
        let x = self.x_for(rect, self.playhead);
        if x >= rect.min.x && x <= rect.max.x {
            painter.line_segment(
                [Pos2::new(x, rect.min.y), Pos2::new(x, rect.max.y)],
                Stroke::new(2.0, Color32::from_rgb(255, 100, 100)),
            );
            painter.add(Shape::convex_polygon(
                vec![
                    Pos2::new(x - 5.0, rect.min.y),
                    Pos2::new(x + 5.0, rect.min.y),
                    Pos2::new(x, rect.min.y + 7.0),
                ],
                Color32::from_rgb(255, 100, 100),
                Stroke::NONE,
            ));
        }
    }
}

/// Spacing of labelled ruler marks: roughly 100 px apart, rounded to a
/// readable value.
pub fn calculate_major_interval(seconds_per_pixel: f64) -> f64 {
    let target_interval = seconds_per_pixel * 100.0;
    if !(target_interval > 0.0) || !target_interval.is_finite() {
        return 1.0;
    }

    let magnitude = 10.0_f64.powf(target_interval.log10().floor());
    let normalized = target_interval / magnitude;

    let nice_value = if normalized <= 1.5 {
        1.0
    } else if normalized <= 3.5 {
        2.0
    } else if normalized <= 7.5 {
        5.0
    } else {
        10.0
    };

    nice_value * magnitude
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_interval_is_a_nice_number() {
        // 100 px per second -> one label per second
        assert!((calculate_major_interval(0.01) - 1.0).abs() < 1e-12);
        // zoomed out to 35 px per second
        assert!((calculate_major_interval(1.0 / 35.0) - 2.0).abs() < 1e-12);
        assert!((calculate_major_interval(0.005) - 0.5).abs() < 1e-12);
        assert_eq!(calculate_major_interval(0.0), 1.0);
    }
}
