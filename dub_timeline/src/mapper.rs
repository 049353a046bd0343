//! 时间/像素坐标转换
//!
//! Linear mapping between seconds and timeline pixels under a zoom scale.
//! Out-of-range inputs are clamped, never rejected: pointers routinely wander
//! past the ends of the timeline during a drag.

/// Pixel density at `scale == 1.0`.
pub const PIXELS_PER_SECOND: f64 = 100.0;
pub const SCALE_MIN: f64 = 0.35;
pub const SCALE_MAX: f64 = 2.0;

/// Width of the whole timeline in pixels.
pub fn timeline_width_px(duration: f64, scale: f64) -> f64 {
    TimeMapper::new(duration, scale).width_px()
}

pub fn time_to_pixel(time: f64, duration: f64, scale: f64) -> f64 {
    TimeMapper::new(duration, scale).time_to_pixel(time)
}

pub fn pixel_to_time(px: f64, duration: f64, scale: f64) -> f64 {
    TimeMapper::new(duration, scale).pixel_to_time(px)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeMapper {
    pub duration: f64,
    pub scale: f64,
    pub pixels_per_second: f64,
}

impl TimeMapper {
    pub fn new(duration: f64, scale: f64) -> Self {
        Self::with_density(duration, scale, PIXELS_PER_SECOND)
    }

    pub fn with_density(duration: f64, scale: f64, pixels_per_second: f64) -> Self {
        Self {
            duration: duration.max(0.0),
            scale,
            pixels_per_second,
        }
    }

    fn px_per_second(&self) -> f64 {
        self.pixels_per_second * self.scale
    }

    pub fn width_px(&self) -> f64 {
        self.duration * self.px_per_second()
    }

    pub fn time_to_pixel(&self, time: f64) -> f64 {
        let t = time.clamp(0.0, self.duration);
        (t * self.px_per_second()).clamp(0.0, self.width_px())
    }

    pub fn pixel_to_time(&self, px: f64) -> f64 {
        let density = self.px_per_second();
        if density <= 0.0 {
            return 0.0;
        }
        (px / density).clamp(0.0, self.duration)
    }

    /// Converts a pointer displacement into a time displacement. Unlike
    /// `pixel_to_time` this is signed and unclamped.
    pub fn delta_to_time(&self, dx: f64) -> f64 {
        let density = self.px_per_second();
        if density <= 0.0 {
            return 0.0;
        }
        dx / density
    }

    /// Seconds covered by one pixel.
    pub fn seconds_per_pixel(&self) -> f64 {
        self.delta_to_time(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_scales_with_zoom() {
        assert_eq!(timeline_width_px(10.0, 1.0), 1000.0);
        assert_eq!(timeline_width_px(10.0, 0.5), 500.0);
    }

    #[test]
    fn pixel_round_trip_across_zoom_range() {
        let duration = 93.7;
        let scales = [SCALE_MIN, 0.5, 1.0, 1.37, SCALE_MAX];
        for &scale in &scales {
            let tolerance = TimeMapper::new(duration, scale).seconds_per_pixel();
            let mut t = 0.0;
            while t <= duration {
                let back = pixel_to_time(time_to_pixel(t, duration, scale), duration, scale);
                assert!((back - t).abs() < tolerance, "t={t} scale={scale} back={back}");
                t += 0.731;
            }
        }
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        assert_eq!(time_to_pixel(-3.0, 10.0, 1.0), 0.0);
        assert_eq!(time_to_pixel(42.0, 10.0, 1.0), 1000.0);
        assert_eq!(pixel_to_time(-50.0, 10.0, 1.0), 0.0);
        assert_eq!(pixel_to_time(5000.0, 10.0, 1.0), 10.0);
    }

    #[test]
    fn delta_is_signed() {
        let mapper = TimeMapper::new(10.0, 2.0);
        assert_eq!(mapper.delta_to_time(-200.0), -1.0);
    }
}
