//! 工具函数模块
//!
//! 时间格式化等通用工具。

/// 将时间（秒）格式化为 "MM:SS.mmm" 格式
///
/// ```
/// use dub_timeline::utils::format_time;
///
/// assert_eq!(format_time(125.5), "02:05.500");
/// ```
pub fn format_time(time_seconds: f64) -> String {
    let total_ms = if time_seconds.is_finite() {
        (time_seconds.max(0.0) * 1000.0).round() as u64
    } else {
        0
    };
    let minutes = total_ms / 60_000;
    let seconds = (total_ms / 1000) % 60;
    let milliseconds = total_ms % 1000;
    format!("{:02}:{:02}.{:03}", minutes, seconds, milliseconds)
}

/// Ruler label: drops the milliseconds on whole seconds.
pub fn format_ruler_label(time_seconds: f64) -> String {
    let label = format_time(time_seconds);
    match label.strip_suffix(".000") {
        Some(short) => short.to_string(),
        None => label,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minutes_seconds_millis() {
        assert_eq!(format_time(0.0), "00:00.000");
        assert_eq!(format_time(59.999), "00:59.999");
        assert_eq!(format_time(61.25), "01:01.250");
        // rounding must not produce "00:00.1000"
        assert_eq!(format_time(0.9996), "00:01.000");
    }

    #[test]
    fn negative_and_nan_clamp_to_zero() {
        assert_eq!(format_time(-3.0), "00:00.000");
        assert_eq!(format_time(f64::NAN), "00:00.000");
    }

    #[test]
    fn ruler_labels_are_short_on_whole_seconds() {
        assert_eq!(format_ruler_label(5.0), "00:05");
        assert_eq!(format_ruler_label(5.5), "00:05.500");
    }
}
