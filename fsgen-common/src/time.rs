//! Duration formatting for progress lines

use std::time::Duration;

/// Format a duration as `H:MM:SS`, truncating fractional seconds.
///
/// ```
/// use std::time::Duration;
/// use fsgen_common::time::format_hms;
///
/// assert_eq!(format_hms(Duration::from_secs(3661)), "1:01:01");
/// assert_eq!(format_hms(Duration::from_millis(59_900)), "0:00:59");
/// ```
pub fn format_hms(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;
    format!("{}:{:02}:{:02}", hours, mins, secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero() {
        assert_eq!(format_hms(Duration::ZERO), "0:00:00");
    }

    #[test]
    fn test_long_run() {
        assert_eq!(format_hms(Duration::from_secs(26 * 3600 + 5)), "26:00:05");
    }
}
