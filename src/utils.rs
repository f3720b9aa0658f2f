use chrono::{DateTime, Utc};

/// Helper function to format duration in a compact way
pub fn format_duration_compact(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let duration = end.signed_duration_since(start);
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        format!("{}s", total_seconds)
    } else if total_seconds < 3600 {
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        if seconds > 0 {
            format!("{}m{}s", minutes, seconds)
        } else {
            format!("{}m", minutes)
        }
    } else {
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        if minutes > 0 {
            format!("{}h{}m", hours, minutes)
        } else {
            format!("{}h", hours)
        }
    }
}

/// Truncate long error strings so one upstream failure cannot flood a log line.
pub fn truncate_error(message: &str, max_len: usize) -> String {
    if message.len() <= max_len {
        return message.to_string();
    }
    let mut cut = max_len;
    while !message.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &message[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_duration_compact() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();

        let end = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 42).unwrap();
        assert_eq!(format_duration_compact(start, end), "42s");

        let end = Utc.with_ymd_and_hms(2024, 1, 1, 9, 5, 0).unwrap();
        assert_eq!(format_duration_compact(start, end), "5m");

        let end = Utc.with_ymd_and_hms(2024, 1, 1, 9, 5, 30).unwrap();
        assert_eq!(format_duration_compact(start, end), "5m30s");

        let end = Utc.with_ymd_and_hms(2024, 1, 1, 11, 30, 0).unwrap();
        assert_eq!(format_duration_compact(start, end), "2h30m");
    }

    #[test]
    fn test_truncate_error() {
        assert_eq!(truncate_error("short", 80), "short");
        let long = "x".repeat(100);
        let truncated = truncate_error(&long, 80);
        assert_eq!(truncated.len(), 83);
        assert!(truncated.ends_with("..."));
    }
}
