//! Small helpers shared across modules.
//!
//! - Local timestamps for stamping crawled records and reports
//! - String truncation for logging response bodies

use chrono::Local;

/// Format used for `fetched_at` and report timestamps.
pub const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The current local time as `YYYY-MM-DD HH:MM:SS`.
pub fn now_stamp() -> String {
    Local::now().format(STAMP_FORMAT).to_string()
}

/// Truncate a string for logging purposes.
///
/// Strings longer than `max` characters are cut and get a
/// `"…(+N chars)"` suffix naming how much was dropped.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 chars)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => {
            let dropped = s[cut..].chars().count();
            format!("{}…(+{} chars)", &s[..cut], dropped)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
        assert_eq!(truncate_for_log(s, 13), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.ends_with("…(+400 chars)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        assert_eq!(truncate_for_log("新闻列表", 2), "新闻…(+2 chars)");
    }

    #[test]
    fn test_now_stamp_format() {
        let stamp = now_stamp();
        assert!(NaiveDateTime::parse_from_str(&stamp, STAMP_FORMAT).is_ok());
        assert_eq!(stamp.len(), 19);
    }
}
