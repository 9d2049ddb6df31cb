//! Formatting helpers for command output.
//!
//! - [`format_count_with_separator`] - Format counts with thousands separator (1,234,567)
//! - [`format_remaining`] - Compact remaining time (2d 3h, 45m 10s)
//! - [`truncate`] - Truncate strings with ellipsis

use std::time::Duration;

/// Format a number with thousands separators (commas).
///
/// # Examples
/// ```
/// use pathwarden::utils::format_count_with_separator;
/// assert_eq!(format_count_with_separator(1000), "1,000");
/// assert_eq!(format_count_with_separator(1234567), "1,234,567");
/// ```
pub fn format_count_with_separator(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Remaining block time with its two most significant units.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use pathwarden::utils::format_remaining;
/// assert_eq!(format_remaining(Duration::from_secs(93_784)), "1d 2h");
/// assert_eq!(format_remaining(Duration::from_secs(59)), "59s");
/// ```
pub fn format_remaining(duration: Duration) -> String {
    let secs = duration.as_secs();
    let units = [
        (secs / 86_400, "d"),
        ((secs % 86_400) / 3_600, "h"),
        ((secs % 3_600) / 60, "m"),
        (secs % 60, "s"),
    ];

    let parts: Vec<String> = units
        .iter()
        .skip_while(|(value, _)| *value == 0)
        .take(2)
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{}{}", value, unit))
        .collect();

    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(" ")
    }
}

/// Truncate a string to at most `max_len` characters, adding "..." if
/// truncated.
///
/// # Examples
/// ```
/// use pathwarden::utils::truncate;
/// assert_eq!(truncate("short", 10), "short");
/// assert_eq!(truncate("/wp-admin/setup.php", 10), "/wp-adm...");
/// ```
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_count_with_separator() {
        assert_eq!(format_count_with_separator(0), "0");
        assert_eq!(format_count_with_separator(999), "999");
        assert_eq!(format_count_with_separator(1000), "1,000");
        assert_eq!(format_count_with_separator(u64::MAX), "18,446,744,073,709,551,615");
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::ZERO), "0s");
        assert_eq!(format_remaining(Duration::from_secs(3_600)), "1h");
        assert_eq!(format_remaining(Duration::from_secs(3_661)), "1h 1m");
        assert_eq!(format_remaining(Duration::from_secs(86_400 + 30)), "1d");
        assert_eq!(format_remaining(Duration::from_secs(2_710)), "45m 10s");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
        assert_eq!(truncate("this is long", 10), "this is...");
        assert_eq!(truncate("abc", 2), "...");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("/répertoire/caché", 8), "/répe...");
    }
}
