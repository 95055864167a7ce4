use std::fmt::Display;

use chrono::{DateTime, SecondsFormat, Utc};

/// ISO-8601 in UTC with millisecond precision, e.g. `2024-05-01T10:00:00.000Z`.
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Right pads `value` with spaces up to `width` characters, never truncates.
pub fn pad_end(value: impl Display, width: usize) -> String {
    format!("{:<width$}", value.to_string(), width = width)
}

/// First four characters of a logger name, uppercased.
pub fn short_name(name: &str) -> String {
    name.chars().take(4).collect::<String>().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_without_truncating() {
        assert_eq!(pad_end("GET", 4), "GET ");
        assert_eq!(pad_end("DELETE", 4), "DELETE");
        assert_eq!(pad_end(42, 5), "42   ");
    }

    #[test]
    fn short_name_takes_four_chars() {
        assert_eq!(short_name("requests"), "REQU");
        assert_eq!(short_name("db"), "DB");
    }

    #[test]
    fn timestamp_is_iso_with_millis() {
        let time = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(format_timestamp(&time), "2023-11-14T22:13:20.123Z");
    }
}
