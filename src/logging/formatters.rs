use std::sync::Arc;

use serde_json::json;

use super::{colors::ColorTable, Entry, LogFormatter};
use crate::config::SinkTuning;
use crate::utils::{format_timestamp, short_name};

fn render_message(entry: &Entry<'_>, human_readable: bool) -> String {
    if entry.causes.is_empty() {
        return entry.message.to_string();
    }

    if human_readable {
        let mut message = format!("{}\n\nCaused by:", entry.message);
        for cause in entry.causes {
            message.push_str("\n    ");
            message.push_str(cause);
        }
        message
    } else {
        let mut message = entry.message.to_string();
        for cause in entry.causes {
            message.push_str(": ");
            message.push_str(cause);
        }
        message
    }
}

/// `<timestamp> [level] [NAME] message`, with the level label taken from the
/// color table when one is available.
pub struct ConsoleFormatter {
    colors: Arc<ColorTable>,
    prefix: String,
    colorize: bool,
    timestamp: bool,
    human_readable: bool,
}

impl ConsoleFormatter {
    pub fn new(logger: &str, tuning: &SinkTuning, colors: Arc<ColorTable>) -> Self {
        Self {
            colors,
            prefix: format!(" [{}]", short_name(logger)),
            colorize: tuning.colorize,
            timestamp: tuning.timestamp,
            human_readable: tuning.human_readable_unhandled_exception,
        }
    }

    fn format_level(&self, level: &str) -> String {
        let decorated = match (self.colorize, self.timestamp) {
            (false, _) => None,
            (true, true) => self.colors.label(level),
            (true, false) => self.colors.bare_label(level),
        };

        match decorated {
            Some(label) => label.to_string(),
            None if self.timestamp => format!(" [{}]", level),
            None => format!("[{}]", level),
        }
    }
}

impl LogFormatter for ConsoleFormatter {
    fn format(&self, entry: &Entry<'_>) -> String {
        let timestamp = if self.timestamp {
            format_timestamp(&entry.time)
        } else {
            String::new()
        };

        format!(
            "{}{}{} {}",
            timestamp,
            self.format_level(entry.level),
            self.prefix,
            render_message(entry, self.human_readable),
        )
    }
}

/// Plain text file lines: `<timestamp> - level: message`.
pub struct PlainFormatter {
    timestamp: bool,
    human_readable: bool,
}

impl PlainFormatter {
    pub fn new(tuning: &SinkTuning) -> Self {
        Self {
            timestamp: tuning.timestamp,
            human_readable: tuning.human_readable_unhandled_exception,
        }
    }
}

impl LogFormatter for PlainFormatter {
    fn format(&self, entry: &Entry<'_>) -> String {
        let message = render_message(entry, self.human_readable);
        if self.timestamp {
            format!(
                "{} - {}: {}",
                format_timestamp(&entry.time),
                entry.level,
                message
            )
        } else {
            format!("{}: {}", entry.level, message)
        }
    }
}

/// One JSON object per line.
pub struct JsonFormatter {
    timestamp: bool,
}

impl JsonFormatter {
    pub fn new(tuning: &SinkTuning) -> Self {
        Self {
            timestamp: tuning.timestamp,
        }
    }
}

impl LogFormatter for JsonFormatter {
    fn format(&self, entry: &Entry<'_>) -> String {
        let mut json = json!({
            "level": entry.level,
            "message": entry.message,
        });

        if self.timestamp {
            json["timestamp"] = format_timestamp(&entry.time).into();
        }

        if !entry.causes.is_empty() {
            json["causes"] = entry.causes.into();
        }

        json.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::DateTime;

    use super::*;

    fn entry<'a>(level: &'a str, message: &'a str, causes: &'a [String]) -> Entry<'a> {
        Entry {
            logger: "requests",
            level,
            message,
            causes,
            time: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        }
    }

    fn colors() -> Arc<ColorTable> {
        Arc::new(ColorTable::build(&BTreeMap::from([(
            "info".to_string(),
            "green".to_string(),
        )])))
    }

    #[test]
    fn console_line_layout() {
        let formatter = ConsoleFormatter::new("requests", &SinkTuning::default(), colors());

        let line = formatter.format(&entry("info", "hello", &[]));
        assert!(line.starts_with("2023-11-14T22:13:20.000Z\x1b["));
        assert!(line.contains(" [info]"));
        assert!(line.ends_with(" [REQU] hello"));

        let line = formatter.format(&entry("warn", "careful", &[]));
        assert_eq!(line, "2023-11-14T22:13:20.000Z [warn] [REQU] careful");
    }

    #[test]
    fn console_flags_strip_decoration_and_timestamp() {
        let tuning = SinkTuning {
            colorize: false,
            timestamp: false,
            ..Default::default()
        };
        let formatter = ConsoleFormatter::new("db", &tuning, colors());
        assert_eq!(
            formatter.format(&entry("info", "ready", &[])),
            "[info] [DB] ready"
        );
    }

    #[test]
    fn causes_render_per_flag() {
        let causes = vec!["disk full".to_string()];

        let human = PlainFormatter::new(&SinkTuning {
            timestamp: false,
            ..Default::default()
        });
        assert_eq!(
            human.format(&entry("error", "write failed", &causes)),
            "error: write failed\n\nCaused by:\n    disk full"
        );

        let compact = PlainFormatter::new(&SinkTuning {
            timestamp: false,
            human_readable_unhandled_exception: false,
            ..Default::default()
        });
        assert_eq!(
            compact.format(&entry("error", "write failed", &causes)),
            "error: write failed: disk full"
        );
    }

    #[test]
    fn json_lines() {
        let formatter = JsonFormatter::new(&SinkTuning::default());
        let line = formatter.format(&entry("info", "test", &[]));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "info");
        assert_eq!(value["message"], "test");
        assert_eq!(value["timestamp"], "2023-11-14T22:13:20.000Z");
        assert!(value.get("causes").is_none());
    }
}
