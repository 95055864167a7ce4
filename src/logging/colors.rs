use std::collections::{BTreeMap, HashMap};

use yansi::{Color, Condition, Paint, Style};

/// Level name -> pre-rendered console label.
#[derive(Debug, Default, Clone)]
pub struct ColorTable {
    labels: HashMap<String, Label>,
}

#[derive(Debug, Clone)]
struct Label {
    spaced: String,
    bare: String,
}

impl ColorTable {
    /// Levels whose color name isn't recognized are left out, the console
    /// falls back to a plain label for them.
    pub fn build(colors: &BTreeMap<String, String>) -> Self {
        let labels = colors
            .iter()
            .filter_map(|(level, color)| {
                let style = style_for(color)?;
                Some((
                    level.clone(),
                    Label {
                        spaced: paint(&format!(" [{}]", level), style),
                        bare: paint(&format!("[{}]", level), style),
                    },
                ))
            })
            .collect();

        Self { labels }
    }

    /// The decorated `" [level]"` label, if the level has a known color.
    pub fn label(&self, level: &str) -> Option<&str> {
        self.labels.get(level).map(|l| l.spaced.as_str())
    }

    /// Same as [`ColorTable::label`] without the leading space.
    pub fn bare_label(&self, level: &str) -> Option<&str> {
        self.labels.get(level).map(|l| l.bare.as_str())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

fn paint(text: &str, style: Style) -> String {
    // Always emit escapes, whether stdout is a terminal is the sink's concern.
    text.paint(style).whenever(Condition::ALWAYS).to_string()
}

/// Resolves a color name as used in settings files (`red`, `brightBlue`,
/// `bgYellow`, `bold`, ...) to a style.
pub fn style_for(name: &str) -> Option<Style> {
    let style = Style::new();

    if let Some(color) = color_for(name) {
        return Some(style.fg(color));
    }

    if let Some(bg) = name.strip_prefix("bg") {
        let mut chars = bg.chars();
        let first = chars.next()?.to_ascii_lowercase();
        let rest: String = chars.collect();
        return color_for(&format!("{}{}", first, rest)).map(|c| style.bg(c));
    }

    match name {
        "bold" => Some(style.bold()),
        "dim" => Some(style.dim()),
        "italic" => Some(style.italic()),
        "underline" => Some(style.underline()),
        "inverse" => Some(style.invert()),
        "hidden" => Some(style.conceal()),
        "strikethrough" => Some(style.strike()),
        _ => None,
    }
}

fn color_for(name: &str) -> Option<Color> {
    let color = match name {
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        "white" => Color::White,
        "gray" | "grey" | "brightBlack" => Color::BrightBlack,
        "brightRed" => Color::BrightRed,
        "brightGreen" => Color::BrightGreen,
        "brightYellow" => Color::BrightYellow,
        "brightBlue" => Color::BrightBlue,
        "brightMagenta" => Color::BrightMagenta,
        "brightCyan" => Color::BrightCyan,
        "brightWhite" => Color::BrightWhite,
        _ => return None,
    };
    Some(color)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(&str, &str)]) -> ColorTable {
        ColorTable::build(
            &pairs
                .iter()
                .map(|(l, c)| (l.to_string(), c.to_string()))
                .collect(),
        )
    }

    #[test]
    fn known_colors_are_decorated() {
        let table = table(&[("info", "green"), ("warn", "bgYellow"), ("error", "bold")]);
        assert_eq!(table.len(), 3);

        let info = table.label("info").unwrap();
        assert!(info.contains(" [info]"));
        assert!(info.starts_with("\x1b["));
        assert_ne!(info, " [info]");
        assert!(table.bare_label("info").unwrap().contains("[info]"));
    }

    #[test]
    fn unknown_colors_are_skipped() {
        let table = table(&[("info", "green"), ("debug", "chartreuse")]);
        assert!(table.label("debug").is_none());
        assert!(table.label("info").is_some());
        assert!(table.label("silly").is_none());
    }

    #[test]
    fn style_names() {
        assert!(style_for("grey").is_some());
        assert!(style_for("brightCyan").is_some());
        assert!(style_for("bgRed").is_some());
        assert!(style_for("bg").is_none());
        assert!(style_for("rainbow").is_none());
    }
}
