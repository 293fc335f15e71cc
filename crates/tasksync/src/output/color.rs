//! Color and styling helpers for CLI output.
//!
//! Semantic Color Theme:
//!   - Success:   green   (created, unblocked, recovered)
//!   - Warning:   yellow  (blocked, warnings)
//!   - Error:     red     (failures)
//!   - Reference: cyan    (issue numbers, task ids)
//!   - Muted:     dimmed  (field labels, zero counters)
//!   - Emphasis:  bold    (section headers)

use colored::Colorize;

use super::OutputConfig;

/// Apply semantic "success" color (green) to text.
pub fn success(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.green().to_string()
}

/// Apply semantic "error" color (red) to text.
pub fn error(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.red().to_string()
}

/// Apply semantic "warning" color (yellow) to text.
pub fn warning(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.yellow().to_string()
}

/// Apply semantic "info" color (cyan) to text.
pub fn info(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.cyan().to_string()
}

/// Dim secondary text.
pub fn muted(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.dimmed().to_string()
}

/// Bold section headers.
pub fn header(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.bold().to_string()
}

/// A counter, dimmed when zero.
pub(crate) fn count(n: usize, config: &OutputConfig) -> String {
    let text = n.to_string();
    if n == 0 { muted(&text, config) } else { text }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_when_colors_disabled() {
        let config = OutputConfig::new(false);
        assert_eq!(success("ok", &config), "ok");
        assert_eq!(error("bad", &config), "bad");
        assert_eq!(header("Sync", &config), "Sync");
        assert_eq!(count(0, &config), "0");
    }

    #[test]
    fn test_colored_when_enabled() {
        colored::control::set_override(true);
        let config = OutputConfig::new(true);
        assert_ne!(warning("blocked", &config), "blocked");
        assert!(warning("blocked", &config).contains("blocked"));
        colored::control::unset_override();
    }
}
