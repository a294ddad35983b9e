//! Terminal styling for tdm-tree output.

use std::io::IsTerminal;

use owo_colors::{OwoColorize, Style};
use tdm_tree::CapabilityKind;

fn paint(text: &str, style: Style, stream_is_terminal: bool) -> String {
    if stream_is_terminal {
        format!("{}", text.style(style))
    } else {
        text.to_string()
    }
}

/// Summary lines on stdout.
pub fn success(text: impl AsRef<str>) -> String {
    paint(
        text.as_ref(),
        Style::new().green(),
        std::io::stdout().is_terminal(),
    )
}

/// Per-event replay failures on stderr.
pub fn warning(text: impl AsRef<str>) -> String {
    paint(
        text.as_ref(),
        Style::new().yellow(),
        std::io::stderr().is_terminal(),
    )
}

pub fn error(text: impl AsRef<str>) -> String {
    paint(
        text.as_ref(),
        Style::new().red().bold(),
        std::io::stderr().is_terminal(),
    )
}

/// Capability kind column of `tdm-tree capabilities`.
pub fn kind(kind: CapabilityKind) -> String {
    let style = match kind {
        CapabilityKind::Sensor => Style::new().cyan(),
        CapabilityKind::Status => Style::new().blue(),
        CapabilityKind::Toggle => Style::new().magenta(),
        CapabilityKind::Composite => Style::new().yellow(),
    };
    paint(
        &format!("{:<9}", kind.as_str()),
        style,
        std::io::stdout().is_terminal(),
    )
}
