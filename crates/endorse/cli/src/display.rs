//! Terminal output helpers

use colored::Colorize;

/// One port per line, or a warning when there are none
pub(crate) fn port_list(ports: &[String]) -> String {
    if ports.is_empty() {
        return format!("{}", "No serial ports detected!".yellow().bold());
    }
    ports.join("\n")
}

/// Modem identity with the labels highlighted
pub(crate) fn device_info(info: &str) -> String {
    info.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match line.split_once(": ") {
            Some((label, value)) => format!("{}: {value}", label.bold()),
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
