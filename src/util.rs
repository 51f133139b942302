//! Small text-formatting helpers shared by announcements and scoreboards.

use std::fmt::Display;

/// Joins items into a human-readable, comma-separated list, with the last
/// element joined by `joiner`.
///
/// Uses an Oxford comma; without one, three-element output is ambiguous.
/// An empty sequence produces an empty string.
pub fn human_join<T: Display>(items: &[T], joiner: &str) -> String {
    match items {
        [] => String::new(),
        [only] => only.to_string(),
        [first, second] => format!("{} {} {}", first, joiner, second),
        [init @ .., last] => {
            let init = init
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!("{}, {} {}", init, joiner, last)
        }
    }
}

/// Renders a two-column T-chart with the left column padded to the widest
/// key. Empty input renders as an empty string.
pub fn tchart<K: Display, V: Display>(rows: &[(K, V)]) -> String {
    let keys: Vec<String> = rows.iter().map(|(k, _)| k.to_string()).collect();
    let width = keys.iter().map(|k| k.chars().count()).max().unwrap_or(0);

    keys.iter()
        .zip(rows)
        .map(|(key, (_, value))| format!("{:<width$} | {}", key, value, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
