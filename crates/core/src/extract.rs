//! Splits raw source content into logical lines.

/// Split `raw` into its non-blank lines, in source order.
///
/// Lines are separated by `\n` (a preceding `\r` is dropped with it). Lines
/// that are empty or contain only whitespace are skipped; every other line is
/// kept exactly as written, including leading and trailing spaces.
pub fn extract(raw: &str) -> Vec<String> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}
