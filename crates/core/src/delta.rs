//! Delta resolution against a stored checkpoint.
//!
//! Matching is by content only. When the checkpointed text occurs more than
//! once, the first occurrence wins, so lines between that occurrence and the
//! one actually delivered are offered again. That over-delivery is accepted;
//! nothing here tracks positions.

/// Return the lines that come after `checkpoint`.
///
/// With no checkpoint every line is new. When the checkpoint no longer occurs
/// in `lines` (truncated or rotated source) every line is new as well, so
/// content the collector never saw is not skipped.
pub fn resolve<'a>(lines: &'a [String], checkpoint: Option<&str>) -> &'a [String] {
    let Some(checkpoint) = checkpoint else {
        return lines;
    };

    match lines.iter().position(|line| line == checkpoint) {
        Some(i) => &lines[i + 1..],
        None => lines,
    }
}
