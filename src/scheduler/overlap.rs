//! File-overlap detection, the single interference signal
//!
//! Two tasks overlap when one's write set (writes plus creates) intersects
//! the other's read-or-write set. Paths compare as exact strings; callers
//! own any normalization.

use std::collections::HashSet;

use crate::models::Task;

pub fn files_overlap(a: &Task, b: &Task) -> bool {
    writes_into(a, b) || writes_into(b, a)
}

/// True when `writer`'s writes or creates touch anything `other` reads,
/// writes, or creates.
fn writes_into(writer: &Task, other: &Task) -> bool {
    let written: HashSet<&str> = writer
        .writes
        .iter()
        .chain(writer.creates.iter())
        .map(String::as_str)
        .collect();
    if written.is_empty() {
        return false;
    }

    other
        .reads
        .iter()
        .chain(other.writes.iter())
        .chain(other.creates.iter())
        .any(|p| written.contains(p.as_str()))
}
