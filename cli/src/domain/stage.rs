//! Level planning for the stage orchestrator.

use testbed_common::StageLevel;

/// Levels to execute, in order, for a `target` level and optional `skip` level.
///
/// Every level at or below `skip` is bypassed; nothing above `target` runs.
#[must_use]
pub fn plan(target: StageLevel, skip: Option<StageLevel>) -> Vec<StageLevel> {
    let first = match skip {
        Some(level) => level.next(),
        None => StageLevel::ALL.first().copied(),
    };
    std::iter::successors(first, |l| l.next())
        .take_while(|l| *l <= target)
        .collect()
}
