//! Eviction policy.
//!
//! Candidates are ranked by `(matches_wanted_type, use_count)` ascending:
//! slots whose animated-ness differs from the incoming slot go first, then
//! the least used. Ties keep candidate order, so callers passing an
//! insertion-ordered snapshot get the oldest slot.

use emoterelay_core::slot::Slot;

/// Pick the name of the slot to evict, or `None` if there are no candidates.
pub fn choose(candidates: &[Slot], want_animated: bool) -> Option<&str> {
    candidates
        .iter()
        .min_by_key(|slot| (slot.is_animated == want_animated, slot.use_count))
        .map(|slot| slot.name.as_str())
}
