//! Debug assertion macros for sequencing invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]` via
//! `debug_assert!`), so there is zero overhead in release builds.
//!
//! Used by the sequencer and both pollers.

// =============================================================================
// Bounded claim
// =============================================================================

/// Assert that a producer never claims more than one lap ahead of consumers.
///
/// **Invariant**: `claimed - gating ≤ capacity`
///
/// Used in: `Sequencer::next()` after the wrap-point wait
macro_rules! debug_assert_bounded_claim {
    ($claimed:expr, $gating:expr, $capacity:expr) => {
        debug_assert!(
            $claimed - $gating <= $capacity,
            "bounded claim violated: claimed {} is more than {} ahead of gating {}",
            $claimed,
            $capacity,
            $gating
        )
    };
}

// =============================================================================
// Monotonic progress
// =============================================================================

/// Assert that a sequence only moves forward.
///
/// **Invariant**: `new_value ≥ old_value`
///
/// Used in: single-consumer gating publish, single-producer claim
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "monotonic progress violated: {} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// Contiguous frontier
// =============================================================================

/// Assert that the highest drainable sequence lies inside the polled window.
///
/// **Invariant**: `next - 1 ≤ highest ≤ available`
///
/// Used in: both pollers after `Sequencer::highest_published()`
macro_rules! debug_assert_highest_in_window {
    ($highest:expr, $next:expr, $available:expr) => {
        debug_assert!(
            $highest >= $next - 1 && $highest <= $available,
            "frontier violated: highest {} outside window [{}, {}]",
            $highest,
            $next - 1,
            $available
        )
    };
}

pub(crate) use debug_assert_bounded_claim;
pub(crate) use debug_assert_highest_in_window;
pub(crate) use debug_assert_monotonic;
