//! Termination control for the cross-peeling decode loop.

use hashbrown::HashSet;
use nohash_hasher::BuildNoHashHasher;

use super::XorItem;

/// Default number of consecutive empty steps before giving up.
pub const DEFAULT_EMPTY_LIMIT: usize = 3;

type SeenSet = HashSet<u64, BuildNoHashHasher<u64>>;

/// Decides when the coordinator's decode loop stops.
///
/// `Simple` stops after a run of empty steps. `Tabu` (the default, with
/// limit 3) additionally tracks the rolling XOR of every emitted key and
/// stops as soon as a value repeats: the same multiset of keys is then
/// circulating between tables, which is the livelock false-positive
/// cells can cause.
pub enum DecodeController {
    /// Stop after `limit` consecutive empty steps.
    Simple {
        /// Empty-step limit.
        limit: usize,
        /// Consecutive empty steps seen so far.
        empty_steps: usize,
    },
    /// Empty-step limit plus the rolling-XOR cycle check.
    Tabu {
        /// Empty-step limit.
        limit: usize,
        /// Consecutive empty steps seen so far.
        empty_steps: usize,
        /// XOR of every key emitted since the last reset.
        rolling: u64,
        /// Rolling values already visited.
        seen: SeenSet,
    },
}

impl DecodeController {
    /// Empty-step control only.
    pub fn simple(limit: usize) -> Self {
        DecodeController::Simple {
            limit,
            empty_steps: 0,
        }
    }

    /// Empty-step control plus the cycle breaker.
    pub fn tabu(limit: usize) -> Self {
        let mut controller = DecodeController::Tabu {
            limit,
            empty_steps: 0,
            rolling: 0,
            seen: SeenSet::default(),
        };
        controller.reset();
        controller
    }

    /// Clear counters and the seen-set, ready for a fresh decode.
    pub fn reset(&mut self) {
        match self {
            DecodeController::Simple { empty_steps, .. } => *empty_steps = 0,
            DecodeController::Tabu {
                empty_steps,
                rolling,
                seen,
                ..
            } => {
                *empty_steps = 0;
                *rolling = 0;
                seen.clear();
                // the empty prefix counts as visited
                seen.insert(0);
            }
        }
    }

    /// Observe one decode step's emissions; returns whether the loop
    /// should continue.
    pub fn observe_step<T: XorItem>(&mut self, step: &[T]) -> bool {
        match self {
            DecodeController::Simple { limit, empty_steps } => {
                if step.is_empty() {
                    *empty_steps += 1;
                    *empty_steps < *limit
                } else {
                    *empty_steps = 0;
                    true
                }
            }
            DecodeController::Tabu {
                limit,
                empty_steps,
                rolling,
                seen,
            } => {
                if step.is_empty() {
                    *empty_steps += 1;
                    return *empty_steps < *limit;
                }
                *empty_steps = 0;
                for item in step {
                    *rolling ^= item.key();
                }
                seen.insert(*rolling)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_counts_empty_runs() {
        let mut controller = DecodeController::simple(3);
        controller.reset();
        assert!(controller.observe_step(&[1u64]));
        assert!(controller.observe_step(&[] as &[u64]));
        assert!(controller.observe_step(&[] as &[u64]));
        // a non-empty step resets the run
        assert!(controller.observe_step(&[2u64]));
        assert!(controller.observe_step(&[] as &[u64]));
        assert!(controller.observe_step(&[] as &[u64]));
        assert!(!controller.observe_step(&[] as &[u64]));
    }

    #[test]
    fn test_tabu_stops_on_cycle() {
        let mut controller = DecodeController::tabu(3);
        controller.reset();
        assert!(controller.observe_step(&[1u64, 2u64]));
        assert!(controller.observe_step(&[4u64]));
        // 1 ^ 2 ^ 4 ^ 4 revisits the rolling value after the first step
        assert!(!controller.observe_step(&[4u64]));
    }

    #[test]
    fn test_tabu_stops_on_return_to_empty() {
        let mut controller = DecodeController::tabu(3);
        controller.reset();
        // emitting a pair that XORs back to zero is a cycle with the
        // empty prefix
        assert!(!controller.observe_step(&[9u64, 9u64]));
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut controller = DecodeController::tabu(3);
        controller.reset();
        assert!(controller.observe_step(&[1u64]));
        controller.reset();
        assert!(controller.observe_step(&[1u64]));
    }
}
