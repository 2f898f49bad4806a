//! Greedy budget allocation.
//!
//! Units are walked in descending score order (ties keep discovery order)
//! while a running total is kept:
//!
//! 1. a unit larger than the whole budget is dropped on its own
//! 2. a unit that still fits is kept verbatim and charged its size
//! 3. otherwise, if a summary of `summary_estimate` fits, it is summarized and
//!    charged the estimate
//! 4. otherwise it is dropped, and so is every unit after it
//!
//! Step 4 latches so that no lower-scored unit is kept once a higher-scored one
//! was turned away for lack of room. This is a knapsack approximation, not an
//! optimum.

use serde::{Deserialize, Serialize};

use crate::scoring::ScoredUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Verbatim,
    Summarize,
    Drop,
}

/// Allocation outcome for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetDecision {
    pub unit_id: String,
    pub decision: Decision,
    /// Size counted against the budget: the unit size, the summary estimate, or 0.
    pub charged: usize,
    /// Position in the score-sorted walk (0 = highest score).
    pub rank: usize,
}

/// Counts and usage over a decision list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationTotals {
    pub verbatim: usize,
    pub summarized: usize,
    pub dropped: usize,
    pub used: usize,
}

impl AllocationTotals {
    pub fn from_decisions(decisions: &[BudgetDecision]) -> Self {
        decisions.iter().fold(Self::default(), |mut t, d| {
            match d.decision {
                Decision::Verbatim => t.verbatim += 1,
                Decision::Summarize => t.summarized += 1,
                Decision::Drop => t.dropped += 1,
            }
            t.used += d.charged;
            t
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BudgetAllocator {
    summary_estimate: usize,
}

impl BudgetAllocator {
    pub fn new(summary_estimate: usize) -> Self {
        Self { summary_estimate }
    }

    /// Decide every unit. The output is aligned with `units` (index `i` is the
    /// decision for `units[i]`). `size_fn` measures a unit in budget units.
    pub fn allocate<F>(&self, units: &[ScoredUnit], budget: i64, size_fn: F) -> Vec<BudgetDecision>
    where
        F: Fn(&ScoredUnit) -> usize,
    {
        let mut order: Vec<usize> = (0..units.len()).collect();
        // `sort_by` is stable, so equal scores keep discovery order.
        order.sort_by(|&a, &b| units[b].score.total_cmp(&units[a].score));

        let budget = usize::try_from(budget).unwrap_or(0);
        let mut decisions: Vec<Option<BudgetDecision>> = vec![None; units.len()];
        let mut used = 0usize;
        let mut exhausted = budget == 0;

        for (rank, &index) in order.iter().enumerate() {
            let unit = &units[index];
            let size = size_fn(unit);
            let (decision, charged) = if exhausted || size > budget {
                (Decision::Drop, 0)
            } else if used + size <= budget {
                (Decision::Verbatim, size)
            } else if used + self.summary_estimate <= budget {
                (Decision::Summarize, self.summary_estimate)
            } else {
                exhausted = true;
                (Decision::Drop, 0)
            };
            used += charged;
            decisions[index] = Some(BudgetDecision {
                unit_id: unit.unit.unit_id.clone(),
                decision,
                charged,
                rank,
            });
        }

        decisions.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkSplitter;

    fn scored(id: usize, size: usize, score: f64) -> ScoredUnit {
        let mut unit = ChunkSplitter::default()
            .split_text("notes.txt", "x")
            .remove(0);
        unit.unit_id = format!("u{id}");
        unit.size = size;
        ScoredUnit {
            class: crate::classify::PathClass::Other,
            unit,
            score,
            is_entry_point: false,
            is_doc: false,
        }
    }

    fn decide(units: &[ScoredUnit], budget: i64) -> Vec<Decision> {
        BudgetAllocator::new(150)
            .allocate(units, budget, |u| u.unit.size)
            .into_iter()
            .map(|d| d.decision)
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(decide(&[], 1_000).is_empty());
    }

    #[test]
    fn test_non_positive_budget_drops_everything() {
        let units = vec![scored(0, 1, 10.0), scored(1, 1, 5.0)];
        assert_eq!(decide(&units, 0), vec![Decision::Drop; 2]);
        assert_eq!(decide(&units, -5), vec![Decision::Drop; 2]);
    }

    #[test]
    fn test_three_units_two_fit() {
        let units = vec![
            scored(0, 400, 90.0),
            scored(1, 400, 80.0),
            scored(2, 400, 70.0),
        ];
        let decisions = BudgetAllocator::new(150).allocate(&units, 1_000, |u| u.unit.size);
        let kinds: Vec<_> = decisions.iter().map(|d| d.decision).collect();
        assert_eq!(
            kinds,
            vec![Decision::Verbatim, Decision::Verbatim, Decision::Summarize]
        );
        assert_eq!(AllocationTotals::from_decisions(&decisions).used, 950);
    }

    #[test]
    fn test_output_aligned_to_input_not_rank() {
        let units = vec![scored(0, 10, 1.0), scored(1, 10, 99.0)];
        let decisions = BudgetAllocator::new(150).allocate(&units, 100, |u| u.unit.size);
        assert_eq!(decisions[0].unit_id, "u0");
        assert_eq!(decisions[0].rank, 1);
        assert_eq!(decisions[1].rank, 0);
    }

    #[test]
    fn test_ties_keep_discovery_order() {
        let units = vec![
            scored(0, 60, 50.0),
            scored(1, 60, 50.0),
            scored(2, 60, 50.0),
        ];
        let decisions = BudgetAllocator::new(10).allocate(&units, 130, |u| u.unit.size);
        let ranks: Vec<_> = decisions.iter().map(|d| d.rank).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
        assert_eq!(decisions[2].decision, Decision::Summarize);
    }

    #[test]
    fn test_oversized_unit_dropped_without_blocking_others() {
        let units = vec![scored(0, 5_000, 100.0), scored(1, 300, 10.0)];
        assert_eq!(
            decide(&units, 1_000),
            vec![Decision::Drop, Decision::Verbatim]
        );
    }

    #[test]
    fn test_drop_latches_for_lower_scores() {
        // After u1 cannot even be summarized, the tiny u2 must not sneak in.
        let units = vec![
            scored(0, 900, 90.0),
            scored(1, 500, 80.0),
            scored(2, 20, 10.0),
        ];
        assert_eq!(
            decide(&units, 1_000),
            vec![Decision::Verbatim, Decision::Drop, Decision::Drop]
        );
    }
}
