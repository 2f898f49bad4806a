//! Priority scoring.
//!
//! A unit's score is a pure function of its path, kind and size:
//!
//! ```text
//! score = tier(class)
//!       + entry_point_bonus   (code files named like an entry point)
//!       + location_bonus      (code files under src/, lib/, pkg/, ...)
//!       + heading bonus       (markdown sections at level 1 or 2)
//!       + small_unit_bonus    (size < small_unit_chars)
//!       - large_unit_penalty  (size > large_unit_chars)
//! ```
//!
//! With equal size and location, units therefore order by tier:
//! doc root > docs tree > config > entry point > source > other > test > generated.

use serde::{Deserialize, Serialize};

use crate::chunking::ContentUnit;
use crate::classify::{self, PathClass};
use crate::config::ScoringConfig;

/// A unit with its score and the classification that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredUnit {
    pub unit: ContentUnit,
    pub score: f64,
    pub class: PathClass,
    pub is_entry_point: bool,
    pub is_doc: bool,
}

/// Deterministic scorer.
#[derive(Debug, Clone, Default)]
pub struct PriorityScorer {
    config: ScoringConfig,
}

impl PriorityScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    fn tier(&self, class: PathClass) -> f64 {
        let c = &self.config;
        match class {
            PathClass::DocRoot => c.doc_root,
            PathClass::DocsTree => c.docs_tree,
            PathClass::Config => c.config,
            PathClass::EntryPoint => c.entry_point,
            PathClass::Source => c.source,
            PathClass::Other => c.other,
            PathClass::Test => c.test,
            PathClass::Generated => c.generated,
        }
    }

    pub fn score(&self, unit: ContentUnit) -> ScoredUnit {
        let c = &self.config;
        let class = classify::classify_path(&unit.path);
        let is_code = matches!(class, PathClass::EntryPoint | PathClass::Source);
        let is_entry_point = is_code && classify::is_entry_point(&unit.path);

        let mut score = self.tier(class);
        if is_entry_point {
            score += c.entry_point_bonus;
        }
        if is_code && classify::in_source_root(&unit.path) {
            score += c.location_bonus;
        }
        match unit.kind.heading_level() {
            Some(1) => score += c.heading_l1_bonus,
            Some(2) => score += c.heading_l2_bonus,
            _ => {}
        }
        if unit.size < c.small_unit_chars {
            score += c.small_unit_bonus;
        } else if unit.size > c.large_unit_chars {
            score -= c.large_unit_penalty;
        }

        ScoredUnit {
            score,
            class,
            is_entry_point,
            is_doc: class.is_doc(),
            unit,
        }
    }

    pub fn score_all(&self, units: Vec<ContentUnit>) -> Vec<ScoredUnit> {
        units.into_iter().map(|u| self.score(u)).collect()
    }
}
