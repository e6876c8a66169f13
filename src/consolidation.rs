//! Wager consolidation.
//!
//! Produces the flagship (largest, democratic) wager from participant
//! votes plus frequency scores, and every subsequent wager from scores
//! alone, tracking used numbers so wagers spread across the board. When
//! structured data runs out, a score-weighted random draw is the last
//! resort.

use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::Rng;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::patterns;
use crate::selection::{GreedySelector, Strictness};
use crate::types::{CandidateNumber, WagerDraft, MAX_NUMBER, MIN_NUMBER};

/// Candidate pool size multiplier: top 4×count numbers feed the selector.
const POOL_FACTOR: usize = 4;
/// Flagship wagers below this quality draw a warning (soft, never blocks).
const FLAGSHIP_QUALITY_FLOOR: u8 = 70;
/// Quality floor for subsequent wagers, logging only.
const STANDARD_QUALITY_FLOOR: u8 = 65;

pub struct ConsolidationEngine {
    selector: GreedySelector,
    used: BTreeSet<u8>,
}

impl Default for ConsolidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsolidationEngine {
    pub fn new() -> Self {
        Self {
            selector: GreedySelector::new(Strictness::High),
            used: BTreeSet::new(),
        }
    }

    /// Numbers already consumed by wagers in this closure.
    pub fn used(&self) -> &BTreeSet<u8> {
        &self.used
    }

    /// The flagship wager: all 60 numbers ranked democratically by
    /// participant votes (score breaks ties), top 4×count as the pool,
    /// high-strictness selection. Generated once per closure.
    pub fn flagship<R: Rng + ?Sized>(
        &mut self,
        votes: &BTreeMap<u8, u32>,
        scores: &BTreeMap<u8, f64>,
        count: usize,
        rng: &mut R,
    ) -> WagerDraft {
        let mut candidates: Vec<CandidateNumber> = (MIN_NUMBER..=MAX_NUMBER)
            .map(|value| CandidateNumber {
                value,
                score: scores.get(&value).copied().unwrap_or(0.0),
                votes: votes.get(&value).copied().unwrap_or(0),
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.votes
                .cmp(&a.votes)
                .then(b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
                .then(a.value.cmp(&b.value))
        });
        candidates.truncate((POOL_FACTOR * count).min(60));

        let numbers = self.selector.select(&candidates, count, rng);
        let report = patterns::evaluate(&numbers);
        if report.score < FLAGSHIP_QUALITY_FLOOR {
            warn!(
                quality = report.score,
                floor = FLAGSHIP_QUALITY_FLOOR,
                "Flagship wager below quality floor"
            );
        }
        debug!(count, quality = report.score, "Flagship wager generated");

        self.mark_used(&numbers);
        WagerDraft::new(numbers)
    }

    /// A subsequent wager from scores alone, avoiding numbers already
    /// used in this closure. The used-set resets to the full 1–60 range
    /// once fewer than `count` fresh numbers remain.
    pub fn subsequent<R: Rng + ?Sized>(
        &mut self,
        scores: &BTreeMap<u8, f64>,
        count: usize,
        rng: &mut R,
    ) -> WagerDraft {
        let mut unused: Vec<u8> = (MIN_NUMBER..=MAX_NUMBER)
            .filter(|n| !self.used.contains(n))
            .collect();
        if unused.len() < count {
            debug!(
                unused = unused.len(),
                count, "Number space exhausted — resetting used-set"
            );
            self.used.clear();
            unused = (MIN_NUMBER..=MAX_NUMBER).collect();
        }

        let mut candidates: Vec<CandidateNumber> = unused
            .iter()
            .filter_map(|&value| {
                scores.get(&value).map(|&score| CandidateNumber {
                    value,
                    score,
                    votes: 0,
                })
            })
            .collect();

        let numbers = if candidates.len() < count {
            // Degenerate score data: structured selection is impossible,
            // draw proportionally to whatever scores exist.
            debug!(
                scored = candidates.len(),
                count, "Too few scored candidates — score-weighted random draw"
            );
            score_weighted_draw(&unused, scores, count, rng)
        } else {
            candidates.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(Ordering::Equal)
                    .then(a.value.cmp(&b.value))
            });
            candidates.truncate((POOL_FACTOR * count).min(60));
            self.selector.select(&candidates, count, rng)
        };

        let report = patterns::evaluate(&numbers);
        if report.score < STANDARD_QUALITY_FLOOR {
            warn!(
                quality = report.score,
                floor = STANDARD_QUALITY_FLOOR,
                "Subsequent wager below quality floor"
            );
        }

        self.mark_used(&numbers);
        WagerDraft::new(numbers)
    }

    fn mark_used(&mut self, numbers: &[u8]) {
        self.used.extend(numbers.iter().copied());
    }
}

/// Draw `count` distinct numbers from `pool`, each number's probability
/// proportional to its score. Numbers without a score get the smallest
/// positive score seen (uniform weight when no scores exist at all).
/// No pattern constraints apply here; this path exists only when the
/// structured data is insufficient.
pub fn score_weighted_draw<R: Rng + ?Sized>(
    pool: &[u8],
    scores: &BTreeMap<u8, f64>,
    count: usize,
    rng: &mut R,
) -> Vec<u8> {
    let floor = scores
        .values()
        .copied()
        .filter(|s| *s > 0.0)
        .fold(f64::INFINITY, f64::min);
    let floor = if floor.is_finite() { floor } else { 1.0 };

    let mut remaining: Vec<u8> = pool.to_vec();
    let mut drawn = Vec::with_capacity(count);
    while drawn.len() < count && !remaining.is_empty() {
        let weights: Vec<f64> = remaining
            .iter()
            .map(|n| match scores.get(n) {
                Some(&s) if s > 0.0 => s,
                _ => floor,
            })
            .collect();
        let index = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(rng),
            Err(_) => rng.gen_range(0..remaining.len()),
        };
        drawn.push(remaining.swap_remove(index));
    }
    drawn.sort_unstable();
    drawn
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
