//! Greedy number selection.
//!
//! Builds one wager's number set from a ranked candidate pool under a
//! tunable strictness policy. The constraint cascade is explicit:
//! medium adds run and decade-concentration checks, high adds parity.
//! When the greedy pass comes up short, a decade-balanced random
//! fallback completes the set. The random source is injected so tests
//! can seed it.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::patterns;
use crate::types::{decade_of, CandidateNumber, MAX_NUMBER, MIN_NUMBER};

/// Parity bounds enforced at high strictness.
const PARITY_FLOOR: f64 = 0.20;
const PARITY_CEIL: f64 = 0.80;
/// Rejection attempts per fallback slot before accepting an imperfect draw.
const FALLBACK_ATTEMPTS: usize = 10;

// ---------------------------------------------------------------------------
// Strictness
// ---------------------------------------------------------------------------

/// How aggressively anti-pattern rules are enforced during selection.
///
/// An enumerated tier rather than an option bag, so the cascade is
/// explicit and exhaustive: `Low` applies no checks, `Medium` adds run
/// and decade-concentration checks, `High` adds parity on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    Low,
    Medium,
    High,
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strictness::Low => write!(f, "low"),
            Strictness::Medium => write!(f, "medium"),
            Strictness::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Strictness {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Strictness::Low),
            "medium" => Ok(Strictness::Medium),
            "high" => Ok(Strictness::High),
            _ => Err(anyhow::anyhow!("Unknown strictness tier: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Greedy selector
// ---------------------------------------------------------------------------

pub struct GreedySelector {
    strictness: Strictness,
}

impl GreedySelector {
    pub fn new(strictness: Strictness) -> Self {
        Self { strictness }
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    /// Select `count` numbers from the ranked candidate pool.
    ///
    /// Candidates are consumed in the order given (the caller ranks by
    /// votes desc, then score desc). The result is always `count`
    /// numbers, sorted ascending; the fallback guarantees completion
    /// even from a degenerate pool. Quality is re-validated for logging
    /// only and never blocks the return.
    pub fn select<R: Rng + ?Sized>(
        &self,
        candidates: &[CandidateNumber],
        count: usize,
        rng: &mut R,
    ) -> Vec<u8> {
        let mut chosen: Vec<u8> = Vec::with_capacity(count);

        for candidate in candidates {
            if chosen.len() == count {
                break;
            }
            let value = candidate.value;
            if !(MIN_NUMBER..=MAX_NUMBER).contains(&value) || chosen.contains(&value) {
                continue;
            }
            if let Some(reason) = self.rejection(&chosen, value, count) {
                debug!(value, reason, strictness = %self.strictness, "Candidate skipped");
                continue;
            }
            chosen.push(value);
        }

        if chosen.len() < count {
            debug!(
                have = chosen.len(),
                want = count,
                "Greedy pass short — invoking decade-balanced fallback"
            );
            self.decade_balanced_fill(&mut chosen, count, rng);
        }

        chosen.sort_unstable();

        let report = patterns::evaluate(&chosen);
        if report.is_valid() {
            debug!(quality = report.score, "Selection complete");
        } else {
            warn!(quality = report.score, issues = report.issues.len(), "Selection below quality threshold");
        }

        chosen
    }

    /// Why a candidate would be skipped under the current strictness,
    /// or `None` if it is acceptable.
    fn rejection(&self, chosen: &[u8], value: u8, count: usize) -> Option<&'static str> {
        if self.strictness < Strictness::Medium {
            return None;
        }

        let mut trial: Vec<u8> = chosen.to_vec();
        trial.push(value);
        if patterns::has_run_issue(&trial) {
            return Some("run");
        }

        // Concentration and parity only engage once half the target is
        // filled; the first half of picks stays unconstrained to
        // preserve pool diversity.
        let half_filled = chosen.len() * 2 >= count;
        if !half_filled {
            return None;
        }

        // A candidate is only at fault for its own decade: numbers from
        // an underfilled band stay acceptable even when another band is
        // already past the ceiling.
        let own_decade = decade_of(value);
        let decade_count = trial.iter().filter(|&&n| decade_of(n) == own_decade).count();
        if decade_count as f64 / trial.len() as f64 > patterns::concentration_limit(count) {
            return Some("decade_concentration");
        }

        if self.strictness == Strictness::High {
            let evens = trial.iter().filter(|&&n| n % 2 == 0).count();
            let ratio = evens as f64 / trial.len() as f64;
            if !(PARITY_FLOOR..=PARITY_CEIL).contains(&ratio) {
                return Some("parity");
            }
        }

        None
    }

    /// Complete a short selection with uniform draws balanced across the
    /// three decades. Each slot gets up to `FALLBACK_ATTEMPTS` redraws
    /// to avoid creating a run; an imperfect draw is accepted after that.
    fn decade_balanced_fill<R: Rng + ?Sized>(
        &self,
        chosen: &mut Vec<u8>,
        count: usize,
        rng: &mut R,
    ) {
        let targets = decade_targets(count);
        let mut pools: [Vec<u8>; 3] = Default::default();
        for n in MIN_NUMBER..=MAX_NUMBER {
            if !chosen.contains(&n) {
                pools[decade_of(n)].push(n);
            }
        }

        for decade in 0..3 {
            let have = chosen.iter().filter(|&&n| decade_of(n) == decade).count();
            let mut deficit = targets[decade].saturating_sub(have);
            while deficit > 0 && chosen.len() < count && !pools[decade].is_empty() {
                let value = draw_avoiding_runs(&pools[decade], chosen, rng);
                pools[decade].retain(|&n| n != value);
                chosen.push(value);
                deficit -= 1;
            }
        }

        // Targets exhausted but still short (small pools, large counts):
        // top up from whatever remains, same rejection policy.
        while chosen.len() < count {
            let remaining: Vec<u8> = pools.iter().flatten().copied().collect();
            if remaining.is_empty() {
                break;
            }
            let value = draw_avoiding_runs(&remaining, chosen, rng);
            pools[decade_of(value)].retain(|&n| n != value);
            chosen.push(value);
        }
    }
}

/// Target decade split for a full wager of `count` picks.
fn decade_targets(count: usize) -> [usize; 3] {
    match count {
        n if n >= 9 => [3, 3, 3],
        8 => [3, 3, 2],
        7 => [2, 2, 3],
        _ => [2, 2, 2],
    }
}

/// Uniform draw from `pool`, redrawing up to `FALLBACK_ATTEMPTS` times
/// when the draw would sit adjacent to an already-chosen number.
fn draw_avoiding_runs<R: Rng + ?Sized>(pool: &[u8], chosen: &[u8], rng: &mut R) -> u8 {
    debug_assert!(!pool.is_empty());
    let mut value = pool[rng.gen_range(0..pool.len())];
    for _ in 0..FALLBACK_ATTEMPTS {
        let adjacent = chosen.iter().any(|&c| c.abs_diff(value) == 1);
        if !adjacent {
            break;
        }
        value = pool[rng.gen_range(0..pool.len())];
    }
    value
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
