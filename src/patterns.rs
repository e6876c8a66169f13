//! Anti-pattern analyzer.
//!
//! Scores a number set against four statistical "human pattern" rules:
//! consecutive runs, parity skew, decade clustering, and multiples.
//! Pure and side-effect free; findings are advisory issues attached to
//! a `QualityReport`, never errors.

use serde_json::json;

use crate::types::{decade_of, IssueKind, PatternIssue, QualityReport, Severity};

/// Parity ratio band considered balanced.
const PARITY_LOW: f64 = 0.30;
const PARITY_HIGH: f64 = 0.70;
/// Beyond these the skew counts as extreme.
const PARITY_EXTREME_LOW: f64 = 0.20;
const PARITY_EXTREME_HIGH: f64 = 0.80;

/// Maximal consecutive runs in a set, as (start, length) over the
/// sorted distinct values.
pub fn runs(numbers: &[u8]) -> Vec<(u8, usize)> {
    let mut sorted: Vec<u8> = numbers.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut out = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let start = sorted[i];
        let mut len = 1;
        while i + len < sorted.len() && sorted[i + len] == sorted[i + len - 1] + 1 {
            len += 1;
        }
        out.push((start, len));
        i += len;
    }
    out
}

/// Whether the set trips the run rule: any run of 3+ consecutive
/// numbers, or more than one adjacent pair.
pub fn has_run_issue(numbers: &[u8]) -> bool {
    let runs = runs(numbers);
    let pairs = runs.iter().filter(|(_, len)| *len == 2).count();
    runs.iter().any(|(_, len)| *len >= 3) || pairs > 1
}

/// Occupancy of the three decade bands (1–20, 21–40, 41–60).
pub fn decade_counts(numbers: &[u8]) -> [usize; 3] {
    let mut counts = [0usize; 3];
    for &n in numbers {
        counts[decade_of(n)] += 1;
    }
    counts
}

/// Fraction of the set sitting in its fullest decade band.
pub fn decade_concentration(numbers: &[u8]) -> f64 {
    if numbers.is_empty() {
        return 0.0;
    }
    let max = *decade_counts(numbers).iter().max().unwrap_or(&0);
    max as f64 / numbers.len() as f64
}

/// Concentration ceiling for a wager of `count` picks.
pub fn concentration_limit(count: usize) -> f64 {
    match count {
        n if n >= 8 => 0.60,
        7 => 0.65,
        _ => 0.70,
    }
}

/// Evaluate a set of distinct numbers in 1..=60.
///
/// Depends only on the sorted sequence, so it is invariant under input
/// permutation. The score starts at 100 and is reduced by fixed
/// penalties per rule; clamped to [0, 100].
pub fn evaluate(numbers: &[u8]) -> QualityReport {
    let mut sorted: Vec<u8> = numbers.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let k = sorted.len();

    let mut issues = Vec::new();
    let mut penalty: i32 = 0;

    if k == 0 {
        return QualityReport { score: 100, issues };
    }

    // -- Runs -------------------------------------------------------------

    let run_list = runs(&sorted);
    for &(start, len) in &run_list {
        if len >= 3 {
            let severity = if len >= 4 { Severity::High } else { Severity::Medium };
            penalty += match len {
                l if l >= 5 => 40,
                4 => 25,
                _ => 15,
            };
            issues.push(PatternIssue {
                kind: IssueKind::Run,
                severity,
                message: format!("{len} consecutive numbers starting at {start}"),
                data: json!({ "start": start, "length": len }),
            });
        }
    }

    // More than one adjacent pair is itself a human pattern, even
    // without a 3-run.
    let pair_count = run_list.iter().filter(|(_, len)| *len == 2).count();
    if pair_count > 1 {
        penalty += 15 * (pair_count as i32 - 1);
        issues.push(PatternIssue {
            kind: IssueKind::RepeatedPairs,
            severity: Severity::Medium,
            message: format!("{pair_count} adjacent pairs"),
            data: json!({ "pairs": pair_count }),
        });
    }

    // -- Parity -----------------------------------------------------------

    let evens = sorted.iter().filter(|&&n| n % 2 == 0).count();
    let even_ratio = evens as f64 / k as f64;
    if !(PARITY_LOW..=PARITY_HIGH).contains(&even_ratio) {
        let extreme = even_ratio < PARITY_EXTREME_LOW || even_ratio > PARITY_EXTREME_HIGH;
        penalty += if extreme { 20 } else { 10 };
        issues.push(PatternIssue {
            kind: IssueKind::Parity,
            severity: if extreme { Severity::Medium } else { Severity::Low },
            message: format!("{evens} of {k} numbers are even"),
            data: json!({ "evens": evens, "ratio": even_ratio }),
        });
    }

    // -- Decade spread ----------------------------------------------------

    let counts = decade_counts(&sorted);
    let ranges_used = counts.iter().filter(|&&c| c > 0).count();
    let concentration = decade_concentration(&sorted);
    let (required_ranges, min_members) = match k {
        n if n >= 8 => (3, 2),
        7 => (2, 2),
        _ => (2, 0),
    };
    let limit = concentration_limit(k);

    let too_thin = min_members > 0 && counts.iter().any(|&c| c > 0 && c < min_members);
    if ranges_used < required_ranges || too_thin || concentration > limit {
        penalty += match ranges_used {
            1 => 40,
            2 => {
                if concentration > 0.70 {
                    20
                } else if concentration > 0.60 {
                    10
                } else {
                    5
                }
            }
            _ => 0,
        };
        issues.push(PatternIssue {
            kind: IssueKind::DecadeSpread,
            severity: if ranges_used == 1 { Severity::High } else { Severity::Low },
            message: format!(
                "{ranges_used} of 3 decades used, peak concentration {:.0}%",
                concentration * 100.0
            ),
            data: json!({
                "counts": counts,
                "ranges_used": ranges_used,
                "concentration": concentration,
            }),
        });
    }

    // -- Multiples --------------------------------------------------------

    let fives = sorted.iter().filter(|&&n| n % 5 == 0).count();
    let tens = sorted.iter().filter(|&&n| n % 10 == 0).count();
    let five_ratio = fives as f64 / k as f64;
    if five_ratio > 0.40 || tens > 2 {
        if tens > 2 {
            penalty += 15;
        }
        if five_ratio > 0.5 {
            penalty += 10;
        }
        issues.push(PatternIssue {
            kind: IssueKind::Multiples,
            severity: if tens > 2 { Severity::Medium } else { Severity::Low },
            message: format!("{fives} multiples of 5, {tens} multiples of 10"),
            data: json!({ "fives": fives, "tens": tens, "five_ratio": five_ratio }),
        });
    }

    QualityReport {
        score: (100 - penalty).clamp(0, 100) as u8,
        issues,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
