//! Fund allocation solver.
//!
//! Decomposes pooled funds into the fewest possible wagers of allowed
//! sizes while maximizing fund utilization. Unbounded coin-change DP
//! over cent-indexed amounts: maximize spend first, then minimize the
//! number of wagers at that spend.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use tracing::debug;

use crate::types::{AllocationEntry, AllocationPlan, BolaoError, TicketSizeLevel};

/// DP cell: minimal bet count reaching this amount, plus the predecessor
/// used for plan reconstruction.
#[derive(Clone, Copy)]
struct Step {
    bets: u32,
    level: usize,
    prev: usize,
}

/// Convert a monetary value to whole cents, truncating anything smaller.
fn to_cents(value: Decimal) -> usize {
    (value * Decimal::ONE_HUNDRED)
        .trunc()
        .to_usize()
        .unwrap_or(0)
}

/// Build an allocation plan for `total_funds` against the size table.
///
/// Fails with `InsufficientFunds` when the funds cannot buy even the
/// cheapest wager, and with `AllocationInfeasible` when the DP finds no
/// reachable amount despite sufficient funds (a level-table
/// misconfiguration).
pub fn build_plan(
    total_funds: Decimal,
    levels: &[TicketSizeLevel],
) -> Result<AllocationPlan, BolaoError> {
    let min_cost = levels
        .iter()
        .map(|l| l.cost)
        .min()
        .ok_or(BolaoError::AllocationInfeasible { funds: total_funds })?;

    if total_funds < min_cost {
        return Err(BolaoError::InsufficientFunds {
            available: total_funds,
            minimum: min_cost,
        });
    }

    let budget = to_cents(total_funds);
    let level_cents: Vec<usize> = levels.iter().map(|l| to_cents(l.cost)).collect();

    // dp[amount] = cheapest-in-bets way to spend exactly `amount` cents.
    // Fixed-size indexed table: the domain 0..=budget is bounded and
    // known upfront.
    let mut dp: Vec<Option<Step>> = vec![None; budget + 1];
    dp[0] = Some(Step {
        bets: 0,
        level: usize::MAX,
        prev: 0,
    });

    for amount in 1..=budget {
        for (i, &cost) in level_cents.iter().enumerate() {
            if cost == 0 || cost > amount {
                continue;
            }
            if let Some(prev) = dp[amount - cost] {
                let bets = prev.bets + 1;
                let better = match dp[amount] {
                    Some(cur) => bets < cur.bets,
                    None => true,
                };
                if better {
                    dp[amount] = Some(Step {
                        bets,
                        level: i,
                        prev: amount - cost,
                    });
                }
            }
        }
    }

    // Spend-maximization pass: largest reachable amount wins; the DP
    // already guarantees minimal bet count per amount.
    let best_amount = (1..=budget).rev().find(|&a| dp[a].is_some());
    let best_amount = match best_amount {
        Some(a) => a,
        None => return Err(BolaoError::AllocationInfeasible { funds: total_funds }),
    };

    // Backtrack predecessors into per-level counts.
    let mut counts = vec![0u32; levels.len()];
    let mut cursor = best_amount;
    while cursor > 0 {
        let Some(step) = dp[cursor] else {
            return Err(BolaoError::AllocationInfeasible { funds: total_funds });
        };
        counts[step.level] += 1;
        cursor = step.prev;
    }

    let mut entries: Vec<AllocationEntry> = levels
        .iter()
        .zip(&counts)
        .filter(|(_, &count)| count > 0)
        .map(|(level, &count)| AllocationEntry {
            number_count: level.number_count,
            cost: level.cost,
            count,
        })
        .collect();
    entries.sort_by(|a, b| b.number_count.cmp(&a.number_count));

    let total_cost: Decimal = entries.iter().map(|e| e.line_cost()).sum();
    let total_bets: u32 = entries.iter().map(|e| e.count).sum();
    let plan = AllocationPlan {
        entries,
        total_cost,
        total_bets,
        remaining_funds: total_funds - total_cost,
    };

    debug!(
        funds = %total_funds,
        plan = %plan,
        "Allocation plan built"
    );

    Ok(plan)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
