//! Closure orchestration.
//!
//! Sequences the allocation solver and consolidation engine against
//! externally supplied funds, votes, and scores; assembles the immutable
//! closure record; computes its fingerprint; and drives the atomic
//! open→closed persistence step. If anything fails, no partial state is
//! committed and the pool stays open.

use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::allocation;
use crate::consolidation::{score_weighted_draw, ConsolidationEngine};
use crate::patterns;
use crate::storage::Storage;
use crate::types::{
    BolaoError, ClosureRecord, GeneratedWager, Participant, ParticipantSelection, PoolStatus,
    QualityReport, TicketSizeLevel, WagerKind, MAX_NUMBER, MIN_NUMBER,
};
use rust_decimal::Decimal;

/// Numbers drawn for a participant who never picked manually.
const AUTO_PICK_COUNT: usize = 6;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Everything the engine consumes from its collaborators to close a pool.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ClosureInput {
    pub pool_id: String,
    /// Confirmed total funds (payments already validated upstream).
    pub total_funds: Decimal,
    /// Value of one quota share, carried for audit display.
    pub quota_value: Decimal,
    pub levels: Vec<TicketSizeLevel>,
    pub participants: Vec<Participant>,
    /// Historical-frequency score per number, from the scoring collaborator.
    pub scores: BTreeMap<u8, f64>,
    /// Admin performing the closure.
    pub closed_by: String,
}

/// The result of a closure computation.
#[derive(Debug, Clone)]
pub struct ClosureOutcome {
    pub record: ClosureRecord,
    /// SHA-256 over the canonical serialization of the record's content.
    pub fingerprint: String,
    /// One advisory quality report per generated wager, for audit.
    pub quality: Vec<QualityReport>,
}

// ---------------------------------------------------------------------------
// Computation
// ---------------------------------------------------------------------------

/// Compute a closure record from its inputs. Pure except for the
/// injected random source; recomputed fresh on every attempt, never
/// cached.
pub fn run<R: Rng + ?Sized>(
    input: &ClosureInput,
    rng: &mut R,
) -> Result<ClosureOutcome, BolaoError> {
    // 1. Decompose funds into wager sizes.
    let plan = allocation::build_plan(input.total_funds, &input.levels)?;
    info!(pool_id = %input.pool_id, plan = %plan, "Allocation plan ready");

    // 2. Auto-generate a selection for anyone who never picked,
    //    recording it as if manually chosen.
    let full_board: Vec<u8> = (MIN_NUMBER..=MAX_NUMBER).collect();
    let selections: Vec<ParticipantSelection> = input
        .participants
        .iter()
        .map(|p| match &p.numbers {
            Some(numbers) => {
                let mut numbers = numbers.clone();
                numbers.sort_unstable();
                ParticipantSelection {
                    participant_id: p.id.clone(),
                    name: p.name.clone(),
                    numbers,
                    auto_generated: false,
                }
            }
            None => {
                let numbers =
                    score_weighted_draw(&full_board, &input.scores, AUTO_PICK_COUNT, rng);
                debug!(participant = %p.name, "Auto-generated selection");
                ParticipantSelection {
                    participant_id: p.id.clone(),
                    name: p.name.clone(),
                    numbers,
                    auto_generated: true,
                }
            }
        })
        .collect();

    // 3. Reverse index for audit display: number → voter names.
    let mut number_voters: BTreeMap<u8, Vec<String>> = BTreeMap::new();
    for selection in &selections {
        for &n in &selection.numbers {
            number_voters.entry(n).or_default().push(selection.name.clone());
        }
    }
    let votes: BTreeMap<u8, u32> = number_voters
        .iter()
        .map(|(&n, voters)| (n, voters.len() as u32))
        .collect();

    // 4. Generate wagers per size group, descending. Only the very
    //    first wager of the largest group takes the democratic
    //    flagship path.
    let mut engine = ConsolidationEngine::new();
    let mut wagers = Vec::with_capacity(plan.total_bets as usize);
    let mut quality = Vec::with_capacity(plan.total_bets as usize);
    let mut first = true;
    for entry in &plan.entries {
        let count = entry.number_count as usize;
        for seq in 1..=entry.count {
            let (kind, draft) = if first {
                first = false;
                (
                    WagerKind::Flagship,
                    engine.flagship(&votes, &input.scores, count, rng),
                )
            } else {
                (
                    WagerKind::Standard,
                    engine.subsequent(&input.scores, count, rng),
                )
            };

            // 5. Advisory quality, logged per wager, never blocking.
            let report = patterns::evaluate(&draft.numbers);
            info!(
                wager = %draft,
                kind = %kind,
                quality = report.score,
                "Wager generated"
            );
            quality.push(report);

            wagers.push(GeneratedWager {
                label: format!("{} numbers #{seq}", entry.number_count),
                kind,
                numbers: draft.numbers,
                cost: entry.cost,
            });
        }
    }

    // 6. Assemble the immutable record and commit to a fingerprint.
    let record = ClosureRecord {
        allocation: plan,
        selections,
        number_voters,
        wagers,
        generated_at: Utc::now(),
        closed_by: input.closed_by.clone(),
    };
    let fingerprint = fingerprint(&record)?;
    info!(pool_id = %input.pool_id, fingerprint = %fingerprint, "Closure record assembled");

    Ok(ClosureOutcome {
        record,
        fingerprint,
        quality,
    })
}

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// Canonical digest input: the record's content fields in a fixed
/// order. `generated_at` is deliberately excluded so identical inputs
/// (with seeded randomness) reproduce the same fingerprint.
#[derive(serde::Serialize)]
struct FingerprintView<'a> {
    allocation: &'a crate::types::AllocationPlan,
    selections: &'a [ParticipantSelection],
    number_voters: &'a BTreeMap<u8, Vec<String>>,
    wagers: &'a [GeneratedWager],
    closed_by: &'a str,
}

/// SHA-256 fingerprint of a closure record as a 64-char lowercase hex
/// string.
pub fn fingerprint(record: &ClosureRecord) -> Result<String, BolaoError> {
    let view = FingerprintView {
        allocation: &record.allocation,
        selections: &record.selections,
        number_voters: &record.number_voters,
        wagers: &record.wagers,
        closed_by: &record.closed_by,
    };
    let canonical = serde_json::to_vec(&view)?;
    let digest = Sha256::digest(&canonical);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

// ---------------------------------------------------------------------------
// Persistence driver
// ---------------------------------------------------------------------------

/// Close a pool end to end: verify it is open, compute the closure, and
/// commit the status transition, snapshot, and wager rows atomically.
/// A racing closer loses at the conditional status update and observes
/// `PoolNotOpen` with nothing persisted.
pub async fn close_pool<R: Rng + ?Sized>(
    storage: &Storage,
    input: &ClosureInput,
    rng: &mut R,
) -> Result<ClosureOutcome, BolaoError> {
    let status = storage.fetch_status(&input.pool_id).await?;
    if status != PoolStatus::Open {
        return Err(BolaoError::PoolNotOpen {
            id: input.pool_id.clone(),
            status,
        });
    }

    let outcome = run(input, rng)?;
    storage
        .commit_closure(&input.pool_id, &outcome.record, &outcome.fingerprint)
        .await?;

    info!(
        pool_id = %input.pool_id,
        wagers = outcome.record.wagers.len(),
        fingerprint = %outcome.fingerprint,
        "Pool closed"
    );
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    fn levels() -> Vec<TicketSizeLevel> {
        vec![
            TicketSizeLevel { number_count: 6, cost: dec!(6) },
            TicketSizeLevel { number_count: 7, cost: dec!(42) },
            TicketSizeLevel { number_count: 8, cost: dec!(168) },
        ]
    }

    fn scores() -> BTreeMap<u8, f64> {
        (1..=60).map(|n| (n, f64::from(61 - n))).collect()
    }

    fn input(funds: Decimal) -> ClosureInput {
        ClosureInput {
            pool_id: "pool-1".into(),
            total_funds: funds,
            quota_value: dec!(10),
            levels: levels(),
            participants: vec![
                Participant {
                    id: "p1".into(),
                    name: "Ana".into(),
                    numbers: Some(vec![3, 17, 28, 35, 46, 59]),
                },
                Participant {
                    id: "p2".into(),
                    name: "Bruno".into(),
                    numbers: Some(vec![3, 17, 22, 41, 50, 60]),
                },
                Participant {
                    id: "p3".into(),
                    name: "Carla".into(),
                    numbers: None,
                },
            ],
            scores: scores(),
            closed_by: "admin".into(),
        }
    }

    #[test]
    fn test_run_produces_planned_wagers() {
        let outcome = run(&input(dec!(206)), &mut StdRng::seed_from_u64(1)).unwrap();
        // R$206 → 1x8 + 6x6.
        assert_eq!(outcome.record.wagers.len(), 7);
        assert_eq!(outcome.quality.len(), 7);
        assert_eq!(outcome.record.wagers[0].kind, WagerKind::Flagship);
        assert_eq!(outcome.record.wagers[0].numbers.len(), 8);
        for wager in &outcome.record.wagers[1..] {
            assert_eq!(wager.kind, WagerKind::Standard);
            assert_eq!(wager.numbers.len(), 6);
        }
    }

    #[test]
    fn test_wagers_are_well_formed() {
        let outcome = run(&input(dec!(206)), &mut StdRng::seed_from_u64(2)).unwrap();
        for wager in &outcome.record.wagers {
            assert!(wager.numbers.windows(2).all(|w| w[0] < w[1]));
            assert!(wager.numbers.iter().all(|&n| (1..=60).contains(&n)));
        }
    }

    #[test]
    fn test_auto_generated_selection_recorded() {
        let outcome = run(&input(dec!(48)), &mut StdRng::seed_from_u64(3)).unwrap();
        let carla = outcome
            .record
            .selections
            .iter()
            .find(|s| s.name == "Carla")
            .unwrap();
        assert!(carla.auto_generated);
        assert_eq!(carla.numbers.len(), 6);
        assert!(carla.numbers.windows(2).all(|w| w[0] < w[1]));
        // Auto picks count as votes in the reverse index.
        for n in &carla.numbers {
            assert!(outcome.record.number_voters[n].contains(&"Carla".to_string()));
        }
    }

    #[test]
    fn test_number_voters_index() {
        let outcome = run(&input(dec!(48)), &mut StdRng::seed_from_u64(4)).unwrap();
        let voters = &outcome.record.number_voters[&3];
        assert!(voters.contains(&"Ana".to_string()));
        assert!(voters.contains(&"Bruno".to_string()));
        assert!(outcome.record.number_voters[&59].contains(&"Ana".to_string()));
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let a = run(&input(dec!(206)), &mut StdRng::seed_from_u64(5)).unwrap();
        let b = run(&input(dec!(206)), &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(a.record.allocation, b.record.allocation);
        assert_eq!(a.record.wagers, b.record.wagers);
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_changed_vote_changes_fingerprint() {
        let base = input(dec!(206));
        let mut changed = base.clone();
        changed.participants[0].numbers = Some(vec![4, 17, 28, 35, 46, 59]);

        let a = run(&base, &mut StdRng::seed_from_u64(6)).unwrap();
        let b = run(&changed, &mut StdRng::seed_from_u64(6)).unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_fingerprint_is_hex_and_fixed_length() {
        let outcome = run(&input(dec!(48)), &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(outcome.fingerprint.len(), 64);
        assert!(outcome.fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_ignores_timestamp() {
        let outcome = run(&input(dec!(48)), &mut StdRng::seed_from_u64(8)).unwrap();
        let mut shifted = outcome.record.clone();
        shifted.generated_at = shifted.generated_at + chrono::Duration::hours(1);
        assert_eq!(
            fingerprint(&outcome.record).unwrap(),
            fingerprint(&shifted).unwrap()
        );
    }

    #[test]
    fn test_insufficient_funds_propagates() {
        let err = run(&input(dec!(3)), &mut StdRng::seed_from_u64(9)).unwrap_err();
        assert!(matches!(err, BolaoError::InsufficientFunds { .. }));
    }
}
