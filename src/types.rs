//! Shared types for the bolão closure engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that the allocation, selection,
//! and closure modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lowest playable number.
pub const MIN_NUMBER: u8 = 1;
/// Highest playable number.
pub const MAX_NUMBER: u8 = 60;
/// Size of one decade band (1–20, 21–40, 41–60).
pub const DECADE_SPAN: u8 = 20;

/// Decade band index (0, 1 or 2) for a number in 1..=60.
pub fn decade_of(value: u8) -> usize {
    ((value.saturating_sub(1)) / DECADE_SPAN) as usize
}

// ---------------------------------------------------------------------------
// Ticket size table
// ---------------------------------------------------------------------------

/// One allowed wager size and its fixed cost.
///
/// The table is static configuration; costs must be strictly increasing
/// in `number_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSizeLevel {
    pub number_count: u8,
    pub cost: Decimal,
}

impl fmt::Display for TicketSizeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} numbers @ R${}", self.number_count, self.cost)
    }
}

// ---------------------------------------------------------------------------
// Allocation plan
// ---------------------------------------------------------------------------

/// One line of an allocation plan: how many wagers of a given size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub number_count: u8,
    /// Unit cost for this size.
    pub cost: Decimal,
    /// How many wagers of this size to buy.
    pub count: u32,
}

impl AllocationEntry {
    /// Total cost of this line (unit cost × count).
    pub fn line_cost(&self) -> Decimal {
        self.cost * Decimal::from(self.count)
    }
}

impl fmt::Display for AllocationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x {} numbers (R${} each, R${} total)",
            self.count,
            self.number_count,
            self.cost,
            self.line_cost(),
        )
    }
}

/// Decomposition of pooled funds into wagers.
///
/// Invariants: `total_cost` never exceeds the funds it was built from;
/// among all feasible decompositions it maximizes `total_cost`, and
/// among those it minimizes `total_bets`. Entries are sorted by
/// descending `number_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub entries: Vec<AllocationEntry>,
    pub total_cost: Decimal,
    pub total_bets: u32,
    pub remaining_funds: Decimal,
}

impl AllocationPlan {
    /// The largest wager size in the plan, if any.
    pub fn largest_size(&self) -> Option<u8> {
        self.entries.first().map(|e| e.number_count)
    }

    /// Human-readable breakdown, used in logs and error surfaces.
    pub fn breakdown(&self) -> String {
        let lines: Vec<String> = self.entries.iter().map(|e| e.to_string()).collect();
        format!(
            "{} | total R${} in {} bets, R${} remaining",
            lines.join(" + "),
            self.total_cost,
            self.total_bets,
            self.remaining_funds,
        )
    }
}

impl fmt::Display for AllocationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.breakdown())
    }
}

// ---------------------------------------------------------------------------
// Candidates & wagers
// ---------------------------------------------------------------------------

/// A number in the candidate pool, ranked by participant votes and
/// historical-frequency score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateNumber {
    /// Value in 1..=60.
    pub value: u8,
    /// Historical-frequency score supplied by the scoring collaborator.
    pub score: f64,
    /// How many confirmed participants picked this number.
    pub votes: u32,
}

/// A single physical wager: k distinct numbers, kept sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerDraft {
    pub numbers: Vec<u8>,
}

impl WagerDraft {
    /// Build a draft from any order of distinct numbers, sorting them.
    pub fn new(mut numbers: Vec<u8>) -> Self {
        numbers.sort_unstable();
        Self { numbers }
    }

    pub fn size(&self) -> usize {
        self.numbers.len()
    }

    /// Whether the draft is well-formed: distinct ascending values in 1..=60.
    pub fn is_well_formed(&self) -> bool {
        !self.numbers.is_empty()
            && self.numbers.windows(2).all(|w| w[0] < w[1])
            && self
                .numbers
                .iter()
                .all(|&n| (MIN_NUMBER..=MAX_NUMBER).contains(&n))
    }
}

impl fmt::Display for WagerDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nums: Vec<String> = self.numbers.iter().map(|n| format!("{n:02}")).collect();
        write!(f, "[{}]", nums.join(" "))
    }
}

/// Whether a wager came from the democratic flagship path or the
/// score-driven standard path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WagerKind {
    Flagship,
    Standard,
}

impl fmt::Display for WagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WagerKind::Flagship => write!(f, "flagship"),
            WagerKind::Standard => write!(f, "standard"),
        }
    }
}

/// A generated wager ready for purchase and persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedWager {
    pub label: String,
    pub kind: WagerKind,
    pub numbers: Vec<u8>,
    pub cost: Decimal,
}

impl fmt::Display for GeneratedWager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nums: Vec<String> = self.numbers.iter().map(|n| format!("{n:02}")).collect();
        write!(
            f,
            "{} ({}) [{}] R${}",
            self.label,
            self.kind,
            nums.join(" "),
            self.cost,
        )
    }
}

// ---------------------------------------------------------------------------
// Quality report
// ---------------------------------------------------------------------------

/// Severity of a pattern issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Which anti-pattern rule produced an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Run,
    RepeatedPairs,
    Parity,
    DecadeSpread,
    Multiples,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::Run => write!(f, "run"),
            IssueKind::RepeatedPairs => write!(f, "repeated_pairs"),
            IssueKind::Parity => write!(f, "parity"),
            IssueKind::DecadeSpread => write!(f, "decade_spread"),
            IssueKind::Multiples => write!(f, "multiples"),
        }
    }
}

/// One advisory finding from the pattern analyzer. Never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    /// Rule-specific payload (run lengths, ratios, counts) for audit.
    pub data: serde_json::Value,
}

/// Quality evaluation of one number set. Score 0–100, advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub score: u8,
    pub issues: Vec<PatternIssue>,
}

impl QualityReport {
    /// A set is considered acceptable when it scores at least 60.
    pub fn is_valid(&self) -> bool {
        self.score >= 60
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "score={} issues={}", self.score, self.issues.len())
    }
}

// ---------------------------------------------------------------------------
// Participants & closure record
// ---------------------------------------------------------------------------

/// A confirmed participant as supplied by the session collaborator.
/// `numbers` is `None` when no manual selection was made before closing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub numbers: Option<Vec<u8>>,
}

/// A participant's selection as recorded in the closure snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSelection {
    pub participant_id: String,
    pub name: String,
    pub numbers: Vec<u8>,
    /// True when the engine drew the numbers because the participant
    /// never picked manually.
    pub auto_generated: bool,
}

/// Pool lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    Open,
    Closed,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolStatus::Open => write!(f, "open"),
            PoolStatus::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for PoolStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(PoolStatus::Open),
            "closed" => Ok(PoolStatus::Closed),
            _ => Err(anyhow::anyhow!("Unknown pool status: {s}")),
        }
    }
}

/// The immutable closure snapshot: everything an auditor needs to verify
/// how pooled funds became physical wagers. Created exactly once per
/// pool and never regenerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosureRecord {
    pub allocation: AllocationPlan,
    pub selections: Vec<ParticipantSelection>,
    /// Reverse index: number → names of everyone who voted for it.
    pub number_voters: BTreeMap<u8, Vec<String>>,
    pub wagers: Vec<GeneratedWager>,
    pub generated_at: DateTime<Utc>,
    pub closed_by: String,
}

impl fmt::Display for ClosureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "closure by {} at {}: {} wagers, {}",
            self.closed_by,
            self.generated_at.to_rfc3339(),
            self.wagers.len(),
            self.allocation,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the closure engine.
#[derive(Debug, thiserror::Error)]
pub enum BolaoError {
    #[error("Insufficient funds: R${available} available, cheapest wager costs R${minimum}")]
    InsufficientFunds {
        available: Decimal,
        minimum: Decimal,
    },

    #[error("Allocation infeasible for R${funds}: level table does not cover the funds")]
    AllocationInfeasible { funds: Decimal },

    #[error("Pool {id} is not open (status: {status})")]
    PoolNotOpen { id: String, status: PoolStatus },

    #[error("Pool not found: {0}")]
    PoolNotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
