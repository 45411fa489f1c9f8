//! Structured, ordered trace of one snake-draft run.
//!
//! Entries stay typed until they cross a text boundary; `AuditLog::lines` renders
//! the human readable narrative that admins compare between trial runs.

use serde::{Deserialize, Serialize};

use super::domain::{ApartmentId, ParticipantId, PeriodId};

/// Direction a round walks the randomized order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundDirection {
    Forward,
    Reverse,
}

impl RoundDirection {
    /// Round 1 is forward, round 2 reverse, and so on.
    pub const fn for_round(round: usize) -> Self {
        if round % 2 == 1 {
            Self::Forward
        } else {
            Self::Reverse
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Reverse => "reverse",
        }
    }
}

/// What happened when a wish was looked at during a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WishOutcome {
    Allocated {
        apartment_id: ApartmentId,
        apartment: String,
    },
    NoApartmentAvailable,
    PeriodAlreadyHeld,
}

impl WishOutcome {
    pub fn is_allocated(&self) -> bool {
        matches!(self, Self::Allocated { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEntry {
    Header {
        season: String,
        seed: u64,
        participant_count: usize,
    },
    DrawOrder {
        position: usize,
        participant_id: ParticipantId,
        name: String,
    },
    SnakeOrder {
        direction: RoundDirection,
        names: Vec<String>,
    },
    Turn {
        turn: usize,
        total_turns: usize,
        round: usize,
        position: usize,
        participant_id: ParticipantId,
        name: String,
        allocations_so_far: usize,
    },
    WishEvaluated {
        participant_id: ParticipantId,
        priority: u32,
        period_id: PeriodId,
        period: String,
        apartments: Vec<String>,
        outcome: WishOutcome,
    },
    NoRemainingWishes {
        participant_id: ParticipantId,
    },
    TurnWithoutAllocation {
        participant_id: ParticipantId,
    },
    Summary {
        total_allocations: usize,
        histogram: Vec<HistogramBucket>,
    },
}

/// Number of participants that ended a run holding `allocations` apartments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub allocations: usize,
    pub participants: usize,
}

impl AuditEntry {
    fn render(&self, out: &mut Vec<String>) {
        match self {
            Self::Header {
                season,
                seed,
                participant_count,
            } => {
                out.push("=== SNAKE DRAFT ===".to_string());
                out.push(format!("Drawing: {season}"));
                out.push(format!("Seed: {seed}"));
                out.push(format!("Participants: {participant_count}"));
                out.push(String::new());
                out.push("Randomized order:".to_string());
            }
            Self::DrawOrder { position, name, .. } => {
                out.push(format!("  {position}. {name}"));
            }
            Self::SnakeOrder { direction, names } => {
                out.push(format!("Snake {}: {}", direction.label(), names.join(" -> ")));
            }
            Self::Turn {
                turn,
                total_turns,
                round,
                position,
                name,
                allocations_so_far,
                ..
            } => {
                out.push(String::new());
                out.push(format!(
                    "Turn {turn}/{total_turns} (round {round}, position {position}): {name}"
                ));
                out.push(format!("  Allocations so far: {allocations_so_far}"));
            }
            Self::WishEvaluated {
                priority,
                period,
                apartments,
                outcome,
                ..
            } => {
                out.push(format!(
                    "    Priority {priority}: {period} - {}",
                    apartments.join(", ")
                ));
                let verdict = match outcome {
                    WishOutcome::Allocated { apartment, .. } => {
                        format!("      ACCEPTED: {apartment} in {period}")
                    }
                    WishOutcome::NoApartmentAvailable => {
                        format!("      REJECTED: no apartment available in {period}")
                    }
                    WishOutcome::PeriodAlreadyHeld => {
                        format!("      REJECTED: already holds an apartment in {period}")
                    }
                };
                out.push(verdict);
            }
            Self::NoRemainingWishes { .. } => {
                out.push("  -> No remaining wishes".to_string());
            }
            Self::TurnWithoutAllocation { .. } => {
                out.push("  -> No allocation this turn".to_string());
            }
            Self::Summary {
                total_allocations,
                histogram,
            } => {
                out.push(String::new());
                out.push("=== DRAW COMPLETE ===".to_string());
                out.push(format!("Total allocations: {total_allocations}"));
                for bucket in histogram {
                    let plural = if bucket.allocations == 1 { "" } else { "s" };
                    out.push(format!(
                        "Participants with {} allocation{plural}: {}",
                        bucket.allocations, bucket.participants
                    ));
                }
            }
        }
    }
}

/// Ordered audit trail of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: AuditEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the narrative, one text line per element.
    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.entries.len() * 2);
        for entry in &self.entries {
            entry.render(&mut out);
        }
        out
    }

    pub fn to_text(&self) -> String {
        self.lines().join("\n")
    }

    /// Seed recorded in the header, if the log has one.
    pub fn seed(&self) -> Option<u64> {
        self.entries.iter().find_map(|entry| match entry {
            AuditEntry::Header { seed, .. } => Some(*seed),
            _ => None,
        })
    }

    pub fn turn_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, AuditEntry::Turn { .. }))
            .count()
    }

    /// Participants in the randomized order, as logged.
    pub fn draw_order(&self) -> Vec<ParticipantId> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                AuditEntry::DrawOrder { participant_id, .. } => Some(*participant_id),
                _ => None,
            })
            .collect()
    }
}
