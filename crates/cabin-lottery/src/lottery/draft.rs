//! Snake-draft allocation.
//!
//! Pure and synchronous: every input is in memory, nothing here blocks or touches
//! storage. Identical inputs produce identical picks and an identical audit log.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::audit::{AuditEntry, AuditLog, HistogramBucket, RoundDirection, WishOutcome};
use super::domain::{
    ApartmentId, DrawingStatistics, ParticipantId, PeriodId, Wish, WishId,
};

/// Display names used when narrating a draft.
#[derive(Debug, Clone, Default)]
pub struct DraftLabels {
    pub participants: HashMap<ParticipantId, String>,
    pub periods: HashMap<PeriodId, String>,
    pub apartments: HashMap<ApartmentId, String>,
}

impl DraftLabels {
    pub fn participant(&self, id: ParticipantId) -> String {
        self.participants
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("participant #{id}"))
    }

    pub fn period(&self, id: PeriodId) -> String {
        self.periods
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("period {id}"))
    }

    pub fn apartment(&self, id: ApartmentId) -> String {
        self.apartments
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("apartment #{id}"))
    }
}

/// Everything the allocator needs for one run.
pub struct DraftInput<'a> {
    pub season: &'a str,
    pub seed: u64,
    /// Participants in randomized order.
    pub order: &'a [ParticipantId],
    /// Each participant's wishes, ascending priority.
    pub wishes: &'a BTreeMap<ParticipantId, Vec<Wish>>,
    pub labels: &'a DraftLabels,
}

/// One assignment decided by the allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftPick {
    pub turn: usize,
    pub round: usize,
    pub participant_id: ParticipantId,
    pub wish_id: WishId,
    pub priority: u32,
    pub period_id: PeriodId,
    pub apartment_id: ApartmentId,
}

#[derive(Debug, Clone)]
pub struct DraftOutcome {
    pub picks: Vec<DraftPick>,
    pub audit_log: AuditLog,
    pub statistics: DrawingStatistics,
}

/// Number of rounds: the longest wish list among the ordered participants.
pub fn round_count(order: &[ParticipantId], wishes: &BTreeMap<ParticipantId, Vec<Wish>>) -> usize {
    order
        .iter()
        .map(|participant| wishes.get(participant).map_or(0, Vec::len))
        .max()
        .unwrap_or(0)
}

/// Runs the snake draft over `input.order`.
pub fn run(input: DraftInput<'_>) -> DraftOutcome {
    let DraftInput {
        season,
        seed,
        order,
        wishes,
        labels,
    } = input;

    let mut state = DraftState::default();
    let rounds = round_count(order, wishes);
    let total_turns = rounds * order.len();

    state.audit_log.push(AuditEntry::Header {
        season: season.to_string(),
        seed,
        participant_count: order.len(),
    });
    for (index, participant) in order.iter().enumerate() {
        state.audit_log.push(AuditEntry::DrawOrder {
            position: index + 1,
            participant_id: *participant,
            name: labels.participant(*participant),
        });
    }
    let forward: Vec<String> = order.iter().map(|p| labels.participant(*p)).collect();
    let reverse: Vec<String> = forward.iter().rev().cloned().collect();
    state.audit_log.push(AuditEntry::SnakeOrder {
        direction: RoundDirection::Forward,
        names: forward,
    });
    state.audit_log.push(AuditEntry::SnakeOrder {
        direction: RoundDirection::Reverse,
        names: reverse,
    });

    let mut turn = 0;
    for round in 1..=rounds {
        let walk: Vec<(usize, ParticipantId)> = match RoundDirection::for_round(round) {
            RoundDirection::Forward => order.iter().copied().enumerate().collect(),
            RoundDirection::Reverse => order.iter().copied().enumerate().rev().collect(),
        };

        for (index, participant) in walk {
            turn += 1;
            state.audit_log.push(AuditEntry::Turn {
                turn,
                total_turns,
                round,
                position: index + 1,
                participant_id: participant,
                name: labels.participant(participant),
                allocations_so_far: state.count(participant),
            });

            let participant_wishes = wishes.get(&participant).map_or(&[][..], Vec::as_slice);
            state.take_turn(turn, round, participant, participant_wishes, labels);
        }
    }

    let statistics = state.statistics(order, labels);
    state.audit_log.push(AuditEntry::Summary {
        total_allocations: statistics.total_allocations,
        histogram: statistics
            .allocation_histogram
            .iter()
            .map(|(allocations, participants)| HistogramBucket {
                allocations: *allocations,
                participants: *participants,
            })
            .collect(),
    });

    DraftOutcome {
        picks: state.picks,
        audit_log: state.audit_log,
        statistics,
    }
}

#[derive(Default)]
struct DraftState {
    occupied: HashSet<(PeriodId, ApartmentId)>,
    held: HashSet<(ParticipantId, PeriodId)>,
    fulfilled: HashSet<WishId>,
    counts: HashMap<ParticipantId, usize>,
    picks: Vec<DraftPick>,
    audit_log: AuditLog,
}

impl DraftState {
    fn count(&self, participant: ParticipantId) -> usize {
        self.counts.get(&participant).copied().unwrap_or(0)
    }

    /// At most one new allocation per turn.
    fn take_turn(
        &mut self,
        turn: usize,
        round: usize,
        participant: ParticipantId,
        wishes: &[Wish],
        labels: &DraftLabels,
    ) {
        let mut pending = wishes
            .iter()
            .filter(|wish| !self.fulfilled.contains(&wish.id))
            .peekable();

        if pending.peek().is_none() {
            self.audit_log
                .push(AuditEntry::NoRemainingWishes { participant_id: participant });
            return;
        }

        let mut evaluations = Vec::new();
        let mut pick = None;

        for wish in pending {
            let outcome = if self.held.contains(&(participant, wish.period_id)) {
                WishOutcome::PeriodAlreadyHeld
            } else {
                match wish
                    .desired_apartment_ids
                    .iter()
                    .copied()
                    .find(|apartment| !self.occupied.contains(&(wish.period_id, *apartment)))
                {
                    Some(apartment_id) => {
                        pick = Some(DraftPick {
                            turn,
                            round,
                            participant_id: participant,
                            wish_id: wish.id,
                            priority: wish.priority,
                            period_id: wish.period_id,
                            apartment_id,
                        });
                        WishOutcome::Allocated {
                            apartment_id,
                            apartment: labels.apartment(apartment_id),
                        }
                    }
                    None => WishOutcome::NoApartmentAvailable,
                }
            };

            evaluations.push(AuditEntry::WishEvaluated {
                participant_id: participant,
                priority: wish.priority,
                period_id: wish.period_id,
                period: labels.period(wish.period_id),
                apartments: wish
                    .desired_apartment_ids
                    .iter()
                    .map(|apartment| labels.apartment(*apartment))
                    .collect(),
                outcome,
            });

            if pick.is_some() {
                break;
            }
        }

        for entry in evaluations {
            self.audit_log.push(entry);
        }

        match pick {
            Some(pick) => {
                tracing::debug!(
                    participant = %pick.participant_id,
                    period = %pick.period_id,
                    apartment = %pick.apartment_id,
                    priority = pick.priority,
                    turn,
                    "allocated"
                );
                self.occupied.insert((pick.period_id, pick.apartment_id));
                self.held.insert((participant, pick.period_id));
                self.fulfilled.insert(pick.wish_id);
                *self.counts.entry(participant).or_insert(0) += 1;
                self.picks.push(pick);
            }
            None => {
                self.audit_log
                    .push(AuditEntry::TurnWithoutAllocation { participant_id: participant });
            }
        }
    }

    fn statistics(&self, order: &[ParticipantId], labels: &DraftLabels) -> DrawingStatistics {
        let mut allocation_histogram = BTreeMap::new();
        for participant in order {
            *allocation_histogram.entry(self.count(*participant)).or_insert(0) += 1;
        }

        let mut allocations_per_period = BTreeMap::new();
        for pick in &self.picks {
            *allocations_per_period
                .entry(labels.period(pick.period_id))
                .or_insert(0) += 1;
        }

        DrawingStatistics {
            total_participants: order.len(),
            total_allocations: self.picks.len(),
            allocation_histogram,
            allocations_per_period,
        }
    }
}
