use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::audit::AuditLog;
use super::status::DrawingStatus;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Identifier of one lottery round.
    DrawingId
);
uuid_id!(PeriodId);
uuid_id!(WishId);
uuid_id!(
    /// Identifier of one immutable allocator run.
    ExecutionId
);
uuid_id!(AllocationId);

/// Employee identifier owned by the participant directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Apartment identifier owned by the apartment catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApartmentId(pub u64);

impl fmt::Display for ApartmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Catalog entry for a bookable apartment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Apartment {
    pub id: ApartmentId,
    pub name: String,
}

/// Directory entry for an employee taking part in drawings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub email: String,
}

/// One lottery round for a season.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drawing {
    pub id: DrawingId,
    pub season: String,
    pub status: DrawingStatus,
    pub created_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub drawn_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub published_execution_id: Option<ExecutionId>,
    pub published_by: Option<ParticipantId>,
}

impl Drawing {
    pub fn new(season: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: DrawingId::new(),
            season: season.into(),
            status: DrawingStatus::Draft,
            created_at,
            locked_at: None,
            drawn_at: None,
            published_at: None,
            published_execution_id: None,
            published_by: None,
        }
    }

    /// A drawing counts as published once any execution has been made visible.
    pub fn has_publication(&self) -> bool {
        self.status == DrawingStatus::Published || self.published_execution_id.is_some()
    }
}

/// Bookable date range within a drawing. `sort_order` is for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: PeriodId,
    pub drawing_id: DrawingId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub description: String,
    pub comment: Option<String>,
    pub sort_order: i32,
}

/// Admin supplied period definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodInput {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub description: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
}

/// Participant supplied wish, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishInput {
    pub period_id: PeriodId,
    pub priority: u32,
    pub desired_apartment_ids: Vec<ApartmentId>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Stored wish. `desired_apartment_ids` keeps the submitted order; it is a ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wish {
    pub id: WishId,
    pub drawing_id: DrawingId,
    pub participant_id: ParticipantId,
    pub period_id: PeriodId,
    pub priority: u32,
    pub desired_apartment_ids: Vec<ApartmentId>,
    pub comment: Option<String>,
}

impl Wish {
    /// True when both wishes express the same request, ignoring identity.
    pub fn same_request(&self, other: &Wish) -> bool {
        self.period_id == other.period_id
            && self.priority == other.priority
            && self.desired_apartment_ids == other.desired_apartment_ids
            && self.comment == other.comment
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationType {
    Drawn,
    Manual,
}

/// One committed (period, apartment) -> participant assignment within an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub execution_id: ExecutionId,
    pub drawing_id: DrawingId,
    pub period_id: PeriodId,
    pub apartment_id: ApartmentId,
    pub participant_id: ParticipantId,
    pub allocation_type: AllocationType,
    pub comment: Option<String>,
    pub allocated_at: DateTime<Utc>,
}

/// Derived figures for one execution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DrawingStatistics {
    pub total_participants: usize,
    pub total_allocations: usize,
    /// allocations held -> number of participants holding that many
    pub allocation_histogram: BTreeMap<usize, usize>,
    pub allocations_per_period: BTreeMap<String, usize>,
}

impl DrawingStatistics {
    pub fn participants_with(&self, allocations: usize) -> usize {
        self.allocation_histogram
            .get(&allocations)
            .copied()
            .unwrap_or(0)
    }
}

/// Immutable record of one allocator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub drawing_id: DrawingId,
    pub executed_at: DateTime<Utc>,
    pub executed_by: ParticipantId,
    pub seed: u64,
    pub audit_log: AuditLog,
    pub statistics: DrawingStatistics,
}

/// Execution listing entry for admin comparison of trial runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub id: ExecutionId,
    pub drawing_id: DrawingId,
    pub executed_at: DateTime<Utc>,
    pub executed_by: ParticipantId,
    pub seed: u64,
    pub allocation_count: usize,
    pub published: bool,
}

/// Result handed back from `perform_draw`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrawingResult {
    pub drawing_id: DrawingId,
    pub season: String,
    pub execution_id: ExecutionId,
    pub seed: u64,
    pub drawn_at: DateTime<Utc>,
    pub allocations: Vec<Allocation>,
    pub statistics: DrawingStatistics,
    pub audit_log: AuditLog,
}
