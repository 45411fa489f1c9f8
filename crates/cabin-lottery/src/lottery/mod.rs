//! Cabin lottery engine.
//!
//! Participants rank periods and apartments while a drawing is open; once it
//! is locked an admin runs one or more seeded snake drafts, compares the
//! audited executions, and publishes exactly one of them.

pub mod audit;
pub mod domain;
pub mod draft;
pub mod import;
pub mod randomizer;
pub mod repository;
pub mod router;
pub mod service;
pub mod status;
pub mod store;
pub mod wishes;

#[cfg(test)]
mod tests;

pub use audit::{AuditEntry, AuditLog, HistogramBucket, RoundDirection, WishOutcome};
pub use domain::{
    Allocation, AllocationId, AllocationType, Apartment, ApartmentId, Drawing, DrawingId,
    DrawingResult, DrawingStatistics, Execution, ExecutionId, ExecutionSummary, Participant,
    ParticipantId, Period, PeriodId, PeriodInput, Wish, WishId, WishInput,
};
pub use import::{ImportError, ImportReport, WishImporter};
pub use repository::{ApartmentCatalog, LotteryRepository, ParticipantDirectory, RepositoryError};
pub use router::{lottery_router, Caller, CALLER_HEADER};
pub use service::{CabinLotteryService, LotteryError, Missing};
pub use status::{DrawingAction, DrawingStatus, StateConflict};
pub use store::InMemoryLotteryStore;
pub use wishes::ValidationError;
