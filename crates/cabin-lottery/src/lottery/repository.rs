use super::domain::{
    Allocation, Apartment, ApartmentId, Drawing, DrawingId, Execution, ExecutionId, Participant,
    ParticipantId, Period, PeriodId, Wish,
};
use super::status::DrawingStatus;

/// Storage abstraction for drawings, wishes, executions, and allocations.
///
/// Every method is one atomic unit: an implementation either applies all of a
/// call's writes or none of them.
pub trait LotteryRepository: Send + Sync {
    fn insert_drawing(&self, drawing: Drawing) -> Result<Drawing, RepositoryError>;

    /// Compare-and-set on status: fails with `Conflict` unless the stored
    /// drawing is still in `expected`.
    fn update_drawing(
        &self,
        drawing: Drawing,
        expected: DrawingStatus,
    ) -> Result<(), RepositoryError>;

    fn fetch_drawing(&self, id: DrawingId) -> Result<Option<Drawing>, RepositoryError>;

    fn list_drawings(&self) -> Result<Vec<Drawing>, RepositoryError>;

    /// Removes the drawing with all of its periods, wishes, executions, and allocations.
    fn delete_drawing(&self, id: DrawingId) -> Result<(), RepositoryError>;

    fn insert_periods(&self, periods: Vec<Period>) -> Result<(), RepositoryError>;

    fn update_period(&self, period: Period) -> Result<(), RepositoryError>;

    fn delete_period(&self, id: PeriodId) -> Result<(), RepositoryError>;

    /// Periods of a drawing ordered by `sort_order`.
    fn periods(&self, drawing: DrawingId) -> Result<Vec<Period>, RepositoryError>;

    /// Replaces every wish the participant holds in the drawing with `wishes`.
    fn replace_wishes(
        &self,
        drawing: DrawingId,
        participant: ParticipantId,
        wishes: Vec<Wish>,
    ) -> Result<Vec<Wish>, RepositoryError>;

    /// One participant's wishes ordered by priority.
    fn participant_wishes(
        &self,
        drawing: DrawingId,
        participant: ParticipantId,
    ) -> Result<Vec<Wish>, RepositoryError>;

    /// All wishes of a drawing ordered by participant, then priority.
    fn wishes(&self, drawing: DrawingId) -> Result<Vec<Wish>, RepositoryError>;

    /// Persists an execution, its allocations, and the drawing update together.
    ///
    /// Enforces the per-execution uniqueness of (period, apartment) and
    /// (participant, period) with `Constraint`, and the drawing status with
    /// `Conflict`.
    fn commit_execution(
        &self,
        execution: Execution,
        allocations: Vec<Allocation>,
        drawing: Drawing,
        expected: DrawingStatus,
    ) -> Result<(), RepositoryError>;

    fn fetch_execution(&self, id: ExecutionId) -> Result<Option<Execution>, RepositoryError>;

    /// Executions of a drawing, most recent first.
    fn executions(&self, drawing: DrawingId) -> Result<Vec<Execution>, RepositoryError>;

    fn allocations(&self, execution: ExecutionId) -> Result<Vec<Allocation>, RepositoryError>;

    fn delete_execution(&self, id: ExecutionId) -> Result<(), RepositoryError>;
}

/// Read-only apartment reference data.
pub trait ApartmentCatalog: Send + Sync {
    fn apartment(&self, id: ApartmentId) -> Result<Option<Apartment>, RepositoryError>;
    fn apartments(&self) -> Result<Vec<Apartment>, RepositoryError>;
}

/// Read-only employee directory.
pub trait ParticipantDirectory: Send + Sync {
    fn participant(&self, id: ParticipantId) -> Result<Option<Participant>, RepositoryError>;
    fn find_by_email(&self, email: &str) -> Result<Option<Participant>, RepositoryError>;
    fn is_admin(&self, id: ParticipantId) -> Result<bool, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record was modified concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("uniqueness constraint violated: {0}")]
    Constraint(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
