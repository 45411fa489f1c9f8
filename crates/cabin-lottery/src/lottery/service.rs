use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Duration, NaiveDate, Utc};
use tracing::{info, warn};

use super::domain::{
    Allocation, AllocationId, AllocationType, Apartment, ApartmentId, Drawing, DrawingId,
    DrawingResult, Execution, ExecutionId, ExecutionSummary, Participant, ParticipantId, Period,
    PeriodId, PeriodInput, Wish, WishInput,
};
use super::draft::{self, DraftInput, DraftLabels};
use super::randomizer;
use super::repository::{
    ApartmentCatalog, LotteryRepository, ParticipantDirectory, RepositoryError,
};
use super::status::{DrawingAction, DrawingStatus, StateConflict};
use super::wishes::{self, ValidationError};

/// Facade over the drawing lifecycle, wish collection, draws, and publication.
///
/// Writes that touch a drawing's status run under a per-drawing lock, so two
/// draws, or a draw and a publish, on the same drawing never interleave.
/// Different drawings proceed independently.
pub struct CabinLotteryService<R, C, D> {
    repository: Arc<R>,
    catalog: Arc<C>,
    directory: Arc<D>,
    drawing_locks: Mutex<HashMap<DrawingId, Arc<Mutex<()>>>>,
}

impl<R, C, D> CabinLotteryService<R, C, D>
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    pub fn new(repository: Arc<R>, catalog: Arc<C>, directory: Arc<D>) -> Self {
        Self {
            repository,
            catalog,
            directory,
            drawing_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn apartments(&self) -> Result<Vec<Apartment>, LotteryError> {
        Ok(self.catalog.apartments()?)
    }

    pub fn find_participant_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Participant>, LotteryError> {
        Ok(self.directory.find_by_email(email)?)
    }

    pub fn create_drawing(
        &self,
        admin: ParticipantId,
        season: &str,
    ) -> Result<Drawing, LotteryError> {
        self.require_admin(admin)?;
        let season = season.trim();
        if season.is_empty() {
            return Err(ValidationError::EmptySeason.into());
        }

        let drawing = self
            .repository
            .insert_drawing(Drawing::new(season, Utc::now()))?;
        info!(drawing = %drawing.id, season = %drawing.season, "drawing created");
        Ok(drawing)
    }

    pub fn get_drawing(&self, drawing_id: DrawingId) -> Result<Drawing, LotteryError> {
        self.load_drawing(drawing_id)
    }

    /// All drawings, newest first.
    pub fn list_drawings(&self) -> Result<Vec<Drawing>, LotteryError> {
        Ok(self.repository.list_drawings()?)
    }

    /// Newest drawing that participants may see; drafts are admin-only.
    pub fn current_drawing_for_participants(&self) -> Result<Option<Drawing>, LotteryError> {
        Ok(self
            .repository
            .list_drawings()?
            .into_iter()
            .find(|drawing| drawing.status != DrawingStatus::Draft))
    }

    pub fn delete_drawing(
        &self,
        admin: ParticipantId,
        drawing_id: DrawingId,
    ) -> Result<(), LotteryError> {
        self.require_admin(admin)?;
        let lock = self.drawing_lock(drawing_id)?;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let drawing = self.load_drawing(drawing_id)?;
        if drawing.has_publication() {
            return Err(LotteryError::AlreadyPublished(drawing_id));
        }
        self.repository.delete_drawing(drawing_id)?;
        self.drawing_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&drawing_id);
        info!(drawing = %drawing_id, "drawing deleted");
        Ok(())
    }

    pub fn open(&self, admin: ParticipantId, drawing_id: DrawingId) -> Result<Drawing, LotteryError> {
        self.transition(admin, drawing_id, DrawingAction::Open, |_| {})
    }

    pub fn lock(&self, admin: ParticipantId, drawing_id: DrawingId) -> Result<Drawing, LotteryError> {
        let now = Utc::now();
        self.transition(admin, drawing_id, DrawingAction::Lock, |drawing| {
            drawing.locked_at = Some(now);
        })
    }

    pub fn unlock(
        &self,
        admin: ParticipantId,
        drawing_id: DrawingId,
    ) -> Result<Drawing, LotteryError> {
        self.transition(admin, drawing_id, DrawingAction::Unlock, |drawing| {
            drawing.locked_at = None;
        })
    }

    pub fn revert_to_draft(
        &self,
        admin: ParticipantId,
        drawing_id: DrawingId,
    ) -> Result<Drawing, LotteryError> {
        self.transition(admin, drawing_id, DrawingAction::RevertToDraft, |drawing| {
            drawing.locked_at = None;
            clear_publication(drawing);
        })
    }

    pub fn revert_to_locked(
        &self,
        admin: ParticipantId,
        drawing_id: DrawingId,
    ) -> Result<Drawing, LotteryError> {
        self.transition(admin, drawing_id, DrawingAction::RevertToLocked, clear_publication)
    }

    fn transition(
        &self,
        admin: ParticipantId,
        drawing_id: DrawingId,
        action: DrawingAction,
        update: impl FnOnce(&mut Drawing),
    ) -> Result<Drawing, LotteryError> {
        self.require_admin(admin)?;
        let lock = self.drawing_lock(drawing_id)?;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut drawing = self.load_drawing(drawing_id)?;
        let previous = drawing.status;
        drawing.status = previous.apply(action)?;
        update(&mut drawing);
        self.repository.update_drawing(drawing.clone(), previous)?;

        info!(
            drawing = %drawing_id,
            from = %previous,
            to = %drawing.status,
            action = action.label(),
            "drawing transitioned"
        );
        Ok(drawing)
    }

    pub fn periods(&self, drawing_id: DrawingId) -> Result<Vec<Period>, LotteryError> {
        self.load_drawing(drawing_id)?;
        Ok(self.repository.periods(drawing_id)?)
    }

    pub fn add_period(
        &self,
        admin: ParticipantId,
        drawing_id: DrawingId,
        input: PeriodInput,
    ) -> Result<Period, LotteryError> {
        self.require_admin(admin)?;
        let lock = self.drawing_lock(drawing_id)?;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.editable_drawing(drawing_id)?;
        wishes::validate_period(&input)?;

        let period = Period {
            id: PeriodId::new(),
            drawing_id,
            start_date: input.start_date,
            end_date: input.end_date,
            description: input.description.trim().to_string(),
            comment: input.comment.filter(|comment| !comment.trim().is_empty()),
            sort_order: input.sort_order,
        };
        self.repository.insert_periods(vec![period.clone()])?;
        info!(drawing = %drawing_id, period = %period.id, "period added");
        Ok(period)
    }

    /// Generates consecutive one-week periods from `start` while the start date
    /// is on or before `end`.
    pub fn bulk_create_periods(
        &self,
        admin: ParticipantId,
        drawing_id: DrawingId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Period>, LotteryError> {
        self.require_admin(admin)?;
        if end < start {
            return Err(ValidationError::InvalidPeriodRange.into());
        }
        let lock = self.drawing_lock(drawing_id)?;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.editable_drawing(drawing_id)?;
        let mut sort_order = self
            .repository
            .periods(drawing_id)?
            .iter()
            .map(|period| period.sort_order)
            .max()
            .map_or(1, |max| max + 1);

        let mut periods = Vec::new();
        let mut cursor = start;
        while cursor <= end {
            let week_end = cursor + Duration::weeks(1);
            periods.push(Period {
                id: PeriodId::new(),
                drawing_id,
                start_date: cursor,
                end_date: week_end,
                description: format!("{} - {}", cursor.format("%d.%m"), week_end.format("%d.%m")),
                comment: None,
                sort_order,
            });
            sort_order += 1;
            cursor = week_end;
        }

        self.repository.insert_periods(periods.clone())?;
        info!(drawing = %drawing_id, count = periods.len(), "periods generated");
        Ok(periods)
    }

    pub fn update_period(
        &self,
        admin: ParticipantId,
        drawing_id: DrawingId,
        period_id: PeriodId,
        input: PeriodInput,
    ) -> Result<Period, LotteryError> {
        self.require_admin(admin)?;
        let lock = self.drawing_lock(drawing_id)?;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.editable_drawing(drawing_id)?;
        wishes::validate_period(&input)?;
        let mut period = self.drawing_period(drawing_id, period_id)?;
        period.start_date = input.start_date;
        period.end_date = input.end_date;
        period.description = input.description.trim().to_string();
        period.comment = input.comment.filter(|comment| !comment.trim().is_empty());
        period.sort_order = input.sort_order;

        self.repository.update_period(period.clone())?;
        Ok(period)
    }

    pub fn delete_period(
        &self,
        admin: ParticipantId,
        drawing_id: DrawingId,
        period_id: PeriodId,
    ) -> Result<(), LotteryError> {
        self.require_admin(admin)?;
        let lock = self.drawing_lock(drawing_id)?;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.editable_drawing(drawing_id)?;
        self.drawing_period(drawing_id, period_id)?;
        if self.period_referenced(drawing_id, period_id)? {
            return Err(ValidationError::PeriodInUse(period_id).into());
        }
        self.repository.delete_period(period_id)?;
        Ok(())
    }

    /// Replaces every wish the participant holds in the drawing.
    ///
    /// The submission is validated as a whole before anything is written; an
    /// empty submission withdraws the participant.
    pub fn set_wishes(
        &self,
        drawing_id: DrawingId,
        participant: ParticipantId,
        inputs: Vec<WishInput>,
    ) -> Result<Vec<Wish>, LotteryError> {
        let lock = self.drawing_lock(drawing_id)?;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let drawing = self.load_drawing(drawing_id)?;
        drawing.status.apply(DrawingAction::SubmitWishes)?;
        if self.directory.participant(participant)?.is_none() {
            return Err(LotteryError::NotFound(Missing::Participant(participant)));
        }

        let periods = self.repository.periods(drawing_id)?;
        let built = wishes::build_wishes(drawing_id, participant, inputs, &periods)?;
        for apartment in built.iter().flat_map(|wish| &wish.desired_apartment_ids) {
            if self.catalog.apartment(*apartment)?.is_none() {
                return Err(LotteryError::NotFound(Missing::Apartment(*apartment)));
            }
        }

        let stored = self
            .repository
            .replace_wishes(drawing_id, participant, built)?;
        info!(
            drawing = %drawing_id,
            participant = %participant,
            wishes = stored.len(),
            "wishes replaced"
        );
        Ok(stored)
    }

    pub fn get_wishes(
        &self,
        drawing_id: DrawingId,
        participant: ParticipantId,
    ) -> Result<Vec<Wish>, LotteryError> {
        self.load_drawing(drawing_id)?;
        Ok(self.repository.participant_wishes(drawing_id, participant)?)
    }

    pub fn get_all_wishes(
        &self,
        admin: ParticipantId,
        drawing_id: DrawingId,
    ) -> Result<Vec<Wish>, LotteryError> {
        self.require_admin(admin)?;
        self.load_drawing(drawing_id)?;
        Ok(self.repository.wishes(drawing_id)?)
    }

    /// Runs the snake draft and records it as a new execution.
    ///
    /// Legal while the drawing is LOCKED or DRAWN. Without a seed one is
    /// generated; either way it is stored so the run can be replayed.
    pub fn perform_draw(
        &self,
        drawing_id: DrawingId,
        admin: ParticipantId,
        seed: Option<u64>,
    ) -> Result<DrawingResult, LotteryError> {
        self.require_admin(admin)?;
        let lock = self.drawing_lock(drawing_id)?;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let drawing = self.load_drawing(drawing_id)?;
        let previous = drawing.status;
        let next = previous.apply(DrawingAction::Draw)?;
        let seed = seed.unwrap_or_else(randomizer::generate_seed);

        let mut by_participant: BTreeMap<ParticipantId, Vec<Wish>> = BTreeMap::new();
        for wish in self.repository.wishes(drawing_id)? {
            by_participant
                .entry(wish.participant_id)
                .or_default()
                .push(wish);
        }
        if by_participant.is_empty() {
            return Err(ValidationError::NoParticipants.into());
        }
        for list in by_participant.values_mut() {
            list.sort_by_key(|wish| wish.priority);
        }

        let canonical: Vec<ParticipantId> = by_participant.keys().copied().collect();
        let order = randomizer::shuffle(&canonical, seed);
        let labels = self.draft_labels(drawing_id, &canonical)?;

        info!(
            drawing = %drawing_id,
            seed,
            participants = order.len(),
            "starting draw"
        );
        let outcome = draft::run(DraftInput {
            season: &drawing.season,
            seed,
            order: &order,
            wishes: &by_participant,
            labels: &labels,
        });

        let executed_at = Utc::now();
        let execution_id = ExecutionId::new();
        let allocations: Vec<Allocation> = outcome
            .picks
            .iter()
            .map(|pick| Allocation {
                id: AllocationId::new(),
                execution_id,
                drawing_id,
                period_id: pick.period_id,
                apartment_id: pick.apartment_id,
                participant_id: pick.participant_id,
                allocation_type: AllocationType::Drawn,
                comment: None,
                allocated_at: executed_at,
            })
            .collect();

        let execution = Execution {
            id: execution_id,
            drawing_id,
            executed_at,
            executed_by: admin,
            seed,
            audit_log: outcome.audit_log.clone(),
            statistics: outcome.statistics.clone(),
        };
        let mut updated = drawing.clone();
        updated.status = next;
        updated.drawn_at = Some(executed_at);

        if let Err(error) =
            self.repository
                .commit_execution(execution, allocations.clone(), updated, previous)
        {
            warn!(drawing = %drawing_id, seed, %error, "draw rolled back");
            return Err(error.into());
        }

        info!(
            drawing = %drawing_id,
            execution = %execution_id,
            seed,
            allocations = allocations.len(),
            "draw complete"
        );
        Ok(DrawingResult {
            drawing_id,
            season: drawing.season,
            execution_id,
            seed,
            drawn_at: executed_at,
            allocations,
            statistics: outcome.statistics,
            audit_log: outcome.audit_log,
        })
    }

    /// Makes one execution the drawing's official result.
    pub fn publish(
        &self,
        drawing_id: DrawingId,
        execution_id: ExecutionId,
        admin: ParticipantId,
    ) -> Result<Drawing, LotteryError> {
        self.require_admin(admin)?;
        let lock = self.drawing_lock(drawing_id)?;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut drawing = self.load_drawing(drawing_id)?;
        let previous = drawing.status;
        let next = previous.apply(DrawingAction::Publish)?;
        if drawing.published_execution_id.is_some() {
            return Err(LotteryError::AlreadyPublished(drawing_id));
        }
        self.drawing_execution(drawing_id, execution_id)?;

        drawing.status = next;
        drawing.published_execution_id = Some(execution_id);
        drawing.published_at = Some(Utc::now());
        drawing.published_by = Some(admin);
        self.repository.update_drawing(drawing.clone(), previous)?;

        info!(
            drawing = %drawing_id,
            execution = %execution_id,
            published_by = %admin,
            "execution published"
        );
        Ok(drawing)
    }

    /// Allocations of `execution_id` when given; otherwise of the published
    /// execution, falling back to the most recent one. No executions yields an
    /// empty list.
    pub fn get_allocations(
        &self,
        drawing_id: DrawingId,
        execution_id: Option<ExecutionId>,
    ) -> Result<Vec<Allocation>, LotteryError> {
        let drawing = self.load_drawing(drawing_id)?;
        let resolved = match execution_id {
            Some(execution_id) => Some(self.drawing_execution(drawing_id, execution_id)?.id),
            None => self.visible_execution(&drawing)?,
        };

        match resolved {
            Some(execution_id) => Ok(self.repository.allocations(execution_id)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn get_my_allocations(
        &self,
        drawing_id: DrawingId,
        participant: ParticipantId,
    ) -> Result<Vec<Allocation>, LotteryError> {
        Ok(self
            .get_allocations(drawing_id, None)?
            .into_iter()
            .filter(|allocation| allocation.participant_id == participant)
            .collect())
    }

    /// Executions newest first, for comparing trial runs.
    pub fn list_executions(
        &self,
        drawing_id: DrawingId,
    ) -> Result<Vec<ExecutionSummary>, LotteryError> {
        let drawing = self.load_drawing(drawing_id)?;
        let mut summaries = Vec::new();
        for execution in self.repository.executions(drawing_id)? {
            let allocation_count = self.repository.allocations(execution.id)?.len();
            summaries.push(ExecutionSummary {
                id: execution.id,
                drawing_id,
                executed_at: execution.executed_at,
                executed_by: execution.executed_by,
                seed: execution.seed,
                allocation_count,
                published: drawing.published_execution_id == Some(execution.id),
            });
        }
        Ok(summaries)
    }

    pub fn get_execution(
        &self,
        drawing_id: DrawingId,
        execution_id: ExecutionId,
    ) -> Result<Execution, LotteryError> {
        self.load_drawing(drawing_id)?;
        self.drawing_execution(drawing_id, execution_id)
    }

    /// Discards a trial run. Removing the last run of a DRAWN drawing returns
    /// it to LOCKED.
    pub fn delete_execution(
        &self,
        admin: ParticipantId,
        drawing_id: DrawingId,
        execution_id: ExecutionId,
    ) -> Result<(), LotteryError> {
        self.require_admin(admin)?;
        let lock = self.drawing_lock(drawing_id)?;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut drawing = self.load_drawing(drawing_id)?;
        if drawing.has_publication() {
            return Err(LotteryError::AlreadyPublished(drawing_id));
        }
        self.drawing_execution(drawing_id, execution_id)?;
        self.repository.delete_execution(execution_id)?;
        info!(drawing = %drawing_id, execution = %execution_id, "execution deleted");

        if drawing.status == DrawingStatus::Drawn
            && self.repository.executions(drawing_id)?.is_empty()
        {
            let previous = drawing.status;
            drawing.status = previous.apply(DrawingAction::RevertToLocked)?;
            self.repository.update_drawing(drawing, previous)?;
            info!(drawing = %drawing_id, "last execution removed, drawing locked again");
        }
        Ok(())
    }

    pub fn require_admin(&self, participant: ParticipantId) -> Result<(), LotteryError> {
        if self.directory.is_admin(participant)? {
            Ok(())
        } else {
            warn!(participant = %participant, "admin operation refused");
            Err(LotteryError::Unauthorized(participant))
        }
    }

    /// Lock serializing work on one drawing. Unknown drawings get no entry.
    fn drawing_lock(&self, drawing_id: DrawingId) -> Result<Arc<Mutex<()>>, LotteryError> {
        self.load_drawing(drawing_id)?;
        let mut locks = self
            .drawing_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(locks.entry(drawing_id).or_default()))
    }

    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.drawing_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True while a wish or an allocation from any execution names the period.
    fn period_referenced(
        &self,
        drawing_id: DrawingId,
        period_id: PeriodId,
    ) -> Result<bool, LotteryError> {
        if self
            .repository
            .wishes(drawing_id)?
            .iter()
            .any(|wish| wish.period_id == period_id)
        {
            return Ok(true);
        }
        for execution in self.repository.executions(drawing_id)? {
            if self
                .repository
                .allocations(execution.id)?
                .iter()
                .any(|allocation| allocation.period_id == period_id)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn load_drawing(&self, drawing_id: DrawingId) -> Result<Drawing, LotteryError> {
        self.repository
            .fetch_drawing(drawing_id)?
            .ok_or(LotteryError::NotFound(Missing::Drawing(drawing_id)))
    }

    fn editable_drawing(&self, drawing_id: DrawingId) -> Result<Drawing, LotteryError> {
        let drawing = self.load_drawing(drawing_id)?;
        drawing.status.apply(DrawingAction::EditPeriods)?;
        Ok(drawing)
    }

    fn drawing_period(
        &self,
        drawing_id: DrawingId,
        period_id: PeriodId,
    ) -> Result<Period, LotteryError> {
        self.repository
            .periods(drawing_id)?
            .into_iter()
            .find(|period| period.id == period_id)
            .ok_or(LotteryError::NotFound(Missing::Period(period_id)))
    }

    fn drawing_execution(
        &self,
        drawing_id: DrawingId,
        execution_id: ExecutionId,
    ) -> Result<Execution, LotteryError> {
        let execution = self
            .repository
            .fetch_execution(execution_id)?
            .ok_or(LotteryError::NotFound(Missing::Execution(execution_id)))?;
        if execution.drawing_id != drawing_id {
            return Err(LotteryError::WrongDrawing {
                execution: execution_id,
                drawing: drawing_id,
            });
        }
        Ok(execution)
    }

    fn visible_execution(&self, drawing: &Drawing) -> Result<Option<ExecutionId>, LotteryError> {
        if drawing.status == DrawingStatus::Published {
            if let Some(published) = drawing.published_execution_id {
                return Ok(Some(published));
            }
        }
        Ok(self
            .repository
            .executions(drawing.id)?
            .first()
            .map(|execution| execution.id))
    }

    fn draft_labels(
        &self,
        drawing_id: DrawingId,
        participants: &[ParticipantId],
    ) -> Result<DraftLabels, LotteryError> {
        let mut labels = DraftLabels::default();
        for participant in participants {
            if let Some(found) = self.directory.participant(*participant)? {
                labels.participants.insert(*participant, found.name);
            }
        }
        for period in self.repository.periods(drawing_id)? {
            labels.periods.insert(period.id, period.description);
        }
        for apartment in self.catalog.apartments()? {
            labels.apartments.insert(apartment.id, apartment.name);
        }
        Ok(labels)
    }
}

fn clear_publication(drawing: &mut Drawing) {
    drawing.published_execution_id = None;
    drawing.published_at = None;
    drawing.published_by = None;
}

/// Kind of record a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Drawing(DrawingId),
    Period(PeriodId),
    Execution(ExecutionId),
    Apartment(ApartmentId),
    Participant(ParticipantId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Drawing(id) => write!(f, "drawing {id}"),
            Missing::Period(id) => write!(f, "period {id}"),
            Missing::Execution(id) => write!(f, "execution {id}"),
            Missing::Apartment(id) => write!(f, "apartment {id}"),
            Missing::Participant(id) => write!(f, "participant {id}"),
        }
    }
}

/// Error raised by the lottery service.
#[derive(Debug, thiserror::Error)]
pub enum LotteryError {
    #[error(transparent)]
    StateConflict(#[from] StateConflict),
    #[error("{0} not found")]
    NotFound(Missing),
    #[error("execution {execution} does not belong to drawing {drawing}")]
    WrongDrawing {
        execution: ExecutionId,
        drawing: DrawingId,
    },
    #[error("participant {0} is not an administrator")]
    Unauthorized(ParticipantId),
    #[error("drawing {0} already has a published execution")]
    AlreadyPublished(DrawingId),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
