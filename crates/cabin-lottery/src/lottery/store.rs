use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::domain::{
    Allocation, Drawing, DrawingId, Execution, ExecutionId, ParticipantId, Period, PeriodId, Wish,
};
use super::repository::{LotteryRepository, RepositoryError};
use super::status::DrawingStatus;

/// Process-local repository. One mutex guards all tables, so each trait call is
/// a transaction.
#[derive(Default)]
pub struct InMemoryLotteryStore {
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    drawings: HashMap<DrawingId, Drawing>,
    periods: HashMap<PeriodId, Period>,
    wishes: Vec<Wish>,
    // insertion order doubles as the tie-break for equal timestamps
    executions: Vec<Execution>,
    allocations: Vec<Allocation>,
}

impl InMemoryLotteryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

fn check_unique(allocations: &[Allocation]) -> Result<(), RepositoryError> {
    let mut slots = HashSet::with_capacity(allocations.len());
    let mut held = HashSet::with_capacity(allocations.len());
    for allocation in allocations {
        if !slots.insert((allocation.period_id, allocation.apartment_id)) {
            return Err(RepositoryError::Constraint(format!(
                "apartment {} allocated twice in period {}",
                allocation.apartment_id, allocation.period_id
            )));
        }
        if !held.insert((allocation.participant_id, allocation.period_id)) {
            return Err(RepositoryError::Constraint(format!(
                "participant {} allocated twice in period {}",
                allocation.participant_id, allocation.period_id
            )));
        }
    }
    Ok(())
}

impl LotteryRepository for InMemoryLotteryStore {
    fn insert_drawing(&self, drawing: Drawing) -> Result<Drawing, RepositoryError> {
        let mut state = self.lock()?;
        if state.drawings.contains_key(&drawing.id) {
            return Err(RepositoryError::Conflict);
        }
        state.drawings.insert(drawing.id, drawing.clone());
        Ok(drawing)
    }

    fn update_drawing(
        &self,
        drawing: Drawing,
        expected: DrawingStatus,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let stored = state
            .drawings
            .get_mut(&drawing.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.status != expected {
            return Err(RepositoryError::Conflict);
        }
        *stored = drawing;
        Ok(())
    }

    fn fetch_drawing(&self, id: DrawingId) -> Result<Option<Drawing>, RepositoryError> {
        Ok(self.lock()?.drawings.get(&id).cloned())
    }

    fn list_drawings(&self) -> Result<Vec<Drawing>, RepositoryError> {
        let state = self.lock()?;
        let mut drawings: Vec<Drawing> = state.drawings.values().cloned().collect();
        drawings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(drawings)
    }

    fn delete_drawing(&self, id: DrawingId) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if state.drawings.remove(&id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        state.periods.retain(|_, period| period.drawing_id != id);
        state.wishes.retain(|wish| wish.drawing_id != id);
        state.executions.retain(|execution| execution.drawing_id != id);
        state.allocations.retain(|allocation| allocation.drawing_id != id);
        Ok(())
    }

    fn insert_periods(&self, periods: Vec<Period>) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        for period in &periods {
            if !state.drawings.contains_key(&period.drawing_id) {
                return Err(RepositoryError::NotFound);
            }
            if state.periods.contains_key(&period.id) {
                return Err(RepositoryError::Conflict);
            }
        }
        for period in periods {
            state.periods.insert(period.id, period);
        }
        Ok(())
    }

    fn update_period(&self, period: Period) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        match state.periods.get_mut(&period.id) {
            Some(stored) => {
                *stored = period;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn delete_period(&self, id: PeriodId) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if state.wishes.iter().any(|wish| wish.period_id == id) {
            return Err(RepositoryError::Constraint(format!(
                "period {id} is referenced by wishes"
            )));
        }
        if state.allocations.iter().any(|allocation| allocation.period_id == id) {
            return Err(RepositoryError::Constraint(format!(
                "period {id} is referenced by allocations"
            )));
        }
        state
            .periods
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn periods(&self, drawing: DrawingId) -> Result<Vec<Period>, RepositoryError> {
        let state = self.lock()?;
        let mut periods: Vec<Period> = state
            .periods
            .values()
            .filter(|period| period.drawing_id == drawing)
            .cloned()
            .collect();
        periods.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then(a.start_date.cmp(&b.start_date))
                .then(a.id.cmp(&b.id))
        });
        Ok(periods)
    }

    fn replace_wishes(
        &self,
        drawing: DrawingId,
        participant: ParticipantId,
        wishes: Vec<Wish>,
    ) -> Result<Vec<Wish>, RepositoryError> {
        let mut state = self.lock()?;
        if !state.drawings.contains_key(&drawing) {
            return Err(RepositoryError::NotFound);
        }

        let (mut previous, others): (Vec<Wish>, Vec<Wish>) = std::mem::take(&mut state.wishes)
            .into_iter()
            .partition(|wish| wish.drawing_id == drawing && wish.participant_id == participant);

        // Unchanged wishes keep their identity; the rest are swapped in one step.
        let mut stored = Vec::with_capacity(wishes.len());
        for wish in wishes {
            match previous.iter().position(|existing| existing.same_request(&wish)) {
                Some(index) => stored.push(previous.swap_remove(index)),
                None => stored.push(wish),
            }
        }
        stored.sort_by_key(|wish| wish.priority);

        state.wishes = others;
        state.wishes.extend(stored.iter().cloned());
        Ok(stored)
    }

    fn participant_wishes(
        &self,
        drawing: DrawingId,
        participant: ParticipantId,
    ) -> Result<Vec<Wish>, RepositoryError> {
        let state = self.lock()?;
        let mut wishes: Vec<Wish> = state
            .wishes
            .iter()
            .filter(|wish| wish.drawing_id == drawing && wish.participant_id == participant)
            .cloned()
            .collect();
        wishes.sort_by_key(|wish| wish.priority);
        Ok(wishes)
    }

    fn wishes(&self, drawing: DrawingId) -> Result<Vec<Wish>, RepositoryError> {
        let state = self.lock()?;
        let mut wishes: Vec<Wish> = state
            .wishes
            .iter()
            .filter(|wish| wish.drawing_id == drawing)
            .cloned()
            .collect();
        wishes.sort_by_key(|wish| (wish.participant_id, wish.priority));
        Ok(wishes)
    }

    fn commit_execution(
        &self,
        execution: Execution,
        allocations: Vec<Allocation>,
        drawing: Drawing,
        expected: DrawingStatus,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;

        let stored = state
            .drawings
            .get(&drawing.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.status != expected {
            return Err(RepositoryError::Conflict);
        }
        if execution.drawing_id != drawing.id
            || allocations
                .iter()
                .any(|a| a.execution_id != execution.id || a.drawing_id != drawing.id)
        {
            return Err(RepositoryError::Constraint(
                "allocation does not belong to the execution".to_string(),
            ));
        }
        if state.executions.iter().any(|e| e.id == execution.id) {
            return Err(RepositoryError::Conflict);
        }
        check_unique(&allocations)?;

        state.executions.push(execution);
        state.allocations.extend(allocations);
        state.drawings.insert(drawing.id, drawing);
        Ok(())
    }

    fn fetch_execution(&self, id: ExecutionId) -> Result<Option<Execution>, RepositoryError> {
        let state = self.lock()?;
        Ok(state.executions.iter().find(|e| e.id == id).cloned())
    }

    fn executions(&self, drawing: DrawingId) -> Result<Vec<Execution>, RepositoryError> {
        let state = self.lock()?;
        let mut executions: Vec<Execution> = state
            .executions
            .iter()
            .rev()
            .filter(|execution| execution.drawing_id == drawing)
            .cloned()
            .collect();
        // stable sort keeps later inserts first among equal timestamps
        executions.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        Ok(executions)
    }

    fn allocations(&self, execution: ExecutionId) -> Result<Vec<Allocation>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .allocations
            .iter()
            .filter(|allocation| allocation.execution_id == execution)
            .cloned()
            .collect())
    }

    fn delete_execution(&self, id: ExecutionId) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let before = state.executions.len();
        state.executions.retain(|execution| execution.id != id);
        if state.executions.len() == before {
            return Err(RepositoryError::NotFound);
        }
        state.allocations.retain(|allocation| allocation.execution_id != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lottery::audit::AuditLog;
    use crate::lottery::domain::{
        AllocationId, AllocationType, ApartmentId, DrawingStatistics, WishId,
    };
    use chrono::{NaiveDate, TimeZone, Utc};

    fn store_with_drawing(status: DrawingStatus) -> (InMemoryLotteryStore, Drawing) {
        let store = InMemoryLotteryStore::new();
        let mut drawing = Drawing::new("SUMMER_2026", Utc::now());
        drawing.status = status;
        store.insert_drawing(drawing.clone()).expect("insert drawing");
        (store, drawing)
    }

    fn execution(drawing: &Drawing, minute: u32) -> Execution {
        Execution {
            id: ExecutionId::new(),
            drawing_id: drawing.id,
            executed_at: Utc
                .with_ymd_and_hms(2026, 1, 10, 12, minute, 0)
                .single()
                .expect("valid timestamp"),
            executed_by: ParticipantId(1),
            seed: 42,
            audit_log: AuditLog::new(),
            statistics: DrawingStatistics::default(),
        }
    }

    fn allocation(
        execution: &Execution,
        period: PeriodId,
        apartment: u64,
        participant: u64,
    ) -> Allocation {
        Allocation {
            id: AllocationId::new(),
            execution_id: execution.id,
            drawing_id: execution.drawing_id,
            period_id: period,
            apartment_id: ApartmentId(apartment),
            participant_id: ParticipantId(participant),
            allocation_type: AllocationType::Drawn,
            comment: None,
            allocated_at: execution.executed_at,
        }
    }

    fn wish(drawing: &Drawing, period: PeriodId, priority: u32, apartments: &[u64]) -> Wish {
        Wish {
            id: WishId::new(),
            drawing_id: drawing.id,
            participant_id: ParticipantId(5),
            period_id: period,
            priority,
            desired_apartment_ids: apartments.iter().copied().map(ApartmentId).collect(),
            comment: None,
        }
    }

    #[test]
    fn replace_wishes_keeps_unchanged_rows() {
        let (store, drawing) = store_with_drawing(DrawingStatus::Open);
        let period = PeriodId::new();
        let first = store
            .replace_wishes(
                drawing.id,
                ParticipantId(5),
                vec![wish(&drawing, period, 1, &[3, 1]), wish(&drawing, period, 2, &[2])],
            )
            .expect("first replace");

        let second = store
            .replace_wishes(
                drawing.id,
                ParticipantId(5),
                vec![wish(&drawing, period, 1, &[3, 1]), wish(&drawing, period, 2, &[4])],
            )
            .expect("second replace");

        assert_eq!(second[0].id, first[0].id);
        assert_ne!(second[1].id, first[1].id);
        let stored = store
            .participant_wishes(drawing.id, ParticipantId(5))
            .expect("read back");
        assert_eq!(stored, second);
        assert_eq!(stored[0].desired_apartment_ids, vec![ApartmentId(3), ApartmentId(1)]);
    }

    #[test]
    fn commit_rejects_double_booking_without_writing() {
        let (store, drawing) = store_with_drawing(DrawingStatus::Locked);
        let run = execution(&drawing, 0);
        let period = PeriodId::new();
        let mut drawn = drawing.clone();
        drawn.status = DrawingStatus::Drawn;

        let result = store.commit_execution(
            run.clone(),
            vec![allocation(&run, period, 1, 10), allocation(&run, period, 1, 11)],
            drawn,
            DrawingStatus::Locked,
        );

        assert!(matches!(result, Err(RepositoryError::Constraint(_))));
        assert!(store.executions(drawing.id).expect("list").is_empty());
        assert!(store.allocations(run.id).expect("list").is_empty());
        let stored = store.fetch_drawing(drawing.id).expect("fetch").expect("present");
        assert_eq!(stored.status, DrawingStatus::Locked);
    }

    #[test]
    fn commit_rejects_two_slots_for_one_participant_in_a_period() {
        let (store, drawing) = store_with_drawing(DrawingStatus::Locked);
        let run = execution(&drawing, 0);
        let period = PeriodId::new();

        let result = store.commit_execution(
            run.clone(),
            vec![allocation(&run, period, 1, 10), allocation(&run, period, 2, 10)],
            drawing.clone(),
            DrawingStatus::Locked,
        );

        assert!(matches!(result, Err(RepositoryError::Constraint(_))));
    }

    #[test]
    fn update_drawing_is_compare_and_set() {
        let (store, drawing) = store_with_drawing(DrawingStatus::Drawn);
        let mut published = drawing.clone();
        published.status = DrawingStatus::Published;

        assert_eq!(
            store.update_drawing(published.clone(), DrawingStatus::Locked),
            Err(RepositoryError::Conflict)
        );
        store
            .update_drawing(published, DrawingStatus::Drawn)
            .expect("matching status updates");
    }

    #[test]
    fn executions_listed_newest_first_with_insert_tie_break() {
        let (store, drawing) = store_with_drawing(DrawingStatus::Locked);
        let early = execution(&drawing, 0);
        let late = execution(&drawing, 5);
        let late_twin = execution(&drawing, 5);

        for (run, expected) in [
            (early.clone(), DrawingStatus::Locked),
            (late.clone(), DrawingStatus::Locked),
            (late_twin.clone(), DrawingStatus::Locked),
        ] {
            store
                .commit_execution(run, Vec::new(), drawing.clone(), expected)
                .expect("commit");
        }

        let ids: Vec<ExecutionId> = store
            .executions(drawing.id)
            .expect("list")
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![late_twin.id, late.id, early.id]);
    }

    #[test]
    fn delete_period_refused_while_allocated() {
        let (store, drawing) = store_with_drawing(DrawingStatus::Locked);
        let period = Period {
            id: PeriodId::new(),
            drawing_id: drawing.id,
            start_date: NaiveDate::from_ymd_opt(2026, 7, 1).expect("valid date"),
            end_date: NaiveDate::from_ymd_opt(2026, 7, 8).expect("valid date"),
            description: "Uke 27".to_string(),
            comment: None,
            sort_order: 0,
        };
        store.insert_periods(vec![period.clone()]).expect("insert period");
        let run = execution(&drawing, 0);
        store
            .commit_execution(
                run.clone(),
                vec![allocation(&run, period.id, 1, 10)],
                drawing.clone(),
                DrawingStatus::Locked,
            )
            .expect("commit");

        let result = store.delete_period(period.id);

        assert!(matches!(result, Err(RepositoryError::Constraint(_))));
        assert_eq!(store.periods(drawing.id).expect("list"), vec![period.clone()]);

        store.delete_execution(run.id).expect("delete execution");
        store.delete_period(period.id).expect("free period deletes");
    }

    #[test]
    fn delete_drawing_cascades() {
        let (store, drawing) = store_with_drawing(DrawingStatus::Locked);
        let run = execution(&drawing, 0);
        let period = PeriodId::new();
        store
            .commit_execution(
                run.clone(),
                vec![allocation(&run, period, 1, 10)],
                drawing.clone(),
                DrawingStatus::Locked,
            )
            .expect("commit");

        store.delete_drawing(drawing.id).expect("delete");

        assert!(store.fetch_drawing(drawing.id).expect("fetch").is_none());
        assert!(store.fetch_execution(run.id).expect("fetch").is_none());
        assert!(store.allocations(run.id).expect("list").is_empty());
    }
}
