use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::lottery::domain::{
    Allocation, Apartment, ApartmentId, Drawing, DrawingId, Execution, ExecutionId, Participant,
    ParticipantId, Period, PeriodId, Wish, WishInput,
};
use crate::lottery::repository::{
    ApartmentCatalog, LotteryRepository, ParticipantDirectory, RepositoryError,
};
use crate::lottery::status::DrawingStatus;
use crate::lottery::{lottery_router, CabinLotteryService, InMemoryLotteryStore};

pub(super) const ADMIN: ParticipantId = ParticipantId(100);
pub(super) const KARI: ParticipantId = ParticipantId(1);
pub(super) const OLA: ParticipantId = ParticipantId(2);
pub(super) const INGRID: ParticipantId = ParticipantId(3);
pub(super) const PER: ParticipantId = ParticipantId(4);

pub(super) const STOR: ApartmentId = ApartmentId(1);
pub(super) const LITEN: ApartmentId = ApartmentId(2);
pub(super) const ANNEKS: ApartmentId = ApartmentId(3);

pub(super) type TestService = CabinLotteryService<InMemoryLotteryStore, MemoryCatalog, MemoryDirectory>;

pub(super) struct MemoryCatalog {
    apartments: Vec<Apartment>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        let apartments = [(STOR, "Stor leilighet"), (LITEN, "Liten leilighet"), (ANNEKS, "Annekset")]
            .into_iter()
            .map(|(id, name)| Apartment {
                id,
                name: name.to_string(),
            })
            .collect();
        Self { apartments }
    }
}

impl ApartmentCatalog for MemoryCatalog {
    fn apartment(&self, id: ApartmentId) -> Result<Option<Apartment>, RepositoryError> {
        Ok(self.apartments.iter().find(|apartment| apartment.id == id).cloned())
    }

    fn apartments(&self) -> Result<Vec<Apartment>, RepositoryError> {
        Ok(self.apartments.clone())
    }
}

pub(super) struct MemoryDirectory {
    participants: Vec<Participant>,
    admins: HashSet<ParticipantId>,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        let participants = [
            (KARI, "Kari Nordmann", "kari@example.com"),
            (OLA, "Ola Hansen", "ola@example.com"),
            (INGRID, "Ingrid Berg", "ingrid@example.com"),
            (PER, "Per Olsen", "per@example.com"),
            (ADMIN, "Lottery Admin", "admin@example.com"),
        ]
        .into_iter()
        .map(|(id, name, email)| Participant {
            id,
            name: name.to_string(),
            email: email.to_string(),
        })
        .collect();
        Self {
            participants,
            admins: HashSet::from([ADMIN]),
        }
    }
}

impl ParticipantDirectory for MemoryDirectory {
    fn participant(&self, id: ParticipantId) -> Result<Option<Participant>, RepositoryError> {
        Ok(self.participants.iter().find(|p| p.id == id).cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<Participant>, RepositoryError> {
        Ok(self
            .participants
            .iter()
            .find(|p| p.email.eq_ignore_ascii_case(email.trim()))
            .cloned())
    }

    fn is_admin(&self, id: ParticipantId) -> Result<bool, RepositoryError> {
        Ok(self.admins.contains(&id))
    }
}

pub(super) fn build_service() -> (TestService, Arc<InMemoryLotteryStore>) {
    let store = Arc::new(InMemoryLotteryStore::new());
    let service = CabinLotteryService::new(
        store.clone(),
        Arc::new(MemoryCatalog::default()),
        Arc::new(MemoryDirectory::default()),
    );
    (service, store)
}

pub(super) fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, day).expect("valid date")
}

/// Creates a drawing with two weekly periods ("05.11 - 12.11", "12.11 - 19.11")
/// and opens it for wishes.
pub(super) fn open_drawing<R, C, D>(service: &CabinLotteryService<R, C, D>) -> (Drawing, Vec<Period>)
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    let drawing = service
        .create_drawing(ADMIN, "AUTUMN_2025")
        .expect("admin creates drawing");
    let periods = service
        .bulk_create_periods(ADMIN, drawing.id, date(11, 5), date(11, 12))
        .expect("weekly periods");
    let drawing = service.open(ADMIN, drawing.id).expect("drawing opens");
    (drawing, periods)
}

pub(super) fn wish(period: PeriodId, priority: u32, apartments: &[ApartmentId]) -> WishInput {
    WishInput {
        period_id: period,
        priority,
        desired_apartment_ids: apartments.to_vec(),
        comment: None,
    }
}

/// Comparable view of an execution's rows.
pub(super) fn slots(allocations: &[Allocation]) -> Vec<(PeriodId, ApartmentId, ParticipantId)> {
    let mut slots: Vec<_> = allocations
        .iter()
        .map(|a| (a.period_id, a.apartment_id, a.participant_id))
        .collect();
    slots.sort();
    slots
}

pub(super) fn per_participant(allocations: &[Allocation]) -> BTreeMap<ParticipantId, usize> {
    let mut counts = BTreeMap::new();
    for allocation in allocations {
        *counts.entry(allocation.participant_id).or_insert(0) += 1;
    }
    counts
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn router_with_service(service: TestService) -> axum::Router {
    lottery_router(Arc::new(service))
}

/// Repository whose backing database is offline.
pub(super) struct UnavailableRepository;

fn offline<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

impl LotteryRepository for UnavailableRepository {
    fn insert_drawing(&self, _drawing: Drawing) -> Result<Drawing, RepositoryError> {
        offline()
    }

    fn update_drawing(
        &self,
        _drawing: Drawing,
        _expected: DrawingStatus,
    ) -> Result<(), RepositoryError> {
        offline()
    }

    fn fetch_drawing(&self, _id: DrawingId) -> Result<Option<Drawing>, RepositoryError> {
        offline()
    }

    fn list_drawings(&self) -> Result<Vec<Drawing>, RepositoryError> {
        offline()
    }

    fn delete_drawing(&self, _id: DrawingId) -> Result<(), RepositoryError> {
        offline()
    }

    fn insert_periods(&self, _periods: Vec<Period>) -> Result<(), RepositoryError> {
        offline()
    }

    fn update_period(&self, _period: Period) -> Result<(), RepositoryError> {
        offline()
    }

    fn delete_period(&self, _id: PeriodId) -> Result<(), RepositoryError> {
        offline()
    }

    fn periods(&self, _drawing: DrawingId) -> Result<Vec<Period>, RepositoryError> {
        offline()
    }

    fn replace_wishes(
        &self,
        _drawing: DrawingId,
        _participant: ParticipantId,
        _wishes: Vec<Wish>,
    ) -> Result<Vec<Wish>, RepositoryError> {
        offline()
    }

    fn participant_wishes(
        &self,
        _drawing: DrawingId,
        _participant: ParticipantId,
    ) -> Result<Vec<Wish>, RepositoryError> {
        offline()
    }

    fn wishes(&self, _drawing: DrawingId) -> Result<Vec<Wish>, RepositoryError> {
        offline()
    }

    fn commit_execution(
        &self,
        _execution: Execution,
        _allocations: Vec<Allocation>,
        _drawing: Drawing,
        _expected: DrawingStatus,
    ) -> Result<(), RepositoryError> {
        offline()
    }

    fn fetch_execution(&self, _id: ExecutionId) -> Result<Option<Execution>, RepositoryError> {
        offline()
    }

    fn executions(&self, _drawing: DrawingId) -> Result<Vec<Execution>, RepositoryError> {
        offline()
    }

    fn allocations(&self, _execution: ExecutionId) -> Result<Vec<Allocation>, RepositoryError> {
        offline()
    }

    fn delete_execution(&self, _id: ExecutionId) -> Result<(), RepositoryError> {
        offline()
    }
}

/// In-memory store whose draw commits always lose a uniqueness race.
#[derive(Default)]
pub(super) struct RacingCommitRepository {
    pub(super) inner: InMemoryLotteryStore,
}

impl LotteryRepository for RacingCommitRepository {
    fn insert_drawing(&self, drawing: Drawing) -> Result<Drawing, RepositoryError> {
        self.inner.insert_drawing(drawing)
    }

    fn update_drawing(
        &self,
        drawing: Drawing,
        expected: DrawingStatus,
    ) -> Result<(), RepositoryError> {
        self.inner.update_drawing(drawing, expected)
    }

    fn fetch_drawing(&self, id: DrawingId) -> Result<Option<Drawing>, RepositoryError> {
        self.inner.fetch_drawing(id)
    }

    fn list_drawings(&self) -> Result<Vec<Drawing>, RepositoryError> {
        self.inner.list_drawings()
    }

    fn delete_drawing(&self, id: DrawingId) -> Result<(), RepositoryError> {
        self.inner.delete_drawing(id)
    }

    fn insert_periods(&self, periods: Vec<Period>) -> Result<(), RepositoryError> {
        self.inner.insert_periods(periods)
    }

    fn update_period(&self, period: Period) -> Result<(), RepositoryError> {
        self.inner.update_period(period)
    }

    fn delete_period(&self, id: PeriodId) -> Result<(), RepositoryError> {
        self.inner.delete_period(id)
    }

    fn periods(&self, drawing: DrawingId) -> Result<Vec<Period>, RepositoryError> {
        self.inner.periods(drawing)
    }

    fn replace_wishes(
        &self,
        drawing: DrawingId,
        participant: ParticipantId,
        wishes: Vec<Wish>,
    ) -> Result<Vec<Wish>, RepositoryError> {
        self.inner.replace_wishes(drawing, participant, wishes)
    }

    fn participant_wishes(
        &self,
        drawing: DrawingId,
        participant: ParticipantId,
    ) -> Result<Vec<Wish>, RepositoryError> {
        self.inner.participant_wishes(drawing, participant)
    }

    fn wishes(&self, drawing: DrawingId) -> Result<Vec<Wish>, RepositoryError> {
        self.inner.wishes(drawing)
    }

    fn commit_execution(
        &self,
        _execution: Execution,
        _allocations: Vec<Allocation>,
        _drawing: Drawing,
        _expected: DrawingStatus,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Constraint(
            "apartment already allocated in period".to_string(),
        ))
    }

    fn fetch_execution(&self, id: ExecutionId) -> Result<Option<Execution>, RepositoryError> {
        self.inner.fetch_execution(id)
    }

    fn executions(&self, drawing: DrawingId) -> Result<Vec<Execution>, RepositoryError> {
        self.inner.executions(drawing)
    }

    fn allocations(&self, execution: ExecutionId) -> Result<Vec<Allocation>, RepositoryError> {
        self.inner.allocations(execution)
    }

    fn delete_execution(&self, id: ExecutionId) -> Result<(), RepositoryError> {
        self.inner.delete_execution(id)
    }
}
