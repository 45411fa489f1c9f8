use cabin_lottery::lottery::{
    Apartment, ApartmentCatalog, ApartmentId, Participant, ParticipantDirectory, ParticipantId,
    RepositoryError,
};
use cabin_lottery::{CabinLotteryService, InMemoryLotteryStore};
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type LotteryService =
    CabinLotteryService<InMemoryLotteryStore, StaticApartmentCatalog, StaticParticipantDirectory>;

/// Apartments of the company cabin.
#[derive(Debug, Clone)]
pub(crate) struct StaticApartmentCatalog {
    apartments: Vec<Apartment>,
}

impl StaticApartmentCatalog {
    pub(crate) fn cabin() -> Self {
        let apartments = ["Stor leilighet", "Liten leilighet", "Annekset"]
            .iter()
            .zip(1..)
            .map(|(name, id)| Apartment {
                id: ApartmentId(id),
                name: name.to_string(),
            })
            .collect();
        Self { apartments }
    }
}

impl ApartmentCatalog for StaticApartmentCatalog {
    fn apartment(&self, id: ApartmentId) -> Result<Option<Apartment>, RepositoryError> {
        Ok(self.apartments.iter().find(|apartment| apartment.id == id).cloned())
    }

    fn apartments(&self) -> Result<Vec<Apartment>, RepositoryError> {
        Ok(self.apartments.clone())
    }
}

/// Employee roster with a configurable administrator set.
#[derive(Debug, Clone)]
pub(crate) struct StaticParticipantDirectory {
    participants: Vec<Participant>,
    admins: HashSet<ParticipantId>,
}

pub(crate) const ROSTER: [(u64, &str, &str); 8] = [
    (1, "Kari Nordmann", "kari.nordmann@example.com"),
    (2, "Ola Hansen", "ola.hansen@example.com"),
    (3, "Ingrid Berg", "ingrid.berg@example.com"),
    (4, "Per Olsen", "per.olsen@example.com"),
    (5, "Liv Dahl", "liv.dahl@example.com"),
    (6, "Nils Lie", "nils.lie@example.com"),
    (7, "Sofie Moen", "sofie.moen@example.com"),
    (8, "Jonas Bakke", "jonas.bakke@example.com"),
];

impl StaticParticipantDirectory {
    pub(crate) fn roster(admin_ids: &[ParticipantId]) -> Self {
        let participants = ROSTER
            .iter()
            .map(|(id, name, email)| Participant {
                id: ParticipantId(*id),
                name: name.to_string(),
                email: email.to_string(),
            })
            .collect();
        Self {
            participants,
            admins: admin_ids.iter().copied().collect(),
        }
    }
}

impl ParticipantDirectory for StaticParticipantDirectory {
    fn participant(&self, id: ParticipantId) -> Result<Option<Participant>, RepositoryError> {
        Ok(self
            .participants
            .iter()
            .find(|participant| participant.id == id)
            .cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<Participant>, RepositoryError> {
        let email = email.trim();
        Ok(self
            .participants
            .iter()
            .find(|participant| participant.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn is_admin(&self, id: ParticipantId) -> Result<bool, RepositoryError> {
        Ok(self.admins.contains(&id))
    }
}

pub(crate) fn build_lottery_service(admin_ids: &[ParticipantId]) -> Arc<LotteryService> {
    Arc::new(CabinLotteryService::new(
        Arc::new(InMemoryLotteryStore::default()),
        Arc::new(StaticApartmentCatalog::cabin()),
        Arc::new(StaticParticipantDirectory::roster(admin_ids)),
    ))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
