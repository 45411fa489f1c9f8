//! Bulk wish import from a form-export spreadsheet.
//!
//! Layout: `timestamp, email, participating`, then repeated groups of
//! `period, apartments, priority, comment, more?`. Tab or comma separated,
//! detected from the header row.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use super::domain::{Apartment, ApartmentId, DrawingId, ParticipantId, Period, WishInput};
use super::repository::{ApartmentCatalog, LotteryRepository, ParticipantDirectory};
use super::service::{CabinLotteryService, LotteryError};
use super::status::DrawingAction;

const WISH_COLUMNS: usize = 5;
const FIRST_WISH_COLUMN: usize = 3;

/// Outcome of one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub total_lines: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub skipped_count: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read wish export: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid wish export data: {0}")]
    Csv(#[from] csv::Error),
    #[error("wish export is empty")]
    Empty,
    #[error(transparent)]
    Lottery(#[from] LotteryError),
}

pub struct WishImporter;

impl WishImporter {
    pub fn from_path<P, R, C, D>(
        service: &CabinLotteryService<R, C, D>,
        admin: ParticipantId,
        drawing_id: DrawingId,
        path: P,
    ) -> Result<ImportReport, ImportError>
    where
        P: AsRef<Path>,
        R: LotteryRepository + 'static,
        C: ApartmentCatalog + 'static,
        D: ParticipantDirectory + 'static,
    {
        let file = std::fs::File::open(path)?;
        Self::from_reader(service, admin, drawing_id, file)
    }

    /// Applies every data row through `set_wishes`; one participant's row is
    /// all-or-nothing, failures are collected per line.
    pub fn from_reader<In, R, C, D>(
        service: &CabinLotteryService<R, C, D>,
        admin: ParticipantId,
        drawing_id: DrawingId,
        reader: In,
    ) -> Result<ImportReport, ImportError>
    where
        In: Read,
        R: LotteryRepository + 'static,
        C: ApartmentCatalog + 'static,
        D: ParticipantDirectory + 'static,
    {
        service.require_admin(admin)?;
        let drawing = service.get_drawing(drawing_id)?;
        drawing.status.apply(DrawingAction::SubmitWishes).map_err(LotteryError::from)?;

        let mut buffered = BufReader::new(reader);
        let mut header = String::new();
        if buffered.read_line(&mut header)? == 0 || header.trim().is_empty() {
            return Err(ImportError::Empty);
        }
        let delimiter = if header.contains('\t') { b'\t' } else { b',' };

        let periods = service.periods(drawing_id)?;
        let apartments = service.apartments()?;

        let mut rows = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_reader(buffered);

        let mut report = ImportReport::default();
        for (index, record) in rows.records().enumerate() {
            let line = index + 2;
            report.total_lines += 1;
            let record = match record {
                Ok(record) => record,
                Err(error) => {
                    report.fail(line, error.to_string());
                    continue;
                }
            };
            let fields: Vec<&str> = record.iter().collect();

            let row = match parse_row(&fields, &periods, &apartments) {
                Ok(Some(row)) => row,
                Ok(None) => {
                    report.skipped_count += 1;
                    continue;
                }
                Err(message) => {
                    report.fail(line, message);
                    continue;
                }
            };

            let participant = match service.find_participant_by_email(&row.email)? {
                Some(participant) => participant,
                None => {
                    report.fail(line, format!("participant not found: {}", row.email));
                    continue;
                }
            };

            match service.set_wishes(drawing_id, participant.id, row.wishes) {
                Ok(_) => report.success_count += 1,
                Err(error @ LotteryError::Repository(_)) => return Err(error.into()),
                Err(error) => report.fail(line, error.to_string()),
            }
        }

        info!(
            drawing = %drawing_id,
            lines = report.total_lines,
            imported = report.success_count,
            failed = report.error_count,
            "wish import finished"
        );
        Ok(report)
    }
}

impl ImportReport {
    fn fail(&mut self, line: usize, message: String) {
        warn!(line, %message, "wish import line rejected");
        self.error_count += 1;
        self.errors.push(format!("Line {line}: {message}"));
    }
}

#[derive(Debug)]
struct ImportRow {
    email: String,
    wishes: Vec<WishInput>,
}

/// `Ok(None)` for rows that opted out or carry no wishes.
fn parse_row(
    fields: &[&str],
    periods: &[Period],
    apartments: &[Apartment],
) -> Result<Option<ImportRow>, String> {
    if fields.len() < FIRST_WISH_COLUMN {
        return Err("too few columns".to_string());
    }
    let email = fields[1].trim();
    if !matches!(fields[2].trim().to_lowercase().as_str(), "ja" | "yes") {
        return Ok(None);
    }
    if email.is_empty() {
        return Err("missing email".to_string());
    }

    let mut wishes = Vec::new();
    let mut column = FIRST_WISH_COLUMN;
    while column + 2 < fields.len() {
        let period_text = fields[column];
        let apartment_text = fields[column + 1];
        let priority_text = fields[column + 2];
        let comment = fields.get(column + 3).map(|value| value.trim().to_string());
        column += WISH_COLUMNS;

        if period_text.is_empty() && apartment_text.is_empty() && priority_text.is_empty() {
            continue;
        }

        let priority: u32 = priority_text
            .parse()
            .map_err(|_| format!("invalid priority '{priority_text}'"))?;
        let period = resolve_period(period_text, periods)
            .ok_or_else(|| format!("unknown period '{period_text}'"))?;
        let desired_apartment_ids = apartment_text
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                resolve_apartment(name, apartments).ok_or_else(|| format!("unknown apartment '{name}'"))
            })
            .collect::<Result<Vec<ApartmentId>, String>>()?;

        wishes.push(WishInput {
            period_id: period.id,
            priority,
            desired_apartment_ids,
            comment: comment.filter(|comment| !comment.is_empty()),
        });
    }

    if wishes.is_empty() {
        return Ok(None);
    }
    Ok(Some(ImportRow {
        email: email.to_string(),
        wishes,
    }))
}

fn resolve_period<'a>(text: &str, periods: &'a [Period]) -> Option<&'a Period> {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    periods.iter().find(|period| {
        let description = period.description.to_lowercase();
        description.contains(&needle) || needle.contains(&description)
    })
}

fn resolve_apartment(name: &str, apartments: &[Apartment]) -> Option<ApartmentId> {
    let needle = name.to_lowercase();
    apartments
        .iter()
        .find(|apartment| apartment.name.to_lowercase() == needle)
        .or_else(|| {
            apartments.iter().find(|apartment| {
                let candidate = apartment.name.to_lowercase();
                candidate.contains(&needle) || needle.contains(&candidate)
            })
        })
        .map(|apartment| apartment.id)
}
