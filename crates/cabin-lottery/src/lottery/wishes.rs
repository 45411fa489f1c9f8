use std::collections::HashSet;

use super::domain::{
    ApartmentId, DrawingId, ParticipantId, Period, PeriodId, PeriodInput, Wish, WishId, WishInput,
};

/// Malformed wish or period data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("period {0} does not belong to this drawing")]
    InvalidPeriod(PeriodId),
    #[error("priority must be a positive integer")]
    NonPositivePriority,
    #[error("priority {0} is used more than once")]
    DuplicatePriority(u32),
    #[error("wish with priority {priority} lists no apartments")]
    EmptyApartmentList { priority: u32 },
    #[error("wish with priority {priority} lists apartment {apartment} more than once")]
    DuplicateApartment { priority: u32, apartment: ApartmentId },
    #[error("period must end after it starts")]
    InvalidPeriodRange,
    #[error("period description must not be empty")]
    EmptyDescription,
    #[error("season must not be empty")]
    EmptySeason,
    #[error("period {0} is referenced by existing wishes or allocations")]
    PeriodInUse(PeriodId),
    #[error("no participants have submitted wishes for this drawing")]
    NoParticipants,
}

/// Checks a full submission and turns it into wish records ordered by priority.
///
/// Desired apartment lists are carried over untouched.
pub fn build_wishes(
    drawing_id: DrawingId,
    participant_id: ParticipantId,
    inputs: Vec<WishInput>,
    periods: &[Period],
) -> Result<Vec<Wish>, ValidationError> {
    let known_periods: HashSet<PeriodId> = periods
        .iter()
        .filter(|period| period.drawing_id == drawing_id)
        .map(|period| period.id)
        .collect();

    let mut priorities = HashSet::with_capacity(inputs.len());
    let mut wishes = Vec::with_capacity(inputs.len());

    for input in inputs {
        if !known_periods.contains(&input.period_id) {
            return Err(ValidationError::InvalidPeriod(input.period_id));
        }
        if input.priority == 0 {
            return Err(ValidationError::NonPositivePriority);
        }
        if !priorities.insert(input.priority) {
            return Err(ValidationError::DuplicatePriority(input.priority));
        }
        if input.desired_apartment_ids.is_empty() {
            return Err(ValidationError::EmptyApartmentList {
                priority: input.priority,
            });
        }
        let mut seen = HashSet::with_capacity(input.desired_apartment_ids.len());
        if let Some(apartment) = input
            .desired_apartment_ids
            .iter()
            .find(|apartment| !seen.insert(**apartment))
        {
            return Err(ValidationError::DuplicateApartment {
                priority: input.priority,
                apartment: *apartment,
            });
        }

        wishes.push(Wish {
            id: WishId::new(),
            drawing_id,
            participant_id,
            period_id: input.period_id,
            priority: input.priority,
            desired_apartment_ids: input.desired_apartment_ids,
            comment: input.comment.filter(|comment| !comment.trim().is_empty()),
        });
    }

    wishes.sort_by_key(|wish| wish.priority);
    Ok(wishes)
}

pub fn validate_period(input: &PeriodInput) -> Result<(), ValidationError> {
    if input.end_date <= input.start_date {
        return Err(ValidationError::InvalidPeriodRange);
    }
    if input.description.trim().is_empty() {
        return Err(ValidationError::EmptyDescription);
    }
    Ok(())
}
