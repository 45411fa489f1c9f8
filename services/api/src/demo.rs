use crate::infra::{build_lottery_service, parse_date, LotteryService, ROSTER};
use cabin_lottery::error::AppError;
use cabin_lottery::lottery::{
    ApartmentId, DrawingId, DrawingResult, ParticipantId, Period, WishImporter, WishInput,
};
use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use std::collections::HashMap;
use std::path::PathBuf;

const DEMO_ADMIN: ParticipantId = ParticipantId(100);
const DEFAULT_SEEDS: [u64; 3] = [7, 42, 1337];
const APARTMENT_COUNT: u64 = 3;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Season label for the sample drawing. Defaults to AUTUMN_2025.
    #[arg(long)]
    pub(crate) season: Option<String>,
    /// First period start (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) start: Option<NaiveDate>,
    /// Number of weekly periods to generate. Defaults to 3.
    #[arg(long)]
    pub(crate) weeks: Option<u32>,
    /// Wish export (tab or comma separated) to import instead of the sample wishes.
    #[arg(long)]
    pub(crate) wishes_csv: Option<PathBuf>,
    /// Seed for one trial draw; repeat the flag for several runs.
    #[arg(long = "seed")]
    pub(crate) seeds: Vec<u64>,
    /// Print the full audit log of every run.
    #[arg(long)]
    pub(crate) audit: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        season,
        start,
        weeks,
        wishes_csv,
        seeds,
        audit,
    } = args;

    let season = season.unwrap_or_else(|| "AUTUMN_2025".to_string());
    let start = start.unwrap_or_else(|| Local::now().date_naive());
    let weeks = weeks.unwrap_or(3).max(1);
    let end = start + Duration::weeks(i64::from(weeks - 1));
    let seeds = if seeds.is_empty() {
        DEFAULT_SEEDS.to_vec()
    } else {
        seeds
    };

    let service = build_lottery_service(&[DEMO_ADMIN]);

    println!("Cabin lottery demo");
    let drawing = service.create_drawing(DEMO_ADMIN, &season)?;
    let periods = service.bulk_create_periods(DEMO_ADMIN, drawing.id, start, end)?;
    println!("- Drawing {} ({})", drawing.season, drawing.id);
    for period in &periods {
        println!("  - period {}: {}", period.sort_order, period.description);
    }

    service.open(DEMO_ADMIN, drawing.id)?;
    match wishes_csv {
        Some(path) => {
            let report = WishImporter::from_path(service.as_ref(), DEMO_ADMIN, drawing.id, path)?;
            println!(
                "- Imported wish export: {} lines | {} applied | {} skipped | {} failed",
                report.total_lines, report.success_count, report.skipped_count, report.error_count
            );
            for error in &report.errors {
                println!("    {error}");
            }
        }
        None => {
            let submitted = submit_sample_wishes(&service, drawing.id, &periods)?;
            println!("- Submitted sample wishes for {submitted} participants");
        }
    }

    service.lock(DEMO_ADMIN, drawing.id)?;

    println!("\nTrial draws");
    let mut runs = Vec::with_capacity(seeds.len());
    for seed in seeds {
        let result = service.perform_draw(drawing.id, DEMO_ADMIN, Some(seed))?;
        render_run_summary(&result);
        if audit {
            for line in result.audit_log.lines() {
                println!("    {line}");
            }
        }
        runs.push(result);
    }

    let Some(chosen) = best_run(&runs) else {
        println!("No trial draws were run");
        return Ok(());
    };
    let published = service.publish(drawing.id, chosen.execution_id, DEMO_ADMIN)?;
    println!(
        "\nPublished execution {} (seed {}) -> status {}",
        chosen.execution_id, chosen.seed, published.status
    );
    render_published_allocations(&service, drawing.id, &periods)
}

/// Seven roster members rank periods and apartments; the last one opts out.
fn submit_sample_wishes(
    service: &LotteryService,
    drawing_id: DrawingId,
    periods: &[Period],
) -> Result<usize, AppError> {
    let participants = &ROSTER[..ROSTER.len() - 1];
    for (index, (id, _, _)) in participants.iter().enumerate() {
        let offset = index as u64;
        let mut wishes = vec![WishInput {
            period_id: periods[index % periods.len()].id,
            priority: 1,
            desired_apartment_ids: vec![
                ApartmentId(offset % APARTMENT_COUNT + 1),
                ApartmentId((offset + 1) % APARTMENT_COUNT + 1),
            ],
            comment: None,
        }];
        if periods.len() > 1 {
            wishes.push(WishInput {
                period_id: periods[(index + 1) % periods.len()].id,
                priority: 2,
                desired_apartment_ids: vec![ApartmentId((offset + 2) % APARTMENT_COUNT + 1)],
                comment: None,
            });
        }
        service.set_wishes(drawing_id, ParticipantId(*id), wishes)?;
    }
    Ok(participants.len())
}

/// Most allocations wins; ties go to the earliest run.
fn best_run(runs: &[DrawingResult]) -> Option<&DrawingResult> {
    runs.iter()
        .rev()
        .max_by_key(|run| run.statistics.total_allocations)
}

fn render_run_summary(result: &DrawingResult) {
    let histogram = result
        .statistics
        .allocation_histogram
        .iter()
        .map(|(held, participants)| format!("{held} -> {participants}"))
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "- seed {}: {} allocations for {} participants | histogram [{}] | execution {}",
        result.seed,
        result.statistics.total_allocations,
        result.statistics.total_participants,
        histogram,
        result.execution_id
    );
}

fn render_published_allocations(
    service: &LotteryService,
    drawing_id: DrawingId,
    periods: &[Period],
) -> Result<(), AppError> {
    let apartments: HashMap<ApartmentId, String> = service
        .apartments()?
        .into_iter()
        .map(|apartment| (apartment.id, apartment.name))
        .collect();
    let names: HashMap<ParticipantId, &str> = ROSTER
        .iter()
        .map(|(id, name, _)| (ParticipantId(*id), *name))
        .collect();

    let allocations = service.get_allocations(drawing_id, None)?;
    println!("Published allocations:");
    for period in periods {
        println!("  {}", period.description);
        let mut in_period: Vec<_> = allocations
            .iter()
            .filter(|allocation| allocation.period_id == period.id)
            .collect();
        in_period.sort_by_key(|allocation| allocation.apartment_id);
        if in_period.is_empty() {
            println!("    (no allocations)");
        }
        for allocation in in_period {
            println!(
                "    {:<16} {}",
                apartments
                    .get(&allocation.apartment_id)
                    .map(String::as_str)
                    .unwrap_or("unknown apartment"),
                names
                    .get(&allocation.participant_id)
                    .copied()
                    .unwrap_or("unknown participant")
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_end_to_end_with_defaults() {
        run_demo(DemoArgs::default()).expect("demo completes");
    }

    #[test]
    fn demo_handles_a_single_week() {
        let args = DemoArgs {
            start: Some(parse_date("2025-10-01").expect("valid date")),
            weeks: Some(1),
            seeds: vec![5],
            audit: true,
            ..DemoArgs::default()
        };
        run_demo(args).expect("demo completes");
    }

    #[test]
    fn sample_wishes_never_double_book_a_slot() {
        let service = build_lottery_service(&[DEMO_ADMIN]);
        let drawing = service
            .create_drawing(DEMO_ADMIN, "TEST")
            .expect("drawing");
        let start = parse_date("2025-10-01").expect("valid date");
        let periods = service
            .bulk_create_periods(DEMO_ADMIN, drawing.id, start, start + Duration::weeks(1))
            .expect("periods");
        service.open(DEMO_ADMIN, drawing.id).expect("open");
        assert_eq!(
            submit_sample_wishes(&service, drawing.id, &periods).expect("wishes"),
            7
        );
        service.lock(DEMO_ADMIN, drawing.id).expect("lock");

        let result = service
            .perform_draw(drawing.id, DEMO_ADMIN, Some(3))
            .expect("draw");
        let mut slots: Vec<_> = result
            .allocations
            .iter()
            .map(|allocation| (allocation.period_id, allocation.apartment_id))
            .collect();
        let before = slots.len();
        slots.sort();
        slots.dedup();
        assert_eq!(slots.len(), before);
        assert!(result.statistics.total_allocations <= periods.len() * APARTMENT_COUNT as usize);
    }
}
