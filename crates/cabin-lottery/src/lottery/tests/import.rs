use super::common::*;
use crate::lottery::{ImportError, LotteryError, WishImporter};

const EXPORT: &str = "Timestamp,Email,Participating,Period 1,Units 1,Priority 1,Comment 1,More 1,Period 2,Units 2,Priority 2,Comment 2\n\
2025-10-01 09:12,kari@example.com,Ja,05.11 - 12.11,\"Annekset, Stor leilighet\",1,,Ja,12.11 - 19.11,Liten leilighet,2,dog along\n\
2025-10-01 09:40,ola@example.com,Nei,,,,,,,,,\n\
2025-10-02 14:03,ghost@example.com,Ja,05.11 - 12.11,Annekset,1,,Nei,,,,\n\
2025-10-02 15:30,per@example.com,Ja,05.11 - 12.11,Penthouse,1,,Nei,,,,\n";

#[test]
fn import_applies_rows_and_reports_failures_per_line() {
    let (service, _) = build_service();
    let (drawing, periods) = open_drawing(&service);

    let report = WishImporter::from_reader(&service, ADMIN, drawing.id, EXPORT.as_bytes())
        .expect("import runs");

    assert_eq!(report.total_lines, 4);
    assert_eq!(report.success_count, 1);
    assert_eq!(report.skipped_count, 1);
    assert_eq!(report.error_count, 2);
    assert_eq!(
        report.errors,
        vec![
            "Line 4: participant not found: ghost@example.com".to_string(),
            "Line 5: unknown apartment 'Penthouse'".to_string(),
        ]
    );

    let wishes = service.get_wishes(drawing.id, KARI).expect("wishes");
    assert_eq!(wishes.len(), 2);
    assert_eq!(wishes[0].period_id, periods[0].id);
    assert_eq!(wishes[0].desired_apartment_ids, vec![ANNEKS, STOR]);
    assert_eq!(wishes[1].period_id, periods[1].id);
    assert_eq!(wishes[1].desired_apartment_ids, vec![LITEN]);
    assert_eq!(wishes[1].comment.as_deref(), Some("dog along"));

    assert!(service.get_wishes(drawing.id, OLA).expect("wishes").is_empty());
    assert!(service.get_wishes(drawing.id, PER).expect("wishes").is_empty());
}

#[test]
fn tab_separated_export_is_detected() {
    let (service, _) = build_service();
    let (drawing, periods) = open_drawing(&service);
    let export = "Timestamp\tEmail\tParticipating\tPeriod\tUnits\tPriority\tComment\n\
                  2025-10-01\tingrid@example.com\tja\t12.11 - 19.11\tLiten leilighet, Annekset\t1\t\n";

    let report = WishImporter::from_reader(&service, ADMIN, drawing.id, export.as_bytes())
        .expect("import runs");

    assert_eq!(report.success_count, 1);
    let wishes = service.get_wishes(drawing.id, INGRID).expect("wishes");
    assert_eq!(wishes.len(), 1);
    assert_eq!(wishes[0].period_id, periods[1].id);
    assert_eq!(wishes[0].desired_apartment_ids, vec![LITEN, ANNEKS]);
}

#[test]
fn reimport_replaces_earlier_submission() {
    let (service, _) = build_service();
    let (drawing, periods) = open_drawing(&service);
    service
        .set_wishes(drawing.id, KARI, vec![wish(periods[1].id, 1, &[STOR])])
        .expect("manual wishes");

    let export = "Timestamp,Email,Participating,Period,Units,Priority\n\
                  t,KARI@example.com,yes,05.11 - 12.11,Annekset,1\n";
    WishImporter::from_reader(&service, ADMIN, drawing.id, export.as_bytes()).expect("import runs");

    let wishes = service.get_wishes(drawing.id, KARI).expect("wishes");
    assert_eq!(wishes.len(), 1);
    assert_eq!(wishes[0].period_id, periods[0].id);
    assert_eq!(wishes[0].desired_apartment_ids, vec![ANNEKS]);
}

#[test]
fn import_requires_open_drawing() {
    let (service, _) = build_service();
    let (drawing, _) = open_drawing(&service);
    service.lock(ADMIN, drawing.id).expect("drawing locks");

    let err = WishImporter::from_reader(&service, ADMIN, drawing.id, EXPORT.as_bytes())
        .expect_err("locked drawing");

    assert!(matches!(
        err,
        ImportError::Lottery(LotteryError::StateConflict(_))
    ));
}

#[test]
fn import_is_admin_only() {
    let (service, _) = build_service();
    let (drawing, _) = open_drawing(&service);

    let err = WishImporter::from_reader(&service, KARI, drawing.id, EXPORT.as_bytes())
        .expect_err("not an admin");

    assert!(matches!(
        err,
        ImportError::Lottery(LotteryError::Unauthorized(id)) if id == KARI
    ));
}

#[test]
fn empty_export_is_rejected() {
    let (service, _) = build_service();
    let (drawing, _) = open_drawing(&service);

    let err = WishImporter::from_reader(&service, ADMIN, drawing.id, "".as_bytes())
        .expect_err("empty export");

    assert!(matches!(err, ImportError::Empty));
}
