//! Integration tests for the lunch voucher service
//!
//! These tests run calculate, validate and export end to end against the
//! in-memory store and a local export directory.

use chrono::NaiveDate;
use lunch_voucher_service::clock::FixedClock;
use lunch_voucher_service::export::LocalFileStorage;
use lunch_voucher_service::i18n::Catalog;
use lunch_voucher_service::line::{StandardLineFactory, WeekdayCalendar};
use lunch_voucher_service::models::{LunchVoucherFormat, Period, User, VoucherMgtStatus};
use lunch_voucher_service::{
    AdvanceBalance, Company, Employee, HrConfig, InMemoryStore, ServiceError, ShortfallPolicy,
    VoucherLine, VoucherMgt, VoucherMgtService,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn company() -> Company {
    Company {
        id: 1,
        code: Some("ACME".to_string()),
        name: "Acme".to_string(),
    }
}

fn employee(id: i64, name: &str) -> Employee {
    Employee {
        id,
        name: Some(name.to_string()),
        lunch_voucher_format: Some(LunchVoucherFormat::Card),
    }
}

fn january() -> Period {
    Period::new(date(2024, 1, 1), date(2024, 1, 31))
}

async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store
        .insert_hr_config(HrConfig {
            company_id: 1,
            min_stock_lunch_voucher: 20,
            available_stock_lunch_voucher: 100,
        })
        .await;
    store
}

fn service(
    store: InMemoryStore,
    export_dir: &std::path::Path,
) -> VoucherMgtService<InMemoryStore> {
    VoucherMgtService::new(
        store,
        StandardLineFactory::new(WeekdayCalendar),
        LocalFileStorage::new(export_dir),
    )
    .with_clock(FixedClock(date(2024, 2, 1)))
}

fn calculated_mgt(lines: Vec<(Employee, i32)>) -> VoucherMgt {
    let mut mgt = VoucherMgt::new(company(), january());
    mgt.status = VoucherMgtStatus::Calculated;
    mgt.lines = lines
        .into_iter()
        .map(|(employee, in_advance_nbr)| {
            let mut line = VoucherLine::new(employee);
            line.in_advance_nbr = in_advance_nbr;
            line
        })
        .collect();
    mgt
}

async fn insert_advance(
    store: &InMemoryStore,
    employee_id: i64,
    distribution_date: NaiveDate,
    granted: i32,
    used: i32,
) -> AdvanceBalance {
    let mut advance = AdvanceBalance::new(employee_id, distribution_date, granted);
    advance.nbr_lunch_vouchers_used = used;
    store.insert_advance(advance).await
}

#[tokio::test]
async fn test_calculate_creates_one_line_per_employee() {
    let store = seeded_store().await;
    let users = [
        (1, Some(1), Some(employee(10, "Alice"))),
        (2, Some(1), None),
        (3, Some(2), Some(employee(30, "Carol"))),
        (4, Some(1), Some(employee(40, "Dave"))),
    ];
    for (id, active_company_id, employee) in users {
        store
            .insert_user(User {
                id,
                name: format!("user{}", id),
                active_company_id,
                employee,
            })
            .await;
    }
    insert_advance(&store, 10, date(2023, 12, 1), 10, 7).await;

    let dir = tempfile::tempdir().unwrap();
    let service = service(store.clone(), dir.path());

    let mut mgt = VoucherMgt::new(company(), january());
    mgt.stock_line_quantity = 5;
    service.calculate(&mut mgt).await.unwrap();

    assert_eq!(mgt.status, VoucherMgtStatus::Calculated);
    assert_eq!(mgt.stock_quantity_status, 100);

    let employees: Vec<i64> = mgt.lines.iter().map(|l| l.employee.id).collect();
    assert_eq!(employees, vec![10, 40]);

    // 23 weekdays in January 2024; Alice has 3 unused advance vouchers
    assert_eq!(mgt.lines[0].in_advance_nbr, 3);
    assert_eq!(mgt.lines[0].voucher_number, 20);
    assert_eq!(mgt.lines[1].voucher_number, 23);
    assert_eq!(mgt.total_lunch_vouchers, 20 + 23 + 3 + 5);
    assert_eq!(mgt.requested_lunch_vouchers, 20 + 23 + 5);

    let stored = store.mgt(mgt.id.unwrap()).await.unwrap();
    assert_eq!(stored, mgt);
}

#[tokio::test]
async fn test_calculate_total_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(seeded_store().await, dir.path());

    let mut mgt = calculated_mgt(vec![(employee(1, "A"), 2), (employee(2, "B"), 0)]);
    mgt.lines[0].voucher_number = 10;
    mgt.lines[1].voucher_number = 4;
    mgt.stock_line_quantity = 6;

    service.calculate_total(&mut mgt);
    let first = mgt.clone();
    service.calculate_total(&mut mgt);

    assert_eq!(mgt, first);
    assert_eq!(mgt.total_lunch_vouchers, 22);
    assert_eq!(mgt.requested_lunch_vouchers, 20);
}

#[tokio::test]
async fn test_check_stock_reports_margin() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(seeded_store().await, dir.path());

    assert_eq!(service.check_stock(&company(), 50).await.unwrap(), 30);
    assert_eq!(service.check_stock(&company(), 81).await.unwrap(), -1);
}

#[tokio::test]
async fn test_validate_skips_exhausted_and_consumes_next_balance() {
    let store = seeded_store().await;
    let exhausted = insert_advance(&store, 7, date(2023, 11, 1), 5, 5).await;
    let open = insert_advance(&store, 7, date(2023, 12, 1), 10, 2).await;

    let dir = tempfile::tempdir().unwrap();
    let service = service(store.clone(), dir.path());

    let mut mgt = calculated_mgt(vec![(employee(7, "Alice"), 6)]);
    mgt.stock_line_quantity = 15;
    let report = service.validate(&mut mgt).await.unwrap();

    assert_eq!(mgt.status, VoucherMgtStatus::Validated);
    assert_eq!(report.consumptions.len(), 1);
    assert_eq!(report.consumptions[0].consumed, 6);
    assert_eq!(report.consumptions[0].shortfall, 0);
    assert_eq!(report.replenished, 15);

    let advances = store.advances(7).await;
    let find = |id| advances.iter().find(|a| a.id == id).unwrap();
    assert_eq!(find(exhausted.id).nbr_lunch_vouchers_used, 5);
    assert_eq!(find(open.id).nbr_lunch_vouchers_used, 8);

    assert_eq!(store.hr_config(1).await.unwrap().available_stock_lunch_voucher, 115);
}

#[tokio::test]
async fn test_validate_shortfall_is_silent_by_default() {
    let store = seeded_store().await;
    insert_advance(&store, 7, date(2023, 11, 1), 5, 5).await;
    insert_advance(&store, 7, date(2023, 12, 1), 10, 2).await;

    let dir = tempfile::tempdir().unwrap();
    let service = service(store.clone(), dir.path());

    let mut mgt = calculated_mgt(vec![(employee(7, "Alice"), 20)]);
    let report = service.validate(&mut mgt).await.unwrap();

    assert_eq!(report.consumptions[0].consumed, 8);
    assert_eq!(report.consumptions[0].shortfall, 12);
    assert_eq!(report.total_shortfall(), 12);
    assert!(store
        .advances(7)
        .await
        .iter()
        .all(|a| a.nbr_lunch_vouchers_used == a.nbr_lunch_vouchers));
    // The line itself keeps its request
    assert_eq!(mgt.lines[0].in_advance_nbr, 20);
}

#[tokio::test]
async fn test_validate_stops_once_request_is_covered() {
    let store = seeded_store().await;
    let first = insert_advance(&store, 7, date(2023, 10, 1), 4, 0).await;
    let second = insert_advance(&store, 7, date(2023, 11, 1), 5, 0).await;
    let third = insert_advance(&store, 7, date(2023, 12, 1), 6, 0).await;

    let dir = tempfile::tempdir().unwrap();
    let service = service(store.clone(), dir.path());

    let mut mgt = calculated_mgt(vec![(employee(7, "Alice"), 6), (employee(8, "Bob"), 0)]);
    let report = service.validate(&mut mgt).await.unwrap();

    // Lines without advance usage are not reported
    assert_eq!(report.consumptions.len(), 1);

    let advances = store.advances(7).await;
    let used = |id| advances.iter().find(|a| a.id == id).unwrap().nbr_lunch_vouchers_used;
    assert_eq!(used(first.id), 4);
    assert_eq!(used(second.id), 2);
    assert_eq!(used(third.id), 0);
}

#[tokio::test]
async fn test_validate_reject_policy_rolls_back() {
    let store = seeded_store().await;
    insert_advance(&store, 7, date(2023, 12, 1), 10, 2).await;
    insert_advance(&store, 9, date(2023, 12, 1), 3, 0).await;

    let dir = tempfile::tempdir().unwrap();
    let service = service(store.clone(), dir.path()).with_shortfall_policy(ShortfallPolicy::Reject);

    let mut mgt = calculated_mgt(vec![(employee(7, "Alice"), 6), (employee(9, "Bob"), 5)]);
    mgt.stock_line_quantity = 10;
    let result = service.validate(&mut mgt).await;

    assert!(matches!(
        result,
        Err(ServiceError::AdvanceShortfall {
            employee_id: 9,
            shortfall: 2
        })
    ));
    assert_eq!(mgt.status, VoucherMgtStatus::Calculated);
    assert_eq!(store.advances(7).await[0].nbr_lunch_vouchers_used, 2);
    assert_eq!(store.advances(9).await[0].nbr_lunch_vouchers_used, 0);
    assert_eq!(store.hr_config(1).await.unwrap().available_stock_lunch_voucher, 100);
}

#[tokio::test]
async fn test_concurrent_validations_do_not_double_spend() {
    let store = seeded_store().await;
    insert_advance(&store, 7, date(2023, 12, 1), 10, 2).await;

    let dir = tempfile::tempdir().unwrap();
    let service = service(store.clone(), dir.path());

    let mut first = calculated_mgt(vec![(employee(7, "Alice"), 6)]);
    let mut second = calculated_mgt(vec![(employee(7, "Alice"), 6)]);
    let (a, b) = tokio::join!(service.validate(&mut first), service.validate(&mut second));

    let consumed = a.unwrap().consumptions[0].consumed + b.unwrap().consumptions[0].consumed;
    assert_eq!(consumed, 8);
    assert_eq!(store.advances(7).await[0].nbr_lunch_vouchers_used, 10);
}

#[tokio::test]
async fn test_export_writes_escaped_csv() {
    let store = seeded_store().await;
    let dir = tempfile::tempdir().unwrap();
    let service = service(store.clone(), dir.path());

    let mut mgt = calculated_mgt(vec![(employee(1, "A\"B"), 0), (employee(2, "C"), 0)]);
    mgt.lines[0].voucher_number = 18;
    mgt.lines[1].voucher_number = 21;
    mgt.lines[1].employee.lunch_voucher_format = Some(LunchVoucherFormat::Paper);

    let stored = service.export(&mut mgt).await.unwrap();

    assert_eq!(stored.file_name, "Lunch Voucher Mgt - 2024-02-01.csv");
    assert_eq!(mgt.export_date, Some(date(2024, 2, 1)));
    assert_eq!(mgt.csv_file.as_ref(), Some(&stored));

    let contents = std::fs::read_to_string(&stored.path).unwrap();
    assert_eq!(
        contents,
        "\"Company code\";\"Lunch Voucher's number\";\"Employee\";\"Lunch Voucher format\"\n\
         \"ACME\";\"18\";\"A\"\"B\";\"2\"\n\
         \"ACME\";\"21\";\"C\";\"1\""
    );

    let persisted = store.mgt(mgt.id.unwrap()).await.unwrap();
    assert_eq!(persisted.csv_file, Some(stored));
}

#[tokio::test]
async fn test_export_removes_file_when_record_cannot_be_saved() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(seeded_store().await, dir.path());

    // Refers to a record the store does not hold, so persisting fails
    let mut mgt = calculated_mgt(vec![(employee(1, "Alice"), 0)]);
    mgt.id = Some(999);
    let result = service.export(&mut mgt).await;

    assert!(matches!(result, Err(ServiceError::RepositoryError(_))));
    assert!(mgt.csv_file.is_none());
    assert!(mgt.export_date.is_none());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_export_uses_translations() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::new()
        .with_entry("Lunch Voucher Mgt", "Titres-restaurant")
        .with_entry("Employee", "Salarié");
    let service = service(seeded_store().await, dir.path()).with_translator(catalog);

    let mut mgt = calculated_mgt(vec![(employee(1, "Alice"), 0)]);
    let stored = service.export(&mut mgt).await.unwrap();

    assert_eq!(stored.file_name, "Titres-restaurant - 2024-02-01.csv");
    let contents = std::fs::read_to_string(&stored.path).unwrap();
    assert!(contents.starts_with("\"Company code\";\"Lunch Voucher's number\";\"Salarié\";"));
}

#[tokio::test]
async fn test_full_month_cycle() {
    let store = seeded_store().await;
    store
        .insert_user(User {
            id: 1,
            name: "alice".to_string(),
            active_company_id: Some(1),
            employee: Some(employee(10, "Alice")),
        })
        .await;
    insert_advance(&store, 10, date(2023, 12, 1), 4, 0).await;

    let dir = tempfile::tempdir().unwrap();
    let service = service(store.clone(), dir.path());

    let mut mgt = VoucherMgt::new(company(), january());
    mgt.stock_line_quantity = 30;
    service.calculate(&mut mgt).await.unwrap();
    assert_eq!(
        service.check_stock(&company(), mgt.requested_lunch_vouchers).await.unwrap(),
        100 - (19 + 30) - 20
    );

    let report = service.validate(&mut mgt).await.unwrap();
    assert!(!report.has_shortfall());
    service.export(&mut mgt).await.unwrap();

    let reloaded = service.find(mgt.id.unwrap()).await.unwrap();
    assert_eq!(reloaded.status, VoucherMgtStatus::Validated);
    assert!(reloaded.csv_file.is_some());
    assert_eq!(store.hr_config(1).await.unwrap().available_stock_lunch_voucher, 130);
    assert_eq!(store.advances(10).await[0].nbr_lunch_vouchers_used, 4);
}
