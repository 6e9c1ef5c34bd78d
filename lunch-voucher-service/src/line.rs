//! Voucher line creation

use anyhow::Result;
use chrono::{Datelike, Weekday};

use crate::models::{Employee, Period, VoucherLine, VoucherMgt};
use crate::repository::AdvanceRepository;

/// Number of days an employee worked in a period
pub trait WorkedDaysSource: Send + Sync {
    fn days_worked(&self, employee: &Employee, period: &Period) -> i32;
}

/// Counts every Monday to Friday of the period as worked.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeekdayCalendar;

impl WorkedDaysSource for WeekdayCalendar {
    fn days_worked(&self, _employee: &Employee, period: &Period) -> i32 {
        period
            .from_date
            .iter_days()
            .take_while(|day| *day <= period.to_date)
            .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
            .count() as i32
    }
}

/// Builds the voucher line of one employee for a management record
#[allow(async_fn_in_trait)]
pub trait LineFactory: Send + Sync {
    async fn create<R: AdvanceRepository>(
        &self,
        repo: &mut R,
        employee: &Employee,
        mgt: &VoucherMgt,
    ) -> Result<VoucherLine>;
}

/// Line factory combining worked days with the employee's unused advances,
/// capped at the vouchers the line earns.
#[derive(Debug, Clone)]
pub struct StandardLineFactory<W = WeekdayCalendar> {
    worked_days: W,
}

impl<W: WorkedDaysSource> StandardLineFactory<W> {
    pub fn new(worked_days: W) -> Self {
        Self { worked_days }
    }
}

impl<W: WorkedDaysSource> LineFactory for StandardLineFactory<W> {
    async fn create<R: AdvanceRepository>(
        &self,
        repo: &mut R,
        employee: &Employee,
        mgt: &VoucherMgt,
    ) -> Result<VoucherLine> {
        let mut line = VoucherLine::new(employee.clone());
        line.days_worked_nbr = self.worked_days.days_worked(employee, &mgt.period);

        let unused: i32 = repo
            .find_eligible_by_employee(employee.id)
            .await?
            .iter()
            .fold(0, |acc, a| acc.saturating_add(a.remaining()));
        // Advances only cover vouchers the line actually earned
        line.in_advance_nbr = unused.min(line.earned()).max(0);
        line.compute();

        tracing::debug!(
            employee_id = employee.id,
            days_worked = line.days_worked_nbr,
            in_advance = line.in_advance_nbr,
            vouchers = line.voucher_number,
            "Created lunch voucher line"
        );
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdvanceBalance, Company};
    use crate::repository::{InMemoryStore, Store};
    use chrono::NaiveDate;

    fn employee() -> Employee {
        Employee {
            id: 5,
            name: Some("Alice".to_string()),
            lunch_voucher_format: None,
        }
    }

    fn january() -> Period {
        Period::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
    }

    #[test]
    fn test_weekday_calendar() {
        // January 2024 starts on a Monday and has 23 weekdays
        assert_eq!(WeekdayCalendar.days_worked(&employee(), &january()), 23);

        let weekend = Period::new(
            NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
        );
        assert_eq!(WeekdayCalendar.days_worked(&employee(), &weekend), 0);
    }

    #[test]
    fn test_weekday_calendar_inverted_period() {
        let inverted = Period::new(
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        assert_eq!(WeekdayCalendar.days_worked(&employee(), &inverted), 0);
    }

    #[tokio::test]
    async fn test_line_deducts_unused_advances() {
        let store = InMemoryStore::new();
        let mut partly_used = AdvanceBalance::new(5, NaiveDate::from_ymd_opt(2023, 12, 1).unwrap(), 10);
        partly_used.nbr_lunch_vouchers_used = 7;
        store.insert_advance(partly_used).await;
        store
            .insert_advance(AdvanceBalance::new(6, NaiveDate::from_ymd_opt(2023, 12, 1).unwrap(), 4))
            .await;

        let mgt = VoucherMgt::new(
            Company {
                id: 1,
                code: None,
                name: "Acme".to_string(),
            },
            january(),
        );

        let mut tx = store.begin().await.unwrap();
        let line = StandardLineFactory::new(WeekdayCalendar)
            .create(&mut tx, &employee(), &mgt)
            .await
            .unwrap();

        assert_eq!(line.days_worked_nbr, 23);
        assert_eq!(line.in_advance_nbr, 3);
        assert_eq!(line.voucher_number, 20);
    }

    #[tokio::test]
    async fn test_line_advances_capped_at_earned_vouchers() {
        let store = InMemoryStore::new();
        store
            .insert_advance(AdvanceBalance::new(5, NaiveDate::from_ymd_opt(2023, 12, 1).unwrap(), 50))
            .await;

        let mut mgt = VoucherMgt::new(
            Company {
                id: 1,
                code: None,
                name: "Acme".to_string(),
            },
            january(),
        );

        let mut tx = store.begin().await.unwrap();
        let line = StandardLineFactory::new(WeekdayCalendar)
            .create(&mut tx, &employee(), &mgt)
            .await
            .unwrap();

        assert_eq!(line.days_worked_nbr, 23);
        assert_eq!(line.in_advance_nbr, 23);
        assert_eq!(line.voucher_number, 0);

        mgt.lines.push(line);
        mgt.compute_totals();
        assert_eq!(mgt.total_lunch_vouchers, 23);
    }

    #[tokio::test]
    async fn test_line_without_worked_days_uses_no_advance() {
        let store = InMemoryStore::new();
        store
            .insert_advance(AdvanceBalance::new(5, NaiveDate::from_ymd_opt(2023, 12, 1).unwrap(), 4))
            .await;

        let weekend = Period::new(
            NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
        );
        let mgt = VoucherMgt::new(
            Company {
                id: 1,
                code: None,
                name: "Acme".to_string(),
            },
            weekend,
        );

        let mut tx = store.begin().await.unwrap();
        let line = StandardLineFactory::new(WeekdayCalendar)
            .create(&mut tx, &employee(), &mgt)
            .await
            .unwrap();

        assert_eq!(line.in_advance_nbr, 0);
        assert_eq!(line.voucher_number, 0);
    }
}
