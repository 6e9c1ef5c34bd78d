//! MySQL-backed store
//!
//! Each unit of work is one database transaction. HR configuration and
//! advance balances are read `FOR UPDATE`, so two validations touching the
//! same company or employee serialize on the row locks.

use anyhow::Result;
use chrono::NaiveDate;
use db::{DbConfig, DbPool, MySql};
use error::DatabaseError;
use sqlx::{FromRow, Transaction};

use crate::models::{
    AdvanceBalance, Company, Employee, HrConfig, LunchVoucherFormat, Period, StoredFile, User,
    VoucherLine, VoucherMgt, VoucherMgtStatus,
};
use crate::repository::{
    AdvanceRepository, HrConfigRepository, RepositoryError, Store, UnitOfWork, UserRepository,
    VoucherMgtRepository,
};

/// Store backed by a MySQL connection pool
#[derive(Clone)]
pub struct MySqlStore {
    pool: DbPool,
}

impl MySqlStore {
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let pool = db::create_pool(config).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        db::health_check(&self.pool).await?;
        Ok(())
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Lunch voucher schema is up to date");
        Ok(())
    }
}

impl Store for MySqlStore {
    type Tx = MySqlTx;

    async fn begin(&self) -> Result<MySqlTx> {
        let tx = db::begin(&self.pool).await?;
        Ok(MySqlTx { tx })
    }
}

/// Unit of work wrapping a MySQL transaction; rolled back when dropped
/// without commit.
pub struct MySqlTx {
    tx: Transaction<'static, MySql>,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    name: String,
    active_company_id: Option<i64>,
    employee_id: Option<i64>,
    employee_name: Option<String>,
    lunch_voucher_format: Option<i32>,
}

impl UserRow {
    fn into_model(self) -> User {
        let format = self.lunch_voucher_format.and_then(LunchVoucherFormat::from_code);
        User {
            id: self.id,
            name: self.name,
            active_company_id: self.active_company_id,
            employee: self.employee_id.map(|id| Employee {
                id,
                name: self.employee_name,
                lunch_voucher_format: format,
            }),
        }
    }
}

#[derive(Debug, FromRow)]
struct AdvanceRow {
    id: i64,
    employee_id: i64,
    distribution_date: NaiveDate,
    nbr_lunch_vouchers: i32,
    nbr_lunch_vouchers_used: i32,
}

impl From<AdvanceRow> for AdvanceBalance {
    fn from(row: AdvanceRow) -> Self {
        AdvanceBalance {
            id: Some(row.id),
            employee_id: row.employee_id,
            distribution_date: row.distribution_date,
            nbr_lunch_vouchers: row.nbr_lunch_vouchers,
            nbr_lunch_vouchers_used: row.nbr_lunch_vouchers_used,
        }
    }
}

#[derive(Debug, FromRow)]
struct HrConfigRow {
    company_id: i64,
    min_stock_lunch_voucher: i32,
    available_stock_lunch_voucher: i32,
}

impl From<HrConfigRow> for HrConfig {
    fn from(row: HrConfigRow) -> Self {
        HrConfig {
            company_id: row.company_id,
            min_stock_lunch_voucher: row.min_stock_lunch_voucher,
            available_stock_lunch_voucher: row.available_stock_lunch_voucher,
        }
    }
}

#[derive(Debug, FromRow)]
struct MgtRow {
    id: i64,
    company_id: Option<i64>,
    company_code: Option<String>,
    company_name: Option<String>,
    from_date: NaiveDate,
    to_date: NaiveDate,
    status: i32,
    stock_line_quantity: i32,
    stock_quantity_status: i32,
    total_lunch_vouchers: i32,
    requested_lunch_vouchers: i32,
    csv_file_name: Option<String>,
    csv_file_path: Option<String>,
    csv_file_size: Option<i64>,
    export_date: Option<NaiveDate>,
}

impl MgtRow {
    fn into_model(self, lines: Vec<VoucherLine>) -> Result<VoucherMgt> {
        let status = VoucherMgtStatus::from_code(self.status).ok_or_else(|| {
            RepositoryError::Corrupt(format!(
                "Lunch voucher mgt {} has unknown status {}",
                self.id, self.status
            ))
        })?;

        let csv_file = match (self.csv_file_name, self.csv_file_path) {
            (Some(file_name), Some(path)) => Some(StoredFile {
                file_name,
                path,
                size: self.csv_file_size.unwrap_or(0).max(0) as u64,
            }),
            _ => None,
        };

        Ok(VoucherMgt {
            id: Some(self.id),
            company: self.company_id.map(|id| Company {
                id,
                code: self.company_code,
                name: self.company_name.unwrap_or_default(),
            }),
            period: Period::new(self.from_date, self.to_date),
            status,
            stock_line_quantity: self.stock_line_quantity,
            stock_quantity_status: self.stock_quantity_status,
            total_lunch_vouchers: self.total_lunch_vouchers,
            requested_lunch_vouchers: self.requested_lunch_vouchers,
            csv_file,
            export_date: self.export_date,
            lines,
        })
    }
}

#[derive(Debug, FromRow)]
struct LineRow {
    id: i64,
    employee_id: i64,
    employee_name: Option<String>,
    lunch_voucher_format: Option<i32>,
    days_worked_nbr: i32,
    canteen_entries: i32,
    days_overseas: i32,
    invitation: i32,
    in_advance_nbr: i32,
    voucher_number: i32,
}

impl From<LineRow> for VoucherLine {
    fn from(row: LineRow) -> Self {
        VoucherLine {
            id: Some(row.id),
            employee: Employee {
                id: row.employee_id,
                name: row.employee_name,
                lunch_voucher_format: row.lunch_voucher_format.and_then(LunchVoucherFormat::from_code),
            },
            days_worked_nbr: row.days_worked_nbr,
            canteen_entries: row.canteen_entries,
            days_overseas: row.days_overseas,
            invitation: row.invitation,
            in_advance_nbr: row.in_advance_nbr,
            voucher_number: row.voucher_number,
        }
    }
}

impl UserRepository for MySqlTx {
    async fn find_by_active_company(&mut self, company_id: i64) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT u.id, u.name, u.active_company_id, e.id AS employee_id, \
                    e.name AS employee_name, e.lunch_voucher_format \
             FROM users u LEFT JOIN employees e ON e.id = u.employee_id \
             WHERE u.active_company_id = ? ORDER BY u.id",
        )
        .bind(company_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(UserRow::into_model).collect())
    }
}

impl AdvanceRepository for MySqlTx {
    async fn find_eligible_by_employee(&mut self, employee_id: i64) -> Result<Vec<AdvanceBalance>> {
        let rows = sqlx::query_as::<_, AdvanceRow>(
            "SELECT id, employee_id, distribution_date, nbr_lunch_vouchers, nbr_lunch_vouchers_used \
             FROM lunch_voucher_advances \
             WHERE employee_id = ? AND nbr_lunch_vouchers_used < nbr_lunch_vouchers \
             ORDER BY distribution_date, id FOR UPDATE",
        )
        .bind(employee_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(AdvanceBalance::from).collect())
    }

    async fn save_advance(&mut self, advance: &AdvanceBalance) -> Result<AdvanceBalance> {
        let mut saved = advance.clone();
        let result = sqlx::query(
            "INSERT INTO lunch_voucher_advances \
                 (id, employee_id, distribution_date, nbr_lunch_vouchers, nbr_lunch_vouchers_used) \
             VALUES (?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE \
                 distribution_date = VALUES(distribution_date), \
                 nbr_lunch_vouchers = VALUES(nbr_lunch_vouchers), \
                 nbr_lunch_vouchers_used = VALUES(nbr_lunch_vouchers_used)",
        )
        .bind(saved.id)
        .bind(saved.employee_id)
        .bind(saved.distribution_date)
        .bind(saved.nbr_lunch_vouchers)
        .bind(saved.nbr_lunch_vouchers_used)
        .execute(&mut *self.tx)
        .await?;

        if saved.id.is_none() {
            saved.id = Some(result.last_insert_id() as i64);
        }
        Ok(saved)
    }
}

impl HrConfigRepository for MySqlTx {
    async fn find_by_company(&mut self, company_id: i64) -> Result<Option<HrConfig>> {
        let row = sqlx::query_as::<_, HrConfigRow>(
            "SELECT company_id, min_stock_lunch_voucher, available_stock_lunch_voucher \
             FROM hr_configs WHERE company_id = ? FOR UPDATE",
        )
        .bind(company_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(HrConfig::from))
    }

    async fn save_hr_config(&mut self, config: &HrConfig) -> Result<()> {
        sqlx::query(
            "INSERT INTO hr_configs \
                 (company_id, min_stock_lunch_voucher, available_stock_lunch_voucher) \
             VALUES (?, ?, ?) \
             ON DUPLICATE KEY UPDATE \
                 min_stock_lunch_voucher = VALUES(min_stock_lunch_voucher), \
                 available_stock_lunch_voucher = VALUES(available_stock_lunch_voucher)",
        )
        .bind(config.company_id)
        .bind(config.min_stock_lunch_voucher)
        .bind(config.available_stock_lunch_voucher)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

impl VoucherMgtRepository for MySqlTx {
    async fn find_mgt(&mut self, id: i64) -> Result<Option<VoucherMgt>> {
        let row = sqlx::query_as::<_, MgtRow>(
            "SELECT m.id, m.company_id, c.code AS company_code, c.name AS company_name, \
                    m.from_date, m.to_date, m.status, m.stock_line_quantity, \
                    m.stock_quantity_status, m.total_lunch_vouchers, m.requested_lunch_vouchers, \
                    m.csv_file_name, m.csv_file_path, m.csv_file_size, m.export_date \
             FROM lunch_voucher_mgts m LEFT JOIN companies c ON c.id = m.company_id \
             WHERE m.id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, LineRow>(
            "SELECT l.id, l.employee_id, e.name AS employee_name, e.lunch_voucher_format, \
                    l.days_worked_nbr, l.canteen_entries, l.days_overseas, l.invitation, \
                    l.in_advance_nbr, l.voucher_number \
             FROM lunch_voucher_mgt_lines l LEFT JOIN employees e ON e.id = l.employee_id \
             WHERE l.mgt_id = ? ORDER BY l.seq",
        )
        .bind(id)
        .fetch_all(&mut *self.tx)
        .await?;

        row.into_model(lines.into_iter().map(VoucherLine::from).collect())
            .map(Some)
    }

    async fn save_mgt(&mut self, mgt: &VoucherMgt) -> Result<VoucherMgt> {
        let mut saved = mgt.clone();
        let company_id = saved.company.as_ref().map(|c| c.id);
        let csv_file_name = saved.csv_file.as_ref().map(|f| f.file_name.clone());
        let csv_file_path = saved.csv_file.as_ref().map(|f| f.path.clone());
        let csv_file_size = saved.csv_file.as_ref().map(|f| f.size as i64);

        let result = sqlx::query(
            "INSERT INTO lunch_voucher_mgts \
                 (id, company_id, from_date, to_date, status, stock_line_quantity, \
                  stock_quantity_status, total_lunch_vouchers, requested_lunch_vouchers, \
                  csv_file_name, csv_file_path, csv_file_size, export_date) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE \
                 company_id = VALUES(company_id), from_date = VALUES(from_date), \
                 to_date = VALUES(to_date), status = VALUES(status), \
                 stock_line_quantity = VALUES(stock_line_quantity), \
                 stock_quantity_status = VALUES(stock_quantity_status), \
                 total_lunch_vouchers = VALUES(total_lunch_vouchers), \
                 requested_lunch_vouchers = VALUES(requested_lunch_vouchers), \
                 csv_file_name = VALUES(csv_file_name), csv_file_path = VALUES(csv_file_path), \
                 csv_file_size = VALUES(csv_file_size), export_date = VALUES(export_date)",
        )
        .bind(saved.id)
        .bind(company_id)
        .bind(saved.period.from_date)
        .bind(saved.period.to_date)
        .bind(saved.status.code())
        .bind(saved.stock_line_quantity)
        .bind(saved.stock_quantity_status)
        .bind(saved.total_lunch_vouchers)
        .bind(saved.requested_lunch_vouchers)
        .bind(csv_file_name)
        .bind(csv_file_path)
        .bind(csv_file_size)
        .bind(saved.export_date)
        .execute(&mut *self.tx)
        .await?;

        let mgt_id = match saved.id {
            Some(id) => id,
            None => result.last_insert_id() as i64,
        };
        saved.id = Some(mgt_id);

        sqlx::query("DELETE FROM lunch_voucher_mgt_lines WHERE mgt_id = ?")
            .bind(mgt_id)
            .execute(&mut *self.tx)
            .await?;

        for (sequence, line) in saved.lines.iter_mut().enumerate() {
            let result = sqlx::query(
                "INSERT INTO lunch_voucher_mgt_lines \
                     (id, mgt_id, seq, employee_id, days_worked_nbr, canteen_entries, \
                      days_overseas, invitation, in_advance_nbr, voucher_number) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(line.id)
            .bind(mgt_id)
            .bind(sequence as i32)
            .bind(line.employee.id)
            .bind(line.days_worked_nbr)
            .bind(line.canteen_entries)
            .bind(line.days_overseas)
            .bind(line.invitation)
            .bind(line.in_advance_nbr)
            .bind(line.voucher_number)
            .execute(&mut *self.tx)
            .await?;

            if line.id.is_none() {
                line.id = Some(result.last_insert_id() as i64);
            }
        }

        Ok(saved)
    }
}

impl UnitOfWork for MySqlTx {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(|e| {
            tracing::error!("Failed to commit lunch voucher transaction: {}", e);
            DatabaseError::TransactionFailed(e.to_string())
        })?;
        Ok(())
    }
}
