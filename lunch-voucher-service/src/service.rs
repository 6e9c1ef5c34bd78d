//! Lunch voucher service
//!
//! Business operations on a monthly lunch voucher management record:
//! calculation of the lines, stock check, validation against advance
//! balances and CSV export. Each operation runs in one unit of work.

use thiserror::Error;

use crate::advance::{consume_fifo, AdvanceConsumption, ShortfallPolicy, ValidationReport};
use crate::clock::{Clock, SystemClock};
use crate::export::{export_file_name, render_csv, stage_csv, FileStorage, LocalFileStorage};
use crate::i18n::{Catalog, Translator};
use crate::line::{LineFactory, StandardLineFactory};
use crate::models::{Company, HrConfig, StoredFile, VoucherMgt, VoucherMgtStatus};
use crate::repository::{
    AdvanceRepository, HrConfigRepository, Store, UnitOfWork, UserRepository,
    VoucherMgtRepository,
};

/// Service errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Lunch voucher management record has no company")]
    CompanyMissing,

    #[error("No HR configuration for company {company_id}")]
    ConfigurationMissing { company_id: i64 },

    #[error("Lunch voucher management record {0} not found")]
    NotFound(i64),

    #[error("Advance vouchers short by {shortfall} for employee {employee_id}")]
    AdvanceShortfall { employee_id: i64, shortfall: i32 },

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Repository error: {0}")]
    RepositoryError(String),
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        ServiceError::RepositoryError(format!("{:#}", err))
    }
}

impl From<ServiceError> for error::AppError {
    fn from(err: ServiceError) -> Self {
        use error::{AppError, DatabaseError};

        match err {
            ServiceError::CompanyMissing | ServiceError::AdvanceShortfall { .. } => {
                AppError::Validation(err.to_string())
            }
            ServiceError::ConfigurationMissing { .. } => AppError::Configuration(err.to_string()),
            ServiceError::NotFound(_) => AppError::NotFound(err.to_string()),
            ServiceError::Export(msg) => AppError::Export(msg),
            ServiceError::RepositoryError(msg) => {
                AppError::Database(DatabaseError::QueryFailed(msg))
            }
        }
    }
}

fn company_of(mgt: &VoucherMgt) -> Result<&Company, ServiceError> {
    mgt.company.as_ref().ok_or(ServiceError::CompanyMissing)
}

async fn hr_config<R: HrConfigRepository>(
    repo: &mut R,
    company_id: i64,
) -> Result<HrConfig, ServiceError> {
    repo.find_by_company(company_id).await?.ok_or_else(|| {
        tracing::warn!(company_id, "No HR configuration for company");
        ServiceError::ConfigurationMissing { company_id }
    })
}

/// Lunch voucher service for business operations
pub struct VoucherMgtService<S, L = StandardLineFactory, F = LocalFileStorage> {
    store: S,
    line_factory: L,
    file_storage: F,
    translator: Box<dyn Translator>,
    clock: Box<dyn Clock>,
    shortfall_policy: ShortfallPolicy,
}

impl<S, L, F> VoucherMgtService<S, L, F>
where
    S: Store,
    L: LineFactory,
    F: FileStorage,
{
    /// Create a service with untranslated labels, the system clock and
    /// silent shortfalls
    pub fn new(store: S, line_factory: L, file_storage: F) -> Self {
        Self {
            store,
            line_factory,
            file_storage,
            translator: Box::new(Catalog::new()),
            clock: Box::new(SystemClock),
            shortfall_policy: ShortfallPolicy::default(),
        }
    }

    pub fn with_translator(mut self, translator: impl Translator + 'static) -> Self {
        self.translator = Box::new(translator);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_shortfall_policy(mut self, policy: ShortfallPolicy) -> Self {
        self.shortfall_policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load a management record by id
    pub async fn find(&self, id: i64) -> Result<VoucherMgt, ServiceError> {
        let mut tx = self.store.begin().await?;
        tx.find_mgt(id).await?.ok_or(ServiceError::NotFound(id))
    }

    /// Create one line per employee of the record's company, mark the record
    /// calculated, snapshot the company stock and recompute the totals.
    pub async fn calculate(&self, mgt: &mut VoucherMgt) -> Result<(), ServiceError> {
        let company_id = company_of(mgt)?.id;
        tracing::info!(company_id, mgt_id = ?mgt.id, "Calculating lunch vouchers");

        let mut tx = self.store.begin().await?;
        let config = hr_config(&mut tx, company_id).await?;
        let users = tx.find_by_active_company(company_id).await?;

        let mut record = mgt.clone();
        for employee in users.iter().filter_map(|u| u.employee.as_ref()) {
            let line = self.line_factory.create(&mut tx, employee, &record).await?;
            record.lines.push(line);
        }

        record.status = VoucherMgtStatus::Calculated;
        record.stock_quantity_status = config.available_stock_lunch_voucher;
        self.calculate_total(&mut record);

        let saved = tx.save_mgt(&record).await?;
        tx.commit().await?;
        *mgt = saved;

        tracing::info!(
            mgt_id = ?mgt.id,
            lines = mgt.lines.len(),
            total = mgt.total_lunch_vouchers,
            requested = mgt.requested_lunch_vouchers,
            "Lunch vouchers calculated"
        );
        Ok(())
    }

    /// Recompute the record totals; the caller persists the record.
    pub fn calculate_total(&self, mgt: &mut VoucherMgt) {
        mgt.compute_totals();
    }

    /// Stock left above the company minimum after using `number_to_use`
    /// vouchers. Negative when the stock is insufficient.
    pub async fn check_stock(
        &self,
        company: &Company,
        number_to_use: i32,
    ) -> Result<i32, ServiceError> {
        let mut tx = self.store.begin().await?;
        let config = hr_config(&mut tx, company.id).await?;
        Ok(config.stock_margin(number_to_use))
    }

    /// Draw each line's advance usage from the employee's advance balances,
    /// oldest first, then replenish the company stock with the stock-line
    /// quantity and mark the record validated.
    pub async fn validate(&self, mgt: &mut VoucherMgt) -> Result<ValidationReport, ServiceError> {
        let company_id = company_of(mgt)?.id;
        if mgt.status != VoucherMgtStatus::Calculated {
            tracing::warn!(mgt_id = ?mgt.id, status = ?mgt.status, "Validating a record that is not calculated");
        }
        tracing::info!(company_id, mgt_id = ?mgt.id, "Validating lunch vouchers");

        let mut tx = self.store.begin().await?;
        let mut config = hr_config(&mut tx, company_id).await?;
        let mut report = ValidationReport::default();

        for line in mgt.lines.iter().filter(|l| l.in_advance_nbr > 0) {
            let employee_id = line.employee.id;
            let mut advances = tx.find_eligible_by_employee(employee_id).await?;
            let outcome = consume_fifo(&mut advances, line.in_advance_nbr);

            for advance in &advances[..outcome.visited] {
                tx.save_advance(advance).await?;
                tracing::debug!(
                    employee_id,
                    advance_id = ?advance.id,
                    used = advance.nbr_lunch_vouchers_used,
                    granted = advance.nbr_lunch_vouchers,
                    "Advance balance drawn"
                );
            }

            let consumption = AdvanceConsumption {
                employee_id,
                requested: line.in_advance_nbr,
                consumed: outcome.consumed,
                shortfall: outcome.remaining.max(0),
            };

            if consumption.shortfall > 0 {
                match self.shortfall_policy {
                    ShortfallPolicy::Ignore => {}
                    ShortfallPolicy::Warn => tracing::warn!(
                        employee_id,
                        requested = consumption.requested,
                        shortfall = consumption.shortfall,
                        "Advance balances do not cover the line"
                    ),
                    ShortfallPolicy::Reject => {
                        return Err(ServiceError::AdvanceShortfall {
                            employee_id,
                            shortfall: consumption.shortfall,
                        });
                    }
                }
            }
            report.consumptions.push(consumption);
        }

        config.available_stock_lunch_voucher += mgt.stock_line_quantity;
        report.replenished = mgt.stock_line_quantity;

        let mut record = mgt.clone();
        record.status = VoucherMgtStatus::Validated;

        tx.save_hr_config(&config).await?;
        let saved = tx.save_mgt(&record).await?;
        tx.commit().await?;
        *mgt = saved;

        tracing::info!(
            mgt_id = ?mgt.id,
            available_stock = config.available_stock_lunch_voucher,
            shortfall = report.total_shortfall(),
            "Lunch vouchers validated"
        );
        Ok(report)
    }

    /// Write the lines as CSV, register the file and attach it to the record
    /// together with today's date.
    pub async fn export(&self, mgt: &mut VoucherMgt) -> Result<StoredFile, ServiceError> {
        company_of(mgt)?;
        let today = self.clock.today();
        let file_name = export_file_name(self.translator.as_ref(), today);
        let contents = render_csv(mgt, self.translator.as_ref());

        // Dropping `staged` removes the temporary file on every path below.
        let staged = stage_csv(&contents).map_err(|e| {
            tracing::error!("Failed to write lunch voucher export: {}", e);
            ServiceError::Export(e.to_string())
        })?;
        let stored = self
            .file_storage
            .upload(staged.path(), &file_name)
            .await
            .map_err(|e| {
                tracing::error!("Failed to store lunch voucher export: {:#}", e);
                ServiceError::Export(format!("{:#}", e))
            })?;
        drop(staged);

        let mut record = mgt.clone();
        record.csv_file = Some(stored.clone());
        record.export_date = Some(today);

        let saved = match self.persist(&record).await {
            Ok(saved) => saved,
            Err(err) => {
                // The file is not registered anywhere, so drop it from storage
                if let Err(e) = self.file_storage.remove(&stored).await {
                    tracing::warn!("Failed to remove unregistered export: {:#}", e);
                }
                return Err(err);
            }
        };
        *mgt = saved;

        tracing::info!(mgt_id = ?mgt.id, file = %stored.file_name, "Lunch vouchers exported");
        Ok(stored)
    }

    async fn persist(&self, record: &VoucherMgt) -> Result<VoucherMgt, ServiceError> {
        let mut tx = self.store.begin().await?;
        let saved = tx.save_mgt(record).await?;
        tx.commit().await?;
        Ok(saved)
    }
}
