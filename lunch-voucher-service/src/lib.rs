//! Lunch Voucher Service
//!
//! This crate computes monthly lunch voucher entitlements for the employees of
//! a company, draws advance vouchers down oldest-first on validation and
//! exports the results to CSV.
//! Persistence, file storage and label translation are injected through the
//! traits in [`repository`], [`export`] and [`i18n`].

pub mod advance;
pub mod clock;
pub mod config;
pub mod export;
pub mod i18n;
pub mod line;
pub mod models;
pub mod mysql;
pub mod repository;
pub mod service;

pub use advance::{AdvanceConsumption, ShortfallPolicy, ValidationReport};
pub use config::LunchVoucherConfig;
pub use models::{AdvanceBalance, Company, Employee, HrConfig, VoucherLine, VoucherMgt};
pub use mysql::MySqlStore;
pub use repository::{InMemoryStore, Store, UnitOfWork};
pub use service::{ServiceError, VoucherMgtService};

use export::LocalFileStorage;
use line::{StandardLineFactory, WeekdayCalendar};

/// Build a service on MySQL from configuration. Fails when the database is
/// unreachable or the translation catalog cannot be read.
pub async fn connect(config: &LunchVoucherConfig) -> anyhow::Result<VoucherMgtService<MySqlStore>> {
    let store = MySqlStore::connect(&config.db).await?;
    store.health_check().await?;
    let catalog = config.load_catalog()?;

    tracing::info!(
        export_dir = %config.export_dir.display(),
        shortfall_policy = ?config.shortfall_policy,
        "Lunch voucher service ready"
    );

    Ok(VoucherMgtService::new(
        store,
        StandardLineFactory::new(WeekdayCalendar),
        LocalFileStorage::new(config.export_dir.clone()),
    )
    .with_translator(catalog)
    .with_shortfall_policy(config.shortfall_policy))
}
