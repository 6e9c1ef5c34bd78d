//! Service configuration loaded from the environment

use std::path::PathBuf;

use anyhow::Result;
use db::DbConfig;
use serde::{Deserialize, Serialize};

use crate::advance::ShortfallPolicy;
use crate::i18n::Catalog;

/// Lunch voucher service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LunchVoucherConfig {
    /// Database connection settings
    pub db: DbConfig,

    /// Directory receiving exported CSV files
    pub export_dir: PathBuf,

    /// Optional JSON translation catalog for export labels
    pub catalog_path: Option<PathBuf>,

    /// Handling of advance balances that cannot cover a line
    pub shortfall_policy: ShortfallPolicy,
}

impl Default for LunchVoucherConfig {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            export_dir: PathBuf::from("./exports"),
            catalog_path: None,
            shortfall_policy: ShortfallPolicy::Ignore,
        }
    }
}

impl LunchVoucherConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self {
            db: DbConfig::from_env(),
            ..Self::default()
        };

        if let Ok(dir) = std::env::var("LUNCH_VOUCHER_EXPORT_DIR") {
            config.export_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("LUNCH_VOUCHER_CATALOG") {
            if !path.is_empty() {
                config.catalog_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(policy) = std::env::var("LUNCH_VOUCHER_SHORTFALL_POLICY") {
            match policy.parse() {
                Ok(p) => config.shortfall_policy = p,
                Err(e) => tracing::warn!("Ignoring LUNCH_VOUCHER_SHORTFALL_POLICY: {}", e),
            }
        }

        config
    }

    /// Load the translation catalog, or an empty one when none is configured
    pub fn load_catalog(&self) -> Result<Catalog> {
        match &self.catalog_path {
            Some(path) => Catalog::from_file(path),
            None => Ok(Catalog::new()),
        }
    }
}
