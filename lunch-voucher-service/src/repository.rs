//! Lunch voucher repository
//!
//! Persistence capabilities used by the service, grouped into a unit of work
//! that is committed as a whole or dropped (rolled back).

use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{AdvanceBalance, HrConfig, User, VoucherMgt};

/// Repository errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Directory lookups for users
#[allow(async_fn_in_trait)]
pub trait UserRepository {
    /// Users whose active company is `company_id`, in a stable order
    async fn find_by_active_company(&mut self, company_id: i64) -> Result<Vec<User>>;
}

#[allow(async_fn_in_trait)]
pub trait AdvanceRepository {
    /// Balances of the employee that still have unused vouchers, oldest
    /// distribution date first
    async fn find_eligible_by_employee(&mut self, employee_id: i64) -> Result<Vec<AdvanceBalance>>;

    async fn save_advance(&mut self, advance: &AdvanceBalance) -> Result<AdvanceBalance>;
}

#[allow(async_fn_in_trait)]
pub trait HrConfigRepository {
    async fn find_by_company(&mut self, company_id: i64) -> Result<Option<HrConfig>>;

    async fn save_hr_config(&mut self, config: &HrConfig) -> Result<()>;
}

#[allow(async_fn_in_trait)]
pub trait VoucherMgtRepository {
    async fn find_mgt(&mut self, id: i64) -> Result<Option<VoucherMgt>>;

    /// Insert or update the record and its lines, returning it with ids set
    async fn save_mgt(&mut self, mgt: &VoucherMgt) -> Result<VoucherMgt>;
}

/// All repositories of one transaction
#[allow(async_fn_in_trait)]
pub trait UnitOfWork:
    Sized + UserRepository + AdvanceRepository + HrConfigRepository + VoucherMgtRepository
{
    async fn commit(self) -> Result<()>;
}

/// Source of units of work
#[allow(async_fn_in_trait)]
pub trait Store: Send + Sync {
    type Tx: UnitOfWork;

    async fn begin(&self) -> Result<Self::Tx>;
}

#[derive(Debug, Clone, Default)]
struct InMemoryState {
    users: Vec<User>,
    hr_configs: Vec<HrConfig>,
    advances: Vec<AdvanceBalance>,
    mgts: Vec<VoucherMgt>,
    last_id: i64,
}

impl InMemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// In-memory store for testing and development.
///
/// A unit of work holds the store lock until it is committed or dropped, so
/// transactions are fully serialized.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.push(user);
    }

    pub async fn insert_hr_config(&self, config: HrConfig) {
        let mut state = self.state.lock().await;
        state.hr_configs.retain(|c| c.company_id != config.company_id);
        state.hr_configs.push(config);
    }

    pub async fn insert_advance(&self, mut advance: AdvanceBalance) -> AdvanceBalance {
        let mut state = self.state.lock().await;
        advance.id = Some(state.next_id());
        state.advances.push(advance.clone());
        advance
    }

    pub async fn hr_config(&self, company_id: i64) -> Option<HrConfig> {
        let state = self.state.lock().await;
        state
            .hr_configs
            .iter()
            .find(|c| c.company_id == company_id)
            .cloned()
    }

    pub async fn advances(&self, employee_id: i64) -> Vec<AdvanceBalance> {
        let state = self.state.lock().await;
        state
            .advances
            .iter()
            .filter(|a| a.employee_id == employee_id)
            .cloned()
            .collect()
    }

    pub async fn mgt(&self, id: i64) -> Option<VoucherMgt> {
        let state = self.state.lock().await;
        state.mgts.iter().find(|m| m.id == Some(id)).cloned()
    }
}

impl Store for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(InMemoryTx { guard, working })
    }
}

/// Unit of work over an [`InMemoryStore`]; changes go to a working copy that
/// replaces the shared state on commit.
pub struct InMemoryTx {
    guard: OwnedMutexGuard<InMemoryState>,
    working: InMemoryState,
}

impl UserRepository for InMemoryTx {
    async fn find_by_active_company(&mut self, company_id: i64) -> Result<Vec<User>> {
        Ok(self
            .working
            .users
            .iter()
            .filter(|u| u.active_company_id == Some(company_id))
            .cloned()
            .collect())
    }
}

impl AdvanceRepository for InMemoryTx {
    async fn find_eligible_by_employee(&mut self, employee_id: i64) -> Result<Vec<AdvanceBalance>> {
        let mut eligible: Vec<AdvanceBalance> = self
            .working
            .advances
            .iter()
            .filter(|a| a.employee_id == employee_id && a.is_eligible())
            .cloned()
            .collect();
        eligible.sort_by_key(|a| (a.distribution_date, a.id));
        Ok(eligible)
    }

    async fn save_advance(&mut self, advance: &AdvanceBalance) -> Result<AdvanceBalance> {
        let mut saved = advance.clone();
        match saved.id {
            Some(id) => {
                let existing = self
                    .working
                    .advances
                    .iter_mut()
                    .find(|a| a.id == Some(id))
                    .ok_or_else(|| RepositoryError::NotFound(format!("Advance with id {}", id)))?;
                *existing = saved.clone();
            }
            None => {
                saved.id = Some(self.working.next_id());
                self.working.advances.push(saved.clone());
            }
        }
        Ok(saved)
    }
}

impl HrConfigRepository for InMemoryTx {
    async fn find_by_company(&mut self, company_id: i64) -> Result<Option<HrConfig>> {
        Ok(self
            .working
            .hr_configs
            .iter()
            .find(|c| c.company_id == company_id)
            .cloned())
    }

    async fn save_hr_config(&mut self, config: &HrConfig) -> Result<()> {
        self.working
            .hr_configs
            .retain(|c| c.company_id != config.company_id);
        self.working.hr_configs.push(config.clone());
        Ok(())
    }
}

impl VoucherMgtRepository for InMemoryTx {
    async fn find_mgt(&mut self, id: i64) -> Result<Option<VoucherMgt>> {
        Ok(self.working.mgts.iter().find(|m| m.id == Some(id)).cloned())
    }

    async fn save_mgt(&mut self, mgt: &VoucherMgt) -> Result<VoucherMgt> {
        let mut saved = mgt.clone();
        for line in saved.lines.iter_mut().filter(|l| l.id.is_none()) {
            line.id = Some(self.working.next_id());
        }

        match saved.id {
            Some(id) => {
                let existing = self
                    .working
                    .mgts
                    .iter_mut()
                    .find(|m| m.id == Some(id))
                    .ok_or_else(|| {
                        RepositoryError::NotFound(format!("Lunch voucher mgt with id {}", id))
                    })?;
                *existing = saved.clone();
            }
            None => {
                saved.id = Some(self.working.next_id());
                self.working.mgts.push(saved.clone());
            }
        }
        Ok(saved)
    }
}

impl UnitOfWork for InMemoryTx {
    async fn commit(self) -> Result<()> {
        let InMemoryTx { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}
