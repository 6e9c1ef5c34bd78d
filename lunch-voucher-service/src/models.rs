//! Lunch voucher models
//!
//! Domain models for lunch voucher management: the monthly management record,
//! its per-employee lines, company stock configuration and advance balances.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Company owning a lunch voucher management record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub code: Option<String>,
    pub name: String,
}

/// How an employee receives lunch vouchers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LunchVoucherFormat {
    Paper,
    Card,
    Both,
}

impl LunchVoucherFormat {
    /// Stored selection code
    pub fn code(self) -> i32 {
        match self {
            Self::Paper => 1,
            Self::Card => 2,
            Self::Both => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Paper),
            2 => Some(Self::Card),
            3 => Some(Self::Both),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub name: Option<String>,
    pub lunch_voucher_format: Option<LunchVoucherFormat>,
}

/// Application user; only users linked to an employee get a voucher line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub active_company_id: Option<i64>,
    pub employee: Option<Employee>,
}

/// Inclusive date range covered by a management record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

impl Period {
    pub fn new(from_date: NaiveDate, to_date: NaiveDate) -> Self {
        Self { from_date, to_date }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoucherMgtStatus {
    Draft,
    Calculated,
    Validated,
}

impl VoucherMgtStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Draft => 1,
            Self::Calculated => 2,
            Self::Validated => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Draft),
            2 => Some(Self::Calculated),
            3 => Some(Self::Validated),
            _ => None,
        }
    }
}

/// Durable file handle returned by the file storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub file_name: String,
    pub path: String,
    pub size: u64,
}

/// One employee's computed entitlement within a management record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherLine {
    pub id: Option<i64>,
    pub employee: Employee,
    pub days_worked_nbr: i32,
    pub canteen_entries: i32,
    pub days_overseas: i32,
    pub invitation: i32,
    /// Vouchers to be satisfied from advance stock rather than newly issued
    pub in_advance_nbr: i32,
    pub voucher_number: i32,
}

impl VoucherLine {
    /// Create an empty line for an employee
    pub fn new(employee: Employee) -> Self {
        Self {
            id: None,
            employee,
            days_worked_nbr: 0,
            canteen_entries: 0,
            days_overseas: 0,
            invitation: 0,
            in_advance_nbr: 0,
            voucher_number: 0,
        }
    }

    /// Vouchers earned by the attendance figures: worked days not already
    /// covered by a meal (canteen, overseas, invitation). Never negative.
    pub fn earned(&self) -> i32 {
        self.days_worked_nbr
            .saturating_sub(self.canteen_entries)
            .saturating_sub(self.days_overseas)
            .saturating_sub(self.invitation)
            .max(0)
    }

    /// Re-derive the voucher number: earned vouchers not satisfied from
    /// advance stock. Never negative.
    pub fn compute(&mut self) {
        self.voucher_number = self.earned().saturating_sub(self.in_advance_nbr).max(0);
    }
}

/// Monthly lunch voucher management record for one company
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherMgt {
    pub id: Option<i64>,
    pub company: Option<Company>,
    pub period: Period,
    pub status: VoucherMgtStatus,
    /// Vouchers already held in physical inventory, entered manually
    pub stock_line_quantity: i32,
    /// Audit copy of the company stock at calculation time
    pub stock_quantity_status: i32,
    pub total_lunch_vouchers: i32,
    pub requested_lunch_vouchers: i32,
    pub csv_file: Option<StoredFile>,
    pub export_date: Option<NaiveDate>,
    pub lines: Vec<VoucherLine>,
}

impl VoucherMgt {
    /// Create a draft record
    pub fn new(company: Company, period: Period) -> Self {
        Self {
            id: None,
            company: Some(company),
            period,
            status: VoucherMgtStatus::Draft,
            stock_line_quantity: 0,
            stock_quantity_status: 0,
            total_lunch_vouchers: 0,
            requested_lunch_vouchers: 0,
            csv_file: None,
            export_date: None,
            lines: Vec::new(),
        }
    }

    /// Recompute `total_lunch_vouchers` and `requested_lunch_vouchers` from
    /// the current lines and the stock-line quantity.
    pub fn compute_totals(&mut self) {
        let (vouchers, in_advance) = self
            .lines
            .iter()
            .fold((0i32, 0i32), |(vouchers, in_advance), line| {
                (
                    vouchers.saturating_add(line.voucher_number),
                    in_advance.saturating_add(line.in_advance_nbr),
                )
            });

        // Saturate rather than overflow on extreme manual stock quantities
        self.total_lunch_vouchers = vouchers
            .saturating_add(in_advance)
            .saturating_add(self.stock_line_quantity);
        self.requested_lunch_vouchers = vouchers.saturating_add(self.stock_line_quantity);
    }
}

/// Per-company lunch voucher stock settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HrConfig {
    pub company_id: i64,
    pub min_stock_lunch_voucher: i32,
    pub available_stock_lunch_voucher: i32,
}

impl HrConfig {
    /// Stock left above the floor after using `number_to_use` vouchers.
    /// Negative means the stock would drop below the minimum.
    pub fn stock_margin(&self, number_to_use: i32) -> i32 {
        self.available_stock_lunch_voucher
            .saturating_sub(number_to_use)
            .saturating_sub(self.min_stock_lunch_voucher)
    }
}

/// Pool of pre-granted vouchers an employee draws down
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceBalance {
    pub id: Option<i64>,
    pub employee_id: i64,
    pub distribution_date: NaiveDate,
    pub nbr_lunch_vouchers: i32,
    pub nbr_lunch_vouchers_used: i32,
}

impl AdvanceBalance {
    pub fn new(employee_id: i64, distribution_date: NaiveDate, nbr_lunch_vouchers: i32) -> Self {
        Self {
            id: None,
            employee_id,
            distribution_date,
            nbr_lunch_vouchers,
            nbr_lunch_vouchers_used: 0,
        }
    }

    pub fn remaining(&self) -> i32 {
        self.nbr_lunch_vouchers - self.nbr_lunch_vouchers_used
    }

    pub fn is_eligible(&self) -> bool {
        self.nbr_lunch_vouchers_used < self.nbr_lunch_vouchers
    }

    /// Draw up to `requested` vouchers from this balance and return how many
    /// are still owed.
    pub fn use_advance(&mut self, requested: i32) -> i32 {
        let consumed = requested.min(self.remaining()).max(0);
        self.nbr_lunch_vouchers_used += consumed;
        requested - consumed
    }
}
