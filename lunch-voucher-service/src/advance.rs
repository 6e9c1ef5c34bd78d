//! Advance voucher consumption
//!
//! Oldest-first draw-down of an employee's advance balances, and the report
//! types describing what validation consumed.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::AdvanceBalance;

/// What to do when an employee's advance balances cannot cover a line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortfallPolicy {
    /// Leave the remainder unconsumed without notice
    #[default]
    Ignore,
    /// Leave the remainder unconsumed and log a warning
    Warn,
    /// Fail the whole validation
    Reject,
}

impl FromStr for ShortfallPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "warn" => Ok(Self::Warn),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown shortfall policy: {other}")),
        }
    }
}

/// Result of drawing a requested quantity from a sequence of balances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoOutcome {
    pub consumed: i32,
    pub remaining: i32,
    /// Number of leading balances that were drawn from (and must be saved)
    pub visited: usize,
}

/// Draw `requested` vouchers from `balances`, which must already be sorted by
/// distribution date, oldest first. Stops as soon as nothing is owed; the
/// balances after `visited` are left untouched.
pub fn consume_fifo(balances: &mut [AdvanceBalance], requested: i32) -> FifoOutcome {
    let mut outcome = FifoOutcome {
        consumed: 0,
        remaining: requested,
        visited: 0,
    };
    if requested <= 0 {
        return outcome;
    }

    for balance in balances.iter_mut() {
        outcome.remaining = balance.use_advance(outcome.remaining);
        outcome.visited += 1;
        if outcome.remaining <= 0 {
            break;
        }
    }

    outcome.consumed = requested - outcome.remaining;
    outcome
}

/// Advance usage applied for one voucher line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceConsumption {
    pub employee_id: i64,
    pub requested: i32,
    pub consumed: i32,
    pub shortfall: i32,
}

/// Outcome of validating a management record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub consumptions: Vec<AdvanceConsumption>,
    /// Vouchers added back to the company stock
    pub replenished: i32,
}

impl ValidationReport {
    pub fn total_shortfall(&self) -> i32 {
        self.consumptions.iter().map(|c| c.shortfall).sum()
    }

    pub fn has_shortfall(&self) -> bool {
        self.consumptions.iter().any(|c| c.shortfall > 0)
    }
}
