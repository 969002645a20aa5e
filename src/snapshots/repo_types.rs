use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;

/// Calendar month identifier in canonical `YYYY-MM` form.
///
/// The canonical form sorts chronologically, so ordering on the key is
/// ordering in time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey(String);

impl MonthKey {
    /// Surrounding whitespace is rejected, so distinct JSON keys never
    /// collapse into the same month.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let invalid = || AppError::Validation(format!("invalid month key '{}', expected YYYY-MM", raw));

        let bytes = raw.as_bytes();
        if bytes.len() != 7 || bytes[4] != b'-' {
            return Err(invalid());
        }
        let (year, month) = (&raw[..4], &raw[5..]);
        if !year.bytes().all(|b| b.is_ascii_digit()) || !month.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let month: u8 = month.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MonthKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MonthKey {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MonthKey> for String {
    fn from(key: MonthKey) -> Self {
        key.0
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The monetary part of a snapshot. `None` means "not supplied" in a request
/// and "never recorded" in storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFields {
    #[serde(default)]
    pub cash_on_hand: Option<Decimal>,
    #[serde(default, alias = "saving")]
    pub savings: Option<Decimal>,
    #[serde(default)]
    pub stocks: Option<Decimal>,
    #[serde(default)]
    pub real_estate: Option<Decimal>,
    #[serde(default)]
    pub debt: Option<Decimal>,
}

impl SnapshotFields {
    /// Fields present in `self` win, the rest are taken from `base`.
    pub fn merged_over(&self, base: &SnapshotFields) -> SnapshotFields {
        SnapshotFields {
            cash_on_hand: self.cash_on_hand.or(base.cash_on_hand),
            savings: self.savings.or(base.savings),
            stocks: self.stocks.or(base.stocks),
            real_estate: self.real_estate.or(base.real_estate),
            debt: self.debt.or(base.debt),
        }
    }
}

/// One month of a user's financial position.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub owner_id: Uuid,
    pub month_key: MonthKey,
    pub fields: SnapshotFields,
    pub last_update: OffsetDateTime,
}

/// Flat database row of the `snapshots` table.
#[derive(Debug, FromRow)]
pub struct SnapshotRow {
    pub owner_id: Uuid,
    pub month_key: String,
    pub cash_on_hand: Option<Decimal>,
    pub savings: Option<Decimal>,
    pub stocks: Option<Decimal>,
    pub real_estate: Option<Decimal>,
    pub debt: Option<Decimal>,
    pub last_update: OffsetDateTime,
}

impl From<SnapshotRow> for Snapshot {
    fn from(r: SnapshotRow) -> Self {
        Self {
            owner_id: r.owner_id,
            // Only validated keys are ever written.
            month_key: MonthKey(r.month_key),
            fields: SnapshotFields {
                cash_on_hand: r.cash_on_hand,
                savings: r.savings,
                stocks: r.stocks,
                real_estate: r.real_estate,
                debt: r.debt,
            },
            last_update: r.last_update,
        }
    }
}
