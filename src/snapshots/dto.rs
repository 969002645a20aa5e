use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{dto::PublicUser, repo_types::User};
use crate::error::{AppError, AppResult};
use crate::snapshots::repo::MonthlyFields;
use crate::snapshots::repo_types::{MonthKey, Snapshot, SnapshotFields};

/// Body of `/save-financial-data` and `/replace-financial-data`.
/// The owner is named by `userId` or `email`; `userId` wins if both are sent.
/// `monthlyAssets` must be present: on replace an empty object clears the
/// owner's data, a missing key is rejected.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveFinancialDataRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_update: Option<OffsetDateTime>,
    pub monthly_assets: MonthlyFields,
}

impl SaveFinancialDataRequest {
    pub fn owner_reference(&self) -> AppResult<String> {
        match (&self.user_id, &self.email) {
            (Some(id), _) => Ok(id.to_string()),
            (None, Some(email)) if !email.trim().is_empty() => Ok(email.clone()),
            _ => Err(AppError::Validation("email or userId is required".into())),
        }
    }
}

/// Body of `PATCH /update-financial-data/:owner`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFinancialDataRequest {
    pub monthly_assets: MonthlyFields,
}

/// Answer to a write. Names the months written but never echoes amounts,
/// since writes are not password-checked.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteReceipt {
    pub user_id: Uuid,
    pub months: Vec<MonthKey>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
}

impl WriteReceipt {
    pub fn new(owner: &User, months: impl IntoIterator<Item = MonthKey>, at: OffsetDateTime) -> Self {
        Self {
            user_id: owner.id,
            months: months.into_iter().collect(),
            last_update: at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyAssets {
    #[serde(flatten)]
    pub fields: SnapshotFields,
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
}

/// Financial payload returned by sign-in and every financial-data route.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialDataResponse {
    pub user: PublicUser,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_update: Option<OffsetDateTime>,
    pub monthly_assets: BTreeMap<MonthKey, MonthlyAssets>,
}

impl FinancialDataResponse {
    pub fn new(user: &User, snapshots: Vec<Snapshot>) -> Self {
        let last_update = snapshots.iter().map(|s| s.last_update).max();
        let monthly_assets = snapshots
            .into_iter()
            .map(|s| {
                (
                    s.month_key,
                    MonthlyAssets {
                        fields: s.fields,
                        last_update: s.last_update,
                    },
                )
            })
            .collect();
        Self {
            user: PublicUser::from(user),
            last_update,
            monthly_assets,
        }
    }
}
