use time::OffsetDateTime;
use tracing::info;

use crate::auth::services::resolve_owner;
use crate::error::{AppError, AppResult};
use crate::snapshots::dto::{SaveFinancialDataRequest, UpdateFinancialDataRequest, WriteReceipt};
use crate::snapshots::repo::MonthlyFields;
use crate::state::AppState;

fn require_months(months: &MonthlyFields) -> AppResult<()> {
    if months.is_empty() {
        return Err(AppError::Validation("monthlyAssets must not be empty".into()));
    }
    Ok(())
}

/// Keyed-merge of every submitted month into the owner's snapshots.
pub async fn save_financial_data(
    st: &AppState,
    req: SaveFinancialDataRequest,
) -> AppResult<WriteReceipt> {
    let owner = resolve_owner(st.accounts.as_ref(), &req.owner_reference()?).await?;
    require_months(&req.monthly_assets)?;

    let at = req.last_update.unwrap_or_else(OffsetDateTime::now_utc);
    let written = st
        .snapshots
        .upsert_many(owner.id, &req.monthly_assets, at)
        .await?;
    info!(user_id = %owner.id, months = written.len(), "financial data saved");

    Ok(WriteReceipt::new(&owner, written.into_iter().map(|s| s.month_key), at))
}

/// Merges into months that already exist.
pub async fn update_financial_data(
    st: &AppState,
    reference: &str,
    req: UpdateFinancialDataRequest,
) -> AppResult<WriteReceipt> {
    let owner = resolve_owner(st.accounts.as_ref(), reference).await?;
    require_months(&req.monthly_assets)?;

    let at = OffsetDateTime::now_utc();
    let written = st
        .snapshots
        .update_existing(owner.id, &req.monthly_assets, at)
        .await?;
    info!(user_id = %owner.id, months = written.len(), "financial data updated");

    Ok(WriteReceipt::new(&owner, written.into_iter().map(|s| s.month_key), at))
}

/// Bulk overwrite used for import and restore. An empty mapping clears the owner's data.
pub async fn replace_financial_data(
    st: &AppState,
    req: SaveFinancialDataRequest,
) -> AppResult<WriteReceipt> {
    let owner = resolve_owner(st.accounts.as_ref(), &req.owner_reference()?).await?;

    let at = req.last_update.unwrap_or_else(OffsetDateTime::now_utc);
    st.snapshots
        .replace_all(owner.id, &req.monthly_assets, at)
        .await?;
    info!(user_id = %owner.id, months = req.monthly_assets.len(), "financial data replaced");

    Ok(WriteReceipt::new(&owner, req.monthly_assets.into_keys(), at))
}
