use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{
    postgres::PgArguments,
    query::QueryAs,
    PgPool, Postgres,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::snapshots::repo_types::{MonthKey, Snapshot, SnapshotFields, SnapshotRow};

pub type MonthlyFields = BTreeMap<MonthKey, SnapshotFields>;

/// Per-user monthly snapshots, at most one per `(owner, month)`.
///
/// Every method is atomic: either all months of the call are written or none.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Creates missing months and merges the supplied fields into existing ones.
    async fn upsert_many(
        &self,
        owner_id: Uuid,
        months: &MonthlyFields,
        at: OffsetDateTime,
    ) -> AppResult<Vec<Snapshot>>;

    /// Like `upsert_many`, but every month must already exist; otherwise
    /// `NotFound` and nothing is written.
    async fn update_existing(
        &self,
        owner_id: Uuid,
        months: &MonthlyFields,
        at: OffsetDateTime,
    ) -> AppResult<Vec<Snapshot>>;

    /// Drops the owner's whole collection and stores exactly `months`.
    async fn replace_all(
        &self,
        owner_id: Uuid,
        months: &MonthlyFields,
        at: OffsetDateTime,
    ) -> AppResult<()>;

    /// All months of the owner, oldest first.
    async fn list(&self, owner_id: Uuid) -> AppResult<Vec<Snapshot>>;

    /// Single-month form of `upsert_many`.
    async fn upsert_snapshot(
        &self,
        owner_id: Uuid,
        month_key: MonthKey,
        fields: SnapshotFields,
        at: OffsetDateTime,
    ) -> AppResult<Snapshot> {
        let months = MonthlyFields::from([(month_key.clone(), fields)]);
        self.upsert_many(owner_id, &months, at)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("snapshot {} was not written", month_key)))
    }
}

pub(crate) fn missing_month(month_key: &MonthKey) -> AppError {
    AppError::NotFound(format!("no financial data recorded for {}", month_key))
}

const UPSERT_SQL: &str = r#"
    INSERT INTO snapshots
        (owner_id, month_key, cash_on_hand, savings, stocks, real_estate, debt, last_update)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (owner_id, month_key) DO UPDATE SET
        cash_on_hand = COALESCE(EXCLUDED.cash_on_hand, snapshots.cash_on_hand),
        savings      = COALESCE(EXCLUDED.savings, snapshots.savings),
        stocks       = COALESCE(EXCLUDED.stocks, snapshots.stocks),
        real_estate  = COALESCE(EXCLUDED.real_estate, snapshots.real_estate),
        debt         = COALESCE(EXCLUDED.debt, snapshots.debt),
        last_update  = EXCLUDED.last_update
    RETURNING owner_id, month_key, cash_on_hand, savings, stocks, real_estate, debt, last_update
"#;

fn upsert_query<'q>(
    owner_id: Uuid,
    month_key: &'q MonthKey,
    fields: &SnapshotFields,
    at: OffsetDateTime,
) -> QueryAs<'q, Postgres, SnapshotRow, PgArguments> {
    sqlx::query_as::<_, SnapshotRow>(UPSERT_SQL)
        .bind(owner_id)
        .bind(month_key.as_str())
        .bind(fields.cash_on_hand)
        .bind(fields.savings)
        .bind(fields.stocks)
        .bind(fields.real_estate)
        .bind(fields.debt)
        .bind(at)
}

#[derive(Clone)]
pub struct PgSnapshotStore {
    db: PgPool,
}

impl PgSnapshotStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn upsert_snapshot(
        &self,
        owner_id: Uuid,
        month_key: MonthKey,
        fields: SnapshotFields,
        at: OffsetDateTime,
    ) -> AppResult<Snapshot> {
        let row = upsert_query(owner_id, &month_key, &fields, at)
            .fetch_one(&self.db)
            .await?;
        Ok(Snapshot::from(row))
    }

    async fn upsert_many(
        &self,
        owner_id: Uuid,
        months: &MonthlyFields,
        at: OffsetDateTime,
    ) -> AppResult<Vec<Snapshot>> {
        // A single statement is atomic on its own.
        if let (1, Some((month_key, fields))) = (months.len(), months.iter().next()) {
            let snapshot = self
                .upsert_snapshot(owner_id, month_key.clone(), fields.clone(), at)
                .await?;
            return Ok(vec![snapshot]);
        }

        let mut tx = self.db.begin().await?;
        let mut written = Vec::with_capacity(months.len());
        for (month_key, fields) in months {
            let row = upsert_query(owner_id, month_key, fields, at)
                .fetch_one(&mut *tx)
                .await?;
            written.push(Snapshot::from(row));
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn update_existing(
        &self,
        owner_id: Uuid,
        months: &MonthlyFields,
        at: OffsetDateTime,
    ) -> AppResult<Vec<Snapshot>> {
        let mut tx = self.db.begin().await?;
        let mut written = Vec::with_capacity(months.len());
        for (month_key, fields) in months {
            let row = sqlx::query_as::<_, SnapshotRow>(
                r#"
                UPDATE snapshots SET
                    cash_on_hand = COALESCE($3, cash_on_hand),
                    savings      = COALESCE($4, savings),
                    stocks       = COALESCE($5, stocks),
                    real_estate  = COALESCE($6, real_estate),
                    debt         = COALESCE($7, debt),
                    last_update  = $8
                WHERE owner_id = $1 AND month_key = $2
                RETURNING owner_id, month_key, cash_on_hand, savings, stocks, real_estate, debt, last_update
                "#,
            )
            .bind(owner_id)
            .bind(month_key.as_str())
            .bind(fields.cash_on_hand)
            .bind(fields.savings)
            .bind(fields.stocks)
            .bind(fields.real_estate)
            .bind(fields.debt)
            .bind(at)
            .fetch_optional(&mut *tx)
            .await?;

            // Dropping `tx` rolls back the months already updated.
            let row = row.ok_or_else(|| missing_month(month_key))?;
            written.push(Snapshot::from(row));
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn replace_all(
        &self,
        owner_id: Uuid,
        months: &MonthlyFields,
        at: OffsetDateTime,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM snapshots WHERE owner_id = $1")
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        for (month_key, fields) in months {
            sqlx::query(
                r#"
                INSERT INTO snapshots
                    (owner_id, month_key, cash_on_hand, savings, stocks, real_estate, debt, last_update)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(owner_id)
            .bind(month_key.as_str())
            .bind(fields.cash_on_hand)
            .bind(fields.savings)
            .bind(fields.stocks)
            .bind(fields.real_estate)
            .bind(fields.debt)
            .bind(at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, owner_id: Uuid) -> AppResult<Vec<Snapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT owner_id, month_key, cash_on_hand, savings, stocks, real_estate, debt, last_update
              FROM snapshots
             WHERE owner_id = $1
             ORDER BY month_key ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Snapshot::from).collect())
    }
}
