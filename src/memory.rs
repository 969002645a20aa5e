//! In-process stores, used when no database is configured and in tests.
//!
//! Each store keeps its data behind a single lock, so every read-modify-write
//! happens under one guard.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::auth::repo::AccountStore;
use crate::auth::repo_types::User;
use crate::error::{AppError, AppResult};
use crate::snapshots::repo::{missing_month, MonthlyFields, SnapshotStore};
use crate::snapshots::repo_types::{MonthKey, Snapshot};

#[derive(Default)]
pub struct MemoryAccountStore {
    users: RwLock<HashMap<Uuid, User>>,
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn create(&self, email: &str, password_hash: &str) -> AppResult<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == email) {
            return Err(AppError::DuplicateAccount);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}

#[derive(Default)]
pub struct MemorySnapshotStore {
    rows: Mutex<BTreeMap<(Uuid, MonthKey), Snapshot>>,
}

fn merge_into(
    rows: &mut BTreeMap<(Uuid, MonthKey), Snapshot>,
    owner_id: Uuid,
    months: &MonthlyFields,
    at: OffsetDateTime,
) -> Vec<Snapshot> {
    months
        .iter()
        .map(|(month_key, fields)| {
            let row = rows
                .entry((owner_id, month_key.clone()))
                .and_modify(|existing| {
                    existing.fields = fields.merged_over(&existing.fields);
                    existing.last_update = at;
                })
                .or_insert_with(|| Snapshot {
                    owner_id,
                    month_key: month_key.clone(),
                    fields: fields.clone(),
                    last_update: at,
                });
            row.clone()
        })
        .collect()
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn upsert_many(
        &self,
        owner_id: Uuid,
        months: &MonthlyFields,
        at: OffsetDateTime,
    ) -> AppResult<Vec<Snapshot>> {
        let mut rows = self.rows.lock().await;
        Ok(merge_into(&mut rows, owner_id, months, at))
    }

    async fn update_existing(
        &self,
        owner_id: Uuid,
        months: &MonthlyFields,
        at: OffsetDateTime,
    ) -> AppResult<Vec<Snapshot>> {
        let mut rows = self.rows.lock().await;
        if let Some(missing) = months
            .keys()
            .find(|month_key| !rows.contains_key(&(owner_id, (*month_key).clone())))
        {
            return Err(missing_month(missing));
        }
        Ok(merge_into(&mut rows, owner_id, months, at))
    }

    async fn replace_all(
        &self,
        owner_id: Uuid,
        months: &MonthlyFields,
        at: OffsetDateTime,
    ) -> AppResult<()> {
        let mut rows = self.rows.lock().await;
        rows.retain(|(owner, _), _| *owner != owner_id);
        for (month_key, fields) in months {
            rows.insert(
                (owner_id, month_key.clone()),
                Snapshot {
                    owner_id,
                    month_key: month_key.clone(),
                    fields: fields.clone(),
                    last_update: at,
                },
            );
        }
        Ok(())
    }

    async fn list(&self, owner_id: Uuid) -> AppResult<Vec<Snapshot>> {
        let rows = self.rows.lock().await;
        // Keys sort by owner first, then month.
        Ok(rows
            .iter()
            .filter(|((owner, _), _)| *owner == owner_id)
            .map(|(_, snapshot)| snapshot.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshots::repo_types::SnapshotFields;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use time::macros::datetime;

    fn month(raw: &str) -> MonthKey {
        MonthKey::parse(raw).unwrap()
    }

    fn cash(amount: rust_decimal::Decimal) -> SnapshotFields {
        SnapshotFields {
            cash_on_hand: Some(amount),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn account_emails_are_unique() {
        let store = MemoryAccountStore::default();
        let user = store.create("a@x.com", "hash").await.unwrap();
        assert!(matches!(
            store.create("a@x.com", "hash2").await,
            Err(AppError::DuplicateAccount)
        ));
        assert_eq!(store.find_by_id(user.id).await.unwrap().unwrap().email, "a@x.com");
        assert!(store.find_by_email("b@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_merges_fields_of_the_same_month() {
        let store = MemorySnapshotStore::default();
        let owner = Uuid::new_v4();
        let t1 = datetime!(2024-03-01 0:00 UTC);
        let t2 = datetime!(2024-03-02 0:00 UTC);

        store
            .upsert_snapshot(owner, month("2024-03"), cash(dec!(100)), t1)
            .await
            .unwrap();
        let merged = store
            .upsert_snapshot(
                owner,
                month("2024-03"),
                SnapshotFields {
                    savings: Some(dec!(50)),
                    ..Default::default()
                },
                t2,
            )
            .await
            .unwrap();

        assert_eq!(merged.fields.cash_on_hand, Some(dec!(100)));
        assert_eq!(merged.fields.savings, Some(dec!(50)));
        assert_eq!(merged.last_update, t2);

        let all = store.list(owner).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], merged);
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = MemorySnapshotStore::default();
        let owner = Uuid::new_v4();
        let at = datetime!(2024-03-01 0:00 UTC);
        let a = store
            .upsert_snapshot(owner, month("2024-03"), cash(dec!(1)), at)
            .await
            .unwrap();
        let b = store
            .upsert_snapshot(owner, month("2024-03"), cash(dec!(1)), at)
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(store.list(owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_is_empty_and_scoped_per_owner() {
        let store = MemorySnapshotStore::default();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(store.list(alice).await.unwrap().is_empty());

        let at = OffsetDateTime::now_utc();
        let months = MonthlyFields::from([
            (month("2024-05"), cash(dec!(5))),
            (month("2023-01"), cash(dec!(1))),
        ]);
        store.upsert_many(bob, &months, at).await.unwrap();

        assert!(store.list(alice).await.unwrap().is_empty());
        let keys: Vec<String> = store
            .list(bob)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.month_key.to_string())
            .collect();
        assert_eq!(keys, vec!["2023-01", "2024-05"]);
    }

    #[tokio::test]
    async fn update_existing_is_all_or_nothing() {
        let store = MemorySnapshotStore::default();
        let owner = Uuid::new_v4();
        let at = datetime!(2024-01-01 0:00 UTC);
        store
            .upsert_snapshot(owner, month("2024-01"), cash(dec!(1)), at)
            .await
            .unwrap();

        let months = MonthlyFields::from([
            (month("2024-01"), cash(dec!(99))),
            (month("2024-02"), cash(dec!(2))),
        ]);
        let err = store
            .update_existing(owner, &months, OffsetDateTime::now_utc())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m.contains("2024-02")));

        let all = store.list(owner).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].fields.cash_on_hand, Some(dec!(1)));
        assert_eq!(all[0].last_update, at);
    }

    #[tokio::test]
    async fn replace_all_returns_exactly_the_new_mapping() {
        let store = MemorySnapshotStore::default();
        let (owner, other) = (Uuid::new_v4(), Uuid::new_v4());
        let old = datetime!(2023-01-01 0:00 UTC);
        let restored = datetime!(2024-06-30 12:00 UTC);

        store
            .upsert_many(
                owner,
                &MonthlyFields::from([
                    (month("2023-01"), cash(dec!(1))),
                    (month("2023-02"), cash(dec!(2))),
                ]),
                old,
            )
            .await
            .unwrap();
        store
            .upsert_snapshot(other, month("2023-01"), cash(dec!(7)), old)
            .await
            .unwrap();

        let replacement = MonthlyFields::from([(
            month("2023-02"),
            SnapshotFields {
                debt: Some(dec!(300)),
                ..Default::default()
            },
        )]);
        store.replace_all(owner, &replacement, restored).await.unwrap();

        let all = store.list(owner).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].month_key.as_str(), "2023-02");
        // Overwrite, not merge: the old cash value is gone.
        assert_eq!(all[0].fields.cash_on_hand, None);
        assert_eq!(all[0].fields.debt, Some(dec!(300)));
        assert_eq!(all[0].last_update, restored);

        assert_eq!(store.list(other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_merges_keep_every_field() {
        let store = Arc::new(MemorySnapshotStore::default());
        let owner = Uuid::new_v4();
        let patches = vec![
            cash(dec!(1)),
            SnapshotFields {
                savings: Some(dec!(2)),
                ..Default::default()
            },
            SnapshotFields {
                stocks: Some(dec!(3)),
                ..Default::default()
            },
            SnapshotFields {
                real_estate: Some(dec!(4)),
                ..Default::default()
            },
            SnapshotFields {
                debt: Some(dec!(5)),
                ..Default::default()
            },
        ];

        let handles: Vec<_> = patches
            .into_iter()
            .map(|fields| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .upsert_snapshot(owner, month("2024-03"), fields, OffsetDateTime::now_utc())
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let all = store.list(owner).await.unwrap();
        assert_eq!(all.len(), 1);
        let f = &all[0].fields;
        assert_eq!(
            (f.cash_on_hand, f.savings, f.stocks, f.real_estate, f.debt),
            (Some(dec!(1)), Some(dec!(2)), Some(dec!(3)), Some(dec!(4)), Some(dec!(5)))
        );
    }
}
