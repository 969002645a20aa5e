use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::password::{hash_secret, secret_matches};
use crate::auth::repo::AccountStore;
use crate::auth::repo_types::User;
use crate::error::{AppError, AppResult};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Emails are compared case-insensitively everywhere, so they are stored in this form.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn register(store: &dyn AccountStore, email: &str, password: &str) -> AppResult<User> {
    let email = normalize_email(email);

    if !is_valid_email(&email) {
        return Err(AppError::Validation("Invalid email".into()));
    }
    if password.is_empty() {
        return Err(AppError::Validation("Password must not be empty".into()));
    }

    // Cheap early exit; the store still enforces uniqueness on insert.
    if store.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::DuplicateAccount);
    }

    let hash = hash_secret(password).await?;
    let user = store.create(&email, &hash).await?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

/// `NotFound` for an unknown email, `InvalidCredential` for a wrong password.
pub async fn authenticate(store: &dyn AccountStore, email: &str, password: &str) -> AppResult<User> {
    let email = normalize_email(email);

    let user = store
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no account for '{}'", email)))?;

    if !secret_matches(password, &user.password_hash).await? {
        warn!(user_id = %user.id, "invalid password");
        return Err(AppError::InvalidCredential);
    }

    debug!(user_id = %user.id, "user authenticated");
    Ok(user)
}

/// Resolves an owner given either a user id or an email address.
pub async fn resolve_owner(store: &dyn AccountStore, reference: &str) -> AppResult<User> {
    let reference = reference.trim();
    let found = match Uuid::parse_str(reference) {
        Ok(id) => store.find_by_id(id).await?,
        Err(_) => store.find_by_email(&normalize_email(reference)).await?,
    };
    found.ok_or_else(|| AppError::OwnerNotFound(reference.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAccountStore;

    #[test]
    fn email_shape() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("a x@y.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_email("  A@X.Com "), "a@x.com");
    }

    #[tokio::test]
    async fn register_stores_hash_not_password() {
        let store = MemoryAccountStore::default();
        let user = register(&store, "a@x.com", "pw").await.unwrap();
        assert_eq!(user.email, "a@x.com");
        assert_ne!(user.password_hash, "pw");
        assert!(secret_matches("pw", &user.password_hash).await.unwrap());
    }

    #[tokio::test]
    async fn register_twice_is_duplicate() {
        let store = MemoryAccountStore::default();
        register(&store, "a@x.com", "pw").await.unwrap();
        let err = register(&store, "a@x.com", "other").await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateAccount));
        let err = register(&store, "A@X.COM", "other").await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateAccount));
    }

    #[tokio::test]
    async fn register_validates_input() {
        let store = MemoryAccountStore::default();
        let err = register(&store, "not-an-email", "pw").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = register(&store, "a@x.com", "").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn authenticate_ignores_email_case() {
        let store = MemoryAccountStore::default();
        let registered = register(&store, "a@x.com", "pw").await.unwrap();
        let user = authenticate(&store, "A@X.com", "pw").await.unwrap();
        assert_eq!(user.id, registered.id);
    }

    #[tokio::test]
    async fn authenticate_failures() {
        let store = MemoryAccountStore::default();
        register(&store, "a@x.com", "pw").await.unwrap();

        let err = authenticate(&store, "a@x.com", "nope").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredential));

        let err = authenticate(&store, "b@x.com", "pw").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn resolve_owner_by_id_or_email() {
        let store = MemoryAccountStore::default();
        let user = register(&store, "a@x.com", "pw").await.unwrap();

        let by_id = resolve_owner(&store, &user.id.to_string()).await.unwrap();
        assert_eq!(by_id.id, user.id);
        let by_email = resolve_owner(&store, "A@x.com").await.unwrap();
        assert_eq!(by_email.id, user.id);

        let err = resolve_owner(&store, &Uuid::new_v4().to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::OwnerNotFound(_)));
        let err = resolve_owner(&store, "ghost@x.com").await.unwrap_err();
        assert!(matches!(err, AppError::OwnerNotFound(_)));
    }
}
