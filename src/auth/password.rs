//! Argon2 credential hashing.
//!
//! Hashing is deliberately slow, so both operations run on tokio's blocking
//! pool instead of stalling the request executor.

use anyhow::{anyhow, Context};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tokio::task;

use crate::error::AppResult;

/// Returns a PHC string (`$argon2id$...`) carrying its own salt and parameters.
pub async fn hash_secret(secret: &str) -> AppResult<String> {
    let secret = secret.to_owned();
    let phc = task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| anyhow!("argon2 hashing failed: {e}"))
    })
    .await
    .context("hashing task panicked")??;
    Ok(phc)
}

/// `Ok(false)` on a mismatch; `Err` only when `stored` is not a readable PHC string.
pub async fn secret_matches(secret: &str, stored: &str) -> AppResult<bool> {
    let (secret, stored) = (secret.to_owned(), stored.to_owned());
    let matches = task::spawn_blocking(move || {
        let parsed =
            PasswordHash::new(&stored).map_err(|e| anyhow!("stored hash is unreadable: {e}"))?;
        Ok::<_, anyhow::Error>(
            Argon2::default()
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
        )
    })
    .await
    .context("verification task panicked")??;
    Ok(matches)
}
