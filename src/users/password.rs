use tokio::task;
use tracing::error;

use crate::users::error::UserError;

/// Hashes `plain` with bcrypt at `cost` on the blocking pool.
pub async fn hash_password(plain: String, cost: u32) -> Result<String, UserError> {
    task::spawn_blocking(move || bcrypt::hash(plain, cost))
        .await
        .map_err(|e| {
            error!(error = %e, "bcrypt hash task failed");
            UserError::Hashing(e.to_string())
        })?
        .map_err(|e| {
            error!(error = %e, "bcrypt hash error");
            UserError::from(e)
        })
}

/// Constant-time check of `plain` against a bcrypt hash.
pub async fn verify_password(plain: String, hash: String) -> Result<bool, UserError> {
    task::spawn_blocking(move || bcrypt::verify(plain, &hash))
        .await
        .map_err(|e| {
            error!(error = %e, "bcrypt verify task failed");
            UserError::Hashing(e.to_string())
        })?
        .map_err(|e| {
            error!(error = %e, "bcrypt parse hash error");
            UserError::from(e)
        })
}
