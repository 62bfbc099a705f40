use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::users::{
    error::{UserError, ValidationError},
    model::{PreparedWrite, User},
    repo::UserStore,
    validation::normalize_email,
};

/// In-process [`UserStore`] with the same uniqueness and read rules as Postgres.
#[derive(Default)]
pub struct MemoryUserStore {
    rows: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    /// Full stored row, password included, for assertions on raw state.
    pub async fn raw(&self, id: Uuid) -> Option<User> {
        self.rows.read().await.get(&id).cloned()
    }
}

fn default_read(user: &User) -> User {
    let mut out = user.clone();
    out.password = None;
    out
}

fn email_taken(rows: &HashMap<Uuid, User>, email: &str, except: Uuid) -> bool {
    rows.values().any(|u| u.id != except && u.email == email)
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: &User, write: &PreparedWrite) -> Result<User, UserError> {
        let hash = write
            .password_hash
            .clone()
            .or_else(|| user.password.clone())
            .ok_or(ValidationError::MissingField("password"))?;
        let mut rows = self.rows.write().await;
        if email_taken(&rows, &user.email, user.id) {
            return Err(ValidationError::DuplicateEmail(user.email.clone()).into());
        }
        let now = OffsetDateTime::now_utc();
        let mut stored = user.clone();
        stored.password = Some(hash);
        stored.created_at = now;
        stored.updated_at = now;
        stored.mark_persisted();
        rows.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, user: &User, write: &PreparedWrite) -> Result<User, UserError> {
        let mut rows = self.rows.write().await;
        if email_taken(&rows, &user.email, user.id) {
            return Err(ValidationError::DuplicateEmail(user.email.clone()).into());
        }
        let existing = rows.get(&user.id).ok_or(UserError::NotFound)?;
        let mut stored = user.clone();
        stored.password = write
            .password_hash
            .clone()
            .or_else(|| existing.password.clone());
        stored.created_at = existing.created_at;
        stored.updated_at = OffsetDateTime::now_utc();
        stored.mark_persisted();
        rows.insert(stored.id, stored.clone());
        stored.password = write.password_hash.clone().or_else(|| user.password.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserError> {
        Ok(self.rows.read().await.get(&id).map(default_read))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        let email = normalize_email(email);
        let rows = self.rows.read().await;
        Ok(rows.values().find(|u| u.email == email).map(default_read))
    }

    async fn find_by_email_with_password(&self, email: &str) -> Result<Option<User>, UserError> {
        let email = normalize_email(email);
        let rows = self.rows.read().await;
        Ok(rows.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_reset_password_token(&self, token: &str) -> Result<Option<User>, UserError> {
        let now = OffsetDateTime::now_utc();
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|u| {
                u.reset_password_token.as_deref() == Some(token)
                    && u.reset_password_expire.is_some_and(|exp| exp > now)
            })
            .map(default_read))
    }

    async fn add_favourite(&self, id: Uuid, property_id: Uuid) -> Result<User, UserError> {
        let mut rows = self.rows.write().await;
        let user = rows.get_mut(&id).ok_or(UserError::NotFound)?;
        if user.add_favourite(property_id) {
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(default_read(user))
    }

    async fn remove_favourite(&self, id: Uuid, property_id: Uuid) -> Result<User, UserError> {
        let mut rows = self.rows.write().await;
        let user = rows.get_mut(&id).ok_or(UserError::NotFound)?;
        if user.remove_favourite(property_id) {
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(default_read(user))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, UserError> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }
}
