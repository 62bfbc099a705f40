use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::users::{
    error::{UserError, ValidationError},
    model::{PreparedWrite, User},
    validation::normalize_email,
};

/// Columns returned by default reads. `password` is deliberately absent.
const USER_COLUMNS: &str = "id, first_name, last_name, email, phone_number, role, is_verified, \
    reset_password_token, reset_password_expire, security_question_answer, favourites, \
    profile_picture, verification_token, verification_token_expires, coupon_used, \
    created_at, updated_at";

/// Persistence for [`User`] records.
///
/// Writers expect a record that already went through
/// [`User::prepare_for_persist`]; see `services::save_user`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &User, write: &PreparedWrite) -> Result<User, UserError>;
    async fn update(&self, user: &User, write: &PreparedWrite) -> Result<User, UserError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError>;
    /// Same as `find_by_email` but also selects the password hash.
    async fn find_by_email_with_password(&self, email: &str) -> Result<Option<User>, UserError>;
    /// Only matches tokens whose expiry is still in the future.
    async fn find_by_reset_password_token(&self, token: &str) -> Result<Option<User>, UserError>;
    async fn add_favourite(&self, id: Uuid, property_id: Uuid) -> Result<User, UserError>;
    async fn remove_favourite(&self, id: Uuid, property_id: Uuid) -> Result<User, UserError>;
    async fn delete(&self, id: Uuid) -> Result<bool, UserError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_write_error(e: sqlx::Error, email: &str) -> UserError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() && db.constraint().map_or(true, |c| c.contains("email")) {
            return ValidationError::DuplicateEmail(email.to_string()).into();
        }
    }
    e.into()
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &User, write: &PreparedWrite) -> Result<User, UserError> {
        let hash = write
            .password_hash
            .as_deref()
            .or(user.password.as_deref())
            .ok_or(ValidationError::MissingField("password"))?;
        let sql = format!(
            r#"
            INSERT INTO users (
                id, first_name, last_name, email, password, phone_number, role, is_verified,
                reset_password_token, reset_password_expire, security_question_answer,
                favourites, profile_picture, verification_token, verification_token_expires,
                coupon_used
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {USER_COLUMNS}
            "#
        );
        let mut stored = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.email)
            .bind(hash)
            .bind(&user.phone_number)
            .bind(user.role.as_str())
            .bind(user.is_verified)
            .bind(&user.reset_password_token)
            .bind(user.reset_password_expire)
            .bind(&user.security_question_answer)
            .bind(&user.favourites)
            .bind(&user.profile_picture)
            .bind(&user.verification_token)
            .bind(user.verification_token_expires)
            .bind(user.coupon_used)
            .fetch_one(&self.db)
            .await
            .map_err(|e| map_write_error(e, &user.email))?;
        stored.password = Some(hash.to_string());
        Ok(stored)
    }

    async fn update(&self, user: &User, write: &PreparedWrite) -> Result<User, UserError> {
        let sql = format!(
            r#"
            UPDATE users SET
                first_name = $2,
                last_name = $3,
                email = $4,
                password = COALESCE($5, password),
                phone_number = $6,
                role = $7,
                is_verified = $8,
                reset_password_token = $9,
                reset_password_expire = $10,
                security_question_answer = $11,
                favourites = $12,
                profile_picture = $13,
                verification_token = $14,
                verification_token_expires = $15,
                coupon_used = $16,
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let mut stored = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.email)
            .bind(&write.password_hash)
            .bind(&user.phone_number)
            .bind(user.role.as_str())
            .bind(user.is_verified)
            .bind(&user.reset_password_token)
            .bind(user.reset_password_expire)
            .bind(&user.security_question_answer)
            .bind(&user.favourites)
            .bind(&user.profile_picture)
            .bind(&user.verification_token)
            .bind(user.verification_token_expires)
            .bind(user.coupon_used)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| map_write_error(e, &user.email))?
            .ok_or(UserError::NotFound)?;
        stored.password = write.password_hash.clone().or_else(|| user.password.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(normalize_email(email))
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email_with_password(&self, email: &str) -> Result<Option<User>, UserError> {
        let sql = format!("SELECT {USER_COLUMNS}, password FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(normalize_email(email))
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_reset_password_token(&self, token: &str) -> Result<Option<User>, UserError> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE reset_password_token = $1 AND reset_password_expire > now()
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(token)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn add_favourite(&self, id: Uuid, property_id: Uuid) -> Result<User, UserError> {
        let sql = format!(
            r#"
            UPDATE users SET
                favourites = CASE
                    WHEN $2 = ANY(favourites) THEN favourites
                    ELSE array_append(favourites, $2)
                END,
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(property_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(UserError::NotFound)
    }

    async fn remove_favourite(&self, id: Uuid, property_id: Uuid) -> Result<User, UserError> {
        let sql = format!(
            r#"
            UPDATE users SET
                favourites = array_remove(favourites, $2),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(property_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(UserError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, UserError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
