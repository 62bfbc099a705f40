use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::{
    error::{UserError, ValidationError},
    password,
    token::JwtKeys,
    validation::{self, Fields},
};

/// Account role. Stored as lowercase text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "content creator")]
    ContentCreator,
    #[default]
    #[serde(rename = "user")]
    User,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::ContentCreator, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::ContentCreator => "content creator",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == lowered)
            .ok_or_else(|| ValidationError::InvalidRole(s.to_string()))
    }
}

impl TryFrom<String> for Role {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Registration input as received from a collaborator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone_number: Option<String>,
    pub role: Option<String>,
    pub profile_picture: Option<String>,
    pub security_question_answer: Option<String>,
}

/// Plaintext values waiting for the hashing step.
#[derive(Clone, Default)]
struct PendingSecrets {
    password: Option<String>,
    security_answer: Option<String>,
}

impl fmt::Debug for PendingSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSecrets")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field(
                "security_answer",
                &self.security_answer.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Column values that changed during [`User::prepare_for_persist`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedWrite {
    pub password_hash: Option<String>,
    pub security_answer_hash: Option<String>,
}

/// Account record.
///
/// `password` holds the bcrypt hash and is only populated when explicitly
/// selected; default reads leave it `None`.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: String,
    #[sqlx(default)]
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub phone_number: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub is_verified: bool,
    #[serde(skip_serializing)]
    pub reset_password_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_password_expire: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub security_question_answer: Option<String>,
    pub favourites: Vec<Uuid>,
    pub profile_picture: Option<String>,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    #[serde(skip_serializing)]
    pub verification_token_expires: Option<OffsetDateTime>,
    pub coupon_used: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[sqlx(skip)]
    #[serde(skip)]
    pending: PendingSecrets,
    #[sqlx(skip)]
    #[serde(skip)]
    is_new: bool,
}

impl User {
    /// Builds an unsaved record from registration input.
    ///
    /// Required fields are checked here; format rules run again in
    /// [`User::prepare_for_persist`].
    pub fn new(input: NewUser) -> Result<Self, ValidationError> {
        let first_name = validation::require("firstName", input.first_name.as_deref())?;
        let email = validation::require("email", input.email.as_deref())?;
        let password = validation::require("password", input.password.as_deref())?;
        let role = match input.role.as_deref() {
            None => Role::default(),
            Some(r) => validation::require("role", Some(r))?.parse()?,
        };
        let now = OffsetDateTime::now_utc();

        Ok(Self {
            id: Uuid::new_v4(),
            first_name: first_name.trim().to_string(),
            last_name: input.last_name,
            email: validation::normalize_email(email),
            password: None,
            phone_number: validation::normalize_phone_number(input.phone_number),
            role,
            is_verified: false,
            reset_password_token: None,
            reset_password_expire: None,
            security_question_answer: None,
            favourites: Vec::new(),
            profile_picture: input.profile_picture,
            verification_token: None,
            verification_token_expires: None,
            coupon_used: false,
            created_at: now,
            updated_at: now,
            pending: PendingSecrets {
                password: Some(password.to_string()),
                security_answer: input.security_question_answer,
            },
            is_new: true,
        })
    }

    /// True until the record has been written once.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    #[cfg(test)]
    pub(crate) fn mark_persisted(&mut self) {
        self.is_new = false;
    }

    pub fn is_password_modified(&self) -> bool {
        self.pending.password.is_some()
    }

    /// Replaces the password. Hashed on the next persist.
    pub fn set_password(&mut self, plain: impl Into<String>) {
        self.pending.password = Some(plain.into());
    }

    pub fn set_security_question_answer(&mut self, answer: impl Into<String>) {
        self.pending.security_answer = Some(answer.into());
    }

    pub fn set_role(&mut self, role: &str) -> Result<(), ValidationError> {
        self.role = role.parse()?;
        Ok(())
    }

    /// Adds a property to the favourites set. Returns false if already present.
    pub fn add_favourite(&mut self, property_id: Uuid) -> bool {
        if self.favourites.contains(&property_id) {
            return false;
        }
        self.favourites.push(property_id);
        true
    }

    pub fn remove_favourite(&mut self, property_id: Uuid) -> bool {
        let before = self.favourites.len();
        self.favourites.retain(|id| *id != property_id);
        self.favourites.len() != before
    }

    /// Normalizes, validates and hashes pending secrets. Must run before every write.
    ///
    /// Nothing is hashed when the password was not modified. On error the
    /// record keeps its pending values and must not be written.
    pub async fn prepare_for_persist(&mut self, cost: u32) -> Result<PreparedWrite, UserError> {
        self.email = validation::normalize_email(&self.email);
        self.phone_number = validation::normalize_phone_number(self.phone_number.take());
        validation::validate(&Fields {
            first_name: &self.first_name,
            email: &self.email,
            phone_number: self.phone_number.as_deref(),
        })?;
        if self.is_new && self.password.is_none() && self.pending.password.is_none() {
            return Err(ValidationError::MissingField("password").into());
        }

        let mut seen = Vec::with_capacity(self.favourites.len());
        self.favourites.retain(|id| {
            if seen.contains(id) {
                false
            } else {
                seen.push(*id);
                true
            }
        });

        if self.pending.password.as_deref() == Some("") {
            return Err(ValidationError::MissingField("password").into());
        }
        let password_hash = match self.pending.password.clone() {
            Some(plain) => Some(password::hash_password(plain, cost).await?),
            None => None,
        };
        let security_answer_hash = match self.pending.security_answer.as_deref() {
            Some(answer) => Some(password::hash_password(normalize_answer(answer), cost).await?),
            None => None,
        };

        // Commit only once every hash succeeded.
        if let Some(hash) = &password_hash {
            self.password = Some(hash.clone());
            self.pending.password = None;
        }
        if let Some(hash) = &security_answer_hash {
            self.security_question_answer = Some(hash.clone());
            self.pending.security_answer = None;
        }
        Ok(PreparedWrite {
            password_hash,
            security_answer_hash,
        })
    }

    /// Checks a candidate against the stored hash. The password must have been selected.
    pub async fn compare_password(&self, candidate: &str) -> Result<bool, UserError> {
        let hash = self.password.as_deref().ok_or(UserError::PasswordNotLoaded)?;
        password::verify_password(candidate.to_string(), hash.to_string()).await
    }

    /// Answers compare trimmed and case-insensitively. No stored answer never matches.
    pub async fn compare_security_answer(&self, candidate: &str) -> Result<bool, UserError> {
        match self.security_question_answer.as_deref() {
            Some(hash) => {
                password::verify_password(normalize_answer(candidate), hash.to_string()).await
            }
            None => Ok(false),
        }
    }

    /// Signs a session token carrying this user's id.
    pub async fn generate_auth_token(&self, keys: &JwtKeys) -> Result<String, UserError> {
        Ok(keys.sign(self.id)?)
    }
}

fn normalize_answer(answer: &str) -> String {
    answer.trim().to_lowercase()
}
