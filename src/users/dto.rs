use serde::{Deserialize, Serialize};

use crate::users::model::{NewUser, User};

/// Request body for self-registration. Role is not client-selectable.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone_number: Option<String>,
    pub profile_picture: Option<String>,
    pub security_question_answer: Option<String>,
}

impl From<RegisterRequest> for NewUser {
    fn from(r: RegisterRequest) -> Self {
        NewUser {
            first_name: r.first_name,
            last_name: r.last_name,
            email: r.email,
            password: r.password,
            phone_number: r.phone_number,
            role: None,
            profile_picture: r.profile_picture,
            security_question_answer: r.security_question_answer,
        }
    }
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response returned after login or register.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}
