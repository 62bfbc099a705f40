use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod error;
pub mod handlers;
#[cfg(test)]
pub(crate) mod memory;
pub mod model;
pub mod password;
pub mod repo;
pub mod services;
pub mod token;
pub mod validation;

pub use error::{SigningError, UserError, ValidationError};
pub use model::{NewUser, PreparedWrite, Role, User};
pub use repo::{PgUserStore, UserStore};
pub use token::{Claims, JwtKeys};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
