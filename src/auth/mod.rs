use crate::state::AppState;
use axum::Router;

mod claims;
pub mod dto;
pub mod extractors;
pub mod guard;
pub mod handlers;
pub mod jwt;
pub mod services;

pub use claims::{Claims, IdentityClaims, TokenKind};
pub use extractors::Actor;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::auth_routes())
}
