//! Authentication module for TrustList
//!
//! The identity service owns registration, passwords and sessions; this
//! boundary only validates the bearer tokens it issues and derives the
//! acting user and role for each request.

pub mod jwt;
pub mod middleware;

pub use jwt::{Claims, JwtManager};
pub use middleware::{require_admin, require_auth, ActorRole, AuthState, AuthUser};
