//! Data models
//!
//! Domain entities for the DevWrite auth service.

pub mod session;
pub mod user;

pub use session::{NewSession, Session};
pub use user::User;
