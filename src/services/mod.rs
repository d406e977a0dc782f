//! Business logic services
//!
//! Service layer for the DevWrite auth service:
//! - `password`: argon2 hashing and verification
//! - `device`: device identifier resolution (one-way hash)
//! - `token`: access/refresh token codec
//! - `auth`: session lifecycle manager (signup, login, refresh, logout)

pub mod auth;
pub mod device;
pub mod password;
pub mod token;

pub use auth::{AuthService, AuthServiceError};
pub use token::TokenCodec;
