//! Authentication module
//!
//! Registration, password login, opaque session tokens and their
//! resolution back to a user.

pub mod handlers;
pub mod password;
mod service;
pub mod token;

pub use service::{normalize_email, AuthService, LoginOutcome};
