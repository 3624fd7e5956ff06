//! Request gates.

pub mod auth;
pub mod role;
