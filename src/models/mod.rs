//! Core data models for the data archive service.
//!
//! These entities represent archive records and the identities that own
//! them. They map cleanly to database tables via `sqlx::FromRow` and
//! serialize naturally as JSON via `serde`.

pub mod archive;
pub mod identity;
