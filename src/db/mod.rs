//! Database module: models, schema and the store contracts.
//!
//! Layout:
//! - `models.rs`: validated records mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `store.rs`: traits the token lifecycle depends on
//! - `sqlite.rs`: the sqlx implementation of those traits

pub mod models;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use models::{AdminCredential, CredentialStatus, LinkRecord, SubjectId, TokenUpdate};
pub use schema::SQLITE_INIT;
pub use sqlite::{CredentialsStorage, SqlitePool};
pub use store::{AccountDirectory, CredentialStore};
