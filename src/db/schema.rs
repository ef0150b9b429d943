//! SQL DDL for initializing the credential storage.
//! SQLite-first design; can be adapted for other RDBMS.

/// SQLite schema with:
/// - `accounts`: the account system's view of platform users (read-only for the lifecycle)
/// - `admin_credentials`: one row per admin, keyed by `subject_id`
/// - `google_account_id` UNIQUE so one Google account backs at most one admin
/// - timestamps stored as RFC3339 text, booleans as INTEGER 0/1
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    user_id INTEGER PRIMARY KEY,
    is_admin INTEGER NOT NULL DEFAULT 0,
    banned INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS admin_credentials (
    subject_id INTEGER PRIMARY KEY,
    google_account_id TEXT NOT NULL UNIQUE,
    google_email TEXT NOT NULL,
    access_token TEXT NULL,
    refresh_token TEXT NULL,
    access_token_expiry TEXT NULL, -- RFC3339
    authorized INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_admin_credentials_authorized ON admin_credentials(authorized);
"#;
