use crate::db::models::{AdminCredential, LinkRecord, SubjectId, TokenUpdate};
use crate::db::schema::SQLITE_INIT;
use crate::db::store::{AccountDirectory, CredentialStore};
use crate::error::AuthError;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

pub type SqlitePool = Pool<Sqlite>;

const CREDENTIAL_COLUMNS: &str = "subject_id, google_account_id, google_email, access_token, \
     refresh_token, access_token_expiry, authorized, updated_at";

#[derive(Clone)]
pub struct CredentialsStorage {
    pool: SqlitePool,
}

impl CredentialsStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `database_url` and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self, AuthError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
        let storage = Self::new(pool);
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), AuthError> {
        // sqlx::query runs a single statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Mirror an account from the account system.
    pub async fn put_account(
        &self,
        user_id: SubjectId,
        is_admin: bool,
        banned: bool,
    ) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (user_id, is_admin, banned) VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                is_admin=excluded.is_admin,
                banned=excluded.banned
            "#,
        )
        .bind(user_id)
        .bind(is_admin as i64)
        .bind(banned as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_model(row: SqliteRow) -> Result<AdminCredential, AuthError> {
        let subject_id: i64 = row.try_get("subject_id")?;
        let google_account_id: String = row.try_get("google_account_id")?;
        let google_email: String = row.try_get("google_email")?;
        let access_token: Option<String> = row.try_get("access_token")?;
        let refresh_token: Option<String> = row.try_get("refresh_token")?;
        let expiry_str: Option<String> = row.try_get("access_token_expiry")?;
        let authorized_i: i64 = row.try_get("authorized")?;
        let updated_str: String = row.try_get("updated_at")?;

        let access_token_expiry = expiry_str.as_deref().map(parse_timestamp).transpose()?;
        let updated_at = parse_timestamp(&updated_str)?;

        Ok(AdminCredential {
            subject_id,
            google_account_id,
            google_email,
            access_token,
            refresh_token,
            access_token_expiry,
            authorized: authorized_i != 0,
            updated_at,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, AuthError> {
    let ts = DateTime::parse_from_rfc3339(s)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
        .with_timezone(&Utc);
    Ok(ts)
}

impl CredentialStore for CredentialsStorage {
    async fn find_by_subject(
        &self,
        subject_id: SubjectId,
    ) -> Result<Option<AdminCredential>, AuthError> {
        let row = sqlx::query(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM admin_credentials WHERE subject_id = ?"
        ))
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_model).transpose()
    }

    async fn find_by_google_account(
        &self,
        google_account_id: &str,
    ) -> Result<Option<AdminCredential>, AuthError> {
        let row = sqlx::query(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM admin_credentials WHERE google_account_id = ?"
        ))
        .bind(google_account_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_model).transpose()
    }

    async fn upsert_link(&self, record: LinkRecord) -> Result<AdminCredential, AuthError> {
        let subject_id = record.subject_id;
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO admin_credentials (
                subject_id, google_account_id, google_email, access_token,
                refresh_token, access_token_expiry, authorized, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, 1, ?)
            ON CONFLICT(subject_id) DO UPDATE SET
                google_account_id=excluded.google_account_id,
                google_email=excluded.google_email,
                access_token=excluded.access_token,
                refresh_token=COALESCE(excluded.refresh_token, admin_credentials.refresh_token),
                access_token_expiry=excluded.access_token_expiry,
                authorized=1,
                updated_at=excluded.updated_at
            "#,
        )
        .bind(record.subject_id)
        .bind(record.google_account_id)
        .bind(record.google_email)
        .bind(record.access_token)
        .bind(record.refresh_token)
        .bind(record.access_token_expiry.to_rfc3339())
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(AuthError::IdentityAlreadyLinked);
            }
            Err(e) => return Err(e.into()),
        }

        self.find_by_subject(subject_id)
            .await?
            .ok_or(AuthError::Database(sqlx::Error::RowNotFound))
    }

    async fn update_tokens(
        &self,
        subject_id: SubjectId,
        expected_refresh_token: &str,
        update: TokenUpdate,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            r#"UPDATE admin_credentials SET
                access_token = ?,
                refresh_token = COALESCE(?, refresh_token),
                access_token_expiry = ?,
                updated_at = ?
              WHERE subject_id = ? AND authorized = 1 AND refresh_token = ?"#,
        )
        .bind(update.access_token)
        .bind(update.refresh_token)
        .bind(update.access_token_expiry.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(subject_id)
        .bind(expected_refresh_token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_unauthorized(
        &self,
        subject_id: SubjectId,
        rejected_refresh_token: &str,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            r#"UPDATE admin_credentials SET authorized = 0, updated_at = ?
              WHERE subject_id = ? AND refresh_token = ?"#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(subject_id)
        .bind(rejected_refresh_token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear_tokens(&self, subject_id: SubjectId) -> Result<(), AuthError> {
        sqlx::query(
            r#"UPDATE admin_credentials SET
                access_token = NULL,
                refresh_token = NULL,
                access_token_expiry = NULL,
                authorized = 0,
                updated_at = ?
              WHERE subject_id = ?"#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(subject_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_refreshable(&self) -> Result<Vec<AdminCredential>, AuthError> {
        let rows = sqlx::query(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM admin_credentials \
             WHERE authorized = 1 AND refresh_token IS NOT NULL ORDER BY subject_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_model).collect()
    }
}

impl AccountDirectory for CredentialsStorage {
    async fn is_active_admin(&self, subject_id: SubjectId) -> Result<bool, AuthError> {
        let row: Option<(i64, i64)> =
            sqlx::query_as("SELECT is_admin, banned FROM accounts WHERE user_id = ?")
                .bind(subject_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(matches!(row, Some((is_admin, banned)) if is_admin != 0 && banned == 0))
    }
}
