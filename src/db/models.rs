use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Platform user id, owned by the account system.
pub type SubjectId = i64;

/// A platform admin's link to a Google account.
///
/// Tokens are never serialized; the struct can be returned to clients as is.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdminCredential {
    pub subject_id: SubjectId,
    pub google_account_id: String,
    pub google_email: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub access_token_expiry: Option<DateTime<Utc>>,
    pub authorized: bool,
    pub updated_at: DateTime<Utc>,
}

impl AdminCredential {
    /// True when the access token expires within `buffer` of `now` (or has no expiry).
    pub fn is_stale(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        match (&self.access_token, self.access_token_expiry) {
            (Some(_), Some(expiry)) => expiry - buffer <= now,
            _ => true,
        }
    }

    /// The stored access token if it is still usable.
    pub fn fresh_access_token(&self, now: DateTime<Utc>, buffer: Duration) -> Option<&str> {
        if self.is_stale(now, buffer) {
            return None;
        }
        self.access_token.as_deref()
    }
}

/// Result of a successful exchange, written by [`crate::db::CredentialStore::upsert_link`].
#[derive(Debug, Clone)]
pub struct LinkRecord {
    pub subject_id: SubjectId,
    pub google_account_id: String,
    pub google_email: String,
    pub access_token: String,
    /// `None` keeps whatever refresh token is already stored.
    pub refresh_token: Option<String>,
    pub access_token_expiry: DateTime<Utc>,
}

/// New token material after a refresh.
#[derive(Debug, Clone)]
pub struct TokenUpdate {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub access_token_expiry: DateTime<Utc>,
}

/// Token-free view of a credential for dashboards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CredentialStatus {
    pub subject_id: SubjectId,
    pub google_email: String,
    pub authorized: bool,
    pub access_token_expiry: Option<DateTime<Utc>>,
    pub needs_refresh: bool,
    pub time_remaining: String,
}

impl CredentialStatus {
    pub fn of(cred: &AdminCredential, now: DateTime<Utc>, buffer: Duration) -> Self {
        Self {
            subject_id: cred.subject_id,
            google_email: cred.google_email.clone(),
            authorized: cred.authorized,
            access_token_expiry: cred.access_token_expiry,
            needs_refresh: cred.is_stale(now, buffer),
            time_remaining: format_time_remaining(cred.access_token_expiry, now),
        }
    }
}

/// "Expired", "12m remaining" or "1h 5m remaining".
pub fn format_time_remaining(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(expiry) = expiry else {
        return "Expired".to_string();
    };
    let left = expiry - now;
    if left <= Duration::zero() {
        return "Expired".to_string();
    }
    let hours = left.num_hours();
    let minutes = left.num_minutes() % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m remaining")
    } else {
        format!("{minutes}m remaining")
    }
}
