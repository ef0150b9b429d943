//! Signed OAuth `state` values.
//!
//! Format: `base64url(payload_json) "." base64url(HMAC-SHA256(base64url(payload_json)))`,
//! where `payload_json` is `{"userId": <i64>, "ts": <epoch millis>}` and
//! base64url carries no padding. The tag is computed over the encoded
//! payload text, so verification never has to re-serialize JSON.

use crate::db::SubjectId;
use crate::error::AuthError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use ring::hmac;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatePayload {
    #[serde(rename = "userId")]
    pub subject_id: SubjectId,
    #[serde(rename = "ts")]
    pub issued_at_ms: i64,
}

/// Issues and verifies tamper-evident `state` values with a server-held key.
pub struct StateSigner {
    key: hmac::Key,
    ttl: Duration,
}

impl StateSigner {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            ttl,
        }
    }

    pub fn issue(&self, subject_id: SubjectId) -> Result<String, AuthError> {
        self.issue_at(subject_id, Utc::now())
    }

    pub fn issue_at(&self, subject_id: SubjectId, now: DateTime<Utc>) -> Result<String, AuthError> {
        let payload = StatePayload {
            subject_id,
            issued_at_ms: now.timestamp_millis(),
        };
        let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?);
        let tag = hmac::sign(&self.key, encoded.as_bytes());
        Ok(format!("{encoded}.{}", URL_SAFE_NO_PAD.encode(tag.as_ref())))
    }

    /// Check integrity first, then freshness. Returns the embedded subject.
    pub fn verify_at(&self, state: &str, now: DateTime<Utc>) -> Result<SubjectId, AuthError> {
        let payload = self.open(state)?;
        let age_ms = now.timestamp_millis() - payload.issued_at_ms;
        if age_ms > self.ttl.num_milliseconds() {
            return Err(AuthError::ExpiredState);
        }
        Ok(payload.subject_id)
    }

    fn open(&self, state: &str) -> Result<StatePayload, AuthError> {
        let (encoded, tag) = state.split_once('.').ok_or(AuthError::InvalidState)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| AuthError::InvalidState)?;
        // ring compares in constant time.
        hmac::verify(&self.key, encoded.as_bytes(), &tag).map_err(|_| AuthError::InvalidState)?;
        let json = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| AuthError::InvalidState)?;
        serde_json::from_slice(&json).map_err(|_| AuthError::InvalidState)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> StateSigner {
        StateSigner::new(b"state-secret", Duration::minutes(10))
    }

    fn verify(s: &StateSigner, state: &str) -> Result<SubjectId, AuthError> {
        s.verify_at(state, Utc::now())
    }

    #[test]
    fn round_trip_recovers_subject() {
        let s = signer();
        let state = s.issue(42).unwrap();
        assert_eq!(verify(&s, &state).unwrap(), 42);
    }

    #[test]
    fn payload_uses_wire_field_names() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let state = signer().issue_at(7, now).unwrap();
        let (encoded, _) = state.split_once('.').unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(encoded).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"userId": 7, "ts": 1_700_000_000_000i64}));
    }

    #[test]
    fn any_flipped_payload_byte_is_invalid() {
        let s = signer();
        let state = s.issue(42).unwrap();
        let (encoded, tag) = state.split_once('.').unwrap();
        for i in 0..encoded.len() {
            let mut bytes = encoded.as_bytes().to_vec();
            bytes[i] ^= 0x01;
            let forged = format!("{}.{}", String::from_utf8_lossy(&bytes), tag);
            assert!(
                matches!(verify(&s, &forged), Err(AuthError::InvalidState)),
                "byte {i} accepted"
            );
        }
    }

    #[test]
    fn foreign_key_and_garbage_are_invalid() {
        let state = StateSigner::new(b"other", Duration::minutes(10))
            .issue(42)
            .unwrap();
        assert!(matches!(verify(&signer(), &state), Err(AuthError::InvalidState)));
        assert!(matches!(verify(&signer(), "no-dot"), Err(AuthError::InvalidState)));
        assert!(matches!(verify(&signer(), "a.!!!"), Err(AuthError::InvalidState)));
        assert!(matches!(verify(&signer(), ""), Err(AuthError::InvalidState)));
    }

    #[test]
    fn stale_state_is_expired() {
        let s = signer();
        let now = Utc::now();
        let old = s.issue_at(42, now - Duration::minutes(11)).unwrap();
        assert!(matches!(s.verify_at(&old, now), Err(AuthError::ExpiredState)));

        let edge = s.issue_at(42, now - Duration::minutes(10)).unwrap();
        assert_eq!(s.verify_at(&edge, now).unwrap(), 42);
    }

    #[test]
    fn tampering_wins_over_expiry() {
        let s = signer();
        let now = Utc::now();
        let old = s.issue_at(42, now - Duration::hours(1)).unwrap();
        let forged = format!("{}x", old);
        assert!(matches!(s.verify_at(&forged, now), Err(AuthError::InvalidState)));
    }
}
