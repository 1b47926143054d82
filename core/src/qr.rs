//! Signed ticket tokens.
//!
//! A token is `base64url(json) "." hex(hmac_sha256(secret, json))`. The JSON
//! bytes that are signed are exactly the bytes that are encoded, so verification
//! never re-serializes the payload.

use crate::types::Ticket;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Minimum nonce size in bytes.
pub const MIN_NONCE_BYTES: usize = 16;

/// Failures while signing or verifying a token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QrError {
    /// The signing secret is empty.
    #[error("ticket signing secret is not configured")]
    MissingSecret,

    /// Token is not two non-empty parts, or the payload does not decode.
    #[error("malformed ticket token: {0}")]
    Malformed(String),

    /// Signature does not match the payload.
    #[error("ticket token signature mismatch")]
    BadSignature,

    /// Payload could not be encoded.
    #[error("failed to encode ticket payload: {0}")]
    Encode(String),
}

/// Process-wide HMAC key for ticket tokens.
///
/// Construction rejects blank secrets, so holding a `SigningSecret` means
/// confirmation and redemption can always sign.
#[derive(Clone)]
pub struct SigningSecret(String);

impl SigningSecret {
    /// Wraps a secret.
    ///
    /// # Errors
    ///
    /// Returns [`QrError::MissingSecret`] if the secret is empty after trimming.
    pub fn new(secret: impl Into<String>) -> Result<Self, QrError> {
        let secret = secret.into().trim().to_string();
        if secret.is_empty() {
            return Err(QrError::MissingSecret);
        }
        Ok(Self(secret))
    }

    fn sign_bytes(&self, bytes: &[u8]) -> Result<String, QrError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.0.as_bytes())
            .map_err(|e| QrError::Encode(e.to_string()))?;
        mac.update(bytes);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(**redacted**)")
    }
}

/// The claims carried inside a ticket token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    /// Ticket identifier.
    pub ticket_id: String,
    /// Event identifier.
    pub event_id: i64,
    /// Ticket holder.
    pub user_id: i64,
    /// Ticket tier.
    pub ticket_type: String,
    /// People admitted.
    pub quantity: i64,
    /// Random, URL-safe.
    pub nonce: String,
    /// Unix seconds.
    pub issued_at: i64,
}

impl QrPayload {
    /// Builds the claims for an issued ticket.
    #[must_use]
    pub fn for_ticket(ticket: &Ticket, nonce: String, issued_at: DateTime<Utc>) -> Self {
        Self {
            ticket_id: ticket.id.to_string(),
            event_id: ticket.event_id.get(),
            user_id: ticket.user_id.get(),
            ticket_type: ticket.ticket_type.as_str().to_string(),
            quantity: i64::from(ticket.quantity),
            nonce,
            issued_at: issued_at.timestamp(),
        }
    }

    /// Returns the first claim that disagrees with the stored ticket.
    #[must_use]
    pub fn mismatched_field(&self, ticket: &Ticket) -> Option<&'static str> {
        if self.ticket_id != ticket.id.to_string() {
            Some("ticketId")
        } else if self.event_id != ticket.event_id.get() {
            Some("eventId")
        } else if self.user_id != ticket.user_id.get() {
            Some("userId")
        } else if !self.ticket_type.eq_ignore_ascii_case(ticket.ticket_type.as_str()) {
            Some("ticketType")
        } else if self.quantity != i64::from(ticket.quantity) {
            Some("quantity")
        } else {
            None
        }
    }

    fn check_required(&self) -> Result<(), QrError> {
        let missing = if self.ticket_id.trim().is_empty() {
            Some("ticketId")
        } else if self.event_id <= 0 {
            Some("eventId")
        } else if self.user_id <= 0 {
            Some("userId")
        } else if self.quantity <= 0 {
            Some("quantity")
        } else if self.issued_at <= 0 {
            Some("issuedAt")
        } else {
            None
        };
        match missing {
            Some(field) => Err(QrError::Malformed(format!("missing {field}"))),
            None => Ok(()),
        }
    }
}

/// Signs a payload into a token.
///
/// # Errors
///
/// Returns [`QrError::Encode`] if the payload cannot be serialized.
pub fn sign(secret: &SigningSecret, payload: &QrPayload) -> Result<String, QrError> {
    let json = serde_json::to_vec(payload).map_err(|e| QrError::Encode(e.to_string()))?;
    let signature = secret.sign_bytes(&json)?;
    Ok(format!("{}.{signature}", URL_SAFE_NO_PAD.encode(&json)))
}

/// Verifies a token and returns its payload.
///
/// # Errors
///
/// - [`QrError::Malformed`] if the token shape, encoding, JSON or required
///   fields are wrong
/// - [`QrError::BadSignature`] if the signature does not match
pub fn verify(secret: &SigningSecret, token: &str) -> Result<QrPayload, QrError> {
    let (encoded, signature) = split_token(token)?;
    let json = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| QrError::Malformed(e.to_string()))?;

    let expected = secret.sign_bytes(&json)?;
    let presented = signature.to_ascii_lowercase();
    if !constant_time_eq::constant_time_eq(expected.as_bytes(), presented.as_bytes()) {
        return Err(QrError::BadSignature);
    }

    let payload: QrPayload =
        serde_json::from_slice(&json).map_err(|e| QrError::Malformed(e.to_string()))?;
    payload.check_required()?;
    Ok(payload)
}

fn split_token(token: &str) -> Result<(&str, &str), QrError> {
    let mut parts = token.trim().split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(encoded), Some(signature), None) if !encoded.is_empty() && !signature.is_empty() => {
            Ok((encoded, signature))
        }
        _ => Err(QrError::Malformed("expected <payload>.<signature>".to_string())),
    }
}

/// Hex SHA-256 of a full token, stored next to the ticket.
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Generates a URL-safe random nonce of at least [`MIN_NONCE_BYTES`] bytes.
#[must_use]
pub fn new_nonce(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes.max(MIN_NONCE_BYTES)];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secret() -> SigningSecret {
        SigningSecret::new("test-secret").unwrap()
    }

    fn payload() -> QrPayload {
        QrPayload {
            ticket_id: "3f2b8c1e-0000-4000-8000-000000000001".to_string(),
            event_id: 42,
            user_id: 7,
            ticket_type: "GROUP2".to_string(),
            quantity: 2,
            nonce: new_nonce(16),
            issued_at: 1_735_689_600,
        }
    }

    #[test]
    fn blank_secret_is_rejected() {
        assert_eq!(SigningSecret::new("   ").err(), Some(QrError::MissingSecret));
        assert!(!format!("{:?}", secret()).contains("test-secret"));
    }

    #[test]
    fn signed_token_verifies() {
        let payload = payload();
        let token = sign(&secret(), &payload).unwrap();
        assert_eq!(verify(&secret(), &token).unwrap(), payload);
    }

    #[test]
    fn uppercase_signature_is_accepted() {
        let token = sign(&secret(), &payload()).unwrap();
        let (encoded, signature) = token.split_once('.').unwrap();
        let shouted = format!("{encoded}.{}", signature.to_ascii_uppercase());
        assert!(verify(&secret(), &shouted).is_ok());
    }

    #[test]
    fn tampered_signature_is_a_bad_signature() {
        let mut token = sign(&secret(), &payload()).unwrap();
        let last = token.pop().unwrap();
        token.push(if last == '0' { '1' } else { '0' });
        assert_eq!(verify(&secret(), &token), Err(QrError::BadSignature));
    }

    #[test]
    fn other_secret_fails() {
        let token = sign(&secret(), &payload()).unwrap();
        let other = SigningSecret::new("other").unwrap();
        assert_eq!(verify(&other, &token), Err(QrError::BadSignature));
    }

    #[test]
    fn malformed_tokens_are_distinguished() {
        for token in ["", "abc", ".sig", "payload.", "a.b.c", "!!!.00"] {
            assert!(
                matches!(verify(&secret(), token), Err(QrError::Malformed(_))),
                "{token:?} should be malformed"
            );
        }
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let bad = QrPayload {
            quantity: 0,
            ..payload()
        };
        let token = sign(&secret(), &bad).unwrap();
        assert!(matches!(verify(&secret(), &token), Err(QrError::Malformed(_))));
    }

    #[test]
    fn nonce_has_minimum_entropy() {
        let nonce = new_nonce(4);
        assert_eq!(URL_SAFE_NO_PAD.decode(&nonce).unwrap().len(), MIN_NONCE_BYTES);
        assert_ne!(new_nonce(16), new_nonce(16));
    }

    #[test]
    fn token_hash_is_hex_sha256() {
        let hash = hash_token("abc");
        assert_eq!(hash, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    proptest! {
        #[test]
        fn round_trip(
            event_id in 1i64..1_000_000,
            user_id in 1i64..1_000_000,
            quantity in 1i64..=10,
            issued_at in 1i64..4_000_000_000,
        ) {
            let payload = QrPayload { event_id, user_id, quantity, issued_at, ..payload() };
            let token = sign(&secret(), &payload).unwrap();
            prop_assert_eq!(verify(&secret(), &token).unwrap(), payload);
        }

        #[test]
        fn any_single_character_flip_fails(index in 0usize..512) {
            let token = sign(&secret(), &payload()).unwrap();
            let index = index % token.len();
            let original = token.as_bytes()[index];
            // Replacement must differ even after the verifier lowercases hex.
            let replacement = if original.eq_ignore_ascii_case(&b'x') { 'y' } else { 'x' };
            let mut tampered = token.clone();
            tampered.replace_range(index..=index, &replacement.to_string());
            prop_assert!(verify(&secret(), &tampered).is_err());
        }
    }
}
