//! API key generation and hashing
//!
//! All of the pure, side-effect-free half of the key lifecycle lives
//! here: secret generation, digesting, prefix extraction, format and
//! expiration checks, rotation.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::domain::api_key::{
    is_valid_secret_format, DISPLAY_PREFIX_LENGTH, SECRET_PREFIX,
};

/// Number of random alphanumeric characters after the `fsk_` marker.
const SECRET_BODY_LENGTH: usize = 40;

/// Result of generating a new API key
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    /// The full secret (shown to the owner exactly once)
    pub secret: String,
    /// The 12-character display prefix
    pub prefix: String,
    /// SHA-256 digest of the secret, stored in place of it
    pub hash: String,
}

/// Generator for FinSight API keys
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prefix: String,
    body_length: usize,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self {
            prefix: SECRET_PREFIX.to_string(),
            body_length: SECRET_BODY_LENGTH,
        }
    }

    /// Generate a new secret with its derived prefix and hash.
    ///
    /// The body is drawn from the thread-local CSPRNG; `rand` aborts on
    /// entropy failure rather than degrading to a weak source.
    pub fn generate(&self) -> GeneratedKey {
        let body: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.body_length)
            .map(char::from)
            .collect();

        let secret = format!("{}{}", self.prefix, body);
        let prefix = Self::extract_prefix(&secret).to_string();
        let hash = Self::hash_secret(&secret);

        GeneratedKey {
            secret,
            prefix,
            hash,
        }
    }

    /// Derive prefix and hash from a known secret.
    ///
    /// Used for bootstrap (an operator-provided admin key) and for
    /// deterministic integration tests; normal creation goes through
    /// [`Self::generate`].
    pub fn from_secret(&self, secret: &str) -> GeneratedKey {
        GeneratedKey {
            secret: secret.to_string(),
            prefix: Self::extract_prefix(secret).to_string(),
            hash: Self::hash_secret(secret),
        }
    }

    /// Generate a replacement secret, enforced different from the old
    /// one. Random generation makes a collision negligible, but the
    /// contract is checked rather than assumed.
    pub fn rotate(&self, old_secret: &str) -> GeneratedKey {
        loop {
            let generated = self.generate();
            if generated.secret != old_secret {
                return generated;
            }
        }
    }

    /// SHA-256 digest of a secret, as 64 lowercase hex characters.
    pub fn hash_secret(secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Verify a presented secret against a stored digest without
    /// leaking timing.
    pub fn verify_secret(secret: &str, stored_hash: &str) -> bool {
        constant_time_compare(&Self::hash_secret(secret), stored_hash)
    }

    /// First 12 characters of a secret, verbatim. Shorter input comes
    /// back unchanged - this is display identification, not a security
    /// boundary.
    pub fn extract_prefix(secret: &str) -> &str {
        match secret.char_indices().nth(DISPLAY_PREFIX_LENGTH) {
            Some((idx, _)) => &secret[..idx],
            None => secret,
        }
    }

    /// Shape check for presented secrets; see
    /// [`is_valid_secret_format`].
    pub fn is_valid_format(secret: &str) -> bool {
        is_valid_secret_format(secret)
    }

    /// Expired iff `expires_at` is at or before `now` - a timestamp
    /// exactly equal to now counts as expired. `None` never expires.
    pub fn is_expired_at(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        matches!(expires_at, Some(t) if t <= now)
    }

    pub fn is_expired(expires_at: Option<DateTime<Utc>>) -> bool {
        Self::is_expired_at(expires_at, Utc::now())
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;

    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashSet;

    #[test]
    fn test_generated_secret_shape() {
        let generated = KeyGenerator::new().generate();

        assert!(generated.secret.starts_with("fsk_"));
        assert!(generated.secret.len() >= 40);
        assert_eq!(generated.prefix, &generated.secret[..12]);
        assert!(KeyGenerator::is_valid_format(&generated.secret));
    }

    #[test]
    fn test_generated_secrets_unique() {
        let generator = KeyGenerator::new();
        let secrets: HashSet<String> =
            (0..100).map(|_| generator.generate().secret).collect();

        assert_eq!(secrets.len(), 100);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let secret = "fsk_test_key_12345";
        assert_eq!(
            KeyGenerator::hash_secret(secret),
            KeyGenerator::hash_secret(secret)
        );
    }

    #[test]
    fn test_hash_shape() {
        let hash = KeyGenerator::hash_secret("fsk_test_key_12345");

        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_distinct_secrets_hash_differently() {
        let generator = KeyGenerator::new();
        let hashes: HashSet<String> =
            (0..100).map(|_| generator.generate().hash).collect();

        assert_eq!(hashes.len(), 100);
    }

    #[test]
    fn test_hash_never_contains_secret() {
        let generated = KeyGenerator::new().generate();
        assert!(!generated.hash.contains(&generated.secret));
        assert_ne!(generated.hash, generated.secret);
    }

    #[test]
    fn test_verify_secret() {
        let generated = KeyGenerator::new().generate();

        assert!(KeyGenerator::verify_secret(&generated.secret, &generated.hash));
        assert!(!KeyGenerator::verify_secret("fsk_wrong_secret", &generated.hash));
    }

    #[test]
    fn test_extract_prefix_long_secret() {
        let secret = format!("fsk_{}", "a".repeat(40));
        let prefix = KeyGenerator::extract_prefix(&secret);

        assert_eq!(prefix.len(), 12);
        assert_eq!(prefix, "fsk_aaaaaaaa");
    }

    #[test]
    fn test_extract_prefix_short_input_unchanged() {
        assert_eq!(KeyGenerator::extract_prefix("fsk_abc"), "fsk_abc");
        assert_eq!(KeyGenerator::extract_prefix(""), "");
    }

    #[test]
    fn test_expiration_closed_interval() {
        let now = Utc::now();

        assert!(KeyGenerator::is_expired_at(Some(now), now));
        assert!(KeyGenerator::is_expired_at(
            Some(now - Duration::seconds(1)),
            now
        ));
        assert!(!KeyGenerator::is_expired_at(
            Some(now + Duration::seconds(1)),
            now
        ));
        assert!(!KeyGenerator::is_expired_at(None, now));
    }

    #[test]
    fn test_rotation_produces_different_secret() {
        let generator = KeyGenerator::new();
        let old = generator.generate();

        for _ in 0..20 {
            let rotated = generator.rotate(&old.secret);
            assert_ne!(rotated.secret, old.secret);
            assert!(KeyGenerator::is_valid_format(&rotated.secret));
        }
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }
}
