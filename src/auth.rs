//! Credential hashing
//!
//! Stored credentials have the form `salt$hex(sha256(salt || password))`.
//! Callers only ever hand plaintext to a [`CredentialVerifier`]; nothing
//! else in the crate compares passwords.

use sha2::{Digest, Sha256};
use uuid::Uuid;

pub trait CredentialVerifier: Send + Sync {
    /// Produce the value to store for a new password
    fn hash(&self, plaintext: &str) -> String;

    /// Check a login attempt against a stored value
    fn verify(&self, plaintext: &str, stored: &str) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SaltedSha256;

impl SaltedSha256 {
    fn digest(salt: &str, plaintext: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(plaintext.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

impl CredentialVerifier for SaltedSha256 {
    fn hash(&self, plaintext: &str) -> String {
        let salt = Uuid::new_v4().simple().to_string();
        let digest = Self::digest(&salt, plaintext);
        format!("{}${}", salt, digest)
    }

    fn verify(&self, plaintext: &str, stored: &str) -> bool {
        let Some((salt, expected)) = stored.split_once('$') else {
            return false;
        };
        let actual = Self::digest(salt, plaintext);
        // constant-time compare
        actual.len() == expected.len()
            && actual
                .bytes()
                .zip(expected.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let verifier = SaltedSha256;
        let stored = verifier.hash("hunter2");
        assert!(!stored.contains("hunter2"));
        assert!(verifier.verify("hunter2", &stored));
        assert!(!verifier.verify("hunter3", &stored));
    }

    #[test]
    fn test_same_password_gets_different_salts() {
        let verifier = SaltedSha256;
        assert_ne!(verifier.hash("pw"), verifier.hash("pw"));
    }

    #[test]
    fn test_malformed_stored_value_never_verifies() {
        let verifier = SaltedSha256;
        assert!(!verifier.verify("pw", "pw"));
        assert!(!verifier.verify("", ""));
    }
}
