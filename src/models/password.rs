use std::fmt::Display;

use bcrypt::{hash, verify, BcryptError, DEFAULT_COST};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0} is not a valid password")]
pub struct PasswordError(pub String);

/// A bcrypt-hashed password, ready to be stored or compared against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Create a hashed password from a validated password.
    ///
    /// # Errors
    ///
    /// This function will return an error if the password could not be hashed.
    pub fn new(raw_password: RawPassword) -> Result<Self, PasswordError> {
        match hash(&raw_password, DEFAULT_COST) {
            Ok(password_hash) => Ok(Self(password_hash)),
            Err(_) => Err(PasswordError(raw_password.into_string())),
        }
    }

    /// Create a new `PasswordHash` without any validation.
    ///
    /// This should only be called on strings coming out of a trusted source
    /// such as the application's database.
    ///
    /// This function has `_unchecked` in the name but is not `unsafe`, because if an invalid hash is provided it will cause incorrect behaviour but not affect memory safety.
    pub fn new_unchecked(raw_password_hash: String) -> Self {
        Self(raw_password_hash)
    }

    /// Check that `raw_password` matches the stored password.
    pub fn verify(&self, raw_password: &RawPassword) -> Result<bool, BcryptError> {
        verify(raw_password, &self.0)
    }
}

impl Display for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PasswordHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A password that has been validated, but not yet hashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPassword(String);

impl RawPassword {
    /// Create a new password from a string.
    ///
    /// # Errors
    ///
    /// This function will return an error if the password is less than 14 characters long.
    pub fn new(raw_password_string: String) -> Result<Self, PasswordError> {
        if raw_password_string.chars().count() < 14 {
            Err(PasswordError(raw_password_string))
        } else {
            Ok(Self(raw_password_string))
        }
    }

    /// Create a new `RawPassword` without any validation.
    ///
    /// This is intended for strings coming out of a trusted source, or for
    /// tests where costly validation is unnecessary.
    ///
    /// This function has `_unchecked` in the name but is not `unsafe`, because if the length invariant is violated it will cause incorrect behaviour but not affect memory safety.
    pub fn new_unchecked(raw_password_string: String) -> Self {
        Self(raw_password_string)
    }

    fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for RawPassword {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<[u8]> for RawPassword {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

#[cfg(test)]
mod password_hash_tests {
    use crate::models::{PasswordHash, RawPassword};

    #[test]
    fn verify_password_succeeds_for_valid_password() {
        let hash = PasswordHash::new_unchecked(
            "$2b$12$Gwf0uvxH3L7JLfo0CC/NCOoijK2vQ/wbgP.LeNup8vj6gg31IiFkm".to_owned(),
        );
        let password = RawPassword::new_unchecked("okon".to_owned());

        assert!(hash.verify(&password).unwrap());
    }

    #[test]
    fn verify_password_fails_for_invalid_password() {
        let hash = PasswordHash::new_unchecked(
            "$2b$12$Gwf0uvxH3L7JLfo0CC/NCOoijK2vQ/wbgP.LeNup8vj6gg31IiFkm".to_owned(),
        );
        let password = RawPassword::new_unchecked("thewrongpassword".to_owned());

        assert!(!hash.verify(&password).unwrap());
    }

    #[test]
    fn hash_password_produces_verifiable_hash() {
        let password = RawPassword::new("password123456".to_owned()).unwrap();
        let wrong_password = RawPassword::new("the_wrong_password".to_owned()).unwrap();
        let hash = PasswordHash::new(password.clone()).unwrap();

        assert!(hash.verify(&password).unwrap());
        assert!(!hash.verify(&wrong_password).unwrap());
    }
}
