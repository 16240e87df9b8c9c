use email_address::EmailAddress;
use serde::{Deserialize, Serialize};

use crate::models::{PasswordHash, UserID};

/// A registered user of the application.
///
/// Every transaction and recurring transaction template is exclusively owned
/// by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    id: UserID,
    email: EmailAddress,
    password_hash: PasswordHash,
}

impl User {
    pub fn new(id: UserID, email: EmailAddress, password_hash: PasswordHash) -> Self {
        Self {
            id,
            email,
            password_hash,
        }
    }

    pub fn id(&self) -> UserID {
        self.id
    }

    pub fn email(&self) -> &EmailAddress {
        &self.email
    }

    pub fn password_hash(&self) -> &PasswordHash {
        &self.password_hash
    }
}

/// The data for creating a new user.
#[derive(Debug, Serialize, Deserialize)]
pub struct NewUser {
    pub email: EmailAddress,
    pub password_hash: PasswordHash,
}
