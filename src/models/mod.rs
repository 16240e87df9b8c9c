//! The domain types for the bookkeeping API.
//!
//! Types prefixed with `New` hold validated data for records that have not
//! been inserted into the database yet; the unprefixed types always come from
//! the database and carry a row ID.

use serde::{Deserialize, Serialize};

mod category;
mod password;
mod recurring;
mod transaction;
mod user;

pub use category::{
    Category, CategoryKind, CategoryKindError, CategoryName, CategoryNameError, NewCategory,
};
pub use password::{PasswordError, PasswordHash, RawPassword};
pub use recurring::{Frequency, NewRecurringTransaction, RecurringTransaction};
pub use transaction::{Balance, NewTransaction, Transaction};
pub use user::{NewUser, User};

/// Alias for the integer type used for database row IDs.
pub type DatabaseID = i64;

/// The ID of a registered user.
///
/// A distinct type is used here to avoid mixing up user IDs with the IDs of
/// the records they own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserID(i64);

impl UserID {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }
}
