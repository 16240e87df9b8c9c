use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{DatabaseID, UserID};

/// An expense or income, i.e. an event where money was either spent or earned.
///
/// Transactions are created directly by a user or generated from a recurring
/// transaction template; once created they are never mutated by the
/// generation machinery.
///
/// New instances should be created through `NewTransaction::insert(...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    id: DatabaseID,
    amount: f64,
    date: NaiveDate,
    description: String,
    category_id: DatabaseID,
    user_id: UserID,
}

impl Transaction {
    /// Create a new `Transaction`.
    ///
    /// Note that this does *not* add the transaction to the application database.
    pub fn new(
        id: DatabaseID,
        amount: f64,
        date: NaiveDate,
        description: String,
        category_id: DatabaseID,
        user_id: UserID,
    ) -> Self {
        Self {
            id,
            amount,
            date,
            description,
            category_id,
            user_id,
        }
    }

    pub fn id(&self) -> DatabaseID {
        self.id
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn date(&self) -> &NaiveDate {
        &self.date
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category_id(&self) -> DatabaseID {
        self.category_id
    }

    pub fn user_id(&self) -> UserID {
        self.user_id
    }
}

/// The data for creating a new transaction.
#[derive(Debug, Deserialize, Serialize)]
pub struct NewTransaction {
    pub amount: f64,
    pub date: NaiveDate,
    pub description: String,
    pub category_id: DatabaseID,
    pub user_id: UserID,
}

/// A summary of a user's ledger: total income, total expenses, and the
/// difference between the two, each rounded to cents.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub income: f64,
    pub expense: f64,
    pub balance: f64,
}
