use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::{DatabaseID, UserID};

/// How often a recurring transaction template spawns a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    /// A calendar month of variable length.
    Monthly,
    Yearly,
}

impl Frequency {
    /// Advance `date` by one period.
    ///
    /// This function is pure: the same date and frequency always produce the
    /// same result.
    ///
    /// Month and year arithmetic clamps to the last valid day of the target
    /// month rather than rolling over: Jan 31 + 1 month is Feb 28 (Feb 29 in
    /// a leap year), and Feb 29 + 1 year is Feb 28.
    pub fn advance(self, date: NaiveDate) -> NaiveDate {
        match self {
            Frequency::Weekly => date + Days::new(7),
            Frequency::Monthly => date + Months::new(1),
            Frequency::Yearly => date + Months::new(12),
        }
    }

    /// Parse a frequency tag coming out of the database.
    ///
    /// Unrecognized tags fall back to monthly so that a template with a
    /// mangled frequency column keeps a usable schedule instead of wedging
    /// the due scan. Tags arriving through the API are validated strictly by
    /// serde and never reach this fallback.
    pub fn parse_lenient(tag: &str) -> Self {
        match tag {
            "weekly" => Frequency::Weekly,
            "yearly" => Frequency::Yearly,
            _ => Frequency::Monthly,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }
}

/// A template that periodically spawns [Transaction](crate::models::Transaction)s,
/// e.g. rent, a salary, or a subscription.
///
/// The `next_due` field is always the next date at or after which a
/// transaction should be generated while the template is active. A successful
/// generation advances `next_due` by one period and records the date that was
/// just processed in `last_generated`.
///
/// New instances should be created through `NewRecurringTransaction::insert(...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringTransaction {
    id: DatabaseID,
    description: String,
    amount: f64,
    category_id: DatabaseID,
    user_id: UserID,
    frequency: Frequency,
    start_date: NaiveDate,
    next_due: NaiveDate,
    last_generated: Option<NaiveDate>,
    is_active: bool,
}

impl RecurringTransaction {
    /// Create a new `RecurringTransaction`.
    ///
    /// Note that this does *not* add the template to the application database.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: DatabaseID,
        description: String,
        amount: f64,
        category_id: DatabaseID,
        user_id: UserID,
        frequency: Frequency,
        start_date: NaiveDate,
        next_due: NaiveDate,
        last_generated: Option<NaiveDate>,
        is_active: bool,
    ) -> Self {
        Self {
            id,
            description,
            amount,
            category_id,
            user_id,
            frequency,
            start_date,
            next_due,
            last_generated,
            is_active,
        }
    }

    pub fn id(&self) -> DatabaseID {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn category_id(&self) -> DatabaseID {
        self.category_id
    }

    pub fn user_id(&self) -> UserID {
        self.user_id
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn start_date(&self) -> &NaiveDate {
        &self.start_date
    }

    /// The next date at or after which a transaction should be generated.
    pub fn next_due(&self) -> &NaiveDate {
        &self.next_due
    }

    /// The due date that was most recently turned into a transaction, or
    /// `None` if the template has never generated one.
    pub fn last_generated(&self) -> Option<&NaiveDate> {
        self.last_generated.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }
}

/// The data for creating a new recurring transaction template.
#[derive(Debug, Deserialize, Serialize)]
pub struct NewRecurringTransaction {
    pub description: String,
    pub amount: f64,
    pub category_id: DatabaseID,
    pub user_id: UserID,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
}

impl NewRecurringTransaction {
    /// The first due date of the template: the frequency applied once to the
    /// start date.
    pub fn first_due(&self) -> NaiveDate {
        self.frequency.advance(self.start_date)
    }
}
