//! Persistence for the bookkeeping API.
//!
//! Each model gets its schema through the [CreateTable] trait, is read out of
//! query rows through [MapRow], and is written through [Insert]. Lookups go
//! through [SelectBy], keyed by whatever field makes sense for the model.
//!
//! The recurring transaction operations that must be atomic (generating a
//! ledger entry while advancing the template's schedule, and batch
//! generation) are wrapped in an immediate-mode SQLite transaction here, so
//! callers never see a half-applied generation.

use std::fmt::Display;

use chrono::NaiveDate;
use email_address::EmailAddress;
use rusqlite::{Connection, Error, Row, Transaction as SqlTransaction, TransactionBehavior};

use crate::models::{
    Balance, Category, CategoryKind, CategoryName, DatabaseID, Frequency, NewCategory,
    NewRecurringTransaction, NewTransaction, NewUser, PasswordHash, RecurringTransaction,
    Transaction, User, UserID,
};

/// Errors originating from operations on the app's database.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DbError {
    /// The user's email already exists in the database. The client should try again with a different email address.
    DuplicateEmail,
    /// A query was given an ID that does not refer to a valid row in the referenced table. The client should check that the ids are valid.
    InvalidForeignKey,
    /// The row could not be found with the provided info (e.g., id). The client should try again with different parameters.
    NotFound,
    /// Wrapper for Sqlite errors not handled by the other enum entries.
    SqlError(Error),
}

impl Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SqlError(inner_error) => write!(f, "{:?}: {}", self, inner_error),
            other => write!(f, "{:?}", other),
        }
    }
}

impl From<Error> for DbError {
    fn from(error: Error) -> Self {
        match error {
            // Code 787 occurs when a FOREIGN KEY constraint failed.
            Error::SqliteFailure(error, Some(_)) if error.extended_code == 787 => {
                DbError::InvalidForeignKey
            }
            // Code 2067 occurs when a UNIQUE constraint failed.
            Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.contains("email") =>
            {
                DbError::DuplicateEmail
            }
            Error::QueryReturnedNoRows => DbError::NotFound,
            e => DbError::SqlError(e),
        }
    }
}

/// A trait for adding an object schema to a database.
pub trait CreateTable {
    /// Create a table for the model.
    ///
    /// # Errors
    /// Returns an error if the table already exists or if there is an SQL error.
    fn create_table(connection: &Connection) -> Result<(), DbError>;
}

/// A trait for mapping from a `rusqlite::Row` from a SQLite database to a concrete rust type.
pub trait MapRow {
    type ReturnType;

    /// Convert a row into a concrete type.
    ///
    /// **Note:** This function expects that the row object contains all the table columns in the order they were defined.
    ///
    /// # Errors
    /// Returns an error if a row item cannot be converted into the corresponding rust type, or if an invalid column index was used.
    fn map_row(row: &Row) -> Result<Self::ReturnType, Error> {
        Self::map_row_with_offset(row, 0)
    }

    /// Convert a row into a concrete type.
    ///
    /// The `offset` indicates which column the row should be read from.
    /// This is useful in cases where tables have been joined and you want to construct two different types from the one query.
    ///
    /// # Errors
    /// Returns an error if a row item cannot be converted into the corresponding rust type, or if an invalid column index was used.
    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self::ReturnType, Error>;
}

/// A trait for inserting a record into the application database.
pub trait Insert {
    type ResultType;

    /// Insert the object into the application database.
    ///
    /// # Errors
    ///
    /// This function will return an error if the insertion failed.
    fn insert(self, connection: &Connection) -> Result<Self::ResultType, DbError>;
}

/// A trait for retrieving records from the application database by a field of type `T`.
pub trait SelectBy<T> {
    type ResultType;

    /// Select records from the application database that match `field`.
    fn select(field: T, connection: &Connection) -> Result<Self::ResultType, DbError>;
}

impl CreateTable for User {
    fn create_table(connection: &Connection) -> Result<(), DbError> {
        connection.execute(
            "CREATE TABLE user (
                    id INTEGER PRIMARY KEY,
                    email TEXT UNIQUE NOT NULL,
                    password TEXT NOT NULL
                    )",
            (),
        )?;

        Ok(())
    }
}

impl MapRow for User {
    type ReturnType = Self;

    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self, Error> {
        let raw_id = row.get(offset)?;
        let raw_email: String = row.get(offset + 1)?;
        let raw_password_hash = row.get(offset + 2)?;

        let id = UserID::new(raw_id);
        let email = EmailAddress::new_unchecked(raw_email);
        let password_hash = PasswordHash::new_unchecked(raw_password_hash);

        Ok(Self::new(id, email, password_hash))
    }
}

impl Insert for NewUser {
    type ResultType = User;

    /// Create a new user in the database.
    ///
    /// # Errors
    /// This function will return an error if there was a problem executing the SQL query. This could be due to:
    /// - a syntax error in the SQL string, or
    /// - the email is already in use.
    fn insert(self, connection: &Connection) -> Result<Self::ResultType, DbError> {
        connection.execute(
            "INSERT INTO user (email, password) VALUES (?1, ?2)",
            (&self.email.to_string(), self.password_hash.to_string()),
        )?;

        let id = UserID::new(connection.last_insert_rowid());

        Ok(User::new(id, self.email, self.password_hash))
    }
}

impl SelectBy<&EmailAddress> for User {
    type ResultType = User;

    /// Get the user from the database that has the specified `email` address.
    ///
    /// # Errors
    /// This function will return [DbError::NotFound] if there is no user with
    /// the specified email, or [DbError::SqlError] for SQL related errors.
    fn select(email: &EmailAddress, connection: &Connection) -> Result<Self::ResultType, DbError> {
        connection
            .prepare("SELECT id, email, password FROM user WHERE email = :email")?
            .query_row(&[(":email", &email.to_string())], User::map_row)
            .map_err(|e| e.into())
    }
}

impl CreateTable for Category {
    fn create_table(connection: &Connection) -> Result<(), DbError> {
        connection.execute(
            "CREATE TABLE category (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                color TEXT NOT NULL,
                icon TEXT NOT NULL
                )",
            (),
        )?;

        Ok(())
    }
}

impl MapRow for Category {
    type ReturnType = Self;

    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self, Error> {
        let raw_kind: String = row.get(offset + 2)?;
        let kind = raw_kind.parse::<CategoryKind>().map_err(|e| {
            Error::FromSqlConversionFailure(offset + 2, rusqlite::types::Type::Text, Box::new(e))
        })?;

        let id = row.get(offset)?;
        let raw_name: String = row.get(offset + 1)?;
        let name = CategoryName::new_unchecked(raw_name);
        let color = row.get(offset + 3)?;
        let icon = row.get(offset + 4)?;

        Ok(Self::new(id, name, kind, color, icon))
    }
}

impl Insert for NewCategory {
    type ResultType = Category;

    /// Create a new category in the database.
    ///
    /// # Errors
    /// This function will return an error if there is an SQL error.
    fn insert(self, connection: &Connection) -> Result<Self::ResultType, DbError> {
        connection.execute(
            "INSERT INTO category (name, kind, color, icon) VALUES (?1, ?2, ?3, ?4)",
            (
                self.name.as_ref(),
                self.kind.as_str(),
                &self.color,
                &self.icon,
            ),
        )?;

        let category_id = connection.last_insert_rowid();

        Ok(Self::ResultType::new(
            category_id,
            self.name,
            self.kind,
            self.color,
            self.icon,
        ))
    }
}

impl SelectBy<DatabaseID> for Category {
    type ResultType = Self;

    /// Retrieve a category in the database by its `id`.
    ///
    /// # Errors
    /// This function will return an error if:
    /// - `id` does not refer to a valid category,
    /// - or there is some other SQL error.
    fn select(id: DatabaseID, connection: &Connection) -> Result<Self::ResultType, DbError> {
        let category = connection
            .prepare("SELECT id, name, kind, color, icon FROM category WHERE id = :id")?
            .query_row(&[(":id", &id)], Category::map_row)?;

        Ok(category)
    }
}

/// Retrieve all categories in the database.
///
/// Categories are shared between users, so there is no owner filter here.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn select_all_categories(connection: &Connection) -> Result<Vec<Category>, DbError> {
    connection
        .prepare("SELECT id, name, kind, color, icon FROM category ORDER BY id ASC")?
        .query_map((), Category::map_row)?
        .map(|maybe_category| maybe_category.map_err(DbError::SqlError))
        .collect()
}

/// Replace the fields of the category `id` with `update`.
///
/// # Errors
/// This function will return [DbError::NotFound] if `id` does not refer to a
/// valid category, or [DbError::SqlError] for SQL related errors.
pub fn update_category(
    id: DatabaseID,
    update: NewCategory,
    connection: &Connection,
) -> Result<Category, DbError> {
    let rows_updated = connection.execute(
        "UPDATE category SET name = ?1, kind = ?2, color = ?3, icon = ?4 WHERE id = ?5",
        (
            update.name.as_ref(),
            update.kind.as_str(),
            &update.color,
            &update.icon,
            id,
        ),
    )?;

    if rows_updated == 0 {
        return Err(DbError::NotFound);
    }

    Ok(Category::new(
        id,
        update.name,
        update.kind,
        update.color,
        update.icon,
    ))
}

/// Delete the category `id`.
///
/// Transactions that reference the category are left untouched.
///
/// # Errors
/// This function will return [DbError::NotFound] if `id` does not refer to a
/// valid category, or [DbError::SqlError] for SQL related errors.
pub fn delete_category(id: DatabaseID, connection: &Connection) -> Result<(), DbError> {
    let rows_deleted = connection.execute("DELETE FROM category WHERE id = ?1", [id])?;

    if rows_deleted == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

impl CreateTable for Transaction {
    fn create_table(connection: &Connection) -> Result<(), DbError> {
        connection.execute(
            "CREATE TABLE \"transaction\" (
                    id INTEGER PRIMARY KEY,
                    amount REAL NOT NULL,
                    date TEXT NOT NULL,
                    description TEXT NOT NULL,
                    category_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    FOREIGN KEY(category_id) REFERENCES category(id),
                    FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
                    )",
            (),
        )?;

        Ok(())
    }
}

impl MapRow for Transaction {
    type ReturnType = Self;

    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self, Error> {
        Ok(Self::new(
            row.get(offset)?,
            row.get(offset + 1)?,
            row.get(offset + 2)?,
            row.get(offset + 3)?,
            row.get(offset + 4)?,
            UserID::new(row.get(offset + 5)?),
        ))
    }
}

impl Insert for NewTransaction {
    type ResultType = Transaction;

    /// Create a new transaction in the database.
    ///
    /// # Errors
    /// This function will return an error if:
    /// - `category_id` does not refer to a valid category,
    /// - or there is some other SQL error.
    fn insert(self, connection: &Connection) -> Result<Self::ResultType, DbError> {
        // A 'not found' error does not make sense on an insert function,
        // so we instead indicate that the category id (a foreign key) is invalid.
        Category::select(self.category_id, connection).map_err(|e| match e {
            DbError::NotFound => DbError::InvalidForeignKey,
            e => e,
        })?;

        connection.execute(
            "INSERT INTO \"transaction\" (amount, date, description, category_id, user_id) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (
                self.amount,
                &self.date,
                &self.description,
                self.category_id,
                self.user_id.as_i64(),
            ),
        )?;

        let transaction_id = connection.last_insert_rowid();

        Ok(Self::ResultType::new(
            transaction_id,
            self.amount,
            self.date,
            self.description,
            self.category_id,
            self.user_id,
        ))
    }
}

impl SelectBy<DatabaseID> for Transaction {
    type ResultType = Self;

    /// Retrieve a transaction in the database by its `id`.
    ///
    /// # Errors
    /// This function will return an error if:
    /// - `id` does not refer to a valid transaction,
    /// - or there is some other SQL error.
    fn select(id: DatabaseID, connection: &Connection) -> Result<Self::ResultType, DbError> {
        let transaction = connection
            .prepare(
                "SELECT id, amount, date, description, category_id, user_id \
                 FROM \"transaction\" WHERE id = :id",
            )?
            .query_row(&[(":id", &id)], Transaction::map_row)?;

        Ok(transaction)
    }
}

impl SelectBy<UserID> for Transaction {
    type ResultType = Vec<Self>;

    /// Retrieve the transactions in the database that belong to `user_id`,
    /// newest first.
    ///
    /// # Errors
    /// This function will return an error if there is an SQL error.
    fn select(user_id: UserID, connection: &Connection) -> Result<Self::ResultType, DbError> {
        connection
            .prepare(
                "SELECT id, amount, date, description, category_id, user_id \
                 FROM \"transaction\" WHERE user_id = :user_id ORDER BY date DESC",
            )?
            .query_map(&[(":user_id", &user_id.as_i64())], Transaction::map_row)?
            .map(|maybe_transaction| maybe_transaction.map_err(DbError::SqlError))
            .collect()
    }
}

/// Total the income and expense transactions of `user_id`, rounded to cents.
///
/// Whether a transaction counts as income or expense is decided by the kind
/// of its category.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn select_balance_by_user(
    user_id: UserID,
    connection: &Connection,
) -> Result<Balance, DbError> {
    let (income, expense): (f64, f64) = connection
        .prepare(
            "SELECT
                COALESCE(SUM(CASE WHEN c.kind = 'income' THEN t.amount ELSE 0.0 END), 0.0),
                COALESCE(SUM(CASE WHEN c.kind = 'expense' THEN t.amount ELSE 0.0 END), 0.0)
             FROM \"transaction\" t
             INNER JOIN category c ON c.id = t.category_id
             WHERE t.user_id = :user_id",
        )?
        .query_row(&[(":user_id", &user_id.as_i64())], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;

    let income = round_to_cents(income);
    let expense = round_to_cents(expense);

    Ok(Balance {
        income,
        expense,
        balance: round_to_cents(income - expense),
    })
}

fn round_to_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

impl CreateTable for RecurringTransaction {
    fn create_table(connection: &Connection) -> Result<(), DbError> {
        connection.execute(
            "CREATE TABLE recurring_transaction (
                    id INTEGER PRIMARY KEY,
                    description TEXT NOT NULL,
                    amount REAL NOT NULL,
                    category_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    frequency TEXT NOT NULL,
                    start_date TEXT NOT NULL,
                    next_due TEXT NOT NULL,
                    last_generated TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    FOREIGN KEY(category_id) REFERENCES category(id),
                    FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
                    )",
            (),
        )?;

        Ok(())
    }
}

impl MapRow for RecurringTransaction {
    type ReturnType = Self;

    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self, Error> {
        let raw_frequency: String = row.get(offset + 5)?;

        Ok(Self::new(
            row.get(offset)?,
            row.get(offset + 1)?,
            row.get(offset + 2)?,
            row.get(offset + 3)?,
            UserID::new(row.get(offset + 4)?),
            Frequency::parse_lenient(&raw_frequency),
            row.get(offset + 6)?,
            row.get(offset + 7)?,
            row.get(offset + 8)?,
            row.get(offset + 9)?,
        ))
    }
}

impl Insert for NewRecurringTransaction {
    type ResultType = RecurringTransaction;

    /// Create a new recurring transaction template in the database.
    ///
    /// The template starts out active with `next_due` set to the frequency
    /// applied once to the start date, and no generated transactions.
    ///
    /// # Errors
    /// This function will return an error if:
    /// - `category_id` does not refer to a valid category,
    /// - or there is some other SQL error.
    fn insert(self, connection: &Connection) -> Result<Self::ResultType, DbError> {
        Category::select(self.category_id, connection).map_err(|e| match e {
            DbError::NotFound => DbError::InvalidForeignKey,
            e => e,
        })?;

        let next_due = self.first_due();

        connection.execute(
            "INSERT INTO recurring_transaction \
             (description, amount, category_id, user_id, frequency, start_date, next_due, is_active) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
            (
                &self.description,
                self.amount,
                self.category_id,
                self.user_id.as_i64(),
                self.frequency.as_str(),
                &self.start_date,
                &next_due,
            ),
        )?;

        let id = connection.last_insert_rowid();

        Ok(Self::ResultType::new(
            id,
            self.description,
            self.amount,
            self.category_id,
            self.user_id,
            self.frequency,
            self.start_date,
            next_due,
            None,
            true,
        ))
    }
}

const RECURRING_COLUMNS: &str = "id, description, amount, category_id, user_id, frequency, \
                                 start_date, next_due, last_generated, is_active";

impl SelectBy<(DatabaseID, UserID)> for RecurringTransaction {
    type ResultType = Self;

    /// Retrieve the recurring transaction template `id` belonging to `user_id`.
    ///
    /// # Errors
    /// This function will return [DbError::NotFound] if the template does not
    /// exist or belongs to a different user, or [DbError::SqlError] for SQL
    /// related errors.
    fn select(
        (id, user_id): (DatabaseID, UserID),
        connection: &Connection,
    ) -> Result<Self::ResultType, DbError> {
        let template = connection
            .prepare(&format!(
                "SELECT {RECURRING_COLUMNS} FROM recurring_transaction \
                 WHERE id = ?1 AND user_id = ?2"
            ))?
            .query_row((id, user_id.as_i64()), RecurringTransaction::map_row)?;

        Ok(template)
    }
}

impl SelectBy<UserID> for RecurringTransaction {
    type ResultType = Vec<Self>;

    /// Retrieve the recurring transaction templates of `user_id`, ordered by
    /// the soonest due first.
    ///
    /// # Errors
    /// This function will return an error if there is an SQL error.
    fn select(user_id: UserID, connection: &Connection) -> Result<Self::ResultType, DbError> {
        connection
            .prepare(&format!(
                "SELECT {RECURRING_COLUMNS} FROM recurring_transaction \
                 WHERE user_id = :user_id ORDER BY next_due ASC"
            ))?
            .query_map(
                &[(":user_id", &user_id.as_i64())],
                RecurringTransaction::map_row,
            )?
            .map(|maybe_template| maybe_template.map_err(DbError::SqlError))
            .collect()
    }
}

/// Retrieve the active templates of `user_id` that are due on or before
/// `cutoff`, ordered by the soonest due first.
///
/// This is a read-only scan: listing upcoming templates uses a cutoff some
/// days in the future, batch generation uses today as the cutoff.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn select_due_recurring(
    user_id: UserID,
    cutoff: NaiveDate,
    connection: &Connection,
) -> Result<Vec<RecurringTransaction>, DbError> {
    connection
        .prepare(&format!(
            "SELECT {RECURRING_COLUMNS} FROM recurring_transaction \
             WHERE user_id = ?1 AND is_active = 1 AND next_due <= ?2 \
             ORDER BY next_due ASC"
        ))?
        .query_map((user_id.as_i64(), cutoff), RecurringTransaction::map_row)?
        .map(|maybe_template| maybe_template.map_err(DbError::SqlError))
        .collect()
}

/// The replacement field values for [update_recurring_transaction].
#[derive(Debug)]
pub struct RecurringTransactionUpdate {
    pub description: String,
    pub amount: f64,
    pub category_id: DatabaseID,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub next_due: NaiveDate,
    pub is_active: bool,
}

/// Replace the fields of the template `id` belonging to `user_id`.
///
/// `last_generated` is left untouched: editing a template does not rewrite
/// its generation history.
///
/// # Errors
/// This function will return [DbError::NotFound] if the template does not
/// exist or belongs to a different user, or [DbError::SqlError] for SQL
/// related errors.
pub fn update_recurring_transaction(
    id: DatabaseID,
    user_id: UserID,
    update: RecurringTransactionUpdate,
    connection: &Connection,
) -> Result<RecurringTransaction, DbError> {
    let rows_updated = connection.execute(
        "UPDATE recurring_transaction \
         SET description = ?1, amount = ?2, category_id = ?3, frequency = ?4, \
             start_date = ?5, next_due = ?6, is_active = ?7 \
         WHERE id = ?8 AND user_id = ?9",
        (
            &update.description,
            update.amount,
            update.category_id,
            update.frequency.as_str(),
            &update.start_date,
            &update.next_due,
            update.is_active,
            id,
            user_id.as_i64(),
        ),
    )?;

    if rows_updated == 0 {
        return Err(DbError::NotFound);
    }

    RecurringTransaction::select((id, user_id), connection)
}

/// Flip the active flag of the template `id` belonging to `user_id`.
///
/// # Errors
/// This function will return [DbError::NotFound] if the template does not
/// exist or belongs to a different user, or [DbError::SqlError] for SQL
/// related errors.
pub fn toggle_recurring_transaction(
    id: DatabaseID,
    user_id: UserID,
    connection: &Connection,
) -> Result<RecurringTransaction, DbError> {
    let rows_updated = connection.execute(
        "UPDATE recurring_transaction SET is_active = NOT is_active \
         WHERE id = ?1 AND user_id = ?2",
        (id, user_id.as_i64()),
    )?;

    if rows_updated == 0 {
        return Err(DbError::NotFound);
    }

    RecurringTransaction::select((id, user_id), connection)
}

/// Delete the template `id` belonging to `user_id`.
///
/// Transactions the template generated previously are kept.
///
/// # Errors
/// This function will return [DbError::NotFound] if the template does not
/// exist or belongs to a different user, or [DbError::SqlError] for SQL
/// related errors.
pub fn delete_recurring_transaction(
    id: DatabaseID,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), DbError> {
    let rows_deleted = connection.execute(
        "DELETE FROM recurring_transaction WHERE id = ?1 AND user_id = ?2",
        (id, user_id.as_i64()),
    )?;

    if rows_deleted == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Materialize the next occurrence of `template` as a ledger transaction.
///
/// Inserts a transaction dated at the template's current due date, advances
/// `next_due` by one period, and records the processed date in
/// `last_generated`, as one atomic unit: either all three happen or none do.
///
/// Returns the new transaction and the template's new due date.
///
/// The caller is responsible for checking that the template is active.
///
/// # Errors
/// This function will return [DbError::NotFound] if the template's schedule
/// has moved since it was read (the occurrence was already generated
/// elsewhere); nothing is written in that case.
pub fn generate_transaction(
    template: &RecurringTransaction,
    connection: &Connection,
) -> Result<(Transaction, NaiveDate), DbError> {
    let sql_transaction =
        SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    let transaction = insert_generated(template, &sql_transaction)?;
    let new_next_due = advance_schedule(template, &sql_transaction)?;

    sql_transaction.commit()?;

    Ok((transaction, new_next_due))
}

/// Generate a ledger transaction for every active template of `user_id` that
/// is due today or earlier, and advance each template's schedule.
///
/// The scan and all generations run inside a single database transaction: if
/// any step fails the whole batch rolls back and no ledger entries are kept.
///
/// Returns the number of templates that generated a transaction. An empty due
/// set is a normal outcome and returns zero.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn generate_all_due(
    user_id: UserID,
    today: NaiveDate,
    connection: &Connection,
) -> Result<usize, DbError> {
    let sql_transaction =
        SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    let due_templates = select_due_recurring(user_id, today, &sql_transaction)?;

    for template in &due_templates {
        insert_generated(template, &sql_transaction)?;
        advance_schedule(template, &sql_transaction)?;
    }

    sql_transaction.commit()?;

    Ok(due_templates.len())
}

fn insert_generated(
    template: &RecurringTransaction,
    connection: &Connection,
) -> Result<Transaction, DbError> {
    let description = format!("{} (auto)", template.description());

    connection.execute(
        "INSERT INTO \"transaction\" (amount, date, description, category_id, user_id) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            template.amount(),
            template.next_due(),
            &description,
            template.category_id(),
            template.user_id().as_i64(),
        ),
    )?;

    let id = connection.last_insert_rowid();

    Ok(Transaction::new(
        id,
        template.amount(),
        *template.next_due(),
        description,
        template.category_id(),
        template.user_id(),
    ))
}

fn advance_schedule(
    template: &RecurringTransaction,
    connection: &Connection,
) -> Result<NaiveDate, DbError> {
    let new_next_due = template.frequency().advance(*template.next_due());

    // The next_due check means a schedule that was already advanced since
    // `template` was read is not advanced twice; at most one generation wins
    // per due occurrence.
    let rows_updated = connection.execute(
        "UPDATE recurring_transaction SET next_due = ?1, last_generated = ?2 \
         WHERE id = ?3 AND next_due = ?2",
        (&new_next_due, template.next_due(), template.id()),
    )?;

    if rows_updated == 0 {
        return Err(DbError::NotFound);
    }

    Ok(new_next_due)
}

/// Create the application's database schema.
///
/// # Errors
/// This function will return an error if any of the tables already exist or
/// if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), DbError> {
    let transaction =
        SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    User::create_table(&transaction)?;
    Category::create_table(&transaction)?;
    Transaction::create_table(&transaction)?;
    RecurringTransaction::create_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

/// Insert a starter set of categories if the category table is empty.
///
/// This is idempotent and safe to run on every deployment; it only writes to
/// a database that has never had categories. It is invoked explicitly by the
/// `init_db` binary rather than on server startup.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn seed_default_categories(connection: &Connection) -> Result<(), DbError> {
    let category_count: i64 =
        connection.query_row("SELECT COUNT(*) FROM category", (), |row| row.get(0))?;

    if category_count > 0 {
        return Ok(());
    }

    let defaults = [
        ("Food", "expense", "#FF6B6B", "🍔"),
        ("Transport", "expense", "#4ECDC4", "🚗"),
        ("Housing", "expense", "#45B7D1", "🏠"),
        ("Entertainment", "expense", "#96CEB4", "🎬"),
        ("Health", "expense", "#FFEAA7", "🏥"),
        ("Salary", "income", "#00B894", "💰"),
        ("Freelance", "income", "#6C5CE7", "💻"),
        ("Investments", "income", "#A29BFE", "📈"),
    ];

    let sql_transaction =
        SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    for (name, kind, color, icon) in defaults {
        sql_transaction.execute(
            "INSERT INTO category (name, kind, color, icon) VALUES (?1, ?2, ?3, ?4)",
            (name, kind, color, icon),
        )?;
    }

    sql_transaction.commit()?;

    Ok(())
}
