//! A JSON API for personal bookkeeping.
//!
//! The API tracks ledger transactions grouped into income and expense
//! categories, and recurring transaction templates that generate ledger
//! entries on a weekly, monthly or yearly schedule.
//!
//! [build_router] wires up the routes, [AppConfig] holds the shared state
//! (database connection and token keys), and the `db` module owns all SQL
//! including the schedule generation logic.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use axum_server::Handle;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use tokio::signal;

use crate::{
    auth::Claims,
    db::{DbError, Insert, SelectBy},
    models::{
        Balance, Category, CategoryKind, CategoryName, DatabaseID, NewCategory, NewTransaction,
        NewUser, PasswordHash, RawPassword, Transaction, User,
    },
};

pub use config::AppConfig;

pub mod auth;
mod config;
pub mod db;
pub mod models;
pub mod recurring;

/// Return a router with all the app's routes.
pub fn build_router() -> Router<AppConfig> {
    Router::new()
        .route("/", get(|| async { StatusCode::IM_A_TEAPOT }))
        .route("/user", post(create_user))
        .route("/sign_in", post(auth::sign_in))
        .route("/category", get(get_categories).post(create_category))
        .route(
            "/category/:category_id",
            put(update_category).delete(delete_category),
        )
        .route(
            "/transaction",
            get(get_transactions).post(create_transaction),
        )
        .route("/transaction/balance", get(get_balance))
        .route(
            "/recurring",
            get(recurring::get_recurring).post(recurring::create_recurring),
        )
        .route("/recurring/due", get(recurring::get_due_recurring))
        .route("/recurring/generate_due", post(recurring::generate_due))
        .route(
            "/recurring/:recurring_id",
            put(recurring::update_recurring).delete(recurring::delete_recurring),
        )
        .route(
            "/recurring/:recurring_id/toggle",
            put(recurring::toggle_recurring),
        )
        .route(
            "/recurring/:recurring_id/generate",
            post(recurring::generate_one),
        )
}

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

pub(crate) enum AppError {
    /// The request was well-formed JSON but a field failed validation.
    Validation(String),
    /// The requested resource was not found. The client should check that the parameters (e.g., ID) are correct and that the resource has been created.
    NotFound,
    /// The request targeted a paused recurring transaction.
    InactiveTemplate,
    /// An error occurred in a third-party library.
    InternalError,
    /// An error occurred while accessing the application's database.
    DatabaseError(DbError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(description) => (StatusCode::BAD_REQUEST, description),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "The requested resource could not be found.".to_string(),
            ),
            AppError::InactiveTemplate => (
                StatusCode::PRECONDITION_FAILED,
                "The recurring transaction is paused.".to_string(),
            ),
            // The details were already logged, clients only see an opaque message.
            AppError::InternalError | AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        match e {
            // A dangling category reference gets the same response as a
            // missing resource so that IDs cannot be probed.
            DbError::NotFound | DbError::InvalidForeignKey => AppError::NotFound,
            e => {
                tracing::error!("{e:?}");
                AppError::DatabaseError(e)
            }
        }
    }
}

/// Look up the user the bearer token was issued for.
pub(crate) fn current_user(claims: &Claims, connection: &Connection) -> Result<User, AppError> {
    User::select(&claims.email, connection).map_err(AppError::from)
}

#[derive(Deserialize)]
struct CreateUserRequest {
    email: email_address::EmailAddress,
    password: String,
}

/// A route handler for registering a new user.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
async fn create_user(
    State(state): State<AppConfig>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let raw_password = RawPassword::new(request.password)
        .map_err(|_| AppError::Validation("Passwords must be at least 14 characters long.".to_string()))?;

    let password_hash = PasswordHash::new(raw_password).map_err(|e| {
        tracing::error!("Error hashing password: {e:?}");
        AppError::InternalError
    })?;

    let user = NewUser {
        email: request.email,
        password_hash,
    }
    .insert(&state.db_connection().lock().unwrap())
    .map_err(|e| match e {
        DbError::DuplicateEmail => {
            AppError::Validation("The email address is already in use.".to_string())
        }
        e => AppError::from(e),
    })?;

    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Deserialize)]
struct CategoryRequest {
    name: String,
    kind: CategoryKind,
    color: String,
    icon: String,
}

impl CategoryRequest {
    fn into_new_category(self) -> Result<NewCategory, AppError> {
        let name = CategoryName::new(self.name)
            .map_err(|_| AppError::Validation("Category names must not be empty.".to_string()))?;

        Ok(NewCategory {
            name,
            kind: self.kind,
            color: self.color,
            icon: self.icon,
        })
    }
}

/// A route handler for listing all categories.
///
/// Categories are shared between users, so the caller only needs a valid
/// token.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
async fn get_categories(
    State(state): State<AppConfig>,
    _claims: Claims,
) -> Result<Json<Vec<Category>>, AppError> {
    let connection_mutex = state.db_connection();
    let connection = connection_mutex.lock().unwrap();

    db::select_all_categories(&connection).map(Json).map_err(AppError::from)
}

/// A route handler for creating a new category.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
async fn create_category(
    State(state): State<AppConfig>,
    _claims: Claims,
    Json(request): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let new_category = request.into_new_category()?;

    let connection_mutex = state.db_connection();
    let connection = connection_mutex.lock().unwrap();

    let category = new_category.insert(&connection)?;

    Ok((StatusCode::CREATED, Json(category)))
}

/// A route handler for replacing the fields of a category.
///
/// This function will return the status code 404 if the category does not exist.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
async fn update_category(
    State(state): State<AppConfig>,
    _claims: Claims,
    Path(category_id): Path<DatabaseID>,
    Json(request): Json<CategoryRequest>,
) -> Result<Json<Category>, AppError> {
    let update = request.into_new_category()?;

    let connection_mutex = state.db_connection();
    let connection = connection_mutex.lock().unwrap();

    let category = db::update_category(category_id, update, &connection)?;

    Ok(Json(category))
}

/// A route handler for deleting a category.
///
/// This function will return the status code 404 if the category does not exist.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
async fn delete_category(
    State(state): State<AppConfig>,
    _claims: Claims,
    Path(category_id): Path<DatabaseID>,
) -> Result<StatusCode, AppError> {
    let connection_mutex = state.db_connection();
    let connection = connection_mutex.lock().unwrap();

    db::delete_category(category_id, &connection)?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct CreateTransactionRequest {
    amount: f64,
    date: chrono::NaiveDate,
    description: String,
    category_id: DatabaseID,
}

/// A route handler for listing the caller's transactions, newest first.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
async fn get_transactions(
    State(state): State<AppConfig>,
    claims: Claims,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let connection_mutex = state.db_connection();
    let connection = connection_mutex.lock().unwrap();

    let user = current_user(&claims, &connection)?;

    Transaction::select(user.id(), &connection)
        .map(Json)
        .map_err(AppError::from)
}

/// A route handler for creating a new transaction.
///
/// This function will return the status code 404 if `category_id` does not
/// refer to a valid category.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
async fn create_transaction(
    State(state): State<AppConfig>,
    claims: Claims,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    if request.description.is_empty() {
        return Err(AppError::Validation(
            "Transaction descriptions must not be empty.".to_string(),
        ));
    }

    let connection_mutex = state.db_connection();
    let connection = connection_mutex.lock().unwrap();

    let user = current_user(&claims, &connection)?;

    let transaction = NewTransaction {
        amount: request.amount,
        date: request.date,
        description: request.description,
        category_id: request.category_id,
        user_id: user.id(),
    }
    .insert(&connection)?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

/// A route handler for summarising the caller's income, expenses and balance.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
async fn get_balance(
    State(state): State<AppConfig>,
    claims: Claims,
) -> Result<Json<Balance>, AppError> {
    let connection_mutex = state.db_connection();
    let connection = connection_mutex.lock().unwrap();

    let user = current_user(&claims, &connection)?;

    db::select_balance_by_user(user.id(), &connection)
        .map(Json)
        .map_err(AppError::from)
}
