//! Route handlers for recurring transaction templates.
//!
//! A template describes a payment that repeats weekly, monthly or yearly.
//! Its `next_due` date tracks the next occurrence to generate, and the
//! generate endpoints turn due occurrences into ordinary ledger transactions
//! while advancing the schedule.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    auth::Claims,
    config::AppConfig,
    current_user,
    db::{self, Insert, RecurringTransactionUpdate, SelectBy},
    models::{
        Category, DatabaseID, Frequency, NewRecurringTransaction, RecurringTransaction,
        Transaction,
    },
    AppError,
};

#[derive(Deserialize)]
pub(crate) struct CreateRecurringRequest {
    description: String,
    amount: f64,
    category_id: DatabaseID,
    frequency: Frequency,
    start_date: NaiveDate,
}

#[derive(Deserialize)]
pub(crate) struct UpdateRecurringRequest {
    description: String,
    amount: f64,
    category_id: DatabaseID,
    frequency: Frequency,
    start_date: Option<NaiveDate>,
    is_active: Option<bool>,
}

/// How far ahead (in days) the due listing should look.
#[derive(Deserialize)]
pub(crate) struct DueQuery {
    #[serde(default = "default_due_window")]
    days: u64,
}

fn default_due_window() -> u64 {
    7
}

/// The result of generating a single occurrence: the new ledger transaction
/// and the template's updated due date.
#[derive(Serialize, Deserialize)]
pub struct GenerateResponse {
    pub transaction: Transaction,
    pub next_due: NaiveDate,
}

#[derive(Serialize, Deserialize)]
pub struct BatchGenerateResponse {
    pub generated: usize,
}

/// A route handler for listing the caller's templates, ordered by due date.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub(crate) async fn get_recurring(
    State(state): State<AppConfig>,
    claims: Claims,
) -> Result<Json<Vec<RecurringTransaction>>, AppError> {
    let connection_mutex = state.db_connection();
    let connection = connection_mutex.lock().unwrap();

    let user = current_user(&claims, &connection)?;

    RecurringTransaction::select(user.id(), &connection)
        .map(Json)
        .map_err(AppError::from)
}

/// A route handler for creating a new template.
///
/// The first due date is computed from the start date and frequency, so a
/// template never generates an occurrence on its start date itself.
///
/// This function will return the status code 404 if `category_id` does not
/// refer to a valid category.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub(crate) async fn create_recurring(
    State(state): State<AppConfig>,
    claims: Claims,
    Json(request): Json<CreateRecurringRequest>,
) -> Result<(StatusCode, Json<RecurringTransaction>), AppError> {
    if request.description.is_empty() {
        return Err(AppError::Validation(
            "Recurring transaction descriptions must not be empty.".to_string(),
        ));
    }

    let connection_mutex = state.db_connection();
    let connection = connection_mutex.lock().unwrap();

    let user = current_user(&claims, &connection)?;
    Category::select(request.category_id, &connection)?;

    let template = NewRecurringTransaction {
        description: request.description,
        amount: request.amount,
        category_id: request.category_id,
        user_id: user.id(),
        frequency: request.frequency,
        start_date: request.start_date,
    }
    .insert(&connection)?;

    Ok((StatusCode::CREATED, Json(template)))
}

/// A route handler for replacing the fields of a template.
///
/// The due date is recomputed only when the schedule itself (frequency or
/// start date) changes; edits to the description or amount leave it alone.
///
/// This function will return the status code 404 if the template does not
/// exist or belongs to a different user.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub(crate) async fn update_recurring(
    State(state): State<AppConfig>,
    claims: Claims,
    Path(recurring_id): Path<DatabaseID>,
    Json(request): Json<UpdateRecurringRequest>,
) -> Result<Json<RecurringTransaction>, AppError> {
    if request.description.is_empty() {
        return Err(AppError::Validation(
            "Recurring transaction descriptions must not be empty.".to_string(),
        ));
    }

    let connection_mutex = state.db_connection();
    let connection = connection_mutex.lock().unwrap();

    let user = current_user(&claims, &connection)?;
    let existing = RecurringTransaction::select((recurring_id, user.id()), &connection)?;
    Category::select(request.category_id, &connection)?;

    let start_date = request.start_date.unwrap_or(*existing.start_date());
    let next_due =
        if request.frequency != existing.frequency() || start_date != *existing.start_date() {
            request.frequency.advance(start_date)
        } else {
            *existing.next_due()
        };

    let template = db::update_recurring_transaction(
        recurring_id,
        user.id(),
        RecurringTransactionUpdate {
            description: request.description,
            amount: request.amount,
            category_id: request.category_id,
            frequency: request.frequency,
            start_date,
            next_due,
            is_active: request.is_active.unwrap_or(existing.is_active()),
        },
        &connection,
    )?;

    Ok(Json(template))
}

/// A route handler for deleting a template.
///
/// Transactions the template generated previously are kept.
///
/// This function will return the status code 404 if the template does not
/// exist or belongs to a different user.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub(crate) async fn delete_recurring(
    State(state): State<AppConfig>,
    claims: Claims,
    Path(recurring_id): Path<DatabaseID>,
) -> Result<StatusCode, AppError> {
    let connection_mutex = state.db_connection();
    let connection = connection_mutex.lock().unwrap();

    let user = current_user(&claims, &connection)?;
    db::delete_recurring_transaction(recurring_id, user.id(), &connection)?;

    Ok(StatusCode::NO_CONTENT)
}

/// A route handler for pausing or resuming a template.
///
/// This function will return the status code 404 if the template does not
/// exist or belongs to a different user.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub(crate) async fn toggle_recurring(
    State(state): State<AppConfig>,
    claims: Claims,
    Path(recurring_id): Path<DatabaseID>,
) -> Result<Json<RecurringTransaction>, AppError> {
    let connection_mutex = state.db_connection();
    let connection = connection_mutex.lock().unwrap();

    let user = current_user(&claims, &connection)?;

    db::toggle_recurring_transaction(recurring_id, user.id(), &connection)
        .map(Json)
        .map_err(AppError::from)
}

/// A route handler for listing the caller's templates that fall due within
/// the query's window (`?days=`, defaulting to seven days from today).
///
/// Paused templates are never listed.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub(crate) async fn get_due_recurring(
    State(state): State<AppConfig>,
    claims: Claims,
    Query(query): Query<DueQuery>,
) -> Result<Json<Vec<RecurringTransaction>>, AppError> {
    let cutoff = Utc::now()
        .date_naive()
        .checked_add_days(Days::new(query.days))
        .ok_or_else(|| AppError::Validation("The day window is too large.".to_string()))?;

    let connection_mutex = state.db_connection();
    let connection = connection_mutex.lock().unwrap();

    let user = current_user(&claims, &connection)?;

    db::select_due_recurring(user.id(), cutoff, &connection)
        .map(Json)
        .map_err(AppError::from)
}

/// A route handler for generating a single occurrence of a template.
///
/// On success the new ledger transaction is created and the template's
/// schedule advances by one period, both within one database transaction.
///
/// This function will return the status code 404 if the template does not
/// exist or belongs to a different user, and 412 if the template is paused.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub(crate) async fn generate_one(
    State(state): State<AppConfig>,
    claims: Claims,
    Path(recurring_id): Path<DatabaseID>,
) -> Result<(StatusCode, Json<GenerateResponse>), AppError> {
    let connection_mutex = state.db_connection();
    let connection = connection_mutex.lock().unwrap();

    let user = current_user(&claims, &connection)?;
    let template = RecurringTransaction::select((recurring_id, user.id()), &connection)?;

    if !template.is_active() {
        return Err(AppError::InactiveTemplate);
    }

    let (transaction, next_due) = db::generate_transaction(&template, &connection)?;

    Ok((
        StatusCode::CREATED,
        Json(GenerateResponse {
            transaction,
            next_due,
        }),
    ))
}

/// A route handler for generating every occurrence that is due today or
/// earlier, across all of the caller's active templates.
///
/// The whole batch runs in one database transaction: either every due
/// template generates its transaction or none do. An empty due set is a
/// normal outcome and reports zero.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub(crate) async fn generate_due(
    State(state): State<AppConfig>,
    claims: Claims,
) -> Result<Json<BatchGenerateResponse>, AppError> {
    let connection_mutex = state.db_connection();
    let connection = connection_mutex.lock().unwrap();

    let user = current_user(&claims, &connection)?;
    let generated = db::generate_all_due(user.id(), Utc::now().date_naive(), &connection)?;

    Ok(Json(BatchGenerateResponse { generated }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use chrono::{Days, NaiveDate, Utc};
    use serde_json::json;

    use crate::{
        models::{Category, Frequency, RecurringTransaction, Transaction},
        recurring::{BatchGenerateResponse, GenerateResponse},
        route_test_helpers::{create_app_with_user, create_app_with_user_and_category},
    };

    async fn create_template(
        server: &TestServer,
        token: &str,
        category: &Category,
        frequency: &str,
        start_date: NaiveDate,
    ) -> RecurringTransaction {
        let response = server
            .post("/recurring")
            .authorization_bearer(token)
            .content_type("application/json")
            .json(&json!({
                "description": "Rent",
                "amount": 1200.0,
                "category_id": category.id(),
                "frequency": frequency,
                "start_date": start_date,
            }))
            .await;

        response.assert_status(StatusCode::CREATED);

        response.json::<RecurringTransaction>()
    }

    async fn sign_up_second_user(server: &TestServer) -> String {
        let response = server
            .post("/user")
            .content_type("application/json")
            .json(&json!({
                "email": "test2@test.com",
                "password": "anotherverysecurepassword"
            }))
            .await;

        response.assert_status(StatusCode::CREATED);

        server
            .post("/sign_in")
            .content_type("application/json")
            .json(&json!({
                "email": "test2@test.com",
                "password": "anotherverysecurepassword"
            }))
            .await
            .json::<String>()
    }

    #[tokio::test]
    async fn create_recurring_computes_first_due_date() {
        let (server, user, token, category) = create_app_with_user_and_category().await;

        let start_date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let template = create_template(&server, &token, &category, "monthly", start_date).await;

        assert_eq!(template.user_id(), user.id());
        assert_eq!(template.frequency(), Frequency::Monthly);
        assert_eq!(*template.start_date(), start_date);
        assert_eq!(
            *template.next_due(),
            NaiveDate::from_ymd_opt(2024, 2, 15).unwrap()
        );
        assert_eq!(template.last_generated(), None);
        assert!(template.is_active());
    }

    #[tokio::test]
    async fn create_recurring_fails_on_empty_description() {
        let (server, _, token, category) = create_app_with_user_and_category().await;

        server
            .post("/recurring")
            .authorization_bearer(token)
            .content_type("application/json")
            .json(&json!({
                "description": "",
                "amount": 1200.0,
                "category_id": category.id(),
                "frequency": "monthly",
                "start_date": "2024-01-15",
            }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_recurring_fails_on_unknown_category() {
        let (server, _, token) = create_app_with_user().await;

        server
            .post("/recurring")
            .authorization_bearer(token)
            .content_type("application/json")
            .json(&json!({
                "description": "Rent",
                "amount": 1200.0,
                "category_id": 999,
                "frequency": "monthly",
                "start_date": "2024-01-15",
            }))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn create_recurring_fails_on_unknown_frequency() {
        let (server, _, token, category) = create_app_with_user_and_category().await;

        server
            .post("/recurring")
            .authorization_bearer(token)
            .content_type("application/json")
            .json(&json!({
                "description": "Rent",
                "amount": 1200.0,
                "category_id": category.id(),
                "frequency": "fortnightly",
                "start_date": "2024-01-15",
            }))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn get_recurring_only_lists_own_templates() {
        let (server, _, token, category) = create_app_with_user_and_category().await;

        create_template(
            &server,
            &token,
            &category,
            "monthly",
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        )
        .await;

        let other_token = sign_up_second_user(&server).await;

        let own = server
            .get("/recurring")
            .authorization_bearer(token)
            .await
            .json::<Vec<RecurringTransaction>>();
        assert_eq!(own.len(), 1);

        let others = server
            .get("/recurring")
            .authorization_bearer(other_token)
            .await
            .json::<Vec<RecurringTransaction>>();
        assert!(others.is_empty());
    }

    #[tokio::test]
    async fn update_recurring_recomputes_due_date_on_schedule_change() {
        let (server, _, token, category) = create_app_with_user_and_category().await;

        let start_date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let template = create_template(&server, &token, &category, "monthly", start_date).await;

        let response = server
            .put(&format!("/recurring/{}", template.id()))
            .authorization_bearer(token)
            .content_type("application/json")
            .json(&json!({
                "description": "Rent",
                "amount": 1200.0,
                "category_id": category.id(),
                "frequency": "weekly",
            }))
            .await;

        response.assert_status_ok();

        let updated = response.json::<RecurringTransaction>();
        assert_eq!(updated.frequency(), Frequency::Weekly);
        assert_eq!(
            *updated.next_due(),
            NaiveDate::from_ymd_opt(2024, 1, 22).unwrap()
        );
    }

    #[tokio::test]
    async fn update_recurring_keeps_due_date_on_amount_change() {
        let (server, _, token, category) = create_app_with_user_and_category().await;

        let start_date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let template = create_template(&server, &token, &category, "monthly", start_date).await;

        let response = server
            .put(&format!("/recurring/{}", template.id()))
            .authorization_bearer(token)
            .content_type("application/json")
            .json(&json!({
                "description": "Rent (negotiated)",
                "amount": 1100.0,
                "category_id": category.id(),
                "frequency": "monthly",
            }))
            .await;

        response.assert_status_ok();

        let updated = response.json::<RecurringTransaction>();
        assert_eq!(updated.amount(), 1100.0);
        assert_eq!(updated.next_due(), template.next_due());
    }

    #[tokio::test]
    async fn update_recurring_fails_on_other_users_template() {
        let (server, _, token, category) = create_app_with_user_and_category().await;

        let template = create_template(
            &server,
            &token,
            &category,
            "monthly",
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        )
        .await;

        let other_token = sign_up_second_user(&server).await;

        server
            .put(&format!("/recurring/{}", template.id()))
            .authorization_bearer(other_token)
            .content_type("application/json")
            .json(&json!({
                "description": "Hijacked",
                "amount": 0.0,
                "category_id": category.id(),
                "frequency": "weekly",
            }))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn toggle_recurring_pauses_and_resumes() {
        let (server, _, token, category) = create_app_with_user_and_category().await;

        let template = create_template(
            &server,
            &token,
            &category,
            "monthly",
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        )
        .await;

        let paused = server
            .put(&format!("/recurring/{}/toggle", template.id()))
            .authorization_bearer(&token)
            .await
            .json::<RecurringTransaction>();
        assert!(!paused.is_active());

        let resumed = server
            .put(&format!("/recurring/{}/toggle", template.id()))
            .authorization_bearer(&token)
            .await
            .json::<RecurringTransaction>();
        assert!(resumed.is_active());
    }

    #[tokio::test]
    async fn delete_recurring_removes_template() {
        let (server, _, token, category) = create_app_with_user_and_category().await;

        let template = create_template(
            &server,
            &token,
            &category,
            "monthly",
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        )
        .await;

        server
            .delete(&format!("/recurring/{}", template.id()))
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let templates = server
            .get("/recurring")
            .authorization_bearer(token)
            .await
            .json::<Vec<RecurringTransaction>>();
        assert!(templates.is_empty());
    }

    #[tokio::test]
    async fn delete_recurring_fails_on_other_users_template() {
        let (server, _, token, category) = create_app_with_user_and_category().await;

        let template = create_template(
            &server,
            &token,
            &category,
            "monthly",
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        )
        .await;

        let other_token = sign_up_second_user(&server).await;

        server
            .delete(&format!("/recurring/{}", template.id()))
            .authorization_bearer(other_token)
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn get_due_recurring_honours_day_window() {
        let (server, _, token, category) = create_app_with_user_and_category().await;

        // Already overdue: the first due date passed years ago.
        let overdue = create_template(
            &server,
            &token,
            &category,
            "weekly",
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        )
        .await;

        // Due a month from now, outside the default window.
        create_template(&server, &token, &category, "monthly", Utc::now().date_naive()).await;

        let due = server
            .get("/recurring/due")
            .authorization_bearer(&token)
            .await
            .json::<Vec<RecurringTransaction>>();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id(), overdue.id());

        // A year-long window catches the monthly template too.
        let due = server
            .get("/recurring/due?days=366")
            .authorization_bearer(token)
            .await
            .json::<Vec<RecurringTransaction>>();
        assert_eq!(due.len(), 2);
    }

    #[tokio::test]
    async fn get_due_recurring_skips_paused_templates() {
        let (server, _, token, category) = create_app_with_user_and_category().await;

        let template = create_template(
            &server,
            &token,
            &category,
            "weekly",
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        )
        .await;

        server
            .put(&format!("/recurring/{}/toggle", template.id()))
            .authorization_bearer(&token)
            .await
            .assert_status_ok();

        let due = server
            .get("/recurring/due")
            .authorization_bearer(token)
            .await
            .json::<Vec<RecurringTransaction>>();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn generate_one_creates_transaction_and_advances_schedule() {
        let (server, user, token, category) = create_app_with_user_and_category().await;

        let template = create_template(
            &server,
            &token,
            &category,
            "weekly",
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        )
        .await;

        let response = server
            .post(&format!("/recurring/{}/generate", template.id()))
            .authorization_bearer(&token)
            .await;

        response.assert_status(StatusCode::CREATED);

        let generated = response.json::<GenerateResponse>();
        assert_eq!(generated.transaction.description(), "Rent (auto)");
        assert_eq!(generated.transaction.amount(), 1200.0);
        assert_eq!(*generated.transaction.date(), *template.next_due());
        assert_eq!(generated.transaction.user_id(), user.id());
        assert_eq!(
            generated.next_due,
            NaiveDate::from_ymd_opt(2020, 1, 15).unwrap()
        );

        let templates = server
            .get("/recurring")
            .authorization_bearer(&token)
            .await
            .json::<Vec<RecurringTransaction>>();
        assert_eq!(*templates[0].next_due(), generated.next_due);
        assert_eq!(templates[0].last_generated(), Some(template.next_due()));

        let transactions = server
            .get("/transaction")
            .authorization_bearer(token)
            .await
            .json::<Vec<Transaction>>();
        assert_eq!(transactions.len(), 1);
    }

    #[tokio::test]
    async fn generate_one_fails_on_paused_template() {
        let (server, _, token, category) = create_app_with_user_and_category().await;

        let template = create_template(
            &server,
            &token,
            &category,
            "weekly",
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        )
        .await;

        server
            .put(&format!("/recurring/{}/toggle", template.id()))
            .authorization_bearer(&token)
            .await
            .assert_status_ok();

        server
            .post(&format!("/recurring/{}/generate", template.id()))
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::PRECONDITION_FAILED);

        let transactions = server
            .get("/transaction")
            .authorization_bearer(token)
            .await
            .json::<Vec<Transaction>>();
        assert!(transactions.is_empty());
    }

    #[tokio::test]
    async fn generate_one_fails_on_other_users_template() {
        let (server, _, token, category) = create_app_with_user_and_category().await;

        let template = create_template(
            &server,
            &token,
            &category,
            "weekly",
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        )
        .await;

        let other_token = sign_up_second_user(&server).await;

        server
            .post(&format!("/recurring/{}/generate", template.id()))
            .authorization_bearer(other_token)
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn generate_due_only_generates_due_templates() {
        let (server, _, token, category) = create_app_with_user_and_category().await;

        create_template(
            &server,
            &token,
            &category,
            "weekly",
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        )
        .await;

        // Next due a month out, so the batch must not touch it.
        let not_due =
            create_template(&server, &token, &category, "monthly", Utc::now().date_naive()).await;

        let response = server
            .post("/recurring/generate_due")
            .authorization_bearer(&token)
            .await;

        response.assert_status_ok();
        assert_eq!(response.json::<BatchGenerateResponse>().generated, 1);

        let transactions = server
            .get("/transaction")
            .authorization_bearer(&token)
            .await
            .json::<Vec<Transaction>>();
        assert_eq!(transactions.len(), 1);

        let templates = server
            .get("/recurring")
            .authorization_bearer(token)
            .await
            .json::<Vec<RecurringTransaction>>();
        let untouched = templates
            .iter()
            .find(|template| template.id() == not_due.id())
            .unwrap();
        assert_eq!(untouched.next_due(), not_due.next_due());
        assert_eq!(untouched.last_generated(), None);
    }

    #[tokio::test]
    async fn generate_due_reports_zero_when_nothing_is_due() {
        let (server, _, token, category) = create_app_with_user_and_category().await;

        create_template(&server, &token, &category, "monthly", Utc::now().date_naive()).await;

        let response = server
            .post("/recurring/generate_due")
            .authorization_bearer(token)
            .await;

        response.assert_status_ok();
        assert_eq!(response.json::<BatchGenerateResponse>().generated, 0);
    }

    #[tokio::test]
    async fn get_due_recurring_rejects_oversized_window() {
        let (server, _, token, _) = create_app_with_user_and_category().await;

        server
            .get(&format!("/recurring/due?days={}", u64::MAX))
            .authorization_bearer(token)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_due_recurring_window_is_inclusive() {
        let (server, _, token, category) = create_app_with_user_and_category().await;

        // Weekly template starting today is due exactly seven days from now,
        // the edge of the default window.
        let template = create_template(
            &server,
            &token,
            &category,
            "weekly",
            Utc::now().date_naive(),
        )
        .await;

        assert_eq!(
            *template.next_due(),
            Utc::now().date_naive().checked_add_days(Days::new(7)).unwrap()
        );

        let due = server
            .get("/recurring/due")
            .authorization_bearer(token)
            .await
            .json::<Vec<RecurringTransaction>>();
        assert_eq!(due.len(), 1);
    }
}
