//! Token-based authentication for the API.
//!
//! Route handlers take a [Claims] argument to require an authenticated
//! caller: the extractor checks the bearer token before the handler body
//! runs, so the rest of the application always works with an
//! already-authenticated user.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRef, FromRequestParts, Json, State},
    http::request::Parts,
    http::{Response, StatusCode},
    response::IntoResponse,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration, Utc};
use email_address::EmailAddress;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    config::AppConfig,
    db::{DbError, SelectBy},
    models::{RawPassword, User},
};

/// The contents of a JSON Web Token.
#[derive(Serialize, Deserialize)]
pub struct Claims {
    /// The expiry time of the token.
    pub exp: usize,
    /// The time the token was issued.
    pub iat: usize,
    /// Email associated with the token.
    pub email: EmailAddress,
}

#[async_trait]
impl<S> FromRequestParts<S> for Claims
where
    AppConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;

        let app_config = parts
            .extract_with_state::<AppConfig, _>(state)
            .await
            .map_err(|_| AuthError::InvalidToken)?;

        let token_data = decode_jwt(bearer.token(), app_config.decoding_key())?;

        Ok(token_data.claims)
    }
}

/// The email and password pair a user signs in with.
#[derive(Deserialize)]
pub struct Credentials {
    pub email: EmailAddress,
    pub password: RawPassword,
}

#[derive(Debug)]
pub enum AuthError {
    WrongCredentials,
    InvalidToken,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response<Body> {
        let (status, error_message) = match self {
            AuthError::WrongCredentials => (StatusCode::UNAUTHORIZED, "Wrong credentials"),
            AuthError::InvalidToken => (StatusCode::BAD_REQUEST, "Invalid token"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Handler for sign-in requests.
///
/// On success the response body is a JWT the client sends back as a bearer
/// token on subsequent requests.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
///
/// # Errors
///
/// This function will return an error in a few situations.
/// - The email does not belong to a registered user.
/// - The password is not correct.
/// - An internal error occurred when verifying the password.
pub async fn sign_in(
    State(state): State<AppConfig>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<String>, AuthError> {
    let connection_mutex = state.db_connection();
    let connection = connection_mutex.lock().unwrap();

    let user = User::select(&credentials.email, &connection).map_err(|e| match e {
        DbError::NotFound => AuthError::WrongCredentials,
        e => {
            tracing::error!("could not look up user: {e}");
            AuthError::InternalError
        }
    })?;

    let password_is_correct = user
        .password_hash()
        .verify(&credentials.password)
        .map_err(|e| {
            tracing::error!("could not verify password: {e}");
            AuthError::InternalError
        })?;

    if password_is_correct {
        Ok(Json(encode_jwt(user.email(), state.encoding_key())))
    } else {
        Err(AuthError::WrongCredentials)
    }
}

fn encode_jwt(email: &EmailAddress, encoding_key: &EncodingKey) -> String {
    let now = Utc::now();
    let exp = (now + Duration::minutes(15)).timestamp() as usize;
    let iat = now.timestamp() as usize;
    let claim = Claims {
        exp,
        iat,
        email: email.to_owned(),
    };

    encode(&Header::default(), &claim, encoding_key).unwrap()
}

fn decode_jwt(jwt_token: &str, decoding_key: &DecodingKey) -> Result<TokenData<Claims>, AuthError> {
    decode(jwt_token, decoding_key, &Validation::default()).map_err(|_| AuthError::InvalidToken)
}
