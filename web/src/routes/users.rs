//! Account routes.
//!
//! `GET /users/:id` is the lookup the notification service depends on; its
//! body is the full [`User`] record.

use super::parse_id;
use crate::error::AppError;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use book_exchange_services::AccountsService;
use book_exchange_services::accounts::{NewUser, User};

/// Accounts router.
///
/// # Routes
///
/// - `POST /users` - Register (409 if the e-mail is taken)
/// - `GET /users` - Every user
/// - `GET /users/:id` - One user
pub fn users_router(accounts: AccountsService) -> Router {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", get(get_user))
        .with_state(accounts)
}

async fn create_user(
    State(accounts): State<AccountsService>,
    Json(user): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let created = accounts.create_user(user).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_user(
    State(accounts): State<AccountsService>,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    Ok(Json(accounts.get_user(&parse_id(&id)?).await?))
}

async fn list_users(State(accounts): State<AccountsService>) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(accounts.list_users().await?))
}
