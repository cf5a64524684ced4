//! User library routes.
//!
//! `POST` and `DELETE` on `/users/:id/books/:book_id` are the assign
//! and unassign calls exchange settlement makes.

use super::parse_id;
use crate::error::AppError;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use book_exchange_services::LibraryService;
use book_exchange_services::library::{EntryPatch, UserBook};

/// Library router.
///
/// # Routes
///
/// - `POST /users/:id/books/:book_id` - Assign
/// - `DELETE /users/:id/books/:book_id` - Unassign one copy (404 if not held)
/// - `GET /users/:id/books` - A user's entries
/// - `GET /books/:id/users` - Entries holding a book
/// - `GET /entries` - Every entry
/// - `GET|PATCH|DELETE /entries/:id`
pub fn library_router(library: LibraryService) -> Router {
    Router::new()
        .route(
            "/users/:id/books/:book_id",
            post(assign_book).delete(unassign_book),
        )
        .route("/users/:id/books", get(list_user_books))
        .route("/books/:id/users", get(list_book_users))
        .route("/entries", get(list_entries))
        .route(
            "/entries/:id",
            get(get_entry).patch(update_entry).delete(delete_entry),
        )
        .with_state(library)
}

async fn assign_book(
    State(library): State<LibraryService>,
    Path((user_id, book_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<UserBook>), AppError> {
    let entry = library
        .assign_book(&parse_id(&user_id)?, &parse_id(&book_id)?)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn unassign_book(
    State(library): State<LibraryService>,
    Path((user_id, book_id)): Path<(String, String)>,
) -> Result<Json<UserBook>, AppError> {
    let entry = library
        .unassign_book(&parse_id(&user_id)?, &parse_id(&book_id)?)
        .await?;
    Ok(Json(entry))
}

async fn list_user_books(
    State(library): State<LibraryService>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<UserBook>>, AppError> {
    Ok(Json(library.list_user_books(&parse_id(&user_id)?).await?))
}

async fn list_book_users(
    State(library): State<LibraryService>,
    Path(book_id): Path<String>,
) -> Result<Json<Vec<UserBook>>, AppError> {
    Ok(Json(library.list_book_users(&parse_id(&book_id)?).await?))
}

async fn list_entries(State(library): State<LibraryService>) -> Result<Json<Vec<UserBook>>, AppError> {
    Ok(Json(library.list_entries().await?))
}

async fn get_entry(
    State(library): State<LibraryService>,
    Path(id): Path<String>,
) -> Result<Json<UserBook>, AppError> {
    Ok(Json(library.get_entry(&parse_id(&id)?).await?))
}

async fn update_entry(
    State(library): State<LibraryService>,
    Path(id): Path<String>,
    Json(patch): Json<EntryPatch>,
) -> Result<Json<UserBook>, AppError> {
    Ok(Json(library.update_entry(&parse_id(&id)?, patch).await?))
}

async fn delete_entry(
    State(library): State<LibraryService>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    library.delete_entry(&parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
