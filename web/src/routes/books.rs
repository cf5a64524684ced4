//! Catalogue routes.

use super::parse_id;
use crate::error::AppError;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use book_exchange_services::CatalogueService;
use book_exchange_services::catalogue::{Book, BookPatch, NewBook};
use serde::Deserialize;

/// Query string of `GET /books/search`.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// Substring of title or author.
    #[serde(default)]
    pub q: String,
}

/// Catalogue router.
///
/// # Routes
///
/// - `POST /books` - Add a book
/// - `GET /books` - Every book
/// - `GET /books/search?q=` - Title or author search
/// - `GET /books/top-rated` - Ten best rated
/// - `GET /books/new-arrivals` - Ten newest
/// - `GET /books/genre/:genre`, `/books/author/:author`, `/books/language/:language`
/// - `GET /books/recommendations/:user_id`
/// - `GET|PATCH|DELETE /books/:id`
pub fn books_router(catalogue: CatalogueService) -> Router {
    Router::new()
        .route("/books", get(list_books).post(create_book))
        .route("/books/search", get(search))
        .route("/books/top-rated", get(top_rated))
        .route("/books/new-arrivals", get(new_arrivals))
        .route("/books/genre/:genre", get(by_genre))
        .route("/books/author/:author", get(by_author))
        .route("/books/language/:language", get(by_language))
        .route("/books/recommendations/:user_id", get(recommend))
        .route(
            "/books/:id",
            get(get_book).patch(update_book).delete(delete_book),
        )
        .with_state(catalogue)
}

async fn create_book(
    State(catalogue): State<CatalogueService>,
    Json(book): Json<NewBook>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    let created = catalogue.create_book(book).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_book(
    State(catalogue): State<CatalogueService>,
    Path(id): Path<String>,
) -> Result<Json<Book>, AppError> {
    Ok(Json(catalogue.get_book(&parse_id(&id)?).await?))
}

async fn update_book(
    State(catalogue): State<CatalogueService>,
    Path(id): Path<String>,
    Json(patch): Json<BookPatch>,
) -> Result<Json<Book>, AppError> {
    Ok(Json(catalogue.update_book(&parse_id(&id)?, &patch).await?))
}

async fn delete_book(
    State(catalogue): State<CatalogueService>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    catalogue.delete_book(&parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_books(State(catalogue): State<CatalogueService>) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(catalogue.list_books().await?))
}

async fn search(
    State(catalogue): State<CatalogueService>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(catalogue.search(&params.q).await?))
}

async fn top_rated(State(catalogue): State<CatalogueService>) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(catalogue.top_rated().await?))
}

async fn new_arrivals(
    State(catalogue): State<CatalogueService>,
) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(catalogue.new_arrivals().await?))
}

async fn by_genre(
    State(catalogue): State<CatalogueService>,
    Path(genre): Path<String>,
) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(catalogue.list_by_genre(&genre).await?))
}

async fn by_author(
    State(catalogue): State<CatalogueService>,
    Path(author): Path<String>,
) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(catalogue.list_by_author(&author).await?))
}

async fn by_language(
    State(catalogue): State<CatalogueService>,
    Path(language): Path<String>,
) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(catalogue.list_by_language(&language).await?))
}

async fn recommend(
    State(catalogue): State<CatalogueService>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(catalogue.recommend(&parse_id(&user_id)?).await?))
}
