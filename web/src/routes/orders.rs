//! Order routes.

use super::parse_id;
use crate::error::AppError;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use book_exchange_core::ObjectId;
use book_exchange_services::OrdersService;
use book_exchange_services::orders::{Order, OrderStatus};
use serde::{Deserialize, Serialize};

/// Body of `POST /orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    /// Who is ordering.
    pub user_id: ObjectId,
    /// What is ordered; at least one book.
    pub book_ids: Vec<ObjectId>,
}

/// Body of `PUT /orders/:id/books`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceBooksRequest {
    /// The new book list; at least one book.
    pub book_ids: Vec<ObjectId>,
}

/// Orders router.
///
/// # Routes
///
/// - `POST /orders` - Place an order
/// - `GET /orders` - Every order
/// - `GET /orders/status/:status` - Orders in one status
/// - `GET /orders/user/:user_id` - A user's orders
/// - `GET|DELETE /orders/:id`
/// - `PUT /orders/:id/books` - Replace the book list
/// - `POST|DELETE /orders/:id/books/:book_id` - Add or remove a book
/// - `POST /orders/:id/cancel`, `POST /orders/:id/return`
///
/// Edits and transitions answer 409 once the order left `Created`.
pub fn orders_router(orders: OrdersService) -> Router {
    Router::new()
        .route("/orders", get(list_all).post(create_order))
        .route("/orders/status/:status", get(list_by_status))
        .route("/orders/user/:user_id", get(list_by_user))
        .route("/orders/:id", get(get_order).delete(delete_order))
        .route("/orders/:id/books", put(replace_books))
        .route(
            "/orders/:id/books/:book_id",
            post(add_book).delete(remove_book),
        )
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/return", post(return_order))
        .with_state(orders)
}

async fn create_order(
    State(orders): State<OrdersService>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = orders
        .create_order(&request.user_id, &request.book_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(
    State(orders): State<OrdersService>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(orders.get_order(&parse_id(&id)?).await?))
}

async fn delete_order(
    State(orders): State<OrdersService>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    orders.delete_order(&parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn replace_books(
    State(orders): State<OrdersService>,
    Path(id): Path<String>,
    Json(request): Json<ReplaceBooksRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(
        orders
            .update_books(&parse_id(&id)?, &request.book_ids)
            .await?,
    ))
}

async fn add_book(
    State(orders): State<OrdersService>,
    Path((id, book_id)): Path<(String, String)>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(
        orders
            .add_book(&parse_id(&id)?, &parse_id(&book_id)?)
            .await?,
    ))
}

async fn remove_book(
    State(orders): State<OrdersService>,
    Path((id, book_id)): Path<(String, String)>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(
        orders
            .remove_book(&parse_id(&id)?, &parse_id(&book_id)?)
            .await?,
    ))
}

async fn cancel_order(
    State(orders): State<OrdersService>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(orders.cancel_order(&parse_id(&id)?).await?))
}

async fn return_order(
    State(orders): State<OrdersService>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(orders.return_order(&parse_id(&id)?).await?))
}

async fn list_all(State(orders): State<OrdersService>) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(orders.list_all().await?))
}

async fn list_by_status(
    State(orders): State<OrdersService>,
    Path(status): Path<String>,
) -> Result<Json<Vec<Order>>, AppError> {
    let status: OrderStatus = status.parse()?;
    Ok(Json(orders.list_by_status(status).await?))
}

async fn list_by_user(
    State(orders): State<OrdersService>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(orders.list_by_user(&parse_id(&user_id)?).await?))
}
