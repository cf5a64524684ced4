//! Exchange offer routes.

use super::parse_id;
use crate::error::AppError;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use book_exchange_core::ObjectId;
use book_exchange_services::ExchangeService;
use book_exchange_services::exchange::{ExchangeOffer, NewOffer, OfferStatus};
use serde::{Deserialize, Serialize};

/// Body of `POST /offers/:id/accept`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptRequest {
    /// The user accepting; must be the offer's counterparty.
    pub requester_id: ObjectId,
}

/// Body of `PUT /offers/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceBooksRequest {
    /// Books the owner gives.
    #[serde(default)]
    pub offered_book_ids: Vec<ObjectId>,
    /// Books the owner asks for.
    #[serde(default)]
    pub requested_book_ids: Vec<ObjectId>,
}

/// Exchange router.
///
/// # Routes
///
/// - `POST /offers` - Make an offer
/// - `GET /offers` - Every offer
/// - `GET /offers/pending` - Pending offers
/// - `GET /offers/status/:status` - Offers in one status
/// - `GET /offers/user/:user_id` - Offers a user owns or receives
/// - `GET|PUT|DELETE /offers/:id`
/// - `POST /offers/:id/accept` - Accept and settle (409 unless pending)
/// - `POST /offers/:id/decline` - Decline (409 unless pending)
/// - `POST|DELETE /offers/:id/offered-books/:book_id`
pub fn exchange_router(exchange: ExchangeService) -> Router {
    Router::new()
        .route("/offers", get(list_all).post(create_offer))
        .route("/offers/pending", get(list_pending))
        .route("/offers/status/:status", get(list_by_status))
        .route("/offers/user/:user_id", get(list_by_user))
        .route(
            "/offers/:id",
            get(get_offer).put(replace_books).delete(delete_offer),
        )
        .route("/offers/:id/accept", post(accept_offer))
        .route("/offers/:id/decline", post(decline_offer))
        .route(
            "/offers/:id/offered-books/:book_id",
            post(add_offered_book).delete(remove_offered_book),
        )
        .with_state(exchange)
}

async fn create_offer(
    State(exchange): State<ExchangeService>,
    Json(offer): Json<NewOffer>,
) -> Result<(StatusCode, Json<ExchangeOffer>), AppError> {
    let created = exchange.create_offer(offer).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_offer(
    State(exchange): State<ExchangeService>,
    Path(id): Path<String>,
) -> Result<Json<ExchangeOffer>, AppError> {
    Ok(Json(exchange.get_offer(&parse_id(&id)?).await?))
}

async fn replace_books(
    State(exchange): State<ExchangeService>,
    Path(id): Path<String>,
    Json(request): Json<ReplaceBooksRequest>,
) -> Result<Json<ExchangeOffer>, AppError> {
    let offer = exchange
        .update_offer(
            &parse_id(&id)?,
            request.offered_book_ids,
            request.requested_book_ids,
        )
        .await?;
    Ok(Json(offer))
}

async fn delete_offer(
    State(exchange): State<ExchangeService>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    exchange.delete_offer(&parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn accept_offer(
    State(exchange): State<ExchangeService>,
    Path(id): Path<String>,
    Json(request): Json<AcceptRequest>,
) -> Result<Json<ExchangeOffer>, AppError> {
    Ok(Json(
        exchange
            .accept_offer(&parse_id(&id)?, &request.requester_id)
            .await?,
    ))
}

async fn decline_offer(
    State(exchange): State<ExchangeService>,
    Path(id): Path<String>,
) -> Result<Json<ExchangeOffer>, AppError> {
    Ok(Json(exchange.decline_offer(&parse_id(&id)?).await?))
}

async fn add_offered_book(
    State(exchange): State<ExchangeService>,
    Path((id, book_id)): Path<(String, String)>,
) -> Result<Json<ExchangeOffer>, AppError> {
    let offer = exchange
        .add_offered_book(&parse_id(&id)?, &parse_id(&book_id)?)
        .await?;
    Ok(Json(offer))
}

async fn remove_offered_book(
    State(exchange): State<ExchangeService>,
    Path((id, book_id)): Path<(String, String)>,
) -> Result<Json<ExchangeOffer>, AppError> {
    let offer = exchange
        .remove_offered_book(&parse_id(&id)?, &parse_id(&book_id)?)
        .await?;
    Ok(Json(offer))
}

async fn list_all(State(exchange): State<ExchangeService>) -> Result<Json<Vec<ExchangeOffer>>, AppError> {
    Ok(Json(exchange.list_all().await?))
}

async fn list_pending(
    State(exchange): State<ExchangeService>,
) -> Result<Json<Vec<ExchangeOffer>>, AppError> {
    Ok(Json(exchange.list_pending().await?))
}

async fn list_by_status(
    State(exchange): State<ExchangeService>,
    Path(status): Path<String>,
) -> Result<Json<Vec<ExchangeOffer>>, AppError> {
    let status: OfferStatus = status.parse()?;
    Ok(Json(exchange.list_by_status(status).await?))
}

async fn list_by_user(
    State(exchange): State<ExchangeService>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ExchangeOffer>>, AppError> {
    Ok(Json(exchange.list_by_user(&parse_id(&user_id)?).await?))
}
