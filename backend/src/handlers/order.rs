//! Order and delivery handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{CustomerInfo, DeliveryDetails, OrderView, Page, PaginatedResponse};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::order::{CreateOrderInput, OrderListQuery, UndoDeliveryInput, UpdateOrderInput};
use crate::services::OrderService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CustomerLookupQuery {
    pub phone: String,
}

pub async fn list_orders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<PaginatedResponse<OrderView>>, AppError> {
    user.require_any_page(&[Page::Orders, Page::Deliveries])?;

    let service = OrderService::new(state.db.clone());
    Ok(Json(service.list(query).await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<i32>,
) -> Result<Json<OrderView>, AppError> {
    user.require_any_page(&[Page::Orders, Page::Deliveries])?;

    let service = OrderService::new(state.db.clone());
    Ok(Json(service.get(order_id).await?))
}

pub async fn create_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateOrderInput>,
) -> Result<(StatusCode, Json<OrderView>), AppError> {
    user.require_page(Page::Orders)?;

    let service = OrderService::new(state.db.clone());
    let order = service
        .create(&user, input, state.config.booking.policy())
        .await?;

    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn update_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<i32>,
    Json(input): Json<UpdateOrderInput>,
) -> Result<Json<OrderView>, AppError> {
    user.require_page(Page::Orders)?;

    let service = OrderService::new(state.db.clone());
    let order = service
        .update(&user, order_id, input, state.config.booking.policy())
        .await?;

    Ok(Json(order))
}

pub async fn delete_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<i32>,
) -> Result<StatusCode, AppError> {
    user.require_page(Page::Orders)?;

    let service = OrderService::new(state.db.clone());
    service.delete(&user, order_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn deliver_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<i32>,
    Json(details): Json<DeliveryDetails>,
) -> Result<Json<OrderView>, AppError> {
    user.require_any_page(&[Page::Deliveries, Page::Orders])?;

    let service = OrderService::new(state.db.clone());
    Ok(Json(service.deliver(&user, order_id, details).await?))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<i32>,
) -> Result<Json<OrderView>, AppError> {
    user.require_page(Page::Orders)?;

    let service = OrderService::new(state.db.clone());
    Ok(Json(service.cancel(&user, order_id).await?))
}

pub async fn undo_delivery(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<i32>,
    Json(input): Json<UndoDeliveryInput>,
) -> Result<Json<OrderView>, AppError> {
    user.require_any_page(&[Page::Deliveries, Page::Orders])?;

    let service = OrderService::new(state.db.clone());
    let order = service.undo_delivery(&user, order_id, &input.reason).await?;

    Ok(Json(order))
}

/// Autofill for the booking form
pub async fn lookup_customer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<CustomerLookupQuery>,
) -> Result<Json<CustomerInfo>, AppError> {
    user.require_page(Page::Orders)?;

    let service = OrderService::new(state.db.clone());
    Ok(Json(service.lookup_customer(&query.phone).await?))
}
