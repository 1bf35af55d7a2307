use std::collections::HashMap;

use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    checkout::{build_quote, merge_items, normalize_code, price_lines},
    error::ApiError,
    extract::{ApiPath, ApiQuery, ValidatedJson},
    models::{
        CheckoutRequest, CheckoutResponse, Order, OrderDetails, OrderFilter, OrderStatus,
        PaymentSession, UpdateOrderStatusRequest,
    },
};

/// checkout
///
/// [Authenticated Route] Turns a cart into a PENDING order and opens a payment intent
/// for its total.
///
/// Prices come from the catalog, never from the client. Stock and coupon usage are
/// re-checked inside the order transaction, so a cart that passed pricing can still get
/// a 409 if another checkout took the last units first. When the payment provider fails
/// the fresh order is canceled again, which returns its stock and coupon use.
///
/// An order whose total is zero never reaches the provider: it moves straight to
/// PROCESSING and the response carries no payment session.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order placed", body = CheckoutResponse),
        (status = 400, description = "Validation Error or unusable coupon", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown product or coupon", body = crate::error::ErrorResponse),
        (status = 409, description = "Insufficient stock", body = crate::error::ErrorResponse),
        (status = 502, description = "Payment provider unavailable", body = crate::error::ErrorResponse)
    )
)]
pub async fn checkout(
    user: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let ids: Vec<Uuid> = merge_items(&payload.items).into_iter().map(|(id, _)| id).collect();
    let catalog: HashMap<Uuid, _> = state
        .repo
        .get_products_by_ids(&ids)
        .await?
        .into_iter()
        .map(|product| (product.id, product))
        .collect();
    let lines = price_lines(&payload.items, &catalog)?;

    let coupon = match payload
        .coupon_code
        .as_deref()
        .map(normalize_code)
        .filter(|code| !code.is_empty())
    {
        Some(code) => Some(
            state
                .repo
                .get_coupon_by_code(&code)
                .await?
                .ok_or_else(|| ApiError::not_found("Coupon not found").at("coupon_code"))?,
        ),
        None => None,
    };

    let quote = build_quote(lines, coupon.as_ref(), Utc::now())?;
    let mut details = state
        .repo
        .place_order(user.id, &quote, &payload.shipping_address)
        .await?;
    let order_id = details.order.id;

    if details.order.total == 0 {
        if let Some(order) = state
            .repo
            .transition_order(order_id, OrderStatus::Pending, OrderStatus::Processing)
            .await?
        {
            details.order = order;
        }
        tracing::info!(%order_id, user_id = %user.id, "fully discounted order placed without payment");
        return Ok((
            StatusCode::CREATED,
            Json(CheckoutResponse {
                order: details,
                payment: None,
            }),
        ));
    }

    let intent = match state
        .payments
        .create_payment_intent(details.order.total, &state.config.currency, order_id)
        .await
    {
        Ok(intent) => intent,
        Err(err) => {
            tracing::error!(%order_id, error = %err, "payment intent creation failed, canceling order");
            if let Err(cancel_err) = state
                .repo
                .transition_order(order_id, OrderStatus::Pending, OrderStatus::Canceled)
                .await
            {
                tracing::error!(%order_id, error = ?cancel_err, "failed to cancel unpaid order");
            }
            return Err(ApiError::bad_gateway("Payment provider unavailable"));
        }
    };

    state.repo.attach_payment_intent(order_id, &intent.id).await?;
    details.order.payment_intent_id = Some(intent.id.clone());

    tracing::info!(%order_id, user_id = %user.id, total = details.order.total, "order placed");
    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order: details,
            payment: Some(PaymentSession {
                intent_id: intent.id,
                client_secret: intent.client_secret,
                publishable_key: state.config.payment_publishable_key.clone(),
            }),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/me/orders",
    responses((status = 200, description = "My orders, newest first", body = [Order]))
)]
pub async fn get_my_orders(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.repo.list_user_orders(id).await?))
}

/// get_order
///
/// [Authenticated Route] Owners and staff can read an order; for everyone else it does
/// not exist.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with items", body = OrderDetails),
        (status = 404, description = "Not Found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_order(
    user: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<OrderDetails>, ApiError> {
    state
        .repo
        .get_order(id)
        .await?
        .filter(|details| details.order.user_id == user.id || user.is_staff())
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Order not found"))
}

/// cancel_order
///
/// [Authenticated Route] The owner may cancel while the order is still PENDING.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Canceled", body = Order),
        (status = 400, description = "Order is no longer pending", body = crate::error::ErrorResponse),
        (status = 404, description = "Not Found", body = crate::error::ErrorResponse)
    )
)]
pub async fn cancel_order(
    user: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Order>, ApiError> {
    let details = state
        .repo
        .get_order(id)
        .await?
        .filter(|details| details.order.user_id == user.id)
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    if details.order.status != OrderStatus::Pending {
        return Err(ApiError::bad_request("Only pending orders can be canceled").at("status"));
    }

    let order = state
        .repo
        .transition_order(id, OrderStatus::Pending, OrderStatus::Canceled)
        .await?
        .ok_or_else(|| ApiError::conflict("Order status changed, please reload").at("status"))?;

    tracing::info!(order_id = %id, "order canceled by customer");
    Ok(Json(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    params(OrderFilter),
    responses((status = 200, description = "Orders, newest first", body = [Order]))
)]
pub async fn get_admin_orders(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<OrderFilter>,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.repo.list_orders(filter.status).await?))
}

/// update_order_status
///
/// [Admin Route] Moves an order along its lifecycle. Illegal moves (e.g. DELIVERED back
/// to PENDING) are a 400; losing a race with another update is a 409.
#[utoipa::path(
    patch,
    path = "/api/v1/admin/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Updated", body = Order),
        (status = 400, description = "Illegal transition", body = crate::error::ErrorResponse),
        (status = 409, description = "Concurrent update", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateOrderStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let current = state
        .repo
        .get_order(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?
        .order
        .status;

    if !current.can_transition_to(payload.status) {
        return Err(ApiError::invalid(
            "status",
            format!(
                "Cannot move an order from {} to {}",
                current.as_str(),
                payload.status.as_str()
            ),
        ));
    }

    let order = state
        .repo
        .transition_order(id, current, payload.status)
        .await?
        .ok_or_else(|| ApiError::conflict("Order status changed, please reload").at("status"))?;

    tracing::info!(order_id = %id, from = current.as_str(), to = order.status.as_str(), "order status updated");
    Ok(Json(order))
}
