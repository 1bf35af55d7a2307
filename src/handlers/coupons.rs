use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use uuid::Uuid;

use super::deleted_or_not_found;
use crate::{
    AppState,
    auth::AuthUser,
    checkout::{coupon_discount, normalize_code},
    error::ApiError,
    extract::{ApiPath, ValidatedJson},
    models::{ApplyCouponRequest, Coupon, CouponQuote, CreateCouponRequest, DiscountType, UpdateCouponRequest},
};

fn check_percentage(discount_type: DiscountType, value: i64) -> Result<(), ApiError> {
    if discount_type == DiscountType::Percentage && value > 100 {
        return Err(ApiError::invalid(
            "discount_value",
            "Percentage discount cannot exceed 100",
        ));
    }
    Ok(())
}

/// apply_coupon
///
/// [Authenticated Route] Previews what a coupon would take off a cart worth `subtotal`.
/// Nothing is reserved; the coupon is re-checked and consumed at checkout.
#[utoipa::path(
    post,
    path = "/api/v1/coupons/apply",
    request_body = ApplyCouponRequest,
    responses(
        (status = 200, description = "Discount preview", body = CouponQuote),
        (status = 400, description = "Coupon cannot be used", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown coupon", body = crate::error::ErrorResponse)
    )
)]
pub async fn apply_coupon(
    _user: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ApplyCouponRequest>,
) -> Result<Json<CouponQuote>, ApiError> {
    let code = normalize_code(&payload.code);
    let coupon = state
        .repo
        .get_coupon_by_code(&code)
        .await?
        .ok_or_else(|| ApiError::not_found("Coupon not found").at("code"))?;

    let discount = coupon_discount(&coupon, payload.subtotal, Utc::now()).map_err(|e| e.at("code"))?;

    Ok(Json(CouponQuote {
        code: coupon.code,
        discount,
        total: payload.subtotal - discount,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/coupons",
    responses((status = 200, description = "All coupons", body = [Coupon]))
)]
pub async fn list_coupons(State(state): State<AppState>) -> Result<Json<Vec<Coupon>>, ApiError> {
    Ok(Json(state.repo.list_coupons().await?))
}

/// create_coupon
///
/// [Admin Route] Codes are stored upper-cased. Percentage coupons cannot exceed 100.
#[utoipa::path(
    post,
    path = "/api/v1/admin/coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Created", body = Coupon),
        (status = 409, description = "Code already exists", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    ValidatedJson(mut payload): ValidatedJson<CreateCouponRequest>,
) -> Result<(StatusCode, Json<Coupon>), ApiError> {
    check_percentage(payload.discount_type, payload.discount_value)?;
    payload.code = normalize_code(&payload.code);

    let coupon = state.repo.create_coupon(payload).await?;
    tracing::info!(code = %coupon.code, "coupon created");
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// update_coupon
///
/// [Admin Route] Partial update. A new `discount_value` is checked against the stored
/// discount type.
#[utoipa::path(
    put,
    path = "/api/v1/admin/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    request_body = UpdateCouponRequest,
    responses(
        (status = 200, description = "Updated", body = Coupon),
        (status = 400, description = "Validation Error", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_coupon(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateCouponRequest>,
) -> Result<Json<Coupon>, ApiError> {
    if let Some(value) = payload.discount_value {
        let current = state
            .repo
            .get_coupon(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Coupon not found"))?;
        check_percentage(current.discount_type, value)?;
    }

    state
        .repo
        .update_coupon(id, payload)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Coupon not found"))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    responses((status = 204, description = "Deleted"))
)]
pub async fn delete_coupon(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    deleted_or_not_found(state.repo.delete_coupon(id).await?, "Coupon")
}
