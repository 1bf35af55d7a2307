use axum::{Json, extract::State, http::StatusCode};

use crate::{
    AppState,
    auth::AuthUser,
    error::ApiError,
    extract::ValidatedJson,
    models::{CreateReviewRequest, Review},
};

/// create_review
///
/// [Authenticated Route] Only customers who received the product (a DELIVERED order
/// containing it) may review it, once. The one-review rule is enforced by
/// `reviews_user_product_key`, which answers a second attempt with 409.
#[utoipa::path(
    post,
    path = "/api/v1/reviews",
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Review posted", body = Review),
        (status = 403, description = "No delivered purchase", body = crate::error::ErrorResponse),
        (status = 409, description = "Already reviewed", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_review(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    if !state
        .repo
        .has_delivered_purchase(user_id, payload.product_id)
        .await?
    {
        return Err(
            ApiError::forbidden("You can only review products from delivered orders").at("product_id"),
        );
    }

    let review = state.repo.create_review(user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(review)))
}
