use axum::{Json, extract::State, http::StatusCode};
use uuid::Uuid;

use super::deleted_or_not_found;
use crate::{
    AppState,
    error::ApiError,
    extract::{ApiPath, ApiQuery, ValidatedJson},
    models::{
        CreateProductRequest, MAX_PAGE, PageMeta, Paginated, Product, ProductFilter, Review,
        UpdateProductRequest,
    },
};

async fn list_page(
    state: &AppState,
    filter: ProductFilter,
    include_inactive: bool,
) -> Result<Paginated<Product>, ApiError> {
    if filter.page() > MAX_PAGE {
        return Err(ApiError::invalid("page", format!("page cannot exceed {MAX_PAGE}")));
    }
    if let (Some(min), Some(max)) = (filter.min_price, filter.max_price) {
        if min > max {
            return Err(ApiError::invalid("min_price", "min_price cannot exceed max_price"));
        }
    }

    let (data, total) = state.repo.list_products(&filter, include_inactive).await?;
    Ok(Paginated {
        meta: PageMeta::new(filter.page(), filter.limit(), total),
        data,
    })
}

/// Loads a product the storefront is allowed to show.
async fn visible_product(state: &AppState, id: Uuid) -> Result<Product, ApiError> {
    state
        .repo
        .get_product(id)
        .await?
        .filter(|product| product.is_active)
        .ok_or_else(|| ApiError::not_found("Product not found"))
}

/// get_products
///
/// [Public Route] Paginated catalog listing. Only active products are returned; the page
/// size is capped at 100.
#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(ProductFilter),
    responses(
        (status = 200, description = "One page of products", body = Paginated<Product>),
        (status = 400, description = "Validation Error", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_products(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<ProductFilter>,
) -> Result<Json<Paginated<Product>>, ApiError> {
    Ok(Json(list_page(&state, filter, false).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Found", body = Product),
        (status = 404, description = "Not Found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_product(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(visible_product(&state, id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}/reviews",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses((status = 200, description = "Reviews, newest first", body = [Review]))
)]
pub async fn get_product_reviews(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<Review>>, ApiError> {
    visible_product(&state, id).await?;
    Ok(Json(state.repo.list_reviews(id).await?))
}

/// get_admin_products
///
/// [Admin Route] Same listing as the storefront, including inactive products.
#[utoipa::path(
    get,
    path = "/api/v1/admin/products",
    params(ProductFilter),
    responses((status = 200, description = "One page of products", body = Paginated<Product>))
)]
pub async fn get_admin_products(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<ProductFilter>,
) -> Result<Json<Paginated<Product>>, ApiError> {
    Ok(Json(list_page(&state, filter, true).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Created", body = Product),
        (status = 400, description = "Unknown category, subcategory or brand", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_product(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state.repo.create_product(payload).await?;
    tracing::info!(product_id = %product.id, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProductRequest,
    responses((status = 200, description = "Updated", body = Product))
)]
pub async fn update_product(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    state
        .repo
        .update_product(id, payload)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Product not found"))
}

/// delete_product
///
/// [Admin Route] Products that appear in orders cannot be deleted (409); deactivate them
/// instead.
#[utoipa::path(
    delete,
    path = "/api/v1/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 409, description = "Still referenced by orders", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_product(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    deleted_or_not_found(state.repo.delete_product(id).await?, "Product")
}
