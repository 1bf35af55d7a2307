//! Categories, subcategories and brands.
//!
//! Reads are public; writes live under `/admin` and are gated by the route guard.
//! Slugs are derived from names, and the unique constraints on them turn a clash into
//! a 409.

use axum::{Json, extract::State, http::StatusCode};
use uuid::Uuid;

use super::deleted_or_not_found;
use crate::{
    AppState,
    error::ApiError,
    extract::{ApiPath, ApiQuery, ValidatedJson},
    models::{
        Brand, Category, CreateBrandRequest, CreateCategoryRequest, CreateSubcategoryRequest,
        Subcategory, SubcategoryFilter, UpdateBrandRequest, UpdateCategoryRequest,
        UpdateSubcategoryRequest, slugify,
    },
};

/// Rejects names that would produce an empty slug (e.g. only punctuation).
fn require_slug(name: &str) -> Result<(), ApiError> {
    if slugify(name).is_empty() {
        return Err(ApiError::invalid("name", "Name must contain letters or digits"));
    }
    Ok(())
}

// --- Categories ---

#[utoipa::path(
    get,
    path = "/api/v1/categories",
    responses((status = 200, description = "All categories", body = [Category]))
)]
pub async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.repo.list_categories().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Found", body = Category),
        (status = 404, description = "Not Found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_category(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Category>, ApiError> {
    state
        .repo
        .get_category(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Category not found"))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Created", body = Category),
        (status = 409, description = "Duplicate entry", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_category(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    require_slug(&payload.name)?;
    let category = state.repo.create_category(payload).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    request_body = UpdateCategoryRequest,
    responses((status = 200, description = "Updated", body = Category))
)]
pub async fn update_category(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateCategoryRequest>,
) -> Result<Json<Category>, ApiError> {
    if let Some(name) = &payload.name {
        require_slug(name)?;
    }
    state
        .repo
        .update_category(id, payload)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Category not found"))
}

/// delete_category
///
/// [Admin Route] Fails with 409 while products or subcategories still reference it.
#[utoipa::path(
    delete,
    path = "/api/v1/admin/categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 409, description = "Still referenced", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_category(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    deleted_or_not_found(state.repo.delete_category(id).await?, "Category")
}

// --- Subcategories ---

#[utoipa::path(
    get,
    path = "/api/v1/subcategories",
    params(SubcategoryFilter),
    responses((status = 200, description = "Subcategories", body = [Subcategory]))
)]
pub async fn list_subcategories(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<SubcategoryFilter>,
) -> Result<Json<Vec<Subcategory>>, ApiError> {
    Ok(Json(state.repo.list_subcategories(filter.category_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/subcategories",
    request_body = CreateSubcategoryRequest,
    responses(
        (status = 201, description = "Created", body = Subcategory),
        (status = 400, description = "Unknown category", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_subcategory(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateSubcategoryRequest>,
) -> Result<(StatusCode, Json<Subcategory>), ApiError> {
    require_slug(&payload.name)?;
    let subcategory = state.repo.create_subcategory(payload).await?;
    Ok((StatusCode::CREATED, Json(subcategory)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/subcategories/{id}",
    params(("id" = Uuid, Path, description = "Subcategory ID")),
    request_body = UpdateSubcategoryRequest,
    responses((status = 200, description = "Updated", body = Subcategory))
)]
pub async fn update_subcategory(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateSubcategoryRequest>,
) -> Result<Json<Subcategory>, ApiError> {
    if let Some(name) = &payload.name {
        require_slug(name)?;
    }
    state
        .repo
        .update_subcategory(id, payload)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Subcategory not found"))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/subcategories/{id}",
    params(("id" = Uuid, Path, description = "Subcategory ID")),
    responses((status = 204, description = "Deleted"))
)]
pub async fn delete_subcategory(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    deleted_or_not_found(state.repo.delete_subcategory(id).await?, "Subcategory")
}

// --- Brands ---

#[utoipa::path(
    get,
    path = "/api/v1/brands",
    responses((status = 200, description = "All brands", body = [Brand]))
)]
pub async fn list_brands(State(state): State<AppState>) -> Result<Json<Vec<Brand>>, ApiError> {
    Ok(Json(state.repo.list_brands().await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/brands",
    request_body = CreateBrandRequest,
    responses((status = 201, description = "Created", body = Brand))
)]
pub async fn create_brand(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateBrandRequest>,
) -> Result<(StatusCode, Json<Brand>), ApiError> {
    require_slug(&payload.name)?;
    let brand = state.repo.create_brand(payload).await?;
    Ok((StatusCode::CREATED, Json(brand)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/brands/{id}",
    params(("id" = Uuid, Path, description = "Brand ID")),
    request_body = UpdateBrandRequest,
    responses((status = 200, description = "Updated", body = Brand))
)]
pub async fn update_brand(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateBrandRequest>,
) -> Result<Json<Brand>, ApiError> {
    if let Some(name) = &payload.name {
        require_slug(name)?;
    }
    state
        .repo
        .update_brand(id, payload)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Brand not found"))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/brands/{id}",
    params(("id" = Uuid, Path, description = "Brand ID")),
    responses((status = 204, description = "Deleted"))
)]
pub async fn delete_brand(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    deleted_or_not_found(state.repo.delete_brand(id).await?, "Brand")
}
