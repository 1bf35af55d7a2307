use axum::{Json, extract::State, http::StatusCode};
use uuid::Uuid;

use super::deleted_or_not_found;
use crate::{
    AppState,
    auth::AuthUser,
    error::ApiError,
    extract::{ApiPath, ValidatedJson},
    models::{DashboardStats, UpdateRoleRequest, User},
};

/// get_admin_stats
///
/// [Admin Route] Dashboard counters.
#[utoipa::path(
    get,
    path = "/api/v1/admin/stats",
    responses((status = 200, description = "Stats", body = DashboardStats))
)]
pub async fn get_admin_stats(State(state): State<AppState>) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(state.repo.get_stats().await?))
}

// --- User management (SUPER_ADMIN) ---

#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    responses((status = 200, description = "All accounts", body = [User]))
)]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.repo.list_users().await?))
}

/// update_user_role
///
/// [Super Admin Route] Grants or revokes staff roles. The change applies to the user's
/// next request, since sessions re-read the role from the database.
#[utoipa::path(
    patch,
    path = "/api/v1/admin/users/{id}/role",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 404, description = "Not Found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_user_role(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateRoleRequest>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .repo
        .set_user_role(id, payload.role)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    tracing::info!(actor = %actor.id, user_id = %id, role = user.role.as_str(), "role changed");
    Ok(Json(user))
}

/// delete_user
///
/// [Super Admin Route] Removes an account. Super admins cannot delete themselves, and
/// accounts that placed orders are kept (409).
#[utoipa::path(
    delete,
    path = "/api/v1/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Own account", body = crate::error::ErrorResponse),
        (status = 409, description = "Still referenced", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_user(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    if actor.id == id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }
    let status = deleted_or_not_found(state.repo.delete_user(id).await?, "User")?;
    tracing::info!(actor = %actor.id, user_id = %id, "user deleted");
    Ok(status)
}
