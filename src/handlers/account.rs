use axum::{Json, extract::State, http::StatusCode};

use crate::{
    AppState,
    auth::{AuthUser, hash_password, issue_token, verify_password},
    error::ApiError,
    extract::ValidatedJson,
    models::{AuthResponse, LoginRequest, NewUser, RegisterRequest, Role, UpdateProfileRequest, User},
};

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn auth_response(user: User, state: &AppState) -> Result<AuthResponse, ApiError> {
    let access_token = issue_token(&user, &state.config)?;
    Ok(AuthResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.jwt_ttl_secs,
        user,
    })
}

/// register
///
/// [Public Route] Creates a customer account and signs the caller in. The role is always
/// CUSTOMER; staff roles are granted by a super admin. A taken email surfaces as a 409
/// through the `users_email_key` constraint.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = AuthResponse),
        (status = 400, description = "Validation Error", body = crate::error::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let password_hash = hash_password(payload.password, state.config.bcrypt_cost).await?;
    let user = state
        .repo
        .create_user(NewUser {
            email: normalize_email(&payload.email),
            name: payload.name.trim().to_string(),
            password_hash,
            role: Role::Customer,
        })
        .await?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(auth_response(user, &state)?)))
}

/// login
///
/// [Public Route] Exchanges credentials for a session token. Unknown emails and wrong
/// passwords get the same answer.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let invalid = || ApiError::unauthorized("Invalid email or password");

    let record = state
        .repo
        .find_user_by_email(&normalize_email(&payload.email))
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(payload.password, record.password_hash).await? {
        tracing::debug!(user_id = %record.user.id, "password mismatch");
        return Err(invalid());
    }

    Ok(Json(auth_response(record.user, &state)?))
}

/// get_me
///
/// [Authenticated Route] Returns the caller's account.
#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .repo
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(user))
}

/// update_me
///
/// [Authenticated Route] Renames the caller and/or changes their password. A new
/// password is only accepted together with the correct current one.
#[utoipa::path(
    patch,
    path = "/api/v1/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 400, description = "Validation Error", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<User>, ApiError> {
    let password_hash = match payload.new_password {
        Some(new_password) => {
            let current = payload
                .current_password
                .ok_or_else(|| ApiError::invalid("current_password", "Current password is required"))?;
            let stored = state
                .repo
                .get_password_hash(id)
                .await?
                .ok_or_else(|| ApiError::not_found("User not found"))?;
            if !verify_password(current, stored).await? {
                return Err(ApiError::invalid("current_password", "Current password is incorrect"));
            }
            Some(hash_password(new_password, state.config.bcrypt_cost).await?)
        }
        None => None,
    };

    let name = payload.name.map(|n| n.trim().to_string());
    let user = state
        .repo
        .update_profile(id, name, password_hash)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(user))
}
