//! HTTP handlers, grouped by resource.
//!
//! Every handler returns `Result<_, ApiError>`, so failures leave through the error
//! normalizer. Access control is done by the route guard before a handler runs; handlers
//! only add ownership checks.

use axum::{Json, extract::State, http::StatusCode};

use crate::{AppConfig, error::ApiError, models::ClientConfig};

pub mod account;
pub mod admin;
pub mod catalog;
pub mod coupons;
pub mod orders;
pub mod products;
pub mod reviews;

/// Maps a repository delete result onto 204 / 404.
pub(crate) fn deleted_or_not_found(deleted: bool, what: &str) -> Result<StatusCode, ApiError> {
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("{what} not found")))
    }
}

/// get_client_config
///
/// [Public Route] Settings the storefront client needs before its first API call.
#[utoipa::path(
    get,
    path = "/api/v1/config",
    responses((status = 200, description = "Client settings", body = ClientConfig))
)]
pub async fn get_client_config(State(config): State<AppConfig>) -> Json<ClientConfig> {
    Json(ClientConfig {
        api_base_url: config.api_base_url,
        payment_publishable_key: config.payment_publishable_key,
        currency: config.currency,
    })
}
