use crate::{
    AppState,
    handlers::{self, account, catalog, products},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints open to anonymous callers: the read side of the catalog, sign-up/sign-in
/// and client bootstrap settings. None of these paths appear in the route guard table,
/// so no session is resolved for them.
///
/// Catalog reads only ever return active products; inactive ones are visible under
/// `/admin/products`.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /config
        // API base URL, publishable payment key and currency for the storefront client.
        .route("/config", get(handlers::get_client_config))
        // --- Identity ---
        // POST /auth/register
        // Always creates a CUSTOMER; the response carries a session token.
        .route("/auth/register", post(account::register))
        // POST /auth/login
        .route("/auth/login", post(account::login))
        // --- Catalog ---
        .route("/categories", get(catalog::list_categories))
        .route("/categories/{id}", get(catalog::get_category))
        // GET /subcategories?category_id=...
        .route("/subcategories", get(catalog::list_subcategories))
        .route("/brands", get(catalog::list_brands))
        // GET /products?search=&category_id=&brand_id=&min_price=&max_price=&sort=&page=&limit=
        // Paginated; `limit` is capped at 100.
        .route("/products", get(products::get_products))
        .route("/products/{id}", get(products::get_product))
        .route("/products/{id}/reviews", get(products::get_product_reviews))
}
