use crate::{
    AppState,
    handlers::{admin, catalog, coupons, orders, products},
};
use axum::{
    Router,
    routing::{get, patch, post, put},
};

/// Admin Router Module
///
/// Catalog management, coupons, order fulfilment and the dashboard. Nested under
/// `/admin`.
///
/// Access Control:
/// The route guard admits ADMIN and SUPER_ADMIN to `/admin`, and only SUPER_ADMIN to
/// `/admin/users` (the longer prefix wins). Nothing in this module re-checks roles.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/stats
        // Users, products, orders, pending orders, low stock and delivered revenue.
        .route("/stats", get(admin::get_admin_stats))
        // --- Catalog taxonomy ---
        .route("/categories", post(catalog::create_category))
        .route(
            "/categories/{id}",
            put(catalog::update_category).delete(catalog::delete_category),
        )
        .route("/subcategories", post(catalog::create_subcategory))
        .route(
            "/subcategories/{id}",
            put(catalog::update_subcategory).delete(catalog::delete_subcategory),
        )
        .route("/brands", post(catalog::create_brand))
        .route(
            "/brands/{id}",
            put(catalog::update_brand).delete(catalog::delete_brand),
        )
        // --- Products ---
        // GET /admin/products lists inactive products too.
        .route(
            "/products",
            get(products::get_admin_products).post(products::create_product),
        )
        .route(
            "/products/{id}",
            put(products::update_product).delete(products::delete_product),
        )
        // --- Coupons ---
        .route(
            "/coupons",
            get(coupons::list_coupons).post(coupons::create_coupon),
        )
        .route(
            "/coupons/{id}",
            put(coupons::update_coupon).delete(coupons::delete_coupon),
        )
        // --- Orders ---
        // GET /admin/orders?status=PENDING
        .route("/orders", get(orders::get_admin_orders))
        // PATCH /admin/orders/{id}/status
        // Legal lifecycle moves only; CANCELED restores stock.
        .route("/orders/{id}/status", patch(orders::update_order_status))
        // --- Users (SUPER_ADMIN only, enforced by the guard's /admin/users rule) ---
        .route("/users", get(admin::list_users))
        .route("/users/{id}", axum::routing::delete(admin::delete_user))
        .route("/users/{id}/role", patch(admin::update_user_role))
}
