use crate::{
    AppState,
    handlers::{account, coupons, orders, reviews},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Customer features: profile, checkout, order history, coupon preview and reviews.
///
/// Access Control Strategy:
/// Every prefix here (`/me`, `/orders`, `/reviews`, `/coupons/apply`) is listed in the
/// route guard table with all three roles, so by the time a handler runs the session
/// has been resolved and stored in the request extensions. Handlers still take
/// `AuthUser` as an argument and use it for ownership checks (e.g. `get_order`).
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/PATCH /me
        // Read or update the caller's own account (name, password).
        .route("/me", get(account::get_me).patch(account::update_me))
        // GET /me/orders
        .route("/me/orders", get(orders::get_my_orders))
        // --- Checkout ---
        // POST /orders
        // Places an order from the cart and opens a payment intent for it.
        .route("/orders", post(orders::checkout))
        // GET /orders/{id}
        // Owner or staff only; anyone else gets a 404.
        .route("/orders/{id}", get(orders::get_order))
        // POST /orders/{id}/cancel
        // Owner only, while the order is PENDING. Restores stock.
        .route("/orders/{id}/cancel", post(orders::cancel_order))
        // POST /coupons/apply
        // Discount preview; the coupon is only consumed at checkout.
        .route("/coupons/apply", post(coupons::apply_coupon))
        // POST /reviews
        // Requires a DELIVERED order containing the product.
        .route("/reviews", post(reviews::create_review))
}
