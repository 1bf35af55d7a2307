use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
    routing::get,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod checkout;
pub mod config;
pub mod error;
pub mod extract;
pub mod guard;
pub mod handlers;
pub mod models;
pub mod payments;
pub mod repository;

// Route groups (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{ApiError, ErrorResponse};
pub use guard::RoutePolicy;
pub use payments::{MockPaymentGateway, PaymentState, StripeGateway};
pub use repository::{PostgresRepository, RepositoryState};

/// Every REST resource is served under this prefix.
pub const API_PREFIX: &str = "/api/v1";

/// ApiDoc
///
/// Aggregates the `#[utoipa::path]` handlers and their schemas into the OpenAPI
/// document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_client_config,
        handlers::account::register, handlers::account::login,
        handlers::account::get_me, handlers::account::update_me,
        handlers::catalog::list_categories, handlers::catalog::get_category,
        handlers::catalog::create_category, handlers::catalog::update_category,
        handlers::catalog::delete_category,
        handlers::catalog::list_subcategories, handlers::catalog::create_subcategory,
        handlers::catalog::update_subcategory, handlers::catalog::delete_subcategory,
        handlers::catalog::list_brands, handlers::catalog::create_brand,
        handlers::catalog::update_brand, handlers::catalog::delete_brand,
        handlers::products::get_products, handlers::products::get_product,
        handlers::products::get_product_reviews, handlers::products::get_admin_products,
        handlers::products::create_product, handlers::products::update_product,
        handlers::products::delete_product,
        handlers::coupons::apply_coupon, handlers::coupons::list_coupons,
        handlers::coupons::create_coupon, handlers::coupons::update_coupon,
        handlers::coupons::delete_coupon,
        handlers::orders::checkout, handlers::orders::get_my_orders, handlers::orders::get_order,
        handlers::orders::cancel_order, handlers::orders::get_admin_orders,
        handlers::orders::update_order_status,
        handlers::reviews::create_review,
        handlers::admin::get_admin_stats, handlers::admin::list_users,
        handlers::admin::update_user_role, handlers::admin::delete_user,
    ),
    components(
        schemas(
            models::Role, models::OrderStatus, models::DiscountType, models::User,
            models::Category, models::Subcategory, models::Brand, models::Product,
            models::Coupon, models::Order, models::OrderItem, models::OrderDetails,
            models::ShippingAddress, models::Review, models::PageMeta, models::AuthResponse,
            models::CouponQuote, models::PaymentSession, models::CheckoutResponse,
            models::ClientConfig, models::DashboardStats, models::ProductSort,
            error::ErrorResponse, error::ErrorEntry,
        )
    ),
    tags(
        (name = "storefront", description = "Storefront REST API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single, immutable container shared by every request. Handlers take the whole
/// state; extractors pull the part they need through `FromRef`.
#[derive(Clone)]
pub struct AppState {
    /// Persistence layer (PostgreSQL in production, in-memory doubles in tests).
    pub repo: RepositoryState,
    /// Payment provider client.
    pub payments: PaymentState,
    pub config: AppConfig,
    /// Route guard access table.
    pub policy: Arc<RoutePolicy>,
}

impl AppState {
    /// Builds the state with the storefront's access table.
    pub fn new(repo: RepositoryState, payments: PaymentState, config: AppConfig) -> Self {
        Self {
            repo,
            payments,
            config,
            policy: Arc::new(RoutePolicy::storefront()),
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for PaymentState {
    fn from_ref(app_state: &AppState) -> PaymentState {
        app_state.payments.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the route groups under `/api/v1`, then wraps everything in the route guard,
/// the panic catcher and the observability stack.
///
/// Layer order, outermost first: CORS, request id, tracing, request id propagation,
/// error stack rendering, panic catcher, route guard. The guard sits on the outer router,
/// so it sees full paths (`/api/v1/admin/...`) and also covers the 404 fallback.
pub fn create_router(state: AppState) -> Router {
    let exposes_stack = state.config.exposes_stack();

    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. API Assembly
    let api = Router::new()
        .merge(public::public_routes())
        .merge(authenticated::authenticated_routes())
        .nest("/admin", admin::admin_routes());

    let base_router = Router::new()
        // Documentation: Swagger UI and the OpenAPI JSON.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        .nest(API_PREFIX, api)
        // Unknown routes answer with the error envelope.
        .fallback(error::handler_404)
        // 3. Route guard: authentication and role checks for every protected prefix.
        .layer(middleware::from_fn_with_state(state.clone(), guard::route_guard))
        .with_state(state);

    // 4. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 4a. Generates a UUID x-request-id for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. Wraps the request/response lifecycle in a span carrying the request id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Echoes x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id))
                // 4d. Fills in `stack` on error envelopes outside production.
                .layer(middleware::from_fn_with_state(
                    exposes_stack,
                    error::render_error_stack,
                ))
                // 4e. A panicking handler still answers with the generic 500 envelope.
                .layer(CatchPanicLayer::custom(error::handle_panic)),
        )
        // 5. CORS (outermost)
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI and the `x-request-id` set by the layer
/// above, so every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
