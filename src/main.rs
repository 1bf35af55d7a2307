use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use storefront_api::{
    AppState,
    auth::hash_password,
    config::{AppConfig, Env},
    create_router,
    models::{NewUser, Role},
    payments::{MockPaymentGateway, PaymentState, StripeGateway},
    repository::{PostgresRepository, RepositoryState},
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// bootstrap_super_admin
///
/// Creates the configured SUPER_ADMIN account on first start. Does nothing when either
/// variable is missing or the email is already registered.
async fn bootstrap_super_admin(repo: &RepositoryState, config: &AppConfig) -> Result<(), storefront_api::ApiError> {
    let (Some(email), Some(password)) = (&config.super_admin_email, &config.super_admin_password) else {
        return Ok(());
    };
    let email = email.trim().to_lowercase();

    if repo.find_user_by_email(&email).await?.is_some() {
        tracing::debug!(%email, "super admin already present");
        return Ok(());
    }

    let password_hash = hash_password(password.clone(), config.bcrypt_cost).await?;
    let user = repo
        .create_user(NewUser {
            email,
            name: "Super Admin".to_string(),
            password_hash,
            role: Role::SuperAdmin,
        })
        .await?;
    tracing::info!(user_id = %user.id, "super admin account created");
    Ok(())
}

/// main
///
/// Entry point: configuration, logging, database (with migrations), payment gateway and
/// the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging filter: RUST_LOG first, local defaults otherwise.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storefront_api=debug,tower_http=info,axum=trace".into());

    // 3. Pretty logs locally, JSON lines in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Database pool and embedded migrations
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Database migrations failed.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    if let Err(err) = bootstrap_super_admin(&repo, &config).await {
        tracing::error!(error = ?err, "super admin bootstrap failed");
    }

    // 5. Payment gateway: Stripe when a secret key is configured, the mock otherwise.
    let payments: PaymentState = if config.payment_secret_key.is_empty() {
        tracing::warn!("STRIPE_SECRET_KEY not set, using the mock payment gateway");
        Arc::new(MockPaymentGateway::new())
    } else {
        Arc::new(StripeGateway::new(&config.payment_api_base, &config.payment_secret_key))
    };

    // 6. State, router and server
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState::new(repo, payments, config));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {bind_addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://{bind_addr}/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
