use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use common::cache::{RedisConfig, RedisPool};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use storefront::{
    AppState,
    admission::{PasswordResetGate, WindowPolicy},
    config::{AppConfig, RateLimitBackend},
    create_router,
    jwt::JwtService,
    mailer::Mailer,
    schema, seed,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting storefront service");

    let config = AppConfig::from_env()?;

    // The service also runs without a database; DB-backed endpoints then answer 503
    let pool = common::database::connect_from_env().await;
    schema::reconcile_at_startup(pool.as_ref()).await;
    if let Some(pool) = &pool {
        seed::seed_defaults(pool).await;
        seed::ensure_admin(pool, &config).await;
    }

    let policy = WindowPolicy {
        limit: config.rate_limit_max,
        window: Duration::from_secs(config.rate_limit_window_seconds),
    };
    let reset_gate = match config.rate_limit_backend {
        RateLimitBackend::Memory => {
            PasswordResetGate::in_memory(policy, config.rate_limit_empty_email)
        }
        RateLimitBackend::Redis => {
            let redis_pool = RedisPool::new(&RedisConfig::from_env())?;
            PasswordResetGate::redis(redis_pool, policy, config.rate_limit_empty_email)
        }
    };
    let _sweeper = reset_gate
        .schedule_sweep(Duration::from_secs(config.rate_limit_sweep_seconds))
        .await?;
    info!(
        "Password reset admission: {} per {}s ({:?} backend)",
        policy.limit, config.rate_limit_window_seconds, config.rate_limit_backend
    );

    let app_state = AppState {
        db_pool: pool,
        jwt_service: JwtService::new(&config.jwt_secret, config.jwt_expiry_seconds),
        mailer: Mailer::from_config(&config),
        reset_gate,
        config: Arc::new(config.clone()),
    };

    // Start the web server
    let app = create_router(app_state);

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("Storefront service listening on 0.0.0.0:{}", config.port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
