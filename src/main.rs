use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use cms_backend::{
    AppState,
    cache::RedisCache,
    clock::SystemClock,
    config::Config,
    notify::{LogNotifier, Notifier, WebhookNotifier},
    repository::PgRepository,
    routes,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'cms_backend';").await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let cache = Arc::new(RedisCache::new(Arc::new(redis_client)));

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => {
            tracing::warn!("NOTIFY_WEBHOOK_URL not set, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );

    let state = AppState::new(
        config,
        Arc::new(PgRepository::new(pool)),
        cache,
        Arc::new(SystemClock),
        notifier,
    );
    let router = routes::router(state);

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = router.layer(tower_http::cors::CorsLayer::permissive());

    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
