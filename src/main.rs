use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::Router;
use http::StatusCode;
use tokio::sync::broadcast;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod backup;
mod cache;
mod config;
mod context_matcher;
mod db;
mod domain;
mod envelope;
mod error;
mod heuristics;
mod ingestion;
mod llm;
mod popup;
mod routes;
mod scheduler;
mod services;
mod store;
mod tier;
mod transport;

use config::Config;
use context_matcher::ContextMatcher;
use envelope::DeadLetterLog;
use ingestion::IngestionPipeline;
use llm::LlmClient;
use scheduler::Scheduler;
use services::init;
use store::DocumentStore;
use tier::{Mode, TierOrchestrator};
use transport::Transport;

pub struct AppState {
    pub store: Arc<DocumentStore>,
    pub llm: Arc<LlmClient>,
    pub tier: Arc<TierOrchestrator>,
    pub transport: Arc<Transport>,
    pub ingestion: Arc<IngestionPipeline>,
    pub context_matcher: Arc<ContextMatcher>,
    pub scheduler: Arc<Scheduler>,
    pub config: Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "argus=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting the proactive memory assistant server");

    let pool = init::init_db(&config).await?;

    let dead_letter = Arc::new(DeadLetterLog::new(config.paths.dead_letter_path.clone()));
    let store = Arc::new(DocumentStore::new(pool, dead_letter, config.debug_errors).await?);

    let llm = Arc::new(LlmClient::new(
        config.llm.base_url.clone(),
        config.llm.api_key.clone(),
        config.llm.chat_model.clone(),
        config.llm.embedding_model.clone(),
        config.llm.embedding_dim,
    ));

    let tier = Arc::new(TierOrchestrator::new(
        Mode::parse(&config.ai_tier.mode),
        Duration::from_secs(config.ai_tier.cooldown_base_sec),
        Duration::from_secs(config.ai_tier.health_probe_interval_sec),
    ));

    let transport = Transport::new();

    let ingestion = Arc::new(IngestionPipeline::new(
        store.clone(),
        llm.clone(),
        tier.clone(),
        transport.clone(),
        config.ai_tier.cache_max_size,
        Duration::from_secs(config.ai_tier.cache_ttl_sec),
        config.ingestion.clone(),
    ));

    let context_matcher = Arc::new(ContextMatcher::new(
        store.clone(),
        llm.clone(),
        tier.clone(),
        config.ai_tier.cache_max_size,
        config.ingestion.hot_window_days,
    ));

    let scheduler = Scheduler::new(
        store.clone(),
        llm.clone(),
        transport.clone(),
        config.scheduler.clone(),
        config.backup.clone(),
        config.paths.clone(),
    );

    let app_state = Arc::new(AppState {
        store,
        llm,
        tier,
        transport,
        ingestion,
        context_matcher,
        scheduler: scheduler.clone(),
        config: config.clone(),
    });

    let (shutdown_tx, _) = broadcast::channel(1);
    let worker_handles = scheduler.spawn(shutdown_tx.clone());
    tracing::info!("Spawned {} scheduler workers", worker_handles.len());

    // Rate-limit only the inbound webhook endpoint (spec §6): this is the
    // single path driven by an external, untrusted caller volume.
    let mut webhooks_builder = GovernorConfigBuilder::default();
    webhooks_builder.per_second(config.rate_limit.webhook_per_second.into());
    webhooks_builder.burst_size(config.rate_limit.webhook_burst.into());
    webhooks_builder.key_extractor(SmartIpKeyExtractor);
    webhooks_builder.error_handler(|error: GovernorError| -> http::Response<Body> {
        match error {
            GovernorError::TooManyRequests { wait_time, headers } => {
                let body = serde_json::json!({
                    "error": {
                        "code": "RATE_LIMITED",
                        "message": "Rate limit exceeded",
                        "details": { "retry_after_seconds": wait_time }
                    }
                })
                .to_string();

                let mut resp = http::Response::new(Body::from(body));
                *resp.status_mut() = StatusCode::TOO_MANY_REQUESTS;
                resp.headers_mut().insert(
                    http::header::CONTENT_TYPE,
                    http::HeaderValue::from_static("application/json"),
                );
                if let Some(hmap) = headers {
                    for (name, value) in hmap.iter() {
                        resp.headers_mut().append(name.clone(), value.clone());
                    }
                }
                resp.headers_mut().insert(
                    http::header::RETRY_AFTER,
                    http::HeaderValue::from_str(&wait_time.to_string()).unwrap(),
                );
                resp
            }
            GovernorError::UnableToExtractKey => {
                let mut resp = http::Response::new(Body::from(
                    "Unable to determine client IP for rate limiting",
                ));
                *resp.status_mut() = StatusCode::BAD_REQUEST;
                resp
            }
            GovernorError::Other { code, msg, headers } => {
                let body = msg.unwrap_or_else(|| "Rate limiting error".to_string());
                let mut resp = http::Response::new(Body::from(body));
                let status = StatusCode::from_u16(code.as_u16())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                *resp.status_mut() = status;
                if let Some(hmap) = headers {
                    for (name, value) in hmap.iter() {
                        resp.headers_mut().append(name.clone(), value.clone());
                    }
                }
                resp
            }
        }
    });
    let webhooks_gov_conf = Arc::new(
        webhooks_builder
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build webhooks governor config"))?,
    );

    {
        let limiter = webhooks_gov_conf.limiter().clone();
        let interval = Duration::from_secs(60);
        std::thread::spawn(move || loop {
            std::thread::sleep(interval);
            tracing::debug!("webhook rate limiter size: {}", limiter.len());
            limiter.retain_recent();
        });
    }
    let webhooks_rate_layer = GovernorLayer {
        config: webhooks_gov_conf.clone(),
    };

    let app = Router::new()
        .nest("/api", routes::health::router())
        .nest(
            "/api/webhook",
            routes::webhook::router().layer(webhooks_rate_layer),
        )
        .nest("/api/context-check", routes::context_check::router())
        .nest("/api/chat", routes::chat::router())
        .nest("/api/form-check", routes::form_check::router())
        .nest("/api/events", routes::events::router())
        .route("/api/stats", axum::routing::get(routes::events::stats))
        .nest("/api/backup", routes::backup::router())
        .nest("/ws", routes::ws::router())
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(
            // The bridge and browser extension call in from an origin the
            // server has no fixed knowledge of, unlike the teacher's
            // single-frontend deployment (spec §6: no auth on this surface).
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::PATCH,
                    http::Method::DELETE,
                    http::Method::OPTIONS,
                ])
                .allow_headers([http::header::CONTENT_TYPE, http::header::ACCEPT]),
        );

    let host = config.server.host.clone();
    let port = config.server.port;
    let addr = format!("{host}:{port}");

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    let _ = shutdown_tx.send(());
    Ok(())
}
