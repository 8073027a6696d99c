use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use threadwatch_core::{
    feed::FeedSource,
    fetcher::{FetchPolicy, ProxyPool},
    image_cache::ImageCacher,
    load_config,
    notify::Notifier,
    thread_page::{BrowserLauncher, ThreadScraper},
    validate_config, BrowserThreadScraper, ChangeDetector, ImageCache, PushoverNotifier, ReqwestTransport,
    ResilientFetcher, RssFeedClient, SqliteTrackingStore, SyncOrchestrator, SyncScheduler, TrackingStore,
    WebDriverLauncher,
};
use threadwatch_server::{api::create_router, state::AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,tower_http=debug".into()),
    );
    if std::env::var("THREADWATCH_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let config_path = std::env::var("THREADWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Database path: {:?}", config.database.path);
    info!("Forum: {}", config.forum.base_url);

    let store: Arc<dyn TrackingStore> = Arc::new(
        SqliteTrackingStore::new(&config.database.path).context("Failed to open tracking store")?,
    );
    info!("Tracking store initialized");

    // Outbound HTTP: one transport and proxy pool shared by feed and images
    let transport =
        Arc::new(ReqwestTransport::new(&config.fetcher.user_agent).context("Failed to build HTTP client")?);
    let pool = Arc::new(ProxyPool::from_config(&config.fetcher));
    let fetcher = Arc::new(ResilientFetcher::new(
        transport,
        pool,
        FetchPolicy::from(&config.fetcher),
    ));

    let images: Arc<dyn ImageCacher> = Arc::new(ImageCache::new(Arc::clone(&fetcher), &config.image_cache));
    let feed: Arc<dyn FeedSource> = Arc::new(RssFeedClient::new(
        Arc::clone(&fetcher),
        Arc::clone(&images),
        &config.forum,
    ));

    let launcher: Arc<dyn BrowserLauncher> = Arc::new(
        WebDriverLauncher::new(&config.scraper, &config.fetcher.user_agent)
            .context("Failed to build WebDriver client")?,
    );
    let scraper: Arc<dyn ThreadScraper> =
        Arc::new(BrowserThreadScraper::new(launcher, &config.forum, &config.scraper));
    info!("Thread scraper using WebDriver at {}", config.scraper.webdriver_url);

    let notifier: Arc<dyn Notifier> =
        Arc::new(PushoverNotifier::new(&config.push).context("Failed to build push client")?);

    let detector = Arc::new(ChangeDetector::new(
        Arc::clone(&store),
        Arc::clone(&feed),
        Arc::clone(&scraper),
        images,
        Arc::clone(&notifier),
        config.detector.clone(),
    ));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        store,
        detector,
        feed,
        scraper,
        notifier,
        config.sync.clone(),
        &config.detector,
    ));

    let scheduler = SyncScheduler::new(Arc::clone(&orchestrator), config.sync.clone());
    scheduler.start();

    let state = Arc::new(AppState::new(config.clone(), orchestrator));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    if scheduler.is_running() {
        scheduler.stop();
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
