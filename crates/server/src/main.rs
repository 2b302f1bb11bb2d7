//! Goldie server binary entrypoint.

use std::sync::Arc;

use chrono::Weekday;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use goldie_common::config::AppConfig;
use goldie_common::{db, shutdown};
use goldie_engine::dispatcher::FanOutDispatcher;
use goldie_engine::i18n::Catalog;
use goldie_engine::prices::PgValueStore;
use goldie_engine::render::HtmlTableRenderer;
use goldie_engine::subscription::PgSubscriptionStore;
use goldie_fetcher::importer::PriceImporter;
use goldie_fetcher::nbkr::NbkrClient;
use goldie_notifier::handler::{BotHandler, HandlerSettings};
use goldie_notifier::poller::UpdatePoller;
use goldie_notifier::telegram::TelegramClient;

use goldie_server::routes::create_router;
use goldie_server::scheduler::{DailySchedule, run_daily};
use goldie_server::state::{AppState, Readiness};

const PRICE_UPDATE_DAYS: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "goldie_server=info,goldie_engine=info,goldie_notifier=info,goldie_fetcher=info",
            )
        }))
        .json()
        .init();

    tracing::info!("Goldie starting...");

    // Load configuration
    let config = AppConfig::from_env()?;
    let offset = config.local_offset()?;

    // Connect to database and run migrations
    let pool = db::connect(&config.database_url, config.db_max_connections).await?;
    db::migrate(&pool).await?;

    let (trigger, shutdown) = shutdown::channel();
    let readiness = Readiness::new();

    // Health endpoint comes up first and reports 503 until the import is done
    let app = create_router(AppState::new(readiness.clone())).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(&config.health_addr).await?;
    tracing::info!(addr = %config.health_addr, "Health endpoint listening");
    let mut http_shutdown = shutdown.clone();
    let http = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { http_shutdown.triggered().await })
            .await
    });

    // Build collaborators
    let subscriptions = Arc::new(PgSubscriptionStore::new(pool.clone()));
    let values = Arc::new(PgValueStore::new(pool.clone()));
    let catalog = Arc::new(Catalog::embedded(&config.default_language)?);
    let renderer = Arc::new(HtmlTableRenderer::new(catalog.clone()));
    let telegram = Arc::new(TelegramClient::new(
        &config.telegram_api_url,
        &config.telegram_bot_token,
    )?);
    let importer = Arc::new(PriceImporter::new(
        Arc::new(NbkrClient::new(config.nbkr_url.clone())?),
        values.clone(),
        offset,
    ));

    // Back-fill price history, then open the gate
    if let Err(e) = importer.first_import().await {
        tracing::error!(error = %e, "First price import failed");
    }
    readiness.mark_ready();
    tracing::info!("Service ready");

    let dispatcher = Arc::new(FanOutDispatcher::new(
        values.clone(),
        subscriptions.clone(),
        telegram.clone(),
        renderer.clone(),
        config.default_language.clone(),
    ));

    let handler = Arc::new(BotHandler::new(
        telegram.clone(),
        subscriptions,
        values,
        catalog,
        renderer,
        HandlerSettings {
            default_language: config.default_language.clone(),
            offset,
            alert_at: config.alert_at,
            disabled_weekdays: config.calendar_disabled_weekdays.clone(),
        },
    ));
    let poller = UpdatePoller::new(telegram, handler, config.telegram_poll_timeout_secs);

    // Price refresh, Mon-Fri
    let price_job = tokio::spawn(run_daily(
        "price_update",
        DailySchedule::on_weekdays(config.price_update_at, PRICE_UPDATE_DAYS.to_vec(), offset),
        shutdown.clone(),
        move || {
            let importer = importer.clone();
            async move {
                if let Err(e) = importer.update_prices().await {
                    tracing::error!(error = %e, "Price update failed");
                }
            }
        },
    ));

    // Notification cycle, daily
    let cycle_shutdown = shutdown.clone();
    let alert_job = tokio::spawn(run_daily(
        "notification_cycle",
        DailySchedule::every_day(config.alert_at, offset),
        shutdown.clone(),
        move || {
            let dispatcher = dispatcher.clone();
            let ready = readiness.is_ready();
            let shutdown = cycle_shutdown.clone();
            async move {
                dispatcher.run_cycle(ready, shutdown).await;
            }
        },
    ));

    let poller_shutdown = shutdown.clone();
    let poller_task = tokio::spawn(async move { poller.run(poller_shutdown).await });

    // Run until Ctrl+C, then let every loop wind down
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping gracefully...");
    trigger.trigger();

    let (http, price_job, alert_job, poller_task) =
        tokio::join!(http, price_job, alert_job, poller_task);
    http??;
    price_job?;
    alert_job?;
    poller_task?;

    tracing::info!("Goldie stopped.");
    Ok(())
}
