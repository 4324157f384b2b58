//! Padel match backend entrypoint wiring REST, SSE, push fan-out and the record store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use padel_match_back::{
    config::AppConfig,
    dao::record_store::{InMemoryRecordStore, RecordStore},
    routes,
    services::push_transport::{NoopPushTransport, PushTransport},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let transport = build_transport(&config);
    let app_state = AppState::new(config, transport);

    attach_store(&app_state).await;
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the push transport: the HTTP gateway when configured, otherwise a no-op sink.
fn build_transport(config: &AppConfig) -> Arc<dyn PushTransport> {
    #[cfg(feature = "http-push")]
    if let Some(url) = config.push.gateway_url.as_deref() {
        use padel_match_back::services::push_transport::HttpPushTransport;

        match HttpPushTransport::new(url, config.fanout.push_timeout()) {
            Ok(transport) => {
                info!(gateway = url, "push deliveries go through the HTTP gateway");
                return Arc::new(transport);
            }
            Err(err) => error!(error = %err, "push gateway unusable; push disabled"),
        }
    }

    if config.push.gateway_url.is_some() && !cfg!(feature = "http-push") {
        warn!("push gateway configured but the http-push feature is disabled");
    }
    info!("push deliveries are dropped; only the inbox is written");
    Arc::new(NoopPushTransport)
}

/// Install the record store: MongoDB under supervision when `MONGO_URI` is set, the
/// in-memory store otherwise.
async fn attach_store(state: &SharedState) {
    #[cfg(feature = "mongo-store")]
    if let Ok(uri) = env::var("MONGO_URI") {
        use padel_match_back::{
            dao::{
                record_store::mongodb::{MongoConfig, MongoRecordStore},
                storage::StorageError,
            },
            services::storage_supervisor,
        };

        let db_name = env::var("MONGO_DB").ok();
        tokio::spawn(storage_supervisor::run(state.clone(), move || {
            let uri = uri.clone();
            let db_name = db_name.clone();
            async move {
                let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
                let store = MongoRecordStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn RecordStore>)
            }
        }));
        return;
    }

    info!("MONGO_URI not set; records are kept in memory");
    state
        .install_store(Arc::new(InMemoryRecordStore::new()))
        .await;
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
