use std::sync::Arc;

use tracing::{error, info};

use ragcore::core::config::Config;
use ragcore::core::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config is validated before telemetry is initialized (DESIGN.md OQ-3):
    // a missing required env var must be visible even with no log sink set up.
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("startup failed: {e}");
            std::process::exit(1);
        }
    };

    ragcore::telemetry::init(&config);
    info!("starting ragcore");

    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .connect_timeout(config.http_connect_timeout)
        .build()?;

    let state = match AppState::new(config, http_client).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("failed to initialize application state: {}", e);
            std::process::exit(1);
        }
    };

    let app = ragcore::http::router(state.clone());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutting down, flushing caches");
    state.flush().await;
}
