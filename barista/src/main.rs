use barista::{
    router,
    store::{DrinkStore, InMemoryStore},
    AppState, Config,
};
use clap::Parser;
use color_eyre::eyre::WrapErr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    let gate = config
        .auth_gate()
        .wrap_err("unable to construct the key set client")?;

    if let Some(interval) = config.jwks_refresh_interval() {
        gate.verifier().keys().spawn_refresh(interval);
    }

    let store = if config.seed {
        InMemoryStore::with_sample_menu()
    } else {
        InMemoryStore::new()
    };
    tracing::info!(drinks = store.list().await?.len(), "menu ready");

    let app = router(AppState::new(gate, store));

    let listener = TcpListener::bind(config.bind)
        .await
        .wrap_err_with(|| format!("unable to listen on {}", config.bind))?;
    tracing::info!(
        bind = %config.bind,
        issuer = %config.issuer,
        audience = %config.audience,
        jwks.url = %config.jwks_url(),
        "serving drinks"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "unable to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
