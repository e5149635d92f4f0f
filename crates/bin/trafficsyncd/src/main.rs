use tokio::signal;
use tracing_subscriber::EnvFilter;
use trafficsync_app::controller::Controller;
use trafficsync_app::timer::SignalTimer;
use trafficsyncd::config::Config;
use trafficsyncd::layout;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_tracing(&config.logging.filter);

    let registry = layout::build(&config)?;
    for light in registry.lights() {
        let name = light.name().to_string();
        light.subscribe_state_changed(move |event| {
            tracing::info!(light = %name, state = %event.state, "light changed");
        });
    }

    let mut controller = Controller::new(registry, SignalTimer::new(config.timer_settings()));
    controller.start()?;

    shutdown_signal().await;
    controller.stop().await?;
    Ok(())
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter {filter:?}: {err}, falling back to info");
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Wait for SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(%err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
