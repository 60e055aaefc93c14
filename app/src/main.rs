//! Raqamly Dashboard shell
//!
//! Mounts the auth gate against the configured backend and logs every view
//! it renders until Ctrl-C.

use anyhow::{Context, Result};

use raqamly_core::{Config, Dashboard, GateView};

#[tokio::main]
async fn main() -> Result<()> {
    raqamly_core::init_logging();

    let config = Config::from_env().context("failed to load configuration")?;
    let dashboard = Dashboard::connect(config).context("failed to start dashboard")?;
    let gate = dashboard.gate().clone();
    let mut views = gate.views();

    let first = gate.mount().await;
    log_view(&dashboard, first);
    views.borrow_and_update();

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = *views.borrow_and_update();
                log_view(&dashboard, view);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    gate.unmount();
    Ok(())
}

fn log_view(dashboard: &Dashboard, view: GateView) {
    let location = dashboard.navigator().current();
    match view.route_set() {
        Some(routes) => {
            let page = routes.resolve(&location).map(|route| route.title());
            tracing::info!(
                routes = routes.name(),
                location = %location,
                page = page.unwrap_or("Not Found"),
                "Rendered"
            );
        }
        None => tracing::info!("Loading session"),
    }
}
