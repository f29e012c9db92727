//! Circle monitor entry point.
//!
//! `circle-monitor [--config path] [--once] [--dump]`

use std::sync::Arc;

use circle_core::ScopeId;
use circle_monitor::backend::HttpBackend;
use circle_monitor::config::{CliArgs, MonitorConfig};
use circle_monitor::error::MonitorError;
use circle_monitor::log_buffer::{LogBuffer, LogEntry};
use circle_monitor::telemetry;
use circle_store::{AlertSnapshot, AppContext, StoreReport};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Serialize)]
struct Dump {
    active_account: ScopeId,
    stores: Vec<StoreReport>,
    alerts: AlertSnapshot,
    logs: Vec<LogEntry>,
}

#[tokio::main]
async fn main() -> Result<(), MonitorError> {
    let args = CliArgs::from_env();
    let config = MonitorConfig::load(&args)?;
    let logs = telemetry::init(&config.log)?;

    let backend = Arc::new(HttpBackend::new(&config)?);
    let ctx = AppContext::builder(backend)
        .configs(config.store_configs())
        .active_account(config.active_scope())
        .build()?;

    let _alerts = ctx.alerts().subscribe(|snapshot| match snapshot.current() {
        Some(alert) => info!(
            count = snapshot.alerts.len(),
            variant = ?alert.variant,
            message = %alert.message,
            "Alerts changed"
        ),
        None => info!("No active alerts"),
    });

    prime(&ctx).await;

    if args.once {
        if let Err(err) = ctx.status().poll_once().await {
            warn!(error = %err, "Status poll failed");
        }
    } else {
        let poller = ctx.status().spawn_polling(config.poll_interval());
        info!(interval_ms = config.poll_interval_ms, "Polling status until Ctrl-C");
        tokio::signal::ctrl_c().await?;
        poller.abort();
        info!("Shutting down");
    }

    if args.dump {
        print_dump(&ctx, &logs)?;
    }
    Ok(())
}

/// Load the stores that do not depend on the remote session.
async fn prime(ctx: &AppContext) {
    if let Err(err) = ctx.accounts().ensure().await {
        warn!(error = %err, "Failed to load stored accounts");
    }
    if let Err(err) = ctx.developer_mode().ensure().await {
        warn!(error = %err, "Failed to load developer mode");
    }
    if ctx.scope().active().is_some() {
        if let Err(err) = ctx.user().ensure().await {
            warn!(error = %err, "Failed to load current user");
        }
    }
}

fn print_dump(ctx: &AppContext, logs: &LogBuffer) -> Result<(), MonitorError> {
    let dump = Dump {
        active_account: ctx.scope().active(),
        stores: ctx.inspector().report(),
        alerts: ctx.alerts().snapshot(),
        logs: logs.entries(),
    };
    println!("{}", serde_json::to_string_pretty(&dump)?);
    Ok(())
}
