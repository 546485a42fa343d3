use std::sync::Arc;
use std::time::{Duration, Instant};

use rentbox_gateway::audit::TransactionLog;
use rentbox_gateway::handler::{CommandRegistry, HandlerContext, ReturnNotification};
use rentbox_gateway::transport::TransportSupervisor;
use rentbox_gateway::{CommandBridge, GatewayConfig, LivenessTracker, Mailbox};

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = GatewayConfig::from_env();
    info!(
        broker = %config.broker_host,
        port = config.broker_port,
        namespace = %config.topic_namespace,
        "gateway starting"
    );

    let mailbox = Arc::new(Mailbox::new());
    let audit = Arc::new(TransactionLog::new());
    let liveness = Arc::new(LivenessTracker::new(
        config.heartbeat_window,
        config.activity_window,
    ));

    let (return_tx, mut return_rx) = mpsc::channel::<ReturnNotification>(64);
    let registry = Arc::new(CommandRegistry::with_default_handlers(HandlerContext {
        mailbox: mailbox.clone(),
        audit: audit.clone(),
        returns: return_tx,
    }));

    let supervisor = TransportSupervisor::start(&config, registry, liveness.clone());
    // Call surface handed to the backend API layer; kept alive for the
    // process lifetime
    let _bridge = Arc::new(CommandBridge::new(
        supervisor,
        mailbox.clone(),
        liveness.clone(),
        config.topic_namespace.clone(),
    ));

    // Consume battery-return notifications
    tokio::spawn(async move {
        while let Some(event) = return_rx.recv().await {
            info!(
                device = %event.device_id,
                slot = event.slot,
                serial = %event.serial,
                battery_level = event.battery_level,
                "battery returned"
            );
        }
        error!("return notification channel closed");
    });

    // Expire stale mailbox slots and liveness entries
    let sweep_mailbox = mailbox.clone();
    let sweep_liveness = liveness.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            let expired = sweep_mailbox.sweep();
            let pruned = sweep_liveness.sweep(Instant::now());
            if expired > 0 || pruned > 0 {
                info!(expired, pruned, "sweep completed");
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received, exiting");
    Ok(())
}
