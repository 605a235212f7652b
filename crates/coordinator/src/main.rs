//! AgentLoop Coordinator - Main Entry Point
//!
//! Loads configuration, builds the agent roster and serves the HTTP and
//! WebSocket API until interrupted.

use agentloop_common::{AgentLoopConfig, Result};
use agentloop_coordinator::{serve, ActivitySimulator, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path =
        std::env::var("AGENTLOOP_CONFIG").unwrap_or_else(|_| "configs/agentloop.yaml".to_string());
    let config = AgentLoopConfig::load(&config_path)?;

    // Initialize logging
    let level = &config.observability.log_level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "agentloop_coordinator={level},agentloop_agent={level},tower_http={level}"
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting AgentLoop Coordinator");
    info!(
        "Configuration loaded from {}: bind={}, model={}, agents={}",
        config_path,
        config.bind_addr(),
        config.model.model_name,
        config.agents.len()
    );

    let addr: SocketAddr = config.bind_addr().parse()?;
    let state = Arc::new(AppState::from_config(&config));
    let shutdown = CancellationToken::new();

    // Start activity simulator
    let simulator_handle = if config.simulator.enabled {
        let simulator = ActivitySimulator::new(
            state.coordinator.clone(),
            state.connections.clone(),
            config.simulator_interval(),
        );
        Some(simulator.start(shutdown.clone()))
    } else {
        info!("Activity simulator disabled");
        None
    };

    let mut server = tokio::spawn(serve(state, addr, shutdown.clone()));

    info!("AgentLoop Coordinator running");

    // Wait for shutdown signal
    let server_result = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal");
            shutdown.cancel();
            (&mut server).await
        }
        result = &mut server => result,
    };
    shutdown.cancel();

    match server_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Server error: {}", e),
        Err(e) => error!("Server task failed: {}", e),
    }
    if let Some(handle) = simulator_handle {
        if let Err(e) = handle.await {
            error!("Simulator task failed: {}", e);
        }
    }

    info!("AgentLoop Coordinator shutdown complete");
    Ok(())
}
