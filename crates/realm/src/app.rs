//! Application lifecycle: build the server from configuration, run it until
//! a signal arrives, then shut it down in order.

use crate::{
    config::AppConfig,
    logging::display_banner,
    signals::{setup_signal_handlers, wait_for_signal},
};
use realm_server::{InMemoryWorld, RealmServer, ShutdownState, SpawnOnConnect};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How long the accept loop and connection tasks get to wind down.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(8);

/// The realm server application.
///
/// Owns the validated configuration, the in-memory world and the server
/// wired to it.
pub struct Application {
    config: AppConfig,
    world: Arc<InMemoryWorld>,
    server: RealmServer,
}

impl Application {
    /// Validates `config` and builds the world and server.
    ///
    /// Every new connection is given a freshly spawned unit at the origin.
    pub fn new(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        config
            .validate()
            .map_err(|e| format!("Configuration validation failed: {e}"))?;

        display_banner();

        let server_config = config.to_server_config()?;
        let world = Arc::new(InMemoryWorld::new(server_config.visibility_radius));
        let bootstrap = Arc::new(SpawnOnConnect::new(world.clone()));
        let server = RealmServer::new(server_config, world.clone(), bootstrap)?;

        Ok(Self {
            config,
            world,
            server,
        })
    }

    pub fn server(&self) -> &RealmServer {
        &self.server
    }

    pub fn world(&self) -> &Arc<InMemoryWorld> {
        &self.world
    }

    /// Runs the server until a termination signal, then shuts down.
    ///
    /// A second signal during shutdown exits the process immediately. If the
    /// server stops on its own (for example when the bind fails) its error is
    /// returned.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting realm server application");
        self.log_configuration_summary();

        let context = self.server.context();
        let world = self.world;
        let shutdown_state = ShutdownState::new();

        let mut server_handle = {
            let server = self.server;
            let shutdown_state = shutdown_state.clone();
            tokio::spawn(async move { server.start_with_shutdown_state(shutdown_state).await })
        };

        info!("🛑 Press Ctrl+C to gracefully shutdown");

        tokio::select! {
            signal = setup_signal_handlers(&shutdown_state) => signal?,
            finished = &mut server_handle => {
                finished??;
                warn!("Server stopped without a shutdown signal");
                return Ok(());
            }
        }

        tokio::spawn(async move {
            if let Err(e) = wait_for_signal().await {
                error!("Failed to set up forced shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown signal received again, exiting immediately");
            std::process::exit(1);
        });

        info!("⏳ Waiting for connections to close...");
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut server_handle).await {
            Ok(Ok(Ok(()))) => info!("✅ Server task completed gracefully"),
            Ok(Ok(Err(e))) => error!("❌ Server error during shutdown: {e}"),
            Ok(Err(e)) => error!("❌ Server task failed: {e}"),
            Err(_) => {
                warn!(
                    "⏰ Server task did not complete within {:?}, aborting",
                    SHUTDOWN_TIMEOUT
                );
                server_handle.abort();
            }
        }
        shutdown_state.complete_shutdown();

        info!(
            "📊 {} sessions left registered, {} entities left in the world",
            context.manager.len(),
            world.len()
        );
        info!("✅ Realm server shutdown complete");
        Ok(())
    }

    fn log_configuration_summary(&self) {
        let server = &self.config.server;
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", server.bind_address);
        info!("  👥 Max connections: {}", server.max_connections);
        info!(
            "  📦 Max frame payload: {} bytes, outbound queue: {} frames",
            server.max_frame_payload, server.outbound_queue_capacity
        );
        info!(
            "  🧾 Protocol revision: {}, decode failure limit: {}",
            server.protocol_revision, server.max_decode_failures
        );
        info!("  👁️ Visibility radius: {}", server.visibility_radius);
    }
}
