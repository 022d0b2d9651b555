//! Core realm server implementation.
//!
//! [`RealmServer`] owns the shared services, the dispatch table and the
//! accept loop. Each accepted socket is registered as a session and handed to
//! its own task; nothing a single connection does can stop the loop.

use crate::{
    bootstrap::SessionBootstrap,
    config::ServerConfig,
    context::ServerContext,
    dispatch::DispatchTable,
    doodad::DoodadFuncRegistry,
    error::ServerError,
    handlers,
    server::connection::{handle_connection, ConnectionLimits},
    shutdown::ShutdownState,
    world::World,
};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// The realm game server.
pub struct RealmServer {
    /// Server configuration settings
    config: ServerConfig,

    /// Connection manager, world and doodad registry shared with handlers
    context: Arc<ServerContext>,

    /// Opcode routes, fixed once the server starts
    dispatch: Arc<DispatchTable>,

    /// Picks the entity each new connection controls
    bootstrap: Arc<dyn SessionBootstrap>,
}

impl std::fmt::Debug for RealmServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealmServer")
            .field("config", &self.config)
            .field("context", &self.context)
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}

impl RealmServer {
    /// Creates a server with the default packet handlers and the built-in
    /// doodad functions.
    pub fn new(
        config: ServerConfig,
        world: Arc<dyn World>,
        bootstrap: Arc<dyn SessionBootstrap>,
    ) -> Result<Self, ServerError> {
        let dispatch = handlers::default_table()
            .map_err(|e| ServerError::Internal(format!("Handler registration failed: {e}")))?;
        let doodads = Arc::new(DoodadFuncRegistry::with_builtins());
        Ok(Self {
            config,
            context: Arc::new(ServerContext::new(world, doodads)),
            dispatch: Arc::new(dispatch),
            bootstrap,
        })
    }

    /// Replaces the dispatch table.
    pub fn with_dispatch(mut self, dispatch: DispatchTable) -> Self {
        self.dispatch = Arc::new(dispatch);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Shared services. Doodad functions may be registered here at any time.
    pub fn context(&self) -> Arc<ServerContext> {
        self.context.clone()
    }

    pub fn doodads(&self) -> &DoodadFuncRegistry {
        &self.context.doodads
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| {
                ServerError::Network(format!("Failed to bind {}: {e}", self.config.bind_address))
            })
    }

    /// Binds the configured address and serves until shutdown is initiated.
    pub async fn start_with_shutdown_state(
        &self,
        shutdown_state: ShutdownState,
    ) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_state).await
    }

    /// Accepts connections on `listener` until shutdown is initiated, then
    /// tears every connection down and waits for their tasks.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown_state: ShutdownState,
    ) -> Result<(), ServerError> {
        let local = listener
            .local_addr()
            .map_err(|e| ServerError::Network(e.to_string()))?;
        info!("🚀 Realm server listening on {}", local);
        info!(
            "📦 {} packet routes, {} doodad functions",
            self.dispatch.len(),
            self.context.doodads.len()
        );

        let limits = ConnectionLimits::from(&self.config);
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        loop {
            let (stream, addr) = tokio::select! {
                _ = shutdown_state.wait() => {
                    info!("🛑 Accept loop stopping - shutdown initiated");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                },
            };

            if self.context.manager.len() >= self.config.max_connections {
                warn!(
                    "🚫 Refusing {}: {} connections open (limit {})",
                    addr,
                    self.context.manager.len(),
                    self.config.max_connections
                );
                drop(stream);
                continue;
            }
            if let Err(e) = stream.set_nodelay(true) {
                debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
            }

            let (session, outbound) = self.context.manager.add_session(
                addr,
                self.config.protocol_revision,
                self.config.outbound_queue_capacity,
            );
            let server = self.context.clone();
            let dispatch = self.dispatch.clone();
            let bootstrap = self.bootstrap.clone();

            tasks.retain(|task| !task.is_finished());
            tasks.push(tokio::spawn(async move {
                let id = session.id();
                if let Err(e) = handle_connection(
                    stream, session, outbound, server, dispatch, bootstrap, limits,
                )
                .await
                {
                    warn!("Connection {} ended with error: {}", id, e);
                }
            }));
        }

        info!("🧹 Closing {} connections...", self.context.manager.len());
        self.context
            .manager
            .teardown_all(self.context.world.as_ref());
        join_all(tasks).await;

        let stats = self.context.manager.total_stats();
        info!(
            "📊 Frames handled: {}, unknown opcodes: {}, decode failures: {}, delivery failures: {}",
            stats.frames_handled,
            stats.unknown_opcodes,
            stats.decode_failures,
            stats.delivery_failures
        );
        info!("Server stopped");
        Ok(())
    }
}
