//! Choosing the entity a new connection controls.

use crate::connection::Session;
use crate::error::ServerError;
use crate::world::{EntityHandle, InMemoryWorld, Position};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Decides which entity a freshly accepted session controls.
///
/// Runs once per connection before any frame is read. An error refuses the
/// session and closes the connection.
#[async_trait]
pub trait SessionBootstrap: Send + Sync + 'static {
    async fn bootstrap(&self, session: &Session) -> Result<EntityHandle, ServerError>;
}

/// Spawns a fresh unit for every connection.
#[derive(Debug, Clone)]
pub struct SpawnOnConnect {
    world: Arc<InMemoryWorld>,
    spawn_point: Position,
}

impl SpawnOnConnect {
    pub fn new(world: Arc<InMemoryWorld>) -> Self {
        Self {
            world,
            spawn_point: Position::default(),
        }
    }

    pub fn at(mut self, spawn_point: Position) -> Self {
        self.spawn_point = spawn_point;
        self
    }
}

#[async_trait]
impl SessionBootstrap for SpawnOnConnect {
    async fn bootstrap(&self, session: &Session) -> Result<EntityHandle, ServerError> {
        let unit = self
            .world
            .spawn_unit(self.spawn_point)
            .ok_or_else(|| ServerError::Rejected("world has no free object ids".to_string()))?;
        debug!("Spawned unit {} for connection {}", unit, session.id());
        Ok(unit)
    }
}
