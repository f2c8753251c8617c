//! # Server - TCP Listener
//!
//! [RpgServer] owns the listening socket and the shared [World]. Every
//! accepted connection runs in its own task (see [connection]); a failing
//! connection never affects the accept loop or other clients.
//!
//! ```rust,no_run
//! use rpgchat::config::Config;
//! use rpgchat::server::RpgServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let server = RpgServer::from_config(&config).await?;
//!     server.run().await
//! }
//! ```

pub mod commands;
pub mod connection;
pub mod handshake;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::storage::{JsonMapStore, MapStore};
use crate::travel::JwtTravelIssuer;
use crate::world::World;

/// How long shutdown waits for kicked connections to flush and close.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct RpgServer {
    listener: TcpListener,
    world: Arc<World>,
}

impl RpgServer {
    pub async fn bind(addr: &str, world: Arc<World>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow!("Failed to bind {}: {}", addr, e))?;
        Ok(Self::from_parts(listener, world))
    }

    pub fn from_parts(listener: TcpListener, world: Arc<World>) -> Self {
        Self { listener, world }
    }

    /// Build the world from `config` (loading or creating the map file) and bind.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let world = build_world(config)?;
        Self::bind(&config.server.bind, Arc::new(world)).await
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn world(&self) -> Arc<World> {
        Arc::clone(&self.world)
    }

    /// Accept connections forever.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Accept connections until `shutdown` resolves, then kick everyone and
    /// give the connection tasks up to [SHUTDOWN_GRACE] to flush and close.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Listening on {}", self.local_addr()?);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        error!("Connection task failed: {}", e);
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Accepted {}", peer);
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("set_nodelay failed for {}: {}", peer, e);
                        }
                        let world = Arc::clone(&self.world);
                        connections.spawn(async move {
                            if let Err(e) = connection::handle_connection(world, stream, peer).await {
                                warn!("Connection {} ended with error: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        // Usually fd exhaustion; back off instead of spinning.
                        error!("Accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        let kicked = self.world.kick_all();
        info!("Shutting down; disconnecting {} client(s)", kicked);
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("{} connection(s) still open after {:?}; dropping them", connections.len(), SHUTDOWN_GRACE);
            connections.abort_all();
        }
        Ok(())
    }
}

/// Construct the world described by `config`, creating a blank map file if needed.
pub fn build_world(config: &Config) -> Result<World> {
    let store = Arc::new(JsonMapStore::new(&config.storage.map_file));
    let map = store
        .load_or_create(config.world.width, config.world.height)
        .map_err(|e| anyhow!("Failed to load map {}: {}", config.storage.map_file, e))?;
    let grid = map
        .into_grid()
        .map_err(|e| anyhow!("Invalid map {}: {}", config.storage.map_file, e))?;
    info!("World is {}x{}", grid.width(), grid.height());

    let travel = Arc::new(JwtTravelIssuer::new(&config.travel.secret, config.token_ttl()));
    let store: Arc<dyn MapStore> = store;
    Ok(World::new(config.world_settings(), grid, travel).with_map_store(store))
}
