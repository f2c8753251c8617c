//! # rpgchat - Grid Presence and Chat Server
//!
//! rpgchat is a real-time, line-oriented multiplayer presence server. Clients
//! connect over TCP, are placed on a shared 2-D grid, and can move, chat in
//! channels, whisper, and walk computed paths while every other client sees
//! the changes as they happen.
//!
//! ## Features
//!
//! - **Shared Grid**: Terrain-typed cells with per-cell occupant sets and independent locks.
//! - **Pathed Walks**: `/moveTo` plans an A* route and walks it one timed step at a time.
//! - **Channels**: Named chat rooms with titles; a client is in at most one.
//! - **Direct Messages**: `/msg` text and `/whisper` JSON, filtered by each user's ignore list.
//! - **Throttling**: Per-session token bucket on slash commands.
//! - **Travel**: Signed, time-boxed tokens that let a user hop to another server.
//! - **Control Plane**: Kick, announce, teleport, mute and map reload as library calls.
//! - **Async Design**: Tokio task per connection with a dedicated writer task.
//!
//! ## Quick Start
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
//!
//! ## Module Organization
//!
//! - [`world`] - Grid, sessions, registries, movement and control-plane operations
//! - [`server`] - TCP listener, per-connection tasks, handshake and command dispatch
//! - [`protocol`] - Outbound event encoding
//! - [`storage`] - Map persistence
//! - [`travel`] - Travel credential issuing and verification
//! - [`config`] - Configuration management and validation
//! - [`validation`] - Username rules
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   RpgServer     │ ← Accept loop, one task per connection
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ CommandProcessor│ ← Throttle, parse, dispatch
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │     World       │ ← Grid, clients, channels, walks
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ MapStore/Travel │ ← Persistence and credentials
//! └─────────────────┘
//! ```

pub mod config;
pub mod logutil;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod travel;
pub mod validation;
pub mod world;
