//! # Empireworld - World and Room State Engine
//!
//! Empireworld keeps the world of a persistent, map-based MUD: a dense grid of
//! map tiles, a sparse table of loaded and interior rooms, the terrain rules
//! that tie sectors, crops, buildings and ownership together, and the files
//! that carry all of it across restarts.
//!
//! ## Features
//!
//! - **Spatial Grid**: every map tile exists at all times; untouched ocean shares one data block.
//! - **Terrain Pipeline**: `change_terrain` keeps sector indices, crops, heights and empire counters consistent.
//! - **Room Lifecycle**: map rooms load on demand and unload when idle; interiors are created and deleted with their exits repaired.
//! - **Territory**: empire claims, cities, outskirts and tech counters with a full rescan on load.
//! - **Annual Update**: a yearly sweep that decays buildings, recovers depletions and naturalizes land.
//! - **Persistence**: binary map records patched in place, text room files, packs, and a `sled` empire store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use empireworld::config::Config;
//! use empireworld::server::WorldServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let mut server = WorldServer::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`world`] - the in-memory world and every operation on it
//! - [`storage`] - map, room, pack and empire persistence plus backups
//! - [`server`] - the tick loop and its command channel
//! - [`config`] - configuration management and validation
//! - [`logutil`] - `syserr` logging helpers
//! - [`metrics`] - process-wide counters
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  World Server   │ ← tick loop, commands, schedules
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │     World       │ ← grid, rooms, terrain, territory, events
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   World Store   │ ← map.bin, room files, packs, sled
//! └─────────────────┘
//! ```

pub mod config;
pub mod logutil;
pub mod metrics;
pub mod server;
pub mod storage;
pub mod world;
