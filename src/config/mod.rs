//! # Configuration Management Module
//!
//! Configuration for the world engine and its server loop, loaded from TOML.
//!
//! ## Configuration Structure
//!
//! - [`WorldConfig`] - map dimensions, the fixed sector vnums and room-table limits
//! - [`GameConfig`] - tick rate and the timers behind burning, trenches and crops
//! - [`DecayConfig`] - every tuned constant of the annual world update
//! - [`StorageConfig`] - where world files live
//! - [`LoggingConfig`] - log level and files
//! - [`BackupConfig`] - automatic data-directory backups
//!
//! ## Usage
//!
//! ```rust,no_run
//! use empireworld::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Map: {}x{}", config.world.width, config.world.height);
//!
//!     Config::create_default("config.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [world]
//! width = 1800
//! height = 1000
//! basic_ocean_sector = 2
//!
//! [game]
//! annual_update_hours = 168
//!
//! [decay]
//! ruins_crumble_chance = 89
//! ```
//!
//! Every section falls back to its defaults, so a file only needs the keys it changes.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::world::types::{RoomVnum, SectorVnum};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub width: i32,
    pub height: i32,
    /// Sector used for fresh map tiles and the shared ocean block.
    pub basic_ocean_sector: SectorVnum,
    /// Fallback when a requested change would leave a tile without valid terrain.
    pub default_land_sector: SectorVnum,
    pub default_inside_sector: SectorVnum,
    /// Sector a map tile takes while it holds a building.
    pub building_sector: SectorVnum,
    /// Upper bound of the interior vnum search.
    pub max_room_vnum: RoomVnum,
    pub unload_check_secs: u64,
    pub unload_jitter_secs: u64,
    /// Outskirts reach `radius * outskirts_multiplier` from a city center.
    pub outskirts_multiplier: f64,
    /// Map distance searched for fresh water when picking a crop.
    pub water_crop_distance: i32,
    /// Seed for the world RNG; random when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl WorldConfig {
    pub fn map_size(&self) -> RoomVnum {
        self.width * self.height
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 1800,
            height: 1000,
            basic_ocean_sector: 2,
            default_land_sector: 0,
            default_inside_sector: 12,
            building_sector: 8,
            max_room_vnum: 2_000_000_000,
            unload_check_secs: 300,
            unload_jitter_secs: 60,
            outskirts_multiplier: 2.0,
            water_crop_distance: 4,
            rng_seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Game loop interval.
    pub tick_ms: u64,
    /// Real hours between annual world updates.
    pub annual_update_hours: u64,
    pub burn_down_secs: u64,
    pub trench_fill_secs: u64,
    pub crop_growth_secs: u64,
    pub orphan_sweep_secs: u64,
    /// Whether a burned building is also abandoned.
    pub abandon_on_burn: bool,
    pub track_lifetime_secs: u64,
}

impl GameConfig {
    pub fn annual_interval_secs(&self) -> i64 {
        (self.annual_update_hours.max(1) * 3600) as i64
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_ms: 250,
            annual_update_hours: 168,
            burn_down_secs: 180,
            trench_fill_secs: 3600,
            crop_growth_secs: 7200,
            orphan_sweep_secs: 60,
            abandon_on_burn: true,
            track_lifetime_secs: 3600,
        }
    }
}

/// Chances are `N` in a `!number(0, N)` roll: 0 always fires, larger is rarer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub ruins_crumble_chance: i32,
    /// Roll for a building at max damage to also become ruins.
    pub ruin_chance: i32,
    /// Years of disrepair a complete building survives.
    pub disrepair_divisor: f64,
    pub disrepair_divisor_unfinished: f64,
    pub road_revert_chance: i32,
    pub affect_loss_chance: i32,
    pub depletion_divisor: i32,
    /// Depletion counters below this are dropped.
    pub depletion_threshold: i32,
    pub wild_crop_despawn_chance: i32,
    pub nonwild_crop_despawn_chance: i32,
    pub trench_collapse_chance: i32,
    pub naturalize_newbie_islands: bool,
    pub naturalize_unclaimable: bool,
    pub vehicle_disrepair_divisor: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            ruins_crumble_chance: 89,
            ruin_chance: 1,
            disrepair_divisor: 10.0,
            disrepair_divisor_unfinished: 2.0,
            road_revert_chance: 9,
            affect_loss_chance: 19,
            depletion_divisor: 4,
            depletion_threshold: 10,
            wild_crop_despawn_chance: 9,
            nonwild_crop_despawn_chance: 2,
            trench_collapse_chance: 4,
            naturalize_newbie_islands: true,
            naturalize_unclaimable: false,
            vehicle_disrepair_divisor: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    /// JSON catalog of sectors, crops, buildings and vehicles; the built-in one is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_file: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            catalog_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    /// Receives every record logged with the `syserr` target.
    pub syserr_file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("empireworld.log".to_string()),
            syserr_file: Some("empireworld-syserr.log".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub enabled: bool,
    /// Relative paths are resolved under `storage.data_dir`.
    pub dir: String,
    /// Archives kept after pruning.
    pub keep: usize,
    pub before_annual: bool,
    pub before_full_save: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: "backups".to_string(),
            keep: 7,
            before_annual: true,
            before_full_save: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub decay: DecayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub backup: BackupConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config
            .validate()
            .map_err(|e| anyhow!("Invalid config file {}: {}", path, e))?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject values the engine cannot run with. Sector vnums are checked
    /// against the catalog once it is loaded.
    pub fn validate(&self) -> Result<()> {
        let w = &self.world;
        if w.width <= 0 || w.height <= 0 {
            return Err(anyhow!("world dimensions must be positive ({}x{})", w.width, w.height));
        }
        if (w.width as i64) * (w.height as i64) > i32::MAX as i64 {
            return Err(anyhow!("world map {}x{} exceeds the vnum range", w.width, w.height));
        }
        if w.max_room_vnum <= w.map_size() {
            return Err(anyhow!(
                "max_room_vnum {} leaves no room for interiors above the map ({})",
                w.max_room_vnum,
                w.map_size()
            ));
        }
        if w.outskirts_multiplier < 1.0 {
            return Err(anyhow!("outskirts_multiplier must be at least 1.0"));
        }
        if self.game.tick_ms == 0 {
            return Err(anyhow!("game.tick_ms must be greater than zero"));
        }
        if self.decay.depletion_divisor < 1 {
            return Err(anyhow!("decay.depletion_divisor must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.world.map_size(), 1_800_000);
        assert_eq!(config.world.unload_check_secs, 300);
        assert_eq!(config.game.track_lifetime_secs, 3600);
        assert_eq!(config.decay.ruins_crumble_chance, 89);
    }

    #[test]
    fn test_partial_toml_uses_section_defaults() {
        let text = r#"
            [world]
            width = 40
            height = 30

            [decay]
            ruin_chance = 3
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.world.map_size(), 1200);
        assert_eq!(config.world.basic_ocean_sector, 2);
        assert_eq!(config.decay.ruin_chance, 3);
        assert_eq!(config.decay.depletion_divisor, 4);
        assert_eq!(config.game.annual_update_hours, 168);
    }

    #[test]
    fn test_validate_rejects_tiny_vnum_space() {
        let mut config = Config::default();
        config.world.width = 10;
        config.world.height = 10;
        config.world.max_room_vnum = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_annual_interval_never_zero() {
        let mut game = GameConfig::default();
        game.annual_update_hours = 0;
        assert_eq!(game.annual_interval_secs(), 3600);
    }

    #[tokio::test]
    async fn test_create_default_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.world.width, 1800);
        assert_eq!(loaded.backup.keep, 7);
        assert!(loaded.world.rng_seed.is_none());
    }
}
