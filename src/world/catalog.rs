//! Read-only prototype tables: sectors, crops, buildings and vehicles.
//!
//! The catalog is authored elsewhere and only consulted by the engine. It can
//! be loaded from a JSON file or taken from [`Catalog::builtin`], a small but
//! complete world used by `init` and by tests.

use std::collections::BTreeMap;
use std::path::Path;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::world::errors::WorldError;
use crate::world::types::{
    BuildingVnum, CropVnum, Resource, ResourceKind, SectorVnum, VehicleVnum,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SectorFlags: u32 {
        const OCEAN = 1 << 0;
        const HAS_CROP_DATA = 1 << 1;
        const CROP = 1 << 2;
        const NEEDS_HEIGHT = 1 << 3;
        const NO_CLAIM = 1 << 4;
        const LOCK_ICON = 1 << 5;
        const START_LOCATION = 1 << 6;
        const IS_ROAD = 1 << 7;
        const IS_TRENCH = 1 << 8;
        const MAP_BUILDING = 1 << 9;
        const INSIDE = 1 << 10;
        const FRESH_WATER = 1 << 11;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Climate: u32 {
        const TEMPERATE = 1 << 0;
        const ARID = 1 << 1;
        const TROPICAL = 1 << 2;
        const MOUNTAIN = 1 << 3;
        const RIVER = 1 << 4;
        const LAKE = 1 << 5;
        const OCEAN = 1 << 6;
        const TUNDRA = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CropFlags: u32 {
        const REQUIRES_WATER = 1 << 0;
        const NOT_WILD = 1 << 1;
        const NEWBIE_ONLY = 1 << 2;
        const NO_NEWBIE = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct BuildingFlags: u32 {
        const CITY_CENTER = 1 << 0;
        /// Counts as in-city anywhere inside the outskirts radius.
        const LARGE_CITY_RADIUS = 1 << 1;
        const RUINS = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tech {
    Apiaries,
    Glassblowing,
    Seaport,
    Tunnels,
    SkilledLabor,
    TradeRoutes,
    Portals,
    MasterPortals,
    Prominence,
    Workforce,
}

impl Tech {
    pub const COUNT: usize = 10;
    pub const ALL: [Tech; Tech::COUNT] = [
        Tech::Apiaries,
        Tech::Glassblowing,
        Tech::Seaport,
        Tech::Tunnels,
        Tech::SkilledLabor,
        Tech::TradeRoutes,
        Tech::Portals,
        Tech::MasterPortals,
        Tech::Prominence,
        Tech::Workforce,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionKind {
    Chopped,
    Harvested,
    TrenchFull,
    Burns,
    Grows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evolution {
    pub kind: EvolutionKind,
    pub becomes: SectorVnum,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorProto {
    pub vnum: SectorVnum,
    pub name: String,
    pub icon: String,
    #[serde(default)]
    pub climate: Climate,
    #[serde(default)]
    pub flags: SectorFlags,
    #[serde(default)]
    pub evolution: Vec<Evolution>,
}

impl SectorProto {
    pub fn has(&self, flag: SectorFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn evolves(&self, kind: EvolutionKind) -> Option<SectorVnum> {
        self.evolution
            .iter()
            .find(|evo| evo.kind == kind)
            .map(|evo| evo.becomes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropProto {
    pub vnum: CropVnum,
    pub name: String,
    #[serde(default)]
    pub climate: Climate,
    #[serde(default)]
    pub flags: CropFlags,
    #[serde(default)]
    pub x_min: i32,
    #[serde(default = "default_percent_max")]
    pub x_max: i32,
    #[serde(default)]
    pub y_min: i32,
    #[serde(default = "default_percent_max")]
    pub y_max: i32,
}

fn default_percent_max() -> i32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingProto {
    pub vnum: BuildingVnum,
    pub name: String,
    pub icon: String,
    pub max_damage: i32,
    #[serde(default)]
    pub fame: i32,
    #[serde(default)]
    pub flags: BuildingFlags,
    #[serde(default)]
    pub techs: Vec<Tech>,
    /// Maintenance owed each year, accrued into the room's resources.
    #[serde(default)]
    pub upkeep: Vec<Resource>,
    /// Building left behind when this one falls to ruin.
    #[serde(default)]
    pub ruins_to: Option<BuildingVnum>,
}

impl BuildingProto {
    pub fn has(&self, flag: BuildingFlags) -> bool {
        self.flags.contains(flag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleProto {
    pub vnum: VehicleVnum,
    pub name: String,
    pub max_damage: i32,
    /// Climates the vehicle cannot survive in.
    #[serde(default)]
    pub forbidden_climate: Climate,
    #[serde(default)]
    pub techs: Vec<Tech>,
    /// Sector of the interior room, if the vehicle has one.
    #[serde(default)]
    pub interior_sector: Option<SectorVnum>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub sectors: BTreeMap<SectorVnum, SectorProto>,
    #[serde(default)]
    pub crops: BTreeMap<CropVnum, CropProto>,
    #[serde(default)]
    pub buildings: BTreeMap<BuildingVnum, BuildingProto>,
    #[serde(default)]
    pub vehicles: BTreeMap<VehicleVnum, VehicleProto>,
}

impl Catalog {
    pub fn load_json(path: &Path) -> Result<Self, WorldError> {
        let text = std::fs::read_to_string(path)?;
        let catalog: Catalog = serde_json::from_str(&text)?;
        log::info!(
            "Loaded catalog {:?}: {} sectors, {} crops, {} buildings, {} vehicles",
            path,
            catalog.sectors.len(),
            catalog.crops.len(),
            catalog.buildings.len(),
            catalog.vehicles.len()
        );
        Ok(catalog)
    }

    pub fn sector(&self, vnum: SectorVnum) -> Option<&SectorProto> {
        self.sectors.get(&vnum)
    }

    pub fn crop(&self, vnum: CropVnum) -> Option<&CropProto> {
        self.crops.get(&vnum)
    }

    pub fn building(&self, vnum: BuildingVnum) -> Option<&BuildingProto> {
        self.buildings.get(&vnum)
    }

    pub fn vehicle(&self, vnum: VehicleVnum) -> Option<&VehicleProto> {
        self.vehicles.get(&vnum)
    }

    /// True when the sector exists and carries `flag`.
    pub fn sector_has(&self, vnum: SectorVnum, flag: SectorFlags) -> bool {
        self.sector(vnum).map(|s| s.has(flag)).unwrap_or(false)
    }

    pub fn climate_of(&self, vnum: SectorVnum) -> Climate {
        self.sector(vnum).map(|s| s.climate).unwrap_or_default()
    }

    pub fn building_has(&self, vnum: Option<BuildingVnum>, flag: BuildingFlags) -> bool {
        vnum.and_then(|v| self.building(v))
            .map(|b| b.has(flag))
            .unwrap_or(false)
    }

    pub fn first_crop(&self) -> Option<&CropProto> {
        self.crops.values().next()
    }

    /// Stock world: temperate plains and forest, a coast, rivers, buildings
    /// with techs, and a handful of crops and vehicles.
    pub fn builtin() -> Self {
        let mut catalog = Catalog::default();
        let temperate = Climate::TEMPERATE;
        let sectors = [
            sector(0, "Plains", ".", temperate, SectorFlags::empty(), &[]),
            sector(
                1,
                "Forest",
                "T",
                temperate,
                SectorFlags::empty(),
                &[(EvolutionKind::Chopped, 0), (EvolutionKind::Burns, 0)],
            ),
            sector(2, "Ocean", "~", Climate::OCEAN, SectorFlags::OCEAN, &[]),
            sector(3, "Mountain", "^", Climate::MOUNTAIN, SectorFlags::NEEDS_HEIGHT, &[]),
            sector(4, "River", "=", Climate::RIVER, SectorFlags::FRESH_WATER, &[]),
            sector(5, "Road", "+", temperate, SectorFlags::IS_ROAD, &[]),
            sector(
                6,
                "Trench",
                "-",
                temperate,
                SectorFlags::IS_TRENCH,
                &[(EvolutionKind::TrenchFull, 7)],
            ),
            sector(7, "Canal", "=", Climate::RIVER, SectorFlags::FRESH_WATER, &[]),
            sector(8, "Building", "B", temperate, SectorFlags::MAP_BUILDING, &[]),
            sector(
                9,
                "Seeded Field",
                ",",
                temperate,
                SectorFlags::HAS_CROP_DATA,
                &[(EvolutionKind::Grows, 10)],
            ),
            sector(
                10,
                "Crop",
                "\"",
                temperate,
                SectorFlags::HAS_CROP_DATA | SectorFlags::CROP,
                &[(EvolutionKind::Harvested, 9), (EvolutionKind::Burns, 0)],
            ),
            sector(11, "Ruins", "%", temperate, SectorFlags::LOCK_ICON, &[]),
            sector(12, "Inside", "#", Climate::empty(), SectorFlags::INSIDE, &[]),
            sector(13, "Desert", ":", Climate::ARID, SectorFlags::empty(), &[]),
            sector(
                14,
                "Jungle",
                "&",
                Climate::TROPICAL,
                SectorFlags::empty(),
                &[(EvolutionKind::Chopped, 0)],
            ),
            sector(15, "Lake", "o", Climate::LAKE, SectorFlags::FRESH_WATER, &[]),
            sector(16, "Wasteland", "x", Climate::ARID, SectorFlags::NO_CLAIM, &[]),
            sector(17, "Start Plaza", "*", temperate, SectorFlags::START_LOCATION, &[]),
            sector(
                18,
                "Hills",
                "n",
                temperate | Climate::MOUNTAIN,
                SectorFlags::NEEDS_HEIGHT,
                &[],
            ),
        ];
        for proto in sectors {
            catalog.sectors.insert(proto.vnum, proto);
        }

        let crops = [
            crop(0, "wheat", temperate, CropFlags::empty(), (0, 100), (0, 100)),
            crop(
                1,
                "rice",
                temperate | Climate::TROPICAL,
                CropFlags::REQUIRES_WATER,
                (0, 100),
                (0, 60),
            ),
            crop(2, "cotton", temperate | Climate::ARID, CropFlags::NO_NEWBIE, (0, 100), (0, 50)),
            crop(3, "coffee", Climate::TROPICAL, CropFlags::NOT_WILD, (0, 100), (0, 100)),
        ];
        for proto in crops {
            catalog.crops.insert(proto.vnum, proto);
        }

        let buildings = [
            BuildingProto {
                vnum: 100,
                name: "hut".to_string(),
                icon: "h".to_string(),
                max_damage: 100,
                fame: 1,
                flags: BuildingFlags::empty(),
                techs: Vec::new(),
                upkeep: Vec::new(),
                ruins_to: Some(110),
            },
            BuildingProto {
                vnum: 101,
                name: "city center".to_string(),
                icon: "C".to_string(),
                max_damage: 200,
                fame: 10,
                flags: BuildingFlags::CITY_CENTER,
                techs: vec![Tech::Prominence],
                upkeep: Vec::new(),
                ruins_to: Some(110),
            },
            BuildingProto {
                vnum: 102,
                name: "glassblower".to_string(),
                icon: "g".to_string(),
                max_damage: 100,
                fame: 2,
                flags: BuildingFlags::empty(),
                techs: vec![Tech::Glassblowing],
                upkeep: vec![Resource {
                    kind: ResourceKind::Object,
                    vnum: 120,
                    amount: 1,
                }],
                ruins_to: Some(110),
            },
            BuildingProto {
                vnum: 103,
                name: "watchtower".to_string(),
                icon: "w".to_string(),
                max_damage: 120,
                fame: 3,
                flags: BuildingFlags::LARGE_CITY_RADIUS,
                techs: Vec::new(),
                upkeep: Vec::new(),
                ruins_to: Some(110),
            },
            BuildingProto {
                vnum: 104,
                name: "dock".to_string(),
                icon: "d".to_string(),
                max_damage: 80,
                fame: 2,
                flags: BuildingFlags::empty(),
                techs: vec![Tech::Seaport, Tech::TradeRoutes],
                upkeep: Vec::new(),
                ruins_to: None,
            },
            BuildingProto {
                vnum: 110,
                name: "ruins".to_string(),
                icon: "r".to_string(),
                max_damage: 1,
                fame: 0,
                flags: BuildingFlags::RUINS,
                techs: Vec::new(),
                upkeep: Vec::new(),
                ruins_to: None,
            },
        ];
        for proto in buildings {
            catalog.buildings.insert(proto.vnum, proto);
        }

        let vehicles = [
            VehicleProto {
                vnum: 200,
                name: "cart".to_string(),
                max_damage: 40,
                forbidden_climate: Climate::OCEAN | Climate::LAKE | Climate::RIVER,
                techs: Vec::new(),
                interior_sector: None,
            },
            VehicleProto {
                vnum: 201,
                name: "ship".to_string(),
                max_damage: 200,
                forbidden_climate: Climate::TEMPERATE
                    | Climate::ARID
                    | Climate::TROPICAL
                    | Climate::MOUNTAIN
                    | Climate::TUNDRA,
                techs: vec![Tech::Seaport],
                interior_sector: Some(12),
            },
            VehicleProto {
                vnum: 202,
                name: "workshop wagon".to_string(),
                max_damage: 60,
                forbidden_climate: Climate::OCEAN,
                techs: vec![Tech::Workforce],
                interior_sector: Some(12),
            },
        ];
        for proto in vehicles {
            catalog.vehicles.insert(proto.vnum, proto);
        }

        catalog
    }
}

fn sector(
    vnum: SectorVnum,
    name: &str,
    icon: &str,
    climate: Climate,
    flags: SectorFlags,
    evolution: &[(EvolutionKind, SectorVnum)],
) -> SectorProto {
    SectorProto {
        vnum,
        name: name.to_string(),
        icon: icon.to_string(),
        climate,
        flags,
        evolution: evolution
            .iter()
            .map(|&(kind, becomes)| Evolution { kind, becomes })
            .collect(),
    }
}

fn crop(
    vnum: CropVnum,
    name: &str,
    climate: Climate,
    flags: CropFlags,
    x: (i32, i32),
    y: (i32, i32),
) -> CropProto {
    CropProto {
        vnum,
        name: name.to_string(),
        climate,
        flags,
        x_min: x.0,
        x_max: x.1,
        y_min: y.0,
        y_max: y.1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_self_consistent() {
        let catalog = Catalog::builtin();
        for proto in catalog.sectors.values() {
            for evo in &proto.evolution {
                assert!(
                    catalog.sector(evo.becomes).is_some(),
                    "sector {} evolves into missing {}",
                    proto.vnum,
                    evo.becomes
                );
            }
        }
        for proto in catalog.buildings.values() {
            if let Some(ruins) = proto.ruins_to {
                assert!(catalog.building_has(Some(ruins), BuildingFlags::RUINS));
            }
        }
        assert!(catalog.sector_has(2, SectorFlags::OCEAN));
        assert_eq!(catalog.sector(9).and_then(|s| s.evolves(EvolutionKind::Grows)), Some(10));
    }

    #[test]
    fn catalog_json_round_trip_keeps_flags() {
        let catalog = Catalog::builtin();
        let text = serde_json::to_string(&catalog).expect("serialize");
        let back: Catalog = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back.sectors.len(), catalog.sectors.len());
        assert!(back.sector_has(10, SectorFlags::CROP | SectorFlags::HAS_CROP_DATA));
        assert_eq!(
            back.building(102).map(|b| b.techs.clone()),
            Some(vec![Tech::Glassblowing])
        );
    }
}
