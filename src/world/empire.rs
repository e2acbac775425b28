//! Empire and island records plus the aggregates derived from room ownership.
//!
//! Only names, cities and flags are persisted. Everything in
//! [`EmpireAggregates`] is rebuilt from the room table on load and kept
//! current incrementally afterwards.

use std::collections::{BTreeMap, BTreeSet};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::world::catalog::Tech;
use crate::world::types::{EmpireVnum, IslandId, RoomVnum, SectorVnum};

pub const EMPIRE_SCHEMA_VERSION: u8 = 1;
pub const ISLAND_SCHEMA_VERSION: u8 = 1;

pub type TechCounts = [i32; Tech::COUNT];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityEntry {
    pub name: String,
    /// Vnum of the city-center building.
    pub location: RoomVnum,
    pub radius: i32,
    pub founded: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerritoryClass {
    City,
    Outskirts,
    Frontier,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryCounts {
    pub total: i32,
    pub city: i32,
    pub outskirts: i32,
    pub frontier: i32,
}

impl TerritoryCounts {
    pub fn adjust(&mut self, class: TerritoryClass, delta: i32) {
        self.total += delta;
        match class {
            TerritoryClass::City => self.city += delta,
            TerritoryClass::Outskirts => self.outskirts += delta,
            TerritoryClass::Frontier => self.frontier += delta,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmpireAggregates {
    pub territory: TerritoryCounts,
    pub territory_list: BTreeSet<RoomVnum>,
    pub population: i64,
    pub fame: i32,
    pub techs: TechCounts,
    pub island_techs: BTreeMap<IslandId, TechCounts>,
    /// Owned rooms by current sector.
    pub tile_sectors: BTreeMap<SectorVnum, i32>,
}

impl EmpireAggregates {
    pub fn adjust_tile_sector(&mut self, sect: SectorVnum, delta: i32) {
        let entry = self.tile_sectors.entry(sect).or_insert(0);
        *entry += delta;
        if *entry == 0 {
            self.tile_sectors.remove(&sect);
        }
    }

    pub fn adjust_tech(&mut self, tech: Tech, island: Option<IslandId>, delta: i32) {
        self.techs[tech.index()] += delta;
        if let Some(island) = island {
            let counts = self.island_techs.entry(island).or_insert([0; Tech::COUNT]);
            counts[tech.index()] += delta;
            if counts.iter().all(|c| *c == 0) {
                self.island_techs.remove(&island);
            }
        }
    }

    pub fn has_tech(&self, tech: Tech) -> bool {
        self.techs[tech.index()] > 0
    }

    pub fn clear_territory(&mut self) {
        self.territory = TerritoryCounts::default();
        self.territory_list.clear();
        self.population = 0;
        self.tile_sectors.clear();
    }

    pub fn clear_techs(&mut self) {
        self.techs = [0; Tech::COUNT];
        self.island_techs.clear();
        self.fame = 0;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmpireRecord {
    pub schema_version: u8,
    pub vnum: EmpireVnum,
    pub name: String,
    /// Immortal-only empires start with every tech.
    pub imm_only: bool,
    pub cities: Vec<CityEntry>,
    #[serde(skip)]
    pub aggregates: EmpireAggregates,
}

impl EmpireRecord {
    pub fn new(vnum: EmpireVnum, name: impl Into<String>) -> Self {
        Self {
            schema_version: EMPIRE_SCHEMA_VERSION,
            vnum,
            name: name.into(),
            imm_only: false,
            cities: Vec::new(),
            aggregates: EmpireAggregates::default(),
        }
    }

    pub fn city_at(&self, location: RoomVnum) -> Option<&CityEntry> {
        self.cities.iter().find(|c| c.location == location)
    }

    /// Grant the flat imm-only bonus of one of every tech.
    pub(crate) fn apply_tech_baseline(&mut self) {
        if self.imm_only {
            for tech in Tech::ALL {
                self.aggregates.techs[tech.index()] += 1;
            }
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct IslandFlags: u32 {
        const NEWBIE = 1 << 0;
        const CONTINENT = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IslandRecord {
    pub schema_version: u8,
    pub id: IslandId,
    pub name: String,
    pub flags: IslandFlags,
}

impl IslandRecord {
    pub fn new(id: IslandId, name: impl Into<String>, flags: IslandFlags) -> Self {
        Self {
            schema_version: ISLAND_SCHEMA_VERSION,
            id,
            name: name.into(),
            flags,
        }
    }
}

#[derive(Debug, Default)]
pub struct EmpireRegistry {
    empires: BTreeMap<EmpireVnum, EmpireRecord>,
    islands: BTreeMap<IslandId, IslandRecord>,
    dirty: BTreeSet<EmpireVnum>,
}

impl EmpireRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mut empire: EmpireRecord) {
        empire.aggregates = EmpireAggregates::default();
        empire.apply_tech_baseline();
        self.dirty.insert(empire.vnum);
        self.empires.insert(empire.vnum, empire);
    }

    pub fn remove(&mut self, vnum: EmpireVnum) -> Option<EmpireRecord> {
        self.dirty.remove(&vnum);
        self.empires.remove(&vnum)
    }

    pub fn get(&self, vnum: EmpireVnum) -> Option<&EmpireRecord> {
        self.empires.get(&vnum)
    }

    pub fn get_mut(&mut self, vnum: EmpireVnum) -> Option<&mut EmpireRecord> {
        self.empires.get_mut(&vnum)
    }

    pub fn aggregates_mut(&mut self, vnum: EmpireVnum) -> Option<&mut EmpireAggregates> {
        self.empires.get_mut(&vnum).map(|e| &mut e.aggregates)
    }

    pub fn vnums(&self) -> Vec<EmpireVnum> {
        self.empires.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EmpireRecord> {
        self.empires.values()
    }

    pub fn len(&self) -> usize {
        self.empires.len()
    }

    pub fn is_empty(&self) -> bool {
        self.empires.is_empty()
    }

    pub fn mark_dirty(&mut self, vnum: EmpireVnum) {
        self.dirty.insert(vnum);
    }

    pub fn take_dirty(&mut self) -> Vec<EmpireVnum> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    pub fn insert_island(&mut self, island: IslandRecord) {
        self.islands.insert(island.id, island);
    }

    pub fn island(&self, id: IslandId) -> Option<&IslandRecord> {
        self.islands.get(&id)
    }

    pub fn islands(&self) -> impl Iterator<Item = &IslandRecord> {
        self.islands.values()
    }

    pub fn is_newbie_island(&self, id: IslandId) -> bool {
        self.island(id)
            .map(|i| i.flags.contains(IslandFlags::NEWBIE))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_entries_disappear_from_aggregates() {
        let mut agg = EmpireAggregates::default();
        agg.adjust_tile_sector(4, 1);
        agg.adjust_tech(Tech::Seaport, Some(3), 1);
        agg.adjust_tile_sector(4, -1);
        agg.adjust_tech(Tech::Seaport, Some(3), -1);
        assert_eq!(agg, EmpireAggregates::default());
    }

    #[test]
    fn imm_only_empires_start_with_every_tech() {
        let mut registry = EmpireRegistry::new();
        let mut imm = EmpireRecord::new(1, "Immortals");
        imm.imm_only = true;
        registry.insert(imm);
        registry.insert(EmpireRecord::new(2, "Mortals"));
        let imm = registry.get(1).expect("imm");
        assert!(Tech::ALL.iter().all(|t| imm.aggregates.has_tech(*t)));
        let mortal = registry.get(2).expect("mortal");
        assert!(!mortal.aggregates.has_tech(Tech::Portals));
        assert_eq!(registry.take_dirty(), vec![1, 2]);
    }

    #[test]
    fn aggregates_are_not_persisted() {
        let mut empire = EmpireRecord::new(7, "Seven");
        empire.aggregates.fame = 40;
        let bytes = bincode::serialize(&empire).expect("serialize");
        let back: EmpireRecord = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(back.name, "Seven");
        assert_eq!(back.aggregates.fame, 0);
    }
}
