//! Vehicles parked in rooms. Only the parts the world engine needs: where a
//! vehicle is, who owns it, its damage, and its optional interior room.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::storage::save_queue::SaveBits;
use crate::world::errors::WorldError;
use crate::world::types::{EmpireVnum, RoomVnum, VehicleVnum};
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub u32);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleInstance {
    pub id: VehicleId,
    pub vnum: VehicleVnum,
    pub room: RoomVnum,
    pub owner: Option<EmpireVnum>,
    pub damage: f64,
    pub incomplete: bool,
    pub interior: Option<RoomVnum>,
}

impl VehicleInstance {
    pub fn is_complete(&self) -> bool {
        !self.incomplete
    }
}

#[derive(Debug, Default)]
pub struct VehicleTable {
    vehicles: BTreeMap<VehicleId, VehicleInstance>,
    next_id: u32,
}

impl VehicleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> VehicleId {
        self.next_id += 1;
        VehicleId(self.next_id)
    }

    /// Insert a vehicle loaded from a pack, keeping ids unique afterwards.
    pub fn insert(&mut self, vehicle: VehicleInstance) {
        self.next_id = self.next_id.max(vehicle.id.0);
        self.vehicles.insert(vehicle.id, vehicle);
    }

    pub fn get(&self, id: VehicleId) -> Option<&VehicleInstance> {
        self.vehicles.get(&id)
    }

    pub fn get_mut(&mut self, id: VehicleId) -> Option<&mut VehicleInstance> {
        self.vehicles.get_mut(&id)
    }

    pub fn remove(&mut self, id: VehicleId) -> Option<VehicleInstance> {
        self.vehicles.remove(&id)
    }

    pub fn ids(&self) -> Vec<VehicleId> {
        self.vehicles.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VehicleInstance> {
        self.vehicles.values()
    }

    pub fn in_room(&self, room: RoomVnum) -> Vec<VehicleId> {
        self.vehicles
            .values()
            .filter(|v| v.room == room)
            .map(|v| v.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

impl World {
    /// Put a new vehicle into `room`, creating its interior if the prototype has one.
    pub fn place_vehicle(
        &mut self,
        vnum: VehicleVnum,
        room: RoomVnum,
        owner: Option<EmpireVnum>,
        complete: bool,
    ) -> Result<VehicleId, WorldError> {
        let interior_sector = self
            .catalog
            .vehicle(vnum)
            .ok_or(WorldError::UnknownPrototype {
                kind: "vehicle",
                vnum,
            })?
            .interior_sector;
        if !self.find_or_load_room(room) {
            return Err(WorldError::NotFound(format!("room {}", room)));
        }
        let interior = match interior_sector {
            Some(sect) => Some(self.create_room_with_sector(None, sect)?),
            None => None,
        };
        let id = self.vehicles.next_id();
        self.vehicles.insert(VehicleInstance {
            id,
            vnum,
            room,
            owner,
            damage: 0.0,
            incomplete: !complete,
            interior,
        });
        if let Some(r) = self.rooms.get_mut(room) {
            r.vehicles.push(id);
        }
        if let (Some(inside), Some(emp)) = (interior, owner) {
            self.claim_room(inside, emp);
        }
        if owner.is_some() && complete {
            self.adjust_vehicle_tech(id, true);
        }
        self.request_world_save(room, SaveBits::OBJECTS);
        debug!("Placed vehicle {} ({:?}) in room {}", vnum, id, room);
        Ok(id)
    }

    /// Remove a vehicle from the world, deleting its interior.
    pub fn extract_vehicle(&mut self, id: VehicleId) -> bool {
        let Some(vehicle) = self.vehicles.get(id).cloned() else {
            return false;
        };
        if vehicle.owner.is_some() && vehicle.is_complete() {
            self.adjust_vehicle_tech(id, false);
        }
        if let Some(inside) = vehicle.interior {
            self.abandon_room(inside);
            self.delete_room(inside, true);
        }
        if let Some(r) = self.rooms.get_mut(vehicle.room) {
            r.vehicles.retain(|v| *v != id);
        }
        self.vehicles.remove(id);
        self.request_world_save(vehicle.room, SaveBits::OBJECTS);
        info!("Extracted vehicle {} ({:?}) from room {}", vehicle.vnum, id, vehicle.room);
        true
    }

    pub fn move_vehicle(&mut self, id: VehicleId, to: RoomVnum) -> bool {
        let Some(vehicle) = self.vehicles.get(id).cloned() else {
            return false;
        };
        if !self.find_or_load_room(to) {
            return false;
        }
        let counted = vehicle.owner.is_some() && vehicle.is_complete();
        if counted {
            self.adjust_vehicle_tech(id, false);
        }
        if let Some(r) = self.rooms.get_mut(vehicle.room) {
            r.vehicles.retain(|v| *v != id);
        }
        if let Some(r) = self.rooms.get_mut(to) {
            r.vehicles.push(id);
        }
        if let Some(v) = self.vehicles.get_mut(id) {
            v.room = to;
        }
        if counted {
            self.adjust_vehicle_tech(id, true);
        }
        self.request_world_save(vehicle.room, SaveBits::OBJECTS);
        self.request_world_save(to, SaveBits::OBJECTS);
        true
    }

    pub fn claim_vehicle(&mut self, id: VehicleId, owner: Option<EmpireVnum>) -> bool {
        let Some(vehicle) = self.vehicles.get(id).cloned() else {
            return false;
        };
        if vehicle.owner == owner {
            return true;
        }
        if vehicle.owner.is_some() && vehicle.is_complete() {
            self.adjust_vehicle_tech(id, false);
        }
        if let Some(inside) = vehicle.interior {
            match owner {
                Some(emp) => self.claim_room(inside, emp),
                None => self.abandon_room(inside),
            };
        }
        if let Some(v) = self.vehicles.get_mut(id) {
            v.owner = owner;
        }
        if owner.is_some() && vehicle.is_complete() {
            self.adjust_vehicle_tech(id, true);
        }
        self.request_world_save(vehicle.room, SaveBits::OBJECTS);
        true
    }

    pub fn complete_vehicle(&mut self, id: VehicleId) -> bool {
        let Some(vehicle) = self.vehicles.get_mut(id) else {
            return false;
        };
        if !vehicle.incomplete {
            return true;
        }
        vehicle.incomplete = false;
        let (owned, room) = (vehicle.owner.is_some(), vehicle.room);
        if owned {
            self.adjust_vehicle_tech(id, true);
        }
        self.request_world_save(room, SaveBits::OBJECTS);
        true
    }

    /// Extract vehicles that cannot survive the room's current climate.
    pub fn check_vehicle_climates(&mut self, room: RoomVnum) -> usize {
        let Some(climate) = self.sector_of(room).map(|s| self.catalog.climate_of(s)) else {
            return 0;
        };
        let doomed: Vec<VehicleId> = self
            .rooms
            .get(room)
            .map(|r| r.vehicles.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|id| {
                self.vehicles
                    .get(*id)
                    .and_then(|v| self.catalog.vehicle(v.vnum))
                    .map(|proto| proto.forbidden_climate.intersects(climate))
                    .unwrap_or(false)
            })
            .collect();
        for id in &doomed {
            if let Some(name) = self
                .vehicles
                .get(*id)
                .and_then(|v| self.catalog.vehicle(v.vnum))
                .map(|p| p.name.clone())
            {
                let msg = format!("The {} is lost to the changing land.", name);
                self.hooks.send_to_room(room, &msg);
            }
            self.extract_vehicle(*id);
        }
        doomed.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::world::catalog::Tech;
    use crate::world::empire::EmpireRecord;
    use crate::world::test_support::small_world;

    #[test]
    fn ship_interior_is_created_and_deleted_with_it() {
        let mut world = small_world();
        let id = world.place_vehicle(201, 50, None, true).expect("ship");
        let interior = world.vehicles().get(id).and_then(|v| v.interior).expect("interior");
        assert!(world.rooms().contains(interior));
        assert_eq!(world.rooms().interior_count(), 1);
        assert_eq!(world.rooms().get(50).map(|r| r.vehicles.len()), Some(1));

        assert!(world.extract_vehicle(id));
        assert!(!world.rooms().contains(interior));
        assert!(world.vehicles().is_empty());
        assert!(world.verify_sector_index().is_ok());
    }

    #[test]
    fn flooding_the_land_sinks_a_cart() {
        let mut world = small_world();
        world.change_terrain(44, 0, None);
        world.place_vehicle(200, 44, None, true).expect("cart");
        assert_eq!(world.vehicles().in_room(44).len(), 1);

        world.change_terrain(44, 2, None);
        assert!(world.vehicles().in_room(44).is_empty());
    }

    #[test]
    fn owned_vehicle_tech_follows_completion_and_claims() {
        let mut world = small_world();
        world.empires_mut().insert(EmpireRecord::new(1, "Aldor"));
        world.change_terrain(44, 0, None);
        let id = world.place_vehicle(202, 44, Some(1), false).expect("wagon");
        let has_workforce = |w: &crate::world::World| {
            w.empires().get(1).map(|e| e.aggregates.has_tech(Tech::Workforce)).unwrap_or(false)
        };
        assert!(!has_workforce(&world));

        assert!(world.complete_vehicle(id));
        assert!(has_workforce(&world));

        assert!(world.claim_vehicle(id, None));
        assert!(!has_workforce(&world));
        let interior = world.vehicles().get(id).and_then(|v| v.interior).expect("interior");
        assert_eq!(world.owner_of(interior), None);
    }
}
