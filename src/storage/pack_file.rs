//! Per-room packs of the vehicles and objects sitting in a room.

use serde::{Deserialize, Serialize};

use crate::world::types::{ObjId, RoomVnum};
use crate::world::vehicles::VehicleInstance;

pub const PACK_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackRecord {
    pub schema_version: u8,
    pub room: RoomVnum,
    pub vehicles: Vec<VehicleInstance>,
    pub objects: Vec<ObjId>,
}

impl PackRecord {
    pub fn new(room: RoomVnum) -> Self {
        Self {
            schema_version: PACK_SCHEMA_VERSION,
            room,
            vehicles: Vec::new(),
            objects: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty() && self.objects.is_empty()
    }
}
