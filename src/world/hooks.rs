//! Outbound calls into subsystems that live outside the world engine.
//!
//! Every method has a no-op default so callers only implement what they
//! care about. [`RecordingHooks`] keeps a log of calls for tests and for the
//! `status` command.

use std::sync::{Arc, Mutex};

use crate::world::types::{CharId, EmpireVnum, ObjId, ResetCommand, RoomVnum, SectorVnum};

pub trait WorldHooks: Send {
    fn log_to_empire(&mut self, _empire: EmpireVnum, _message: &str) {}

    fn send_to_room(&mut self, _room: RoomVnum, _message: &str) {}

    /// Message every connected session.
    fn broadcast(&mut self, _message: &str) {}

    fn relocate_character(&mut self, _ch: CharId, _to: RoomVnum) {}

    fn extract_object(&mut self, _obj: ObjId) {}

    fn abort_description_editor(&mut self, _ch: CharId, _room: RoomVnum) {}

    fn instance_room_deleted(&mut self, _instance: i32, _room: RoomVnum) {}

    /// Workers assigned to a tile must stop when its terrain changes.
    fn deactivate_workforce(&mut self, _room: RoomVnum) {}

    /// Quest trackers counting owned tiles by sector.
    fn empire_tile_changed(&mut self, _empire: EmpireVnum, _old: SectorVnum, _new: SectorVnum) {}

    /// Reset commands the world does not apply itself (mobs, cooldowns, ...).
    fn apply_reset(&mut self, _room: RoomVnum, _command: &ResetCommand) {}
}

#[derive(Debug, Default)]
pub struct NullHooks;

impl WorldHooks for NullHooks {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookCall {
    EmpireLog(EmpireVnum, String),
    RoomMessage(RoomVnum, String),
    Broadcast(String),
    Relocate(CharId, RoomVnum),
    ExtractObject(ObjId),
    AbortEditor(CharId, RoomVnum),
    InstanceRoomDeleted(i32, RoomVnum),
    DeactivateWorkforce(RoomVnum),
    TileChanged(EmpireVnum, SectorVnum, SectorVnum),
    Reset(RoomVnum, ResetCommand),
}

/// Records every call into a shared log that outlives the world.
#[derive(Debug, Default, Clone)]
pub struct RecordingHooks {
    calls: Arc<Mutex<Vec<HookCall>>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    fn push(&self, call: HookCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl WorldHooks for RecordingHooks {
    fn log_to_empire(&mut self, empire: EmpireVnum, message: &str) {
        self.push(HookCall::EmpireLog(empire, message.to_string()));
    }

    fn send_to_room(&mut self, room: RoomVnum, message: &str) {
        self.push(HookCall::RoomMessage(room, message.to_string()));
    }

    fn broadcast(&mut self, message: &str) {
        self.push(HookCall::Broadcast(message.to_string()));
    }

    fn relocate_character(&mut self, ch: CharId, to: RoomVnum) {
        self.push(HookCall::Relocate(ch, to));
    }

    fn extract_object(&mut self, obj: ObjId) {
        self.push(HookCall::ExtractObject(obj));
    }

    fn abort_description_editor(&mut self, ch: CharId, room: RoomVnum) {
        self.push(HookCall::AbortEditor(ch, room));
    }

    fn instance_room_deleted(&mut self, instance: i32, room: RoomVnum) {
        self.push(HookCall::InstanceRoomDeleted(instance, room));
    }

    fn deactivate_workforce(&mut self, room: RoomVnum) {
        self.push(HookCall::DeactivateWorkforce(room));
    }

    fn empire_tile_changed(&mut self, empire: EmpireVnum, old: SectorVnum, new: SectorVnum) {
        self.push(HookCall::TileChanged(empire, old, new));
    }

    fn apply_reset(&mut self, room: RoomVnum, command: &ResetCommand) {
        self.push(HookCall::Reset(room, command.clone()));
    }
}
