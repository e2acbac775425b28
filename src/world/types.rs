use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub type RoomVnum = i32;
pub type SectorVnum = i32;
pub type CropVnum = i32;
pub type BuildingVnum = i32;
pub type VehicleVnum = i32;
pub type EmpireVnum = i32;
pub type IslandId = i32;

/// Island id of tiles that belong to no island (open ocean).
pub const NO_ISLAND: IslandId = -1;

/// On-disk duration marker for affects that never expire.
pub const UNLIMITED: i64 = -1;

/// Handle for a character living in an external subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharId(pub u32);

/// Handle for an object living in an external subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    East,
    South,
    West,
    Northwest,
    Northeast,
    Southwest,
    Southeast,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 10] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::Northwest,
        Direction::Northeast,
        Direction::Southwest,
        Direction::Southeast,
        Direction::Up,
        Direction::Down,
    ];

    /// The eight directions that move across the map grid.
    pub const PLANAR: [Direction; 8] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::Northwest,
        Direction::Northeast,
        Direction::Southwest,
        Direction::Southeast,
    ];

    pub fn code(self) -> i32 {
        match self {
            Direction::North => 0,
            Direction::East => 1,
            Direction::South => 2,
            Direction::West => 3,
            Direction::Northwest => 4,
            Direction::Northeast => 5,
            Direction::Southwest => 6,
            Direction::Southeast => 7,
            Direction::Up => 8,
            Direction::Down => 9,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.get(usize::try_from(code).ok()?).copied()
    }

    pub fn reverse(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::Northwest => Direction::Southeast,
            Direction::Northeast => Direction::Southwest,
            Direction::Southwest => Direction::Northeast,
            Direction::Southeast => Direction::Northwest,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// Grid offset for planar directions; north increases y.
    pub fn offset(self) -> Option<(i32, i32)> {
        match self {
            Direction::North => Some((0, 1)),
            Direction::East => Some((1, 0)),
            Direction::South => Some((0, -1)),
            Direction::West => Some((-1, 0)),
            Direction::Northwest => Some((-1, 1)),
            Direction::Northeast => Some((1, 1)),
            Direction::Southwest => Some((-1, -1)),
            Direction::Southeast => Some((1, -1)),
            Direction::Up | Direction::Down => None,
        }
    }
}

bitflags! {
    /// Room affect bits. `base_affects` hold the permanent ones; `affects`
    /// is the base plus whatever timed affects currently contribute.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct RoomAffects: u64 {
        const DARK = 1 << 0;
        const SILENT = 1 << 1;
        const HAS_INSTANCE = 1 << 2;
        const CHAMELEON = 1 << 3;
        const NO_EVOLVE = 1 << 4;
        const UNCLAIMABLE = 1 << 5;
        const PUBLIC = 1 << 6;
        const DISMANTLING = 1 << 7;
        const NO_FLY = 1 << 8;
        const NO_WORK = 1 << 9;
        const INCOMPLETE = 1 << 10;
        const NO_DISMANTLE = 1 << 11;
        const TEMPORARY = 1 << 12;
        const REPEL_NPCS = 1 << 13;
    }
}

impl RoomAffects {
    /// Bits players toggle on their own land; lost over time once the land is unowned.
    pub const PLAYER_SET: RoomAffects = RoomAffects::CHAMELEON
        .union(RoomAffects::PUBLIC)
        .union(RoomAffects::NO_WORK)
        .union(RoomAffects::NO_DISMANTLE)
        .union(RoomAffects::SILENT);
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ExitFlags: u32 {
        const IS_DOOR = 1 << 0;
        const CLOSED = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exit {
    pub dir: Direction,
    pub to_room: RoomVnum,
    pub keyword: Option<String>,
    pub flags: ExitFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Object,
    Component,
    Liquid,
    Coins,
    Pool,
    Action,
}

impl ResourceKind {
    pub fn code(self) -> i32 {
        match self {
            ResourceKind::Object => 0,
            ResourceKind::Component => 1,
            ResourceKind::Liquid => 2,
            ResourceKind::Coins => 3,
            ResourceKind::Pool => 4,
            ResourceKind::Action => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => ResourceKind::Object,
            1 => ResourceKind::Component,
            2 => ResourceKind::Liquid,
            3 => ResourceKind::Coins,
            4 => ResourceKind::Pool,
            5 => ResourceKind::Action,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub vnum: i32,
    pub amount: i32,
}

/// Add `extra` into `list`, merging amounts of matching kind/vnum pairs.
pub fn merge_resources(list: &mut Vec<Resource>, extra: &[Resource]) {
    for res in extra {
        match list
            .iter_mut()
            .find(|r| r.kind == res.kind && r.vnum == res.vnum)
        {
            Some(existing) => existing.amount += res.amount,
            None => list.push(*res),
        }
    }
}

/// A timed (or unlimited) affect applied to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomAffect {
    pub kind: i32,
    pub cast_by: i32,
    /// Absolute unix time the affect wears off; `None` never expires.
    pub expire_time: Option<i64>,
    pub modifier: i32,
    pub location: i32,
    pub bits: RoomAffects,
}

impl RoomAffect {
    pub fn remaining(&self, now: i64) -> Option<i64> {
        self.expire_time.map(|t| (t - now).max(0))
    }
}

/// One-shot instructions replayed the first time a room is reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetCommand {
    Mob { vnum: i32, flags: u64, rope: i32 },
    Instance { id: i32 },
    Dynamic { sex: i32, name: i32, loyalty: i32 },
    Cooldown { kind: i32, seconds: i32 },
    Trigger { attach: i32, vnum: i32 },
    Var { attach: i32, context: i32, name: String, value: String },
    ObjectPack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptVar {
    pub context: i32,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptState {
    pub triggers: Vec<i32>,
    pub vars: Vec<ScriptVar>,
}

impl ScriptState {
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty() && self.vars.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DepletionType {
    Dig,
    Forage,
    Gather,
    Pick,
    Chop,
    Fish,
    Quarry,
    Trapping,
    Hunt,
}

impl DepletionType {
    pub fn code(self) -> i32 {
        match self {
            DepletionType::Dig => 0,
            DepletionType::Forage => 1,
            DepletionType::Gather => 2,
            DepletionType::Pick => 3,
            DepletionType::Chop => 4,
            DepletionType::Fish => 5,
            DepletionType::Quarry => 6,
            DepletionType::Trapping => 7,
            DepletionType::Hunt => 8,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => DepletionType::Dig,
            1 => DepletionType::Forage,
            2 => DepletionType::Gather,
            3 => DepletionType::Pick,
            4 => DepletionType::Chop,
            5 => DepletionType::Fish,
            6 => DepletionType::Quarry,
            7 => DepletionType::Trapping,
            8 => DepletionType::Hunt,
            _ => return None,
        })
    }
}

/// Keys of the generic per-room integer store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExtraKey {
    ChopProgress,
    HarvestProgress,
    TrenchProgress,
    SeedTime,
    TrenchFillTime,
    TrenchOriginalSector,
    FoundTime,
}

impl ExtraKey {
    pub fn code(self) -> i32 {
        match self {
            ExtraKey::ChopProgress => 0,
            ExtraKey::HarvestProgress => 1,
            ExtraKey::TrenchProgress => 2,
            ExtraKey::SeedTime => 3,
            ExtraKey::TrenchFillTime => 4,
            ExtraKey::TrenchOriginalSector => 5,
            ExtraKey::FoundTime => 6,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => ExtraKey::ChopProgress,
            1 => ExtraKey::HarvestProgress,
            2 => ExtraKey::TrenchProgress,
            3 => ExtraKey::SeedTime,
            4 => ExtraKey::TrenchFillTime,
            5 => ExtraKey::TrenchOriginalSector,
            6 => ExtraKey::FoundTime,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub player_id: i32,
    pub mob_vnum: i32,
    pub timestamp: i64,
    pub dir: Direction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_directions_pair_up() {
        for dir in Direction::ALL {
            assert_eq!(dir.reverse().reverse(), dir);
            assert_eq!(Direction::from_code(dir.code()), Some(dir));
        }
        for dir in Direction::PLANAR {
            let (dx, dy) = dir.offset().expect("planar offset");
            let (rx, ry) = dir.reverse().offset().expect("planar offset");
            assert_eq!((dx + rx, dy + ry), (0, 0));
        }
    }

    #[test]
    fn merge_resources_adds_amounts() {
        let mut list = vec![Resource {
            kind: ResourceKind::Object,
            vnum: 120,
            amount: 2,
        }];
        merge_resources(
            &mut list,
            &[
                Resource {
                    kind: ResourceKind::Object,
                    vnum: 120,
                    amount: 3,
                },
                Resource {
                    kind: ResourceKind::Coins,
                    vnum: 0,
                    amount: 10,
                },
            ],
        );
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].amount, 5);
        assert_eq!(list[1].kind, ResourceKind::Coins);
    }

    #[test]
    fn unlimited_affect_has_no_remaining_time() {
        let af = RoomAffect {
            kind: 3,
            cast_by: 0,
            expire_time: None,
            modifier: 0,
            location: 0,
            bits: RoomAffects::DARK,
        };
        assert_eq!(af.remaining(1_000), None);
        let timed = RoomAffect {
            expire_time: Some(900),
            ..af
        };
        assert_eq!(timed.remaining(1_000), Some(0));
    }
}
