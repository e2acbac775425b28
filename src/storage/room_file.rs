//! Text room files: `world/<vnum / 100>/<vnum>.wld`.
//!
//! A file holds one entry. `#<vnum> M` entries carry only the shared
//! customization of an unloaded map tile; `#<vnum> R` entries carry a full
//! room. Timed values (affect expiry, burn-down) are written relative to the
//! `Saved:` stamp at the top and added back to it on load, so they keep
//! running while the world is down.
//!
//! ```text
//! Saved: 1700000000
//! #1800042 R
//! Sector: 12 12
//! Home: 1800042
//! Name: A cosy cabin
//! Exit: 0 1800043 0 -
//! End World File
//! ```

use std::fmt::Write as _;
use std::path::Path;

use crate::world::errors::WorldError;
use crate::world::room::{ComplexData, Room};
use crate::world::shared::SharedRoomData;
use crate::world::types::{
    DepletionType, Direction, EmpireVnum, Exit, ExitFlags, ExtraKey, ResetCommand, Resource,
    ResourceKind, RoomAffect, RoomAffects, RoomVnum, ScriptState, ScriptVar, SectorVnum, Track,
    CropVnum, IslandId, NO_ISLAND, UNLIMITED,
};

/// Everything from the shared block that the binary map record cannot hold.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedText {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub affects: RoomAffects,
    pub base_affects: RoomAffects,
    pub height: i32,
    pub island_id: IslandId,
    pub depletion: Vec<(DepletionType, i32)>,
    pub extra: Vec<(ExtraKey, i32)>,
    pub tracks: Vec<Track>,
}

impl Default for SharedText {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            icon: None,
            affects: RoomAffects::empty(),
            base_affects: RoomAffects::empty(),
            height: 0,
            island_id: NO_ISLAND,
            depletion: Vec::new(),
            extra: Vec::new(),
            tracks: Vec::new(),
        }
    }
}

impl SharedText {
    /// Snapshot of a shared block, dropping tracks older than `min_track_time`.
    pub fn from_shared(data: &SharedRoomData, min_track_time: i64) -> Self {
        Self {
            name: data.name.clone(),
            description: data.description.clone(),
            icon: data.icon.clone(),
            affects: data.affects,
            base_affects: data.base_affects,
            height: data.height,
            island_id: data.island_id,
            depletion: data.depletion.iter().map(|(k, v)| (*k, *v)).collect(),
            extra: data.extra.iter().map(|(k, v)| (*k, *v)).collect(),
            tracks: data
                .tracks
                .iter()
                .filter(|t| t.timestamp >= min_track_time)
                .cloned()
                .collect(),
        }
    }

    /// Copy the text-only fields into `data`. The map file already carries
    /// affects, height and island for map tiles, so those are only copied
    /// when `with_map_fields` is set.
    pub fn apply(&self, data: &mut SharedRoomData, with_map_fields: bool) {
        data.name = self.name.clone();
        data.description = self.description.clone();
        data.icon = self.icon.clone();
        data.depletion = self.depletion.iter().copied().collect();
        data.extra = self.extra.iter().copied().collect();
        data.tracks = self.tracks.clone();
        if with_map_fields {
            data.affects = self.affects;
            data.base_affects = self.base_affects;
            data.height = self.height;
            data.island_id = self.island_id;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomText {
    pub sector: SectorVnum,
    pub base_sector: SectorVnum,
    pub crop: Option<CropVnum>,
    pub owner: Option<EmpireVnum>,
    pub home_room: RoomVnum,
    pub population: u32,
    pub auto_delete: bool,
    pub has_pack: bool,
    pub instance_id: Option<i32>,
    pub complex: Option<ComplexData>,
    pub affects: Vec<RoomAffect>,
    pub script: ScriptState,
    pub resets: Vec<ResetCommand>,
}

impl RoomText {
    pub fn new(vnum: RoomVnum, sector: SectorVnum, base_sector: SectorVnum) -> Self {
        Self {
            sector,
            base_sector,
            crop: None,
            owner: None,
            home_room: vnum,
            population: 0,
            auto_delete: false,
            has_pack: false,
            instance_id: None,
            complex: None,
            affects: Vec::new(),
            script: ScriptState::default(),
            resets: Vec::new(),
        }
    }

    pub fn from_room(room: &Room) -> Self {
        Self {
            sector: room.sector,
            base_sector: room.base_sector,
            crop: room.crop,
            owner: room.owner,
            home_room: room.home_room,
            population: room.population,
            auto_delete: room.auto_delete,
            has_pack: room.has_pack,
            instance_id: room.instance_id,
            complex: room.complex.clone(),
            affects: room.affects.clone(),
            script: room.script.clone(),
            resets: room.resets.clone(),
        }
    }

    /// Whether a map room holds anything its tile does not.
    pub fn worth_saving(&self) -> bool {
        self.owner.is_some()
            || self.population > 0
            || self.has_pack
            || self.instance_id.is_some()
            || self.complex.is_some()
            || !self.affects.is_empty()
            || !self.script.is_empty()
            || !self.resets.is_empty()
    }

    /// Copy the room-only fields into a freshly built `room`.
    pub fn fill(self, room: &mut Room) {
        room.owner = self.owner;
        room.home_room = self.home_room;
        room.population = self.population;
        room.auto_delete = self.auto_delete;
        room.has_pack = self.has_pack;
        room.instance_id = self.instance_id;
        room.complex = self.complex;
        room.affects = self.affects;
        room.script = self.script;
        room.resets = self.resets;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomFileEntry {
    pub vnum: RoomVnum,
    pub shared: SharedText,
    /// `None` for map-tile-only (`M`) entries.
    pub room: Option<RoomText>,
}

fn escape_field(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_field(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn write_resources(out: &mut String, tag: &str, list: &[Resource]) {
    for res in list {
        let _ = writeln!(out, "{}: {} {} {}", tag, res.kind.code(), res.vnum, res.amount);
    }
}

/// Render one entry. `saved_at` anchors the relative timers.
pub fn render_entry(entry: &RoomFileEntry, saved_at: i64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Saved: {}", saved_at);
    let kind = if entry.room.is_some() { 'R' } else { 'M' };
    let _ = writeln!(out, "#{} {}", entry.vnum, kind);

    if let Some(room) = &entry.room {
        let _ = writeln!(out, "Sector: {} {}", room.sector, room.base_sector);
        if let Some(crop) = room.crop {
            let _ = writeln!(out, "Crop: {}", crop);
        }
        if let Some(owner) = room.owner {
            let _ = writeln!(out, "Owner: {}", owner);
        }
        let _ = writeln!(out, "Home: {}", room.home_room);
        if room.population > 0 {
            let _ = writeln!(out, "Population: {}", room.population);
        }
        if room.auto_delete {
            out.push_str("AutoDelete\n");
        }
        if room.has_pack {
            out.push_str("Pack\n");
        }
        if let Some(id) = room.instance_id {
            let _ = writeln!(out, "Instance: {}", id);
        }
    }

    let shared = &entry.shared;
    if let Some(name) = &shared.name {
        let _ = writeln!(out, "Name: {}", escape_field(name));
    }
    if let Some(desc) = &shared.description {
        let _ = writeln!(out, "Desc: {}", escape_field(desc));
    }
    if let Some(icon) = &shared.icon {
        let _ = writeln!(out, "Icon: {}", escape_field(icon));
    }
    if !shared.affects.is_empty() || !shared.base_affects.is_empty() {
        let _ = writeln!(
            out,
            "Affects: {} {}",
            shared.affects.bits(),
            shared.base_affects.bits()
        );
    }
    if shared.height != 0 {
        let _ = writeln!(out, "Height: {}", shared.height);
    }
    if shared.island_id != NO_ISLAND {
        let _ = writeln!(out, "Island: {}", shared.island_id);
    }
    for (kind, count) in &shared.depletion {
        let _ = writeln!(out, "Depletion: {} {}", kind.code(), count);
    }
    for (key, value) in &shared.extra {
        let _ = writeln!(out, "Extra: {} {}", key.code(), value);
    }
    for track in &shared.tracks {
        let _ = writeln!(
            out,
            "Track: {} {} {} {}",
            track.player_id,
            track.mob_vnum,
            track.timestamp,
            track.dir.code()
        );
    }

    if let Some(room) = &entry.room {
        if let Some(complex) = &room.complex {
            out.push_str("Complex\n");
            if let Some(b) = complex.building {
                let _ = writeln!(out, "Building: {}", b);
            }
            if let Some(t) = complex.template {
                let _ = writeln!(out, "Template: {}", t);
            }
            if let Some(dir) = complex.entrance {
                let _ = writeln!(out, "Entrance: {}", dir.code());
            }
            if let Some(p) = complex.patron {
                let _ = writeln!(out, "Patron: {}", p);
            }
            if let Some(t) = complex.burn_down_time {
                let _ = writeln!(out, "Burning: {}", t - saved_at);
            }
            if complex.damage > 0.0 {
                let _ = writeln!(out, "Damage: {:.1}", complex.damage);
            }
            if let Some(p) = complex.private_owner {
                let _ = writeln!(out, "PrivateOwner: {}", p);
            }
            if complex.paint_color != 0 {
                let _ = writeln!(out, "Paint: {}", complex.paint_color);
            }
            if complex.inside_rooms != 0 {
                let _ = writeln!(out, "Inside: {}", complex.inside_rooms);
            }
            write_resources(&mut out, "Resource", &complex.resources);
            write_resources(&mut out, "BuiltWith", &complex.built_with);
            for ex in complex.exits() {
                let keyword = ex.keyword.as_deref().map(escape_field);
                let _ = writeln!(
                    out,
                    "Exit: {} {} {} {}",
                    ex.dir.code(),
                    ex.to_room,
                    ex.flags.bits(),
                    keyword.as_deref().unwrap_or("-")
                );
            }
        }
        for af in &room.affects {
            let remaining = af
                .expire_time
                .map(|t| (t - saved_at).max(0))
                .unwrap_or(UNLIMITED);
            let _ = writeln!(
                out,
                "Affect: {} {} {} {} {} {}",
                af.kind,
                af.cast_by,
                remaining,
                af.modifier,
                af.location,
                af.bits.bits()
            );
        }
        for trig in &room.script.triggers {
            let _ = writeln!(out, "Trigger: {}", trig);
        }
        for var in &room.script.vars {
            let _ = writeln!(out, "Var: {} {} {}", var.context, var.name, escape_field(&var.value));
        }
        for reset in &room.resets {
            let line = match reset {
                ResetCommand::Mob { vnum, flags, rope } => format!("M {} {} {}", vnum, flags, rope),
                ResetCommand::Instance { id } => format!("I {}", id),
                ResetCommand::Dynamic { sex, name, loyalty } => {
                    format!("D {} {} {}", sex, name, loyalty)
                }
                ResetCommand::Cooldown { kind, seconds } => format!("C {} {}", kind, seconds),
                ResetCommand::Trigger { attach, vnum } => format!("T {} {}", attach, vnum),
                ResetCommand::Var {
                    attach,
                    context,
                    name,
                    value,
                } => format!("V {} {} {} {}", attach, context, name, escape_field(value)),
                ResetCommand::ObjectPack => "O".to_string(),
            };
            let _ = writeln!(out, "Load: {}", line);
        }
    }
    out.push_str("End World File\n");
    out
}

struct LineParser<'a> {
    path: &'a Path,
    line: usize,
}

impl LineParser<'_> {
    fn err(&self, reason: impl Into<String>) -> WorldError {
        WorldError::corrupt(self.path, self.line, reason)
    }

    fn int<T: std::str::FromStr>(&self, field: Option<&str>, what: &str) -> Result<T, WorldError> {
        field
            .and_then(|f| f.parse::<T>().ok())
            .ok_or_else(|| self.err(format!("bad {}", what)))
    }
}

/// Parse one `.wld` file. Relative timers are added to the `Saved:` stamp,
/// so time spent offline still counts; `now` stands in when the stamp is missing.
pub fn parse_entry(path: &Path, text: &str, now: i64) -> Result<RoomFileEntry, WorldError> {
    let mut p = LineParser { path, line: 0 };
    let mut saved_at: Option<i64> = None;
    let mut vnum: Option<RoomVnum> = None;
    let mut shared = SharedText::default();
    let mut room: Option<RoomText> = None;
    let mut ended = false;

    for (idx, raw) in text.lines().enumerate() {
        p.line = idx + 1;
        let line = raw.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('#') {
            let mut parts = header.split_whitespace();
            let v: RoomVnum = p.int(parts.next(), "vnum")?;
            match parts.next() {
                Some("R") => room = Some(RoomText::new(v, 0, 0)),
                Some("M") => {}
                other => return Err(p.err(format!("unknown entry kind {:?}", other))),
            }
            vnum = Some(v);
            continue;
        }
        if line == "End World File" {
            ended = true;
            break;
        }
        let (tag, rest) = match line.split_once(": ") {
            Some((tag, rest)) => (tag, rest),
            None => (line, ""),
        };
        if tag == "Saved" {
            saved_at = Some(p.int(Some(rest), "save time")?);
            continue;
        }
        if vnum.is_none() {
            return Err(p.err("data before entry header"));
        }
        let mut f = rest.split_whitespace();
        match tag {
            "Name" => shared.name = Some(unescape_field(rest)),
            "Desc" => shared.description = Some(unescape_field(rest)),
            "Icon" => shared.icon = Some(unescape_field(rest)),
            "Affects" => {
                shared.affects = RoomAffects::from_bits_truncate(p.int(f.next(), "affects")?);
                shared.base_affects =
                    RoomAffects::from_bits_truncate(p.int(f.next(), "base affects")?);
            }
            "Height" => shared.height = p.int(f.next(), "height")?,
            "Island" => shared.island_id = p.int(f.next(), "island")?,
            "Depletion" => {
                let kind = DepletionType::from_code(p.int(f.next(), "depletion type")?)
                    .ok_or_else(|| p.err("unknown depletion type"))?;
                shared.depletion.push((kind, p.int(f.next(), "depletion count")?));
            }
            "Extra" => {
                let key = ExtraKey::from_code(p.int(f.next(), "extra key")?)
                    .ok_or_else(|| p.err("unknown extra key"))?;
                shared.extra.push((key, p.int(f.next(), "extra value")?));
            }
            "Track" => {
                let player_id = p.int(f.next(), "track player")?;
                let mob_vnum = p.int(f.next(), "track mob")?;
                let timestamp = p.int(f.next(), "track time")?;
                let dir = Direction::from_code(p.int(f.next(), "track dir")?)
                    .ok_or_else(|| p.err("bad track direction"))?;
                shared.tracks.push(Track {
                    player_id,
                    mob_vnum,
                    timestamp,
                    dir,
                });
            }
            _ => {
                let Some(r) = room.as_mut() else {
                    return Err(p.err(format!("room field {} in map entry", tag)));
                };
                parse_room_field(&p, r, tag, rest, saved_at.unwrap_or(now))?;
            }
        }
    }
    if !ended {
        return Err(p.err("missing End World File"));
    }
    let vnum = vnum.ok_or_else(|| p.err("missing entry header"))?;
    Ok(RoomFileEntry { vnum, shared, room })
}

fn parse_room_field(
    p: &LineParser<'_>,
    r: &mut RoomText,
    tag: &str,
    rest: &str,
    saved_at: i64,
) -> Result<(), WorldError> {
    let mut f = rest.split_whitespace();
    match tag {
        "Sector" => {
            r.sector = p.int(f.next(), "sector")?;
            r.base_sector = p.int(f.next(), "base sector")?;
        }
        "Crop" => r.crop = Some(p.int(f.next(), "crop")?),
        "Owner" => r.owner = Some(p.int(f.next(), "owner")?),
        "Home" => r.home_room = p.int(f.next(), "home room")?,
        "Population" => r.population = p.int(f.next(), "population")?,
        "AutoDelete" => r.auto_delete = true,
        "Pack" => r.has_pack = true,
        "Instance" => r.instance_id = Some(p.int(f.next(), "instance")?),
        "Complex" => r.complex = Some(ComplexData::default()),
        "Affect" => {
            let kind = p.int(f.next(), "affect type")?;
            let cast_by = p.int(f.next(), "affect caster")?;
            let expire_time = match p.int::<i64>(f.next(), "affect duration")? {
                UNLIMITED => None,
                remaining => Some(saved_at + remaining),
            };
            let modifier = p.int(f.next(), "affect modifier")?;
            let location = p.int(f.next(), "affect location")?;
            let bits = RoomAffects::from_bits_truncate(p.int(f.next(), "affect bits")?);
            r.affects.push(RoomAffect {
                kind,
                cast_by,
                expire_time,
                modifier,
                location,
                bits,
            });
        }
        "Trigger" => r.script.triggers.push(p.int(f.next(), "trigger")?),
        "Var" => {
            let mut parts = rest.splitn(3, ' ');
            let context = p.int(parts.next(), "var context")?;
            let name = parts.next().ok_or_else(|| p.err("var name"))?.to_string();
            let value = unescape_field(parts.next().unwrap_or(""));
            r.script.vars.push(ScriptVar {
                context,
                name,
                value,
            });
        }
        "Load" => r.resets.push(parse_reset(p, rest)?),
        _ => {
            let Some(complex) = r.complex.as_mut() else {
                return Err(p.err(format!("{} before Complex", tag)));
            };
            parse_complex_field(p, complex, tag, rest, saved_at)?;
        }
    }
    Ok(())
}

fn parse_complex_field(
    p: &LineParser<'_>,
    c: &mut ComplexData,
    tag: &str,
    rest: &str,
    saved_at: i64,
) -> Result<(), WorldError> {
    let mut f = rest.split_whitespace();
    match tag {
        "Building" => c.building = Some(p.int(f.next(), "building")?),
        "Template" => c.template = Some(p.int(f.next(), "template")?),
        "Entrance" => {
            c.entrance = Some(
                Direction::from_code(p.int(f.next(), "entrance")?)
                    .ok_or_else(|| p.err("bad entrance"))?,
            )
        }
        "Patron" => c.patron = Some(p.int(f.next(), "patron")?),
        "Burning" => {
            let remaining: i64 = p.int(f.next(), "burn time")?;
            c.burn_down_time = Some(saved_at + remaining);
        }
        "Damage" => c.damage = p.int(f.next(), "damage")?,
        "PrivateOwner" => c.private_owner = Some(p.int(f.next(), "private owner")?),
        "Paint" => c.paint_color = p.int(f.next(), "paint")?,
        "Inside" => c.inside_rooms = p.int(f.next(), "inside rooms")?,
        "Resource" | "BuiltWith" => {
            let kind = ResourceKind::from_code(p.int(f.next(), "resource kind")?)
                .ok_or_else(|| p.err("unknown resource kind"))?;
            let res = Resource {
                kind,
                vnum: p.int(f.next(), "resource vnum")?,
                amount: p.int(f.next(), "resource amount")?,
            };
            if tag == "Resource" {
                c.resources.push(res);
            } else {
                c.built_with.push(res);
            }
        }
        "Exit" => {
            let dir = Direction::from_code(p.int(f.next(), "exit dir")?)
                .ok_or_else(|| p.err("bad exit direction"))?;
            let to_room = p.int(f.next(), "exit target")?;
            let flags = ExitFlags::from_bits_truncate(p.int(f.next(), "exit flags")?);
            let keyword = match rest.splitn(4, ' ').nth(3) {
                Some("-") | None => None,
                Some(k) => Some(unescape_field(k)),
            };
            c.exits.push(Exit {
                dir,
                to_room,
                keyword,
                flags,
            });
        }
        other => return Err(p.err(format!("unknown tag {}", other))),
    }
    Ok(())
}

fn parse_reset(p: &LineParser<'_>, rest: &str) -> Result<ResetCommand, WorldError> {
    let mut f = rest.split_whitespace();
    let cmd = f.next().ok_or_else(|| p.err("empty reset"))?;
    Ok(match cmd {
        "M" => ResetCommand::Mob {
            vnum: p.int(f.next(), "reset mob")?,
            flags: p.int(f.next(), "reset flags")?,
            rope: p.int(f.next(), "reset rope")?,
        },
        "I" => ResetCommand::Instance {
            id: p.int(f.next(), "reset instance")?,
        },
        "D" => ResetCommand::Dynamic {
            sex: p.int(f.next(), "reset sex")?,
            name: p.int(f.next(), "reset name")?,
            loyalty: p.int(f.next(), "reset loyalty")?,
        },
        "C" => ResetCommand::Cooldown {
            kind: p.int(f.next(), "reset cooldown")?,
            seconds: p.int(f.next(), "reset seconds")?,
        },
        "T" => ResetCommand::Trigger {
            attach: p.int(f.next(), "reset attach")?,
            vnum: p.int(f.next(), "reset trigger")?,
        },
        "V" => {
            let mut parts = rest.splitn(5, ' ').skip(1);
            ResetCommand::Var {
                attach: p.int(parts.next(), "reset attach")?,
                context: p.int(parts.next(), "reset context")?,
                name: parts.next().ok_or_else(|| p.err("reset var name"))?.to_string(),
                value: unescape_field(parts.next().unwrap_or("")),
            }
        }
        "O" => ResetCommand::ObjectPack,
        other => return Err(p.err(format!("unknown reset {}", other))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interior_entry() -> RoomFileEntry {
        let mut room = RoomText::new(500, 12, 12);
        room.owner = Some(3);
        room.home_room = 400;
        room.population = 4;
        let mut complex = ComplexData {
            building: Some(102),
            burn_down_time: Some(1_000 + 90),
            damage: 12.5,
            ..ComplexData::default()
        };
        complex.resources.push(Resource {
            kind: ResourceKind::Object,
            vnum: 120,
            amount: 2,
        });
        complex.exits.push(Exit {
            dir: Direction::Up,
            to_room: 501,
            keyword: Some("trap door".to_string()),
            flags: ExitFlags::IS_DOOR,
        });
        room.complex = Some(complex);
        room.affects.push(RoomAffect {
            kind: 2,
            cast_by: 7,
            expire_time: Some(1_000 + 60),
            modifier: 0,
            location: 0,
            bits: RoomAffects::DARK,
        });
        room.affects.push(RoomAffect {
            kind: 5,
            cast_by: 0,
            expire_time: None,
            modifier: 1,
            location: 2,
            bits: RoomAffects::NO_WORK,
        });
        room.script.vars.push(ScriptVar {
            context: 0,
            name: "greeting".to_string(),
            value: "hello there\nfriend".to_string(),
        });
        room.resets.push(ResetCommand::Var {
            attach: 2,
            context: 1,
            name: "mood".to_string(),
            value: "grim and grey".to_string(),
        });
        room.resets.push(ResetCommand::Mob {
            vnum: 3000,
            flags: 5,
            rope: -1,
        });
        RoomFileEntry {
            vnum: 500,
            shared: SharedText {
                name: Some("The Back\\Room".to_string()),
                description: Some("Dusty.\nVery dusty.".to_string()),
                height: 2,
                extra: vec![(ExtraKey::FoundTime, 99)],
                ..SharedText::default()
            },
            room: Some(room),
        }
    }

    #[test]
    fn timers_keep_running_while_saved() {
        let entry = interior_entry();
        let text = render_entry(&entry, 1_000);
        assert!(text.contains("Burning: 90"));
        let back = parse_entry(Path::new("500.wld"), &text, 1_100).expect("parse");
        let room = back.room.as_ref().expect("room");
        assert_eq!(room.complex.as_ref().and_then(|c| c.burn_down_time), Some(1_090));
        // expired 40 seconds before the load
        assert_eq!(room.affects[0].expire_time, Some(1_060));
        assert_eq!(room.affects[0].remaining(1_100), Some(0));
        assert_eq!(room.affects[1].expire_time, None);
        assert_eq!(back.shared, entry.shared);
        assert_eq!(room.script, entry.room.as_ref().map(|r| r.script.clone()).unwrap_or_default());
        assert_eq!(room.resets, entry.room.as_ref().map(|r| r.resets.clone()).unwrap_or_default());
        assert_eq!(room.complex.as_ref().map(|c| c.exits().to_vec()).unwrap_or_default().len(), 1);
    }

    #[test]
    fn affect_loaded_later_has_less_time_left() {
        let entry = interior_entry();
        let text = render_entry(&entry, 1_000);
        let back = parse_entry(Path::new("500.wld"), &text, 1_025).expect("parse");
        let room = back.room.as_ref().expect("room");
        assert_eq!(room.affects[0].remaining(1_025), Some(35));
        assert_eq!(room.affects[1].remaining(1_025), None);
    }

    #[test]
    fn missing_stamp_anchors_on_load_time() {
        let text = "#500 R\nSector: 12 12\nAffect: 2 7 30 0 0 0\nEnd World File\n";
        let back = parse_entry(Path::new("500.wld"), text, 2_000).expect("parse");
        let room = back.room.as_ref().expect("room");
        assert_eq!(room.affects[0].expire_time, Some(2_030));
    }

    #[test]
    fn map_entries_reject_room_fields() {
        let text = "Saved: 10\n#42 M\nName: Old Road\nOwner: 3\nEnd World File\n";
        let err = parse_entry(Path::new("42.wld"), text, 10).unwrap_err();
        assert!(matches!(err, WorldError::CorruptFile { line: 4, .. }));
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let text = "Saved: 10\n#42 M\nName: Old Road\n";
        assert!(parse_entry(Path::new("42.wld"), text, 10).is_err());
    }
}
