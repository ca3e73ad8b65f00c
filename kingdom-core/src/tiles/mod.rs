//! Realm tiles - type enumeration, cells and write validation
//!
//! Tile types travel on the wire and sit in storage as small integers. The
//! codes are append-only: a new type gets the next free integer, existing
//! codes are never renumbered.
//!
//! A cell with no stored row is `Empty`. Seeding never writes `Empty` cells.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Exclusive upper bound for tile coordinates on either axis.
pub const MAX_GRID_COORD: i32 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileError {
    #[error("unknown tile type code {0}")]
    UnknownCode(i64),
    #[error("unknown tile type name '{0}'")]
    UnknownName(String),
    #[error("coordinate ({x}, {y}) outside 0..{max}", max = MAX_GRID_COORD)]
    CoordinateOutOfRange { x: i64, y: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TileType {
    Empty = 0,
    Grass = 1,
    Water = 2,
    Mountain = 3,
    Forest = 4,
    Desert = 5,
    City = 6,
    Cave = 7,
    Treasure = 8,
    Castle = 9,
    Dungeon = 10,
    Town = 11,
    Mystery = 12,
    PortalEntrance = 13,
    PortalExit = 14,
    Snow = 15,
    Ice = 16,
    Lava = 17,
    Volcano = 18,
    Sheep = 19,
    Horse = 20,
    Special = 21,
    Swamp = 22,
    Monster = 23,
    Vacant = 24,
}

impl TileType {
    /// Every tile type, in code order.
    pub const ALL: [TileType; 25] = [
        TileType::Empty,
        TileType::Grass,
        TileType::Water,
        TileType::Mountain,
        TileType::Forest,
        TileType::Desert,
        TileType::City,
        TileType::Cave,
        TileType::Treasure,
        TileType::Castle,
        TileType::Dungeon,
        TileType::Town,
        TileType::Mystery,
        TileType::PortalEntrance,
        TileType::PortalExit,
        TileType::Snow,
        TileType::Ice,
        TileType::Lava,
        TileType::Volcano,
        TileType::Sheep,
        TileType::Horse,
        TileType::Special,
        TileType::Swamp,
        TileType::Monster,
        TileType::Vacant,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: i64) -> Result<Self, TileError> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .ok_or(TileError::UnknownCode(code))
    }

    pub fn name(self) -> &'static str {
        match self {
            TileType::Empty => "empty",
            TileType::Grass => "grass",
            TileType::Water => "water",
            TileType::Mountain => "mountain",
            TileType::Forest => "forest",
            TileType::Desert => "desert",
            TileType::City => "city",
            TileType::Cave => "cave",
            TileType::Treasure => "treasure",
            TileType::Castle => "castle",
            TileType::Dungeon => "dungeon",
            TileType::Town => "town",
            TileType::Mystery => "mystery",
            TileType::PortalEntrance => "portal-entrance",
            TileType::PortalExit => "portal-exit",
            TileType::Snow => "snow",
            TileType::Ice => "ice",
            TileType::Lava => "lava",
            TileType::Volcano => "volcano",
            TileType::Sheep => "sheep",
            TileType::Horse => "horse",
            TileType::Special => "special",
            TileType::Swamp => "swamp",
            TileType::Monster => "monster",
            TileType::Vacant => "vacant",
        }
    }

    pub fn is_empty(self) -> bool {
        self == TileType::Empty
    }
}

impl fmt::Display for TileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TileType {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| TileError::UnknownName(s.to_string()))
    }
}

impl TryFrom<i64> for TileType {
    type Error = TileError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl Serialize for TileType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for TileType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        TileType::from_code(code).map_err(de::Error::custom)
    }
}

// ============================================================================
// Cells and writes
// ============================================================================

/// A positioned tile type, as found in the seed template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCell {
    pub x: i32,
    pub y: i32,
    pub tile_type: TileType,
}

/// Stored state of one realm cell, also the unit of a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
    pub tile_type: TileType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl Tile {
    pub fn new(x: i32, y: i32, tile_type: TileType) -> Self {
        Self {
            x,
            y,
            tile_type,
            event_type: None,
            meta: None,
        }
    }

    /// Build a write from raw wire values, checking coordinates and type code.
    pub fn from_raw(
        x: i64,
        y: i64,
        tile_type: i64,
        event_type: Option<String>,
        meta: Option<serde_json::Value>,
    ) -> Result<Self, TileError> {
        let (x, y) = validate_coordinates(x, y)?;
        Ok(Self {
            x,
            y,
            tile_type: TileType::from_code(tile_type)?,
            event_type,
            meta,
        })
    }

    pub fn key(&self) -> (i32, i32) {
        (self.x, self.y)
    }
}

impl From<TileCell> for Tile {
    fn from(cell: TileCell) -> Self {
        Tile::new(cell.x, cell.y, cell.tile_type)
    }
}

pub fn validate_coordinates(x: i64, y: i64) -> Result<(i32, i32), TileError> {
    let range = 0..i64::from(MAX_GRID_COORD);
    if !range.contains(&x) || !range.contains(&y) {
        return Err(TileError::CoordinateOutOfRange { x, y });
    }
    Ok((x as i32, y as i32))
}

/// Drop earlier writes to a cell that is written again later in the batch.
///
/// Survivors keep the position of the *last* write to their cell.
pub fn collapse_batch(writes: Vec<Tile>) -> Vec<Tile> {
    let mut last_index: HashMap<(i32, i32), usize> = HashMap::with_capacity(writes.len());
    for (idx, write) in writes.iter().enumerate() {
        last_index.insert(write.key(), idx);
    }
    writes
        .into_iter()
        .enumerate()
        .filter(|(idx, write)| last_index.get(&write.key()) == Some(idx))
        .map(|(_, write)| write)
        .collect()
}
