//! Kingdom Core Library
//!
//! Pure game rules shared by the server and its clients:
//! - Leveling engine (experience → level / progress / remaining)
//! - Realm tile enumeration with stable integer codes
//! - Starting realm template used for first-access seeding
//! - Tracing setup

pub mod leveling;
pub mod logging;
pub mod seed;
pub mod tiles;

pub use leveling::{LevelCurve, LevelProgress, MAX_LEVEL};
pub use tiles::{Tile, TileCell, TileError, TileType};
