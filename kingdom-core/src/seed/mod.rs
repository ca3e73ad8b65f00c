//! Starting realm template
//!
//! Every new realm begins as this 7x13 map: a mountain ring around mixed
//! grass and forest, with an unplaced bottom row. Row index is `y`, column
//! index is `x`. Only non-empty cells are ever written to storage.

use crate::tiles::{TileCell, TileType};

pub const SEED_ROWS: usize = 7;
pub const SEED_COLUMNS: usize = 13;

const M: u8 = TileType::Mountain as u8;
const G: u8 = TileType::Grass as u8;
const F: u8 = TileType::Forest as u8;
const E: u8 = TileType::Empty as u8;

#[rustfmt::skip]
pub const SEED_TEMPLATE: [[u8; SEED_COLUMNS]; SEED_ROWS] = [
    [M, M, M, M, M, M, M, M, M, M, M, M, M],
    [M, G, G, F, G, G, G, F, G, G, F, G, M],
    [M, G, F, G, G, F, G, G, G, F, G, G, M],
    [M, F, G, G, G, G, G, F, G, G, G, F, M],
    [M, G, G, F, G, G, F, G, G, F, G, G, M],
    [M, M, M, M, M, M, M, M, M, M, M, M, M],
    [E, E, E, E, E, E, E, E, E, E, E, E, E],
];

/// Template cells to persist for a fresh realm, in row-major order.
pub fn seed_cells() -> Vec<TileCell> {
    let mut cells = Vec::with_capacity(SEED_ROWS * SEED_COLUMNS);
    for (y, row) in SEED_TEMPLATE.iter().enumerate() {
        for (x, &code) in row.iter().enumerate() {
            // The template only holds valid codes
            let Ok(tile_type) = TileType::from_code(i64::from(code)) else {
                continue;
            };
            if tile_type.is_empty() {
                continue;
            }
            cells.push(TileCell {
                x: x as i32,
                y: y as i32,
                tile_type,
            });
        }
    }
    cells
}

/// Number of cells `seed_cells` yields.
pub fn seed_cell_count() -> usize {
    SEED_TEMPLATE
        .iter()
        .flatten()
        .filter(|&&code| code != TileType::Empty as u8)
        .count()
}
