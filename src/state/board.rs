//! Board topology.
//!
//! Pure, process-wide board data: the serpentine mapping from a linear
//! tile index to grid coordinates, and the static warp (snake/ladder)
//! table. Nothing here has state or failure modes; coordinates exist
//! only so the rendering adapter can place avatar markers.

use serde::Serialize;

use super::PlayerId;

/// Number of tiles on the board.
pub const BOARD_TILES: u8 = 100;

/// Tiles per row.
pub const BOARD_COLUMNS: u8 = 10;

/// Grid position of a tile. `y = 0` is the bottom row; image-space
/// flipping is the renderer's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Coordinate {
    pub x: u8,
    pub y: u8,
}

/// Map a tile index (1..=100) to grid coordinates.
///
/// The path is serpentine starting at the bottom-left tile: even rows
/// (counting from the bottom) run left to right, odd rows right to left.
pub fn coordinate_of(tile: u8) -> Coordinate {
    debug_assert!((1..=BOARD_TILES).contains(&tile));
    let row = (tile - 1) / BOARD_COLUMNS;
    let col = (tile - 1) % BOARD_COLUMNS;
    let x = if row % 2 == 0 {
        col
    } else {
        BOARD_COLUMNS - 1 - col
    };
    Coordinate { x, y: row }
}

/// Direction of a warp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarpKind {
    /// Destination above the source
    Ladder,
    /// Destination below the source
    Snake,
}

impl WarpKind {
    /// Classify a warp by its endpoints.
    pub fn of(source: u8, destination: u8) -> Self {
        if destination > source {
            Self::Ladder
        } else {
            Self::Snake
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ladder => "ladder",
            Self::Snake => "snake",
        }
    }
}

/// Warp destination for a tile, if it has one.
///
/// A tile with no entry is a plain tile. Callers apply at most one hop;
/// no destination in this table is itself a warp source.
pub fn warp_target(tile: u8) -> Option<u8> {
    // Tile 1 carries no ladder: a roll can never land there.
    let target = match tile {
        // ladders
        4 => 14,
        9 => 31,
        21 => 42,
        28 => 84,
        36 => 44,
        51 => 67,
        71 => 91,
        80 => 100,
        // snakes
        16 => 6,
        47 => 26,
        49 => 11,
        56 => 53,
        62 => 19,
        64 => 60,
        87 => 24,
        93 => 73,
        95 => 75,
        98 => 78,
        _ => return None,
    };
    Some(target)
}

/// Render input for one player's avatar marker.
///
/// When several players share a tile, markers are nudged by join order so
/// avatars never fully overlap: odd join indexes shift right, indexes
/// past the first pair shift up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoardMarker {
    pub player: PlayerId,
    pub coordinate: Coordinate,
    pub nudge_right: bool,
    pub nudge_up: bool,
}

impl BoardMarker {
    /// Build the marker for a player at `tile` with join index `join_index`.
    pub fn new(player: PlayerId, tile: u8, join_index: usize) -> Self {
        Self {
            player,
            coordinate: coordinate_of(tile),
            nudge_right: join_index % 2 == 1,
            nudge_up: join_index >= 2,
        }
    }
}
