//! State management for the Snakes & Ladders session engine.
//!
//! This module provides the core state types:
//!
//! - `board` - Board topology (serpentine coordinates, warp table)
//! - `roster` - Join-ordered membership of one game
//! - `session` - Per-game state machine (lifecycle, rounds, rolls)
//! - `registry` - Channel to live-session mapping
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       SessionRegistry                        │
//! │                                                              │
//! │   channel_id ──▶ Arc<Mutex<GameSession>>                     │
//! │                        │                                     │
//! │                        ▼                                     │
//! │   ┌──────────────────────────────────────────────────────┐   │
//! │   │ GameSession                                          │   │
//! │   │                                                      │   │
//! │   │  Booting ─▶ Waiting ─▶ Starting ─▶ RoundInProgress   │   │
//! │   │                                         │            │   │
//! │   │                                         ▼            │   │
//! │   │  Roster: players (join order), tiles,  Finished      │   │
//! │   │          roll flags, avatar handles                  │   │
//! │   └──────────────────────────────────────────────────────┘   │
//! │                                                              │
//! │   board: coordinate_of(tile), warp_target(tile)  (pure)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is synchronous and pure; the async command layer
//! that wires in dice, avatars, rendering and announcements lives in
//! [`crate::engine`].

pub mod board;
pub mod registry;
pub mod roster;
pub mod session;

// Re-export commonly used types
pub use board::{coordinate_of, warp_target, BoardMarker, Coordinate, WarpKind, BOARD_TILES};
pub use registry::{RegistryError, SessionHandle, SessionRegistry};
pub use roster::{Roster, RosterError, MAX_PLAYERS, MIN_PLAYERS};
pub use session::{
    GameSession, LeaveOutcome, RollOutcome, RoundProgress, RoundStart, SessionError,
    SessionStatus,
};

/// Opaque identifier of a player on the chat platform.
pub type PlayerId = u64;

/// Opaque identifier of a communication channel.
pub type ChannelId = u64;

/// Opaque avatar image handle, fetched once at join time and owned by
/// the session until destruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Avatar {
    pub bytes: Vec<u8>,
}

impl Avatar {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}
