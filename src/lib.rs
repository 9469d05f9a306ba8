//! Snakes & Ladders Session Engine
//!
//! This crate runs turn-based Snakes & Ladders games inside chat
//! channels: many independent games at once, one per channel.
//!
//! # Overview
//!
//! - **Board Topology** - Pure serpentine tile/coordinate mapping and the
//!   static warp (snake/ladder) table.
//!
//! - **Player Roster** - Join-ordered membership with per-player tile,
//!   per-round roll flag, and owned avatar handle. 2-4 players.
//!
//! - **Game Session** - The per-game state machine: lifecycle, round
//!   bookkeeping, roll resolution, surrender and cancellation.
//!
//! - **Session Registry** - At most one live session per channel, handing
//!   out the per-session execution lock.
//!
//! - **Engine** - The async command layer tying the state machine to its
//!   collaborators (avatar fetch, board rendering, announcements).
//!
//! # Design Principles
//!
//! 1. **Transitions are pure** - State methods either mutate and return a
//!    structured outcome, or fail atomically with a user-facing error.
//!
//! 2. **Dice and I/O stay at the edge** - The engine draws the die and
//!    talks to collaborators; the state layer is deterministic.
//!
//! 3. **One lock per session** - Every operation on a session holds its
//!    async mutex from first read to last write, suspension points
//!    included. Distinct channels share nothing.
//!
//! # Example
//!
//! ```rust
//! use ladders_engine::{Avatar, GameSession, RoundProgress, WarpKind};
//!
//! let mut session = GameSession::new(42, 1);
//!
//! // The author is admitted during boot, then the session opens.
//! session.admit(1, Avatar::new(Vec::new())).unwrap();
//! session.open_complete();
//! session.admit(2, Avatar::new(Vec::new())).unwrap();
//!
//! session.begin(1).unwrap();
//! let round = session.begin_round();
//! assert_eq!(round.round, 1);
//!
//! // Tile 1 + 3 lands on 4, which carries a ladder up to 14.
//! let outcome = session.roll(1, 3).unwrap();
//! assert_eq!(outcome.warp, Some((WarpKind::Ladder, 14)));
//! assert_eq!(outcome.tile, 14);
//! assert_eq!(outcome.progress, RoundProgress::AwaitingOthers);
//! ```

pub mod engine;
pub mod state;

// Re-export everything from the state module at the crate root
pub use state::*;
