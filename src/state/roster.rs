//! Player roster.
//!
//! Ordered membership for one game session: join order, per-player tile,
//! per-round roll flag, and the owned avatar handle. Join order matters —
//! it decides marker placement on the rendered board.

use std::collections::HashMap;

use super::board::BOARD_TILES;
use super::{Avatar, PlayerId};

/// Maximum players per game.
pub const MAX_PLAYERS: usize = 4;

/// Minimum players required to start.
pub const MIN_PLAYERS: usize = 2;

/// Tile every player starts on.
pub const START_TILE: u8 = 1;

/// Roster errors. All user-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterError {
    Full,
    AlreadyJoined,
    NotAPlayer,
    AuthorCannotLeave,
}

impl std::fmt::Display for RosterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "The game is full"),
            Self::AlreadyJoined => write!(f, "You are already in the game"),
            Self::NotAPlayer => write!(f, "You are not in the match"),
            Self::AuthorCannotLeave => {
                write!(f, "You are the game author and cannot leave; cancel the game instead")
            }
        }
    }
}

impl std::error::Error for RosterError {}

/// Membership state for one session.
#[derive(Debug, Default)]
pub struct Roster {
    author_id: PlayerId,

    /// Player IDs in join order
    players: Vec<PlayerId>,

    /// Tile per player, always in 1..=100
    tiles: HashMap<PlayerId, u8>,

    /// Whether each player has rolled in the current round
    rolled: HashMap<PlayerId, bool>,

    /// Avatar handles, owned until the player leaves or the session dies
    avatars: HashMap<PlayerId, Avatar>,
}

impl Roster {
    pub fn new(author_id: PlayerId) -> Self {
        Self {
            author_id,
            ..Self::default()
        }
    }

    pub fn author_id(&self) -> PlayerId {
        self.author_id
    }

    /// Check whether a player could join right now, without mutating.
    ///
    /// Lets callers refuse before paying for an avatar fetch.
    pub fn vet(&self, player: PlayerId) -> Result<(), RosterError> {
        if self.contains(player) {
            return Err(RosterError::AlreadyJoined);
        }
        if self.is_full() {
            return Err(RosterError::Full);
        }
        Ok(())
    }

    /// Add a player with a ready avatar handle, starting on tile 1.
    pub fn add(&mut self, player: PlayerId, avatar: Avatar) -> Result<(), RosterError> {
        self.vet(player)?;
        self.players.push(player);
        self.tiles.insert(player, START_TILE);
        self.avatars.insert(player, avatar);
        Ok(())
    }

    /// Remove a player, releasing their avatar handle.
    ///
    /// The author can never leave; they cancel instead.
    pub fn remove(&mut self, player: PlayerId) -> Result<Avatar, RosterError> {
        if player == self.author_id {
            return Err(RosterError::AuthorCannotLeave);
        }
        let index = self
            .players
            .iter()
            .position(|p| *p == player)
            .ok_or(RosterError::NotAPlayer)?;
        self.players.remove(index);
        self.tiles.remove(&player);
        self.rolled.remove(&player);
        self.avatars.remove(&player).ok_or(RosterError::NotAPlayer)
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.tiles.contains_key(&player)
    }

    pub fn count(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    /// Player IDs in join order.
    pub fn players(&self) -> &[PlayerId] {
        &self.players
    }

    /// Join index of a player (0 for the author).
    pub fn join_index(&self, player: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| *p == player)
    }

    /// `(player, tile)` pairs in join order.
    pub fn positions(&self) -> Vec<(PlayerId, u8)> {
        self.players
            .iter()
            .filter_map(|p| self.tiles.get(p).map(|t| (*p, *t)))
            .collect()
    }

    pub fn tile(&self, player: PlayerId) -> Option<u8> {
        self.tiles.get(&player).copied()
    }

    pub(crate) fn set_tile(&mut self, player: PlayerId, tile: u8) {
        debug_assert!((START_TILE..=BOARD_TILES).contains(&tile));
        if let Some(entry) = self.tiles.get_mut(&player) {
            *entry = tile;
        }
    }

    pub fn has_rolled(&self, player: PlayerId) -> bool {
        self.rolled.get(&player).copied().unwrap_or(false)
    }

    pub(crate) fn mark_rolled(&mut self, player: PlayerId) {
        if let Some(entry) = self.rolled.get_mut(&player) {
            *entry = true;
        }
    }

    /// Reset roll flags for exactly the players present right now.
    pub(crate) fn reset_rolls(&mut self) {
        self.rolled = self.players.iter().map(|p| (*p, false)).collect();
    }

    /// True when every present player has rolled this round.
    pub fn all_rolled(&self) -> bool {
        self.rolled.values().all(|v| *v)
    }

    pub fn avatar(&self, player: PlayerId) -> Option<&Avatar> {
        self.avatars.get(&player)
    }

    /// Avatar handles for every present player.
    pub fn avatars(&self) -> &HashMap<PlayerId, Avatar> {
        &self.avatars
    }
}
