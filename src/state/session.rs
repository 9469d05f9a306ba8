//! Game session state machine.
//!
//! One `GameSession` per active game. Transitions are pure and
//! synchronous: they either mutate state and return a structured outcome
//! for the caller to announce, or fail atomically with no mutation. Dice
//! are rolled by the caller so resolution stays deterministic here.
//!
//! Lifecycle:
//!
//! ```text
//! Booting ──▶ Waiting ──▶ Starting ──▶ RoundInProgress ──▶ Finished
//!   (author     (join/       (begin)      (roll loop)      (win, surrender
//!    auto-join)  leave)                                      or cancel)
//! ```

use chrono::{DateTime, Utc};

use super::board::{warp_target, BoardMarker, WarpKind, BOARD_TILES};
use super::roster::{Roster, RosterError, MIN_PLAYERS};
use super::{Avatar, ChannelId, PlayerId};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// Session created, author not yet admitted
    #[default]
    Booting,
    /// Accepting joins and leaves
    Waiting,
    /// Start accepted, first round not yet begun
    Starting,
    /// A round is underway, awaiting rolls
    RoundInProgress,
    /// Terminal; the session is discarded
    Finished,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Booting => "booting",
            Self::Waiting => "waiting",
            Self::Starting => "starting",
            Self::RoundInProgress => "round_in_progress",
            Self::Finished => "finished",
        }
    }

    /// Check if rolls are being accepted.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::RoundInProgress)
    }

    /// Check if the game has started and not yet ended.
    pub fn is_underway(&self) -> bool {
        matches!(self, Self::Starting | Self::RoundInProgress)
    }

    /// Check if the session is dead.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

/// Session errors. All user-facing, none process-fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// The operation is invalid for the current state
    WrongState(SessionStatus),
    /// Only the author may start or cancel
    NotAuthor,
    /// Starting needs at least two players
    InsufficientPlayers,
    /// The player already rolled this round
    AlreadyRolled,
    /// Roster policy refusal
    Roster(RosterError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongState(_) => write!(f, "You cannot do that at this time"),
            Self::NotAuthor => write!(f, "Only the author of the game can do that"),
            Self::InsufficientPlayers => write!(
                f,
                "A minimum of {} players is required to start the game",
                MIN_PLAYERS
            ),
            Self::AlreadyRolled => {
                write!(f, "You have already rolled this round, please be patient")
            }
            Self::Roster(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<RosterError> for SessionError {
    fn from(err: RosterError) -> Self {
        Self::Roster(err)
    }
}

/// Data for announcing and rendering a freshly started round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundStart {
    /// Round number, 1-indexed
    pub round: u32,
    /// `(player, tile)` in join order
    pub positions: Vec<(PlayerId, u8)>,
    /// Render markers in join order
    pub markers: Vec<BoardMarker>,
}

/// What a successful roll did to the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundProgress {
    /// The roller reached tile 100; the session is finished
    Won,
    /// Every present player has rolled; time for the next round
    RoundComplete,
    /// Still waiting on other rollers
    AwaitingOthers,
}

/// Result of one resolved roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollOutcome {
    /// The die value, 1..=6
    pub die: u8,
    /// Warp taken on the landing tile, if any
    pub warp: Option<(WarpKind, u8)>,
    /// Final tile after warp and clamping
    pub tile: u8,
    pub progress: RoundProgress,
}

/// Result of a player leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left {
        remaining: usize,
        /// The departure emptied the round's wait-set
        round_now_complete: bool,
    },
    /// One player remained mid-game; they win and the session is finished
    Surrendered { winner: PlayerId },
}

/// One game bound to one channel.
#[derive(Debug)]
pub struct GameSession {
    /// Channel this game lives in; registry key
    pub channel_id: ChannelId,

    /// Creator; exclusive rights to start and cancel
    pub author_id: PlayerId,

    pub status: SessionStatus,

    roster: Roster,

    /// Completed `begin_round` calls, 1-indexed once play starts
    pub round: u32,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl GameSession {
    /// Create a session in `Booting`; the author is admitted separately
    /// once their avatar is in hand.
    pub fn new(channel_id: ChannelId, author_id: PlayerId) -> Self {
        Self {
            channel_id,
            author_id,
            status: SessionStatus::Booting,
            roster: Roster::new(author_id),
            round: 0,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Check whether a join would be accepted, without mutating.
    pub fn vet_join(&self, player: PlayerId) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Booting if player == self.author_id => {}
            SessionStatus::Waiting => {}
            status => return Err(SessionError::WrongState(status)),
        }
        self.roster.vet(player)?;
        Ok(())
    }

    /// Admit a player with a ready avatar handle. Returns the new player
    /// count. During `Booting` only the author may be admitted.
    pub fn admit(&mut self, player: PlayerId, avatar: Avatar) -> Result<usize, SessionError> {
        self.vet_join(player)?;
        self.roster.add(player, avatar)?;
        Ok(self.roster.count())
    }

    /// `Booting -> Waiting`, once the author is in and the opening
    /// announcement went out. One-way.
    pub fn open_complete(&mut self) {
        debug_assert_eq!(self.status, SessionStatus::Booting);
        self.status = SessionStatus::Waiting;
    }

    /// Accept the author's start request: `Waiting -> Starting`.
    pub fn begin(&mut self, caller: PlayerId) -> Result<(), SessionError> {
        if caller != self.author_id {
            return Err(SessionError::NotAuthor);
        }
        if self.roster.count() < MIN_PLAYERS {
            return Err(SessionError::InsufficientPlayers);
        }
        if self.status != SessionStatus::Waiting {
            return Err(SessionError::WrongState(self.status));
        }
        self.status = SessionStatus::Starting;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Begin the next round: reset roll flags for every present player
    /// and hand back positions and render markers.
    pub fn begin_round(&mut self) -> RoundStart {
        debug_assert!(self.status.is_underway());
        self.status = SessionStatus::RoundInProgress;
        self.round += 1;
        self.roster.reset_rolls();

        let positions = self.roster.positions();
        let markers = positions
            .iter()
            .enumerate()
            .map(|(join_index, (player, tile))| BoardMarker::new(*player, *tile, join_index))
            .collect();

        RoundStart {
            round: self.round,
            positions,
            markers,
        }
    }

    /// Resolve a roll for `player` with a die already drawn by the caller.
    ///
    /// The landing tile takes at most one warp hop, then is clamped to
    /// 100; there is no must-land-exactly rule.
    pub fn roll(&mut self, player: PlayerId, die: u8) -> Result<RollOutcome, SessionError> {
        debug_assert!((1..=6).contains(&die));
        let tile = self
            .roster
            .tile(player)
            .ok_or(RosterError::NotAPlayer)?;
        if self.status != SessionStatus::RoundInProgress {
            return Err(SessionError::WrongState(self.status));
        }
        if self.roster.has_rolled(player) {
            return Err(SessionError::AlreadyRolled);
        }

        let candidate = tile + die;
        let warp = warp_target(candidate).map(|dest| (WarpKind::of(candidate, dest), dest));
        let landed = warp.map_or(candidate, |(_, dest)| dest);
        let final_tile = landed.min(BOARD_TILES);

        self.roster.set_tile(player, final_tile);
        self.roster.mark_rolled(player);

        let progress = if final_tile == BOARD_TILES {
            self.finish();
            RoundProgress::Won
        } else if self.roster.all_rolled() {
            RoundProgress::RoundComplete
        } else {
            RoundProgress::AwaitingOthers
        };

        Ok(RollOutcome {
            die,
            warp,
            tile: final_tile,
            progress,
        })
    }

    /// Remove a player. Mid-game, the last player standing wins by
    /// surrender. The departed player's roll-flag entry is deleted, so an
    /// already-waiting round may complete through their departure.
    pub fn withdraw(&mut self, player: PlayerId) -> Result<LeaveOutcome, SessionError> {
        self.roster.remove(player)?;

        if self.status.is_underway() && self.roster.count() == 1 {
            let winner = self.roster.players()[0];
            self.finish();
            return Ok(LeaveOutcome::Surrendered { winner });
        }

        let round_now_complete =
            self.status == SessionStatus::RoundInProgress && self.roster.all_rolled();

        Ok(LeaveOutcome::Left {
            remaining: self.roster.count(),
            round_now_complete,
        })
    }

    /// Author-only tear-down, valid in any non-terminal state.
    pub fn cancel(&mut self, caller: PlayerId) -> Result<(), SessionError> {
        if caller != self.author_id {
            return Err(SessionError::NotAuthor);
        }
        if self.status.is_terminal() {
            return Err(SessionError::WrongState(self.status));
        }
        self.finish();
        Ok(())
    }

    fn finish(&mut self) {
        self.status = SessionStatus::Finished;
        self.ended_at = Some(Utc::now());
    }

    /// Convert the session to a JSON snapshot.
    pub fn to_json(&self) -> serde_json::Value {
        let players: Vec<serde_json::Value> = self
            .roster
            .positions()
            .into_iter()
            .map(|(player, tile)| {
                serde_json::json!({
                    "player_id": player,
                    "tile": tile,
                    "has_rolled": self.roster.has_rolled(player)
                })
            })
            .collect();

        serde_json::json!({
            "channel_id": self.channel_id,
            "author_id": self.author_id,
            "status": self.status.as_str(),
            "round": self.round,
            "players": players,
            "created_at": self.created_at,
            "started_at": self.started_at,
            "ended_at": self.ended_at
        })
    }
}
