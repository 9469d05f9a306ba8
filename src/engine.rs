//! Async command layer.
//!
//! `GameEngine` exposes the six channel-facing operations (open, join,
//! leave, cancel, start, roll) and wires the pure state machine to its
//! collaborators: avatar fetching, board rendering, and the outbound
//! announcement sink.
//!
//! # Concurrency
//!
//! Operations on one session are serialized by the session handle's
//! async mutex, which is held for the WHOLE logical operation — avatar
//! fetches and render calls included. Two players racing to roll in the
//! same round therefore cannot both observe an un-rolled flag. Sessions
//! on different channels share nothing and run independently.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::state::board::{BoardMarker, WarpKind};
use crate::state::registry::{RegistryError, SessionRegistry};
use crate::state::session::{GameSession, LeaveOutcome, RoundProgress, SessionError};
use crate::state::{Avatar, ChannelId, PlayerId};

/// Fetches a player's profile picture as an opaque image handle.
/// Network-backed; used only at join time.
#[async_trait]
pub trait AvatarFetcher: Send + Sync {
    async fn fetch_avatar(&self, player: PlayerId) -> anyhow::Result<Avatar>;
}

/// Composites player markers onto a board image and encodes it.
/// Pure from the engine's perspective.
#[async_trait]
pub trait BoardRenderer: Send + Sync {
    async fn render_board(
        &self,
        markers: &[BoardMarker],
        avatars: &HashMap<PlayerId, Avatar>,
    ) -> anyhow::Result<Vec<u8>>;
}

/// Outbound notification sink for a channel.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(
        &self,
        channel: ChannelId,
        text: &str,
        attachment: Option<Attachment>,
    ) -> anyhow::Result<()>;
}

/// An encoded image posted alongside an announcement.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Engine errors. Refusals are also announced to the channel, so most
/// callers only need these for logging and tests.
#[derive(Debug)]
pub enum EngineError {
    Registry(RegistryError),
    Session(SessionError),
    Collaborator(anyhow::Error),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registry(err) => err.fmt(f),
            Self::Session(err) => err.fmt(f),
            Self::Collaborator(err) => write!(f, "collaborator failure: {}", err),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<RegistryError> for EngineError {
    fn from(err: RegistryError) -> Self {
        Self::Registry(err)
    }
}

impl From<SessionError> for EngineError {
    fn from(err: SessionError) -> Self {
        Self::Session(err)
    }
}

fn mention(player: PlayerId) -> String {
    format!("<@{}>", player)
}

/// The session engine: registry plus injected collaborators.
pub struct GameEngine {
    registry: SessionRegistry,
    avatars: Arc<dyn AvatarFetcher>,
    renderer: Arc<dyn BoardRenderer>,
    announcer: Arc<dyn Announcer>,
}

impl GameEngine {
    pub fn new(
        avatars: Arc<dyn AvatarFetcher>,
        renderer: Arc<dyn BoardRenderer>,
        announcer: Arc<dyn Announcer>,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(),
            avatars,
            renderer,
            announcer,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Open a game in a channel. The author is auto-joined; a failed
    /// avatar fetch unregisters the channel and aborts.
    pub async fn open_game(
        &self,
        channel: ChannelId,
        author: PlayerId,
    ) -> Result<(), EngineError> {
        let handle = match self.registry.open(channel, author) {
            Ok(handle) => handle,
            Err(err) => {
                self.refuse(channel, author, &err).await;
                return Err(err.into());
            }
        };
        let mut session = handle.lock().await;

        let avatar = match self.avatars.fetch_avatar(author).await {
            Ok(avatar) => avatar,
            Err(err) => {
                warn!(channel, author, error = %err, "avatar fetch failed, open aborted");
                drop(session);
                self.registry.close(channel);
                self.refuse(
                    channel,
                    author,
                    "Your avatar could not be fetched, the game was not opened",
                )
                .await;
                return Err(EngineError::Collaborator(err));
            }
        };
        if let Err(err) = session.admit(author, avatar) {
            drop(session);
            self.registry.close(channel);
            self.refuse(channel, author, &err).await;
            return Err(err.into());
        }

        self.announce(
            channel,
            "**Snakes and Ladders**: A new game is about to start!\nType **join** to participate.",
            None,
        )
        .await;
        session.open_complete();
        info!(channel, author, "game opened");
        Ok(())
    }

    /// Join the channel's game. The avatar is fetched before any state
    /// is touched; a failed fetch aborts the join entirely.
    pub async fn join_game(
        &self,
        channel: ChannelId,
        player: PlayerId,
    ) -> Result<(), EngineError> {
        let Some(handle) = self.registry.get(channel) else {
            return self.refuse_no_game(channel, player).await;
        };
        let mut session = handle.lock().await;

        // Refusals should not cost a network fetch. The session lock is
        // held across the fetch, so this check cannot go stale.
        if let Err(err) = session.vet_join(player) {
            self.refuse(channel, player, &err).await;
            return Err(err.into());
        }
        let avatar = match self.avatars.fetch_avatar(player).await {
            Ok(avatar) => avatar,
            Err(err) => {
                warn!(channel, player, error = %err, "avatar fetch failed, join aborted");
                self.refuse(
                    channel,
                    player,
                    "Your avatar could not be fetched, you have not joined the game",
                )
                .await;
                return Err(EngineError::Collaborator(err));
            }
        };

        match session.admit(player, avatar) {
            Ok(count) => {
                self.announce(
                    channel,
                    &format!(
                        "**Snakes and Ladders**: {} has joined the game.\nThere are now {} players in the game.",
                        mention(player),
                        count
                    ),
                    None,
                )
                .await;
                info!(channel, player, count, "player joined");
                Ok(())
            }
            Err(err) => {
                self.refuse(channel, player, &err).await;
                Err(err.into())
            }
        }
    }

    /// Leave the channel's game. Mid-game, the last player standing wins
    /// by surrender and the session is destroyed.
    pub async fn leave_game(
        &self,
        channel: ChannelId,
        player: PlayerId,
    ) -> Result<(), EngineError> {
        let Some(handle) = self.registry.get(channel) else {
            return self.refuse_no_game(channel, player).await;
        };
        let mut session = handle.lock().await;

        match session.withdraw(player) {
            Ok(LeaveOutcome::Left {
                remaining,
                round_now_complete,
            }) => {
                self.announce(
                    channel,
                    &format!("{} has left the game.", mention(player)),
                    None,
                )
                .await;
                info!(channel, player, remaining, "player left");
                if round_now_complete {
                    self.advance_round(&mut session).await;
                }
                Ok(())
            }
            Ok(LeaveOutcome::Surrendered { winner }) => {
                self.announce(
                    channel,
                    &format!(
                        "**Snakes and Ladders**: The game has been surrendered! {} wins the game.",
                        mention(winner)
                    ),
                    None,
                )
                .await;
                info!(channel, winner, "game surrendered");
                drop(session);
                self.destroy(channel);
                Ok(())
            }
            Err(err) => {
                self.refuse(channel, player, &err).await;
                Err(err.into())
            }
        }
    }

    /// Cancel the channel's game. Author only.
    pub async fn cancel_game(
        &self,
        channel: ChannelId,
        caller: PlayerId,
    ) -> Result<(), EngineError> {
        let Some(handle) = self.registry.get(channel) else {
            return self.refuse_no_game(channel, caller).await;
        };
        let mut session = handle.lock().await;

        if let Err(err) = session.cancel(caller) {
            self.refuse(channel, caller, &err).await;
            return Err(err.into());
        }
        self.announce(channel, "**Snakes and Ladders**: Game has been canceled.", None)
            .await;
        info!(channel, caller, "game canceled");
        drop(session);
        self.destroy(channel);
        Ok(())
    }

    /// Start the channel's game and begin the first round. Author only,
    /// two players minimum.
    pub async fn start_game(
        &self,
        channel: ChannelId,
        caller: PlayerId,
    ) -> Result<(), EngineError> {
        let Some(handle) = self.registry.get(channel) else {
            return self.refuse_no_game(channel, caller).await;
        };
        let mut session = handle.lock().await;

        if let Err(err) = session.begin(caller) {
            self.refuse(channel, caller, &err).await;
            return Err(err.into());
        }
        let players = session
            .roster()
            .players()
            .iter()
            .map(|p| mention(*p))
            .collect::<Vec<_>>()
            .join(", ");
        self.announce(
            channel,
            &format!(
                "**Snakes and Ladders**: The game is starting!\nPlayers: {}",
                players
            ),
            None,
        )
        .await;
        info!(channel, caller, "game started");
        self.advance_round(&mut session).await;
        Ok(())
    }

    /// Roll the dice for a player in the channel's game.
    pub async fn roll_dice(
        &self,
        channel: ChannelId,
        player: PlayerId,
    ) -> Result<(), EngineError> {
        let Some(handle) = self.registry.get(channel) else {
            return self.refuse_no_game(channel, player).await;
        };
        let mut session = handle.lock().await;

        let die: u8 = rand::thread_rng().gen_range(1..=6);
        let outcome = match session.roll(player, die) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.refuse(channel, player, &err).await;
                return Err(err.into());
            }
        };

        self.announce(
            channel,
            &format!("{} rolled a **{}**!", mention(player), outcome.die),
            None,
        )
        .await;
        if let Some((kind, destination)) = outcome.warp {
            let line = match kind {
                WarpKind::Ladder => format!(
                    "{} climbs a ladder to **{}**",
                    mention(player),
                    destination
                ),
                WarpKind::Snake => format!(
                    "{} slips on a snake and falls back to **{}**",
                    mention(player),
                    destination
                ),
            };
            self.announce(channel, &line, None).await;
        }
        debug!(channel, player, die, tile = outcome.tile, "roll resolved");

        match outcome.progress {
            RoundProgress::Won => {
                self.announce(
                    channel,
                    &format!(
                        "**Snakes and Ladders**: {} has won the game! :tada:",
                        mention(player)
                    ),
                    None,
                )
                .await;
                info!(channel, player, "game won");
                drop(session);
                self.destroy(channel);
            }
            RoundProgress::RoundComplete => self.advance_round(&mut session).await,
            RoundProgress::AwaitingOthers => {}
        }
        Ok(())
    }

    /// Begin the next round: render the board, announce it with current
    /// positions and the roll prompt.
    async fn advance_round(&self, session: &mut GameSession) {
        let channel = session.channel_id;
        let start = session.begin_round();
        debug!(channel, round = start.round, "round started");

        let attachment = match self
            .renderer
            .render_board(&start.markers, session.roster().avatars())
            .await
        {
            Ok(bytes) => Some(Attachment {
                filename: "board.jpg".to_string(),
                bytes,
            }),
            Err(err) => {
                warn!(channel, error = %err, "board render failed, announcing without image");
                None
            }
        };
        self.announce(
            channel,
            "**Snakes and Ladders**: A new round has started! Current board:",
            attachment,
        )
        .await;

        let positions = start
            .positions
            .iter()
            .map(|(player, tile)| format!("{}: Tile {}", mention(*player), tile))
            .collect::<Vec<_>>()
            .join("\n");
        self.announce(
            channel,
            &format!(
                "**Current positions**:\n{}\n\nType **roll** to roll the dice!",
                positions
            ),
            None,
        )
        .await;
    }

    /// Free the channel slot. The session is already `Finished`; avatar
    /// handles drop with it once the last handle clone goes away.
    fn destroy(&self, channel: ChannelId) {
        self.registry.close(channel);
        info!(channel, "session destroyed");
    }

    /// Best-effort outbound notification.
    async fn announce(&self, channel: ChannelId, text: &str, attachment: Option<Attachment>) {
        if let Err(err) = self.announcer.announce(channel, text, attachment).await {
            warn!(channel, error = %err, "announcement failed");
        }
    }

    async fn refuse(&self, channel: ChannelId, player: PlayerId, why: impl std::fmt::Display) {
        self.announce(channel, &format!("{} {}", mention(player), why), None)
            .await;
    }

    async fn refuse_no_game(
        &self,
        channel: ChannelId,
        player: PlayerId,
    ) -> Result<(), EngineError> {
        let err = RegistryError::NoActiveGame;
        self.refuse(channel, player, &err).await;
        Err(err.into())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;
    use pretty_assertions::assert_eq;

    use crate::state::board::BOARD_TILES;
    use crate::state::roster::RosterError;
    use crate::state::session::SessionStatus;

    use super::*;

    struct StubFetcher {
        fail_for: Option<PlayerId>,
    }

    #[async_trait]
    impl AvatarFetcher for StubFetcher {
        async fn fetch_avatar(&self, player: PlayerId) -> anyhow::Result<Avatar> {
            if self.fail_for == Some(player) {
                return Err(anyhow!("avatar service unreachable"));
            }
            Ok(Avatar::new(vec![player as u8]))
        }
    }

    struct StubRenderer;

    #[async_trait]
    impl BoardRenderer for StubRenderer {
        async fn render_board(
            &self,
            markers: &[BoardMarker],
            avatars: &HashMap<PlayerId, Avatar>,
        ) -> anyhow::Result<Vec<u8>> {
            assert_eq!(markers.len(), avatars.len());
            Ok(vec![0xFF, 0xD8])
        }
    }

    #[derive(Default)]
    struct RecordingAnnouncer {
        messages: Mutex<Vec<(ChannelId, String, bool)>>,
    }

    #[async_trait]
    impl Announcer for RecordingAnnouncer {
        async fn announce(
            &self,
            channel: ChannelId,
            text: &str,
            attachment: Option<Attachment>,
        ) -> anyhow::Result<()> {
            self.messages
                .lock()
                .unwrap()
                .push((channel, text.to_string(), attachment.is_some()));
            Ok(())
        }
    }

    impl RecordingAnnouncer {
        fn saw(&self, needle: &str) -> bool {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .any(|(_, text, _)| text.contains(needle))
        }

        fn board_posts(&self) -> usize {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, _, attached)| *attached)
                .count()
        }
    }

    fn engine_with(fail_for: Option<PlayerId>) -> (GameEngine, Arc<RecordingAnnouncer>) {
        let announcer = Arc::new(RecordingAnnouncer::default());
        let engine = GameEngine::new(
            Arc::new(StubFetcher { fail_for }),
            Arc::new(StubRenderer),
            Arc::clone(&announcer) as Arc<dyn Announcer>,
        );
        (engine, announcer)
    }

    #[tokio::test]
    async fn test_open_join_start_roll_flow() {
        let (engine, announcer) = engine_with(None);

        engine.open_game(7, 1).await.unwrap();
        assert!(announcer.saw("A new game is about to start"));

        engine.join_game(7, 2).await.unwrap();
        assert!(announcer.saw("has joined the game"));
        assert!(announcer.saw("There are now 2 players"));

        engine.start_game(7, 1).await.unwrap();
        assert!(announcer.saw("The game is starting"));
        assert!(announcer.saw("Current positions"));
        assert_eq!(announcer.board_posts(), 1);

        let handle = engine.registry().get(7).unwrap();
        {
            let session = handle.lock().await;
            assert_eq!(session.status, SessionStatus::RoundInProgress);
            assert_eq!(session.roster().players(), &[1, 2]);
        }

        engine.roll_dice(7, 1).await.unwrap();
        assert!(announcer.saw("rolled a **"));
        let session = handle.lock().await;
        assert!(session.roster().has_rolled(1));
        let tile = session.roster().tile(1).unwrap();
        assert!((2..=BOARD_TILES).contains(&tile));
    }

    #[tokio::test]
    async fn test_open_on_busy_channel_refused() {
        let (engine, announcer) = engine_with(None);
        engine.open_game(7, 1).await.unwrap();

        let result = engine.open_game(7, 2).await;
        assert!(matches!(
            result,
            Err(EngineError::Registry(RegistryError::AlreadyActive))
        ));
        assert!(announcer.saw("already in progress"));
        assert_eq!(engine.registry().count(), 1);
    }

    #[tokio::test]
    async fn test_command_without_game_refused() {
        let (engine, announcer) = engine_with(None);
        let result = engine.join_game(7, 2).await;
        assert!(matches!(
            result,
            Err(EngineError::Registry(RegistryError::NoActiveGame))
        ));
        assert!(announcer.saw("no active Snakes & Ladders game"));
    }

    #[tokio::test]
    async fn test_failed_avatar_fetch_aborts_join() {
        let (engine, announcer) = engine_with(Some(2));
        engine.open_game(7, 1).await.unwrap();

        let result = engine.join_game(7, 2).await;
        assert!(matches!(result, Err(EngineError::Collaborator(_))));
        assert!(announcer.saw("avatar could not be fetched"));

        let handle = engine.registry().get(7).unwrap();
        let session = handle.lock().await;
        assert_eq!(session.roster().count(), 1);
        assert!(!session.roster().contains(2));
    }

    #[tokio::test]
    async fn test_failed_open_frees_the_channel() {
        let (engine, _) = engine_with(Some(1));
        assert!(engine.open_game(7, 1).await.is_err());
        assert_eq!(engine.registry().count(), 0);

        // Another author can open the same channel afterwards.
        engine.open_game(7, 2).await.unwrap();
        assert_eq!(engine.registry().count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_join_refused() {
        let (engine, announcer) = engine_with(None);
        engine.open_game(7, 1).await.unwrap();
        engine.join_game(7, 2).await.unwrap();

        let result = engine.join_game(7, 2).await;
        assert!(matches!(
            result,
            Err(EngineError::Session(SessionError::Roster(
                RosterError::AlreadyJoined
            )))
        ));
        assert!(announcer.saw("already in the game"));
    }

    #[tokio::test]
    async fn test_roster_capacity_enforced() {
        let (engine, announcer) = engine_with(None);
        engine.open_game(7, 1).await.unwrap();
        for player in 2..=4 {
            engine.join_game(7, player).await.unwrap();
        }

        let result = engine.join_game(7, 5).await;
        assert!(matches!(
            result,
            Err(EngineError::Session(SessionError::Roster(RosterError::Full)))
        ));
        assert!(announcer.saw("The game is full"));
    }

    #[tokio::test]
    async fn test_start_rules() {
        let (engine, announcer) = engine_with(None);
        engine.open_game(7, 1).await.unwrap();

        let result = engine.start_game(7, 1).await;
        assert!(matches!(
            result,
            Err(EngineError::Session(SessionError::InsufficientPlayers))
        ));
        assert!(announcer.saw("minimum of 2 players"));

        engine.join_game(7, 2).await.unwrap();
        let result = engine.start_game(7, 2).await;
        assert!(matches!(
            result,
            Err(EngineError::Session(SessionError::NotAuthor))
        ));

        engine.start_game(7, 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_author_cannot_leave() {
        let (engine, announcer) = engine_with(None);
        engine.open_game(7, 1).await.unwrap();

        let result = engine.leave_game(7, 1).await;
        assert!(matches!(
            result,
            Err(EngineError::Session(SessionError::Roster(
                RosterError::AuthorCannotLeave
            )))
        ));
        assert!(announcer.saw("cannot leave"));
    }

    #[tokio::test]
    async fn test_surrender_frees_the_channel() {
        let (engine, announcer) = engine_with(None);
        engine.open_game(7, 1).await.unwrap();
        engine.join_game(7, 2).await.unwrap();
        engine.start_game(7, 1).await.unwrap();

        engine.leave_game(7, 2).await.unwrap();
        assert!(announcer.saw("has been surrendered"));
        assert_eq!(engine.registry().count(), 0);

        // The slot is free for a fresh game.
        engine.open_game(7, 3).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_is_author_only() {
        let (engine, announcer) = engine_with(None);
        engine.open_game(7, 1).await.unwrap();
        engine.join_game(7, 2).await.unwrap();

        let result = engine.cancel_game(7, 2).await;
        assert!(matches!(
            result,
            Err(EngineError::Session(SessionError::NotAuthor))
        ));
        assert_eq!(engine.registry().count(), 1);

        engine.cancel_game(7, 1).await.unwrap();
        assert!(announcer.saw("Game has been canceled"));
        assert_eq!(engine.registry().count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_rolls_serialize() {
        let (engine, _) = engine_with(None);
        engine.open_game(7, 1).await.unwrap();
        engine.join_game(7, 2).await.unwrap();
        engine.start_game(7, 1).await.unwrap();

        // Same player rolling twice concurrently: the session lock
        // serializes them, so exactly one sees an un-rolled flag.
        let (first, second) = tokio::join!(engine.roll_dice(7, 1), engine.roll_dice(7, 1));
        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(EngineError::Session(SessionError::AlreadyRolled))
        )));
    }

    #[tokio::test]
    async fn test_leave_completing_round_advances_it() {
        let (engine, _) = engine_with(None);
        engine.open_game(7, 1).await.unwrap();
        engine.join_game(7, 2).await.unwrap();
        engine.join_game(7, 3).await.unwrap();
        engine.start_game(7, 1).await.unwrap();

        engine.roll_dice(7, 1).await.unwrap();
        engine.roll_dice(7, 3).await.unwrap();

        // Player 2 was the only pending roller; their departure begins
        // the next round.
        engine.leave_game(7, 2).await.unwrap();

        let handle = engine.registry().get(7).unwrap();
        let session = handle.lock().await;
        assert_eq!(session.round, 2);
        assert!(!session.roster().has_rolled(1));
        assert!(!session.roster().has_rolled(3));
    }
}
