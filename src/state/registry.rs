//! Session registry.
//!
//! Maps a channel to at most one live session. This is the global
//! mutual-exclusion boundary: the registry hands out shared session
//! handles whose inner async mutex serializes every operation on that
//! session, including across I/O suspension points.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use super::session::GameSession;
use super::{ChannelId, PlayerId};

/// Shared handle to one session. Lock it for the whole logical
/// operation, awaits included.
pub type SessionHandle = Arc<AsyncMutex<GameSession>>;

/// Registry errors. User-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    AlreadyActive,
    NoActiveGame,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyActive => write!(f, "A game is already in progress in this channel"),
            Self::NoActiveGame => {
                write!(f, "There is no active Snakes & Ladders game in this channel")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// All live sessions, keyed by channel.
///
/// The outer mutex guards only map access and is never held across an
/// await; per-session serialization lives in the handle's async mutex.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ChannelId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session for a free channel.
    pub fn open(
        &self,
        channel: ChannelId,
        author: PlayerId,
    ) -> Result<SessionHandle, RegistryError> {
        let mut sessions = self.sessions.lock().expect("registry lock poisoned");
        match sessions.entry(channel) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyActive),
            Entry::Vacant(slot) => {
                let handle = Arc::new(AsyncMutex::new(GameSession::new(channel, author)));
                slot.insert(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    /// Look up the live session for a channel.
    pub fn get(&self, channel: ChannelId) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .expect("registry lock poisoned")
            .get(&channel)
            .cloned()
    }

    /// Free a channel slot. Idempotent; sessions call this once at their
    /// own destruction. Returns whether a session was registered.
    pub fn close(&self, channel: ChannelId) -> bool {
        self.sessions
            .lock()
            .expect("registry lock poisoned")
            .remove(&channel)
            .is_some()
    }

    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.sessions.lock().expect("registry lock poisoned").len()
    }
}
