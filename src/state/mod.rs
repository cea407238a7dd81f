mod comment;
mod ledger;
mod option;
mod room;
mod vote;

pub use comment::CommentOutcome;
pub use room::{OptionTally, ResultsPayload, RoomUpdate};

use crate::embed::EmbeddingProvider;
use crate::error::{CoreError, CoreResult};
use crate::identity::{IdentityStore, InMemoryIdentityStore, UserRecord};
use crate::notify::{LogNotifier, NotificationService};
use crate::types::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Shared application state.
///
/// Lock ordering, for call paths that hold more than one store at a time:
/// rooms, then options, then comments, then votes. Ballot mutations for one
/// (room, user) pair additionally serialize on a dedicated mutex so that
/// concurrent edits apply whole, last-committed-wins.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<RoomId, Room>>>,
    pub options: Arc<RwLock<HashMap<OptionId, PollOption>>>,
    pub comments: Arc<RwLock<HashMap<CommentId, Comment>>>,
    pub votes: Arc<RwLock<HashMap<VoteId, Vote>>>,
    pub identity: Arc<dyn IdentityStore>,
    pub notifier: Arc<dyn NotificationService>,
    pub embedder: Option<Arc<dyn EmbeddingProvider>>,
    /// Rooms whose voting-open reminder has already gone out
    pub reminded_rooms: Arc<RwLock<HashSet<RoomId>>>,
    vote_locks: Arc<RwLock<HashMap<(RoomId, UserId), Arc<Mutex<()>>>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_collaborators(
            Arc::new(InMemoryIdentityStore::new()),
            Arc::new(LogNotifier),
            None,
        )
    }

    pub fn with_collaborators(
        identity: Arc<dyn IdentityStore>,
        notifier: Arc<dyn NotificationService>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            options: Arc::new(RwLock::new(HashMap::new())),
            comments: Arc::new(RwLock::new(HashMap::new())),
            votes: Arc::new(RwLock::new(HashMap::new())),
            identity,
            notifier,
            embedder,
            reminded_rooms: Arc::new(RwLock::new(HashSet::new())),
            vote_locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Resolve a caller id through the identity store
    pub async fn requester(&self, user_id: &str) -> CoreResult<UserRecord> {
        self.identity
            .get_user(user_id)
            .await
            .ok_or_else(|| CoreError::UnknownUser(user_id.to_string()))
    }

    pub async fn get_room(&self, room_id: &str) -> CoreResult<Room> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or_else(|| CoreError::UnknownRoom(room_id.to_string()))
    }

    /// Per-(room, user) mutex guarding ballot read-diff-write sequences
    pub(crate) async fn vote_lock(&self, room_id: &str, user_id: &str) -> Arc<Mutex<()>> {
        let key = (room_id.to_string(), user_id.to_string());
        let mut locks = self.vote_locks.write().await;
        locks.entry(key).or_default().clone()
    }

    /// Find a user's live vote in a room, if any
    pub async fn find_vote(&self, room_id: &str, user_id: &str) -> Option<Vote> {
        self.votes
            .read()
            .await
            .values()
            .find(|v| v.room_id == room_id && v.user_id == user_id)
            .cloned()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
