use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Opaque ID types for type safety
pub type RoomId = String;
pub type OptionId = String;
pub type VoteId = String;
pub type CommentId = String;
pub type UserId = String;

/// Room lifecycle stage, derived from wall-clock time, never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    PreDiscussion,
    Discussion,
    PreVoting,
    Voting,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomMode {
    DiscussAndVote,
    PickATime,
}

/// Room boundary and policy configuration, supplied at creation and
/// editable by the host until voting starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub mode: RoomMode,
    /// Discussion window, DiscussAndVote only
    #[serde(default)]
    pub discussion_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub discussion_end: Option<DateTime<Utc>>,
    pub voting_start: DateTime<Utc>,
    pub voting_end: DateTime<Utc>,
    #[serde(default)]
    pub edit_vote_until: Option<DateTime<Utc>>,
    pub can_add_option: bool,
    pub can_edit_vote: bool,
    pub min_options_per_vote: usize,
    pub max_options_per_vote: usize,
    #[serde(default)]
    pub eligible_users: Vec<UserId>,
    /// Candidate time slots, PickATime only; options are generated from these
    #[serde(default)]
    pub slots: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    /// Bumped on every config change; host updates are conditional on it
    pub version: u64,
    pub host_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub mode: RoomMode,
    pub discussion_start: Option<DateTime<Utc>>,
    pub discussion_end: Option<DateTime<Utc>>,
    pub voting_start: DateTime<Utc>,
    pub voting_end: DateTime<Utc>,
    pub edit_vote_until: Option<DateTime<Utc>>,
    pub can_add_option: bool,
    pub can_edit_vote: bool,
    pub min_options_per_vote: usize,
    pub max_options_per_vote: usize,
    pub eligible_users: HashSet<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Host counts as eligible for member-gated operations
    pub fn is_member(&self, user_id: &str) -> bool {
        self.host_id == user_id || self.eligible_users.contains(user_id)
    }
}

/// A votable candidate: a free-text choice (DiscussAndVote) or a time
/// slot (PickATime). The three counters are maintained exclusively by
/// the ledger and always reflect live, non-watchlisted references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOption {
    pub id: OptionId,
    pub room_id: RoomId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<DateTime<Utc>>,
    pub number_of_votes: u32,
    pub number_of_pro_comments: u32,
    pub number_of_con_comments: u32,
    /// Pending moderation; hidden from ballots until approved
    pub is_watchlisted: bool,
    /// None for system-generated PickATime slots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// One user's current option selection for a room.
/// At most one live Vote exists per (room, user) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub options: HashSet<OptionId>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub room_id: RoomId,
    pub author_id: UserId,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_option: Option<OptionId>,
    pub is_pro: bool,
    pub is_con: bool,
    /// Net of upvotes minus downvotes, may be negative
    pub votes: i32,
    pub upvoted_by: HashSet<UserId>,
    pub downvoted_by: HashSet<UserId>,
    pub is_watchlisted: bool,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Whether this comment contributes to its option's pro/con counters
    pub fn counts_as_opinion(&self) -> bool {
        !self.is_watchlisted && self.related_option.is_some() && (self.is_pro || self.is_con)
    }

    pub fn opinion_kind(&self) -> Option<OpinionKind> {
        if self.is_pro {
            Some(OpinionKind::Pro)
        } else if self.is_con {
            Some(OpinionKind::Con)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OpinionKind {
    Pro,
    Con,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommentVoteDirection {
    Up,
    Down,
    /// Withdraw a previously cast up/down vote
    Retract,
}
