//! Pure lifecycle clock.
//!
//! The current phase is a total function of room configuration and the
//! caller-supplied clock. Nothing here is persisted, so a stored phase can
//! never drift from reality. All boundaries are half-open: a room is in a
//! window for `start <= now < end`.

use crate::types::{Phase, Room, RoomMode};
use chrono::{DateTime, Utc};

/// Compute the room's lifecycle phase at `now`.
pub fn phase(room: &Room, now: DateTime<Utc>) -> Phase {
    if now >= room.voting_end {
        return Phase::Closed;
    }
    if now >= room.voting_start {
        return Phase::Voting;
    }
    match room.mode {
        // PickATime rooms have no discussion window; everything before
        // voting_start is pre-voting.
        RoomMode::PickATime => Phase::PreVoting,
        RoomMode::DiscussAndVote => {
            // Both bounds are validated present for this mode at creation.
            match (room.discussion_start, room.discussion_end) {
                (Some(start), Some(end)) => {
                    if now >= end {
                        Phase::PreVoting
                    } else if now >= start {
                        Phase::Discussion
                    } else {
                        Phase::PreDiscussion
                    }
                }
                _ => Phase::PreVoting,
            }
        }
    }
}

/// Whether an existing vote may still be changed at `now`.
/// Requires the voting window to be open; when `can_edit_vote` is set the
/// room-configured cutoff applies on top.
pub fn edit_window_open(room: &Room, now: DateTime<Utc>) -> bool {
    if phase(room, now) != Phase::Voting {
        return false;
    }
    if !room.can_edit_vote {
        return false;
    }
    match room.edit_vote_until {
        Some(cutoff) => now < cutoff,
        None => true,
    }
}
