//! Phase gate for every time-sensitive operation.
//!
//! Each operation names the window it is valid in; requests outside that
//! window fail with `PhaseViolation` rather than a generic error. Admins
//! may act before a window opens (preview), but a window that has already
//! passed is closed for everyone.

use crate::error::{CoreError, CoreResult};
use crate::identity::UserRecord;
use crate::phase::{self, edit_window_open};
use crate::types::{Phase, Room};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    AddOption,
    AddComment,
    CastVote,
    EditVote,
    ViewResults,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::AddOption => "add-option",
            Operation::AddComment => "add-comment",
            Operation::CastVote => "cast-vote",
            Operation::EditVote => "edit-vote",
            Operation::ViewResults => "view-results",
        }
    }
}

fn violation(op: Operation, required: &'static str, current: Phase) -> CoreError {
    CoreError::PhaseViolation {
        operation: op.name(),
        required,
        current,
    }
}

/// Check that `requester` may perform `op` on `room` at `now`.
pub fn ensure(op: Operation, room: &Room, requester: &UserRecord, now: DateTime<Utc>) -> CoreResult<()> {
    let current = phase::phase(room, now);

    match op {
        Operation::AddOption => {
            if !room.is_member(&requester.id) {
                return Err(CoreError::NotEligible(requester.id.clone()));
            }
            if !room.can_add_option {
                return Err(violation(op, "a room with canAddOption enabled", current));
            }
            match current {
                Phase::Discussion => Ok(()),
                // Admins may seed options before discussion opens
                Phase::PreDiscussion if requester.is_admin => Ok(()),
                _ => Err(violation(op, "the Discussion window", current)),
            }
        }
        Operation::AddComment => {
            if !room.is_member(&requester.id) {
                return Err(CoreError::NotEligible(requester.id.clone()));
            }
            match current {
                Phase::Discussion => Ok(()),
                Phase::PreDiscussion if requester.is_admin => Ok(()),
                _ => Err(violation(op, "the Discussion window", current)),
            }
        }
        Operation::CastVote => {
            if !room.is_member(&requester.id) {
                return Err(CoreError::NotEligible(requester.id.clone()));
            }
            match current {
                Phase::Voting => Ok(()),
                // Voting not yet open: admins may preview-vote
                Phase::PreDiscussion | Phase::Discussion | Phase::PreVoting
                    if requester.is_admin =>
                {
                    Ok(())
                }
                _ => Err(violation(op, "the Voting window", current)),
            }
        }
        Operation::EditVote => {
            if !room.is_member(&requester.id) {
                return Err(CoreError::NotEligible(requester.id.clone()));
            }
            if !room.can_edit_vote {
                return Err(violation(op, "a room with canEditVote enabled", current));
            }
            if edit_window_open(room, now) {
                return Ok(());
            }
            // Edit window never opens after voting_end or the configured
            // cutoff; before voting opens only admins get through.
            match current {
                Phase::PreDiscussion | Phase::Discussion | Phase::PreVoting
                    if requester.is_admin =>
                {
                    Ok(())
                }
                _ => Err(violation(op, "the Voting window before editVoteUntil", current)),
            }
        }
        Operation::ViewResults => match current {
            Phase::Closed => Ok(()),
            _ if requester.is_admin => Ok(()),
            _ => Err(violation(op, "a Closed room", current)),
        },
    }
}
