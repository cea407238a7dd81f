//! Ballot handling.
//!
//! A ballot create/edit/delete is one logical transaction: the option
//! counter deltas and the vote write land under the same options write
//! lock, and everything for one (room, user) pair serializes on a
//! dedicated mutex so concurrent edits apply whole, last-committed-wins.
//! Counter updates are diff-based: options present in both the old and
//! new selection are never touched.

use super::AppState;
use crate::error::{CoreError, CoreResult};
use crate::guard::{self, Operation};
use crate::types::*;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

impl AppState {
    /// Create or replace the caller's ballot for a room.
    pub async fn submit_vote(
        &self,
        room_id: &str,
        user_id: &str,
        option_ids: Vec<OptionId>,
        now: DateTime<Utc>,
    ) -> CoreResult<Vote> {
        let requester = self.requester(user_id).await?;
        let room = self.get_room(room_id).await?;

        let lock = self.vote_lock(room_id, user_id).await;
        let _guard = lock.lock().await;

        // Read the prior ballot inside the lock so two in-flight submits
        // from the same user cannot both see "no existing vote".
        let existing = self.find_vote(room_id, user_id).await;
        let op = if existing.is_some() {
            Operation::EditVote
        } else {
            Operation::CastVote
        };
        guard::ensure(op, &room, &requester, now)?;

        let selection: HashSet<OptionId> = option_ids.into_iter().collect();
        if selection.len() < room.min_options_per_vote
            || selection.len() > room.max_options_per_vote
        {
            return Err(CoreError::InvalidSelection {
                got: selection.len(),
                min: room.min_options_per_vote,
                max: room.max_options_per_vote,
            });
        }

        // Validation, counter deltas and the ballot write share one
        // options-lock scope; nothing can remove an option in between.
        let mut options = self.options.write().await;
        for id in &selection {
            match options.get(id) {
                Some(option) if option.room_id == room_id && !option.is_watchlisted => {}
                _ => return Err(CoreError::UnknownOption(id.clone())),
            }
        }

        // Diff against the ballot as stored right now, not the snapshot
        // above: an option retraction may have rewritten it in between,
        // and a diff against the stale set would release counters the
        // cascade already released.
        let old_selection = match &existing {
            Some(vote) => self
                .votes
                .read()
                .await
                .get(&vote.id)
                .map(|v| v.options.clone())
                .unwrap_or_default(),
            None => HashSet::new(),
        };
        for id in old_selection.difference(&selection) {
            if let Err(CoreError::UnknownOption(_)) = Self::bump_vote_count(&mut options, id, -1) {
                tracing::warn!(option_id = %id, "ballot referenced a removed option");
            }
        }
        for id in selection.difference(&old_selection) {
            Self::bump_vote_count(&mut options, id, 1)?;
        }

        let vote = match existing {
            Some(mut vote) => {
                vote.options = selection;
                vote.updated_at = Some(now);
                vote
            }
            None => Vote {
                id: ulid::Ulid::new().to_string(),
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
                options: selection,
                created_at: now,
                updated_at: None,
            },
        };
        self.votes
            .write()
            .await
            .insert(vote.id.clone(), vote.clone());

        Ok(vote)
    }

    /// Replace the option set of an existing ballot. Only its owner may
    /// edit it, and only while the edit window is open.
    pub async fn edit_vote(
        &self,
        vote_id: &str,
        user_id: &str,
        option_ids: Vec<OptionId>,
        now: DateTime<Utc>,
    ) -> CoreResult<Vote> {
        let vote = self
            .votes
            .read()
            .await
            .get(vote_id)
            .cloned()
            .ok_or_else(|| CoreError::UnknownVote(vote_id.to_string()))?;
        if vote.user_id != user_id {
            return Err(CoreError::NotEligible(user_id.to_string()));
        }
        self.submit_vote(&vote.room_id, user_id, option_ids, now)
            .await
    }

    /// Withdraw a ballot entirely, releasing every counter it held.
    /// Follows the same window rules as editing.
    pub async fn delete_vote(
        &self,
        vote_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let requester = self.requester(user_id).await?;
        let vote = self
            .votes
            .read()
            .await
            .get(vote_id)
            .cloned()
            .ok_or_else(|| CoreError::UnknownVote(vote_id.to_string()))?;
        if vote.user_id != user_id {
            return Err(CoreError::NotEligible(user_id.to_string()));
        }
        let room = self.get_room(&vote.room_id).await?;

        let lock = self.vote_lock(&vote.room_id, user_id).await;
        let _guard = lock.lock().await;

        // Re-read: the ballot may have changed while we waited
        let vote = self
            .votes
            .read()
            .await
            .get(vote_id)
            .cloned()
            .ok_or_else(|| CoreError::UnknownVote(vote_id.to_string()))?;

        guard::ensure(Operation::EditVote, &room, &requester, now)?;

        let mut options = self.options.write().await;
        for id in &vote.options {
            // An option can only be missing here if a cascade raced us;
            // the ledger logs the clamp, the delete still goes through.
            if let Err(CoreError::UnknownOption(_)) = Self::bump_vote_count(&mut options, id, -1) {
                tracing::warn!(option_id = %id, vote_id, "ballot referenced a removed option");
            }
        }
        self.votes.write().await.remove(vote_id);

        Ok(())
    }

    /// Re-derive per-option vote counts from the vote store. Test and
    /// telemetry helper; the ledger counters must always agree with this.
    pub async fn derive_vote_counts(&self, room_id: &str) -> HashMap<OptionId, u32> {
        let votes = self.votes.read().await;
        let mut counts: HashMap<OptionId, u32> = HashMap::new();
        for vote in votes.values() {
            if vote.room_id == room_id {
                for option_id in &vote.options {
                    *counts.entry(option_id.clone()).or_insert(0) += 1;
                }
            }
        }
        counts
    }
}
