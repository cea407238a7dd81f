//! Option counter ledger.
//!
//! The three per-option counters (votes, pro comments, con comments) are
//! only ever mutated through this module, so they stay equal to the true
//! count of live references by construction. Every mutation happens under
//! the options write lock; callers that need several deltas to land
//! together use the `bump_*` helpers inside one lock scope.
//!
//! Counters never go observably negative: a decrement against zero is
//! clamped and logged as a detected inconsistency.

use super::AppState;
use crate::error::{CoreError, CoreResult};
use crate::types::*;
use std::collections::HashMap;

impl AppState {
    pub async fn increment_vote_count(&self, option_id: &str) -> CoreResult<()> {
        let mut options = self.options.write().await;
        Self::bump_vote_count(&mut options, option_id, 1)
    }

    pub async fn decrement_vote_count(&self, option_id: &str) -> CoreResult<()> {
        let mut options = self.options.write().await;
        Self::bump_vote_count(&mut options, option_id, -1)
    }

    pub async fn increment_opinion_count(
        &self,
        option_id: &str,
        kind: OpinionKind,
    ) -> CoreResult<()> {
        let mut options = self.options.write().await;
        Self::bump_opinion_count(&mut options, option_id, kind, 1)
    }

    pub async fn decrement_opinion_count(
        &self,
        option_id: &str,
        kind: OpinionKind,
    ) -> CoreResult<()> {
        let mut options = self.options.write().await;
        Self::bump_opinion_count(&mut options, option_id, kind, -1)
    }

    /// Apply a vote-counter delta inside an already-held write lock
    pub(crate) fn bump_vote_count(
        options: &mut HashMap<OptionId, PollOption>,
        option_id: &str,
        delta: i64,
    ) -> CoreResult<()> {
        let option = options
            .get_mut(option_id)
            .ok_or_else(|| CoreError::UnknownOption(option_id.to_string()))?;
        option.number_of_votes = apply_delta(option.number_of_votes, delta, option_id, "votes");
        Ok(())
    }

    /// Apply a pro/con-counter delta inside an already-held write lock
    pub(crate) fn bump_opinion_count(
        options: &mut HashMap<OptionId, PollOption>,
        option_id: &str,
        kind: OpinionKind,
        delta: i64,
    ) -> CoreResult<()> {
        let option = options
            .get_mut(option_id)
            .ok_or_else(|| CoreError::UnknownOption(option_id.to_string()))?;
        let (counter, label) = match kind {
            OpinionKind::Pro => (&mut option.number_of_pro_comments, "pro_comments"),
            OpinionKind::Con => (&mut option.number_of_con_comments, "con_comments"),
        };
        *counter = apply_delta(*counter, delta, option_id, label);
        Ok(())
    }
}

fn apply_delta(current: u32, delta: i64, option_id: &str, counter: &str) -> u32 {
    let next = current as i64 + delta;
    if next < 0 {
        tracing::warn!(
            code = "COUNTER_INCONSISTENCY",
            option_id,
            counter,
            current,
            delta,
            "counter decrement clamped at zero"
        );
        return 0;
    }
    next as u32
}
