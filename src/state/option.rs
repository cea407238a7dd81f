use super::AppState;
use crate::error::{CoreError, CoreResult};
use crate::guard::{self, Operation};
use crate::types::*;
use chrono::{DateTime, Utc};

impl AppState {
    /// Add a free-text option during the discussion window. Options from
    /// watchlisted authors start hidden until a moderator approves them.
    pub async fn add_option(
        &self,
        room_id: &str,
        user_id: &str,
        text: String,
        now: DateTime<Utc>,
    ) -> CoreResult<PollOption> {
        let requester = self.requester(user_id).await?;
        let room = self.get_room(room_id).await?;
        guard::ensure(Operation::AddOption, &room, &requester, now)?;

        if text.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "option text must not be empty".into(),
            ));
        }

        let option = PollOption {
            id: ulid::Ulid::new().to_string(),
            room_id: room_id.to_string(),
            text: Some(text),
            slot: None,
            number_of_votes: 0,
            number_of_pro_comments: 0,
            number_of_con_comments: 0,
            is_watchlisted: requester.is_watchlisted,
            created_by: Some(user_id.to_string()),
            created_at: now,
        };
        self.options
            .write()
            .await
            .insert(option.id.clone(), option.clone());

        Ok(option)
    }

    /// Retract an option (host or admin). Cascades: comments referencing
    /// it are deleted and ballots drop it from their selection, each
    /// removal going through the ledger's decrement path so no counter is
    /// left stale.
    pub async fn remove_option(
        &self,
        option_id: &str,
        user_id: &str,
    ) -> CoreResult<()> {
        let requester = self.requester(user_id).await?;

        let room_id = self
            .options
            .read()
            .await
            .get(option_id)
            .map(|o| o.room_id.clone())
            .ok_or_else(|| CoreError::UnknownOption(option_id.to_string()))?;
        let room = self.get_room(&room_id).await?;
        if room.host_id != requester.id && !requester.is_admin {
            return Err(CoreError::NotEligible(requester.id));
        }

        // options -> comments -> votes, the global lock order
        let mut options = self.options.write().await;
        if !options.contains_key(option_id) {
            return Err(CoreError::UnknownOption(option_id.to_string()));
        }
        let mut comments = self.comments.write().await;
        let mut votes = self.votes.write().await;

        // Cascade comments: release each live opinion counter, then drop
        let cascaded: Vec<CommentId> = comments
            .values()
            .filter(|c| c.related_option.as_deref() == Some(option_id))
            .map(|c| c.id.clone())
            .collect();
        for comment_id in &cascaded {
            if let Some(comment) = comments.get(comment_id) {
                if comment.counts_as_opinion() {
                    if let Some(kind) = comment.opinion_kind() {
                        Self::bump_opinion_count(&mut options, option_id, kind, -1)?;
                    }
                }
            }
            comments.remove(comment_id);
        }

        // Ballots keep their other options untouched; only the retracted
        // option leaves each selection.
        for vote in votes.values_mut() {
            if vote.options.remove(option_id) {
                Self::bump_vote_count(&mut options, option_id, -1)?;
            }
        }

        options.remove(option_id);
        tracing::info!(
            option_id,
            room_id = %room.id,
            cascaded_comments = cascaded.len(),
            "Option retracted"
        );
        Ok(())
    }

    /// Clear the moderation flag (admin only). The option becomes
    /// votable; its counters start counting from their current state.
    pub async fn approve_option(&self, option_id: &str, user_id: &str) -> CoreResult<PollOption> {
        let requester = self.requester(user_id).await?;
        if !requester.is_admin {
            return Err(CoreError::NotEligible(requester.id));
        }

        let mut options = self.options.write().await;
        let option = options
            .get_mut(option_id)
            .ok_or_else(|| CoreError::UnknownOption(option_id.to_string()))?;
        option.is_watchlisted = false;
        Ok(option.clone())
    }

    /// Options of a room; watchlisted ones only for admins
    pub async fn list_options(&self, room_id: &str, include_watchlisted: bool) -> Vec<PollOption> {
        let mut list: Vec<PollOption> = self
            .options
            .read()
            .await
            .values()
            .filter(|o| o.room_id == room_id && (include_watchlisted || !o.is_watchlisted))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        list
    }
}
