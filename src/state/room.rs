use super::AppState;
use crate::error::{CoreError, CoreResult};
use crate::guard::{self, Operation};
use crate::phase;
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Host-issued config update, conditional on the room version the host
/// last saw. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomUpdate {
    pub expected_version: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub discussion_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub discussion_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub voting_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub voting_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub edit_vote_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub can_add_option: Option<bool>,
    #[serde(default)]
    pub can_edit_vote: Option<bool>,
    #[serde(default)]
    pub min_options_per_vote: Option<usize>,
    #[serde(default)]
    pub max_options_per_vote: Option<usize>,
    #[serde(default)]
    pub eligible_users: Option<Vec<UserId>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionTally {
    pub option_id: OptionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<DateTime<Utc>>,
    pub votes: u32,
    pub pro_comments: u32,
    pub con_comments: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultsPayload {
    pub room_id: RoomId,
    pub title: String,
    pub mode: RoomMode,
    pub phase: Phase,
    pub total_ballots: usize,
    /// Sorted by vote count, highest first
    pub options: Vec<OptionTally>,
    /// Option(s) holding the top non-zero vote count
    pub winners: Vec<OptionId>,
}

/// Validate the boundary invariants of a room configuration
fn validate_config(cfg: &RoomConfig) -> CoreResult<()> {
    if cfg.title.trim().is_empty() {
        return Err(CoreError::InvalidConfig("title must not be empty".into()));
    }
    if cfg.min_options_per_vote == 0 {
        return Err(CoreError::InvalidConfig(
            "minOptionsPerVote must be at least 1".into(),
        ));
    }
    if cfg.min_options_per_vote > cfg.max_options_per_vote {
        return Err(CoreError::InvalidConfig(format!(
            "minOptionsPerVote ({}) exceeds maxOptionsPerVote ({})",
            cfg.min_options_per_vote, cfg.max_options_per_vote
        )));
    }
    if cfg.voting_start >= cfg.voting_end {
        return Err(CoreError::InvalidConfig(
            "votingStart must precede votingEnd".into(),
        ));
    }

    match cfg.mode {
        RoomMode::DiscussAndVote => {
            let (start, end) = match (cfg.discussion_start, cfg.discussion_end) {
                (Some(s), Some(e)) => (s, e),
                _ => {
                    return Err(CoreError::InvalidConfig(
                        "DiscussAndVote rooms need a discussion window".into(),
                    ))
                }
            };
            if start >= end {
                return Err(CoreError::InvalidConfig(
                    "discussionStart must precede discussionEnd".into(),
                ));
            }
            if end > cfg.voting_start {
                return Err(CoreError::InvalidConfig(
                    "discussionEnd must not exceed votingStart".into(),
                ));
            }
        }
        RoomMode::PickATime => {
            if cfg.discussion_start.is_some() || cfg.discussion_end.is_some() {
                return Err(CoreError::InvalidConfig(
                    "PickATime rooms have no discussion window".into(),
                ));
            }
            if cfg.slots.is_empty() {
                return Err(CoreError::InvalidConfig(
                    "PickATime rooms need at least one slot".into(),
                ));
            }
        }
    }

    if cfg.can_edit_vote {
        let cutoff = cfg.edit_vote_until.ok_or_else(|| {
            CoreError::InvalidConfig("canEditVote requires editVoteUntil".into())
        })?;
        if cutoff <= cfg.voting_start || cutoff > cfg.voting_end {
            return Err(CoreError::InvalidConfig(
                "editVoteUntil must lie in (votingStart, votingEnd]".into(),
            ));
        }
    }

    Ok(())
}

impl AppState {
    /// Create a room from a validated config. PickATime rooms get one
    /// system-generated option per slot and never accept user options.
    pub async fn create_room(
        &self,
        host_id: &str,
        cfg: RoomConfig,
        now: DateTime<Utc>,
    ) -> CoreResult<Room> {
        self.requester(host_id).await?;
        validate_config(&cfg)?;

        let is_pick_a_time = cfg.mode == RoomMode::PickATime;
        let room = Room {
            id: ulid::Ulid::new().to_string(),
            version: 1,
            host_id: host_id.to_string(),
            title: cfg.title,
            description: cfg.description,
            mode: cfg.mode,
            discussion_start: cfg.discussion_start,
            discussion_end: cfg.discussion_end,
            voting_start: cfg.voting_start,
            voting_end: cfg.voting_end,
            edit_vote_until: cfg.edit_vote_until,
            can_add_option: cfg.can_add_option && !is_pick_a_time,
            can_edit_vote: cfg.can_edit_vote,
            min_options_per_vote: cfg.min_options_per_vote,
            max_options_per_vote: cfg.max_options_per_vote,
            eligible_users: cfg.eligible_users.into_iter().collect(),
            created_at: now,
        };

        let mut rooms = self.rooms.write().await;
        let mut options = self.options.write().await;
        rooms.insert(room.id.clone(), room.clone());
        for slot in cfg.slots {
            let option = PollOption {
                id: ulid::Ulid::new().to_string(),
                room_id: room.id.clone(),
                text: None,
                slot: Some(slot),
                number_of_votes: 0,
                number_of_pro_comments: 0,
                number_of_con_comments: 0,
                is_watchlisted: false,
                created_by: None,
                created_at: now,
            };
            options.insert(option.id.clone(), option);
        }

        tracing::info!(room_id = %room.id, mode = ?room.mode, "Room created");
        Ok(room)
    }

    /// Apply a host config update. Conditional on the version the caller
    /// last saw; accepted only while voting has not started.
    pub async fn update_room(
        &self,
        room_id: &str,
        user_id: &str,
        update: RoomUpdate,
        now: DateTime<Utc>,
    ) -> CoreResult<Room> {
        let requester = self.requester(user_id).await?;

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| CoreError::UnknownRoom(room_id.to_string()))?;

        if room.host_id != requester.id && !requester.is_admin {
            return Err(CoreError::NotEligible(requester.id));
        }
        let current = phase::phase(room, now);
        if now >= room.voting_start {
            return Err(CoreError::PhaseViolation {
                operation: "update-room",
                required: "a room whose voting has not started",
                current,
            });
        }
        if room.version != update.expected_version {
            return Err(CoreError::ConcurrentModification {
                expected: update.expected_version,
                found: room.version,
            });
        }

        // Build the candidate and re-validate the full boundary invariant
        // before anything is committed.
        let mut candidate = room.clone();
        if let Some(title) = update.title {
            candidate.title = title;
        }
        if let Some(description) = update.description {
            candidate.description = Some(description);
        }
        if let Some(v) = update.discussion_start {
            candidate.discussion_start = Some(v);
        }
        if let Some(v) = update.discussion_end {
            candidate.discussion_end = Some(v);
        }
        if let Some(v) = update.voting_start {
            candidate.voting_start = v;
        }
        if let Some(v) = update.voting_end {
            candidate.voting_end = v;
        }
        if let Some(v) = update.edit_vote_until {
            candidate.edit_vote_until = Some(v);
        }
        if let Some(v) = update.can_add_option {
            candidate.can_add_option = v;
        }
        if let Some(v) = update.can_edit_vote {
            candidate.can_edit_vote = v;
        }
        if let Some(v) = update.min_options_per_vote {
            candidate.min_options_per_vote = v;
        }
        if let Some(v) = update.max_options_per_vote {
            candidate.max_options_per_vote = v;
        }
        if let Some(v) = update.eligible_users {
            candidate.eligible_users = v.into_iter().collect();
        }

        validate_config(&RoomConfig {
            title: candidate.title.clone(),
            description: candidate.description.clone(),
            mode: candidate.mode,
            discussion_start: candidate.discussion_start,
            discussion_end: candidate.discussion_end,
            voting_start: candidate.voting_start,
            voting_end: candidate.voting_end,
            edit_vote_until: candidate.edit_vote_until,
            can_add_option: candidate.can_add_option,
            can_edit_vote: candidate.can_edit_vote,
            min_options_per_vote: candidate.min_options_per_vote,
            max_options_per_vote: candidate.max_options_per_vote,
            eligible_users: Vec::new(),
            // Slots only matter at creation; satisfy the mode check
            slots: match candidate.mode {
                RoomMode::PickATime => vec![candidate.voting_start],
                RoomMode::DiscussAndVote => Vec::new(),
            },
        })?;

        candidate.version = room.version + 1;
        *room = candidate.clone();
        Ok(candidate)
    }

    /// Aggregated results, readable once the room is Closed (admins may
    /// preview earlier). Watchlisted options are excluded.
    pub async fn get_results(
        &self,
        room_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<ResultsPayload> {
        let requester = self.requester(user_id).await?;
        let room = self.get_room(room_id).await?;
        guard::ensure(Operation::ViewResults, &room, &requester, now)?;

        let mut tallies: Vec<OptionTally> = self
            .options
            .read()
            .await
            .values()
            .filter(|o| o.room_id == room_id && !o.is_watchlisted)
            .map(|o| OptionTally {
                option_id: o.id.clone(),
                text: o.text.clone(),
                slot: o.slot,
                votes: o.number_of_votes,
                pro_comments: o.number_of_pro_comments,
                con_comments: o.number_of_con_comments,
            })
            .collect();
        tallies.sort_by(|a, b| b.votes.cmp(&a.votes).then(a.option_id.cmp(&b.option_id)));

        let total_ballots = self
            .votes
            .read()
            .await
            .values()
            .filter(|v| v.room_id == room_id)
            .count();

        let top = tallies.first().map(|t| t.votes).unwrap_or(0);
        let winners = if top > 0 {
            tallies
                .iter()
                .filter(|t| t.votes == top)
                .map(|t| t.option_id.clone())
                .collect()
        } else {
            Vec::new()
        };

        Ok(ResultsPayload {
            phase: phase::phase(&room, now),
            room_id: room.id,
            title: room.title,
            mode: room.mode,
            total_ballots,
            options: tallies,
            winners,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_create_room_validates_boundaries() {
        let state = state_with_users(&[("host", false, false)]).await;

        let mut cfg = discuss_config(&["host"]);
        cfg.discussion_end = Some(cfg.voting_start + Duration::minutes(1));
        let err = state
            .create_room("host", cfg, base_time())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");

        let mut cfg = discuss_config(&["host"]);
        cfg.min_options_per_vote = 3;
        cfg.max_options_per_vote = 2;
        let err = state
            .create_room("host", cfg, base_time())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");

        let cfg = discuss_config(&["host"]);
        assert!(state.create_room("host", cfg, base_time()).await.is_ok());
    }

    #[tokio::test]
    async fn test_edit_vote_cutoff_is_validated() {
        let state = state_with_users(&[("host", false, false)]).await;

        let mut cfg = discuss_config(&["host"]);
        cfg.edit_vote_until = Some(cfg.voting_start);
        let err = state
            .create_room("host", cfg, base_time())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");

        let mut cfg = discuss_config(&["host"]);
        cfg.edit_vote_until = None;
        let err = state
            .create_room("host", cfg, base_time())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");
    }

    #[tokio::test]
    async fn test_pick_a_time_generates_slot_options() {
        let state = state_with_users(&[("host", false, false)]).await;
        let t = base_time();

        let cfg = RoomConfig {
            title: "Sprint review".into(),
            description: None,
            mode: RoomMode::PickATime,
            discussion_start: None,
            discussion_end: None,
            voting_start: t + Duration::hours(1),
            voting_end: t + Duration::hours(2),
            edit_vote_until: None,
            can_add_option: true, // forced off for this mode
            can_edit_vote: false,
            min_options_per_vote: 1,
            max_options_per_vote: 3,
            eligible_users: vec!["host".into()],
            slots: vec![
                t + Duration::days(1),
                t + Duration::days(2),
                t + Duration::days(3),
            ],
        };
        let room = state.create_room("host", cfg, t).await.unwrap();

        assert!(!room.can_add_option);
        let options = state.options.read().await;
        let slots: Vec<_> = options
            .values()
            .filter(|o| o.room_id == room.id)
            .collect();
        assert_eq!(slots.len(), 3);
        assert!(slots.iter().all(|o| o.slot.is_some() && o.created_by.is_none()));
    }

    #[tokio::test]
    async fn test_update_room_is_versioned() {
        let state = state_with_users(&[("host", false, false)]).await;
        let room = state
            .create_room("host", discuss_config(&["host"]), base_time())
            .await
            .unwrap();

        let update = RoomUpdate {
            expected_version: room.version,
            title: Some("New title".into()),
            ..Default::default()
        };
        let updated = state
            .update_room(&room.id, "host", update, base_time())
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.title, "New title");

        // A second writer still holding version 1 loses
        let stale = RoomUpdate {
            expected_version: room.version,
            title: Some("Stale title".into()),
            ..Default::default()
        };
        let err = state
            .update_room(&room.id, "host", stale, base_time())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONCURRENT_MODIFICATION");
    }

    #[tokio::test]
    async fn test_update_room_rejected_once_voting_started() {
        let state = state_with_users(&[("host", false, false)]).await;
        let room = state
            .create_room("host", discuss_config(&["host"]), base_time())
            .await
            .unwrap();

        let update = RoomUpdate {
            expected_version: room.version,
            title: Some("Too late".into()),
            ..Default::default()
        };
        let err = state
            .update_room(&room.id, "host", update, during_voting())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PHASE_VIOLATION");
    }

    #[tokio::test]
    async fn test_update_room_requires_host() {
        let state = state_with_users(&[("host", false, false), ("bob", false, false)]).await;
        let room = state
            .create_room("host", discuss_config(&["host", "bob"]), base_time())
            .await
            .unwrap();

        let update = RoomUpdate {
            expected_version: room.version,
            title: Some("Hijacked".into()),
            ..Default::default()
        };
        let err = state
            .update_room(&room.id, "bob", update, base_time())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_ELIGIBLE");
    }

    #[tokio::test]
    async fn test_results_only_after_close() {
        let state = state_with_users(&[("host", false, false), ("admin", true, false)]).await;
        let room = state
            .create_room("host", discuss_config(&["host"]), base_time())
            .await
            .unwrap();

        let err = state
            .get_results(&room.id, "host", during_voting())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PHASE_VIOLATION");

        // Admin preview works mid-vote, everyone after close
        assert!(state
            .get_results(&room.id, "admin", during_voting())
            .await
            .is_ok());
        let results = state
            .get_results(&room.id, "host", after_close())
            .await
            .unwrap();
        assert_eq!(results.total_ballots, 0);
        assert!(results.winners.is_empty());
    }
}
