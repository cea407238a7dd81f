use super::AppState;
use crate::error::{CoreError, CoreResult};
use crate::guard::{self, Operation};
use crate::similarity::{self, SimilarityReport};
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A freshly created comment together with its duplicate-detection
/// verdict. The verdict is advisory; the comment is committed either way.
#[derive(Debug, Clone, Serialize)]
pub struct CommentOutcome {
    pub comment: Comment,
    pub similarity: SimilarityReport,
}

impl AppState {
    /// Post a comment during the discussion window, optionally tagged
    /// pro/con against one of the room's options. The new text is ranked
    /// against the room's existing comments for semantic duplicates; the
    /// check fails open when the embedding provider is unavailable.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_comment(
        &self,
        room_id: &str,
        author_id: &str,
        content: String,
        related_option: Option<OptionId>,
        is_pro: bool,
        is_con: bool,
        now: DateTime<Utc>,
    ) -> CoreResult<CommentOutcome> {
        let requester = self.requester(author_id).await?;
        let room = self.get_room(room_id).await?;
        guard::ensure(Operation::AddComment, &room, &requester, now)?;

        if content.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "comment content must not be empty".into(),
            ));
        }

        // Reject a bad option reference before any embedding I/O is paid
        // for; the write path below re-checks under its own lock.
        if let Some(option_id) = &related_option {
            match self.options.read().await.get(option_id) {
                Some(option) if option.room_id == room_id && !option.is_watchlisted => {}
                _ => return Err(CoreError::UnknownOption(option_id.clone())),
            }
        }

        // Snapshot prior comment texts, then release the lock before any
        // embedding I/O happens.
        let existing: Vec<(CommentId, String)> = self
            .comments
            .read()
            .await
            .values()
            .filter(|c| c.room_id == room_id && !c.is_watchlisted)
            .map(|c| (c.id.clone(), c.content.clone()))
            .collect();
        let report =
            similarity::check_similarity(self.embedder.as_deref(), &content, &existing).await;

        let comment = Comment {
            id: ulid::Ulid::new().to_string(),
            room_id: room_id.to_string(),
            author_id: author_id.to_string(),
            content,
            related_option: related_option.clone(),
            is_pro,
            is_con,
            votes: 0,
            upvoted_by: Default::default(),
            downvoted_by: Default::default(),
            is_watchlisted: requester.is_watchlisted,
            created_at: now,
        };

        // Option validation, the opinion counter and the comment write
        // land under one options-lock scope (options before comments).
        let mut options = self.options.write().await;
        if let Some(option_id) = &related_option {
            match options.get(option_id) {
                Some(option) if option.room_id == room_id && !option.is_watchlisted => {}
                _ => return Err(CoreError::UnknownOption(option_id.clone())),
            }
            if comment.counts_as_opinion() {
                if let Some(kind) = comment.opinion_kind() {
                    Self::bump_opinion_count(&mut options, option_id, kind, 1)?;
                }
            }
        }
        self.comments
            .write()
            .await
            .insert(comment.id.clone(), comment.clone());
        drop(options);

        Ok(CommentOutcome {
            comment,
            similarity: report,
        })
    }

    /// Up/down-vote a comment, or retract a previously cast vote. A user
    /// sits in at most one of the two voter sets at any time; the net
    /// score is always the difference of the two set sizes.
    pub async fn vote_on_comment(
        &self,
        comment_id: &str,
        user_id: &str,
        direction: CommentVoteDirection,
    ) -> CoreResult<Comment> {
        let requester = self.requester(user_id).await?;
        let room_id = self
            .comments
            .read()
            .await
            .get(comment_id)
            .map(|c| c.room_id.clone())
            .ok_or_else(|| CoreError::UnknownComment(comment_id.to_string()))?;
        let room = self.get_room(&room_id).await?;
        if !room.is_member(&requester.id) {
            return Err(CoreError::NotEligible(requester.id));
        }

        let mut comments = self.comments.write().await;
        let comment = comments
            .get_mut(comment_id)
            .ok_or_else(|| CoreError::UnknownComment(comment_id.to_string()))?;

        comment.upvoted_by.remove(user_id);
        comment.downvoted_by.remove(user_id);
        match direction {
            CommentVoteDirection::Up => {
                comment.upvoted_by.insert(user_id.to_string());
            }
            CommentVoteDirection::Down => {
                comment.downvoted_by.insert(user_id.to_string());
            }
            CommentVoteDirection::Retract => {}
        }
        comment.votes = comment.upvoted_by.len() as i32 - comment.downvoted_by.len() as i32;

        Ok(comment.clone())
    }

    /// Delete a comment (author, room host, or admin). A live pro/con
    /// reference is released through the ledger before the row goes.
    pub async fn delete_comment(&self, comment_id: &str, user_id: &str) -> CoreResult<()> {
        let requester = self.requester(user_id).await?;
        let (room_id, author_id) = self
            .comments
            .read()
            .await
            .get(comment_id)
            .map(|c| (c.room_id.clone(), c.author_id.clone()))
            .ok_or_else(|| CoreError::UnknownComment(comment_id.to_string()))?;
        let room = self.get_room(&room_id).await?;
        if requester.id != author_id && requester.id != room.host_id && !requester.is_admin {
            return Err(CoreError::NotEligible(requester.id));
        }

        let mut options = self.options.write().await;
        let mut comments = self.comments.write().await;
        let Some(comment) = comments.remove(comment_id) else {
            return Err(CoreError::UnknownComment(comment_id.to_string()));
        };
        if comment.counts_as_opinion() {
            if let (Some(option_id), Some(kind)) =
                (comment.related_option.as_ref(), comment.opinion_kind())
            {
                Self::bump_opinion_count(&mut options, option_id, kind, -1)?;
            }
        }

        Ok(())
    }

    /// Clear the moderation flag (admin only). A pro/con comment starts
    /// counting toward its option the moment it is approved.
    pub async fn approve_comment(&self, comment_id: &str, user_id: &str) -> CoreResult<Comment> {
        let requester = self.requester(user_id).await?;
        if !requester.is_admin {
            return Err(CoreError::NotEligible(requester.id));
        }

        let mut options = self.options.write().await;
        let mut comments = self.comments.write().await;
        let comment = comments
            .get_mut(comment_id)
            .ok_or_else(|| CoreError::UnknownComment(comment_id.to_string()))?;
        if comment.is_watchlisted {
            comment.is_watchlisted = false;
            if comment.counts_as_opinion() {
                if let (Some(option_id), Some(kind)) =
                    (comment.related_option.clone(), comment.opinion_kind())
                {
                    Self::bump_opinion_count(&mut options, &option_id, kind, 1)?;
                }
            }
        }

        Ok(comment.clone())
    }

    /// Comments of a room; watchlisted ones only for moderators
    pub async fn list_comments(&self, room_id: &str, include_watchlisted: bool) -> Vec<Comment> {
        let mut list: Vec<Comment> = self
            .comments
            .read()
            .await
            .values()
            .filter(|c| c.room_id == room_id && (include_watchlisted || !c.is_watchlisted))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        list
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::embed::{EmbedResult, EmbeddingProvider};
    use crate::identity::{InMemoryIdentityStore, UserRecord};
    use crate::notify::LogNotifier;
    use async_trait::async_trait;
    use std::sync::Arc;

    async fn room_with_option(state: &AppState, eligible: &[&str]) -> (Room, PollOption) {
        let room = state
            .create_room("host", discuss_config(eligible), base_time())
            .await
            .unwrap();
        let option = state
            .add_option(&room.id, "host", "Option".into(), during_discussion())
            .await
            .unwrap();
        (room, option)
    }

    #[tokio::test]
    async fn test_pro_con_counters_track_comments() {
        let state = state_with_users(&[("host", false, false), ("alice", false, false)]).await;
        let (room, option) = room_with_option(&state, &["alice"]).await;

        let pro = state
            .add_comment(
                &room.id,
                "alice",
                "great choice".into(),
                Some(option.id.clone()),
                true,
                false,
                during_discussion(),
            )
            .await
            .unwrap();
        state
            .add_comment(
                &room.id,
                "host",
                "too expensive".into(),
                Some(option.id.clone()),
                false,
                true,
                during_discussion(),
            )
            .await
            .unwrap();

        {
            let options = state.options.read().await;
            assert_eq!(options[&option.id].number_of_pro_comments, 1);
            assert_eq!(options[&option.id].number_of_con_comments, 1);
        }

        state
            .delete_comment(&pro.comment.id, "alice")
            .await
            .unwrap();
        let options = state.options.read().await;
        assert_eq!(options[&option.id].number_of_pro_comments, 0);
        assert_eq!(options[&option.id].number_of_con_comments, 1);
    }

    #[tokio::test]
    async fn test_untagged_comment_touches_no_counter() {
        let state = state_with_users(&[("host", false, false), ("alice", false, false)]).await;
        let (room, option) = room_with_option(&state, &["alice"]).await;

        state
            .add_comment(
                &room.id,
                "alice",
                "when do we decide?".into(),
                None,
                false,
                false,
                during_discussion(),
            )
            .await
            .unwrap();

        let options = state.options.read().await;
        assert_eq!(options[&option.id].number_of_pro_comments, 0);
        assert_eq!(options[&option.id].number_of_con_comments, 0);
    }

    #[tokio::test]
    async fn test_comment_on_foreign_option_rejected() {
        let state = state_with_users(&[("host", false, false), ("alice", false, false)]).await;
        let (room, _) = room_with_option(&state, &["alice"]).await;
        let other_room = state
            .create_room("host", discuss_config(&["alice"]), base_time())
            .await
            .unwrap();
        let foreign = state
            .add_option(&other_room.id, "host", "Elsewhere".into(), during_discussion())
            .await
            .unwrap();

        let err = state
            .add_comment(
                &room.id,
                "alice",
                "nice".into(),
                Some(foreign.id),
                true,
                false,
                during_discussion(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_OPTION");
    }

    #[tokio::test]
    async fn test_comment_voting_keeps_sets_disjoint() {
        let state = state_with_users(&[
            ("host", false, false),
            ("alice", false, false),
            ("bob", false, false),
        ])
        .await;
        let (room, _) = room_with_option(&state, &["alice", "bob"]).await;
        let outcome = state
            .add_comment(
                &room.id,
                "alice",
                "discuss".into(),
                None,
                false,
                false,
                during_discussion(),
            )
            .await
            .unwrap();
        let id = outcome.comment.id;

        let c = state
            .vote_on_comment(&id, "bob", CommentVoteDirection::Up)
            .await
            .unwrap();
        assert_eq!(c.votes, 1);

        // Switching direction moves the user between sets
        let c = state
            .vote_on_comment(&id, "bob", CommentVoteDirection::Down)
            .await
            .unwrap();
        assert_eq!(c.votes, -1);
        assert!(!c.upvoted_by.contains("bob"));
        assert!(c.downvoted_by.contains("bob"));

        // Voting again in the same direction is idempotent
        let c = state
            .vote_on_comment(&id, "bob", CommentVoteDirection::Down)
            .await
            .unwrap();
        assert_eq!(c.votes, -1);

        let c = state
            .vote_on_comment(&id, "bob", CommentVoteDirection::Retract)
            .await
            .unwrap();
        assert_eq!(c.votes, 0);
        assert!(c.downvoted_by.is_empty());
    }

    #[tokio::test]
    async fn test_watchlisted_comment_counts_only_after_approval() {
        let state = state_with_users(&[
            ("host", false, false),
            ("admin", true, false),
            ("spam", false, true),
        ])
        .await;
        let (room, option) = room_with_option(&state, &["spam"]).await;

        let outcome = state
            .add_comment(
                &room.id,
                "spam",
                "pro!".into(),
                Some(option.id.clone()),
                true,
                false,
                during_discussion(),
            )
            .await
            .unwrap();
        assert!(outcome.comment.is_watchlisted);
        assert_eq!(
            state.options.read().await[&option.id].number_of_pro_comments,
            0
        );

        state
            .approve_comment(&outcome.comment.id, "admin")
            .await
            .unwrap();
        assert_eq!(
            state.options.read().await[&option.id].number_of_pro_comments,
            1
        );

        // Approval is idempotent
        state
            .approve_comment(&outcome.comment.id, "admin")
            .await
            .unwrap();
        assert_eq!(
            state.options.read().await[&option.id].number_of_pro_comments,
            1
        );
    }

    /// Counts how often the provider is actually consulted
    struct CallCountingEmbedder {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CallCountingEmbedder {
        async fn embed(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_bad_option_reference_skips_embedding() {
        let identity = Arc::new(InMemoryIdentityStore::new());
        for id in ["host", "alice"] {
            identity
                .insert(UserRecord {
                    id: id.into(),
                    display_name: None,
                    email: None,
                    is_admin: false,
                    is_watchlisted: false,
                })
                .await;
        }
        let embedder = Arc::new(CallCountingEmbedder {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let state = AppState::with_collaborators(
            identity,
            Arc::new(LogNotifier),
            Some(embedder.clone()),
        );
        let room = state
            .create_room("host", discuss_config(&["alice"]), base_time())
            .await
            .unwrap();
        state
            .add_comment(
                &room.id,
                "alice",
                "first".into(),
                None,
                false,
                false,
                during_discussion(),
            )
            .await
            .unwrap();

        let err = state
            .add_comment(
                &room.id,
                "alice",
                "second".into(),
                Some("ghost".into()),
                true,
                false,
                during_discussion(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_OPTION");
        // Only the valid comment reached the provider; the rejected one
        // never paid for a round-trip (the first had no history to rank).
        assert_eq!(embedder.calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        state
            .add_comment(
                &room.id,
                "alice",
                "third".into(),
                None,
                false,
                false,
                during_discussion(),
            )
            .await
            .unwrap();
        assert_eq!(embedder.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    /// Texts mentioning "tuesday" embed identically, everything else is
    /// orthogonal to them.
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("tuesday") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    #[tokio::test]
    async fn test_similarity_warning_is_advisory() {
        let identity = Arc::new(InMemoryIdentityStore::new());
        for id in ["host", "alice"] {
            identity
                .insert(UserRecord {
                    id: id.into(),
                    display_name: None,
                    email: None,
                    is_admin: false,
                    is_watchlisted: false,
                })
                .await;
        }
        let state = AppState::with_collaborators(
            identity,
            Arc::new(LogNotifier),
            Some(Arc::new(KeywordEmbedder)),
        );
        let room = state
            .create_room("host", discuss_config(&["alice"]), base_time())
            .await
            .unwrap();

        let first = state
            .add_comment(
                &room.id,
                "alice",
                "tuesday works for me".into(),
                None,
                false,
                false,
                during_discussion(),
            )
            .await
            .unwrap();
        assert!(!first.similarity.similar);

        // A near-duplicate is flagged but still committed
        let second = state
            .add_comment(
                &room.id,
                "host",
                "tuesday suits me too".into(),
                None,
                false,
                false,
                during_discussion(),
            )
            .await
            .unwrap();
        assert!(second.similarity.similar);
        assert_eq!(
            second.similarity.matched_comment_id.as_deref(),
            Some(first.comment.id.as_str())
        );
        assert_eq!(state.list_comments(&room.id, false).await.len(), 2);
    }
}
