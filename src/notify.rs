//! Reminder delivery collaborator.
//!
//! Email mechanics live outside this service; the core only fires a
//! one-shot reminder per room when its voting window opens. Delivery is
//! fire-and-forget and never sits on the request path.

use crate::state::AppState;
use crate::types::Phase;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Fire-and-forget; implementations swallow their own failures
    async fn send_reminder(&self, emails: Vec<String>, room_id: &str);
}

/// Default implementation that only records the reminder in the log
pub struct LogNotifier;

#[async_trait]
impl NotificationService for LogNotifier {
    async fn send_reminder(&self, emails: Vec<String>, room_id: &str) {
        tracing::info!(
            room_id,
            recipients = emails.len(),
            "Voting-open reminder (log only)"
        );
    }
}

/// Spawn a background task that sends one reminder per room when its
/// voting window opens.
pub fn spawn_voting_open_watcher(state: Arc<AppState>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(30)).await;

            let now = chrono::Utc::now();
            let due: Vec<_> = {
                let rooms = state.rooms.read().await;
                let reminded = state.reminded_rooms.read().await;
                rooms
                    .values()
                    .filter(|room| {
                        crate::phase::phase(room, now) == Phase::Voting
                            && !reminded.contains(&room.id)
                    })
                    .map(|room| {
                        (
                            room.id.clone(),
                            room.eligible_users.iter().cloned().collect::<Vec<_>>(),
                        )
                    })
                    .collect()
            };

            for (room_id, user_ids) in due {
                state.reminded_rooms.write().await.insert(room_id.clone());

                let emails: Vec<String> = state
                    .identity
                    .list_users(&user_ids)
                    .await
                    .into_iter()
                    .filter_map(|user| user.email)
                    .collect();
                if emails.is_empty() {
                    continue;
                }

                // Delivery failures are the notifier's problem, not ours
                let notifier = state.notifier.clone();
                tokio::spawn(async move {
                    notifier.send_reminder(emails, &room_id).await;
                });
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct RecordingNotifier {
        sent: Mutex<Vec<(usize, String)>>,
    }

    #[async_trait]
    impl NotificationService for RecordingNotifier {
        async fn send_reminder(&self, emails: Vec<String>, room_id: &str) {
            self.sent
                .lock()
                .await
                .push((emails.len(), room_id.to_string()));
        }
    }

    #[tokio::test]
    async fn test_recording_notifier_contract() {
        let notifier = RecordingNotifier {
            sent: Mutex::new(Vec::new()),
        };
        notifier
            .send_reminder(vec!["a@example.org".into()], "room-1")
            .await;

        let sent = notifier.sent.lock().await;
        assert_eq!(sent.as_slice(), &[(1, "room-1".to_string())]);
    }
}
