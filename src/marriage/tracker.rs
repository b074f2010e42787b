use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::model::{GroupMember, is_real_user_id};
use super::state::GuildState;
use crate::config::MarriageConfig;
use crate::db::KeyValueStore;

const DAY_SECS: u64 = 24 * 60 * 60;

/// Remembers who has been seen talking in each guild.
pub struct MembershipTracker {
    store: Arc<dyn KeyValueStore>,
    retention: Duration,
    active_window: Duration,
}

impl MembershipTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &MarriageConfig) -> Self {
        Self {
            store,
            retention: Duration::from_secs(config.member_retention_days.saturating_mul(DAY_SECS)),
            active_window: Duration::from_secs(config.active_days.saturating_mul(DAY_SECS)),
        }
    }

    /// Refreshes the member snapshot and activity mark. Failures are logged
    /// and otherwise ignored.
    pub async fn on_message(&self, guild_id: &str, user_id: &str, snapshot: &GroupMember) {
        if !is_real_user_id(user_id) {
            return;
        }

        let state = GuildState::new(self.store.as_ref(), guild_id);
        let snapshot = GroupMember {
            user_id: user_id.to_string(),
            ..snapshot.clone()
        };
        if let Err(err) = state.remember_member(&snapshot, self.retention).await {
            warn!("failed to track member guild={} user={}: {err}", guild_id, user_id);
        }
        if let Err(err) = state.mark_active(user_id, self.active_window).await {
            warn!("failed to mark activity guild={} user={}: {err}", guild_id, user_id);
        }
    }

    /// Forgets a member who left the guild.
    pub async fn on_member_removed(&self, guild_id: &str, user_id: &str) {
        if !is_real_user_id(user_id) {
            return;
        }
        debug!("forgetting member guild={} user={}", guild_id, user_id);
        if let Err(err) = GuildState::new(self.store.as_ref(), guild_id)
            .forget_member(user_id)
            .await
        {
            warn!("failed to forget member guild={} user={}: {err}", guild_id, user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::MembershipTracker;
    use crate::config::MarriageConfig;
    use crate::db::{KeyValueStore, MemoryStore};
    use crate::marriage::model::GroupMember;
    use crate::marriage::state::GuildState;
    use crate::marriage::test_support::named;

    fn tracker(store: Arc<dyn KeyValueStore>) -> MembershipTracker {
        let config = MarriageConfig {
            active_days: 1,
            member_retention_days: 3,
            ..MarriageConfig::default()
        };
        MembershipTracker::new(store, &config)
    }

    #[tokio::test(start_paused = true)]
    async fn message_records_snapshot_and_activity_with_their_own_ttls() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let tracker = tracker(store.clone());
        tracker.on_message("g", "7", &named("7", "seven")).await;

        let state = GuildState::new(store.as_ref(), "g");
        assert!(state.is_active("7").await.unwrap());
        assert_eq!(
            state.tracked_member("7").await.unwrap().unwrap().display_name(),
            "seven"
        );

        tokio::time::advance(Duration::from_secs(2 * 86_400)).await;
        assert!(!state.is_active("7").await.unwrap());
        assert!(state.tracked_member("7").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2 * 86_400)).await;
        assert!(state.tracked_member("7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sentinel_ids_are_ignored() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let tracker = tracker(store.clone());
        tracker.on_message("g", "0", &GroupMember::new("0")).await;
        tracker.on_message("g", "", &GroupMember::new("")).await;

        let state = GuildState::new(store.as_ref(), "g");
        assert!(state.tracked_members().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn removal_forgets_the_member() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let tracker = tracker(store.clone());
        tracker.on_message("g", "7", &named("7", "seven")).await;
        tracker.on_member_removed("g", "7").await;

        let state = GuildState::new(store.as_ref(), "g");
        assert!(state.tracked_member("7").await.unwrap().is_none());
        assert!(!state.is_active("7").await.unwrap());
    }

    #[tokio::test]
    async fn store_failures_are_swallowed() {
        let store = crate::marriage::test_support::FailingStore::shared();
        let tracker = tracker(store);
        tracker.on_message("g", "7", &named("7", "seven")).await;
        tracker.on_member_removed("g", "7").await;
    }
}
