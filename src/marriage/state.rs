use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, warn};

use super::model::GroupMember;
use crate::db::{DatabaseError, KeyValueStore};

const MEMBERS_TABLE: &str = "waifu_members";
const ACTIVE_TABLE: &str = "waifu_active";
const MARRIAGE_TABLE: &str = "waifu_marriages";
const CHANGE_COUNT_TABLE: &str = "waifu_change_count";

fn table(prefix: &str, guild_id: &str) -> String {
    format!("{prefix}:{guild_id}")
}

/// Typed view of one guild's tables in the expiring store.
#[derive(Clone, Copy)]
pub(crate) struct GuildState<'a> {
    store: &'a dyn KeyValueStore,
    guild_id: &'a str,
}

impl<'a> GuildState<'a> {
    pub(crate) fn new(store: &'a dyn KeyValueStore, guild_id: &'a str) -> Self {
        Self { store, guild_id }
    }

    pub(crate) async fn remember_member(
        &self,
        member: &GroupMember,
        ttl: Duration,
    ) -> Result<(), DatabaseError> {
        let snapshot = serde_json::to_string(member)?;
        self.store
            .set(
                &table(MEMBERS_TABLE, self.guild_id),
                &member.user_id,
                &snapshot,
                ttl,
            )
            .await
    }

    pub(crate) async fn tracked_member(
        &self,
        user_id: &str,
    ) -> Result<Option<GroupMember>, DatabaseError> {
        let Some(raw) = self
            .store
            .get(&table(MEMBERS_TABLE, self.guild_id), user_id)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Every tracked member of the guild. Snapshots that no longer decode are
    /// skipped.
    pub(crate) async fn tracked_members(&self) -> Result<Vec<GroupMember>, DatabaseError> {
        let mut entries = self
            .store
            .entries(&table(MEMBERS_TABLE, self.guild_id))
            .await?;
        let mut members = Vec::new();
        while let Some(entry) = entries.next().await {
            match serde_json::from_str::<GroupMember>(&entry.value) {
                Ok(member) => members.push(member),
                Err(err) => warn!(
                    "skipping undecodable member snapshot guild={} user={}: {err}",
                    self.guild_id, entry.key
                ),
            }
        }
        Ok(members)
    }

    pub(crate) async fn forget_member(&self, user_id: &str) -> Result<(), DatabaseError> {
        self.store
            .delete(&table(MEMBERS_TABLE, self.guild_id), user_id)
            .await?;
        self.store
            .delete(&table(ACTIVE_TABLE, self.guild_id), user_id)
            .await
    }

    pub(crate) async fn mark_active(
        &self,
        user_id: &str,
        ttl: Duration,
    ) -> Result<(), DatabaseError> {
        self.store
            .set(&table(ACTIVE_TABLE, self.guild_id), user_id, "", ttl)
            .await
    }

    pub(crate) async fn is_active(&self, user_id: &str) -> Result<bool, DatabaseError> {
        Ok(self
            .store
            .get(&table(ACTIVE_TABLE, self.guild_id), user_id)
            .await?
            .is_some())
    }

    pub(crate) async fn partner_of(&self, user_id: &str) -> Result<Option<String>, DatabaseError> {
        self.store
            .get(&table(MARRIAGE_TABLE, self.guild_id), user_id)
            .await
    }

    /// Writes both directions of a pairing. Anyone displaced by it loses
    /// their half too, so the relation is never left one-sided.
    pub(crate) async fn commit_pair(
        &self,
        first: &str,
        second: &str,
        ttl: Duration,
    ) -> Result<(), DatabaseError> {
        let marriages = table(MARRIAGE_TABLE, self.guild_id);
        for (user, new_partner) in [(first, second), (second, first)] {
            let Some(old_partner) = self.partner_of(user).await? else {
                continue;
            };
            if old_partner == new_partner {
                continue;
            }
            if self.partner_of(&old_partner).await?.as_deref() == Some(user) {
                debug!(
                    "displacing pairing guild={} user={} old_partner={}",
                    self.guild_id, user, old_partner
                );
                self.store.delete(&marriages, &old_partner).await?;
            }
        }

        self.store.set(&marriages, first, second, ttl).await?;
        self.store.set(&marriages, second, first, ttl).await
    }

    /// Removes the user's pairing in both directions, returning the former
    /// partner.
    pub(crate) async fn dissolve_pair(
        &self,
        user_id: &str,
    ) -> Result<Option<String>, DatabaseError> {
        let marriages = table(MARRIAGE_TABLE, self.guild_id);
        let Some(partner) = self.partner_of(user_id).await? else {
            return Ok(None);
        };
        self.store.delete(&marriages, user_id).await?;
        if self.partner_of(&partner).await?.as_deref() == Some(user_id) {
            self.store.delete(&marriages, &partner).await?;
        }
        Ok(Some(partner))
    }

    pub(crate) async fn change_count(&self, user_id: &str) -> Result<Option<u32>, DatabaseError> {
        let Some(raw) = self
            .store
            .get(&table(CHANGE_COUNT_TABLE, self.guild_id), user_id)
            .await?
        else {
            return Ok(None);
        };
        raw.parse::<u32>()
            .map(Some)
            .map_err(|e| DatabaseError::Codec(format!("change count {raw:?}: {e}")))
    }

    pub(crate) async fn set_change_count(
        &self,
        user_id: &str,
        count: u32,
        ttl: Duration,
    ) -> Result<(), DatabaseError> {
        self.store
            .set(
                &table(CHANGE_COUNT_TABLE, self.guild_id),
                user_id,
                &count.to_string(),
                ttl,
            )
            .await
    }
}
