use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::model::{GroupMember, PartnerProfile};
use super::state::GuildState;
use crate::db::DatabaseError;

/// Maximum number of pages fetched for one live roster.
pub const MAX_PAGES: usize = 20;

/// One page of the live member list.
#[derive(Debug, Clone, Default)]
pub struct RosterPage {
    pub members: Vec<GroupMember>,
    /// Cursor for the next page, `None` on the last one.
    pub next: Option<String>,
}

/// Live member list of a guild, paged by user id.
#[async_trait]
pub trait RosterProvider: Send + Sync {
    async fn fetch_page(&self, guild_id: &str, after: Option<&str>) -> Result<RosterPage>;
}

/// Point lookups used to describe a partner.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn guild_member(&self, guild_id: &str, user_id: &str) -> Result<Option<GroupMember>>;

    async fn user(&self, user_id: &str) -> Result<Option<GroupMember>>;
}

async fn fetch_live_roster(provider: &dyn RosterProvider, guild_id: &str) -> Result<Vec<GroupMember>> {
    let mut members = Vec::new();
    let mut after: Option<String> = None;

    for _ in 0..MAX_PAGES {
        let page = provider.fetch_page(guild_id, after.as_deref()).await?;
        members.extend(page.members);
        match page.next {
            Some(next) => after = Some(next),
            None => return Ok(members),
        }
    }

    warn!(
        "member list of guild {} exceeds {} pages, using the first {} members",
        guild_id,
        MAX_PAGES,
        members.len()
    );
    Ok(members)
}

/// The live member list when the platform provides one, otherwise every
/// tracked member sorted by user id. A live list that fails or comes back
/// empty falls back as well.
pub(crate) async fn resolve_roster(
    provider: &dyn RosterProvider,
    state: GuildState<'_>,
    guild_id: &str,
) -> Result<Vec<GroupMember>, DatabaseError> {
    match fetch_live_roster(provider, guild_id).await {
        Ok(members) if !members.is_empty() => return Ok(members),
        Ok(_) => debug!("live roster of guild {} is empty, using tracked members", guild_id),
        Err(err) => warn!("live roster of guild {} unavailable: {err:#}", guild_id),
    }

    let mut tracked = state.tracked_members().await?;
    tracked.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    Ok(tracked)
}

/// Describes a freshly drawn member, asking the platform for the account
/// when the snapshot has no usable name.
pub(crate) async fn describe_member(users: &dyn UserLookup, member: &GroupMember) -> PartnerProfile {
    if member.resolved_name().is_some() {
        return PartnerProfile::from(member);
    }

    match users.user(&member.user_id).await {
        Ok(Some(user)) => {
            let merged = GroupMember {
                username: user.username,
                global_name: user.global_name,
                avatar: member.avatar.clone().or(user.avatar),
                ..member.clone()
            };
            PartnerProfile::from(&merged)
        }
        Ok(None) => PartnerProfile::from(member),
        Err(err) => {
            warn!("user lookup for {} failed: {err:#}", member.user_id);
            PartnerProfile::from(member)
        }
    }
}

/// Describes an existing partner by id: live guild member, then the tracked
/// snapshot, then the bare account, then the raw id.
pub(crate) async fn describe_partner(
    users: &dyn UserLookup,
    state: GuildState<'_>,
    guild_id: &str,
    user_id: &str,
) -> PartnerProfile {
    match users.guild_member(guild_id, user_id).await {
        Ok(Some(member)) => return describe_member(users, &member).await,
        Ok(None) => {}
        Err(err) => debug!("guild member lookup for {} failed: {err:#}", user_id),
    }

    match state.tracked_member(user_id).await {
        Ok(Some(member)) => return describe_member(users, &member).await,
        Ok(None) => {}
        Err(err) => warn!("tracked member lookup for {} failed: {err}", user_id),
    }

    match users.user(user_id).await {
        Ok(Some(user)) => PartnerProfile::from(&user),
        Ok(None) => PartnerProfile::bare(user_id),
        Err(err) => {
            warn!("user lookup for {} failed: {err:#}", user_id);
            PartnerProfile::bare(user_id)
        }
    }
}
