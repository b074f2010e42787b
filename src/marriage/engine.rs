use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use super::Responder;
use super::expiry::pairing_ttl;
use super::model::{CommandOrigin, GroupMember, PartnerProfile, is_real_user_id};
use super::proposal::{ListenerOutcome, ReplyListeners};
use super::reply::MarriageReply;
use super::roster::{RosterProvider, UserLookup, describe_member, describe_partner, resolve_roster};
use super::selection::draw_partner;
use super::state::GuildState;
use crate::config::MarriageConfig;
use crate::db::{DatabaseError, KeyValueStore};

/// Target of a forced pairing or proposal that passed every precondition.
struct EligibleTarget {
    member: GroupMember,
    partner: Option<String>,
}

/// Pairing operations over one shared store.
///
/// Check-then-write sequences run under a per-guild lock so two commands in
/// the same guild cannot interleave. The lock is never held while a proposal
/// waits for its answer.
pub struct PairingEngine {
    config: Arc<MarriageConfig>,
    store: Arc<dyn KeyValueStore>,
    roster: Arc<dyn RosterProvider>,
    users: Arc<dyn UserLookup>,
    listeners: Arc<ReplyListeners>,
    rng: Mutex<StdRng>,
    guild_locks: GuildLocks,
}

type GuildLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Holds one guild's lock. The map entry is removed on release once no
/// other task is waiting on it.
struct GuildGuard<'a> {
    locks: &'a GuildLocks,
    guild_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for GuildGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock();
        // One reference in the map, one here.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.guild_id);
        }
    }
}

impl PairingEngine {
    pub fn new(
        config: Arc<MarriageConfig>,
        store: Arc<dyn KeyValueStore>,
        roster: Arc<dyn RosterProvider>,
        users: Arc<dyn UserLookup>,
        listeners: Arc<ReplyListeners>,
    ) -> Self {
        Self {
            config,
            store,
            roster,
            users,
            listeners,
            rng: Mutex::new(StdRng::from_os_rng()),
            guild_locks: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    fn state<'a>(&'a self, guild_id: &'a str) -> GuildState<'a> {
        GuildState::new(self.store.as_ref(), guild_id)
    }

    async fn lock_guild(&self, guild_id: &str) -> GuildGuard<'_> {
        let lock = self
            .guild_locks
            .lock()
            .entry(guild_id.to_string())
            .or_default()
            .clone();
        let guard = lock.clone().lock_owned().await;
        GuildGuard {
            locks: &self.guild_locks,
            guild_id: guild_id.to_string(),
            lock,
            guard: Some(guard),
        }
    }

    fn ttl(&self) -> Duration {
        pairing_ttl(&self.config, Utc::now())
    }

    /// Members eligible for a random draw, in roster order.
    async fn candidate_pool(
        &self,
        state: GuildState<'_>,
        guild_id: &str,
        origin: &CommandOrigin,
        also_exclude: Option<&str>,
    ) -> Result<Vec<GroupMember>, DatabaseError> {
        let roster = resolve_roster(self.roster.as_ref(), state, guild_id).await?;
        let mut seen = HashSet::new();
        let mut pool = Vec::with_capacity(roster.len());

        for member in roster {
            let id = member.user_id.as_str();
            if member.bot
                || !is_real_user_id(id)
                || id == origin.author.user_id
                || id == origin.self_id
                || also_exclude == Some(id)
                || self.config.excludes.iter().any(|excluded| excluded == id)
                || !seen.insert(id.to_string())
            {
                continue;
            }
            if self.config.only_active && !state.is_active(id).await? {
                continue;
            }
            pool.push(member);
        }

        debug!("guild {} has {} candidates", guild_id, pool.len());
        Ok(pool)
    }

    async fn draw(
        &self,
        state: GuildState<'_>,
        pool: &[GroupMember],
    ) -> Result<Option<GroupMember>, DatabaseError> {
        draw_partner(
            pool,
            self.config.avoid_ntr,
            |n| self.rng.lock().random_range(0..n),
            move |user_id| async move {
                state
                    .partner_of(&user_id)
                    .await
                    .map(|partner| partner.is_some())
            },
        )
        .await
    }

    async fn describe_partner(&self, state: GuildState<'_>, guild_id: &str, user_id: &str) -> PartnerProfile {
        describe_partner(self.users.as_ref(), state, guild_id, user_id).await
    }

    /// Draws a random partner for the requester, or reports the one they
    /// already have.
    pub async fn request_pairing(&self, origin: &CommandOrigin) -> Result<MarriageReply, DatabaseError> {
        let Some(guild_id) = origin.guild_id.as_deref() else {
            return Ok(MarriageReply::NotInGuild);
        };
        let requester = origin.author.user_id.as_str();
        let state = self.state(guild_id);
        let _guard = self.lock_guild(guild_id).await;

        if let Some(partner_id) = state.partner_of(requester).await? {
            let partner = self.describe_partner(state, guild_id, &partner_id).await;
            return Ok(MarriageReply::Married { partner });
        }

        let pool = self.candidate_pool(state, guild_id, origin, None).await?;
        let Some(selected) = self.draw(state, &pool).await? else {
            return Ok(MarriageReply::TooFewMembers);
        };

        let ttl = self.ttl();
        state.commit_pair(requester, &selected.user_id, ttl).await?;
        if self.config.change_partner && state.change_count(requester).await?.is_none() {
            state.set_change_count(requester, 0, ttl).await?;
        }
        info!(
            "paired guild={} requester={} partner={} ttl={}s",
            guild_id,
            requester,
            selected.user_id,
            ttl.as_secs()
        );

        Ok(MarriageReply::Married {
            partner: describe_member(self.users.as_ref(), &selected).await,
        })
    }

    async fn check_target(
        &self,
        state: GuildState<'_>,
        guild_id: &str,
        origin: &CommandOrigin,
        target_id: &str,
    ) -> Result<Result<EligibleTarget, MarriageReply>, DatabaseError> {
        let requester = origin.author.user_id.as_str();

        if let Some(partner_id) = state.partner_of(requester).await?
            && !self.config.allow_overwrite
        {
            let partner = self.describe_partner(state, guild_id, &partner_id).await;
            return Ok(Err(MarriageReply::AlreadyMarried { partner }));
        }

        if target_id == requester {
            return Ok(Err(MarriageReply::TargetIsSelf));
        }

        let roster = resolve_roster(self.roster.as_ref(), state, guild_id).await?;
        let Some(member) = roster
            .into_iter()
            .find(|m| m.user_id == target_id && !m.bot && m.user_id != origin.self_id)
        else {
            return Ok(Err(MarriageReply::TooFewMembers));
        };

        let partner = state.partner_of(target_id).await?;
        if let Some(partner_id) = partner.as_deref()
            && partner_id != requester
            && !self.config.allow_overwrite
        {
            let target = describe_member(self.users.as_ref(), &member).await;
            return Ok(Err(MarriageReply::TargetTaken { target }));
        }

        Ok(Ok(EligibleTarget { member, partner }))
    }

    /// Pairs the requester with `target_id` without asking.
    pub async fn force_pair(
        &self,
        origin: &CommandOrigin,
        target_id: &str,
    ) -> Result<MarriageReply, DatabaseError> {
        let Some(guild_id) = origin.guild_id.as_deref() else {
            return Ok(MarriageReply::NotInGuild);
        };
        let requester = origin.author.user_id.as_str();
        let state = self.state(guild_id);
        let _guard = self.lock_guild(guild_id).await;

        let target = match self.check_target(state, guild_id, origin, target_id).await? {
            Ok(target) => target,
            Err(reply) => return Ok(reply),
        };

        state.commit_pair(requester, target_id, self.ttl()).await?;
        info!(
            "forced pairing guild={} requester={} partner={}",
            guild_id, requester, target_id
        );

        Ok(MarriageReply::Married {
            partner: describe_member(self.users.as_ref(), &target.member).await,
        })
    }

    /// Asks `target_id` to accept a pairing and waits for their answer.
    ///
    /// The prompt goes out through `responder`. Silence, an unrelated answer
    /// or shutdown end the proposal without a reply.
    pub async fn propose(
        &self,
        origin: &CommandOrigin,
        target_id: &str,
        responder: &dyn Responder,
    ) -> Result<Option<MarriageReply>, DatabaseError> {
        let Some(guild_id) = origin.guild_id.as_deref() else {
            return Ok(Some(MarriageReply::NotInGuild));
        };
        let requester = origin.author.user_id.as_str();
        let state = self.state(guild_id);

        let target = {
            let _guard = self.lock_guild(guild_id).await;
            match self.check_target(state, guild_id, origin, target_id).await? {
                Ok(target) => target,
                Err(reply) => return Ok(Some(reply)),
            }
        };

        let listener = self
            .listeners
            .register(guild_id, &origin.channel_id, target_id);
        let prompt = MarriageReply::ProposalPrompt {
            requester: PartnerProfile::from(&origin.author),
            target_id: target_id.to_string(),
            accept: self.config.accept_token.clone(),
            decline: self.config.decline_token.clone(),
        };
        if let Err(err) = responder.reply(origin, &prompt).await {
            warn!("failed to send proposal prompt guild={} target={}: {err:#}", guild_id, target_id);
            return Ok(None);
        }

        let answer = match listener
            .wait(Duration::from_secs(self.config.proposal_timeout_secs))
            .await
        {
            ListenerOutcome::Reply(answer) => answer,
            ListenerOutcome::TimedOut => {
                debug!("proposal timed out guild={} target={}", guild_id, target_id);
                return Ok(None);
            }
            ListenerOutcome::Cancelled => return Ok(None),
        };
        let answer = answer.trim();
        let target_profile = describe_member(self.users.as_ref(), &target.member).await;

        if answer.eq_ignore_ascii_case(self.config.decline_token.trim()) {
            return Ok(Some(MarriageReply::ProposalDeclined {
                target: target_profile,
            }));
        }
        if !answer.eq_ignore_ascii_case(self.config.accept_token.trim()) {
            return Ok(None);
        }

        let _guard = self.lock_guild(guild_id).await;
        let current = state.partner_of(target_id).await?;
        if current.is_some() && current != target.partner && current.as_deref() != Some(requester) {
            return Ok(Some(MarriageReply::ProposalConflict {
                target: target_profile,
            }));
        }
        if let Some(partner_id) = state.partner_of(requester).await?
            && partner_id != target_id
            && !self.config.allow_overwrite
        {
            let partner = self.describe_partner(state, guild_id, &partner_id).await;
            return Ok(Some(MarriageReply::AlreadyMarried { partner }));
        }

        state.commit_pair(requester, target_id, self.ttl()).await?;
        info!(
            "proposal accepted guild={} requester={} partner={}",
            guild_id, requester, target_id
        );
        Ok(Some(MarriageReply::ProposalAccepted {
            partner: target_profile,
        }))
    }

    /// Dissolves the requester's pairing.
    pub async fn unpair(&self, origin: &CommandOrigin) -> Result<MarriageReply, DatabaseError> {
        let Some(guild_id) = origin.guild_id.as_deref() else {
            return Ok(MarriageReply::NotInGuild);
        };
        let requester = origin.author.user_id.as_str();
        let state = self.state(guild_id);
        let _guard = self.lock_guild(guild_id).await;

        match state.dissolve_pair(requester).await? {
            Some(partner_id) => {
                info!("divorce guild={} requester={} partner={}", guild_id, requester, partner_id);
                let partner = self.describe_partner(state, guild_id, &partner_id).await;
                Ok(MarriageReply::Divorced { partner })
            }
            None => Ok(MarriageReply::NotMarried),
        }
    }

    /// Swaps the requester's partner for a new random one, within the daily
    /// quota. The old partner is never redrawn.
    pub async fn change_partner(&self, origin: &CommandOrigin) -> Result<MarriageReply, DatabaseError> {
        let Some(guild_id) = origin.guild_id.as_deref() else {
            return Ok(MarriageReply::NotInGuild);
        };
        let requester = origin.author.user_id.as_str();
        let state = self.state(guild_id);
        let _guard = self.lock_guild(guild_id).await;

        let Some(current) = state.partner_of(requester).await? else {
            return Ok(MarriageReply::NotMarried);
        };

        let max = self.config.max_change_count;
        let used = state.change_count(requester).await?.unwrap_or(0);
        if max > 0 && used >= max {
            return Ok(MarriageReply::ChangeQuotaExhausted { max });
        }

        let pool = self
            .candidate_pool(state, guild_id, origin, Some(&current))
            .await?;
        let Some(selected) = self.draw(state, &pool).await? else {
            return Ok(MarriageReply::TooFewMembers);
        };

        let ttl = self.ttl();
        state.dissolve_pair(requester).await?;
        state.commit_pair(requester, &selected.user_id, ttl).await?;
        let used = used.saturating_add(1);
        state.set_change_count(requester, used, ttl).await?;
        info!(
            "partner changed guild={} requester={} old={} new={} used={}",
            guild_id, requester, current, selected.user_id, used
        );

        Ok(MarriageReply::PartnerChanged {
            partner: describe_member(self.users.as_ref(), &selected).await,
            last_change: max > 0 && used >= max,
        })
    }

    /// Reports the requester's current partner.
    pub async fn query(&self, origin: &CommandOrigin) -> Result<MarriageReply, DatabaseError> {
        let Some(guild_id) = origin.guild_id.as_deref() else {
            return Ok(MarriageReply::NotInGuild);
        };
        let state = self.state(guild_id);

        match state.partner_of(&origin.author.user_id).await? {
            Some(partner_id) => Ok(MarriageReply::CurrentPartner {
                partner: self.describe_partner(state, guild_id, &partner_id).await,
            }),
            None => Ok(MarriageReply::NotMarried),
        }
    }
}
