//! Random daily partners for guild members.
//!
//! Members are tracked as they talk, pairings live in the expiring store and
//! every command funnels through [`MarriageService::handle_message`].

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::config::{Config, MarriageConfig};
use crate::db::KeyValueStore;

pub mod command_handler;
pub mod engine;
pub mod expiry;
pub mod model;
pub mod proposal;
pub mod reply;
pub mod roster;
mod selection;
mod state;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_support;

pub use command_handler::{MarriageCommand, MarriageCommandHandler};
pub use engine::PairingEngine;
pub use model::{CommandOrigin, GroupMember};
pub use proposal::ReplyListeners;
pub use reply::MarriageReply;
pub use roster::{RosterPage, RosterProvider, UserLookup};
pub use tracker::MembershipTracker;

/// Sends a reply back to where a command came from.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn reply(&self, origin: &CommandOrigin, reply: &MarriageReply) -> Result<()>;
}

pub struct MarriageService {
    config: Arc<MarriageConfig>,
    prefix: String,
    commands: MarriageCommandHandler,
    tracker: MembershipTracker,
    listeners: Arc<ReplyListeners>,
    engine: PairingEngine,
}

impl MarriageService {
    pub fn new(
        config: &Config,
        store: Arc<dyn KeyValueStore>,
        roster: Arc<dyn RosterProvider>,
        users: Arc<dyn UserLookup>,
    ) -> Self {
        let marriage = Arc::new(config.marriage.clone());
        let listeners = Arc::new(ReplyListeners::new());
        Self {
            prefix: config.bot.command_prefix.clone(),
            commands: MarriageCommandHandler::new(config.bot.command_prefix.clone()),
            tracker: MembershipTracker::new(store.clone(), &marriage),
            engine: PairingEngine::new(marriage.clone(), store, roster, users, listeners.clone()),
            listeners,
            config: marriage,
        }
    }

    fn is_enabled(&self, command: &MarriageCommand) -> bool {
        match command {
            MarriageCommand::Marry | MarriageCommand::Usage { .. } => true,
            MarriageCommand::ForceMarry { .. } => self.config.force_marry,
            MarriageCommand::Propose { .. } => self.config.propose,
            MarriageCommand::Divorce => self.config.divorce,
            MarriageCommand::ChangePartner => self.config.change_partner,
            MarriageCommand::Query => self.config.query,
        }
    }

    /// Entry point for every message the bot sees.
    pub async fn handle_message(
        &self,
        origin: &CommandOrigin,
        content: &str,
        responder: &dyn Responder,
    ) -> Result<()> {
        if let Some(guild_id) = origin.guild_id.as_deref() {
            let user_id = origin.author.user_id.as_str();
            self.tracker.on_message(guild_id, user_id, &origin.author).await;
            if self
                .listeners
                .deliver(guild_id, &origin.channel_id, user_id, content)
            {
                debug!("message from {} answered a pending proposal", user_id);
                return Ok(());
            }
        }

        if !self.commands.is_command(content) {
            return Ok(());
        }
        let Some(command) = self.commands.parse(content) else {
            return Ok(());
        };
        if !self.is_enabled(&command) {
            debug!("ignoring disabled command {:?}", command);
            return Ok(());
        }

        let reply = match command {
            MarriageCommand::Marry => Some(self.engine.request_pairing(origin).await?),
            MarriageCommand::ForceMarry { target_id } => {
                Some(self.engine.force_pair(origin, &target_id).await?)
            }
            MarriageCommand::Propose { target_id } => {
                self.engine.propose(origin, &target_id, responder).await?
            }
            MarriageCommand::Divorce => Some(self.engine.unpair(origin).await?),
            MarriageCommand::ChangePartner => Some(self.engine.change_partner(origin).await?),
            MarriageCommand::Query => Some(self.engine.query(origin).await?),
            MarriageCommand::Usage { usage } => Some(MarriageReply::Usage {
                usage: format!("{}{usage}", self.prefix),
            }),
        };

        if let Some(reply) = reply {
            responder.reply(origin, &reply).await?;
        }
        Ok(())
    }

    pub async fn handle_member_removed(&self, guild_id: &str, user_id: &str) {
        self.tracker.on_member_removed(guild_id, user_id).await;
    }

    /// Cancels pending proposals.
    pub fn shutdown(&self) {
        self.listeners.dispose_all();
    }
}
