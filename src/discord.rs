use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info};

use serenity::all::{
    ChannelId, Client as SerenityClient, Context as SerenityContext, CreateEmbed, CreateMessage,
    EventHandler as SerenityEventHandler, GatewayIntents, GuildId, Http, Member,
    Message as SerenityMessage, MessageId, Ready, User, UserId,
};
use tokio::sync::{Mutex as AsyncMutex, RwLock, oneshot};

use crate::config::BotConfig;
use crate::marriage::{
    CommandOrigin, GroupMember, MarriageReply, MarriageService, Responder, RosterPage,
    RosterProvider, UserLookup,
};

const INITIAL_LOGIN_RETRY_SECONDS: u64 = 2;
const MAX_LOGIN_RETRY_SECONDS: u64 = 300;
const READY_TIMEOUT_SECONDS: u64 = 30;

/// Members requested per roster page, the most Discord hands out at once.
const ROSTER_PAGE_LIMIT: u64 = 1000;

pub mod members;

pub use self::members::{member_to_group, message_author, parse_snowflake, reply_content, user_to_group};

/// REST half of the bot: roster pages, user lookups and replies.
pub struct DiscordApi {
    http: Arc<Http>,
}

impl DiscordApi {
    pub fn new(token: &SecretString) -> Self {
        Self {
            http: Arc::new(Http::new(token.expose_secret())),
        }
    }
}

#[async_trait]
impl RosterProvider for DiscordApi {
    async fn fetch_page(&self, guild_id: &str, after: Option<&str>) -> Result<RosterPage> {
        let guild = GuildId::new(parse_snowflake("guild", guild_id)?);
        let after = after
            .map(|id| parse_snowflake("user", id).map(UserId::new))
            .transpose()?;

        let page = guild
            .members(&*self.http, Some(ROSTER_PAGE_LIMIT), after)
            .await
            .map_err(|e| anyhow!("failed to list members of guild {}: {}", guild_id, e))?;

        let next = if page.len() < ROSTER_PAGE_LIMIT as usize {
            None
        } else {
            page.last().map(|member| member.user.id.to_string())
        };

        Ok(RosterPage {
            members: page.iter().map(member_to_group).collect(),
            next,
        })
    }
}

#[async_trait]
impl UserLookup for DiscordApi {
    async fn guild_member(&self, guild_id: &str, user_id: &str) -> Result<Option<GroupMember>> {
        let guild = GuildId::new(parse_snowflake("guild", guild_id)?);
        let user = UserId::new(parse_snowflake("user", user_id)?);
        let member: Member = guild
            .member(&*self.http, user)
            .await
            .map_err(|e| anyhow!("failed to fetch member {} of guild {}: {}", user_id, guild_id, e))?;
        Ok(Some(member_to_group(&member)))
    }

    async fn user(&self, user_id: &str) -> Result<Option<GroupMember>> {
        let user = UserId::new(parse_snowflake("user", user_id)?);
        let user: User = self
            .http
            .get_user(user)
            .await
            .map_err(|e| anyhow!("failed to fetch user {}: {}", user_id, e))?;
        Ok(Some(user_to_group(&user)))
    }
}

#[async_trait]
impl Responder for DiscordApi {
    async fn reply(&self, origin: &CommandOrigin, reply: &MarriageReply) -> Result<()> {
        let channel_id = ChannelId::new(parse_snowflake("channel", &origin.channel_id)?);
        let rendered = reply.render();

        let mut message =
            CreateMessage::new().content(reply_content(rendered.mention.as_deref(), &rendered.text));
        if rendered.quote
            && let Some(message_id) = origin.message_id.as_deref()
        {
            let message_id = MessageId::new(parse_snowflake("message", message_id)?);
            message = message.reference_message((channel_id, message_id));
        }
        if let Some(image) = rendered.image {
            message = message.embed(CreateEmbed::new().image(image));
        }

        let sent = channel_id
            .send_message(&*self.http, message)
            .await
            .map_err(|e| anyhow!("failed to send reply to channel {}: {}", channel_id, e))?;
        debug!("sent reply message_id={} channel_id={}", sent.id, channel_id);
        Ok(())
    }
}

struct WaifuEventHandler {
    ready_sender: Arc<AsyncMutex<Option<oneshot::Sender<()>>>>,
    service: Arc<RwLock<Option<Arc<MarriageService>>>>,
    api: Arc<DiscordApi>,
}

#[serenity::async_trait]
impl SerenityEventHandler for WaifuEventHandler {
    async fn ready(&self, _ctx: SerenityContext, ready: Ready) {
        info!(
            "discord gateway ready as {} ({}) in {} guilds",
            ready.user.name,
            ready.user.id,
            ready.guilds.len()
        );
        if let Some(sender) = self.ready_sender.lock().await.take() {
            let _ = sender.send(());
        }
    }

    async fn message(&self, ctx: SerenityContext, msg: SerenityMessage) {
        if msg.author.bot {
            return;
        }

        let service = self.service.read().await.clone();
        let Some(service) = service else {
            debug!("ignoring discord message before service binding");
            return;
        };

        let self_id = ctx.cache.current_user().id.to_string();
        let origin = CommandOrigin {
            guild_id: msg.guild_id.map(|id| id.to_string()),
            channel_id: msg.channel_id.to_string(),
            message_id: Some(msg.id.to_string()),
            self_id,
            author: message_author(&msg),
        };

        if let Err(err) = service
            .handle_message(&origin, &msg.content, self.api.as_ref())
            .await
        {
            error!(
                "failed to handle discord message message_id={} channel_id={}: {err:#}",
                msg.id, msg.channel_id
            );
        }
    }

    async fn guild_member_removal(
        &self,
        _ctx: SerenityContext,
        guild_id: GuildId,
        user: User,
        _member: Option<Member>,
    ) {
        let service = self.service.read().await.clone();
        let Some(service) = service else {
            return;
        };

        service
            .handle_member_removed(&guild_id.to_string(), &user.id.to_string())
            .await;
    }
}

fn gateway_intents(use_privileged_intents: bool) -> GatewayIntents {
    let intents = GatewayIntents::non_privileged();
    if use_privileged_intents {
        intents | GatewayIntents::GUILD_MEMBERS | GatewayIntents::MESSAGE_CONTENT
    } else {
        intents
    }
}

#[derive(Default)]
struct DiscordLoginState {
    is_logged_in: bool,
    gateway_task: Option<tokio::task::JoinHandle<()>>,
}

/// Gateway connection plus the shared REST client.
#[derive(Clone)]
pub struct DiscordClient {
    token: SecretString,
    use_privileged_intents: bool,
    api: Arc<DiscordApi>,
    login_state: Arc<AsyncMutex<DiscordLoginState>>,
    service: Arc<RwLock<Option<Arc<MarriageService>>>>,
}

impl DiscordClient {
    pub fn new(config: &BotConfig) -> Self {
        info!("initializing discord client");
        let token = SecretString::from(config.token.clone());
        Self {
            api: Arc::new(DiscordApi::new(&token)),
            token,
            use_privileged_intents: config.use_privileged_intents,
            login_state: Arc::new(AsyncMutex::new(DiscordLoginState::default())),
            service: Arc::new(RwLock::new(None)),
        }
    }

    pub fn api(&self) -> Arc<DiscordApi> {
        self.api.clone()
    }

    pub async fn set_service(&self, service: Arc<MarriageService>) {
        *self.service.write().await = Some(service);
    }

    pub async fn login(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if state.is_logged_in {
            return Ok(());
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let event_handler = WaifuEventHandler {
            ready_sender: Arc::new(AsyncMutex::new(Some(ready_tx))),
            service: self.service.clone(),
            api: self.api.clone(),
        };

        let mut gateway_client = SerenityClient::builder(
            self.token.expose_secret(),
            gateway_intents(self.use_privileged_intents),
        )
        .event_handler(event_handler)
        .await
        .map_err(|err| anyhow!("failed to build discord gateway client: {err}"))?;

        let gateway_task = tokio::spawn(async move {
            if let Err(err) = gateway_client.start_autosharded().await {
                error!("discord gateway stopped: {err}");
            }
        });

        match tokio::time::timeout(Duration::from_secs(READY_TIMEOUT_SECONDS), ready_rx).await {
            Ok(Ok(())) => {
                state.is_logged_in = true;
                state.gateway_task = Some(gateway_task);
                info!("discord bot login succeeded and gateway is connected");
                Ok(())
            }
            Ok(Err(_)) => {
                gateway_task.abort();
                Err(anyhow!("discord gateway exited before receiving Ready event"))
            }
            Err(_) => {
                gateway_task.abort();
                Err(anyhow!("timed out waiting for discord Ready event"))
            }
        }
    }

    /// Logs in, retrying with exponential backoff until it succeeds.
    pub async fn start(&self) -> Result<()> {
        let mut retry_seconds = INITIAL_LOGIN_RETRY_SECONDS;

        loop {
            match self.login().await {
                Ok(()) => {
                    info!("discord client is ready");
                    return Ok(());
                }
                Err(err) => {
                    error!(
                        "failed to start discord client: {err}. retrying in {} seconds",
                        retry_seconds
                    );
                    tokio::time::sleep(Duration::from_secs(retry_seconds)).await;
                    retry_seconds = next_retry_seconds(retry_seconds);
                }
            }
        }
    }

    pub async fn stop(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if !state.is_logged_in {
            return Ok(());
        }

        if let Some(gateway_task) = state.gateway_task.take() {
            gateway_task.abort();
            match gateway_task.await {
                Ok(()) => info!("discord gateway task exited"),
                Err(join_err) if join_err.is_cancelled() => {
                    info!("discord gateway task aborted")
                }
                Err(join_err) => {
                    error!("discord gateway task join error: {join_err}");
                }
            }
        }

        state.is_logged_in = false;
        info!("discord client stopped");
        Ok(())
    }
}

fn next_retry_seconds(current: u64) -> u64 {
    current.saturating_mul(2).min(MAX_LOGIN_RETRY_SECONDS)
}
