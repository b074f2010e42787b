use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::Mutex;

use super::Responder;
use super::model::{CommandOrigin, GroupMember};
use super::reply::MarriageReply;
use super::roster::{RosterPage, RosterProvider, UserLookup};
use crate::db::{DatabaseError, EntryStream, KeyValueStore, MemoryStore};

pub(crate) fn named(user_id: &str, name: &str) -> GroupMember {
    GroupMember {
        username: Some(name.to_string()),
        ..GroupMember::new(user_id)
    }
}

pub(crate) fn bot(user_id: &str) -> GroupMember {
    GroupMember {
        bot: true,
        ..named(user_id, user_id)
    }
}

pub(crate) fn origin(user_id: &str) -> CommandOrigin {
    CommandOrigin {
        guild_id: Some("g".to_string()),
        channel_id: "c".to_string(),
        message_id: Some("m".to_string()),
        self_id: "bot-self".to_string(),
        author: named(user_id, &format!("user-{user_id}")),
    }
}

enum RosterScript {
    Pages(Vec<Vec<GroupMember>>),
    Failing,
    Endless,
}

pub(crate) struct FakeRoster {
    script: RosterScript,
    calls: AtomicUsize,
}

impl FakeRoster {
    fn new(script: RosterScript) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn single(members: Vec<GroupMember>) -> Self {
        Self::new(RosterScript::Pages(vec![members]))
    }

    pub(crate) fn paged(pages: Vec<Vec<GroupMember>>) -> Self {
        Self::new(RosterScript::Pages(pages))
    }

    pub(crate) fn failing() -> Self {
        Self::new(RosterScript::Failing)
    }

    pub(crate) fn endless() -> Self {
        Self::new(RosterScript::Endless)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RosterProvider for FakeRoster {
    async fn fetch_page(&self, _guild_id: &str, after: Option<&str>) -> Result<RosterPage> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = after.and_then(|a| a.parse::<usize>().ok()).unwrap_or(0);
        match &self.script {
            RosterScript::Pages(pages) => Ok(RosterPage {
                members: pages.get(index).cloned().unwrap_or_default(),
                next: (index + 1 < pages.len()).then(|| (index + 1).to_string()),
            }),
            RosterScript::Failing => bail!("member list unavailable"),
            RosterScript::Endless => Ok(RosterPage {
                members: vec![GroupMember::new(format!("endless-{call}"))],
                next: Some((index + 1).to_string()),
            }),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeUsers {
    members: HashMap<String, GroupMember>,
    users: HashMap<String, GroupMember>,
    fail_guild_lookups: bool,
}

impl FakeUsers {
    pub(crate) fn with_member(mut self, member: GroupMember) -> Self {
        self.members.insert(member.user_id.clone(), member);
        self
    }

    pub(crate) fn with_user(mut self, user: GroupMember) -> Self {
        self.users.insert(user.user_id.clone(), user);
        self
    }

    pub(crate) fn failing_guild_lookups(mut self) -> Self {
        self.fail_guild_lookups = true;
        self
    }
}

#[async_trait]
impl UserLookup for FakeUsers {
    async fn guild_member(&self, _guild_id: &str, user_id: &str) -> Result<Option<GroupMember>> {
        if self.fail_guild_lookups {
            bail!("guild member lookup unavailable");
        }
        Ok(self.members.get(user_id).cloned())
    }

    async fn user(&self, user_id: &str) -> Result<Option<GroupMember>> {
        Ok(self.users.get(user_id).cloned())
    }
}

#[derive(Default)]
pub(crate) struct RecordingResponder {
    replies: Mutex<Vec<MarriageReply>>,
}

impl RecordingResponder {
    pub(crate) fn replies(&self) -> Vec<MarriageReply> {
        self.replies.lock().clone()
    }
}

#[async_trait]
impl Responder for RecordingResponder {
    async fn reply(&self, _origin: &CommandOrigin, reply: &MarriageReply) -> Result<()> {
        self.replies.lock().push(reply.clone());
        Ok(())
    }
}

/// A store whose every call fails.
pub(crate) struct FailingStore;

impl FailingStore {
    pub(crate) fn shared() -> Arc<dyn KeyValueStore> {
        Arc::new(Self)
    }

    fn offline() -> DatabaseError {
        DatabaseError::Connection("store offline".to_string())
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _table: &str, _key: &str) -> Result<Option<String>, DatabaseError> {
        Err(Self::offline())
    }

    async fn set(
        &self,
        _table: &str,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<(), DatabaseError> {
        Err(Self::offline())
    }

    async fn delete(&self, _table: &str, _key: &str) -> Result<(), DatabaseError> {
        Err(Self::offline())
    }

    async fn entries(&self, _table: &str) -> Result<EntryStream, DatabaseError> {
        Err(Self::offline())
    }

    async fn purge_expired(&self) -> Result<u64, DatabaseError> {
        Err(Self::offline())
    }
}

/// Memory store that counts mutating calls.
#[derive(Default)]
pub(crate) struct CountingStore {
    inner: MemoryStore,
    writes: AtomicUsize,
}

impl CountingStore {
    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for CountingStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<String>, DatabaseError> {
        self.inner.get(table, key).await
    }

    async fn set(
        &self,
        table: &str,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), DatabaseError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(table, key, value, ttl).await
    }

    async fn delete(&self, table: &str, key: &str) -> Result<(), DatabaseError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(table, key).await
    }

    async fn entries(&self, table: &str) -> Result<EntryStream, DatabaseError> {
        self.inner.entries(table).await
    }

    async fn purge_expired(&self) -> Result<u64, DatabaseError> {
        self.inner.purge_expired().await
    }
}
