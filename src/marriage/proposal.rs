use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ListenerKey {
    guild_id: String,
    channel_id: String,
    user_id: String,
}

impl ListenerKey {
    fn new(guild_id: &str, channel_id: &str, user_id: &str) -> Self {
        Self {
            guild_id: guild_id.to_string(),
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

struct Slot {
    id: u64,
    sender: oneshot::Sender<String>,
}

/// One-shot waits for the next message a given user sends in a given channel.
///
/// A newer registration for the same user replaces the older one, which then
/// resolves as cancelled.
#[derive(Default)]
pub struct ReplyListeners {
    slots: Mutex<HashMap<ListenerKey, Slot>>,
    next_id: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerOutcome {
    Reply(String),
    TimedOut,
    Cancelled,
}

impl ReplyListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(self: &Arc<Self>, guild_id: &str, channel_id: &str, user_id: &str) -> ReplyListener {
        let (sender, receiver) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let key = ListenerKey::new(guild_id, channel_id, user_id);
        if self
            .slots
            .lock()
            .insert(key.clone(), Slot { id, sender })
            .is_some()
        {
            debug!(
                "replaced pending listener guild={} channel={} user={}",
                key.guild_id, key.channel_id, key.user_id
            );
        }
        ReplyListener {
            registry: Arc::clone(self),
            key,
            id,
            receiver,
        }
    }

    /// Hands `content` to the listener waiting on this user in this channel,
    /// if any. Returns whether the message was consumed.
    pub fn deliver(&self, guild_id: &str, channel_id: &str, user_id: &str, content: &str) -> bool {
        let key = ListenerKey::new(guild_id, channel_id, user_id);
        let Some(slot) = self.slots.lock().remove(&key) else {
            return false;
        };
        slot.sender.send(content.to_string()).is_ok()
    }

    /// Cancels every pending wait.
    pub fn dispose_all(&self) {
        let drained: Vec<_> = self.slots.lock().drain().collect();
        if !drained.is_empty() {
            debug!("disposing {} pending listeners", drained.len());
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, key: &ListenerKey, id: u64) {
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|slot| slot.id == id) {
            slots.remove(key);
        }
    }
}

/// A registered wait. Dropping it unregisters it.
pub struct ReplyListener {
    registry: Arc<ReplyListeners>,
    key: ListenerKey,
    id: u64,
    receiver: oneshot::Receiver<String>,
}

impl ReplyListener {
    pub async fn wait(mut self, timeout: Duration) -> ListenerOutcome {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(content)) => ListenerOutcome::Reply(content),
            Ok(Err(_)) => ListenerOutcome::Cancelled,
            Err(_) => ListenerOutcome::TimedOut,
        }
    }
}

impl Drop for ReplyListener {
    fn drop(&mut self) {
        self.registry.release(&self.key, self.id);
    }
}
