//! In-process chat transport.
//!
//! Backs `run --dry-run` and the reconciler/scheduler tests. Messages live in
//! a per-channel list, oldest first; ids are sequential.

use arbinquer_core::error::{ArbinquerError, Result};
use arbinquer_core::traits::ChatTransport;
use arbinquer_core::types::ChannelMessage;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Failure to inject into the next transport call.
#[derive(Debug, Clone)]
pub enum Fault {
    PermissionDenied,
    RateLimited(Duration),
    Transport,
}

/// Transport operation a fault can be aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Edit,
    Delete,
    List,
}

impl Fault {
    fn into_error(self) -> ArbinquerError {
        match self {
            Fault::PermissionDenied => ArbinquerError::PermissionDenied("injected".into()),
            Fault::RateLimited(retry_after) => ArbinquerError::RateLimited { retry_after },
            Fault::Transport => ArbinquerError::transport("injected"),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    channels: HashMap<String, Vec<ChannelMessage>>,
    faults: VecDeque<(Option<Op>, Fault)>,
    creates: usize,
    edits: usize,
}

impl MemoryState {
    fn take_fault(&mut self, op: Op) -> Result<()> {
        let hit = self.faults.iter().position(|(target, _)| target.is_none_or(|t| t == op));
        match hit.and_then(|i| self.faults.remove(i)) {
            Some((_, fault)) => Err(fault.into_error()),
            None => Ok(()),
        }
    }

    fn push(&mut self, channel_id: &str, author_is_self: bool, content: &str) -> String {
        self.next_id += 1;
        let id = format!("mem-{}", self.next_id);
        self.channels
            .entry(channel_id.to_string())
            .or_default()
            .push(ChannelMessage::new(id.clone(), author_is_self, content));
        id
    }
}

/// Chat transport that keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
    log_messages: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every created or edited message at info level.
    pub fn logging(mut self) -> Self {
        self.log_messages = true;
        self
    }

    /// Seed a message as if posted by this bot in an earlier process.
    pub fn insert_own(&self, channel_id: &str, content: &str) -> String {
        self.state.lock().push(channel_id, true, content)
    }

    /// Seed a message from another user.
    pub fn insert_foreign(&self, channel_id: &str, content: &str) -> String {
        self.state.lock().push(channel_id, false, content)
    }

    /// Remove a message behind the bot's back.
    pub fn remove(&self, channel_id: &str, message_id: &str) {
        if let Some(list) = self.state.lock().channels.get_mut(channel_id) {
            list.retain(|m| m.id != message_id);
        }
    }

    /// Make the next transport call fail.
    pub fn fail_next(&self, fault: Fault) {
        self.state.lock().faults.push_back((None, fault));
    }

    /// Make the next call of one operation fail.
    pub fn fail_next_on(&self, op: Op, fault: Fault) {
        self.state.lock().faults.push_back((Some(op), fault));
    }

    /// Channel contents, oldest first.
    pub fn messages(&self, channel_id: &str) -> Vec<ChannelMessage> {
        self.state
            .lock()
            .channels
            .get(channel_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn create_count(&self) -> usize {
        self.state.lock().creates
    }

    pub fn edit_count(&self) -> usize {
        self.state.lock().edits
    }
}

#[async_trait]
impl ChatTransport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_message(&self, channel_id: &str, content: &str) -> Result<String> {
        let mut state = self.state.lock();
        state.take_fault(Op::Create)?;
        state.creates += 1;
        let id = state.push(channel_id, true, content);
        if self.log_messages {
            tracing::info!(channel = channel_id, message_id = %id, "create:\n{content}");
        }
        Ok(id)
    }

    async fn edit_message(&self, channel_id: &str, message_id: &str, content: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.take_fault(Op::Edit)?;
        let message = state
            .channels
            .get_mut(channel_id)
            .and_then(|list| list.iter_mut().find(|m| m.id == message_id))
            .ok_or_else(|| ArbinquerError::NotFound(format!("{channel_id}/{message_id}")))?;
        if !message.author_is_self {
            return Err(ArbinquerError::PermissionDenied("cannot edit another user's message".into()));
        }
        message.content = content.to_string();
        state.edits += 1;
        if self.log_messages {
            tracing::info!(channel = channel_id, message_id, "edit:\n{content}");
        }
        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.take_fault(Op::Delete)?;
        let list = state
            .channels
            .get_mut(channel_id)
            .ok_or_else(|| ArbinquerError::NotFound(format!("{channel_id}/{message_id}")))?;
        let before = list.len();
        list.retain(|m| m.id != message_id);
        if list.len() == before {
            return Err(ArbinquerError::NotFound(format!("{channel_id}/{message_id}")));
        }
        Ok(())
    }

    async fn list_recent_messages(&self, channel_id: &str, limit: usize) -> Result<Vec<ChannelMessage>> {
        let mut state = self.state.lock();
        state.take_fault(Op::List)?;
        Ok(state
            .channels
            .get(channel_id)
            .map(|list| list.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
