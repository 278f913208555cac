//! Chat session flags and the shared topic.
//!
//! The topic is reconciled last-writer-wins: an incoming topic replaces the
//! current one only when its time is newer and its text differs. The whole
//! compare and swap runs under one lock.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use lanchat_shared::protocol::TopicPayload;

/// The shared topic. An empty text means no topic is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topic {
    pub text: String,
    /// Who set it.
    pub nick: String,
    /// Unix millis when it was set.
    pub time: i64,
}

impl Topic {
    pub fn new(text: impl Into<String>, nick: impl Into<String>, time: i64) -> Self {
        Self {
            text: text.into(),
            nick: nick.into(),
            time,
        }
    }

    pub fn is_set(&self) -> bool {
        !self.text.is_empty()
    }
}

/// Outcome of merging a topic received from the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicMerge {
    /// Accepted before logon completed: existing state we just learned about.
    Discovered(Topic),
    /// Accepted after logon completed: someone changed it.
    Changed(Topic),
    /// Someone removed the topic.
    Removed { nick: String },
    Ignored,
}

#[derive(Debug, Default)]
struct ChatStateInner {
    logged_on: bool,
    logon_completed: bool,
    wrote: bool,
    topic: Topic,
}

/// Session flags and topic, shared between the inbound path, timers and
/// user commands.
#[derive(Debug, Default)]
pub struct ChatState {
    inner: Mutex<ChatStateInner>,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ChatStateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether our own LOGON has come back from the network.
    pub fn is_logged_on(&self) -> bool {
        self.lock().logged_on
    }

    pub fn set_logged_on(&self, logged_on: bool) {
        self.lock().logged_on = logged_on;
    }

    /// Whether the startup grace period after logon has passed.
    pub fn is_logon_completed(&self) -> bool {
        self.lock().logon_completed
    }

    pub fn set_logon_completed(&self, completed: bool) {
        self.lock().logon_completed = completed;
    }

    /// Whether we last told the others that we are writing.
    pub fn wrote(&self) -> bool {
        self.lock().wrote
    }

    pub fn set_wrote(&self, wrote: bool) {
        self.lock().wrote = wrote;
    }

    /// Set the writing flag, returning the previous value.
    pub fn swap_wrote(&self, wrote: bool) -> bool {
        std::mem::replace(&mut self.lock().wrote, wrote)
    }

    pub fn topic(&self) -> Topic {
        self.lock().topic.clone()
    }

    /// Replace the topic with one we set ourselves.
    pub fn set_topic(&self, topic: Topic) {
        self.lock().topic = topic;
    }

    /// Forget everything about the session, used when logging off.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.logged_on = false;
        inner.logon_completed = false;
        inner.wrote = false;
        inner.topic = Topic::default();
    }

    /// Merge a topic received from the network.
    pub fn merge_topic(&self, incoming: &TopicPayload) -> TopicMerge {
        if incoming.time <= 0 || incoming.nick.is_empty() {
            return TopicMerge::Ignored;
        }

        let mut inner = self.lock();
        let current = &inner.topic;

        if incoming.text == current.text || incoming.time <= current.time {
            debug!(
                nick = %incoming.nick,
                time = incoming.time,
                current_time = current.time,
                "Ignoring stale or unchanged topic"
            );
            return TopicMerge::Ignored;
        }

        if incoming.text.is_empty() {
            // removal is only trusted once we know the topic we had was current
            if !inner.logon_completed {
                return TopicMerge::Ignored;
            }

            inner.topic = Topic::new("", "", incoming.time);
            return TopicMerge::Removed {
                nick: incoming.nick.clone(),
            };
        }

        let topic = Topic::new(&incoming.text, &incoming.nick, incoming.time);
        inner.topic = topic.clone();

        if inner.logon_completed {
            TopicMerge::Changed(topic)
        } else {
            TopicMerge::Discovered(topic)
        }
    }
}
